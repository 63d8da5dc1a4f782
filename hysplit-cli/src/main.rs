mod diagnostics;
mod logger;

use std::{io::Write, path::PathBuf, process::ExitCode};

use clap::{ArgAction, Args, Parser, Subcommand};
use hyir::{module::Module, parser::extend_module_from_path, verify::verify_module};
use hysplit::{
    MaterializeMode, SplitConfig, SplitError, Splitter, link::CommandDriver,
    repair::PartitionStatus,
};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

#[derive(Parser)]
#[command(
    name = "hysplit",
    version,
    about = "Split a large IR module into independently linkable partitions"
)]
struct Arguments {
    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable coloured output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Partition a module, write and verify every partition, optionally link
    Split(SplitArgs),

    /// Parse and verify a single module, e.g. a partition artifact
    Check {
        /// Path to the module
        input: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Configuration file to start from
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct SplitArgs {
    /// Path to the input module
    input: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Materialization mode (clone or signature)
    #[arg(short, long)]
    mode: Option<MaterializeMode>,

    /// Prefix of every generated file
    #[arg(short, long)]
    prefix: Option<String>,

    /// Directory for artifacts and intermediate objects
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Directory for the final shared objects
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Linker response file used as template
    #[arg(short, long)]
    response_template: Option<PathBuf>,

    /// Link the partitions after a successful split
    #[arg(short, long)]
    link: bool,

    /// Linker program invoked as `<linker> @<response file>`
    #[arg(long)]
    linker: Option<String>,

    /// Print the grouping report to stdout
    #[arg(long)]
    report: bool,
}

fn load_config(path: Option<&PathBuf>) -> Result<SplitConfig, SplitError> {
    match path {
        Some(path) => SplitConfig::from_path(path),
        None => Ok(SplitConfig::default()),
    }
}

impl SplitArgs {
    fn config(&self) -> Result<SplitConfig, SplitError> {
        let mut config = load_config(self.config.as_ref())?;
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(prefix) = &self.prefix {
            config.output_prefix = prefix.clone();
        }
        if let Some(workspace) = &self.workspace {
            config.workspace = workspace.clone();
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }
        if let Some(template) = &self.response_template {
            config.link.response_template = Some(template.clone());
        }
        if let Some(linker) = &self.linker {
            config.link.linker = linker.clone();
        }
        Ok(config)
    }
}

fn colored(stdout: &mut StandardStream, color: Color, text: &str) {
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
    let _ = write!(stdout, "{}", text);
    let _ = stdout.reset();
}

fn print_summary(splitter: &Splitter, stdout: &mut StandardStream) {
    for partition in splitter.partitions() {
        let status = splitter.statuses().get(&partition.id);
        let _ = write!(
            stdout,
            "partition {:>3} {:<14} {:>7} symbols  ",
            partition.id,
            partition.kind.to_string(),
            partition.len()
        );
        match status {
            Some(PartitionStatus::Verified) => colored(stdout, Color::Green, "verified"),
            Some(status @ PartitionStatus::Repaired { .. }) => {
                colored(stdout, Color::Yellow, &status.to_string())
            }
            Some(status) => colored(stdout, Color::Red, &status.to_string()),
            None => colored(stdout, Color::Red, "not written"),
        }
        let _ = writeln!(stdout);
    }
}

fn split(args: SplitArgs, color: ColorChoice) -> ExitCode {
    let config = match args.config() {
        Ok(config) => config,
        Err(err) => {
            log::error!("{}", err);
            return ExitCode::from(2);
        }
    };

    let mut splitter = match Splitter::load(&args.input, config) {
        Ok(splitter) => splitter,
        Err(SplitError::Load { source, .. }) => {
            diagnostics::render_load_error(&source);
            return ExitCode::from(2);
        }
        Err(err) => {
            log::error!("{}", err);
            return ExitCode::from(2);
        }
    };

    let mut ok = match splitter.split() {
        Ok(ok) => ok,
        Err(err) => {
            log::error!("{}", err);
            false
        }
    };

    let mut stdout = StandardStream::stdout(color);
    print_summary(&splitter, &mut stdout);
    if args.report {
        let _ = write!(stdout, "{}", splitter.render_report());
    }
    log::info!("report written to {}", splitter.layout().report().display());

    if args.link {
        let driver = CommandDriver::new(splitter.config().link.linker.clone());
        ok &= match splitter.link(&driver) {
            Ok(linked) => linked,
            Err(err) => {
                log::error!("{}", err);
                false
            }
        };
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn check(input: PathBuf, color: ColorChoice) -> ExitCode {
    let mut module = Module::default();
    if let Err(err) = extend_module_from_path(&mut module, &input) {
        diagnostics::render_load_error(&err);
        return ExitCode::from(2);
    }

    let mut stdout = StandardStream::stdout(color);
    match verify_module(&module) {
        Ok(()) => {
            colored(&mut stdout, Color::Green, "ok");
            let _ = writeln!(
                stdout,
                ": {} functions, {} globals",
                module.functions.len(),
                module.globals.len()
            );
            ExitCode::SUCCESS
        }
        Err(diagnostics) => {
            colored(
                &mut stdout,
                Color::Red,
                &format!("{} finding(s)", diagnostics.len()),
            );
            let _ = writeln!(stdout, " in {}", input.display());
            let _ = write!(stdout, "{}", diagnostics);
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let args = Arguments::parse();
    let color = if args.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };
    logger::init(args.verbose, args.quiet, color);

    match args.command {
        Command::Split(split_args) => split(split_args, color),
        Command::Check { input } => check(input, color),
        Command::Config { config } => match load_config(config.as_ref())
            .and_then(|config| config.to_toml_string())
        {
            Ok(text) => {
                print!("{}", text);
                ExitCode::SUCCESS
            }
            Err(err) => {
                log::error!("{}", err);
                ExitCode::from(2)
            }
        },
    }
}
