//! Linker response files.
//!
//! A template is a response file written for the whole program. Each
//! partition gets two copies of it with the output name, the input artifact
//! and the runtime alias rewritten; every other line passes through.
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::{SplitError, SplitResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseTemplate {
    lines: Vec<String>,
}

/// Values substituted into a template for one link.
#[derive(Debug, Clone)]
pub struct ResponseContext<'a> {
    pub output: &'a Path,
    pub artifact: &'a Path,
    /// The whole-program input named by the template, if known.
    pub source: Option<&'a Path>,
    /// Shared objects to resolve against, placed after the artifact.
    pub dependencies: &'a [PathBuf],
    /// Configured `(alias, symbol)` pair.
    pub runtime: Option<(&'a str, &'a str)>,
    pub has_runtime_support: bool,
}

fn quote(path: &Path) -> String {
    let text = path.display().to_string();
    if text.contains(char::is_whitespace) {
        format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        text
    }
}

fn is_output_flag(line: &str) -> bool {
    line == "-o"
        || line == "--output"
        || line.starts_with("-o ")
        || line.starts_with("-o=")
        || line.starts_with("--output=")
        || line.starts_with("--output ")
}

const INPUT_EXTENSIONS: [&str; 4] = ["hyir", "ll", "bc", "o"];

fn is_input_line(line: &str, source: Option<&Path>) -> bool {
    if line.starts_with('-') {
        return false;
    }
    let candidate = Path::new(line.trim_matches('"'));
    match source {
        Some(source) => {
            candidate == source
                || (candidate.file_name().is_some() && candidate.file_name() == source.file_name())
        }
        None => candidate
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| INPUT_EXTENSIONS.contains(&ext)),
    }
}

impl ResponseTemplate {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn load(path: &Path) -> SplitResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| SplitError::io(path, e))?;
        Ok(Self::parse(&text))
    }

    /// Template used when none is configured.
    pub fn minimal() -> Self {
        Self::parse("-shared\n")
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn render(&self, ctx: &ResponseContext<'_>) -> String {
        let mut out: Vec<String> = Vec::with_capacity(self.lines.len() + ctx.dependencies.len() + 3);
        let mut wrote_output = false;
        let mut wrote_input = false;
        let mut wrote_defsym = false;
        let mut skip_value = false;

        let defsym = ctx
            .runtime
            .map(|(alias, symbol)| format!("--defsym={}={}", alias, symbol));

        for line in &self.lines {
            if skip_value {
                skip_value = false;
                continue;
            }

            if is_output_flag(line) {
                skip_value = line == "-o" || line == "--output";
                if !wrote_output {
                    out.push(format!("-o {}", quote(ctx.output)));
                    wrote_output = true;
                }
                continue;
            }

            if line.starts_with("--defsym") {
                let names_runtime = ctx
                    .runtime
                    .is_some_and(|(alias, symbol)| line.contains(alias) || line.contains(symbol));
                if !names_runtime {
                    out.push(line.clone());
                } else if ctx.has_runtime_support && !wrote_defsym {
                    out.extend(defsym.clone());
                    wrote_defsym = true;
                }
                continue;
            }

            if !wrote_input && is_input_line(line, ctx.source) {
                out.push(quote(ctx.artifact));
                out.extend(ctx.dependencies.iter().map(|dep| quote(dep)));
                wrote_input = true;
                continue;
            }

            out.push(line.clone());
        }

        if !wrote_output {
            out.push(format!("-o {}", quote(ctx.output)));
        }
        if !wrote_input {
            out.push(quote(ctx.artifact));
            out.extend(ctx.dependencies.iter().map(|dep| quote(dep)));
        }
        if ctx.has_runtime_support && !wrote_defsym {
            out.extend(defsym);
        }

        let mut text = out.join("\n");
        text.push('\n');
        text
    }

    pub fn write(&self, ctx: &ResponseContext<'_>, path: &Path) -> SplitResult<()> {
        fs::write(path, self.render(ctx)).map_err(|e| SplitError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "
-shared
--gc-sections
-o
big.so
--defsym=rt_init=__rt_init
--defsym=other=thing
build/big.hyir
-lc
";

    fn context<'a>(deps: &'a [PathBuf], runtime_partition: bool) -> ResponseContext<'a> {
        ResponseContext {
            output: Path::new("w/part_2.so"),
            artifact: Path::new("w/part_2.hyir"),
            source: Some(Path::new("big.hyir")),
            dependencies: deps,
            runtime: Some(("rt_init", "__rt_init")),
            has_runtime_support: runtime_partition,
        }
    }

    #[test]
    fn template_lines_are_rewritten() {
        let template = ResponseTemplate::parse(TEMPLATE);
        let deps = vec![PathBuf::from("w/part_0.p1.so"), PathBuf::from("w/part_1.p1.so")];
        let text = template.render(&context(&deps, true));
        assert_eq!(
            text,
            "-shared\n--gc-sections\n-o w/part_2.so\n--defsym=rt_init=__rt_init\n--defsym=other=thing\nw/part_2.hyir\nw/part_0.p1.so\nw/part_1.p1.so\n-lc\n"
        );
    }

    #[test]
    fn runtime_alias_is_dropped_elsewhere() {
        let template = ResponseTemplate::parse(TEMPLATE);
        let text = template.render(&context(&[], false));
        assert!(!text.contains("rt_init"));
        assert!(text.contains("--defsym=other=thing"));
    }

    #[test]
    fn missing_lines_are_appended() {
        let template = ResponseTemplate::minimal();
        let text = template.render(&context(&[], true));
        assert_eq!(
            text,
            "-shared\n-o w/part_2.so\nw/part_2.hyir\n--defsym=rt_init=__rt_init\n"
        );
    }

    #[test]
    fn paths_with_spaces_are_quoted() {
        let template = ResponseTemplate::minimal();
        let ctx = ResponseContext {
            output: Path::new("my dir/out.so"),
            artifact: Path::new("a.hyir"),
            source: None,
            dependencies: &[],
            runtime: None,
            has_runtime_support: false,
        };
        assert!(template.render(&ctx).contains("-o \"my dir/out.so\"\n"));
    }
}
