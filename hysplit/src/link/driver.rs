use std::{path::Path, process::Command};

/// Which of the two link passes of a partition is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display)]
pub enum LinkPhase {
    /// The partition alone.
    #[strum(serialize = "phase1")]
    Standalone,
    /// The partition against its dependencies.
    #[strum(serialize = "phase2")]
    Resolved,
}

impl LinkPhase {
    pub fn number(self) -> u8 {
        match self {
            LinkPhase::Standalone => 1,
            LinkPhase::Resolved => 2,
        }
    }
}

/// Result of one external link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkOutput {
    pub success: bool,
    /// Captured tool output.
    pub log: String,
}

/// Runs the external linker on a response file.
pub trait LinkDriver: Send + Sync {
    fn link(&self, partition: usize, phase: LinkPhase, response: &Path) -> LinkOutput;
}

/// Invokes `<program> @<response>` as a child process.
#[derive(Debug, Clone)]
pub struct CommandDriver {
    program: String,
}

impl CommandDriver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl LinkDriver for CommandDriver {
    fn link(&self, partition: usize, phase: LinkPhase, response: &Path) -> LinkOutput {
        log::debug!(
            "partition {} {}: {} @{}",
            partition,
            phase,
            self.program,
            response.display()
        );
        match Command::new(&self.program)
            .arg(format!("@{}", response.display()))
            .output()
        {
            Ok(output) => {
                let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
                log.push_str(&String::from_utf8_lossy(&output.stderr));
                LinkOutput {
                    success: output.status.success(),
                    log,
                }
            }
            Err(err) => LinkOutput {
                success: false,
                log: format!("failed to run {}: {}", self.program, err),
            },
        }
    }
}
