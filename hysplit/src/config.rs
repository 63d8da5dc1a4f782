//! Run configuration, loaded from TOML.
//!
//! Every field has a default so an empty file (or no file at all) is a valid
//! configuration.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{SplitError, SplitResult};

/// How a partition is turned into a standalone artifact.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MaterializeMode {
    /// Copy the whole module and prune everything outside the partition.
    #[default]
    Clone,

    /// Re-declare the partition's symbols in a fresh module, without bodies.
    Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Functions with strictly more callers than this get their own partition.
    pub high_fan_in_threshold: usize,

    /// Lower bounds of the ranked buckets after the first one (which starts
    /// at 0). The last bucket is open-ended.
    pub bucket_bounds: Vec<usize>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            high_fan_in_threshold: 500,
            bucket_bounds: vec![200, 1600, 4000, 8000, 20000],
        }
    }
}

impl PlannerConfig {
    /// `[start, end)` ranges over the ranked function list; the last range
    /// has no end.
    pub fn bucket_ranges(&self) -> Vec<(usize, Option<usize>)> {
        let mut bounds: Vec<usize> = self.bucket_bounds.clone();
        bounds.sort_unstable();
        bounds.dedup();
        bounds.retain(|b| *b > 0);

        let mut ranges = Vec::with_capacity(bounds.len() + 1);
        let mut start = 0;
        for bound in bounds {
            ranges.push((start, Some(bound)));
            start = bound;
        }
        ranges.push((start, None));
        ranges
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Linker program, invoked as `<linker> @<response file>`.
    pub linker: String,

    /// Response file whose lines are rewritten for every partition. When
    /// absent a minimal `-shared` template is used.
    pub response_template: Option<PathBuf>,

    /// Routine the runtime needs resolved at link time. The partition
    /// defining it carries a `--defsym=<alias>=<symbol>` line.
    pub runtime_symbol: Option<String>,
    pub runtime_alias: Option<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            linker: "ld.lld".to_string(),
            response_template: None,
            runtime_symbol: None,
            runtime_alias: None,
        }
    }
}

impl LinkConfig {
    /// The `(alias, symbol)` pair when both are configured.
    pub fn runtime_defsym(&self) -> Option<(&str, &str)> {
        match (&self.runtime_alias, &self.runtime_symbol) {
            (Some(alias), Some(symbol)) => Some((alias.as_str(), symbol.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub mode: MaterializeMode,

    /// Directory receiving artifacts, response files and intermediate objects.
    pub workspace: PathBuf,

    /// Prefix of every generated file name.
    pub output_prefix: String,

    /// Where finished shared objects are collected.
    pub output_dir: PathBuf,

    pub planner: PlannerConfig,
    pub link: LinkConfig,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            mode: MaterializeMode::default(),
            workspace: PathBuf::from("hysplit-work"),
            output_prefix: "part".to_string(),
            output_dir: PathBuf::from("hysplit-out"),
            planner: PlannerConfig::default(),
            link: LinkConfig::default(),
        }
    }
}

impl SplitConfig {
    pub fn from_toml_str(text: &str) -> SplitResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> SplitResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| SplitError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> SplitResult<String> {
        Ok(toml::to_string(self)?)
    }

    pub fn layout(&self) -> Layout {
        Layout {
            workspace: self.workspace.clone(),
            prefix: self.output_prefix.clone(),
            output_dir: self.output_dir.clone(),
        }
    }
}

/// Names of every file a run produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    workspace: PathBuf,
    prefix: String,
    output_dir: PathBuf,
}

impl Layout {
    pub fn new(workspace: impl Into<PathBuf>, prefix: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            prefix: prefix.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn file(&self, partition: usize, suffix: &str) -> PathBuf {
        self.workspace
            .join(format!("{}_{}{}", self.prefix, partition, suffix))
    }

    pub fn artifact(&self, partition: usize) -> PathBuf {
        self.file(partition, ".hyir")
    }

    /// Side file written by the repair pass before it replaces the artifact.
    pub fn repair_artifact(&self, partition: usize) -> PathBuf {
        self.file(partition, ".repair.hyir")
    }

    pub fn response_file(&self, partition: usize, phase: u8) -> PathBuf {
        self.file(partition, &format!(".phase{}.rsp", phase))
    }

    /// Output of the dependency-free link.
    pub fn phase1_object(&self, partition: usize) -> PathBuf {
        self.file(partition, ".p1.so")
    }

    /// Output of the dependency-aware link.
    pub fn shared_object(&self, partition: usize) -> PathBuf {
        self.file(partition, ".so")
    }

    pub fn final_object(&self, partition: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}_{}.so", self.prefix, partition))
    }

    pub fn report(&self) -> PathBuf {
        self.workspace.join(format!("{}_groups.txt", self.prefix))
    }

    pub fn link_log(&self) -> PathBuf {
        self.workspace.join("link.log")
    }
}
