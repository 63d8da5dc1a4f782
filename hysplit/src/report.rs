//! Human-readable grouping report.
use std::{collections::BTreeMap, fmt, fs, path::Path};

use crate::{
    error::{SplitError, SplitResult},
    planner::{Partition, PlannerState},
    repair::PartitionStatus,
    symbols::SymbolTable,
};

/// The grouping report of one run; render it with `to_string()`.
pub struct GroupingReport<'a> {
    pub source: Option<&'a str>,
    pub table: &'a SymbolTable,
    pub partitions: &'a [Partition],
    pub state: &'a PlannerState,
    pub statuses: &'a BTreeMap<usize, PartitionStatus>,
}

impl GroupingReport<'_> {
    fn status_of(&self, partition: usize) -> String {
        self.statuses
            .get(&partition)
            .map(ToString::to_string)
            .unwrap_or_else(|| "unchecked".to_string())
    }

    fn write_partition(&self, f: &mut fmt::Formatter<'_>, partition: &Partition) -> fmt::Result {
        let deps: Vec<String> = partition
            .dependencies
            .iter()
            .map(ToString::to_string)
            .collect();
        write!(
            f,
            "partition {} [{}]: {} symbols, {}, depends on [{}]",
            partition.id,
            partition.kind,
            partition.len(),
            self.status_of(partition.id),
            deps.join(", ")
        )?;
        if partition.has_runtime_support {
            write!(f, ", runtime support")?;
        }
        writeln!(f)?;
        match self.statuses.get(&partition.id) {
            Some(PartitionStatus::Repaired { symbols }) => {
                writeln!(f, "  forced external: {}", symbols.join(", "))?;
            }
            Some(PartitionStatus::Invalid { reason }) => {
                for line in reason.lines() {
                    writeln!(f, "  | {}", line)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl fmt::Display for GroupingReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# hysplit grouping report")?;
        writeln!(
            f,
            "# generated {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        if let Some(source) = self.source {
            writeln!(f, "# module {}", source)?;
        }
        writeln!(
            f,
            "# {} symbols, {} partitions",
            self.table.len(),
            self.partitions.len()
        )?;
        writeln!(f)?;

        for partition in self.partitions {
            self.write_partition(f, partition)?;
        }

        writeln!(f)?;
        writeln!(f, "{:<40} {:<9} {:>9} {:<21} status", "symbol", "kind", "partition", "linkage")?;
        for (id, record) in self.table.iter() {
            let (partition, status) = match self.state.partition_of(id) {
                Some(p) => (p.to_string(), self.status_of(p)),
                None => ("-".to_string(), "declaration".to_string()),
            };
            writeln!(
                f,
                "{:<40} {:<9} {:>9} {:<21} {}",
                record.display_name, record.kind, partition, record.linkage, status
            )?;
        }
        Ok(())
    }
}

pub fn render_report(
    source: Option<&str>,
    table: &SymbolTable,
    partitions: &[Partition],
    state: &PlannerState,
    statuses: &BTreeMap<usize, PartitionStatus>,
) -> String {
    GroupingReport {
        source,
        table,
        partitions,
        state,
        statuses,
    }
    .to_string()
}

pub fn write_report(path: &Path, report: &str) -> SplitResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| SplitError::io(parent, e))?;
    }
    fs::write(path, report).map_err(|e| SplitError::io(path, e))?;
    log::info!("wrote grouping report to {}", path.display());
    Ok(())
}
