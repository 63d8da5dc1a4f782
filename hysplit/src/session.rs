//! The whole pipeline: load, index, plan, materialize, verify, report, link.
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use hyir::{module::Module, parser::extend_module_from_path};

use crate::{
    config::{Layout, SplitConfig},
    cycles::CyclicGroups,
    error::{SplitError, SplitResult},
    graph::ReferenceGraph,
    link::{DependencyGraph, LinkBatch, LinkDriver, LinkEvent, LinkJob, LogSink, ResponseTemplate},
    materialize::Materializer,
    planner::{Partition, Planner, PlannerState, mark_runtime_support},
    repair::{PartitionStatus, Repairer},
    report::{render_report, write_report},
    symbols::SymbolTable,
};

pub struct Splitter {
    config: SplitConfig,
    layout: Layout,
    source: Option<PathBuf>,
    module: Module,
    table: SymbolTable,
    graph: ReferenceGraph,
    cycles: CyclicGroups,
    state: PlannerState,
    partitions: Vec<Partition>,
    statuses: BTreeMap<usize, PartitionStatus>,
    dependencies: DependencyGraph,
}

impl Splitter {
    /// Load the module at `path`. The only fatal error of a run.
    pub fn load(path: impl AsRef<Path>, config: SplitConfig) -> SplitResult<Self> {
        let path = path.as_ref();
        let mut module = Module::default();
        extend_module_from_path(&mut module, path).map_err(|source| {
            log::error!("cannot load {}", path.display());
            SplitError::Load {
                file: path.display().to_string(),
                source,
            }
        })?;
        log::info!(
            "loaded {} ({} functions, {} globals)",
            path.display(),
            module.functions.len(),
            module.globals.len()
        );
        let mut splitter = Self::from_module(module, config);
        splitter.source = Some(path.to_path_buf());
        Ok(splitter)
    }

    /// Index an in-memory module: symbol table, reference graph and cycles.
    pub fn from_module(module: Module, config: SplitConfig) -> Self {
        let table = SymbolTable::build(&module);
        let graph = ReferenceGraph::build(Some(&module), &table);
        let cycles = CyclicGroups::detect(&graph, &table);
        let state = PlannerState::new(&table);
        Self {
            layout: config.layout(),
            config,
            source: None,
            module,
            table,
            graph,
            cycles,
            state,
            partitions: Vec::new(),
            statuses: BTreeMap::new(),
            dependencies: DependencyGraph::default(),
        }
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    pub fn graph(&self) -> &ReferenceGraph {
        &self.graph
    }

    pub fn cycles(&self) -> &CyclicGroups {
        &self.cycles
    }

    pub fn state(&self) -> &PlannerState {
        &self.state
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn statuses(&self) -> &BTreeMap<usize, PartitionStatus> {
        &self.statuses
    }

    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.dependencies
    }

    /// Assign every definition to a partition and derive partition
    /// dependencies. Planning happens once; later calls return the same
    /// partitions.
    pub fn plan(&mut self) -> &[Partition] {
        if !self.partitions.is_empty() || self.table.is_empty() {
            return &self.partitions;
        }

        let planner = Planner::new(&self.table, &self.graph, &self.cycles, &self.config.planner);
        let mut partitions = planner.plan(&mut self.state);
        if let Some(symbol) = &self.config.link.runtime_symbol {
            mark_runtime_support(&mut partitions, &self.table, symbol);
        }

        self.dependencies = DependencyGraph::build(&partitions, &self.graph, &self.state);
        for partition in &mut partitions {
            partition.dependencies = self.dependencies.dependencies(partition.id);
        }
        self.partitions = partitions;
        &self.partitions
    }

    /// Write every partition and verify it, repairing linkage once where
    /// possible. Returns whether every partition ended up valid.
    pub fn materialize(&mut self) -> SplitResult<bool> {
        self.plan();
        let workspace = self.layout.workspace();
        fs::create_dir_all(workspace).map_err(|e| SplitError::io(workspace, e))?;

        let materializer = Materializer::new(&self.module, &self.table, &self.graph, &self.state);
        let repairer = Repairer::new(&materializer, self.config.mode);
        let no_overrides = Default::default();

        for partition in &mut self.partitions {
            let artifact = self.layout.artifact(partition.id);
            let status = match materializer.materialize(partition, self.config.mode, &no_overrides, &artifact) {
                Ok(()) => {
                    partition.artifact = Some(artifact.clone());
                    repairer.check(partition, &artifact, &self.layout.repair_artifact(partition.id))
                }
                Err(err) => PartitionStatus::Invalid {
                    reason: err.to_string(),
                },
            };
            match &status {
                PartitionStatus::Verified => log::debug!("partition {} verified", partition.id),
                PartitionStatus::Repaired { symbols } => log::info!(
                    "partition {} repaired ({} symbols made external)",
                    partition.id,
                    symbols.len()
                ),
                PartitionStatus::Invalid { .. } => log::error!("partition {} is invalid", partition.id),
            }
            self.statuses.insert(partition.id, status);
        }

        Ok(self.statuses.values().all(PartitionStatus::is_valid))
    }

    pub fn render_report(&self) -> String {
        render_report(
            self.module.source_filename.as_deref(),
            &self.table,
            &self.partitions,
            &self.state,
            &self.statuses,
        )
    }

    pub fn write_report(&self) -> SplitResult<PathBuf> {
        let path = self.layout.report();
        write_report(&path, &self.render_report())?;
        Ok(path)
    }

    /// Plan, materialize, verify and report.
    pub fn split(&mut self) -> SplitResult<bool> {
        self.plan();
        let valid = self.materialize()?;
        self.write_report()?;
        if valid {
            log::info!("{} partitions written and verified", self.partitions.len());
        }
        Ok(valid)
    }

    pub fn link(&self, driver: &dyn LinkDriver) -> SplitResult<bool> {
        self.link_with_observer(driver, None)
    }

    /// Link every valid partition. Invalid partitions are left out, and
    /// partitions depending on them link without waiting for them.
    pub fn link_with_observer(
        &self,
        driver: &dyn LinkDriver,
        observer: Option<&(dyn Fn(LinkEvent) + Sync)>,
    ) -> SplitResult<bool> {
        if self.partitions.is_empty() {
            return Err(SplitError::EmptyModule);
        }

        let template = match &self.config.link.response_template {
            Some(path) => ResponseTemplate::load(path)?,
            None => ResponseTemplate::minimal(),
        };
        let sink = LogSink::open(&self.layout.link_log())?;

        let jobs: Vec<LinkJob> = self
            .partitions
            .iter()
            .filter(|p| self.statuses.get(&p.id).is_some_and(PartitionStatus::is_valid))
            .filter_map(|p| {
                Some(LinkJob {
                    partition: p.id,
                    artifact: p.artifact.clone()?,
                    has_runtime_support: p.has_runtime_support,
                })
            })
            .collect();
        let skipped = self.partitions.len() - jobs.len();
        if skipped > 0 {
            log::warn!("{} partition(s) are not linked because they are invalid", skipped);
        }

        let batch = LinkBatch {
            layout: &self.layout,
            template: &template,
            dependencies: &self.dependencies,
            source: self.source.as_deref(),
            runtime: self.config.link.runtime_defsym(),
            sink: &sink,
        };
        let report = batch.run(&jobs, driver, observer);
        Ok(report.success() && skipped == 0)
    }
}
