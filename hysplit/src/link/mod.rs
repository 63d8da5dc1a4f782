//! Dependency-ordered two-phase link.
//!
//! Every partition gets one worker thread. Phase 1 links the partition on
//! its own and then fires the partition's completion signal, whatever the
//! outcome. Phase 2 waits for the signals of every dependency, then links
//! against their phase-1 objects. A partition succeeds when both phases do.
pub mod driver;
pub mod response;
pub mod signal;

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use petgraph::{Direction, prelude::DiGraphMap};

pub use driver::{CommandDriver, LinkDriver, LinkOutput, LinkPhase};
pub use response::{ResponseContext, ResponseTemplate};
pub use signal::{CompletionSignal, FireGuard};

use crate::{
    config::Layout,
    error::{SplitError, SplitResult},
    graph::ReferenceGraph,
    planner::{Partition, PlannerState},
};

/// Partition-level "needs symbols from" relation.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraphMap<usize, ()>,
}

impl DependencyGraph {
    /// Derive dependencies from the reference graph. The globals partition,
    /// when present, depends on and is depended on by every other partition.
    pub fn build(partitions: &[Partition], graph: &ReferenceGraph, state: &PlannerState) -> Self {
        let mut deps = DiGraphMap::new();
        for partition in partitions {
            deps.add_node(partition.id);
        }

        let hub = partitions.iter().find(|p| p.is_globals()).map(|p| p.id);
        for partition in partitions {
            if Some(partition.id) == hub {
                continue;
            }
            if let Some(hub) = hub {
                deps.add_edge(partition.id, hub, ());
                deps.add_edge(hub, partition.id, ());
            }
            for member in &partition.members {
                for used in graph.references(*member) {
                    match state.partition_of(used) {
                        Some(target) if target != partition.id => {
                            deps.add_edge(partition.id, target, ());
                        }
                        _ => {}
                    }
                }
            }
        }
        Self { graph: deps }
    }

    /// Graph over `nodes` with the given `(from, to)` edges.
    pub fn from_edges(nodes: impl IntoIterator<Item = usize>, edges: &[(usize, usize)]) -> Self {
        let mut graph = DiGraphMap::new();
        for node in nodes {
            graph.add_node(node);
        }
        for (from, to) in edges {
            graph.add_edge(*from, *to, ());
        }
        Self { graph }
    }

    pub fn dependencies(&self, partition: usize) -> BTreeSet<usize> {
        if !self.graph.contains_node(partition) {
            return BTreeSet::new();
        }
        self.graph
            .neighbors_directed(partition, Direction::Outgoing)
            .filter(|dep| *dep != partition)
            .collect()
    }

    pub fn dependents(&self, partition: usize) -> BTreeSet<usize> {
        if !self.graph.contains_node(partition) {
            return BTreeSet::new();
        }
        self.graph
            .neighbors_directed(partition, Direction::Incoming)
            .filter(|dep| *dep != partition)
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Progress notifications, in the order a worker produces them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Phase1Started { partition: usize },
    Phase1Finished { partition: usize, success: bool },
    /// Emitted right before the partition's completion signal fires.
    Phase1Signalled { partition: usize },
    Phase2Started { partition: usize },
    Phase2Finished { partition: usize, success: bool },
}

/// Shared, mutex-guarded log of tool output, mirrored to a file.
pub struct LogSink {
    inner: Mutex<SinkState>,
}

struct SinkState {
    file: Option<File>,
    entries: Vec<String>,
}

impl LogSink {
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(SinkState {
                file: None,
                entries: Vec::new(),
            }),
        }
    }

    /// Append to `path`, creating it if needed.
    pub fn open(path: &Path) -> SplitResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| SplitError::io(path, e))?;
        Ok(Self {
            inner: Mutex::new(SinkState {
                file: Some(file),
                entries: Vec::new(),
            }),
        })
    }

    pub fn record(&self, partition: usize, phase: LinkPhase, text: &str) {
        let entry = format!(
            "[{}] partition {} {}: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            partition,
            phase,
            text.trim_end()
        );
        let mut state = self.inner.lock();
        if let Some(file) = state.file.as_mut() {
            if let Err(err) = writeln!(file, "{}", entry) {
                log::warn!("cannot append to link log: {}", err);
            }
        }
        state.entries.push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.inner.lock().entries.clone()
    }
}

/// One partition to link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkJob {
    pub partition: usize,
    pub artifact: PathBuf,
    pub has_runtime_support: bool,
}

/// Per-partition results of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub results: BTreeMap<usize, bool>,
}

impl LinkReport {
    /// True when every partition linked.
    pub fn success(&self) -> bool {
        self.results.values().all(|ok| *ok)
    }

    pub fn failed(&self) -> Vec<usize> {
        self.results
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Everything a batch needs besides the jobs.
pub struct LinkBatch<'a> {
    pub layout: &'a Layout,
    pub template: &'a ResponseTemplate,
    pub dependencies: &'a DependencyGraph,
    /// Whole-program input named by the template.
    pub source: Option<&'a Path>,
    pub runtime: Option<(&'a str, &'a str)>,
    pub sink: &'a LogSink,
}

type Observer<'a> = &'a (dyn Fn(LinkEvent) + Sync);

impl<'a> LinkBatch<'a> {
    /// Link every job, one thread each, and wait for all of them.
    pub fn run(
        &self,
        jobs: &[LinkJob],
        driver: &dyn LinkDriver,
        observer: Option<Observer<'_>>,
    ) -> LinkReport {
        let signals: HashMap<usize, CompletionSignal> = jobs
            .iter()
            .map(|job| (job.partition, CompletionSignal::new()))
            .collect();
        let notify = |event: LinkEvent| {
            if let Some(observer) = observer {
                observer(event);
            }
        };

        let outcome = crossbeam::thread::scope(|s| {
            let handles: Vec<_> = jobs
                .iter()
                .map(|job| {
                    let signals = &signals;
                    let notify = &notify;
                    s.spawn(move |_| (job.partition, self.link_one(job, signals, driver, notify)))
                })
                .collect();
            handles
                .into_iter()
                .filter_map(|handle| handle.join().ok())
                .collect::<BTreeMap<usize, bool>>()
        });

        let mut results = match outcome {
            Ok(results) => results,
            Err(_) => {
                log::error!("a link worker panicked");
                BTreeMap::new()
            }
        };
        for job in jobs {
            results.entry(job.partition).or_insert(false);
        }

        let report = LinkReport { results };
        if report.success() {
            log::info!("linked {} partitions", jobs.len());
        } else {
            log::error!("link failed for partitions {:?}", report.failed());
        }
        report
    }

    fn link_one(
        &self,
        job: &LinkJob,
        signals: &HashMap<usize, CompletionSignal>,
        driver: &dyn LinkDriver,
        notify: &(dyn Fn(LinkEvent) + Sync),
    ) -> bool {
        let id = job.partition;
        // Dependents are released even if the driver panics in phase 1.
        let guard = signals.get(&id).map(CompletionSignal::fire_on_drop);

        notify(LinkEvent::Phase1Started { partition: id });
        let phase1 = self.run_phase(job, LinkPhase::Standalone, &[], driver);
        notify(LinkEvent::Phase1Finished {
            partition: id,
            success: phase1,
        });
        notify(LinkEvent::Phase1Signalled { partition: id });
        drop(guard);

        let mut inputs = Vec::new();
        for dep in self.dependencies.dependencies(id) {
            match signals.get(&dep) {
                Some(signal) => {
                    signal.wait();
                    inputs.push(self.layout.phase1_object(dep));
                }
                None => log::warn!(
                    "partition {} depends on partition {}, which is not being linked",
                    id,
                    dep
                ),
            }
        }

        notify(LinkEvent::Phase2Started { partition: id });
        let phase2 = self.run_phase(job, LinkPhase::Resolved, &inputs, driver);
        notify(LinkEvent::Phase2Finished {
            partition: id,
            success: phase2,
        });

        phase1 && phase2 && self.collect(id)
    }

    fn run_phase(
        &self,
        job: &LinkJob,
        phase: LinkPhase,
        dependencies: &[PathBuf],
        driver: &dyn LinkDriver,
    ) -> bool {
        let id = job.partition;
        let output = match phase {
            LinkPhase::Standalone => self.layout.phase1_object(id),
            LinkPhase::Resolved => self.layout.shared_object(id),
        };
        let response = self.layout.response_file(id, phase.number());
        let ctx = ResponseContext {
            output: &output,
            artifact: &job.artifact,
            source: self.source,
            dependencies,
            runtime: self.runtime,
            has_runtime_support: job.has_runtime_support,
        };
        if let Err(err) = self.template.write(&ctx, &response) {
            log::error!("partition {} {}: {}", id, phase, err);
            self.sink.record(id, phase, &err.to_string());
            return false;
        }

        let result = driver.link(id, phase, &response);
        self.sink.record(
            id,
            phase,
            &format!(
                "{}{}",
                if result.success { "ok" } else { "FAILED" },
                if result.log.is_empty() {
                    String::new()
                } else {
                    format!("\n{}", result.log)
                }
            ),
        );
        if !result.success {
            log::error!(
                "{}",
                SplitError::Link {
                    partition: id,
                    reason: format!("{} failed: {}", phase, result.log.trim_end()),
                }
            );
        }
        result.success
    }

    /// Copy the finished shared object to the output directory.
    fn collect(&self, partition: usize) -> bool {
        let from = self.layout.shared_object(partition);
        let to = self.layout.final_object(partition);
        let copied = fs::create_dir_all(self.layout.output_dir()).and_then(|_| fs::copy(&from, &to));
        match copied {
            Ok(_) => true,
            Err(err) => {
                log::error!(
                    "cannot copy {} to {}: {}",
                    from.display(),
                    to.display(),
                    err
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_edges() {
        let deps = DependencyGraph::from_edges(0..3, &[(2, 0), (2, 1)]);
        assert_eq!(deps.dependencies(2), BTreeSet::from([0, 1]));
        assert!(deps.dependencies(0).is_empty());
        assert_eq!(deps.dependents(0), BTreeSet::from([2]));
        assert!(deps.dependencies(9).is_empty());
    }

    #[test]
    fn report_is_a_conjunction() {
        let report = LinkReport {
            results: BTreeMap::from([(0, true), (1, false), (2, true)]),
        };
        assert!(!report.success());
        assert_eq!(report.failed(), vec![1]);
    }

    #[test]
    fn sink_keeps_entries_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("link.log");
        let sink = LogSink::open(&path).unwrap();
        sink.record(3, LinkPhase::Standalone, "ok");
        sink.record(3, LinkPhase::Resolved, "FAILED\nundefined symbol: foo\n");
        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].ends_with("partition 3 phase1: ok"));
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("undefined symbol: foo"));
    }
}
