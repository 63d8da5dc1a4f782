use std::{
    fs,
    path::{Path, PathBuf},
};

use hysplit::{
    MaterializeMode, SplitConfig, SplitError, Splitter,
    config::Layout,
    link::{
        CompletionSignal, DependencyGraph, LinkBatch, LinkDriver, LinkEvent, LinkJob, LinkOutput,
        LinkPhase, LogSink, ResponseTemplate,
    },
    tests_utils::random_call_graph,
};
use parking_lot::Mutex;

/// Writes whatever `-o` names and succeeds, except for the listed failures.
struct FakeLinker {
    fail: Vec<(usize, LinkPhase)>,
    calls: Mutex<Vec<(usize, LinkPhase, String)>>,
}

impl FakeLinker {
    fn new(fail: Vec<(usize, LinkPhase)>) -> Self {
        Self {
            fail,
            calls: Mutex::new(Vec::new()),
        }
    }
}

fn output_of(response: &str) -> Option<PathBuf> {
    response
        .lines()
        .find_map(|line| line.strip_prefix("-o "))
        .map(PathBuf::from)
}

impl LinkDriver for FakeLinker {
    fn link(&self, partition: usize, phase: LinkPhase, response: &Path) -> LinkOutput {
        let text = fs::read_to_string(response).unwrap();
        self.calls.lock().push((partition, phase, text.clone()));
        if self.fail.contains(&(partition, phase)) {
            return LinkOutput {
                success: false,
                log: "ld: error: undefined symbol".to_string(),
            };
        }
        if let Some(output) = output_of(&text) {
            fs::write(output, b"\x7fELF").unwrap();
        }
        LinkOutput {
            success: true,
            log: String::new(),
        }
    }
}

/// Holds phase 1 of partitions 0 and 1 until partition 2 has run its own
/// phase 1, so partition 2 is guaranteed to reach its wait early.
struct GatedLinker {
    inner: FakeLinker,
    release: CompletionSignal,
}

impl LinkDriver for GatedLinker {
    fn link(&self, partition: usize, phase: LinkPhase, response: &Path) -> LinkOutput {
        match (partition, phase) {
            (2, LinkPhase::Standalone) => {
                let output = self.inner.link(partition, phase, response);
                self.release.fire();
                output
            }
            (0 | 1, LinkPhase::Standalone) => {
                self.release.wait();
                self.inner.link(partition, phase, response)
            }
            _ => self.inner.link(partition, phase, response),
        }
    }
}

/// Crashes during phase 1 of one partition.
struct CrashingLinker {
    inner: FakeLinker,
    crash: usize,
}

impl LinkDriver for CrashingLinker {
    fn link(&self, partition: usize, phase: LinkPhase, response: &Path) -> LinkOutput {
        if partition == self.crash && phase == LinkPhase::Standalone {
            panic!("linker crashed on partition {}", partition);
        }
        self.inner.link(partition, phase, response)
    }
}

fn jobs(dir: &Path, count: usize) -> Vec<LinkJob> {
    (0..count)
        .map(|partition| LinkJob {
            partition,
            artifact: dir.join(format!("p_{}.hyir", partition)),
            has_runtime_support: false,
        })
        .collect()
}

fn position(events: &[LinkEvent], wanted: LinkEvent) -> usize {
    events
        .iter()
        .position(|event| *event == wanted)
        .unwrap_or_else(|| panic!("{:?} never happened", wanted))
}

#[test]
fn phase_two_waits_for_every_dependency_signal() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::new(dir.path(), "p", dir.path().join("out"));
    let template = ResponseTemplate::minimal();
    let deps = DependencyGraph::from_edges(0..3, &[(2, 0), (2, 1)]);
    let sink = LogSink::in_memory();
    let batch = LinkBatch {
        layout: &layout,
        template: &template,
        dependencies: &deps,
        source: None,
        runtime: None,
        sink: &sink,
    };
    let driver = GatedLinker {
        inner: FakeLinker::new(Vec::new()),
        release: CompletionSignal::new(),
    };

    let events = Mutex::new(Vec::new());
    let observer = |event: LinkEvent| events.lock().push(event);
    let report = batch.run(&jobs(dir.path(), 3), &driver, Some(&observer));
    assert!(report.success());

    let events = events.into_inner();
    let phase2 = position(&events, LinkEvent::Phase2Started { partition: 2 });
    for dep in [0, 1] {
        assert!(position(&events, LinkEvent::Phase1Signalled { partition: dep }) < phase2);
    }

    for partition in 0..3 {
        assert!(layout.final_object(partition).exists());
    }

    let calls = driver.inner.calls.lock();
    let (_, _, response) = calls
        .iter()
        .find(|(p, phase, _)| *p == 2 && *phase == LinkPhase::Resolved)
        .unwrap();
    let p0 = layout.phase1_object(0).display().to_string();
    let p1 = layout.phase1_object(1).display().to_string();
    assert!(response.lines().any(|line| line == p0));
    assert!(response.lines().any(|line| line == p1));
}

#[test]
fn failed_dependency_still_releases_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::new(dir.path(), "p", dir.path().join("out"));
    let template = ResponseTemplate::minimal();
    let deps = DependencyGraph::from_edges(0..3, &[(2, 0), (2, 1)]);
    let sink = LogSink::in_memory();
    let batch = LinkBatch {
        layout: &layout,
        template: &template,
        dependencies: &deps,
        source: None,
        runtime: None,
        sink: &sink,
    };
    let driver = FakeLinker::new(vec![(0, LinkPhase::Standalone)]);

    let report = batch.run(&jobs(dir.path(), 3), &driver, None);
    assert!(!report.success());
    assert_eq!(report.failed(), vec![0]);
    assert!(report.results[&2]);

    // Partition 0 still ran its second phase.
    let calls = driver.calls.lock();
    assert!(calls
        .iter()
        .any(|(p, phase, _)| *p == 0 && *phase == LinkPhase::Resolved));
    assert!(sink
        .entries()
        .iter()
        .any(|entry| entry.contains("partition 0 phase1: FAILED")));
}

#[test]
fn crashed_dependency_still_releases_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::new(dir.path(), "p", dir.path().join("out"));
    let template = ResponseTemplate::minimal();
    let deps = DependencyGraph::from_edges(0..3, &[(2, 0)]);
    let sink = LogSink::in_memory();
    let batch = LinkBatch {
        layout: &layout,
        template: &template,
        dependencies: &deps,
        source: None,
        runtime: None,
        sink: &sink,
    };
    let driver = CrashingLinker {
        inner: FakeLinker::new(Vec::new()),
        crash: 0,
    };

    let report = batch.run(&jobs(dir.path(), 3), &driver, None);
    assert_eq!(report.failed(), vec![0]);
    assert!(report.results[&1]);
    assert!(report.results[&2]);

    let calls = driver.inner.calls.lock();
    assert!(calls
        .iter()
        .any(|(p, phase, _)| *p == 2 && *phase == LinkPhase::Resolved));
    assert!(!calls.iter().any(|(p, _, _)| *p == 0));
}

#[test]
fn dependencies_outside_the_batch_are_not_awaited() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::new(dir.path(), "p", dir.path().join("out"));
    let template = ResponseTemplate::minimal();
    let deps = DependencyGraph::from_edges(0..3, &[(1, 0), (1, 2)]);
    let sink = LogSink::in_memory();
    let batch = LinkBatch {
        layout: &layout,
        template: &template,
        dependencies: &deps,
        source: None,
        runtime: None,
        sink: &sink,
    };
    let driver = FakeLinker::new(Vec::new());

    let only_one = vec![LinkJob {
        partition: 1,
        artifact: dir.path().join("p_1.hyir"),
        has_runtime_support: false,
    }];
    let report = batch.run(&only_one, &driver, None);
    assert!(report.success());
}

#[test]
fn split_and_link_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = SplitConfig {
        mode: MaterializeMode::Clone,
        workspace: dir.path().join("work"),
        output_dir: dir.path().join("out"),
        output_prefix: "big".to_string(),
        ..SplitConfig::default()
    };
    let mut splitter = Splitter::from_module(random_call_graph(9, 300, 450), config);
    assert!(splitter.split().unwrap());

    let driver = FakeLinker::new(Vec::new());
    assert!(splitter.link(&driver).unwrap());

    let layout = splitter.layout();
    for partition in splitter.partitions() {
        assert!(layout.final_object(partition.id).exists());
        if !partition.is_globals() {
            assert!(partition.dependencies.contains(&0));
        }
    }
    assert!(layout.link_log().exists());
    assert_eq!(
        driver.calls.lock().len(),
        2 * splitter.partitions().len()
    );
}

#[test]
fn linking_nothing_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = SplitConfig {
        workspace: dir.path().join("work"),
        ..SplitConfig::default()
    };
    let mut splitter = Splitter::from_module(hyir::module::Module::default(), config);
    assert!(splitter.split().unwrap());
    let err = splitter.link(&FakeLinker::new(Vec::new())).unwrap_err();
    assert!(matches!(err, SplitError::EmptyModule));
}
