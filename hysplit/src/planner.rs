//! Partition planning.
//!
//! An ordered list of selection policies. Each policy picks seeds among
//! symbols not yet processed, expands them into a closed set, and emits at
//! most one partition. Once emitted, members are marked processed and can
//! never be picked again.
use std::{
    collections::{BTreeSet, VecDeque},
    path::PathBuf,
};

use bit_set::BitSet;

use crate::{
    config::PlannerConfig,
    cycles::CyclicGroups,
    graph::ReferenceGraph,
    symbols::{SymbolId, SymbolTable},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    /// Every defined global variable.
    Globals,
    /// Externally visible functions.
    External,
    /// Functions with more callers than the configured threshold.
    HighFanIn,
    /// Functions with neither callers nor callees.
    Isolated,
    /// Slice `bucket` of the degree-ranked remainder.
    Ranked { bucket: usize },
}

impl std::fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionKind::Globals => f.write_str("globals"),
            PartitionKind::External => f.write_str("external"),
            PartitionKind::HighFanIn => f.write_str("high-fan-in"),
            PartitionKind::Isolated => f.write_str("isolated"),
            PartitionKind::Ranked { bucket } => write!(f, "ranked-{}", bucket),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub id: usize,
    pub kind: PartitionKind,
    pub members: BTreeSet<SymbolId>,
    /// Set once the partition has been written out.
    pub artifact: Option<PathBuf>,
    /// Partitions this one needs at link time.
    pub dependencies: BTreeSet<usize>,
    /// Defines the configured runtime-support routine.
    pub has_runtime_support: bool,
}

impl Partition {
    pub fn new(id: usize, kind: PartitionKind, members: BTreeSet<SymbolId>) -> Self {
        Self {
            id,
            kind,
            members,
            artifact: None,
            dependencies: BTreeSet::new(),
            has_runtime_support: false,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: SymbolId) -> bool {
        self.members.contains(&id)
    }

    pub fn is_globals(&self) -> bool {
        self.kind == PartitionKind::Globals
    }
}

/// Assignment state threaded through the planner.
#[derive(Debug, Clone)]
pub struct PlannerState {
    processed: BitSet,
    assignment: Vec<Option<usize>>,
}

impl PlannerState {
    /// Declarations start out processed; only definitions are assigned.
    pub fn new(table: &SymbolTable) -> Self {
        let mut processed = BitSet::with_capacity(table.len());
        for (id, record) in table.iter() {
            if record.is_declaration {
                processed.insert(id.index());
            }
        }
        Self {
            processed,
            assignment: vec![None; table.len()],
        }
    }

    pub fn is_processed(&self, id: SymbolId) -> bool {
        self.processed.contains(id.index())
    }

    pub fn partition_of(&self, id: SymbolId) -> Option<usize> {
        self.assignment.get(id.index()).copied().flatten()
    }

    fn assign(&mut self, members: &BTreeSet<SymbolId>, partition: usize) {
        for member in members {
            self.processed.insert(member.index());
            self.assignment[member.index()] = Some(partition);
        }
    }

    /// Number of symbols currently assigned to a partition.
    pub fn assigned(&self) -> usize {
        self.assignment.iter().filter(|a| a.is_some()).count()
    }
}

pub struct Planner<'a> {
    table: &'a SymbolTable,
    graph: &'a ReferenceGraph,
    cycles: &'a CyclicGroups,
    config: &'a PlannerConfig,
}

impl<'a> Planner<'a> {
    pub fn new(
        table: &'a SymbolTable,
        graph: &'a ReferenceGraph,
        cycles: &'a CyclicGroups,
        config: &'a PlannerConfig,
    ) -> Self {
        Self {
            table,
            graph,
            cycles,
            config,
        }
    }

    /// Run every policy in order and return the emitted partitions, with
    /// dense ids in emission order.
    pub fn plan(&self, state: &mut PlannerState) -> Vec<Partition> {
        let mut partitions = Vec::new();

        let globals: BTreeSet<SymbolId> = self
            .table
            .globals()
            .map(|(id, _)| id)
            .filter(|id| !state.is_processed(*id))
            .collect();
        self.emit(&mut partitions, state, PartitionKind::Globals, globals);

        let external: BTreeSet<SymbolId> = self
            .unprocessed_functions(state)
            .filter(|id| self.table.get(*id).linkage.is_externally_visible())
            .collect();
        let external = self.cyclic_closure(&external, state);
        self.emit(&mut partitions, state, PartitionKind::External, external);

        let threshold = self.config.high_fan_in_threshold;
        let hubs: BTreeSet<SymbolId> = self
            .unprocessed_functions(state)
            .filter(|id| self.graph.callers(*id).len() > threshold)
            .collect();
        let hubs = self.expand(&hubs, state);
        self.emit(&mut partitions, state, PartitionKind::HighFanIn, hubs);

        let isolated: BTreeSet<SymbolId> = self
            .unprocessed_functions(state)
            .filter(|id| self.graph.degree(*id) == 0)
            .collect();
        self.emit(&mut partitions, state, PartitionKind::Isolated, isolated);

        let ranked = self.ranked(state);
        for (bucket, (start, end)) in self.config.bucket_ranges().into_iter().enumerate() {
            if start >= ranked.len() {
                break;
            }
            let end = end.unwrap_or(ranked.len()).min(ranked.len());
            let seeds: BTreeSet<SymbolId> = ranked[start..end]
                .iter()
                .copied()
                .filter(|id| !state.is_processed(*id))
                .collect();
            let members = self.expand(&seeds, state);
            self.emit(&mut partitions, state, PartitionKind::Ranked { bucket }, members);
        }

        log::info!(
            "planned {} partitions over {} symbols",
            partitions.len(),
            state.assigned()
        );
        partitions
    }

    fn emit(
        &self,
        partitions: &mut Vec<Partition>,
        state: &mut PlannerState,
        kind: PartitionKind,
        members: BTreeSet<SymbolId>,
    ) {
        if members.is_empty() {
            log::debug!("no symbols for a {} partition", kind);
            return;
        }
        let id = partitions.len();
        state.assign(&members, id);
        log::debug!("partition {} ({}): {} symbols", id, kind, members.len());
        partitions.push(Partition::new(id, kind, members));
    }

    fn unprocessed_functions<'s>(
        &'s self,
        state: &'s PlannerState,
    ) -> impl Iterator<Item = SymbolId> + 's {
        self.table
            .functions()
            .map(|(id, _)| id)
            .filter(move |id| !state.is_processed(*id))
    }

    /// Unprocessed functions by descending degree, ties by ascending id.
    fn ranked(&self, state: &PlannerState) -> Vec<SymbolId> {
        let mut ranked: Vec<SymbolId> = self.unprocessed_functions(state).collect();
        ranked.sort_by_key(|id| (std::cmp::Reverse(self.graph.degree(*id)), *id));
        ranked
    }

    /// Breadth-first closure of `seeds` under the callee relation, restricted
    /// to unprocessed symbols.
    pub fn callee_closure(
        &self,
        seeds: &BTreeSet<SymbolId>,
        state: &PlannerState,
    ) -> BTreeSet<SymbolId> {
        let mut closed: BTreeSet<SymbolId> = seeds
            .iter()
            .copied()
            .filter(|id| !state.is_processed(*id))
            .collect();
        let mut queue: VecDeque<SymbolId> = closed.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            for callee in self.graph.callees(id) {
                if !state.is_processed(*callee) && closed.insert(*callee) {
                    queue.push_back(*callee);
                }
            }
        }
        closed
    }

    /// Add every unprocessed member of every cyclic group touched by `seeds`.
    pub fn cyclic_closure(
        &self,
        seeds: &BTreeSet<SymbolId>,
        state: &PlannerState,
    ) -> BTreeSet<SymbolId> {
        let mut closed: BTreeSet<SymbolId> = seeds
            .iter()
            .copied()
            .filter(|id| !state.is_processed(*id))
            .collect();
        let mut queue: VecDeque<SymbolId> = closed.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            for neighbour in self.cycles.neighbours(id) {
                if !state.is_processed(*neighbour) && closed.insert(*neighbour) {
                    queue.push_back(*neighbour);
                }
            }
        }
        closed
    }

    /// Callee closure then cyclic closure, repeated until neither adds
    /// anything.
    pub fn expand(&self, seeds: &BTreeSet<SymbolId>, state: &PlannerState) -> BTreeSet<SymbolId> {
        let mut current = self.callee_closure(seeds, state);
        loop {
            let grouped = self.cyclic_closure(&current, state);
            if grouped.len() == current.len() {
                return current;
            }
            current = self.callee_closure(&grouped, state);
        }
    }
}

/// Flag the partition defining `symbol`, if any.
pub fn mark_runtime_support(partitions: &mut [Partition], table: &SymbolTable, symbol: &str) {
    let Some(id) = table.lookup_str(symbol) else {
        log::warn!("runtime symbol @{} is not in the module", symbol);
        return;
    };
    match partitions.iter_mut().find(|p| p.contains(id)) {
        Some(partition) => {
            log::info!("partition {} carries runtime symbol @{}", partition.id, symbol);
            partition.has_runtime_support = true;
        }
        None => log::warn!("runtime symbol @{} is not defined in any partition", symbol),
    }
}

#[cfg(test)]
mod tests {
    use hyir::parser::parse_module;

    use super::*;

    fn plan(source: &str, config: &PlannerConfig) -> (SymbolTable, Vec<Partition>) {
        let module = parse_module(source).unwrap();
        let table = SymbolTable::build(&module);
        let graph = ReferenceGraph::build(Some(&module), &table);
        let cycles = CyclicGroups::detect(&graph, &table);
        let mut state = PlannerState::new(&table);
        let partitions = Planner::new(&table, &graph, &cycles, config).plan(&mut state);
        (table, partitions)
    }

    fn names(table: &SymbolTable, partition: &Partition) -> Vec<String> {
        partition
            .members
            .iter()
            .map(|id| table.get(*id).name.raw())
            .collect()
    }

    const SOURCE: &str = r#"
@g = internal global i32 0
@ext = external global i32

declare void @puts()

define void @main() {
entry:
  call @hub()
  ret void
}

define internal void @u1() {
entry:
  call @hub()
  ret void
}

define internal void @u2() {
entry:
  call @hub()
  call @x()
  ret void
}

define internal void @hub() {
entry:
  call @leaf()
  call @puts()
  ret void
}

define internal void @leaf() {
entry:
  ret void
}

define internal void @x() {
entry:
  call @y()
  ret void
}

define internal void @y() {
entry:
  call @x()
  ret void
}

define internal void @alone() {
entry:
  ret void
}
"#;

    #[test]
    fn policies_run_in_order() {
        let config = PlannerConfig {
            high_fan_in_threshold: 2,
            bucket_bounds: vec![1],
        };
        let (table, partitions) = plan(SOURCE, &config);

        let kinds: Vec<PartitionKind> = partitions.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                PartitionKind::Globals,
                PartitionKind::External,
                PartitionKind::HighFanIn,
                PartitionKind::Isolated,
                PartitionKind::Ranked { bucket: 0 },
                PartitionKind::Ranked { bucket: 1 },
            ]
        );
        assert_eq!(names(&table, &partitions[0]), vec!["g"]);
        assert_eq!(names(&table, &partitions[1]), vec!["main"]);
        assert_eq!(names(&table, &partitions[2]), vec!["hub", "leaf"]);
        assert_eq!(names(&table, &partitions[3]), vec!["alone"]);
        // x ranks first (u2 and y call it, it calls y) and pulls in its cycle.
        assert_eq!(names(&table, &partitions[4]), vec!["x", "y"]);
        assert_eq!(names(&table, &partitions[5]), vec!["u1", "u2"]);
        assert!(partitions.iter().enumerate().all(|(i, p)| p.id == i));
    }

    #[test]
    fn declarations_are_never_assigned() {
        let (table, partitions) = plan(SOURCE, &PlannerConfig::default());
        for name in ["puts", "ext"] {
            let id = table.lookup_str(name).unwrap();
            assert!(partitions.iter().all(|p| !p.contains(id)));
        }
    }

    #[test]
    fn runtime_support_flag_follows_the_symbol() {
        let (table, mut partitions) = plan(SOURCE, &PlannerConfig::default());
        mark_runtime_support(&mut partitions, &table, "leaf");
        let flagged: Vec<usize> = partitions
            .iter()
            .filter(|p| p.has_runtime_support)
            .map(|p| p.id)
            .collect();
        assert_eq!(flagged.len(), 1);
        let leaf = table.lookup_str("leaf").unwrap();
        assert!(partitions[flagged[0]].contains(leaf));

        mark_runtime_support(&mut partitions, &table, "missing");
        assert_eq!(partitions.iter().filter(|p| p.has_runtime_support).count(), 1);
    }
}
