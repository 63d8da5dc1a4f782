//! Mutually recursive function groups.
//!
//! Strongly connected components over direct call edges (Tarjan). Only
//! components with more than one member are kept; they must never be split
//! across partitions.
use std::collections::HashMap;

use petgraph::{algo::tarjan_scc, prelude::DiGraphMap};

use crate::{
    graph::ReferenceGraph,
    symbols::{SymbolId, SymbolTable},
};

#[derive(Debug, Clone, Default)]
pub struct CyclicGroups {
    groups: Vec<Vec<SymbolId>>,
    membership: HashMap<SymbolId, usize>,
}

impl CyclicGroups {
    pub fn detect(graph: &ReferenceGraph, table: &SymbolTable) -> Self {
        let mut calls: DiGraphMap<SymbolId, ()> = DiGraphMap::new();
        for (id, _) in table.functions() {
            calls.add_node(id);
            for callee in graph.direct_callees(id) {
                calls.add_edge(id, *callee, ());
            }
        }

        let mut groups: Vec<Vec<SymbolId>> = tarjan_scc(&calls)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|mut component| {
                component.sort_unstable();
                component
            })
            .collect();
        groups.sort_unstable();

        let mut membership = HashMap::new();
        for (index, group) in groups.iter().enumerate() {
            for member in group {
                membership.insert(*member, index);
            }
        }

        log::debug!("found {} cyclic groups", groups.len());
        Self { groups, membership }
    }

    /// Build from explicit groups.
    pub fn from_groups(groups: Vec<Vec<SymbolId>>) -> Self {
        let mut membership = HashMap::new();
        for (index, group) in groups.iter().enumerate() {
            for member in group {
                membership.insert(*member, index);
            }
        }
        Self { groups, membership }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> &[Vec<SymbolId>] {
        &self.groups
    }

    pub fn group_of(&self, id: SymbolId) -> Option<usize> {
        self.membership.get(&id).copied()
    }

    /// Every member of the group containing `id`, `id` included. Empty when
    /// `id` is in no group.
    pub fn neighbours(&self, id: SymbolId) -> &[SymbolId] {
        match self.group_of(id) {
            Some(index) => &self.groups[index],
            None => &[],
        }
    }
}
