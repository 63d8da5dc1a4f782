//! Call and reference graph over the symbol table.
//!
//! Edges point from user to used symbol. Four relations are kept apart:
//!
//! - `callees`/`callers`: functions a symbol calls or otherwise references
//!   (function pointers stored, passed or placed in constant tables). A
//!   function found through a global initializer is referenced by that
//!   global, not by the functions reading the global. Degree counts use this
//!   relation only.
//! - `direct`: direct `call`/`invoke` targets, the input of cycle detection.
//! - `personality`: personality routines of a function.
//! - `global_uses`/`global_users`: global variables referenced by a symbol.
//!
//! Indirect calls through a local value have no edge.
use std::collections::BTreeSet;

use hyir::{module::Module, value::Value};

use crate::symbols::{SymbolId, SymbolTable};

#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    callees: Vec<BTreeSet<SymbolId>>,
    callers: Vec<BTreeSet<SymbolId>>,
    direct: Vec<BTreeSet<SymbolId>>,
    personality: Vec<BTreeSet<SymbolId>>,
    personality_users: Vec<BTreeSet<SymbolId>>,
    global_uses: Vec<BTreeSet<SymbolId>>,
    global_users: Vec<BTreeSet<SymbolId>>,
}

impl ReferenceGraph {
    fn empty(len: usize) -> Self {
        Self {
            callees: vec![BTreeSet::new(); len],
            callers: vec![BTreeSet::new(); len],
            direct: vec![BTreeSet::new(); len],
            personality: vec![BTreeSet::new(); len],
            personality_users: vec![BTreeSet::new(); len],
            global_uses: vec![BTreeSet::new(); len],
            global_users: vec![BTreeSet::new(); len],
        }
    }

    /// Scan `module` once and build every relation.
    ///
    /// A missing module is logged and yields a graph without edges.
    pub fn build(module: Option<&Module>, table: &SymbolTable) -> Self {
        let mut graph = Self::empty(table.len());
        let Some(module) = module else {
            log::error!("no module loaded; the reference graph is empty");
            return graph;
        };
        if table.is_empty() {
            log::warn!("symbol table is empty; nothing to connect");
            return graph;
        }

        // Functions reachable from each global initializer, through other
        // globals included.
        let mut data_targets: Vec<BTreeSet<SymbolId>> = vec![BTreeSet::new(); table.len()];
        for (id, record) in table.globals() {
            let global = &module.globals[record.item];
            let Some(init) = &global.initializer else {
                continue;
            };
            init.for_each_symbol(|name| {
                if let Some(used) = table.lookup(name) {
                    if table.get(used).is_global() && used != id {
                        graph.add_global_use(id, used);
                    }
                }
            });
            data_targets[id.index()] = reachable_functions(module, table, init);
        }

        for (global, targets) in data_targets.into_iter().enumerate() {
            let global = SymbolId::new(global);
            for target in targets {
                graph.add_reference(global, target);
            }
        }

        for (id, record) in table.functions() {
            let function = &module.functions[record.item];

            for call in function.calls() {
                if let Some(target) = call.callee.direct_symbol().and_then(|n| table.lookup(n)) {
                    if table.get(target).is_function() && target != id {
                        graph.direct[id.index()].insert(target);
                    }
                }
            }

            for operand in function.operands() {
                operand.for_each_symbol(|name| {
                    let Some(used) = table.lookup(name) else {
                        return;
                    };
                    if table.get(used).is_function() {
                        graph.add_reference(id, used);
                    } else {
                        graph.add_global_use(id, used);
                    }
                });
            }

            if let Some(personality) = &function.personality {
                personality.value.for_each_symbol(|name| {
                    if let Some(routine) = table.lookup(name) {
                        if table.get(routine).is_function() && routine != id {
                            graph.personality[id.index()].insert(routine);
                            graph.personality_users[routine.index()].insert(id);
                        }
                    }
                });
            }
        }

        log::debug!(
            "reference graph: {} symbols, {} reference edges",
            table.len(),
            graph.edge_count()
        );
        graph
    }

    fn add_reference(&mut self, user: SymbolId, used: SymbolId) {
        if user == used {
            return;
        }
        self.callees[user.index()].insert(used);
        self.callers[used.index()].insert(user);
    }

    fn add_global_use(&mut self, user: SymbolId, global: SymbolId) {
        self.global_uses[user.index()].insert(global);
        self.global_users[global.index()].insert(user);
    }

    pub fn len(&self) -> usize {
        self.callees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callees.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.callees.iter().map(BTreeSet::len).sum()
    }

    pub fn callees(&self, id: SymbolId) -> &BTreeSet<SymbolId> {
        &self.callees[id.index()]
    }

    pub fn callers(&self, id: SymbolId) -> &BTreeSet<SymbolId> {
        &self.callers[id.index()]
    }

    pub fn direct_callees(&self, id: SymbolId) -> &BTreeSet<SymbolId> {
        &self.direct[id.index()]
    }

    pub fn personality(&self, id: SymbolId) -> &BTreeSet<SymbolId> {
        &self.personality[id.index()]
    }

    pub fn personality_users(&self, id: SymbolId) -> &BTreeSet<SymbolId> {
        &self.personality_users[id.index()]
    }

    pub fn global_uses(&self, id: SymbolId) -> &BTreeSet<SymbolId> {
        &self.global_uses[id.index()]
    }

    pub fn global_users(&self, id: SymbolId) -> &BTreeSet<SymbolId> {
        &self.global_users[id.index()]
    }

    /// Callers plus callees.
    pub fn degree(&self, id: SymbolId) -> usize {
        self.callers(id).len() + self.callees(id).len()
    }

    /// Every symbol `id` needs at link time.
    pub fn references(&self, id: SymbolId) -> impl Iterator<Item = SymbolId> + '_ {
        self.callees(id)
            .iter()
            .chain(self.personality(id))
            .chain(self.global_uses(id))
            .copied()
    }

    /// Every symbol that needs `id` at link time.
    pub fn referrers(&self, id: SymbolId) -> impl Iterator<Item = SymbolId> + '_ {
        self.callers(id)
            .iter()
            .chain(self.personality_users(id))
            .chain(self.global_users(id))
            .copied()
    }
}

/// Functions referenced by `init`, following initializers of the globals it
/// references. Worklist with a visited set, so cyclic and deep constant
/// graphs are fine.
fn reachable_functions(module: &Module, table: &SymbolTable, init: &Value) -> BTreeSet<SymbolId> {
    let mut functions = BTreeSet::new();
    let mut visited = BTreeSet::new();
    let mut worklist: Vec<&Value> = vec![init];

    while let Some(value) = worklist.pop() {
        value.for_each_symbol(|name| {
            let Some(id) = table.lookup(name) else {
                return;
            };
            let record = table.get(id);
            if record.is_function() {
                functions.insert(id);
            } else if visited.insert(id) {
                if let Some(next) = &module.globals[record.item].initializer {
                    worklist.push(next);
                }
            }
        });
    }
    functions
}

#[cfg(test)]
mod tests {
    use hyir::parser::parse_module;

    use super::*;

    const SOURCE: &str = r#"
@table = internal constant [2 x ptr] [ptr @cb, ptr @other]
@other = internal global ptr @deep
@plain = global i32 0

define void @main() personality ptr @pers {
entry:
  call @a()
  %fp: ptr = load ptr @table
  call %fp()
  ret void
}

define internal void @a() {
entry:
  call bitcast (ptr @b to ptr)()
  call @a()
  store ptr @c, ptr @plain
  ret void
}

define internal void @b() {
entry:
  ret void
}

define internal void @c() {
entry:
  ret void
}

define internal void @cb() {
entry:
  ret void
}

define internal void @deep() {
entry:
  ret void
}

define void @pers() {
entry:
  unreachable
}
"#;

    fn id(table: &SymbolTable, name: &str) -> SymbolId {
        table.lookup_str(name).unwrap()
    }

    fn names(table: &SymbolTable, set: &BTreeSet<SymbolId>) -> Vec<String> {
        set.iter().map(|id| table.get(*id).name.raw()).collect()
    }

    #[test]
    fn calls_stores_and_casts_become_edges() {
        let module = parse_module(SOURCE).unwrap();
        let table = SymbolTable::build(&module);
        let graph = ReferenceGraph::build(Some(&module), &table);

        let a = id(&table, "a");
        assert_eq!(names(&table, graph.callees(a)), vec!["b", "c"]);
        assert_eq!(names(&table, graph.direct_callees(a)), vec!["b"]);
        assert_eq!(names(&table, graph.callers(a)), vec!["main"]);
        assert_eq!(names(&table, graph.global_uses(a)), vec!["plain"]);
    }

    #[test]
    fn initializers_are_followed_transitively() {
        let module = parse_module(SOURCE).unwrap();
        let table = SymbolTable::build(&module);
        let graph = ReferenceGraph::build(Some(&module), &table);

        let table_id = id(&table, "table");
        assert_eq!(names(&table, graph.callees(table_id)), vec!["cb", "deep"]);
        assert_eq!(names(&table, graph.global_uses(table_id)), vec!["other"]);

        let main = id(&table, "main");
        assert_eq!(names(&table, graph.callees(main)), vec!["a"]);
        assert_eq!(names(&table, graph.global_uses(main)), vec!["table"]);
        assert_eq!(names(&table, graph.callers(id(&table, "cb"))), vec!["table"]);
        assert_eq!(
            names(&table, graph.callers(id(&table, "deep"))),
            vec!["table", "other"]
        );
    }

    #[test]
    fn reading_a_table_does_not_reference_its_entries() {
        let module = parse_module(
            r#"
@table = internal constant [1 x ptr] [ptr @t]

define internal void @t() {
entry:
  ret void
}

define void @u0() {
entry:
  %p: ptr = load ptr @table
  ret void
}

define void @u1() {
entry:
  %p: ptr = load ptr @table
  ret void
}
"#,
        )
        .unwrap();
        let table = SymbolTable::build(&module);
        let graph = ReferenceGraph::build(Some(&module), &table);

        let t = id(&table, "t");
        assert_eq!(names(&table, graph.callers(t)), vec!["table"]);
        assert_eq!(graph.degree(t), 1);
        let u0 = id(&table, "u0");
        assert!(graph.callees(u0).is_empty());
        assert_eq!(names(&table, graph.global_users(id(&table, "table"))), vec!["u0", "u1"]);
    }

    #[test]
    fn personality_is_a_separate_relation() {
        let module = parse_module(SOURCE).unwrap();
        let table = SymbolTable::build(&module);
        let graph = ReferenceGraph::build(Some(&module), &table);

        let main = id(&table, "main");
        let pers = id(&table, "pers");
        assert!(graph.personality(main).contains(&pers));
        assert!(graph.personality_users(pers).contains(&main));
        assert!(!graph.callees(main).contains(&pers));
        assert_eq!(graph.degree(pers), 0);
    }

    #[test]
    fn missing_module_gives_an_edgeless_graph() {
        let module = parse_module(SOURCE).unwrap();
        let table = SymbolTable::build(&module);
        let graph = ReferenceGraph::build(None, &table);
        assert_eq!(graph.len(), table.len());
        assert_eq!(graph.edge_count(), 0);
    }
}
