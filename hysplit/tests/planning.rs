use std::collections::{BTreeMap, BTreeSet};

use hyir::{linkage::Linkage, module::Module, parser::parse_module};
use hysplit::{
    config::PlannerConfig,
    cycles::CyclicGroups,
    graph::ReferenceGraph,
    planner::{Partition, PartitionKind, Planner, PlannerState},
    symbols::{SymbolId, SymbolTable},
    tests_utils::{
        ModuleBuilder, SCALE_FUNCTIONS, SCALE_GLOBALS, SCALE_HUB_CALLERS, random_call_graph,
        scale_module,
    },
};

struct Planned {
    table: SymbolTable,
    graph: ReferenceGraph,
    cycles: CyclicGroups,
    state: PlannerState,
    partitions: Vec<Partition>,
}

fn plan(module: &Module, config: &PlannerConfig) -> Planned {
    let table = SymbolTable::build(module);
    let graph = ReferenceGraph::build(Some(module), &table);
    let cycles = CyclicGroups::detect(&graph, &table);
    let mut state = PlannerState::new(&table);
    let partitions = Planner::new(&table, &graph, &cycles, config).plan(&mut state);
    Planned {
        table,
        graph,
        cycles,
        state,
        partitions,
    }
}

fn assert_complete_and_disjoint(planned: &Planned) {
    let mut owner: BTreeMap<SymbolId, usize> = BTreeMap::new();
    for partition in &planned.partitions {
        assert!(!partition.is_empty(), "partition {} is empty", partition.id);
        for member in &partition.members {
            if let Some(previous) = owner.insert(*member, partition.id) {
                panic!(
                    "{} is in partitions {} and {}",
                    planned.table.get(*member).display_name,
                    previous,
                    partition.id
                );
            }
            assert_eq!(planned.state.partition_of(*member), Some(partition.id));
        }
    }

    for (id, record) in planned.table.iter() {
        assert_eq!(
            owner.contains_key(&id),
            record.is_definition(),
            "{} assignment does not match its definition flag",
            record.display_name
        );
    }
}

fn assert_groups_not_split(planned: &Planned) {
    for group in planned.cycles.groups() {
        let owners: BTreeSet<Option<usize>> = group
            .iter()
            .map(|member| planned.state.partition_of(*member))
            .collect();
        assert_eq!(owners.len(), 1, "cyclic group split across {:?}", owners);
    }
}

#[test]
fn random_graphs_are_partitioned_completely_and_disjointly() {
    let config = PlannerConfig {
        high_fan_in_threshold: 6,
        bucket_bounds: vec![5, 20, 60],
    };
    for seed in 0..16 {
        let module = random_call_graph(seed, 150, 300);
        let planned = plan(&module, &config);
        assert_complete_and_disjoint(&planned);
        assert_groups_not_split(&planned);
    }
}

#[test]
fn partitions_are_closed_under_callees_after_the_external_step() {
    let config = PlannerConfig {
        high_fan_in_threshold: 4,
        bucket_bounds: vec![10, 40],
    };
    for seed in 100..108 {
        let module = random_call_graph(seed, 120, 260);
        let planned = plan(&module, &config);

        for partition in &planned.partitions {
            if !matches!(
                partition.kind,
                PartitionKind::HighFanIn | PartitionKind::Ranked { .. }
            ) {
                continue;
            }
            for member in &partition.members {
                for callee in planned.graph.callees(*member) {
                    let owner = planned.state.partition_of(*callee);
                    assert!(
                        owner.is_some_and(|owner| owner <= partition.id),
                        "callee of partition {} lives in a later partition",
                        partition.id
                    );
                }
            }
        }
    }
}

#[test]
fn three_cycle_is_one_group_and_the_loner_is_in_none() {
    let module = ModuleBuilder::new()
        .function("a", Linkage::Internal, &["b"])
        .function("b", Linkage::Internal, &["c"])
        .function("c", Linkage::Internal, &["a"])
        .function("d", Linkage::Internal, &[])
        .build();
    let table = SymbolTable::build(&module);
    let graph = ReferenceGraph::build(Some(&module), &table);
    let cycles = CyclicGroups::detect(&graph, &table);

    assert_eq!(cycles.len(), 1);
    let group: BTreeSet<String> = cycles.groups()[0]
        .iter()
        .map(|id| table.get(*id).name.raw())
        .collect();
    assert_eq!(group, BTreeSet::from(["a", "b", "c"].map(String::from)));

    for name in ["a", "b", "c"] {
        assert_eq!(cycles.group_of(table.lookup_str(name).unwrap()), Some(0));
    }
    assert_eq!(cycles.group_of(table.lookup_str("d").unwrap()), None);
}

#[test]
fn callee_closure_is_idempotent() {
    let module = random_call_graph(42, 200, 500);
    let table = SymbolTable::build(&module);
    let graph = ReferenceGraph::build(Some(&module), &table);
    let cycles = CyclicGroups::detect(&graph, &table);
    let state = PlannerState::new(&table);
    let config = PlannerConfig::default();
    let planner = Planner::new(&table, &graph, &cycles, &config);

    for start in [0usize, 17, 99, 150] {
        let seeds: BTreeSet<SymbolId> = table
            .functions()
            .map(|(id, _)| id)
            .skip(start)
            .take(3)
            .collect();
        let closed = planner.callee_closure(&seeds, &state);
        assert!(closed.is_superset(&seeds));
        assert_eq!(planner.callee_closure(&closed, &state), closed);

        let expanded = planner.expand(&seeds, &state);
        assert_eq!(planner.expand(&expanded, &state), expanded);
    }
}

#[test]
fn scale_module_partitions_as_expected() {
    let module = scale_module();
    let planned = plan(&module, &PlannerConfig::default());
    assert_complete_and_disjoint(&planned);

    let count = |kind: fn(&PartitionKind) -> bool| {
        planned.partitions.iter().filter(|p| kind(&p.kind)).count()
    };
    assert_eq!(count(|k| *k == PartitionKind::Globals), 1);
    assert_eq!(count(|k| *k == PartitionKind::External), 1);
    assert_eq!(count(|k| *k == PartitionKind::HighFanIn), 1);
    assert_eq!(count(|k| *k == PartitionKind::Isolated), 0);
    assert_eq!(count(|k| matches!(k, PartitionKind::Ranked { .. })), 5);

    let names = |partition: &Partition| -> BTreeSet<String> {
        partition
            .members
            .iter()
            .map(|id| planned.table.get(*id).name.raw())
            .collect()
    };
    let globals = planned.partitions.iter().find(|p| p.is_globals()).unwrap();
    assert_eq!(globals.len(), SCALE_GLOBALS);
    let external = planned
        .partitions
        .iter()
        .find(|p| p.kind == PartitionKind::External)
        .unwrap();
    assert_eq!(names(external), BTreeSet::from(["main".to_string()]));
    let hub = planned
        .partitions
        .iter()
        .find(|p| p.kind == PartitionKind::HighFanIn)
        .unwrap();
    // The closure runs through the cycle and on into the pair it calls.
    assert_eq!(
        names(hub),
        BTreeSet::from(["hub", "c0", "c1", "c2", "f9443", "f9444"].map(String::from))
    );

    // Every remaining function has degree 1, so the ranking is id order:
    // f0, f1 .. f9442, then u0 .. u599. Each slice of the default ranges
    // grows by the partner of its last odd function.
    let pairs = |lo: usize, hi: usize| -> BTreeSet<String> {
        (lo..=hi).map(|i| format!("f{}", i)).collect()
    };
    let mut tail = pairs(8001, 9442);
    tail.extend((0..SCALE_HUB_CALLERS).map(|i| format!("u{}", i)));
    let expected = [
        pairs(0, 200),
        pairs(201, 1600),
        pairs(1601, 4000),
        pairs(4001, 8000),
        tail,
    ];
    let ranked: Vec<&Partition> = planned
        .partitions
        .iter()
        .filter(|p| matches!(p.kind, PartitionKind::Ranked { .. }))
        .collect();
    for (bucket, (partition, expected)) in ranked.iter().zip(&expected).enumerate() {
        assert_eq!(partition.kind, PartitionKind::Ranked { bucket });
        assert_eq!(&names(partition), expected, "bucket {}", bucket);
    }

    let functions: usize = planned
        .partitions
        .iter()
        .filter(|p| !p.is_globals())
        .map(Partition::len)
        .sum();
    assert_eq!(functions, SCALE_FUNCTIONS);
}

#[test]
fn readers_of_a_function_table_do_not_make_its_entries_hot() {
    let mut source = String::from("@table = internal constant [1 x ptr] [ptr @t]\n");
    source.push_str("define internal void @t() {\nentry:\n  ret void\n}\n");
    for i in 0..3 {
        source.push_str(&format!(
            "define internal void @u{}() {{\nentry:\n  %p: ptr = load ptr @table\n  ret void\n}}\n",
            i
        ));
    }
    let module = parse_module(&source).unwrap();
    let config = PlannerConfig {
        high_fan_in_threshold: 2,
        ..PlannerConfig::default()
    };
    let planned = plan(&module, &config);
    assert_complete_and_disjoint(&planned);

    assert!(planned
        .partitions
        .iter()
        .all(|p| p.kind != PartitionKind::HighFanIn));
    let t = planned.table.lookup_str("t").unwrap();
    let owner = planned.state.partition_of(t).unwrap();
    assert_eq!(
        planned.partitions[owner].kind,
        PartitionKind::Ranked { bucket: 0 }
    );
    for reader in ["u0", "u1", "u2"] {
        let id = planned.table.lookup_str(reader).unwrap();
        let owner = planned.state.partition_of(id).unwrap();
        assert_eq!(planned.partitions[owner].kind, PartitionKind::Isolated);
    }
}
