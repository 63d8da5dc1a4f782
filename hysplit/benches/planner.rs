use criterion::{Criterion, black_box, criterion_group, criterion_main};

use hysplit::{
    config::PlannerConfig,
    cycles::CyclicGroups,
    graph::ReferenceGraph,
    planner::{Planner, PlannerState},
    symbols::SymbolTable,
    tests_utils::{random_call_graph, scale_module},
};

fn bench_indexing(c: &mut Criterion) {
    let module = scale_module();

    c.bench_function("symbol_table_scale", |b| {
        b.iter(|| black_box(SymbolTable::build(&module)));
    });

    let table = SymbolTable::build(&module);
    c.bench_function("reference_graph_scale", |b| {
        b.iter(|| black_box(ReferenceGraph::build(Some(&module), &table)));
    });

    let graph = ReferenceGraph::build(Some(&module), &table);
    c.bench_function("cycles_scale", |b| {
        b.iter(|| black_box(CyclicGroups::detect(&graph, &table)));
    });
}

fn bench_planning(c: &mut Criterion) {
    let config = PlannerConfig::default();

    for (name, module) in [
        ("plan_scale", scale_module()),
        // Dense random graph: large cyclic groups, deep closures.
        ("plan_random_dense", random_call_graph(0x42, 5_000, 20_000)),
    ] {
        let table = SymbolTable::build(&module);
        let graph = ReferenceGraph::build(Some(&module), &table);
        let cycles = CyclicGroups::detect(&graph, &table);
        let planner = Planner::new(&table, &graph, &cycles, &config);

        c.bench_function(name, |b| {
            b.iter(|| {
                let mut state = PlannerState::new(&table);
                black_box(planner.plan(&mut state));
            });
        });
    }
}

criterion_group!(benches, bench_indexing, bench_planning);
criterion_main!(benches);
