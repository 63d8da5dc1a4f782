//! Synthetic modules for tests and benchmarks.
use hyir::{
    linkage::Linkage,
    module::{BasicBlock, Call, Function, GlobalVariable, Instruction, Module, Terminator},
    name::SymbolName,
    types::Type,
    value::{AggregateKind, TypedValue, Value},
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Builds modules of `void()` functions that call each other.
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `@name = <linkage> global i32 0`
    pub fn global(mut self, name: &str, linkage: Linkage) -> Self {
        let mut global = GlobalVariable::new(name, Type::I32, Some(Value::Int(0)));
        global.attributes.linkage = linkage;
        self.module.globals.push(global);
        self
    }

    /// An internal constant array of pointers to `functions`.
    pub fn global_table(mut self, name: &str, functions: &[&str]) -> Self {
        let elements: Vec<TypedValue> = functions.iter().map(|f| TypedValue::symbol(*f)).collect();
        let mut global = GlobalVariable::new(
            name,
            Type::array(elements.len() as u64, Type::PTR),
            Some(Value::Aggregate {
                kind: AggregateKind::Array,
                elements,
            }),
        );
        global.attributes.linkage = Linkage::Internal;
        global.constant = true;
        self.module.globals.push(global);
        self
    }

    /// A function calling each of `callees` once, then returning.
    pub fn function(mut self, name: &str, linkage: Linkage, callees: &[&str]) -> Self {
        let mut function = Function::declaration(name, Type::Void, Vec::new());
        function.attributes.linkage = linkage;
        function.blocks.push(BasicBlock {
            label: "entry".to_string(),
            instructions: callees
                .iter()
                .map(|callee| Instruction::Call {
                    dest: None,
                    call: Call {
                        cconv: None,
                        callee: Value::global(*callee),
                        args: Default::default(),
                    },
                })
                .collect(),
            terminator: Terminator::Ret(None),
        });
        self.module.functions.push(function);
        self
    }

    pub fn declaration(mut self, name: &str) -> Self {
        self.module
            .functions
            .push(Function::declaration(name, Type::Void, Vec::new()));
        self
    }

    pub fn build(self) -> Module {
        self.module
    }
}

/// `count` internal functions `f0..` with random calls between them and
/// roughly one in ten external. Same seed, same module.
pub fn random_call_graph(seed: u64, count: usize, edges: usize) -> Module {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let names: Vec<String> = (0..count).map(|i| format!("f{}", i)).collect();
    let mut callees: Vec<Vec<&str>> = vec![Vec::new(); count];
    if count > 0 {
        for _ in 0..edges {
            let from = rng.random_range(0..count);
            let to = rng.random_range(0..count);
            callees[from].push(names[to].as_str());
        }
    }

    let mut builder = ModuleBuilder::new()
        .global("g0", Linkage::Internal)
        .global("g1", Linkage::External);
    for (i, name) in names.iter().enumerate() {
        let linkage = if rng.random_bool(0.1) {
            Linkage::External
        } else {
            Linkage::Internal
        };
        builder = builder.function(name, linkage, &callees[i]);
    }
    builder.build()
}

pub const SCALE_FUNCTIONS: usize = 10_050;
pub const SCALE_GLOBALS: usize = 30;
pub const SCALE_HUB_CALLERS: usize = 600;

/// A module with [`SCALE_FUNCTIONS`] defined functions:
///
/// - `main`, the only external function, calling `f0`;
/// - `hub`, called by `u0..u599`, calling into the cycle `c0 -> c1 -> c2 -> c0`,
///   whose `c2` also calls the last pair;
/// - pairs `f1 -> f2`, `f3 -> f4`, ... up to `f9443 -> f9444`;
///
/// plus [`SCALE_GLOBALS`] internal globals.
pub fn scale_module() -> Module {
    let mut builder = ModuleBuilder::new();
    for i in 0..SCALE_GLOBALS {
        builder = builder.global(&format!("g{}", i), Linkage::Internal);
    }

    builder = builder.function("main", Linkage::External, &["f0"]);
    builder = builder.function("f0", Linkage::Internal, &[]);
    for i in (1..9444).step_by(2) {
        let callee = format!("f{}", i + 1);
        builder = builder.function(&format!("f{}", i), Linkage::Internal, &[&callee]);
        builder = builder.function(&callee, Linkage::Internal, &[]);
    }

    builder = builder
        .function("hub", Linkage::Internal, &["c0"])
        .function("c0", Linkage::Internal, &["c1"])
        .function("c1", Linkage::Internal, &["c2"])
        .function("c2", Linkage::Internal, &["c0", "f9443"]);
    for i in 0..SCALE_HUB_CALLERS {
        builder = builder.function(&format!("u{}", i), Linkage::Internal, &["hub"]);
    }
    builder.build()
}

/// Raw names of the defined functions of `module`.
pub fn defined_function_names(module: &Module) -> Vec<SymbolName> {
    module.defined_functions().map(|f| f.name.clone()).collect()
}
