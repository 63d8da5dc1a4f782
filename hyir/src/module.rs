//! Module, function and global variable definitions.
//!
//! A [`Module`] is the unit that gets parsed, split, verified and written
//! back out. Functions without basic blocks and globals without an
//! initializer are declarations.
use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::{
    linkage::{CallingConvention, DllStorageClass, Linkage, Visibility},
    name::SymbolName,
    types::{FunctionType, Type},
    value::{TypedValue, Value},
};

/// Properties shared by functions and global variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SymbolAttributes {
    pub linkage: Linkage,
    pub visibility: Visibility,
    pub dll_storage: DllStorageClass,
    pub section: Option<String>,
}

/// A global variable.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVariable {
    pub name: SymbolName,
    pub attributes: SymbolAttributes,
    pub thread_local: bool,
    /// `constant` rather than `global`.
    pub constant: bool,
    pub ty: Type,
    pub initializer: Option<Value>,
    pub align: Option<u32>,
}

impl GlobalVariable {
    pub fn new(name: impl Into<SymbolName>, ty: Type, initializer: Option<Value>) -> Self {
        Self {
            name: name.into(),
            attributes: SymbolAttributes::default(),
            thread_local: false,
            constant: false,
            ty,
            initializer,
            align: None,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.initializer.is_none()
    }
}

/// A formal parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
    pub ty: Type,
    pub name: Option<String>,
}

/// Direct or indirect call (`call`, and the call part of `invoke`).
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub cconv: Option<CallingConvention>,
    pub callee: Value,
    pub args: SmallVec<TypedValue, 4>,
}

/// A non-terminator instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `[%d: ty =] call [cconv] callee(args)`
    Call {
        dest: Option<(String, Type)>,
        call: Call,
    },

    /// `[%d: ty =] opcode [operands]`, any other operation. The splitter only
    /// cares about which values an instruction uses.
    Op {
        dest: Option<(String, Type)>,
        opcode: String,
        operands: SmallVec<TypedValue, 3>,
    },
}

impl Instruction {
    pub fn dest(&self) -> Option<&str> {
        match self {
            Instruction::Call { dest, .. } | Instruction::Op { dest, .. } => {
                dest.as_ref().map(|(name, _)| name.as_str())
            }
        }
    }

    /// Values used by the instruction, callee included.
    pub fn operands(&self) -> impl Iterator<Item = &Value> {
        let (callee, rest): (Option<&Value>, &[TypedValue]) = match self {
            Instruction::Call { call, .. } => (Some(&call.callee), call.args.as_slice()),
            Instruction::Op { operands, .. } => (None, operands.as_slice()),
        };
        callee.into_iter().chain(rest.iter().map(|tv| &tv.value))
    }
}

/// Block terminator.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Ret(Option<TypedValue>),
    Br(String),
    CondBr {
        cond: TypedValue,
        then_block: String,
        else_block: String,
    },
    Invoke {
        dest: Option<(String, Type)>,
        call: Call,
        normal: String,
        unwind: String,
    },
    Resume(TypedValue),
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<&str> {
        match self {
            Terminator::Br(target) => vec![target.as_str()],
            Terminator::CondBr {
                then_block,
                else_block,
                ..
            } => vec![then_block.as_str(), else_block.as_str()],
            Terminator::Invoke { normal, unwind, .. } => vec![normal.as_str(), unwind.as_str()],
            Terminator::Ret(_) | Terminator::Resume(_) | Terminator::Unreachable => vec![],
        }
    }

    pub fn dest(&self) -> Option<&str> {
        match self {
            Terminator::Invoke { dest, .. } => dest.as_ref().map(|(name, _)| name.as_str()),
            _ => None,
        }
    }

    pub fn operands(&self) -> impl Iterator<Item = &Value> {
        let values: Vec<&Value> = match self {
            Terminator::Ret(value) => value.iter().map(|tv| &tv.value).collect(),
            Terminator::CondBr { cond, .. } => vec![&cond.value],
            Terminator::Invoke { call, .. } => std::iter::once(&call.callee)
                .chain(call.args.iter().map(|tv| &tv.value))
                .collect(),
            Terminator::Resume(value) => vec![&value.value],
            Terminator::Br(_) | Terminator::Unreachable => vec![],
        };
        values.into_iter()
    }
}

/// A basic block: straight-line instructions followed by one terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

/// A function. The first basic block is the entry block.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: SymbolName,
    pub attributes: SymbolAttributes,
    pub cconv: CallingConvention,
    pub ret: Type,
    pub params: Vec<Param>,
    pub vararg: bool,
    pub personality: Option<TypedValue>,
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    /// A declaration with the given signature and default attributes.
    pub fn declaration(name: impl Into<SymbolName>, ret: Type, params: Vec<Type>) -> Self {
        Self {
            name: name.into(),
            attributes: SymbolAttributes::default(),
            cconv: CallingConvention::C,
            ret,
            params: params
                .into_iter()
                .map(|ty| Param { ty, name: None })
                .collect(),
            vararg: false,
            personality: None,
            blocks: Vec::new(),
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn function_type(&self) -> FunctionType {
        FunctionType {
            ret: self.ret.clone(),
            params: self.params.iter().map(|p| p.ty.clone()).collect(),
            vararg: self.vararg,
        }
    }

    /// Drop the body, turning the function into a declaration.
    pub fn strip_body(&mut self) {
        self.blocks.clear();
        self.personality = None;
        for param in &mut self.params {
            param.name = None;
        }
    }

    /// All calls and invokes in the body.
    pub fn calls(&self) -> impl Iterator<Item = &Call> {
        self.blocks.iter().flat_map(|bb| {
            bb.instructions
                .iter()
                .filter_map(|instr| match instr {
                    Instruction::Call { call, .. } => Some(call),
                    Instruction::Op { .. } => None,
                })
                .chain(match &bb.terminator {
                    Terminator::Invoke { call, .. } => Some(call),
                    _ => None,
                })
        })
    }

    /// Every operand of every instruction and terminator in the body.
    pub fn operands(&self) -> impl Iterator<Item = &Value> {
        self.blocks.iter().flat_map(|bb| {
            bb.instructions
                .iter()
                .flat_map(|instr| instr.operands())
                .chain(bb.terminator.operands())
        })
    }

    pub fn block(&self, label: &str) -> Option<&BasicBlock> {
        self.blocks.iter().find(|bb| bb.label == label)
    }
}

/// A whole compilation unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub source_filename: Option<String>,
    pub target_triple: Option<String>,
    pub data_layout: Option<String>,
    /// Identified struct types; `None` is an opaque type.
    pub types: BTreeMap<String, Option<Type>>,
    pub globals: Vec<GlobalVariable>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn function(&self, name: &SymbolName) -> Option<&Function> {
        self.functions.iter().find(|f| &f.name == name)
    }

    pub fn global(&self, name: &SymbolName) -> Option<&GlobalVariable> {
        self.globals.iter().find(|g| &g.name == name)
    }

    /// Attributes of the function or global called `name`.
    pub fn attributes_of(&self, name: &SymbolName) -> Option<&SymbolAttributes> {
        self.function(name)
            .map(|f| &f.attributes)
            .or_else(|| self.global(name).map(|g| &g.attributes))
    }

    pub fn symbol_count(&self) -> usize {
        self.functions.len() + self.globals.len()
    }

    pub fn defined_functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().filter(|f| !f.is_declaration())
    }

    pub fn defined_globals(&self) -> impl Iterator<Item = &GlobalVariable> {
        self.globals.iter().filter(|g| !g.is_declaration())
    }

    /// Names of every symbol, globals first.
    pub fn symbol_names(&self) -> impl Iterator<Item = &SymbolName> {
        self.globals
            .iter()
            .map(|g| &g.name)
            .chain(self.functions.iter().map(|f| &f.name))
    }
}
