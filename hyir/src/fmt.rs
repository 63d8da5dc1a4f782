//! Pretty-print helpers for types, values, functions, and modules.
//!
//! The output of `Display for Module` is accepted by
//! [`crate::parser::parse_module`] and parses back to an equal module.
use std::fmt::{Display, Formatter, Result};

use crate::{
    linkage::{CallingConvention, Linkage, Visibility},
    module::{BasicBlock, Call, Function, GlobalVariable, Instruction, Module, Terminator},
    name::{escape_bytes, escape_local},
    types::Type,
    value::{AggregateKind, ConstExpr, TypedValue, Value},
};

/// Write `items` separated by `", "`.
fn comma_separated<T: Display>(f: &mut Formatter<'_>, items: &[T]) -> Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int(width) => write!(f, "i{}", width),
            Type::Half => write!(f, "half"),
            Type::Float => write!(f, "float"),
            Type::Double => write!(f, "double"),
            Type::Fp128 => write!(f, "fp128"),
            Type::Ptr { addrspace: 0 } => write!(f, "ptr"),
            Type::Ptr { addrspace } => write!(f, "ptr addrspace({})", addrspace),
            Type::Array { len, elem } => write!(f, "[{} x {}]", len, elem),
            Type::Vector { len, elem } => write!(f, "<{} x {}>", len, elem),
            Type::Struct { fields, packed } => {
                if *packed {
                    write!(f, "<")?;
                }
                if fields.is_empty() {
                    write!(f, "{{}}")?;
                } else {
                    write!(f, "{{ ")?;
                    comma_separated(f, fields)?;
                    write!(f, " }}")?;
                }
                if *packed {
                    write!(f, ">")?;
                }
                Ok(())
            }
            Type::Named(name) => write!(f, "%{}", escape_local(name)),
            Type::Label => write!(f, "label"),
        }
    }
}

impl Display for ConstExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{} (", self.opcode)?;
        comma_separated(f, &self.operands)?;
        if let Some(to) = &self.to {
            write!(f, " to {}", to)?;
        }
        write!(f, ")")
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Value::Local(name) => write!(f, "%{}", escape_local(name)),
            Value::Global(name) => write!(f, "@{}", name),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{:?}", v),
            Value::Null => write!(f, "null"),
            Value::Undef => write!(f, "undef"),
            Value::Poison => write!(f, "poison"),
            Value::ZeroInitializer => write!(f, "zeroinitializer"),
            Value::Bytes(bytes) => write!(f, "c\"{}\"", escape_bytes(bytes, false)),
            Value::Aggregate { kind, elements } => {
                let (open, close) = match kind {
                    AggregateKind::Struct => ("{ ", " }"),
                    AggregateKind::PackedStruct => ("<{ ", " }>"),
                    AggregateKind::Array => ("[", "]"),
                    AggregateKind::Vector => ("<", ">"),
                };
                if elements.is_empty() {
                    return write!(f, "{}{}", open.trim_end(), close.trim_start());
                }
                write!(f, "{}", open)?;
                comma_separated(f, elements)?;
                write!(f, "{}", close)
            }
            Value::Expr(expr) => write!(f, "{}", expr),
            Value::BlockAddress { function, block } => {
                write!(f, "blockaddress(@{}, %{})", function, escape_local(block))
            }
        }
    }
}

impl Display for TypedValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{} {}", self.ty, self.value)
    }
}

fn write_dest(f: &mut Formatter<'_>, dest: &Option<(String, Type)>) -> Result {
    if let Some((name, ty)) = dest {
        write!(f, "%{}: {} = ", escape_local(name), ty)?;
    }
    Ok(())
}

impl Display for Call {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if let Some(cconv) = &self.cconv {
            write!(f, "{} ", cconv)?;
        }
        write!(f, "{}(", self.callee)?;
        comma_separated(f, &self.args)?;
        write!(f, ")")
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Instruction::Call { dest, call } => {
                write_dest(f, dest)?;
                write!(f, "call {}", call)
            }
            Instruction::Op {
                dest,
                opcode,
                operands,
            } => {
                write_dest(f, dest)?;
                write!(f, "{}", opcode)?;
                if !operands.is_empty() {
                    write!(f, " ")?;
                    comma_separated(f, operands)?;
                }
                Ok(())
            }
        }
    }
}

impl Display for Terminator {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Terminator::Ret(None) => write!(f, "ret void"),
            Terminator::Ret(Some(value)) => write!(f, "ret {}", value),
            Terminator::Br(target) => write!(f, "br label %{}", escape_local(target)),
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => write!(
                f,
                "br {}, label %{}, label %{}",
                cond,
                escape_local(then_block),
                escape_local(else_block)
            ),
            Terminator::Invoke {
                dest,
                call,
                normal,
                unwind,
            } => {
                write_dest(f, dest)?;
                write!(
                    f,
                    "invoke {} to label %{} unwind label %{}",
                    call,
                    escape_local(normal),
                    escape_local(unwind)
                )
            }
            Terminator::Resume(value) => write!(f, "resume {}", value),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

impl Display for BasicBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        writeln!(f, "{}:", escape_local(&self.label))?;
        for instr in &self.instructions {
            writeln!(f, "  {}", instr)?;
        }
        writeln!(f, "  {}", self.terminator)
    }
}

/// Linkage, visibility and storage keywords shared by globals and functions.
fn write_symbol_prefix(
    f: &mut Formatter<'_>,
    linkage: Linkage,
    print_external: bool,
    visibility: Visibility,
    dll: Option<&'static str>,
) -> Result {
    if linkage != Linkage::External || print_external {
        write!(f, "{} ", linkage)?;
    }
    if visibility != Visibility::Default {
        write!(f, "{} ", visibility)?;
    }
    if let Some(dll) = dll {
        write!(f, "{} ", dll)?;
    }
    Ok(())
}

impl Display for GlobalVariable {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "@{} = ", self.name)?;
        write_symbol_prefix(
            f,
            self.attributes.linkage,
            self.is_declaration(),
            self.attributes.visibility,
            self.attributes.dll_storage.keyword(),
        )?;
        if self.thread_local {
            write!(f, "thread_local ")?;
        }
        write!(
            f,
            "{} {}",
            if self.constant { "constant" } else { "global" },
            self.ty
        )?;
        if let Some(init) = &self.initializer {
            write!(f, " {}", init)?;
        }
        if let Some(section) = &self.attributes.section {
            write!(f, ", section \"{}\"", escape_bytes(section.as_bytes(), false))?;
        }
        if let Some(align) = self.align {
            write!(f, ", align {}", align)?;
        }
        Ok(())
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "{} ",
            if self.is_declaration() {
                "declare"
            } else {
                "define"
            }
        )?;
        write_symbol_prefix(
            f,
            self.attributes.linkage,
            false,
            self.attributes.visibility,
            self.attributes.dll_storage.keyword(),
        )?;
        if self.cconv != CallingConvention::C {
            write!(f, "{} ", self.cconv)?;
        }
        write!(f, "{} @{}(", self.ret, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param.ty)?;
            if let Some(name) = &param.name {
                write!(f, " %{}", escape_local(name))?;
            }
        }
        if self.vararg {
            if !self.params.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "...")?;
        }
        write!(f, ")")?;
        if let Some(section) = &self.attributes.section {
            write!(f, " section \"{}\"", escape_bytes(section.as_bytes(), false))?;
        }
        if let Some(personality) = &self.personality {
            write!(f, " personality {}", personality)?;
        }
        if self.is_declaration() {
            return writeln!(f);
        }

        writeln!(f, " {{")?;
        for bb in &self.blocks {
            write!(f, "{}", bb)?;
        }
        writeln!(f, "}}")
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if let Some(name) = &self.source_filename {
            writeln!(f, "source_filename = \"{}\"", escape_bytes(name.as_bytes(), false))?;
        }
        if let Some(layout) = &self.data_layout {
            writeln!(f, "target datalayout = \"{}\"", escape_bytes(layout.as_bytes(), false))?;
        }
        if let Some(triple) = &self.target_triple {
            writeln!(f, "target triple = \"{}\"", escape_bytes(triple.as_bytes(), false))?;
        }

        if !self.types.is_empty() {
            writeln!(f)?;
        }
        for (name, ty) in &self.types {
            match ty {
                Some(ty) => writeln!(f, "%{} = type {}", escape_local(name), ty)?,
                None => writeln!(f, "%{} = type opaque", escape_local(name))?,
            }
        }

        if !self.globals.is_empty() {
            writeln!(f)?;
        }
        for global in &self.globals {
            writeln!(f, "{}", global)?;
        }

        for function in &self.functions {
            writeln!(f)?;
            write!(f, "{}", function)?;
        }
        Ok(())
    }
}
