//! Operands and constants.
//!
//! Values are trees: aggregates and constant expressions own their operands.
//! References to other symbols appear as [`Value::Global`] leaves (and inside
//! [`Value::BlockAddress`]); [`Value::for_each_symbol`] enumerates them.
use crate::{name::SymbolName, types::Type};

/// Kind of a constant aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    /// `{ ... }`
    Struct,
    /// `<{ ... }>`
    PackedStruct,
    /// `[ ... ]`
    Array,
    /// `< ... >`
    Vector,
}

/// Constant expression, e.g. `bitcast (ptr @f to ptr)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstExpr {
    pub opcode: String,
    pub operands: Vec<TypedValue>,
    /// Destination type of cast-like expressions.
    pub to: Option<Type>,
}

impl ConstExpr {
    /// Casts that do not change the identity of the pointed-to symbol.
    pub fn is_pointer_cast(&self) -> bool {
        matches!(self.opcode.as_str(), "bitcast" | "addrspacecast")
    }
}

/// An operand or constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Function-local SSA value or parameter (`%x`).
    Local(String),

    /// Reference to a global symbol (`@x`).
    Global(SymbolName),

    Int(i128),
    Float(f64),
    Null,
    Undef,
    Poison,
    ZeroInitializer,

    /// Byte string `c"..."`.
    Bytes(Vec<u8>),

    Aggregate {
        kind: AggregateKind,
        elements: Vec<TypedValue>,
    },

    Expr(Box<ConstExpr>),

    /// Address of a basic block of a function (`blockaddress(@f, %bb)`).
    BlockAddress { function: SymbolName, block: String },
}

impl Value {
    pub fn global(name: impl Into<SymbolName>) -> Self {
        Value::Global(name.into())
    }

    pub fn local(name: impl Into<String>) -> Self {
        Value::Local(name.into())
    }

    /// Symbol this value designates directly, looking through pointer casts.
    ///
    /// This is what makes `call @f(...)` and `call bitcast (ptr @f to ptr)(...)`
    /// both direct calls of `@f`.
    pub fn direct_symbol(&self) -> Option<&SymbolName> {
        let mut current = self;
        loop {
            match current {
                Value::Global(name) => return Some(name),
                Value::Expr(expr) if expr.is_pointer_cast() && expr.operands.len() == 1 => {
                    current = &expr.operands[0].value;
                }
                _ => return None,
            }
        }
    }

    /// Visit every symbol referenced by this value.
    ///
    /// Uses an explicit stack so arbitrarily deep constant trees cannot
    /// overflow the call stack.
    pub fn for_each_symbol<'a>(&'a self, mut f: impl FnMut(&'a SymbolName)) {
        let mut stack: Vec<&'a Value> = vec![self];
        while let Some(value) = stack.pop() {
            match value {
                Value::Global(name) => f(name),
                Value::BlockAddress { function, .. } => f(function),
                Value::Aggregate { elements, .. } => {
                    stack.extend(elements.iter().rev().map(|tv| &tv.value));
                }
                Value::Expr(expr) => {
                    stack.extend(expr.operands.iter().rev().map(|tv| &tv.value));
                }
                Value::Local(_)
                | Value::Int(_)
                | Value::Float(_)
                | Value::Null
                | Value::Undef
                | Value::Poison
                | Value::ZeroInitializer
                | Value::Bytes(_) => {}
            }
        }
    }

    /// Visit every local value referenced by this value.
    pub fn for_each_local<'a>(&'a self, mut f: impl FnMut(&'a str)) {
        let mut stack: Vec<&'a Value> = vec![self];
        while let Some(value) = stack.pop() {
            match value {
                Value::Local(name) => f(name),
                Value::Aggregate { elements, .. } => {
                    stack.extend(elements.iter().map(|tv| &tv.value));
                }
                Value::Expr(expr) => stack.extend(expr.operands.iter().map(|tv| &tv.value)),
                _ => {}
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Value::ZeroInitializer | Value::Null | Value::Int(0) => true,
            Value::Float(v) => *v == 0.0,
            Value::Aggregate { elements, .. } => elements.iter().all(|e| e.value.is_zero()),
            _ => false,
        }
    }
}

/// A value annotated with its type (`i32 %x`, `ptr @f`).
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    pub ty: Type,
    pub value: Value,
}

impl TypedValue {
    pub fn new(ty: Type, value: Value) -> Self {
        Self { ty, value }
    }

    /// Shorthand for `ptr @name`.
    pub fn symbol(name: impl Into<SymbolName>) -> Self {
        Self::new(Type::PTR, Value::Global(name.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cast(value: Value) -> Value {
        Value::Expr(Box::new(ConstExpr {
            opcode: "bitcast".into(),
            operands: vec![TypedValue::new(Type::PTR, value)],
            to: Some(Type::PTR),
        }))
    }

    #[test]
    fn direct_symbol_looks_through_casts() {
        let value = cast(cast(Value::global("f")));
        assert_eq!(value.direct_symbol(), Some(&SymbolName::from("f")));
        assert_eq!(Value::local("x").direct_symbol(), None);
    }

    #[test]
    fn symbols_in_nested_aggregates_are_visited_in_order() {
        let table = Value::Aggregate {
            kind: AggregateKind::Array,
            elements: vec![
                TypedValue::symbol("a"),
                TypedValue::new(
                    Type::Struct {
                        fields: vec![Type::PTR, Type::PTR],
                        packed: false,
                    },
                    Value::Aggregate {
                        kind: AggregateKind::Struct,
                        elements: vec![
                            TypedValue::new(Type::PTR, cast(Value::global("b"))),
                            TypedValue::new(
                                Type::PTR,
                                Value::BlockAddress {
                                    function: "c".into(),
                                    block: "bb".into(),
                                },
                            ),
                        ],
                    },
                ),
            ],
        };

        let mut seen = Vec::new();
        table.for_each_symbol(|name| seen.push(name.raw()));
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn deep_expression_chains_do_not_recurse() {
        let mut value = Value::global("leaf");
        for _ in 0..100_000 {
            value = cast(value);
        }
        let mut count = 0;
        value.for_each_symbol(|_| count += 1);
        assert_eq!(count, 1);
        assert!(value.direct_symbol().is_some());
        // Dropping a 100k-deep Box chain recursively would overflow the stack.
        std::mem::forget(value);
    }
}
