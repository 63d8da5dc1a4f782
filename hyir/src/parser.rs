//! Textual module parser.
//!
//! Accepts the format produced by the `Display` implementations in
//! [`crate::fmt`]. Comments start with `;` and run to the end of the line.
use std::path::Path;

use chumsky::prelude::*;

use crate::{
    linkage::{CallingConvention, DllStorageClass, Linkage, Visibility},
    module::{
        BasicBlock, Call, Function, GlobalVariable, Instruction, Module, Param, SymbolAttributes,
        Terminator,
    },
    name::{SymbolName, is_ident_char, unescape_bytes},
    types::Type,
    utils::{Error, ParserError},
    value::{AggregateKind, ConstExpr, TypedValue, Value},
};

type Extra<'src> = extra::Err<Rich<'src, char>>;

/// Opcodes with a dedicated grammar; never parsed as a generic instruction.
const RESERVED_OPCODES: &[&str] = &[
    "call",
    "invoke",
    "ret",
    "br",
    "resume",
    "unreachable",
    "define",
    "declare",
];

pub fn whitespace<'src>() -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    let comment = just(';').then(none_of("\n").repeated()).ignored();
    choice((
        any().filter(|c: &char| c.is_whitespace()).ignored(),
        comment,
    ))
    .repeated()
    .ignored()
}

fn comma<'src>() -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    just(',').padded_by(whitespace()).ignored()
}

/// A reserved word, which must not be followed by further identifier characters.
fn keyword<'src>(word: &'static str) -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    text::ascii::ident()
        .try_map(move |ident: &str, span| {
            if ident == word {
                Ok(())
            } else {
                Err(Rich::custom(span, format!("expected `{}`", word)))
            }
        })
        .labelled(word)
}

fn unsigned<'src, T>() -> impl Parser<'src, &'src str, T, Extra<'src>> + Clone
where
    T: std::str::FromStr,
{
    text::digits(10)
        .to_slice()
        .try_map(|digits: &str, span| {
            digits
                .parse::<T>()
                .map_err(|_| Rich::custom(span, format!("number out of range: {}", digits)))
        })
        .labelled("number")
}

fn quoted_bytes<'src>() -> impl Parser<'src, &'src str, Vec<u8>, Extra<'src>> + Clone {
    none_of("\"")
        .repeated()
        .to_slice()
        .delimited_by(just('"'), just('"'))
        .try_map(|text: &str, span| {
            unescape_bytes(text).ok_or_else(|| Rich::custom(span, "malformed escape sequence"))
        })
        .labelled("quoted string")
}

/// Quoted name or string. Escapes must decode to UTF-8; anything else is an
/// error rather than a substituted name.
fn quoted_string<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    quoted_bytes().try_map(|bytes, span| {
        String::from_utf8(bytes)
            .map_err(|_| Rich::custom(span, "quoted name does not decode to UTF-8"))
    })
}

fn bare_name<'src>() -> impl Parser<'src, &'src str, &'src str, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| is_ident_char(*c))
        .repeated()
        .at_least(1)
        .to_slice()
}

/// Name of a local value, label or identified type, without its sigil.
fn local_token<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    choice((quoted_string(), bare_name().map(str::to_string)))
}

pub fn local_name<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    just('%')
        .ignore_then(local_token())
        .labelled("local name")
}

pub fn global_name<'src>() -> impl Parser<'src, &'src str, SymbolName, Extra<'src>> + Clone {
    just('@')
        .ignore_then(choice((
            quoted_string().map(SymbolName::Named),
            bare_name().try_map(|name: &str, span| {
                if name.bytes().all(|b| b.is_ascii_digit()) {
                    name.parse::<u32>().map(SymbolName::Numbered).map_err(|_| {
                        Rich::custom(span, format!("symbol number out of range: {}", name))
                    })
                } else {
                    Ok(SymbolName::Named(name.to_string()))
                }
            }),
        )))
        .labelled("global name")
}

pub fn type_parser<'src>() -> impl Parser<'src, &'src str, Type, Extra<'src>> + Clone {
    recursive(|ty| {
        let ws = whitespace();

        let ptr = keyword("ptr")
            .ignore_then(
                ws.clone()
                    .ignore_then(keyword("addrspace"))
                    .ignore_then(
                        unsigned::<u32>()
                            .padded_by(ws.clone())
                            .delimited_by(just('('), just(')')),
                    )
                    .or_not(),
            )
            .map(|addrspace| Type::Ptr {
                addrspace: addrspace.unwrap_or(0),
            });

        let word = text::ascii::ident().try_map(|word: &str, span| match word {
            "void" => Ok(Type::Void),
            "half" => Ok(Type::Half),
            "float" => Ok(Type::Float),
            "double" => Ok(Type::Double),
            "fp128" => Ok(Type::Fp128),
            "label" => Ok(Type::Label),
            _ => word
                .strip_prefix('i')
                .filter(|width| !width.is_empty() && width.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|width| width.parse::<u32>().ok())
                .filter(|width| *width > 0)
                .map(Type::Int)
                .ok_or_else(|| Rich::custom(span, format!("unknown type `{}`", word))),
        });

        let array = just('[')
            .ignore_then(unsigned::<u64>().padded_by(ws.clone()))
            .then_ignore(just('x'))
            .then(ty.clone().padded_by(ws.clone()))
            .then_ignore(just(']'))
            .map(|(len, elem)| Type::Array {
                len,
                elem: Box::new(elem),
            });

        let vector = just('<')
            .ignore_then(unsigned::<u32>().padded_by(ws.clone()))
            .then_ignore(just('x'))
            .then(ty.clone().padded_by(ws.clone()))
            .then_ignore(just('>'))
            .map(|(len, elem)| Type::Vector {
                len,
                elem: Box::new(elem),
            });

        let fields = ty
            .clone()
            .padded_by(ws.clone())
            .separated_by(just(','))
            .collect::<Vec<_>>()
            .then_ignore(ws.clone())
            .delimited_by(just('{'), just('}'));

        let packed = just('<')
            .ignore_then(fields.clone())
            .then_ignore(just('>'))
            .map(|fields| Type::Struct {
                fields,
                packed: true,
            });

        choice((
            ptr,
            word,
            array,
            packed,
            vector,
            fields.map(|fields| Type::Struct {
                fields,
                packed: false,
            }),
            local_name().map(Type::Named),
        ))
        .labelled("type")
    })
    .boxed()
}

fn value_parser_with<'src, P>(typed: P) -> impl Parser<'src, &'src str, Value, Extra<'src>> + Clone
where
    P: Parser<'src, &'src str, TypedValue, Extra<'src>> + Clone,
{
    let ws = whitespace();

    let list = |open: &'static str, close: &'static str| {
        typed
            .clone()
            .padded_by(ws.clone())
            .separated_by(just(','))
            .collect::<Vec<_>>()
            .then_ignore(ws.clone())
            .delimited_by(just(open), just(close))
    };

    let aggregate = choice((
        list("<{", "}>").map(|elements| (AggregateKind::PackedStruct, elements)),
        list("{", "}").map(|elements| (AggregateKind::Struct, elements)),
        list("[", "]").map(|elements| (AggregateKind::Array, elements)),
        list("<", ">").map(|elements| (AggregateKind::Vector, elements)),
    ))
    .map(|(kind, elements)| Value::Aggregate { kind, elements });

    let number = just('-')
        .or_not()
        .then(text::digits(10))
        .then(just('.').then(text::digits(10)).or_not())
        .then(
            one_of("eE")
                .then(one_of("+-").or_not())
                .then(text::digits(10))
                .or_not(),
        )
        .to_slice()
        .try_map(|literal: &str, span| {
            if literal.contains(['.', 'e', 'E']) {
                literal.parse::<f64>().map(Value::Float).map_err(|_| {
                    Rich::custom(span, format!("invalid floating-point literal `{}`", literal))
                })
            } else {
                literal.parse::<i128>().map(Value::Int).map_err(|_| {
                    Rich::custom(span, format!("integer literal out of range `{}`", literal))
                })
            }
        });

    let special_float = choice((
        just("-inf").to(Value::Float(f64::NEG_INFINITY)),
        keyword("inf").to(Value::Float(f64::INFINITY)),
        keyword("NaN").to(Value::Float(f64::NAN)),
    ));

    let constant = choice((
        keyword("null").to(Value::Null),
        keyword("undef").to(Value::Undef),
        keyword("poison").to(Value::Poison),
        keyword("zeroinitializer").to(Value::ZeroInitializer),
        keyword("true").to(Value::Int(1)),
        keyword("false").to(Value::Int(0)),
    ));

    let bytes = just('c').ignore_then(quoted_bytes()).map(Value::Bytes);

    let block_address = keyword("blockaddress")
        .ignore_then(ws.clone())
        .ignore_then(
            global_name()
                .padded_by(ws.clone())
                .then_ignore(just(','))
                .then(local_name().padded_by(ws.clone()))
                .delimited_by(just('('), just(')')),
        )
        .map(|(function, block)| Value::BlockAddress { function, block });

    let expr = text::ascii::ident()
        .map(str::to_string)
        .then_ignore(ws.clone())
        .then(
            typed
                .clone()
                .padded_by(ws.clone())
                .separated_by(just(','))
                .collect::<Vec<_>>()
                .then(
                    keyword("to")
                        .ignore_then(type_parser().padded_by(ws.clone()))
                        .or_not(),
                )
                .delimited_by(just('('), just(')')),
        )
        .map(|(opcode, (operands, to))| {
            Value::Expr(Box::new(ConstExpr {
                opcode,
                operands,
                to,
            }))
        });

    choice((
        local_name().map(Value::Local),
        global_name().map(Value::Global),
        bytes,
        special_float,
        number,
        constant,
        block_address,
        aggregate,
        expr,
    ))
    .labelled("value")
}

pub fn typed_value_parser<'src>() -> impl Parser<'src, &'src str, TypedValue, Extra<'src>> + Clone
{
    recursive(|typed| {
        type_parser()
            .then_ignore(whitespace())
            .then(value_parser_with(typed))
            .map(|(ty, value)| TypedValue { ty, value })
    })
    .labelled("typed value")
    .boxed()
}

pub fn value_parser<'src>() -> impl Parser<'src, &'src str, Value, Extra<'src>> + Clone {
    value_parser_with(typed_value_parser())
}

pub fn linkage_parser<'src>() -> impl Parser<'src, &'src str, Linkage, Extra<'src>> + Clone {
    text::ascii::ident()
        .try_map(|word: &str, span| {
            Linkage::from_keyword(word)
                .ok_or_else(|| Rich::custom(span, format!("unknown linkage `{}`", word)))
        })
        .labelled("linkage")
}

pub fn visibility_parser<'src>() -> impl Parser<'src, &'src str, Visibility, Extra<'src>> + Clone
{
    text::ascii::ident()
        .try_map(|word: &str, span| {
            Visibility::from_keyword(word)
                .ok_or_else(|| Rich::custom(span, format!("unknown visibility `{}`", word)))
        })
        .labelled("visibility")
}

fn dll_storage_parser<'src>() -> impl Parser<'src, &'src str, DllStorageClass, Extra<'src>> + Clone
{
    text::ascii::ident()
        .try_map(|word: &str, span| {
            DllStorageClass::from_keyword(word)
                .ok_or_else(|| Rich::custom(span, format!("unknown storage class `{}`", word)))
        })
        .labelled("dll storage class")
}

pub fn cconv_parser<'src>() -> impl Parser<'src, &'src str, CallingConvention, Extra<'src>> + Clone
{
    choice((
        keyword("cc")
            .ignore_then(whitespace())
            .ignore_then(unsigned::<u32>())
            .map(CallingConvention::Numbered),
        text::ascii::ident().try_map(|word: &str, span| {
            CallingConvention::from_keyword(word).ok_or_else(|| {
                Rich::custom(span, format!("unknown calling convention `{}`", word))
            })
        }),
    ))
    .labelled("calling convention")
}

/// `[linkage] [visibility] [dll storage]`, each followed by whitespace.
fn symbol_attributes<'src>() -> impl Parser<'src, &'src str, SymbolAttributes, Extra<'src>> + Clone
{
    let ws = whitespace();
    linkage_parser()
        .then_ignore(ws.clone())
        .or_not()
        .then(visibility_parser().then_ignore(ws.clone()).or_not())
        .then(dll_storage_parser().then_ignore(ws).or_not())
        .map(|((linkage, visibility), dll_storage)| SymbolAttributes {
            linkage: linkage.unwrap_or_default(),
            visibility: visibility.unwrap_or_default(),
            dll_storage: dll_storage.unwrap_or_default(),
            section: None,
        })
}

fn call_parser<'src>() -> impl Parser<'src, &'src str, Call, Extra<'src>> + Clone {
    let ws = whitespace();
    cconv_parser()
        .then_ignore(ws.clone())
        .or_not()
        .then(value_parser())
        .then_ignore(ws.clone())
        .then(
            typed_value_parser()
                .padded_by(ws.clone())
                .separated_by(just(','))
                .collect::<Vec<_>>()
                .then_ignore(ws)
                .delimited_by(just('('), just(')')),
        )
        .map(|((cconv, callee), args)| Call {
            cconv,
            callee,
            args: args.into_iter().collect(),
        })
}

/// `%name: type = `
fn dest_parser<'src>() -> impl Parser<'src, &'src str, (String, Type), Extra<'src>> + Clone {
    let ws = whitespace();
    local_name()
        .then_ignore(ws.clone())
        .then_ignore(just(':'))
        .then(type_parser().padded_by(ws.clone()))
        .then_ignore(just('='))
        .then_ignore(ws)
}

#[derive(Debug)]
enum BodyItem {
    Label(String),
    Instruction(Instruction),
    Terminator(Terminator),
}

fn terminator_parser<'src>() -> impl Parser<'src, &'src str, Terminator, Extra<'src>> + Clone {
    let ws = whitespace();
    let label_ref = keyword("label")
        .ignore_then(ws.clone())
        .ignore_then(local_name());

    let ret = keyword("ret")
        .ignore_then(ws.clone())
        .ignore_then(choice((
            keyword("void").to(None),
            typed_value_parser().map(Some),
        )))
        .map(Terminator::Ret);

    let br = keyword("br").ignore_then(ws.clone()).ignore_then(choice((
        label_ref.clone().map(Terminator::Br),
        typed_value_parser()
            .then_ignore(comma())
            .then(label_ref.clone())
            .then_ignore(comma())
            .then(label_ref.clone())
            .map(|((cond, then_block), else_block)| Terminator::CondBr {
                cond,
                then_block,
                else_block,
            }),
    )));

    let invoke = dest_parser()
        .or_not()
        .then_ignore(keyword("invoke"))
        .then_ignore(ws.clone())
        .then(call_parser())
        .then_ignore(ws.clone())
        .then_ignore(keyword("to"))
        .then_ignore(ws.clone())
        .then(label_ref.clone())
        .then_ignore(ws.clone())
        .then_ignore(keyword("unwind"))
        .then_ignore(ws.clone())
        .then(label_ref)
        .map(|(((dest, call), normal), unwind)| Terminator::Invoke {
            dest,
            call,
            normal,
            unwind,
        });

    let resume = keyword("resume")
        .ignore_then(ws)
        .ignore_then(typed_value_parser())
        .map(Terminator::Resume);

    choice((
        ret,
        br,
        invoke,
        resume,
        keyword("unreachable").to(Terminator::Unreachable),
    ))
    .labelled("terminator")
}

fn instruction_parser<'src>() -> impl Parser<'src, &'src str, Instruction, Extra<'src>> + Clone {
    let ws = whitespace();

    let call = dest_parser()
        .or_not()
        .then_ignore(keyword("call"))
        .then_ignore(ws.clone())
        .then(call_parser())
        .map(|(dest, call)| Instruction::Call { dest, call });

    let opcode = text::ascii::ident().try_map(|word: &str, span| {
        if RESERVED_OPCODES.contains(&word) {
            Err(Rich::custom(span, format!("unexpected `{}`", word)))
        } else {
            Ok(word.to_string())
        }
    });

    let op = dest_parser()
        .or_not()
        .then(opcode)
        .then(
            ws.ignore_then(
                typed_value_parser()
                    .separated_by(comma())
                    .at_least(1)
                    .collect::<Vec<_>>(),
            )
            .or_not(),
        )
        .map(|((dest, opcode), operands)| Instruction::Op {
            dest,
            opcode,
            operands: operands.unwrap_or_default().into_iter().collect(),
        });

    choice((call, op)).labelled("instruction")
}

fn group_blocks(items: Vec<BodyItem>) -> Result<Vec<BasicBlock>, String> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, Vec<Instruction>)> = None;

    for item in items {
        match item {
            BodyItem::Label(label) => {
                if let Some((open, _)) = current {
                    return Err(format!("block `{}` has no terminator", open));
                }
                current = Some((label, Vec::new()));
            }
            BodyItem::Instruction(instr) => match current.as_mut() {
                Some((_, instructions)) => instructions.push(instr),
                None => return Err("instruction outside of a basic block".to_string()),
            },
            BodyItem::Terminator(terminator) => match current.take() {
                Some((label, instructions)) => blocks.push(BasicBlock {
                    label,
                    instructions,
                    terminator,
                }),
                None => return Err("terminator outside of a basic block".to_string()),
            },
        }
    }

    if let Some((label, _)) = current {
        return Err(format!("block `{}` has no terminator", label));
    }
    if blocks.is_empty() {
        return Err("function body has no basic blocks".to_string());
    }
    Ok(blocks)
}

fn body_parser<'src>() -> impl Parser<'src, &'src str, Vec<BasicBlock>, Extra<'src>> + Clone {
    let ws = whitespace();
    let label = local_token().then_ignore(just(':'));

    choice((
        label.map(BodyItem::Label),
        terminator_parser().map(BodyItem::Terminator),
        instruction_parser().map(BodyItem::Instruction),
    ))
    .padded_by(ws.clone())
    .repeated()
    .collect::<Vec<_>>()
    .then_ignore(ws)
    .delimited_by(just('{'), just('}'))
    .try_map(|items, span| group_blocks(items).map_err(|msg| Rich::custom(span, msg)))
    .labelled("function body")
}

fn params_parser<'src>() -> impl Parser<'src, &'src str, (Vec<Param>, bool), Extra<'src>> + Clone {
    let ws = whitespace();
    let param = choice((
        just("...").to(None),
        type_parser()
            .then(ws.clone().ignore_then(local_name()).or_not())
            .map(|(ty, name)| Some(Param { ty, name })),
    ));

    param
        .padded_by(ws.clone())
        .separated_by(just(','))
        .collect::<Vec<_>>()
        .then_ignore(ws)
        .delimited_by(just('('), just(')'))
        .try_map(|items: Vec<Option<Param>>, span| {
            let count = items.len();
            let mut params = Vec::with_capacity(count);
            let mut vararg = false;
            for (i, item) in items.into_iter().enumerate() {
                match item {
                    Some(param) => params.push(param),
                    None if i + 1 == count => vararg = true,
                    None => {
                        return Err(Rich::custom(span, "`...` must be the last parameter"));
                    }
                }
            }
            Ok((params, vararg))
        })
}

pub fn function_parser<'src>() -> impl Parser<'src, &'src str, Function, Extra<'src>> + Clone {
    let ws = whitespace();

    let header = choice((keyword("define").to(true), keyword("declare").to(false)))
        .then_ignore(ws.clone())
        .then(symbol_attributes())
        .then(cconv_parser().then_ignore(ws.clone()).or_not())
        .then(type_parser())
        .then_ignore(ws.clone())
        .then(global_name())
        .then_ignore(ws.clone())
        .then(params_parser());

    let section = ws
        .clone()
        .ignore_then(keyword("section"))
        .ignore_then(ws.clone())
        .ignore_then(quoted_string())
        .or_not();

    let personality = ws
        .clone()
        .ignore_then(keyword("personality"))
        .ignore_then(ws.clone())
        .ignore_then(typed_value_parser())
        .or_not();

    header
        .then(section)
        .then(personality)
        .then(ws.ignore_then(body_parser()).or_not())
        .try_map(
            |(
                (((((((is_definition, mut attributes), cconv), ret), name), (params, vararg)), section), personality),
                body,
            ),
             span| {
                attributes.section = section;
                let blocks = match (is_definition, body) {
                    (true, Some(blocks)) => blocks,
                    (false, None) => Vec::new(),
                    (true, None) => {
                        return Err(Rich::custom(span, format!("definition of @{} has no body", name)));
                    }
                    (false, Some(_)) => {
                        return Err(Rich::custom(span, format!("declaration of @{} has a body", name)));
                    }
                };
                Ok(Function {
                    name,
                    attributes,
                    cconv: cconv.unwrap_or_default(),
                    ret,
                    params,
                    vararg,
                    personality,
                    blocks,
                })
            },
        )
        .labelled("function")
        .boxed()
}

pub fn global_parser<'src>() -> impl Parser<'src, &'src str, GlobalVariable, Extra<'src>> + Clone {
    let ws = whitespace();

    // A declaration may be directly followed by the next `@name = ...`, which
    // must not be mistaken for an initializer.
    let initializer = ws
        .clone()
        .ignore_then(value_parser())
        .then_ignore(ws.clone().then(just('=')).not())
        .or_not();

    global_name()
        .then_ignore(just('=').padded_by(ws.clone()))
        .then(symbol_attributes())
        .then(keyword("thread_local").then_ignore(ws.clone()).or_not())
        .then(choice((
            keyword("global").to(false),
            keyword("constant").to(true),
        )))
        .then_ignore(ws.clone())
        .then(type_parser())
        .then(initializer)
        .then(
            comma()
                .ignore_then(keyword("section"))
                .ignore_then(ws.clone())
                .ignore_then(quoted_string())
                .or_not(),
        )
        .then(
            comma()
                .ignore_then(keyword("align"))
                .ignore_then(ws)
                .ignore_then(unsigned::<u32>())
                .or_not(),
        )
        .map(
            |(((((((name, mut attributes), thread_local), constant), ty), initializer), section), align)| {
                attributes.section = section;
                GlobalVariable {
                    name,
                    attributes,
                    thread_local: thread_local.is_some(),
                    constant,
                    ty,
                    initializer,
                    align,
                }
            },
        )
        .labelled("global variable")
}

#[derive(Debug)]
enum TopLevel {
    SourceFilename(String),
    DataLayout(String),
    TargetTriple(String),
    TypeDef(String, Option<Type>),
    Global(GlobalVariable),
    Function(Function),
}

fn module_parser<'src>() -> impl Parser<'src, &'src str, Vec<TopLevel>, Extra<'src>> {
    let ws = whitespace();
    let equals = just('=').padded_by(ws.clone());

    let source_filename = keyword("source_filename")
        .then(equals.clone())
        .ignore_then(quoted_string())
        .map(TopLevel::SourceFilename);

    let target = keyword("target")
        .ignore_then(ws.clone())
        .ignore_then(choice((
            keyword("datalayout").to(true),
            keyword("triple").to(false),
        )))
        .then_ignore(equals.clone())
        .then(quoted_string())
        .map(|(is_layout, text)| {
            if is_layout {
                TopLevel::DataLayout(text)
            } else {
                TopLevel::TargetTriple(text)
            }
        });

    let type_def = local_name()
        .then_ignore(equals)
        .then_ignore(keyword("type"))
        .then_ignore(ws.clone())
        .then(choice((
            keyword("opaque").to(None),
            type_parser().map(Some),
        )))
        .map(|(name, ty)| TopLevel::TypeDef(name, ty));

    ws.clone()
        .ignore_then(
            choice((
                source_filename,
                target,
                type_def,
                global_parser().map(TopLevel::Global),
                function_parser().map(TopLevel::Function),
            ))
            .then_ignore(ws)
            .repeated()
            .collect::<Vec<_>>(),
        )
        .then_ignore(end())
}

fn convert_errors(errors: Vec<Rich<'_, char>>, file: Option<&str>) -> Error {
    Error::ParserErrors {
        errors: errors
            .into_iter()
            .map(|e| ParserError {
                message: e.to_string(),
                start: e.span().start,
                end: e.span().end,
                file: file.map(str::to_string),
            })
            .collect(),
    }
}

fn extend_module(module: &mut Module, source: &str, file: Option<&str>) -> Result<(), Error> {
    let items = module_parser()
        .parse(source)
        .into_result()
        .map_err(|errors| convert_errors(errors, file))?;

    for item in items {
        match item {
            TopLevel::SourceFilename(name) => module.source_filename = Some(name),
            TopLevel::DataLayout(layout) => module.data_layout = Some(layout),
            TopLevel::TargetTriple(triple) => module.target_triple = Some(triple),
            TopLevel::TypeDef(name, ty) => {
                module.types.insert(name, ty);
            }
            TopLevel::Global(global) => module.globals.push(global),
            TopLevel::Function(function) => module.functions.push(function),
        }
    }
    Ok(())
}

/// Parse a whole module from its textual form.
pub fn parse_module(source: &str) -> Result<Module, Error> {
    let mut module = Module::default();
    extend_module(&mut module, source, None)?;
    Ok(module)
}

/// Append the symbols of `source` to `module`. Header lines overwrite the
/// existing ones.
pub fn extend_module_from_string(module: &mut Module, source: &str) -> Result<(), Error> {
    extend_module(module, source, None)
}

pub fn extend_module_from_path(module: &mut Module, path: impl AsRef<Path>) -> Result<(), Error> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let source = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: display.clone(),
        source,
    })?;
    extend_module(module, &source, Some(&display))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_type(src: &str) -> Type {
        type_parser().parse(src).into_result().unwrap()
    }

    fn parse_typed(src: &str) -> TypedValue {
        typed_value_parser().parse(src).into_result().unwrap()
    }

    #[test]
    fn types() {
        assert_eq!(parse_type("i32"), Type::I32);
        assert_eq!(parse_type("ptr"), Type::PTR);
        assert_eq!(parse_type("ptr addrspace(3)"), Type::ptr_in(3));
        assert_eq!(parse_type("[4 x i8]"), Type::array(4, Type::I8));
        assert_eq!(
            parse_type("<{ i32, ptr }>"),
            Type::Struct {
                fields: vec![Type::I32, Type::PTR],
                packed: true
            }
        );
        assert_eq!(
            parse_type("<2 x double>"),
            Type::Vector {
                len: 2,
                elem: Box::new(Type::Double)
            }
        );
        assert_eq!(parse_type("%struct.foo"), Type::Named("struct.foo".into()));
        assert!(type_parser().parse("i0").into_result().is_err());
        assert!(type_parser().parse("integer").into_result().is_err());
    }

    #[test]
    fn constants() {
        assert_eq!(parse_typed("i32 -7").value, Value::Int(-7));
        assert_eq!(parse_typed("double 1.5").value, Value::Float(1.5));
        assert_eq!(parse_typed("double 1e-7").value, Value::Float(1e-7));
        assert_eq!(parse_typed("ptr null").value, Value::Null);
        assert_eq!(
            parse_typed("[3 x i8] c\"a\\0Ab\"").value,
            Value::Bytes(b"a\nb".to_vec())
        );
        assert_eq!(
            parse_typed("ptr @\"odd name\"").value,
            Value::global("odd name")
        );
        assert_eq!(
            parse_typed("ptr @12").value,
            Value::Global(SymbolName::Numbered(12))
        );
    }

    #[test]
    fn constant_expressions() {
        let tv = parse_typed("ptr bitcast (ptr @f to ptr)");
        assert_eq!(tv.value.direct_symbol(), Some(&SymbolName::from("f")));

        let tv = parse_typed("[2 x ptr] [ptr @a, ptr blockaddress(@b, %bb)]");
        let mut seen = Vec::new();
        tv.value.for_each_symbol(|name| seen.push(name.raw()));
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn function_with_blocks() {
        let src = r#"
            define internal fastcc i32 @f(i32 %x, ...) personality ptr @pers {
            entry:
              %y: i32 = add i32 %x, i32 1
              call @g()
              %r: i32 = invoke @h(i32 %y) to label %ok unwind label %bad
            ok:
              ret i32 %r
            bad:
              %lp: ptr = landingpad
              resume ptr %lp
            }
        "#;
        let f = function_parser().parse(src.trim()).into_result().unwrap();
        assert_eq!(f.attributes.linkage, Linkage::Internal);
        assert_eq!(f.cconv, CallingConvention::FastC);
        assert!(f.vararg);
        assert_eq!(f.blocks.len(), 3);
        assert_eq!(f.blocks[0].instructions.len(), 2);
        assert_eq!(f.blocks[0].terminator.successors(), vec!["ok", "bad"]);
        assert_eq!(f.calls().count(), 2);
    }

    #[test]
    fn global_declaration_followed_by_global() {
        let module = parse_module(
            "@a = external global i32\n@b = internal constant ptr @a, section \"data\", align 8\n",
        )
        .unwrap();
        assert_eq!(module.globals.len(), 2);
        assert!(module.globals[0].is_declaration());
        assert_eq!(module.globals[1].initializer, Some(Value::global("a")));
        assert_eq!(module.globals[1].attributes.section.as_deref(), Some("data"));
        assert_eq!(module.globals[1].align, Some(8));
    }

    #[test]
    fn errors_carry_spans_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ll");
        std::fs::write(&path, "define void @f( {\n").unwrap();

        let mut module = Module::default();
        let err = extend_module_from_path(&mut module, &path).unwrap_err();
        match err {
            Error::ParserErrors { errors } => {
                assert!(!errors.is_empty());
                assert!(errors[0].file.as_deref().unwrap().ends_with("broken.ll"));
                assert!(errors[0].start <= errors[0].end);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn body_without_terminator_is_rejected() {
        let err = parse_module("define void @f() {\nentry:\n  %x: i32 = add i32 1, i32 2\n}\n");
        assert!(err.is_err());
    }
}
