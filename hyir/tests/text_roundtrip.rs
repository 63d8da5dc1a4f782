use hyir::{
    linkage::{CallingConvention, DllStorageClass, Linkage, Visibility},
    module::Module,
    name::SymbolName,
    parser::{extend_module_from_string, parse_module},
    types::Type,
    value::Value,
    verify::verify_module,
};

const SAMPLE: &str = r#"
; a small but feature-complete module
source_filename = "big.c"
target datalayout = "e-m:e-i64:64"
target triple = "x86_64-unknown-linux-gnu"

%struct.node = type { i32, ptr }
%opaque.t = type opaque

@table = internal constant [2 x ptr] [ptr @f, ptr @g], align 8
@counter = external global i32
@0 = private constant [3 x i8] c"hi\00"
@tls = hidden thread_local global i64 -1, section ".tdata"
@exported = dllexport global <{ i8, double }> <{ i8 1, double 2.5 }>
@"\01weird name" = weak global ptr bitcast (ptr @g to ptr)
@addr = global ptr blockaddress(@f, %entry)
@vec = global <2 x i32> <i32 1, i32 2>
@empty = global {} {}

declare i32 @printf(ptr, ...)
declare extern_weak void @maybe()

define internal fastcc i32 @f(i32 %x) personality ptr @pers {
entry:
  %y: i32 = add i32 %x, i32 1
  %r: i32 = call @g(i32 %y)
  store ptr @f, ptr @counter
  %c: i1 = icmp i32 %r, i32 0
  br i1 %c, label %then, label %"else block"
then:
  %v: i32 = invoke cc 42 @g(i32 %r) to label %"else block" unwind label %lp
"else block":
  ret i32 %r
lp:
  %e: ptr = landingpad
  resume ptr %e
}

define i32 @g(i32 %a) section "hot" {
entry:
  %s: i32 = call ccc @printf(ptr @0, i32 %a)
  ret i32 %s
}

define void @pers() {
entry:
  unreachable
}
"#;

#[test]
fn sample_parses_with_expected_shape() {
    let module = parse_module(SAMPLE).expect("sample parses");

    assert_eq!(module.source_filename.as_deref(), Some("big.c"));
    assert_eq!(
        module.target_triple.as_deref(),
        Some("x86_64-unknown-linux-gnu")
    );
    assert_eq!(module.types.len(), 2);
    assert_eq!(module.types.get("opaque.t"), Some(&None));

    assert_eq!(module.globals.len(), 9);
    assert_eq!(module.functions.len(), 5);

    let table = module.global(&"table".into()).unwrap();
    assert_eq!(table.attributes.linkage, Linkage::Internal);
    assert!(table.constant);
    assert_eq!(table.align, Some(8));

    let anon = module.global(&SymbolName::Numbered(0)).unwrap();
    assert_eq!(anon.initializer, Some(Value::Bytes(b"hi\0".to_vec())));

    let tls = module.global(&"tls".into()).unwrap();
    assert!(tls.thread_local);
    assert_eq!(tls.attributes.visibility, Visibility::Hidden);
    assert_eq!(tls.attributes.section.as_deref(), Some(".tdata"));

    let exported = module.global(&"exported".into()).unwrap();
    assert_eq!(exported.attributes.dll_storage, DllStorageClass::DllExport);

    assert!(module.global(&"\u{1}weird name".into()).is_some());

    let f = module.function(&"f".into()).unwrap();
    assert_eq!(f.cconv, CallingConvention::FastC);
    assert_eq!(f.blocks.len(), 4);
    assert!(f.block("else block").is_some());

    let printf = module.function(&"printf".into()).unwrap();
    assert!(printf.is_declaration());
    assert!(printf.vararg);
    assert_eq!(printf.params[0].ty, Type::PTR);
}

#[test]
fn printed_module_parses_back_to_the_same_module() {
    let module = parse_module(SAMPLE).unwrap();
    let printed = module.to_string();
    let reparsed = parse_module(&printed).expect("printed module parses");
    assert_eq!(reparsed, module);
    assert_eq!(reparsed.to_string(), printed);
}

#[test]
fn sample_verifies() {
    let module = parse_module(SAMPLE).unwrap();
    if let Err(diagnostics) = verify_module(&module) {
        panic!("unexpected diagnostics:\n{}", diagnostics);
    }
}

#[test]
fn extending_appends_symbols() {
    let mut module = parse_module("declare void @a()\n").unwrap();
    extend_module_from_string(&mut module, "declare void @b()\n@c = global i8 0\n").unwrap();
    let names: Vec<String> = module.symbol_names().map(|n| n.raw()).collect();
    assert_eq!(names, vec!["c", "a", "b"]);
}

#[test]
fn stripped_function_prints_as_declaration() {
    let mut module = parse_module(SAMPLE).unwrap();
    let g = module
        .functions
        .iter_mut()
        .find(|f| f.name == "g".into())
        .unwrap();
    g.strip_body();
    let printed = module.to_string();
    assert!(printed.contains("declare i32 @g(i32) section \"hot\"\n"));
    assert_eq!(parse_module(&printed).unwrap(), module);
}

#[test]
fn escaped_names_round_trip_byte_for_byte() {
    let source = "declare void @\"\\C3\\A9t\\C3\\A9\"()\n";
    let module = parse_module(source).unwrap();
    assert_eq!(module.functions[0].name, SymbolName::from("été"));
    let printed = module.to_string();
    assert!(printed.contains("@\"\\C3\\A9t\\C3\\A9\"()"));
    assert_eq!(parse_module(&printed).unwrap(), module);
}

#[test]
fn names_that_are_not_utf8_are_rejected() {
    assert!(parse_module("declare void @\"\\FFx\"()\n").is_err());
    assert!(parse_module("@\"\\C3\" = global i8 0\n").is_err());
}
