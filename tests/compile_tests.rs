//! End-to-end compilation tests
//!
//! Each test builds a declaration tree with the `ast` builders, compiles one
//! class and inspects the IR module, metadata and slot map.

use tsyul::ast::{
    AssignOp, BinaryOp, ClassDecl, ConstructorDecl, EventDecl, Expression, FieldDecl,
    InterfaceDecl, MethodDecl, MethodKind, Mutability, Param, SourceUnit, Statement, StorageClass,
    UnaryOp,
};
use tsyul::compiler::abi::selector_hex;
use tsyul::{CompileOptions, CompileResult, Compiler, Error, EvmVersion, RevertStrings};

// =============================================================================
// FIXTURES
// =============================================================================

fn sender() -> Expression {
    Expression::ident("msg").member("sender")
}

fn balance_of(who: Expression) -> Expression {
    Expression::this_field("balanceOf").index(who)
}

fn token_class() -> ClassDecl {
    let transfer = MethodDecl::new("transfer")
        .param("to", "address")
        .param("amount", "u256")
        .returns("bool")
        .body(vec![
            Statement::expr(Expression::ident("require").call(vec![
                Expression::binary(BinaryOp::GtEq, balance_of(sender()), Expression::ident("amount")),
                Expression::string("insufficient balance"),
            ])),
            Statement::expr(Expression::compound(
                AssignOp::Sub,
                balance_of(sender()),
                Expression::ident("amount"),
            )),
            Statement::expr(Expression::compound(
                AssignOp::Add,
                balance_of(Expression::ident("to")),
                Expression::ident("amount"),
            )),
            Statement::emit(
                "Transfer",
                vec![sender(), Expression::ident("to"), Expression::ident("amount")],
            ),
            Statement::ret(Expression::Bool(true)),
        ]);

    ClassDecl::new("Token")
        .field(FieldDecl::new("balanceOf", "Mapping<address, u256>").public())
        .field(FieldDecl::new("totalSupply", "u256").public())
        .event(
            EventDecl::new("Transfer")
                .field("from", "address", true)
                .field("to", "address", true)
                .field("value", "u256", false),
        )
        .constructor(ConstructorDecl::new(
            vec![Param::new("supply", "u256")],
            vec![
                Statement::expr(Expression::assign(
                    Expression::this_field("totalSupply"),
                    Expression::ident("supply"),
                )),
                Statement::expr(Expression::assign(balance_of(sender()), Expression::ident("supply"))),
            ],
        ))
        .method(transfer)
}

fn token_unit() -> SourceUnit {
    SourceUnit::new("token.ts").with_class(token_class())
}

fn compile(unit: &SourceUnit, class: &str) -> CompileResult {
    Compiler::default()
        .compile(unit, &[], class)
        .unwrap_or_else(|e| panic!("{} failed to compile: {}", class, e))
}

fn compile_err(unit: &SourceUnit, class: &str) -> Error {
    match Compiler::default().compile(unit, &[], class) {
        Ok(_) => panic!("{} compiled but should have failed", class),
        Err(e) => e,
    }
}

// =============================================================================
// TOKEN
// =============================================================================

#[test]
fn test_token_compiles_with_known_selectors() {
    let result = compile(&token_unit(), "Token");

    let transfer = result.function("transfer").unwrap();
    assert_eq!(transfer.signature, "transfer(address,uint256)");
    assert_eq!(selector_hex(&transfer.selector), "0xa9059cbb");
    assert!(transfer.has_return);

    let getter = result.function("balanceOf").unwrap();
    assert_eq!(getter.signature, "balanceOf(address)");
    assert_eq!(selector_hex(&getter.selector), "0x70a08231");
    assert_eq!(getter.ir_name, "getter_balanceOf");

    let text = result.module.to_string();
    assert!(text.contains("case 0xa9059cbb"));
    assert!(text.contains("case 0x70a08231"));
    assert!(text.contains("case 0x18160ddd"));
    assert!(text.contains("object \"Token_deployed\""));
}

#[test]
fn test_token_event_uses_three_topics() {
    let result = compile(&token_unit(), "Token");
    let text = result.module.to_string();
    assert!(text.contains("log3("));

    let event = &result.events[0];
    assert_eq!(event.signature, "Transfer(address,address,uint256)");
    assert_eq!(
        hex::encode(event.topic),
        "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
    );
}

#[test]
fn test_token_constructor_region() {
    let result = compile(&token_unit(), "Token");
    let ctor = tsyul::compiler::debug::format_block(&result.module.constructor_code, 0);
    assert!(ctor.starts_with("mstore(64, 128)\n"));
    assert!(ctor.contains("if callvalue() {"));
    assert!(ctor.contains("constructor_Token("));
    assert!(ctor.contains("codecopy(0, dataoffset(\"Token_deployed\"), datasize(\"Token_deployed\"))"));
    assert!(ctor.contains("function constructor_Token(var_supply)"));
}

#[test]
fn test_token_abi_json() {
    let result = compile(&token_unit(), "Token");
    let abi: serde_json::Value = serde_json::from_str(result.abi.as_deref().unwrap()).unwrap();
    let entries = abi.as_array().unwrap();
    let kinds: Vec<&str> = entries.iter().filter_map(|e| e["type"].as_str()).collect();
    assert!(kinds.contains(&"function"));
    assert!(kinds.contains(&"constructor"));
    assert!(kinds.contains(&"event"));
    let transfer = entries.iter().find(|e| e["name"] == "transfer").unwrap();
    assert_eq!(transfer["inputs"][0]["type"], "address");
    assert_eq!(transfer["outputs"][0]["type"], "bool");
    assert_eq!(transfer["stateMutability"], "nonpayable");
}

#[test]
fn test_abi_can_be_disabled() {
    let options = CompileOptions::from_json(r#"{"emit_abi": false}"#).unwrap();
    let result = Compiler::new(options).compile(&token_unit(), &[], "Token").unwrap();
    assert!(result.abi.is_none());
}

#[test]
fn test_selector_independent_of_declaration_order() {
    let noop = |name: &str| MethodDecl::new(name).param("to", "address").param("amount", "u256");
    let forward = SourceUnit::new("a.ts").with_class(
        ClassDecl::new("A").method(noop("approve")).method(noop("transfer")),
    );
    let backward = SourceUnit::new("b.ts").with_class(
        ClassDecl::new("A").method(noop("transfer")).method(noop("approve")),
    );
    let a = compile(&forward, "A");
    let b = compile(&backward, "A");
    assert_eq!(a.function("transfer").unwrap().selector, b.function("transfer").unwrap().selector);
    assert_eq!(a.module.deployed.code[1], b.module.deployed.code[1]);
}

// =============================================================================
// STORAGE
// =============================================================================

#[test]
fn test_packing_address_u64_u32() {
    let unit = SourceUnit::new("p.ts").with_class(
        ClassDecl::new("Packed")
            .field(FieldDecl::new("owner", "address"))
            .field(FieldDecl::new("stamp", "u64"))
            .field(FieldDecl::new("nonce", "u32"))
            .field(FieldDecl::new("total", "u256")),
    );
    let result = compile(&unit, "Packed");
    let at = |name: &str| {
        let s = result.layout.get(name).unwrap();
        (s.slot, s.byte_offset)
    };
    assert_eq!(at("owner"), (0, 0));
    assert_eq!(at("stamp"), (0, 20));
    assert_eq!(at("nonce"), (0, 28));
    assert_eq!(at("total"), (1, 0));
    assert!(result.layout.get("stamp").unwrap().is_packed());
    assert!(!result.layout.get("total").unwrap().is_packed());
}

#[test]
fn test_duplicate_pin_rejected() {
    let unit = SourceUnit::new("p.ts").with_class(
        ClassDecl::new("Pins")
            .field(FieldDecl::new("a", "u256").pinned(5))
            .field(FieldDecl::new("b", "u256").pinned(5)),
    );
    assert!(matches!(compile_err(&unit, "Pins"), Error::DuplicateSlotPin { slot: 5, .. }));
}

#[test]
fn test_duplicate_field_across_composition() {
    let unit = SourceUnit::new("c.ts")
        .with_class(ClassDecl::new("Owned").field(FieldDecl::new("owner", "address")))
        .with_class(ClassDecl::new("Admin").field(FieldDecl::new("owner", "address")))
        .with_class(ClassDecl::new("Both").compose(&["Owned", "Admin"]));
    assert!(matches!(
        compile_err(&unit, "Both"),
        Error::DuplicateStorageField { ref name, .. } if name == "owner"
    ));
}

#[test]
fn test_transient_requires_cancun() {
    let unit = SourceUnit::new("t.ts").with_class(
        ClassDecl::new("Lock")
            .field(FieldDecl::new("locked", "bool").storage(StorageClass::Transient))
            .method(MethodDecl::new("enter").body(vec![Statement::expr(Expression::assign(
                Expression::this_field("locked"),
                Expression::Bool(true),
            ))])),
    );

    let cancun = compile(&unit, "Lock");
    assert!(cancun.module.to_string().contains("tstore("));

    let options = CompileOptions {
        evm_version: EvmVersion::Shanghai,
        ..CompileOptions::default()
    };
    let err = Compiler::new(options).compile(&unit, &[], "Lock").unwrap_err();
    assert_eq!(err, Error::TransientUnsupported("locked".into()));
}

#[test]
fn test_nested_mapping_uses_slot_helper() {
    let unit = SourceUnit::new("m.ts").with_class(
        ClassDecl::new("Allowances")
            .field(FieldDecl::new("allowance", "Mapping<address, Mapping<address, u256>>"))
            .method(
                MethodDecl::new("approve")
                    .param("spender", "address")
                    .param("amount", "u256")
                    .body(vec![Statement::expr(Expression::assign(
                        Expression::this_field("allowance")
                            .index(sender())
                            .index(Expression::ident("spender")),
                        Expression::ident("amount"),
                    ))]),
            ),
    );
    let result = compile(&unit, "Allowances");
    assert!(result.module.deployed_functions().contains(&"mapping_slot"));
    let text = tsyul::compiler::debug::format_block(&result.module.deployed.code, 0);
    assert!(text.matches("mapping_slot(").count() >= 3);
}

#[test]
fn test_packed_field_write_masks_neighbours() {
    let unit = SourceUnit::new("p.ts").with_class(
        ClassDecl::new("Flags")
            .field(FieldDecl::new("owner", "address"))
            .field(FieldDecl::new("flag", "u8"))
            .method(MethodDecl::new("setFlag").param("v", "u8").body(vec![Statement::expr(
                Expression::assign(Expression::this_field("flag"), Expression::ident("v")),
            )]))
            .method(MethodDecl::new("setOwner").param("who", "address").body(vec![Statement::expr(
                Expression::assign(Expression::this_field("owner"), Expression::ident("who")),
            )])),
    );
    let result = compile(&unit, "Flags");
    assert_eq!(result.layout.get("flag").unwrap().byte_offset, 20);

    let text = result.module.to_string();
    assert!(text.contains(
        "sstore(0, or(and(sload(0), not(shl(160, 0xff))), shl(160, and(var_v, 0xff))))"
    ));
    let mask = format!("0x{}", "ff".repeat(20));
    assert!(text.contains(&format!(
        "sstore(0, or(and(sload(0), not({})), and(var_who, {})))",
        mask, mask
    )));
}

#[test]
fn test_nested_mapping_key_order() {
    let unit = SourceUnit::new("m.ts").with_class(
        ClassDecl::new("Allowances")
            .field(FieldDecl::new("allowance", "Mapping<address, Mapping<address, u256>>"))
            .method(
                MethodDecl::new("set")
                    .param("holder", "address")
                    .param("spender", "address")
                    .param("amount", "u256")
                    .body(vec![Statement::expr(Expression::assign(
                        Expression::this_field("allowance")
                            .index(Expression::ident("holder"))
                            .index(Expression::ident("spender")),
                        Expression::ident("amount"),
                    ))]),
            ),
    );
    let text = compile(&unit, "Allowances").module.to_string();

    // outer key hashes with the field slot, inner key with the outer entry
    let outer = text
        .lines()
        .map(str::trim)
        .find(|l| l.ends_with(":= mapping_slot(var_holder, 0)"))
        .and_then(|l| l.strip_prefix("let "))
        .and_then(|l| l.split(" := ").next())
        .expect("outer mapping entry is bound to a temporary");
    let inner = format!("mapping_slot(var_spender, {})", outer);
    assert!(text.contains(&inner), "missing {}", inner);
    assert!(!text.contains("mapping_slot(var_spender, 0)"));
}

#[test]
fn test_fixed_array_param_keeps_length_prefix() {
    let unit = SourceUnit::new("f.ts").with_class(
        ClassDecl::new("Picker")
            .field(FieldDecl::new("total", "u256"))
            .constructor(ConstructorDecl::new(
                vec![Param::new("seed", "u256[2]")],
                vec![Statement::expr(Expression::assign(
                    Expression::this_field("total"),
                    Expression::ident("seed").index(Expression::num(1)),
                ))],
            ))
            .method(
                MethodDecl::new("first")
                    .param("a", "u256[3]")
                    .returns("u256")
                    .mutability(Mutability::Pure)
                    .body(vec![Statement::ret(Expression::ident("a").index(Expression::num(0)))]),
            ),
    );
    let result = compile(&unit, "Picker");
    assert_eq!(result.function("first").unwrap().signature, "first(uint256[3])");

    let deployed = tsyul::compiler::debug::format_block(&result.module.deployed.code, 0);
    assert!(deployed.contains(":= abi_decode_calldata_words(4, 3)\n"));
    assert!(deployed.contains("mstore(memPtr, count)"));
    assert!(deployed.contains("memory_array_index(var_a, 0)"));

    let ctor = tsyul::compiler::debug::format_block(&result.module.constructor_code, 0);
    assert!(ctor.contains("let ctorArg_0 := allocate_memory(96)"));
    assert!(ctor.contains("mstore(ctorArg_0, 2)"));
    assert!(ctor.contains("copy_memory(argBase, add(ctorArg_0, 32), 64)"));
}

#[test]
fn test_fixed_array_bounds() {
    let store = |index: Expression| {
        MethodDecl::new("store").param("i", "u256").body(vec![Statement::expr(Expression::assign(
            Expression::this_field("slots").index(index),
            Expression::num(1),
        ))])
    };

    let literal = SourceUnit::new("f.ts").with_class(
        ClassDecl::new("Fixed")
            .field(FieldDecl::new("slots", "u256[4]"))
            .method(store(Expression::num(4))),
    );
    assert!(matches!(
        compile_err(&literal, "Fixed"),
        Error::IndexOutOfBounds { index: 4, size: 4, .. }
    ));

    let runtime = SourceUnit::new("f.ts").with_class(
        ClassDecl::new("Fixed")
            .field(FieldDecl::new("slots", "u256[4]"))
            .method(store(Expression::ident("i"))),
    );
    let result = compile(&runtime, "Fixed");
    assert!(result.module.deployed_functions().contains(&"panic_error_0x32"));
    let text = result.module.to_string();
    assert!(text.contains("panic_error_0x32()"));
    assert!(text.contains(", 4)) {"));
}

// =============================================================================
// INHERITANCE
// =============================================================================

fn value_method(value: Expression) -> MethodDecl {
    MethodDecl::new("getValue")
        .returns("u256")
        .mutability(Mutability::View)
        .body(vec![Statement::ret(value)])
}

#[test]
fn test_override_and_super_dispatch() {
    let unit = SourceUnit::new("i.ts")
        .with_class(ClassDecl::new("Base").method(value_method(Expression::num(1))))
        .with_class(ClassDecl::new("Derived").extends("Base").method(value_method(
            Expression::binary(
                BinaryOp::Add,
                Expression::Super.method("getValue", vec![]),
                Expression::num(1),
            ),
        )));
    let result = compile(&unit, "Derived");

    let functions = result.module.deployed_functions();
    assert!(functions.contains(&"fun_getValue"));
    assert!(functions.contains(&"fun_Base_getValue"));
    assert_eq!(result.function("getValue").unwrap().ir_name, "fun_getValue");

    let text = result.module.to_string();
    assert!(text.contains("fun_Base_getValue()"));
}

#[test]
fn test_super_without_parent_is_fatal() {
    let unit = SourceUnit::new("i.ts").with_class(
        ClassDecl::new("Lonely")
            .method(value_method(Expression::Super.method("getValue", vec![]))),
    );
    assert!(matches!(
        compile_err(&unit, "Lonely"),
        Error::MissingSuperImplementation { .. }
    ));
}

#[test]
fn test_cyclic_inheritance() {
    let unit = SourceUnit::new("c.ts")
        .with_class(ClassDecl::new("A").extends("B"))
        .with_class(ClassDecl::new("B").extends("A"));
    assert!(matches!(compile_err(&unit, "A"), Error::CyclicInheritance(_)));
}

#[test]
fn test_unknown_ancestor() {
    let unit = SourceUnit::new("c.ts").with_class(ClassDecl::new("A").extends("Ghost"));
    assert!(matches!(
        compile_err(&unit, "A"),
        Error::UnresolvedAncestor { ref name, .. } if name == "Ghost"
    ));
}

// =============================================================================
// CONTROL FLOW AND CREATION
// =============================================================================

#[test]
fn test_else_branch_and_contract_creation() {
    let make = MethodDecl::new("make").param("x", "u256").returns("Child").body(vec![
        Statement::let_typed("n", "u8", Some(Expression::ident("x").cast("u8"))),
        Statement::if_else(
            Expression::unary(
                UnaryOp::Not,
                Expression::binary(BinaryOp::Eq, Expression::ident("n"), Expression::num(0)),
            ),
            vec![Statement::expr(Expression::assign(Expression::this_field("made"), Expression::num(1)))],
            vec![Statement::expr(Expression::assign(Expression::this_field("made"), Expression::num(2)))],
        ),
        Statement::ret(Expression::new_contract("Child", vec![])),
    ]);
    let unit = SourceUnit::new("f.ts")
        .with_class(ClassDecl::new("Child").method(MethodDecl::new("ping")))
        .with_class(ClassDecl::new("Factory").field(FieldDecl::new("made", "u256")).method(make));
    let result = compile(&unit, "Factory");

    assert_eq!(result.module.dependencies, vec!["Child".to_string()]);
    assert_eq!(result.function("make").unwrap().signature, "make(uint256)");
    let text = result.module.to_string();
    assert!(text.contains("// links object \"Child\""));
    assert!(text.contains("dataoffset(\"Child\")"));
    assert!(text.contains("let __cond_"));
    assert!(text.contains("if iszero(__cond_"));
}

/// Trimmed lines following the first line equal to `header`
fn lines_after<'t>(text: &'t str, header: &str) -> Vec<&'t str> {
    let mut lines = text.lines().map(str::trim);
    lines
        .by_ref()
        .find(|l| *l == header)
        .unwrap_or_else(|| panic!("missing `{}` in\n{}", header, text));
    lines.collect()
}

fn counter(name: &str) -> Statement {
    Statement::let_typed(name, "u256", Some(Expression::num(0)))
}

fn local_is(name: &str, value: u128) -> Expression {
    Expression::binary(BinaryOp::Eq, Expression::ident(name), Expression::num(value))
}

fn below_n(name: &str) -> Expression {
    Expression::binary(BinaryOp::Lt, Expression::ident(name), Expression::ident("n"))
}

fn loop_unit(body: Vec<Statement>) -> SourceUnit {
    SourceUnit::new("l.ts").with_class(
        ClassDecl::new("Loops")
            .method(
                MethodDecl::new("bound")
                    .returns("u256")
                    .mutability(Mutability::Pure)
                    .body(vec![Statement::ret(Expression::num(5))]),
            )
            .method(
                MethodDecl::new("run")
                    .param("n", "u256")
                    .returns("u256")
                    .mutability(Mutability::View)
                    .body(body),
            ),
    )
}

#[test]
fn test_while_loop_lowering() {
    let unit = loop_unit(vec![
        counter("i"),
        Statement::While {
            condition: below_n("i"),
            body: vec![
                Statement::expr(Expression::post_inc(Expression::ident("i"))),
                Statement::if_(local_is("i", 2), vec![Statement::Continue]),
                Statement::if_(local_is("i", 8), vec![Statement::Break]),
            ],
        },
        Statement::ret(Expression::ident("i")),
    ]);
    let text = compile(&unit, "Loops").module.to_string();

    let body = lines_after(&text, "for { } lt(var_i, var_n) { } {");
    assert_eq!(
        &body[..8],
        &[
            "var_i := add(var_i, 1)",
            "if eq(var_i, 2) {",
            "continue",
            "}",
            "if eq(var_i, 8) {",
            "break",
            "}",
            "}",
        ]
    );
}

#[test]
fn test_do_while_runs_body_first() {
    let unit = loop_unit(vec![
        counter("i"),
        Statement::DoWhile {
            body: vec![
                Statement::expr(Expression::post_inc(Expression::ident("i"))),
                Statement::if_(local_is("i", 3), vec![Statement::Continue]),
            ],
            condition: below_n("i"),
        },
        Statement::ret(Expression::ident("i")),
    ]);
    let text = compile(&unit, "Loops").module.to_string();

    let body = lines_after(&text, "for { } 1 { } {");
    assert_eq!(
        &body[..8],
        &[
            "var_i := add(var_i, 1)",
            "if eq(var_i, 3) {",
            "continue",
            "}",
            "if iszero(lt(var_i, var_n)) {",
            "break",
            "}",
            "}",
        ]
    );
}

#[test]
fn test_for_loop_init_condition_and_step() {
    let unit = loop_unit(vec![
        counter("total"),
        Statement::For {
            init: Some(Box::new(counter("i"))),
            condition: Some(below_n("i")),
            update: Some(Expression::post_inc(Expression::ident("i"))),
            body: vec![
                Statement::if_(local_is("i", 3), vec![Statement::Continue]),
                Statement::if_(local_is("i", 7), vec![Statement::Break]),
                Statement::expr(Expression::compound(
                    AssignOp::Add,
                    Expression::ident("total"),
                    Expression::ident("i"),
                )),
            ],
        },
        Statement::ret(Expression::ident("total")),
    ]);
    let text = compile(&unit, "Loops").module.to_string();

    assert!(text.contains("let var_total := 0\n"));
    let body = lines_after(
        &text,
        "for { let var_i := 0 } lt(var_i, var_n) { var_i := add(var_i, 1) } {",
    );
    assert_eq!(
        &body[..8],
        &[
            "if eq(var_i, 3) {",
            "continue",
            "}",
            "if eq(var_i, 7) {",
            "break",
            "}",
            "var_total := add(var_total, var_i)",
            "}",
        ]
    );
}

#[test]
fn test_for_loop_compound_step_and_computed_condition() {
    let unit = loop_unit(vec![
        Statement::For {
            init: Some(Box::new(counter("i"))),
            condition: Some(Expression::binary(
                BinaryOp::Lt,
                Expression::ident("i"),
                Expression::This.method("bound", vec![]),
            )),
            update: Some(Expression::compound(
                AssignOp::Add,
                Expression::ident("i"),
                Expression::num(2),
            )),
            body: vec![Statement::if_(local_is("i", 4), vec![Statement::Break])],
        },
        Statement::ret(Expression::ident("n")),
    ]);
    let text = compile(&unit, "Loops").module.to_string();

    // the call in the condition runs at the top of every iteration
    let body = lines_after(&text, "for { let var_i := 0 } 1 { var_i := add(var_i, 2) } {");
    let bound = body[0]
        .strip_prefix("let ")
        .and_then(|l| l.strip_suffix(" := fun_bound()"))
        .unwrap_or_else(|| panic!("expected the bound call first, got `{}`", body[0]));
    assert_eq!(body[1], format!("if iszero(lt(var_i, {})) {{", bound));
    assert_eq!(&body[2..4], &["break", "}"]);
    assert_eq!(body[4], "if eq(var_i, 4) {");
}

#[test]
fn test_class_cannot_create_itself() {
    let unit = SourceUnit::new("f.ts").with_class(ClassDecl::new("Loop").method(
        MethodDecl::new("spawn").body(vec![Statement::expr(Expression::new_contract("Loop", vec![]))]),
    ));
    assert!(matches!(compile_err(&unit, "Loop"), Error::Unsupported(_)));
}

// =============================================================================
// HELPERS, CALLS, ERRORS
// =============================================================================

#[test]
fn test_encode_helpers_shared_by_arity() {
    let hash_of = |name: &str, args: &[&str]| {
        let mut method = MethodDecl::new(name).returns("bytes32").mutability(Mutability::Pure);
        for a in args {
            method = method.param(a, "u256");
        }
        let encoded = Expression::ident("abi")
            .method("encode", args.iter().map(|a| Expression::ident(a)).collect());
        method.body(vec![Statement::ret(Expression::ident("keccak256").call(vec![encoded]))])
    };
    let unit = SourceUnit::new("h.ts").with_class(
        ClassDecl::new("Hasher")
            .method(hash_of("first", &["a", "b", "c"]))
            .method(hash_of("second", &["x", "y", "z"]))
            .method(hash_of("pair", &["a", "b"])),
    );
    let result = compile(&unit, "Hasher");
    let functions = result.module.deployed_functions();
    assert_eq!(functions.iter().filter(|f| **f == "__abi_encode_3").count(), 1);
    assert_eq!(functions.iter().filter(|f| **f == "__abi_encode_2").count(), 1);
}

#[test]
fn test_call_helpers_shared_by_arity() {
    let words = |name: &str, n: usize| {
        (0..n).fold(MethodDecl::new(name), |m, i| m.param(&format!("a{}", i), "u256"))
    };
    let args = |n: u128| (1..=n).map(Expression::num).collect::<Vec<_>>();
    let pool = || Expression::this_field("pool");
    let unit = SourceUnit::new("p.ts")
        .with_interface(
            InterfaceDecl::new("IPool")
                .method(words("deposit", 3))
                .method(words("withdraw", 3))
                .method(words("swap", 2)),
        )
        .with_class(
            ClassDecl::new("Router")
                .field(FieldDecl::new("pool", "IPool"))
                .method(MethodDecl::new("route").body(vec![
                    Statement::expr(pool().method("deposit", args(3))),
                    Statement::expr(pool().method("withdraw", args(3))),
                    Statement::expr(pool().method("swap", args(2))),
                ])),
        );
    let result = compile(&unit, "Router");

    let functions = result.module.deployed_functions();
    assert_eq!(functions.iter().filter(|f| **f == "__call_3").count(), 1);
    assert_eq!(functions.iter().filter(|f| **f == "__call_2").count(), 1);

    let deployed = tsyul::compiler::debug::format_block(&result.module.deployed.code, 0);
    assert_eq!(deployed.matches("function __call_3(").count(), 1);
    assert_eq!(deployed.matches("function __call_2(").count(), 1);
    assert_eq!(deployed.matches(":= __call_3(").count(), 2);
    assert_eq!(deployed.matches(":= __call_2(").count(), 1);
}

fn oracle_unit(body: Vec<Statement>) -> SourceUnit {
    SourceUnit::new("o.ts")
        .with_interface(
            InterfaceDecl::new("IOracle")
                .method(MethodDecl::new("price").returns("u256").mutability(Mutability::View)),
        )
        .with_class(
            ClassDecl::new("Reader")
                .field(FieldDecl::new("oracle", "IOracle"))
                .method(MethodDecl::new("read").returns("u256").body(body)),
        )
}

#[test]
fn test_try_catch_guards_call() {
    let unit = oracle_unit(vec![Statement::Try {
        body: vec![
            Statement::let_("p", Expression::this_field("oracle").method("price", vec![])),
            Statement::ret(Expression::ident("p")),
        ],
        catch_binding: None,
        catch_body: vec![Statement::ret(Expression::num(0))],
    }]);
    let result = compile(&unit, "Reader");
    let functions = result.module.deployed_functions();
    assert!(functions.contains(&"__staticcall_0"));
    assert!(functions.contains(&"__abi_decode_1"));

    // results are only decoded when the call succeeded
    let text = result.module.to_string();
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let at = lines
        .iter()
        .position(|l| l.contains(":= __abi_decode_1("))
        .expect("guarded call decodes its result");
    assert!(!lines[at].starts_with("let "));
    assert!(lines[at - 1].starts_with("if _"), "decode outside success branch: {}", lines[at - 1]);
    assert!(text.contains("if iszero(_"));
}

#[test]
fn test_try_without_call() {
    let unit = oracle_unit(vec![Statement::Try {
        body: vec![Statement::ret(Expression::num(1))],
        catch_binding: None,
        catch_body: vec![],
    }]);
    assert_eq!(compile_err(&unit, "Reader"), Error::TryWithoutCall("fun_read".into()));
}

#[test]
fn test_unguarded_call_forwards_failure() {
    let unit = oracle_unit(vec![Statement::ret(
        Expression::this_field("oracle").method("price", vec![]),
    )]);
    let result = compile(&unit, "Reader");
    assert!(result.module.deployed_functions().contains(&"revert_forward"));

    // short returndata reverts instead of reading stale memory
    let deployed = tsyul::compiler::debug::format_block(&result.module.deployed.code, 0);
    assert!(deployed.contains("if lt(mload(data), 32) {"));
}

#[test]
fn test_custom_error_and_strip_mode() {
    let unit = SourceUnit::new("e.ts")
        .with_function(tsyul::ast::FunctionDecl::error(
            "Unauthorized",
            vec![Param::new("caller", "address")],
        ))
        .with_class(
            ClassDecl::new("Guarded")
                .method(MethodDecl::new("guard").body(vec![Statement::Throw(
                    Expression::ident("Unauthorized").call(vec![sender()]),
                )]))
                .method(MethodDecl::new("fail").body(vec![Statement::Throw(
                    Expression::string("nope"),
                )])),
        );
    let result = compile(&unit, "Guarded");
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].signature, "Unauthorized(address)");
    let text = result.module.to_string();
    assert!(text.contains("revert(_") && text.contains(", 36)"));
    assert!(result.module.deployed_functions().contains(&"revert_error_string"));

    let options = CompileOptions {
        revert_strings: RevertStrings::Strip,
        ..CompileOptions::default()
    };
    let stripped = Compiler::new(options).compile(&unit, &[], "Guarded").unwrap();
    assert!(!stripped.module.deployed_functions().contains(&"revert_error_string"));
}

#[test]
fn test_too_many_indexed_fields() {
    let event = |anonymous: bool| {
        let mut e = EventDecl::new("Wide");
        for name in ["a", "b", "c", "d"] {
            e = e.field(name, "u256", true);
        }
        if anonymous {
            e = e.anonymous();
        }
        e
    };
    let named = SourceUnit::new("w.ts").with_class(ClassDecl::new("W").event(event(false)));
    assert!(matches!(
        compile_err(&named, "W"),
        Error::TooManyIndexedFields { count: 4, max: 3, .. }
    ));

    let anonymous = SourceUnit::new("w.ts").with_class(ClassDecl::new("W").event(event(true)));
    let result = compile(&anonymous, "W");
    assert!(result.events[0].anonymous);
}

// =============================================================================
// DISPATCH AND DETERMINISM
// =============================================================================

#[test]
fn test_receive_and_fallback_routing() {
    let unit = SourceUnit::new("r.ts").with_class(
        ClassDecl::new("Wallet")
            .method(MethodDecl::new("receive").kind(MethodKind::Receive).mutability(Mutability::Payable))
            .method(MethodDecl::new("fallback").kind(MethodKind::Fallback)),
    );
    let result = compile(&unit, "Wallet");
    assert!(result.functions.is_empty());
    let deployed = tsyul::compiler::debug::format_block(&result.module.deployed.code, 0);
    assert!(deployed.contains("if iszero(calldatasize()) {"));
    assert!(deployed.contains("fun_receive()"));
    assert!(deployed.contains("fun_fallback()"));
}

#[test]
fn test_non_payable_case_checks_value() {
    let unit = SourceUnit::new("v.ts").with_class(
        ClassDecl::new("Vault")
            .method(MethodDecl::new("deposit").mutability(Mutability::Payable))
            .method(MethodDecl::new("ping")),
    );
    let result = compile(&unit, "Vault");
    let deployed = tsyul::compiler::debug::format_block(&result.module.deployed.code, 0);
    assert_eq!(deployed.matches("if callvalue()").count(), 1);
}

#[test]
fn test_deterministic_output() {
    let unit = token_unit();
    let first = compile(&unit, "Token");
    let second = compile(&unit, "Token");
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.module.to_string(), second.module.to_string());
}

#[test]
fn test_compile_all_matches_sequential() {
    let unit = SourceUnit::new("multi.ts")
        .with_class(token_class())
        .with_class(ClassDecl::new("Empty"))
        .with_class(ClassDecl::new("Math").method(
            MethodDecl::new("double").param("x", "u256").returns("u256").static_().body(vec![
                Statement::ret(Expression::binary(
                    BinaryOp::Mul,
                    Expression::ident("x"),
                    Expression::num(2),
                )),
            ]),
        ));
    let classes = Compiler::deployable_classes(&unit);
    assert_eq!(classes, vec!["Token", "Empty"]);

    let compiler = Compiler::default();
    for (name, result) in compiler.compile_all(&unit, &[], &classes) {
        let parallel = result.unwrap();
        let sequential = compiler.compile(&unit, &[], &name).unwrap();
        assert_eq!(parallel.fingerprint, sequential.fingerprint);
    }
}

#[test]
fn test_library_not_deployable() {
    let unit = SourceUnit::new("l.ts").with_class(ClassDecl::new("Math").method(
        MethodDecl::new("one").returns("u256").static_().body(vec![Statement::ret(Expression::num(1))]),
    ));
    assert!(matches!(compile_err(&unit, "Math"), Error::Unsupported(_)));
}
