use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tsyul::ast::{
    AssignOp, BinaryOp, ClassDecl, EventDecl, Expression, FieldDecl, MethodDecl, SourceUnit,
    Statement,
};
use tsyul::Compiler;

/// Token class with `methods` transfer-like methods
fn token(methods: usize) -> ClassDecl {
    let balance = |who: Expression| Expression::this_field("balanceOf").index(who);
    let sender = || Expression::ident("msg").member("sender");

    let mut class = ClassDecl::new("Token")
        .field(FieldDecl::new("balanceOf", "Mapping<address, u256>").public())
        .field(FieldDecl::new("totalSupply", "u256").public())
        .field(FieldDecl::new("decimals", "u8").public())
        .event(
            EventDecl::new("Transfer")
                .field("from", "address", true)
                .field("to", "address", true)
                .field("value", "u256", false),
        );
    for i in 0..methods {
        class = class.method(
            MethodDecl::new(&format!("transfer{}", i))
                .param("to", "address")
                .param("amount", "u256")
                .returns("bool")
                .body(vec![
                    Statement::expr(Expression::ident("require").call(vec![
                        Expression::binary(
                            BinaryOp::GtEq,
                            balance(sender()),
                            Expression::ident("amount"),
                        ),
                        Expression::string("insufficient balance"),
                    ])),
                    Statement::expr(Expression::compound(
                        AssignOp::Sub,
                        balance(sender()),
                        Expression::ident("amount"),
                    )),
                    Statement::expr(Expression::compound(
                        AssignOp::Add,
                        balance(Expression::ident("to")),
                        Expression::ident("amount"),
                    )),
                    Statement::emit(
                        "Transfer",
                        vec![sender(), Expression::ident("to"), Expression::ident("amount")],
                    ),
                    Statement::ret(Expression::Bool(true)),
                ]),
        );
    }
    class
}

fn compile_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile_token");
    let compiler = Compiler::default();

    for methods in [1, 10, 50].iter() {
        let unit = SourceUnit::new("token.ts").with_class(token(*methods));
        group.bench_with_input(BenchmarkId::new("methods", methods), &unit, |b, unit| {
            b.iter(|| black_box(compiler.compile(unit, &[], "Token").unwrap()))
        });
    }
    group.finish();
}

fn print_benchmark(c: &mut Criterion) {
    let unit = SourceUnit::new("token.ts").with_class(token(10));
    let result = Compiler::default().compile(&unit, &[], "Token").unwrap();

    c.bench_function("print and fingerprint module", |b| {
        b.iter(|| black_box(tsyul::compiler::fingerprint(black_box(&result.module))))
    });
}

criterion_group!(benches, compile_benchmark, print_benchmark);
criterion_main!(benches);
