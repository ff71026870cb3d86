//! Debug utilities for inspecting generated IR
//!
//! [`IrModule`] prints in Yul object syntax, which is also the text the
//! determinism fingerprint of a compilation is computed over.

use std::fmt::{self, Write as _};

use sha2::{Digest, Sha256};

use super::ir::{Expression, FunctionDef, IrModule, Literal, Statement};

const INDENT: &str = "    ";

/// Print an IR module in human-readable form
pub fn dump_ir(module: &IrModule) {
    println!("═══════════════════════════════════════════════════════════");
    println!("                    IR DUMP: {}", module.name);
    println!("═══════════════════════════════════════════════════════════");
    println!("Constructor statements: {}", module.constructor_code.len());
    println!("Deployed functions: {:?}", module.deployed_functions());
    println!("Dependencies: {:?}", module.dependencies);
    println!("───────────────────────────────────────────────────────────");
    println!("{}", module);
    println!("═══════════════════════════════════════════════════════════\n");
}

/// SHA-256 of the printed module, hex encoded
pub fn fingerprint(module: &IrModule) -> String {
    let mut hasher = Sha256::new();
    hasher.update(module.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Format a single expression
pub fn format_expression(expr: &Expression) -> String {
    match expr {
        Expression::Literal(Literal::Number(text)) => text.clone(),
        Expression::Literal(Literal::Str(text)) => format!("\"{}\"", escape(text)),
        Expression::Identifier(name) => name.clone(),
        Expression::Call { name, args } => {
            let args: Vec<String> = args.iter().map(format_expression).collect();
            format!("{}({})", name, args.join(", "))
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c if c.is_ascii_graphic() || c == ' ' => out.push(c),
            c => {
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).bytes() {
                    let _ = write!(out, "\\x{:02x}", b);
                }
            }
        }
    }
    out
}

/// Format a statement list at the given depth
pub fn format_block(stmts: &[Statement], depth: usize) -> String {
    let mut out = String::new();
    for s in stmts {
        write_statement(&mut out, s, depth);
    }
    out
}

fn pad(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn write_body(out: &mut String, body: &[Statement], depth: usize) {
    if body.is_empty() {
        out.push_str("{ }\n");
        return;
    }
    out.push_str("{\n");
    for s in body {
        write_statement(out, s, depth + 1);
    }
    pad(out, depth);
    out.push_str("}\n");
}

/// `{ a b }` on one line for for-loop init/post regions
fn inline_region(stmts: &[Statement]) -> String {
    if stmts.is_empty() {
        return "{ }".to_string();
    }
    let inner: Vec<String> = stmts
        .iter()
        .map(|s| format_block(std::slice::from_ref(s), 0).trim_end().to_string())
        .collect();
    format!("{{ {} }}", inner.join(" "))
}

fn write_function(out: &mut String, f: &FunctionDef, depth: usize) {
    let _ = write!(out, "function {}({})", f.name, f.params.join(", "));
    if !f.returns.is_empty() {
        let _ = write!(out, " -> {}", f.returns.join(", "));
    }
    out.push(' ');
    write_body(out, &f.body, depth);
}

fn write_statement(out: &mut String, stmt: &Statement, depth: usize) {
    pad(out, depth);
    match stmt {
        Statement::Block(body) => write_body(out, body, depth),
        Statement::Let { names, value } => {
            let _ = write!(out, "let {}", names.join(", "));
            if let Some(v) = value {
                let _ = write!(out, " := {}", format_expression(v));
            }
            out.push('\n');
        }
        Statement::Assign { names, value } => {
            let _ = writeln!(out, "{} := {}", names.join(", "), format_expression(value));
        }
        Statement::Expression(e) => {
            let _ = writeln!(out, "{}", format_expression(e));
        }
        Statement::If { condition, body } => {
            let _ = write!(out, "if {} ", format_expression(condition));
            write_body(out, body, depth);
        }
        Statement::Switch { expr, cases, default } => {
            let _ = writeln!(out, "switch {}", format_expression(expr));
            for case in cases {
                pad(out, depth);
                let value = match &case.value {
                    Literal::Number(n) => n.clone(),
                    Literal::Str(s) => format!("\"{}\"", escape(s)),
                };
                let _ = write!(out, "case {} ", value);
                write_body(out, &case.body, depth);
            }
            if let Some(body) = default {
                pad(out, depth);
                out.push_str("default ");
                write_body(out, body, depth);
            }
        }
        Statement::For { init, condition, post, body } => {
            let _ = write!(
                out,
                "for {} {} {} ",
                inline_region(init),
                format_expression(condition),
                inline_region(post)
            );
            write_body(out, body, depth);
        }
        Statement::Break => out.push_str("break\n"),
        Statement::Continue => out.push_str("continue\n"),
        Statement::Leave => out.push_str("leave\n"),
        Statement::FunctionDef(f) => write_function(out, f, depth),
        Statement::Raw(text) => {
            let _ = writeln!(out, "{}", text);
        }
        Statement::Comment(text) => {
            let _ = writeln!(out, "// {}", text);
        }
    }
}

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "object \"{}\" {{", escape(&self.name))?;
        for dep in &self.dependencies {
            writeln!(f, "{}// links object \"{}\"", INDENT, escape(dep))?;
        }
        writeln!(f, "{}code {{", INDENT)?;
        f.write_str(&format_block(&self.constructor_code, 2))?;
        writeln!(f, "{}}}", INDENT)?;
        writeln!(f, "{}object \"{}\" {{", INDENT, escape(&self.deployed.name))?;
        writeln!(f, "{0}{0}code {{", INDENT)?;
        f.write_str(&format_block(&self.deployed.code, 3))?;
        writeln!(f, "{0}{0}}}", INDENT)?;
        writeln!(f, "{}}}", INDENT)?;
        writeln!(f, "}}")
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_expression(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ir::{call, ident, num, SwitchCase};

    #[test]
    fn test_expression_format() {
        let e = call("sstore", vec![num(0), call("add", vec![ident("x"), num(1)])]);
        assert_eq!(format_expression(&e), "sstore(0, add(x, 1))");
        assert_eq!(
            format_expression(&call("datasize", vec![Expression::str_lit("Token_deployed")])),
            "datasize(\"Token_deployed\")"
        );
    }

    #[test]
    fn test_function_and_control_flow_format() {
        let f = FunctionDef {
            name: "fun_f".into(),
            params: vec!["var_a".into()],
            returns: vec!["ret_0".into()],
            body: vec![
                Statement::if_(ident("var_a"), vec![Statement::Leave]),
                Statement::Switch {
                    expr: ident("var_a"),
                    cases: vec![SwitchCase {
                        value: Literal::Number("1".into()),
                        body: vec![Statement::assign("ret_0", num(2))],
                    }],
                    default: None,
                },
            ],
        };
        let text = format_block(&[Statement::FunctionDef(f)], 0);
        assert_eq!(
            text,
            "function fun_f(var_a) -> ret_0 {\n    if var_a {\n        leave\n    }\n    switch var_a\n    case 1 {\n        ret_0 := 2\n    }\n}\n"
        );
    }

    #[test]
    fn test_for_regions_inline() {
        let stmt = Statement::For {
            init: vec![Statement::let_("i", num(0))],
            condition: call("lt", vec![ident("i"), num(10)]),
            post: vec![Statement::assign("i", call("add", vec![ident("i"), num(1)]))],
            body: vec![],
        };
        assert_eq!(
            format_block(&[stmt], 0),
            "for { let i := 0 } lt(i, 10) { i := add(i, 1) } { }\n"
        );
    }

    #[test]
    fn test_module_object_syntax_and_fingerprint() {
        let mut module = IrModule::new("Token");
        module.constructor_code.push(Statement::expr(call("mstore", vec![num(64), num(128)])));
        let text = module.to_string();
        assert!(text.starts_with("object \"Token\" {\n    code {\n        mstore(64, 128)\n"));
        assert!(text.contains("object \"Token_deployed\""));
        assert_eq!(fingerprint(&module), fingerprint(&module.clone()));
        assert_eq!(fingerprint(&module).len(), 64);
    }
}
