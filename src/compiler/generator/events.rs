//! Events and the revert family.
//!
//! | Source | Lowered to |
//! |--------|------------|
//! | `emit E(a, b)` | topics, then `logN(p, len, topic0, ...)` over the encoded data |
//! | `revert()` | `revert(0, 0)` |
//! | `revert("m")`, `throw "m"` | `Error(string)` revert |
//! | `throw Err(x)` | selector word followed by one word per argument |
//! | `require(c, reason)` | `if iszero(c) { <revert> }` |
//! | `assert(c)` | `if iszero(c) { invalid() }` |

use tracing::debug;

use super::helpers::{abi_shape, shape_literal, DynamicHelper};
use super::{FunctionLowerer, Value};
use crate::ast;
use crate::compiler::abi::CustomErrorMeta;
use crate::compiler::ir::{self, call, ident, num, Statement};
use crate::compiler::runtime::{selector_word, RuntimeHelper};
use crate::compiler::types::TypeDescriptor;
use crate::compiler::RevertStrings;
use crate::{Error, Result};

impl FunctionLowerer<'_, '_> {
    // =========================================================================
    // EVENTS
    // =========================================================================

    pub(super) fn lower_emit(&mut self, event: &str, args: &[ast::Expression]) -> Result<()> {
        let decl = self
            .ctx
            .catalog
            .event(event)
            .ok_or_else(|| Error::unresolved("event", event))?;
        let meta = self.ctx.catalog.event_meta(decl)?;
        if meta.fields.len() != args.len() {
            return Err(Error::ArityMismatch {
                callee: event.to_string(),
                expected: meta.fields.len(),
                got: args.len(),
            });
        }
        let types: Vec<TypeDescriptor> = meta.fields.iter().map(|f| f.ty.clone()).collect();
        let values = self.lower_ordered_as(args, &types)?;

        let mut topics = Vec::with_capacity(4);
        if !meta.anonymous {
            topics.push(ir::Expression::hex(&meta.topic));
        }
        let mut data = Vec::new();
        for (field, value) in meta.fields.iter().zip(values) {
            if field.indexed {
                let topic = self.topic_of(value)?;
                topics.push(topic);
            } else {
                data.push(value);
            }
        }

        let log = format!("log{}", topics.len());
        if data.is_empty() {
            let mut log_args = vec![num(0), num(0)];
            log_args.extend(topics);
            self.emit_expr(call(&log, log_args));
            return Ok(());
        }

        let shapes = data
            .iter()
            .map(|v| abi_shape(&v.ty))
            .collect::<Result<Vec<_>>>()?;
        let encode = self.ctx.helpers.dynamic(DynamicHelper::AbiEncode, data.len());
        let ptr = self.capture_fresh(Value::new(
            call("mload", vec![num(64)]),
            TypeDescriptor::UInt(256),
        ));
        let mut encode_args = vec![ptr.expr.clone(), shape_literal(&shapes, 2)?];
        encode_args.extend(data.into_iter().map(|v| v.expr));
        let end = self.temp();
        self.emit(Statement::let_(end.clone(), call(&encode, encode_args)));

        let mut log_args = vec![
            ptr.expr.clone(),
            call("sub", vec![ident(&end), ptr.expr]),
        ];
        log_args.extend(topics);
        self.emit_expr(call(&log, log_args));
        Ok(())
    }

    /// Topic word of an indexed field; reference values are hashed
    fn topic_of(&mut self, value: Value) -> Result<ir::Expression> {
        let ty = value.ty.clone();
        let topic = match &ty {
            t if t.is_value_type() => return Ok(self.capture(value).expr),
            t if t.is_bytes_like() => self.call_rt(RuntimeHelper::BytesHash, vec![value.expr]),
            TypeDescriptor::Array(elem, _) if elem.is_value_type() => {
                let ptr = self.capture(value);
                call(
                    "keccak256",
                    vec![
                        call("add", vec![ptr.expr.clone(), num(32)]),
                        call("mul", vec![call("mload", vec![ptr.expr]), num(32)]),
                    ],
                )
            }
            other => {
                return Err(Error::unsupported(format!(
                    "indexed event field of type {}",
                    other.describe()
                )))
            }
        };
        Ok(self.capture_fresh(Value::new(topic, ty)).expr)
    }

    // =========================================================================
    // REVERTS
    // =========================================================================

    /// `throw "message"`, `throw new Error("message")`, `throw Err(args)`
    pub(super) fn lower_throw(&mut self, error: &ast::Expression) -> Result<()> {
        match error {
            ast::Expression::New { class, args, .. } if class == "Error" => match args.as_slice() {
                [] => {
                    self.emit_expr(call("revert", vec![num(0), num(0)]));
                    Ok(())
                }
                [message] => self.revert_with(message),
                _ => Err(Error::ArityMismatch {
                    callee: "Error".to_string(),
                    expected: 1,
                    got: args.len(),
                }),
            },
            other => self.revert_with(other),
        }
    }

    /// `revert()`, `revert("message")` or `revert(Err(args))`
    pub(super) fn lower_revert(&mut self, args: &[ast::Expression]) -> Result<()> {
        match args {
            [] => {
                self.emit_expr(call("revert", vec![num(0), num(0)]));
                Ok(())
            }
            [reason] => self.revert_with(reason),
            _ => Err(Error::ArityMismatch {
                callee: "revert".to_string(),
                expected: 1,
                got: args.len(),
            }),
        }
    }

    /// `require(condition[, reason])`
    pub(super) fn lower_require(&mut self, args: &[ast::Expression]) -> Result<()> {
        let (condition, reason) = match args {
            [c] => (c, None),
            [c, r] => (c, Some(r)),
            _ => {
                return Err(Error::ArityMismatch {
                    callee: "require".to_string(),
                    expected: 2,
                    got: args.len(),
                })
            }
        };
        let condition = self.lower_expr_as(condition, &TypeDescriptor::Bool)?;
        let (body, ()) = self.with_block(|this| match reason {
            Some(reason) => this.revert_with(reason),
            None => {
                this.emit_expr(call("revert", vec![num(0), num(0)]));
                Ok(())
            }
        })?;
        self.emit(Statement::if_(call("iszero", vec![condition.expr]), body));
        Ok(())
    }

    pub(super) fn lower_assert(&mut self, args: &[ast::Expression]) -> Result<()> {
        let [condition] = args else {
            return Err(Error::ArityMismatch {
                callee: "assert".to_string(),
                expected: 1,
                got: args.len(),
            });
        };
        let condition = self.lower_expr_as(condition, &TypeDescriptor::Bool)?;
        self.emit(Statement::if_(
            call("iszero", vec![condition.expr]),
            vec![Statement::expr(call("invalid", vec![]))],
        ));
        Ok(())
    }

    /// Revert with a custom error or a message
    fn revert_with(&mut self, reason: &ast::Expression) -> Result<()> {
        if let ast::Expression::Call { callee, args } = reason {
            if let ast::Expression::Identifier(name) = callee.as_ref() {
                if let Some(meta) = self.ctx.catalog.custom_error(name).cloned() {
                    return self.revert_custom(&meta, args);
                }
            }
        }

        if self.ctx.options.revert_strings == RevertStrings::Strip {
            debug!(function = %self.function, "Revert message dropped");
            self.emit_expr(call("revert", vec![num(0), num(0)]));
            return Ok(());
        }
        let message = match reason {
            ast::Expression::Str(text) => self.bytes_literal(text.as_bytes(), TypeDescriptor::String),
            other => self.lower_expr_as(other, &TypeDescriptor::String)?,
        };
        if !message.ty.is_bytes_like() {
            return Err(Error::unsupported(format!(
                "revert reason of type {}",
                message.ty.describe()
            )));
        }
        let revert = self.call_rt(RuntimeHelper::RevertErrorString, vec![message.expr]);
        self.emit_expr(revert);
        Ok(())
    }

    /// Selector followed by the ABI-encoded arguments
    fn revert_custom(&mut self, meta: &CustomErrorMeta, args: &[ast::Expression]) -> Result<()> {
        if meta.params.len() != args.len() {
            return Err(Error::ArityMismatch {
                callee: meta.name.clone(),
                expected: meta.params.len(),
                got: args.len(),
            });
        }
        let types: Vec<TypeDescriptor> = meta.params.iter().map(|(_, t)| t.clone()).collect();
        let values = self.lower_ordered_as(args, &types)?;
        let ptr = self.capture_fresh(Value::new(
            call("mload", vec![num(64)]),
            TypeDescriptor::UInt(256),
        ));

        if types.iter().all(|t| t.is_value_type()) {
            let selector = u32::from_be_bytes(meta.selector);
            self.emit_expr(call("mstore", vec![ptr.expr.clone(), selector_word(selector)]));
            for (i, v) in values.into_iter().enumerate() {
                let addr = call("add", vec![ptr.expr.clone(), num(4 + 32 * i as u128)]);
                self.emit_expr(call("mstore", vec![addr, v.expr]));
            }
            let size = 4 + 32 * types.len() as u128;
            self.emit_expr(call("revert", vec![ptr.expr, num(size)]));
            return Ok(());
        }

        let shapes = types.iter().map(abi_shape).collect::<Result<Vec<_>>>()?;
        let encode = self
            .ctx
            .helpers
            .dynamic(DynamicHelper::AbiEncodeSelector, values.len());
        let mut encode_args = vec![
            ptr.expr.clone(),
            ir::Expression::num_text(crate::compiler::abi::selector_hex(&meta.selector)),
            shape_literal(&shapes, 2)?,
        ];
        encode_args.extend(values.into_iter().map(|v| v.expr));
        let end = self.temp();
        self.emit(Statement::let_(end.clone(), call(&encode, encode_args)));
        self.emit_expr(call(
            "revert",
            vec![ptr.expr.clone(), call("sub", vec![ident(&end), ptr.expr])],
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ClassDecl, EventDecl, Expression, FunctionDecl, MethodDecl, Param, SourceUnit};
    use crate::compiler::{CompilationContext, CompileOptions};
    use crate::compiler::ir::Expression as Ir;

    fn lower(unit: &SourceUnit, options: CompileOptions) -> Vec<Statement> {
        let mut ctx = CompilationContext::build(unit, &[], "Vault", options).unwrap();
        let (owner, method) = ctx.chain.find_method("run").unwrap();
        FunctionLowerer::lower_method(&mut ctx, owner, method, "fun_run")
            .unwrap()
            .body
    }

    fn vault(body: Vec<ast::Statement>) -> SourceUnit {
        SourceUnit::new("vault.ts")
            .with_function(FunctionDecl::error(
                "Insufficient",
                vec![Param::new("needed", "u256")],
            ))
            .with_class(
                ClassDecl::new("Vault")
                    .event(
                        EventDecl::new("Deposit")
                            .field("from", "address", true)
                            .field("amount", "u256", false),
                    )
                    .method(MethodDecl::new("run").param("x", "u256").body(body)),
            )
    }

    fn calls_named(stmts: &[Statement], name: &str) -> bool {
        stmts.iter().any(|s| match s {
            Statement::Expression(Ir::Call { name: n, .. }) => n == name,
            Statement::If { body, .. } => calls_named(body, name),
            _ => false,
        })
    }

    #[test]
    fn test_emit_uses_log2_with_signature_topic() {
        let unit = vault(vec![ast::Statement::emit(
            "Deposit",
            vec![Expression::ident("msg").member("sender"), Expression::ident("x")],
        )]);
        let body = lower(&unit, CompileOptions::default());
        assert!(calls_named(&body, "log2"));
    }

    #[test]
    fn test_custom_error_revert_size() {
        let unit = vault(vec![ast::Statement::Throw(
            Expression::ident("Insufficient").call(vec![Expression::ident("x")]),
        )]);
        let body = lower(&unit, CompileOptions::default());
        let sized = body.iter().any(|s| {
            matches!(s, Statement::Expression(Ir::Call { name, args })
                if name == "revert" && args[1].as_u128() == Some(36))
        });
        assert!(sized);
    }

    #[test]
    fn test_stripped_revert_strings() {
        let unit = vault(vec![ast::Statement::expr(Expression::ident("require").call(vec![
            Expression::Bool(false),
            Expression::string("nope"),
        ]))]);
        let options = CompileOptions {
            revert_strings: RevertStrings::Strip,
            ..CompileOptions::default()
        };
        let body = lower(&unit, options);
        assert!(calls_named(&body, "revert"));
        assert!(!calls_named(&body, "revert_error_string"));
    }
}
