//! Statement lowering and control flow
//!
//! | Source | IR |
//! |--------|----|
//! | `if (c) A` | `if c { A }` |
//! | `if (c) A else B` | `let __cond_N := c  if __cond_N { A }  if iszero(__cond_N) { B }` |
//! | `while (c) A` | `for {} c {} { A }` |
//! | `do A while (c)` | `for {} 1 {} { A  if iszero(c) { break } }` |
//! | `for (i; c; u) A` | `for { i } c { u } { A }` |
//! | `return e` | `ret_0 := e  leave` |
//! | `unchecked { A }` | `{ A }` |
//!
//! Conditions that need statements of their own move into the loop body
//! ahead of an `if iszero(c) { break }`.

use super::storage_access::EMPTY_MEMORY;
use super::{FunctionLowerer, Guard, Value};
use crate::ast;
use crate::compiler::ir::{self, call, ident, num, Statement};
use crate::compiler::runtime::RuntimeHelper;
use crate::compiler::types::TypeDescriptor;
use crate::{Error, Result};

/// True when a constructor body calls `super(...)` itself
pub(super) fn calls_super_constructor(body: &[ast::Statement]) -> bool {
    body.iter().any(|s| match s {
        ast::Statement::Expression(ast::Expression::Call { callee, .. }) => {
            matches!(callee.as_ref(), ast::Expression::Super)
        }
        ast::Statement::Block(inner) | ast::Statement::Unchecked(inner) => {
            calls_super_constructor(inner)
        }
        _ => false,
    })
}

fn summary(stmt: &ast::Statement) -> Option<String> {
    match stmt {
        ast::Statement::VarDecl { names, .. } => Some(format!("let {}", names.join(", "))),
        ast::Statement::Return(_) => Some("return".into()),
        ast::Statement::Emit { event, .. } => Some(format!("emit {}", event)),
        ast::Statement::Throw(_) => Some("throw".into()),
        ast::Statement::Try { .. } => Some("try".into()),
        ast::Statement::If { .. } => Some("if".into()),
        ast::Statement::While { .. } | ast::Statement::DoWhile { .. } | ast::Statement::For { .. } => {
            Some("loop".into())
        }
        _ => None,
    }
}

impl FunctionLowerer<'_, '_> {
    /// Lower one statement into the current block
    pub(super) fn lower_statement(&mut self, stmt: &ast::Statement) -> Result<()> {
        if self.ctx.options.debug_comments {
            if let Some(text) = summary(stmt) {
                self.emit(Statement::Comment(text));
            }
        }
        match stmt {
            ast::Statement::VarDecl { names, ty, init } => {
                self.lower_var_decl(names, ty.as_deref(), init.as_ref())
            }
            ast::Statement::Expression(e) => self.lower_expr_statement(e),
            ast::Statement::If {
                condition,
                then_branch,
                else_branch,
            } => self.lower_if(condition, then_branch, else_branch.as_deref()),
            ast::Statement::While { condition, body } => self.lower_while(condition, body),
            ast::Statement::DoWhile { body, condition } => self.lower_do_while(body, condition),
            ast::Statement::For {
                init,
                condition,
                update,
                body,
            } => self.lower_for(init.as_deref(), condition.as_ref(), update.as_ref(), body),
            ast::Statement::Break => {
                self.emit(Statement::Break);
                Ok(())
            }
            ast::Statement::Continue => {
                self.emit(Statement::Continue);
                Ok(())
            }
            ast::Statement::Return(value) => self.lower_return(value.as_ref()),
            ast::Statement::Block(stmts) | ast::Statement::Unchecked(stmts) => {
                let block = self.lower_block(stmts)?;
                self.emit(Statement::Block(block));
                Ok(())
            }
            ast::Statement::Emit { event, args } => self.lower_emit(event, args),
            ast::Statement::Throw(e) => self.lower_throw(e),
            ast::Statement::Try {
                body,
                catch_binding,
                catch_body,
            } => self.lower_try(body, catch_binding.as_deref(), catch_body),
        }
    }

    fn lower_var_decl(
        &mut self,
        names: &[String],
        ty: Option<&str>,
        init: Option<&ast::Expression>,
    ) -> Result<()> {
        if let [name] = names {
            let declared = ty.map(|t| self.resolve(t)).transpose()?;
            let value = match (init, declared) {
                (Some(e), Some(t)) => self.lower_expr_as(e, &t)?,
                (Some(e), None) => {
                    let v = self.lower_expr(e)?;
                    if v.is_void() {
                        return Err(Error::compiler(format!(
                            "`{}` initialized from an expression without a value",
                            name
                        )));
                    }
                    v
                }
                (None, Some(t)) => {
                    let zero = self.default_value(&t)?;
                    Value::new(zero, t)
                }
                (None, None) => {
                    return Err(Error::compiler(format!(
                        "`{}` has neither a type nor an initializer",
                        name
                    )))
                }
            };
            let ir_name = self.declare(name, value.ty.clone());
            self.emit(Statement::let_(ir_name, value.expr));
            return Ok(());
        }

        let init = init.ok_or_else(|| {
            Error::compiler(format!("destructuring `{}` without a value", names.join(", ")))
        })?;
        let values = self.lower_multi(init)?;
        if values.len() != names.len() {
            return Err(Error::ArityMismatch {
                callee: format!("[{}]", names.join(", ")),
                expected: names.len(),
                got: values.len(),
            });
        }
        for (name, v) in names.iter().zip(values) {
            if name.is_empty() || name == "_" {
                continue;
            }
            let ir_name = self.declare(name, v.ty.clone());
            self.emit(Statement::let_(ir_name, v.expr));
        }
        Ok(())
    }

    /// Expression statement; results are discarded
    pub(super) fn lower_expr_statement(&mut self, e: &ast::Expression) -> Result<()> {
        match e {
            ast::Expression::Assign { op, target, value } => {
                self.lower_assign(*op, target, value, false)?;
            }
            ast::Expression::Update { op, prefix, target } => {
                self.lower_update(*op, *prefix, target, false)?;
            }
            ast::Expression::Call { callee, args } => {
                self.lower_call(callee, args)?;
            }
            other => {
                let v = self.lower_expr(other)?;
                if !v.is_void() && !v.expr.is_pure() {
                    self.emit_expr(call("pop", vec![v.expr]));
                }
            }
        }
        Ok(())
    }

    fn lower_if(
        &mut self,
        condition: &ast::Expression,
        then_branch: &[ast::Statement],
        else_branch: Option<&[ast::Statement]>,
    ) -> Result<()> {
        let c = self.lower_expr(condition)?;
        match else_branch {
            None => {
                let then = self.lower_block(then_branch)?;
                self.emit(Statement::if_(c.expr, then));
            }
            Some(else_branch) => {
                let cond = self.cond_temp();
                self.emit(Statement::let_(cond.clone(), c.expr));
                let then = self.lower_block(then_branch)?;
                self.emit(Statement::if_(ident(&cond), then));
                let otherwise = self.lower_block(else_branch)?;
                self.emit(Statement::if_(call("iszero", vec![ident(&cond)]), otherwise));
            }
        }
        Ok(())
    }

    /// Run `f` collecting its statements without opening a scope
    fn collect<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<(Vec<Statement>, T)> {
        self.blocks.push(Vec::new());
        let result = f(self);
        let block = self.blocks.pop().unwrap_or_default();
        result.map(|value| (block, value))
    }

    /// Loop condition: inline when it needs no statements, otherwise `1`
    /// with the condition checked at the top of the body
    fn loop_condition(
        &mut self,
        condition: Option<&ast::Expression>,
    ) -> Result<(ir::Expression, Vec<Statement>)> {
        let Some(condition) = condition else {
            return Ok((num(1), Vec::new()));
        };
        let (prelude, c) = self.collect(|this| this.lower_expr(condition))?;
        if prelude.is_empty() {
            return Ok((c.expr, Vec::new()));
        }
        let mut head = prelude;
        head.push(Statement::if_(call("iszero", vec![c.expr]), vec![Statement::Break]));
        Ok((num(1), head))
    }

    fn lower_while(&mut self, condition: &ast::Expression, body: &[ast::Statement]) -> Result<()> {
        let (cond, mut head) = self.loop_condition(Some(condition))?;
        let body = self.lower_block(body)?;
        head.extend(body);
        self.emit(Statement::For {
            init: Vec::new(),
            condition: cond,
            post: Vec::new(),
            body: head,
        });
        Ok(())
    }

    fn lower_do_while(&mut self, body: &[ast::Statement], condition: &ast::Expression) -> Result<()> {
        let (mut body, ()) = self.with_block(|this| {
            for s in body {
                this.lower_statement(s)?;
            }
            Ok(())
        })?;
        let (prelude, c) = self.collect(|this| this.lower_expr(condition))?;
        body.extend(prelude);
        body.push(Statement::if_(call("iszero", vec![c.expr]), vec![Statement::Break]));
        self.emit(Statement::For {
            init: Vec::new(),
            condition: num(1),
            post: Vec::new(),
            body,
        });
        Ok(())
    }

    fn lower_for(
        &mut self,
        init: Option<&ast::Statement>,
        condition: Option<&ast::Expression>,
        update: Option<&ast::Expression>,
        body: &[ast::Statement],
    ) -> Result<()> {
        // Init variables stay visible in the condition, post and body
        let (stmt, ()) = self.with_block(|this| {
            let (init, ()) = this.collect(|this| match init {
                Some(s) => this.lower_statement(s),
                None => Ok(()),
            })?;
            let (cond, mut head) = this.loop_condition(condition)?;
            let (post, ()) = this.collect(|this| match update {
                Some(u) => this.lower_expr_statement(u),
                None => Ok(()),
            })?;
            let body = this.lower_block(body)?;
            head.extend(body);
            this.emit(Statement::For {
                init,
                condition: cond,
                post,
                body: head,
            });
            Ok(())
        })?;
        self.emit_all(stmt);
        Ok(())
    }

    fn lower_return(&mut self, value: Option<&ast::Expression>) -> Result<()> {
        if let Some(value) = value {
            let returns = self.returns.clone();
            match returns.as_slice() {
                [] => {
                    return Err(Error::compiler(format!(
                        "`{}` returns a value but declares no return type",
                        self.function
                    )))
                }
                [(name, ty)] => {
                    let v = self.lower_expr_as(value, ty)?;
                    self.emit(Statement::assign(name.clone(), v.expr));
                }
                many => {
                    let values = match value {
                        ast::Expression::Tuple(elems) | ast::Expression::ArrayLiteral(elems)
                            if elems.len() == many.len() =>
                        {
                            let types: Vec<TypeDescriptor> =
                                many.iter().map(|(_, t)| t.clone()).collect();
                            self.lower_ordered_as(elems, &types)?
                        }
                        other => self.lower_multi(other)?,
                    };
                    if values.len() != many.len() {
                        return Err(Error::ArityMismatch {
                            callee: format!("return of {}", self.function),
                            expected: many.len(),
                            got: values.len(),
                        });
                    }
                    for ((name, _), v) in many.iter().zip(values) {
                        self.emit(Statement::assign(name.clone(), v.expr));
                    }
                }
            }
        }
        self.emit(Statement::Leave);
        Ok(())
    }

    // =========================================================================
    // GUARDED CALLS
    // =========================================================================

    /// Claim the pending `try` capture for the external call being lowered;
    /// returns the success and returndata variables
    pub(super) fn claim_guard(&mut self) -> Option<(String, String)> {
        match self.guard.as_mut() {
            Some(guard) if !guard.captured => {
                guard.captured = true;
                Some((guard.success.clone(), guard.ret.clone()))
            }
            _ => None,
        }
    }

    fn lower_try(
        &mut self,
        body: &[ast::Statement],
        binding: Option<&str>,
        catch_body: &[ast::Statement],
    ) -> Result<()> {
        if self.guard.is_some() {
            return Err(Error::unsupported(format!("nested try in {}", self.function)));
        }
        let success = self.temp();
        let ret = self.temp();
        self.emit(Statement::let_(success.clone(), num(0)));
        self.emit(Statement::let_(ret.clone(), num(EMPTY_MEMORY)));
        self.guard = Some(Guard {
            success: success.clone(),
            ret: ret.clone(),
            captured: false,
        });

        let mut rest: &[ast::Statement] = &[];
        let mut outcome = Ok(());
        for (i, s) in body.iter().enumerate() {
            outcome = self.lower_statement(s);
            if outcome.is_err() || self.guard.as_ref().is_some_and(|g| g.captured) {
                rest = &body[i + 1..];
                break;
            }
        }
        let guard = self.guard.take();
        outcome?;
        if !guard.is_some_and(|g| g.captured) {
            return Err(Error::TryWithoutCall(self.function.clone()));
        }

        let after = self.lower_block(rest)?;
        if !after.is_empty() {
            self.emit(Statement::if_(ident(&success), after));
        }

        let (handler, ()) = self.with_block(|this| {
            if let Some(name) = binding {
                let ir_name = this.declare(name, TypeDescriptor::DynamicBytes);
                this.emit(Statement::let_(ir_name, ident(&ret)));
            }
            for s in catch_body {
                this.lower_statement(s)?;
            }
            Ok(())
        })?;
        self.emit(Statement::if_(call("iszero", vec![ident(&success)]), handler));
        Ok(())
    }

    /// `if iszero(success) { revert_forward() }`
    pub(super) fn forward_failure(&mut self, success: ir::Expression) {
        let forward = self.call_rt(RuntimeHelper::RevertForward, vec![]);
        self.emit(Statement::if_(
            call("iszero", vec![success]),
            vec![Statement::expr(forward)],
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_super_call_detection() {
        let explicit = vec![ast::Statement::expr(
            ast::Expression::Super.call(vec![ast::Expression::num(1)]),
        )];
        assert!(calls_super_constructor(&explicit));

        let nested = vec![ast::Statement::Unchecked(explicit.clone())];
        assert!(calls_super_constructor(&nested));

        let none = vec![ast::Statement::expr(ast::Expression::ident("f").call(vec![]))];
        assert!(!calls_super_constructor(&none));
    }
}
