//! Calls: internal methods, `super`, libraries and extensions, external
//! contracts, low-level address calls, contract creation and `abi.*`.
//!
//! Every result of a user function or helper is bound to a temporary at the
//! call site. Unguarded external calls and creations forward the callee's
//! revert data on failure; inside a `try` the first one instead assigns the
//! guard's success and returndata variables.

use std::collections::BTreeMap;

use super::expr::MAX_INLINE_DEPTH;
use super::helpers::{abi_shape, packed_width, shape_literal, DynamicHelper};
use super::{library_function_name, free_function_name, FunctionLowerer, LoweringMode, Owner, PendingFunction, Value};
use crate::ast::{self, Mutability, Param};
use crate::compiler::abi::{self, selector_hex};
use crate::compiler::catalog::ExternalMethod;
use crate::compiler::inheritance::{constructor_name, function_name, InheritanceChain};
use crate::compiler::ir::{self, call, ident, num, Statement};
use crate::compiler::runtime::RuntimeHelper;
use crate::compiler::types::TypeDescriptor;
use crate::{Error, Result};

/// Gas stipend forwarded by `transfer` and `send`
const TRANSFER_STIPEND: u128 = 2300;

fn check_arity(callee: &str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(Error::ArityMismatch {
            callee: callee.to_string(),
            expected,
            got,
        });
    }
    Ok(())
}

fn selector_literal(selector: &[u8; 4]) -> ir::Expression {
    ir::Expression::num_text(selector_hex(selector))
}

impl<'c, 'a> FunctionLowerer<'c, 'a> {
    /// Lower a call; returns one value per declared result
    pub(super) fn lower_call(
        &mut self,
        callee: &ast::Expression,
        args: &[ast::Expression],
    ) -> Result<Vec<Value>> {
        match callee {
            ast::Expression::Identifier(name) if self.lookup(name).is_none() => {
                self.call_by_name(name, args)
            }
            ast::Expression::Super => self.call_super_constructor(args),
            ast::Expression::Member { object, property } => {
                self.call_member(object, property, args)
            }
            _ => Err(Error::unsupported(format!(
                "calling a computed function value in {}",
                self.function
            ))),
        }
    }

    /// Bind the results of `expr` to temporaries
    fn bind_results(&mut self, expr: ir::Expression, types: Vec<TypeDescriptor>) -> Vec<Value> {
        match types.len() {
            0 => {
                self.emit_expr(expr);
                Vec::new()
            }
            _ => {
                let names: Vec<String> = types.iter().map(|_| self.temp()).collect();
                self.emit(Statement::Let {
                    names: names.clone(),
                    value: Some(expr),
                });
                names
                    .iter()
                    .zip(types)
                    .map(|(n, ty)| Value::new(ident(n), ty))
                    .collect()
            }
        }
    }

    fn resolve_all(&self, texts: impl IntoIterator<Item = &'a String>) -> Result<Vec<TypeDescriptor>> {
        texts.into_iter().map(|t| self.resolve(t)).collect()
    }

    // =========================================================================
    // NAMED CALLS
    // =========================================================================

    fn call_by_name(&mut self, name: &str, args: &[ast::Expression]) -> Result<Vec<Value>> {
        match name {
            "require" => return self.lower_require(args).map(|()| Vec::new()),
            "assert" => return self.lower_assert(args).map(|()| Vec::new()),
            "revert" => return self.lower_revert(args).map(|()| Vec::new()),
            "keccak256" => return self.lower_keccak(args).map(|v| vec![v]),
            "gasleft" => {
                check_arity(name, 0, args.len())?;
                let gas = Value::new(call("gas", vec![]), TypeDescriptor::UInt(256));
                return Ok(vec![self.capture_fresh(gas)]);
            }
            "blockhash" => {
                check_arity(name, 1, args.len())?;
                let n = self.lower_expr_as(&args[0], &TypeDescriptor::UInt(256))?;
                return Ok(vec![Value::new(
                    call("blockhash", vec![n.expr]),
                    TypeDescriptor::FixedBytes(32),
                )]);
            }
            "address" | "payable" => {
                check_arity(name, 1, args.len())?;
                let v = self.lower_expr(&args[0])?;
                return Ok(vec![self.convert(v, &TypeDescriptor::Address)?]);
            }
            "delegate" => {
                return Err(Error::unsupported(
                    "`delegate(Interface, target)` must be followed by a method call",
                ))
            }
            _ => {}
        }

        // Conversions written as calls: `u8(x)`, `bytes32(x)`, `IToken(addr)`
        if args.len() == 1 {
            if let Ok(target) = self.resolve(name) {
                if !matches!(target, TypeDescriptor::Struct(_)) {
                    let v = self.lower_expr(&args[0])?;
                    return Ok(vec![self.convert(v, &target)?]);
                }
            }
        }

        if let Some(function) = self.ctx.catalog.free_function(name) {
            if function.never_returns {
                return Err(Error::unsupported(format!(
                    "error `{}` used outside `revert`/`throw`",
                    name
                )));
            }
            self.ctx.request(PendingFunction::Free(name.to_string()));
            return self.internal_call(
                &free_function_name(name),
                &function.params,
                &function.returns,
                args,
            );
        }

        if let Owner::Library(library) = self.owner.clone() {
            if let Ok(method) = self.ctx.catalog.library_method(&library, name) {
                return self.library_call(&library, method, None, args);
            }
        }

        if self.owner == Owner::Contract && self.ctx.chain.find_method(name).is_some() {
            return self.call_this_method(name, args);
        }
        Err(self.undefined(name))
    }

    /// Call a user function with positional arguments
    fn internal_call(
        &mut self,
        ir_name: &str,
        params: &'a [Param],
        returns: &'a [String],
        args: &[ast::Expression],
    ) -> Result<Vec<Value>> {
        check_arity(ir_name, params.len(), args.len())?;
        let types = self.resolve_all(params.iter().map(|p| &p.ty))?;
        let values = self.lower_ordered_as(args, &types)?;
        let ret_types = self.resolve_all(returns)?;
        let exprs = values.into_iter().map(|v| v.expr).collect();
        Ok(self.bind_results(call(ir_name, exprs), ret_types))
    }

    /// `this.method(args)` or an implicit method call
    fn call_this_method(&mut self, name: &str, args: &[ast::Expression]) -> Result<Vec<Value>> {
        if self.owner != Owner::Contract {
            return Err(Error::UnknownMember {
                member: name.to_string(),
                on: format!("`this` in {}", self.function),
            });
        }
        let (_, method) = self.ctx.chain.find_method(name).ok_or_else(|| Error::UnknownMember {
            member: name.to_string(),
            on: format!("class {}", self.ctx.chain.most_derived().name),
        })?;
        if method.body.is_none() {
            return Err(Error::compiler(format!("method `{}` has no implementation", name)));
        }
        if self.mode == LoweringMode::Initializer {
            if let Some(values) = self.inline_method(method, args)? {
                return Ok(values);
            }
        }
        self.internal_call(&function_name(name), &method.params, &method.returns, args)
    }

    /// Substitute a single-`return` method body for the call
    fn inline_method(
        &mut self,
        method: &'a ast::MethodDecl,
        args: &[ast::Expression],
    ) -> Result<Option<Vec<Value>>> {
        let Some([ast::Statement::Return(Some(body))]) = method.body.as_deref() else {
            return Ok(None);
        };
        if method.returns.len() != 1 || self.inline_depth >= MAX_INLINE_DEPTH {
            return Ok(None);
        }
        check_arity(&method.name, method.params.len(), args.len())?;
        let types = self.resolve_all(method.params.iter().map(|p| &p.ty))?;
        let ret_ty = self.resolve(&method.returns[0])?;
        let values = self.lower_ordered_as(args, &types)?;

        // The inlined body sees only its parameters
        let outer = std::mem::replace(&mut self.scopes, vec![BTreeMap::new()]);
        for ((param, ty), v) in method.params.iter().zip(types).zip(values) {
            let t = self.temp();
            self.emit(Statement::let_(t.clone(), v.expr));
            self.alias(&param.name, &t, ty);
        }
        self.inline_depth += 1;
        let result = self.lower_expr_as(body, &ret_ty);
        self.inline_depth -= 1;
        self.scopes = outer;
        Ok(Some(vec![result?]))
    }

    /// `super.method(args)`
    fn call_super_method(&mut self, method: &str, args: &[ast::Expression]) -> Result<Vec<Value>> {
        let target = self.ctx.chain.super_target(&self.class, method)?.to_string();
        let classes = self.ctx.chain.classes();
        let position = classes
            .iter()
            .position(|c| c.name == self.class)
            .unwrap_or(classes.len());
        let decl = classes[..position]
            .iter()
            .copied()
            .rev()
            .find_map(|c| {
                c.methods
                    .iter()
                    .find(|m| m.name == method && m.body.is_some())
            })
            .ok_or_else(|| Error::MissingSuperImplementation {
                class: self.class.clone(),
                method: method.to_string(),
            })?;
        self.internal_call(&target, &decl.params, &decl.returns, args)
    }

    /// `super(args)` inside a constructor
    fn call_super_constructor(&mut self, args: &[ast::Expression]) -> Result<Vec<Value>> {
        if self.mode != LoweringMode::Constructor {
            return Err(Error::unsupported("`super(...)` outside a constructor"));
        }
        let (parent, ctor) = self
            .ctx
            .chain
            .parent_constructor(&self.class)
            .ok_or_else(|| Error::MissingSuperImplementation {
                class: self.class.clone(),
                method: "constructor".to_string(),
            })?;
        self.internal_call(&constructor_name(&parent.name), &ctor.params, &[], args)
    }

    /// Static library call, or an extension call with the receiver first
    fn library_call(
        &mut self,
        library: &str,
        method: &'a ast::MethodDecl,
        receiver: Option<Value>,
        args: &[ast::Expression],
    ) -> Result<Vec<Value>> {
        let ir_name = library_function_name(library, &method.name);
        let offset = usize::from(receiver.is_some());
        check_arity(&ir_name, method.params.len(), args.len() + offset)?;
        self.ctx.request(PendingFunction::Library {
            library: library.to_string(),
            method: method.name.clone(),
        });

        let types = self.resolve_all(method.params.iter().map(|p| &p.ty))?;
        let mut exprs = Vec::with_capacity(types.len());
        if let Some(receiver) = receiver {
            exprs.push(self.capture(receiver).expr);
        }
        let values = self.lower_ordered_as(args, &types[offset..])?;
        exprs.extend(values.into_iter().map(|v| v.expr));
        let ret_types = self.resolve_all(&method.returns)?;
        Ok(self.bind_results(call(&ir_name, exprs), ret_types))
    }

    // =========================================================================
    // MEMBER CALLS
    // =========================================================================

    fn call_member(
        &mut self,
        object: &ast::Expression,
        property: &str,
        args: &[ast::Expression],
    ) -> Result<Vec<Value>> {
        match object {
            ast::Expression::This => return self.call_this_method(property, args),
            ast::Expression::Super => return self.call_super_method(property, args),
            ast::Expression::Identifier(name) if self.lookup(name).is_none() => {
                if name == "abi" {
                    return self.lower_abi(property, args);
                }
                if self.ctx.catalog.library(name).is_some() {
                    let method = self.ctx.catalog.library_method(name, property)?;
                    return self.library_call(name, method, None, args);
                }
            }
            ast::Expression::Call { callee, args: target } => {
                if matches!(callee.as_ref(), ast::Expression::Identifier(n) if n == "delegate") {
                    return self.delegate_call(target, property, args);
                }
            }
            _ => {}
        }

        if matches!(property, "push" | "pop") {
            if let Some(TypeDescriptor::Array(_, None)) = self.place_type(object) {
                let place = self.place_of(object, true)?;
                if matches!(place, super::Place::Storage { .. }) {
                    if property == "push" {
                        self.storage_push(place, args)?;
                    } else {
                        check_arity("pop", 0, args.len())?;
                        self.storage_pop(place)?;
                    }
                    return Ok(Vec::new());
                }
                return Err(Error::unsupported(format!("`{}` on a memory array", property)));
            }
        }

        let receiver = self.lower_expr(object)?;
        let receiver = self.capture(receiver);
        if let TypeDescriptor::Contract(contract) = &receiver.ty {
            match self.ctx.catalog.contract_method(contract, property) {
                Ok(method) => {
                    let kind = if matches!(method.mutability, Mutability::View | Mutability::Pure) {
                        DynamicHelper::StaticCall
                    } else {
                        DynamicHelper::Call
                    };
                    return self.external_call(kind, receiver.expr, method, args);
                }
                Err(err) if self.extension(&receiver.ty, property).is_none() => return Err(err),
                Err(_) => {}
            }
        }
        if matches!(receiver.ty, TypeDescriptor::Address | TypeDescriptor::Contract(_)) {
            if let Some(values) = self.address_call(&receiver, property, args)? {
                return Ok(values);
            }
        }
        if let Some((library, method)) = self.extension(&receiver.ty, property) {
            return self.library_call(&library, method, Some(receiver), args);
        }
        Err(Error::UnknownMember {
            member: property.to_string(),
            on: receiver.ty.describe(),
        })
    }

    /// Library bound to the receiver type that declares `method`
    fn extension(&self, ty: &TypeDescriptor, method: &str) -> Option<(String, &'a ast::MethodDecl)> {
        let libraries: Vec<String> = self
            .ctx
            .catalog
            .extensions_for(ty)
            .into_iter()
            .map(String::from)
            .collect();
        libraries.into_iter().find_map(|lib| {
            self.ctx
                .catalog
                .library_method(&lib, method)
                .ok()
                .map(|m| (lib, m))
        })
    }

    /// `transfer`, `send` and low-level calls on an address
    fn address_call(
        &mut self,
        target: &Value,
        property: &str,
        args: &[ast::Expression],
    ) -> Result<Option<Vec<Value>>> {
        let u256 = TypeDescriptor::UInt(256);
        let values = match property {
            "transfer" | "send" => {
                check_arity(property, 1, args.len())?;
                let amount = self.lower_expr_as(&args[0], &u256)?;
                let sent = call(
                    "call",
                    vec![
                        num(TRANSFER_STIPEND),
                        target.expr.clone(),
                        amount.expr,
                        num(0),
                        num(0),
                        num(0),
                        num(0),
                    ],
                );
                if property == "transfer" {
                    self.forward_failure(sent);
                    Vec::new()
                } else {
                    vec![self.capture_fresh(Value::new(sent, TypeDescriptor::Bool))]
                }
            }
            "call" => {
                if args.is_empty() || args.len() > 2 {
                    return Err(Error::ArityMismatch {
                        callee: "call".to_string(),
                        expected: 1,
                        got: args.len(),
                    });
                }
                let mut types = vec![TypeDescriptor::DynamicBytes];
                if args.len() == 2 {
                    types.push(u256);
                }
                let mut values = self.lower_ordered_as(args, &types)?;
                let value = if values.len() == 2 { values.pop().map(|v| v.expr) } else { None };
                let data = values.remove(0).expr;
                let args = vec![target.expr.clone(), value.unwrap_or_else(|| num(0)), data];
                self.lowlevel(RuntimeHelper::LowLevelCall, args)
            }
            "staticcall" | "delegatecall" => {
                check_arity(property, 1, args.len())?;
                let data = self.lower_expr_as(&args[0], &TypeDescriptor::DynamicBytes)?;
                let helper = if property == "staticcall" {
                    RuntimeHelper::LowLevelStaticCall
                } else {
                    RuntimeHelper::LowLevelDelegateCall
                };
                self.lowlevel(helper, vec![target.expr.clone(), data.expr])
            }
            _ => return Ok(None),
        };
        Ok(Some(values))
    }

    /// `(success, returndata)` of a low-level call; never reverts
    fn lowlevel(&mut self, helper: RuntimeHelper, args: Vec<ir::Expression>) -> Vec<Value> {
        let invocation = self.call_rt(helper, args);
        let (success, ret) = match self.claim_guard() {
            Some((s, r)) => {
                self.emit(Statement::Assign {
                    names: vec![s.clone(), r.clone()],
                    value: invocation,
                });
                (s, r)
            }
            None => {
                let (s, r) = (self.temp(), self.temp());
                self.emit(Statement::Let {
                    names: vec![s.clone(), r.clone()],
                    value: Some(invocation),
                });
                (s, r)
            }
        };
        vec![
            Value::new(ident(&success), TypeDescriptor::Bool),
            Value::new(ident(&ret), TypeDescriptor::DynamicBytes),
        ]
    }

    /// `delegate(Interface, target).method(args)`
    fn delegate_call(
        &mut self,
        target: &[ast::Expression],
        method: &str,
        args: &[ast::Expression],
    ) -> Result<Vec<Value>> {
        let [ast::Expression::Identifier(interface), address] = target else {
            return Err(Error::ArityMismatch {
                callee: "delegate".to_string(),
                expected: 2,
                got: target.len(),
            });
        };
        let method = self.ctx.catalog.contract_method(interface, method)?;
        let address = self.lower_expr(address)?;
        let address = self.convert(address, &TypeDescriptor::Address)?;
        let address = self.capture(address);
        self.external_call(DynamicHelper::DelegateCall, address.expr, method, args)
    }

    /// ABI-encoded call through a shared `__call_N`-style helper
    fn external_call(
        &mut self,
        kind: DynamicHelper,
        target: ir::Expression,
        method: ExternalMethod,
        args: &[ast::Expression],
    ) -> Result<Vec<Value>> {
        check_arity(&method.signature, method.params.len(), args.len())?;
        let values = self.lower_ordered_as(args, &method.params)?;
        let shapes = method
            .params
            .iter()
            .map(abi_shape)
            .collect::<Result<Vec<_>>>()?;
        let helper = self.ctx.helpers.dynamic(kind, values.len());

        let mut call_args = vec![target];
        if kind == DynamicHelper::Call {
            call_args.push(num(0));
        }
        call_args.push(selector_literal(&method.selector));
        call_args.push(shape_literal(&shapes, 2)?);
        call_args.extend(values.into_iter().map(|v| v.expr));
        let invocation = call(&helper, call_args);

        let (ret, guarded) = match self.claim_guard() {
            Some((s, r)) => {
                self.emit(Statement::Assign {
                    names: vec![s.clone(), r.clone()],
                    value: invocation,
                });
                (r, Some(s))
            }
            None => {
                let (s, r) = (self.temp(), self.temp());
                self.emit(Statement::Let {
                    names: vec![s.clone(), r.clone()],
                    value: Some(invocation),
                });
                self.forward_failure(ident(&s));
                (r, None)
            }
        };

        if method.returns.is_empty() {
            return Ok(Vec::new());
        }
        let ret_shapes = method
            .returns
            .iter()
            .map(abi_shape)
            .collect::<Result<Vec<_>>>()?;
        let decode = self
            .ctx
            .helpers
            .dynamic(DynamicHelper::AbiDecode, method.returns.len());
        let decoded = call(&decode, vec![ident(&ret), shape_literal(&ret_shapes, 2)?]);
        let Some(success) = guarded else {
            return Ok(self.bind_results(decoded, method.returns));
        };

        // Failed calls leave the results zeroed for the catch branch
        let names: Vec<String> = method.returns.iter().map(|_| self.temp()).collect();
        self.emit(Statement::Let {
            names: names.clone(),
            value: None,
        });
        self.emit(Statement::if_(
            ident(&success),
            vec![Statement::Assign {
                names: names.clone(),
                value: decoded,
            }],
        ));
        Ok(names
            .iter()
            .zip(method.returns)
            .map(|(n, ty)| Value::new(ident(n), ty))
            .collect())
    }

    // =========================================================================
    // CREATION
    // =========================================================================

    /// `new C(args)` with optional value and salt
    pub(super) fn lower_new(
        &mut self,
        class: &str,
        args: &[ast::Expression],
        value: Option<&ast::Expression>,
        salt: Option<&ast::Expression>,
    ) -> Result<Value> {
        let decl = self
            .ctx
            .catalog
            .class(class)
            .ok_or_else(|| Error::unresolved("class", class))?;
        if decl.is_library() || decl.is_abstract {
            return Err(Error::unsupported(format!("cannot deploy `{}`", class)));
        }
        if self.ctx.chain.contains(class) {
            return Err(Error::unsupported(format!(
                "`{}` cannot deploy a class of its own chain",
                self.ctx.chain.most_derived().name
            )));
        }
        let params: &'a [Param] = {
            let chain = InheritanceChain::linearize(decl, &self.ctx.catalog)?;
            chain
                .effective_constructor()
                .map(|(_, ctor)| ctor.params.as_slice())
                .unwrap_or(&[])
        };
        check_arity(&constructor_name(class), params.len(), args.len())?;
        let types = self.resolve_all(params.iter().map(|p| &p.ty))?;

        let u256 = TypeDescriptor::UInt(256);
        let amount = match value {
            Some(v) => {
                let v = self.lower_expr_as(v, &u256)?;
                self.capture(v).expr
            }
            None => num(0),
        };
        let salt = match salt {
            Some(s) => {
                let s = self.lower_expr(s)?;
                Some(self.capture(s).expr)
            }
            None => None,
        };
        let values = self.lower_ordered_as(args, &types)?;
        let shapes = types.iter().map(abi_shape).collect::<Result<Vec<_>>>()?;

        let kind = if salt.is_some() {
            DynamicHelper::Create2
        } else {
            DynamicHelper::Create
        };
        let helper = self.ctx.helpers.dynamic(kind, values.len());
        let mut call_args = vec![
            call("dataoffset", vec![ir::Expression::str_lit(class)]),
            call("datasize", vec![ir::Expression::str_lit(class)]),
            amount,
        ];
        call_args.extend(salt);
        call_args.push(shape_literal(&shapes, 2)?);
        call_args.extend(values.into_iter().map(|v| v.expr));
        self.ctx.dependencies.insert(class.to_string());

        let address = self.temp();
        self.emit(Statement::let_(address.clone(), call(&helper, call_args)));
        match self.claim_guard() {
            Some((s, r)) => {
                self.emit(Statement::assign(
                    s,
                    call("iszero", vec![call("iszero", vec![ident(&address)])]),
                ));
                let returndata = self.call_rt(RuntimeHelper::ReturndataToMemory, vec![]);
                self.emit(Statement::assign(r, returndata));
            }
            None => self.forward_failure(ident(&address)),
        }
        Ok(Value::new(ident(&address), TypeDescriptor::Contract(class.to_string())))
    }

    // =========================================================================
    // HASHING AND ABI ENCODING
    // =========================================================================

    fn lower_keccak(&mut self, args: &[ast::Expression]) -> Result<Value> {
        check_arity("keccak256", 1, args.len())?;
        let v = self.lower_expr(&args[0])?;
        let bytes32 = TypeDescriptor::FixedBytes(32);
        let ty = v.ty.clone();
        let hash = match &ty {
            t if t.is_bytes_like() => self.call_rt(RuntimeHelper::BytesHash, vec![v.expr]),
            TypeDescriptor::Array(elem, _) if elem.is_value_type() => {
                let ptr = self.capture(v);
                call(
                    "keccak256",
                    vec![
                        call("add", vec![ptr.expr.clone(), num(32)]),
                        call("mul", vec![call("mload", vec![ptr.expr]), num(32)]),
                    ],
                )
            }
            t if t.is_value_type() => {
                self.emit_expr(call("mstore", vec![num(0), v.expr]));
                call("keccak256", vec![num(0), num(32)])
            }
            other => {
                return Err(Error::unsupported(format!("keccak256 of {}", other.describe())))
            }
        };
        Ok(self.capture_fresh(Value::new(hash, bytes32)))
    }

    fn lower_abi(&mut self, method: &str, args: &[ast::Expression]) -> Result<Vec<Value>> {
        let encoded = match method {
            "encode" => {
                let values = self.lower_ordered(args)?;
                self.encode(DynamicHelper::AbiEncode, None, values)?
            }
            "encodePacked" => {
                let values = self.lower_ordered(args)?;
                self.encode(DynamicHelper::AbiEncodePacked, None, values)?
            }
            "encodeWithSelector" => {
                let (first, rest) = args.split_first().ok_or_else(|| Error::ArityMismatch {
                    callee: "abi.encodeWithSelector".to_string(),
                    expected: 1,
                    got: 0,
                })?;
                let sel = self.lower_expr_as(first, &TypeDescriptor::FixedBytes(4))?;
                let sel = self.capture(sel);
                let values = self.lower_ordered(rest)?;
                let sel = call("shr", vec![num(224), sel.expr]);
                self.encode(DynamicHelper::AbiEncodeSelector, Some(sel), values)?
            }
            "encodeWithSignature" => {
                let Some((ast::Expression::Str(signature), rest)) = args.split_first() else {
                    return Err(Error::unsupported(
                        "abi.encodeWithSignature needs a string literal signature",
                    ));
                };
                let sel = selector_literal(&abi::selector(signature));
                let values = self.lower_ordered(rest)?;
                self.encode(DynamicHelper::AbiEncodeSelector, Some(sel), values)?
            }
            "decode" => return self.abi_decode(args),
            other => {
                return Err(Error::UnknownMember {
                    member: other.to_string(),
                    on: "abi".to_string(),
                })
            }
        };
        Ok(vec![encoded])
    }

    /// Encode into fresh memory as a `bytes` value
    fn encode(
        &mut self,
        kind: DynamicHelper,
        selector: Option<ir::Expression>,
        values: Vec<Value>,
    ) -> Result<Value> {
        let packed = kind == DynamicHelper::AbiEncodePacked;
        let codes = values
            .iter()
            .map(|v| if packed { packed_width(&v.ty) } else { abi_shape(&v.ty) })
            .collect::<Result<Vec<_>>>()?;
        let shapes = shape_literal(&codes, if packed { 8 } else { 2 })?;
        let helper = self.ctx.helpers.dynamic(kind, values.len());

        let ptr = self.capture_fresh(Value::new(
            call("mload", vec![num(64)]),
            TypeDescriptor::DynamicBytes,
        ));
        let mut call_args = vec![call("add", vec![ptr.expr.clone(), num(32)])];
        call_args.extend(selector);
        call_args.push(shapes);
        for v in values {
            call_args.push(match v.ty {
                TypeDescriptor::FixedBytes(n) if packed && n < 32 => {
                    call("shr", vec![num(256 - 8 * u128::from(n)), v.expr])
                }
                _ => v.expr,
            });
        }
        let end = self.temp();
        self.emit(Statement::let_(end.clone(), call(&helper, call_args)));
        let finalize = self.call_rt(RuntimeHelper::FinalizeBytes, vec![ptr.expr.clone(), ident(&end)]);
        self.emit_expr(finalize);
        Ok(ptr)
    }

    /// `abi.decode(data, [T1, T2])`
    fn abi_decode(&mut self, args: &[ast::Expression]) -> Result<Vec<Value>> {
        let [data, types] = args else {
            return Err(Error::ArityMismatch {
                callee: "abi.decode".to_string(),
                expected: 2,
                got: args.len(),
            });
        };
        let texts: Vec<&ast::Expression> = match types {
            ast::Expression::Tuple(items) | ast::Expression::ArrayLiteral(items) => {
                items.iter().collect()
            }
            single => vec![single],
        };
        let mut types = Vec::with_capacity(texts.len());
        for t in texts {
            let text = match t {
                ast::Expression::Identifier(name) | ast::Expression::Str(name) => name,
                _ => return Err(Error::unsupported("abi.decode type list must name types")),
            };
            types.push(self.resolve(text)?);
        }
        let data = self.lower_expr_as(data, &TypeDescriptor::DynamicBytes)?;
        let shapes = types.iter().map(abi_shape).collect::<Result<Vec<_>>>()?;
        let decode = self.ctx.helpers.dynamic(DynamicHelper::AbiDecode, types.len());
        let decoded = call(&decode, vec![data.expr, shape_literal(&shapes, 2)?]);
        Ok(self.bind_results(decoded, types))
    }
}
