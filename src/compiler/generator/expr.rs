//! Expression lowering: literals, names, operators, conversions and the
//! environment (`msg`, `block`, `tx`).

use lazy_static::lazy_static;
use regex::Regex;

use super::storage_access::{word_at, EMPTY_MEMORY};
use super::{FunctionLowerer, Owner, Value};
use crate::ast::{self, AssignOp, BinaryOp, StorageClass, UnaryOp, UpdateOp};
use crate::compiler::ir::{self, call, ident, num, Statement};
use crate::compiler::runtime::RuntimeHelper;
use crate::compiler::types::{NoNames, TypeDescriptor};
use crate::{Error, Result};

lazy_static! {
    static ref SCIENTIFIC: Regex = Regex::new(r"^([0-9]+)(?:\.([0-9]+))?[eE]([0-9]+)$").unwrap();
}

/// Decimal text of 2^256 - 1
const MAX_U256: &str =
    "115792089237316195423570985008687907853269984665640564039457584007913129639935";

/// Constant expansions nested deeper than this are treated as cycles
pub(super) const MAX_INLINE_DEPTH: usize = 32;

/// Normalize numeric literal text to a decimal or `0x` hex IR literal
pub(crate) fn normalize_number(text: &str) -> Result<String> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    let cleaned = cleaned.strip_suffix('n').unwrap_or(&cleaned);
    let malformed = || Error::MalformedType {
        text: text.to_string(),
        reason: "not an integer literal".to_string(),
    };

    if let Some(hex) = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(malformed());
        }
        let hex = hex.trim_start_matches('0');
        if hex.len() > 64 {
            return Err(malformed());
        }
        return Ok(format!("0x{}", if hex.is_empty() { "0" } else { hex }).to_lowercase());
    }

    let digits = if let Some(caps) = SCIENTIFIC.captures(cleaned) {
        let whole = caps.get(1).map_or("", |m| m.as_str());
        let frac = caps.get(2).map_or("", |m| m.as_str());
        let exp: usize = caps[3].parse().map_err(|_| malformed())?;
        let frac = frac.trim_end_matches('0');
        if frac.len() > exp {
            return Err(malformed());
        }
        if whole.trim_start_matches('0').is_empty() && frac.is_empty() {
            "0".to_string()
        } else if exp > MAX_U256.len() {
            return Err(malformed());
        } else {
            format!("{}{}{}", whole, frac, "0".repeat(exp - frac.len()))
        }
    } else if !cleaned.is_empty() && cleaned.chars().all(|c| c.is_ascii_digit()) {
        cleaned.to_string()
    } else {
        return Err(malformed());
    };

    let digits = digits.trim_start_matches('0');
    if digits.len() > MAX_U256.len() || (digits.len() == MAX_U256.len() && digits > MAX_U256) {
        return Err(malformed());
    }
    Ok(if digits.is_empty() { "0".to_string() } else { digits.to_string() })
}

/// Word with `bytes` left-aligned
pub(crate) fn left_aligned(bytes: &[u8]) -> ir::Expression {
    let mut word = [0u8; 32];
    let n = bytes.len().min(32);
    word[..n].copy_from_slice(&bytes[..n]);
    let text = hex::encode(word);
    let trimmed = text.trim_start_matches('0');
    if trimmed.is_empty() {
        num(0)
    } else {
        ir::Expression::num_text(format!("0x{}", text))
    }
}

/// Mask keeping the high `n` bytes of a word
fn high_mask(n: u8) -> ir::Expression {
    ir::Expression::num_text(format!(
        "0x{}{}",
        "ff".repeat(usize::from(n)),
        "00".repeat(32 - usize::from(n))
    ))
}

/// Truncate a result to the width of `ty`
pub(crate) fn clean(e: ir::Expression, ty: &TypeDescriptor) -> ir::Expression {
    match ty {
        TypeDescriptor::UInt(bits) if *bits < 256 => match ty.mask() {
            Some(mask) => call("and", vec![e, ir::Expression::num_text(mask)]),
            None => e,
        },
        TypeDescriptor::Int(bits) if *bits < 256 => {
            call("signextend", vec![num(u128::from(*bits / 8 - 1)), e])
        }
        _ => e,
    }
}

fn is_number_literal(expr: &ast::Expression) -> bool {
    match expr {
        ast::Expression::Number(_) => true,
        ast::Expression::Unary {
            op: UnaryOp::Neg,
            operand,
        } => is_number_literal(operand),
        _ => false,
    }
}

fn literal_bytes(expr: &ast::Expression) -> Option<Result<Vec<u8>>> {
    match expr {
        ast::Expression::Str(s) => Some(Ok(s.as_bytes().to_vec())),
        ast::Expression::HexBytes(h) => Some(hex::decode(h).map_err(|e| Error::MalformedType {
            text: h.clone(),
            reason: e.to_string(),
        })),
        _ => None,
    }
}

impl<'c, 'a> FunctionLowerer<'c, 'a> {
    // =========================================================================
    // ENTRY POINTS
    // =========================================================================

    /// Lower an expression to a single value
    pub(super) fn lower_expr(&mut self, expr: &ast::Expression) -> Result<Value> {
        match expr {
            ast::Expression::Number(text) => Ok(Value::new(
                ir::Expression::num_text(normalize_number(text)?),
                TypeDescriptor::UInt(256),
            )),
            ast::Expression::Bool(b) => Ok(Value::new(num(u128::from(*b)), TypeDescriptor::Bool)),
            ast::Expression::Str(s) => Ok(self.bytes_literal(s.as_bytes(), TypeDescriptor::String)),
            ast::Expression::HexBytes(_) => {
                let bytes = literal_bytes(expr).unwrap_or_else(|| Ok(Vec::new()))?;
                Ok(self.bytes_literal(&bytes, TypeDescriptor::DynamicBytes))
            }
            ast::Expression::Identifier(name) => self.lower_identifier(name),
            ast::Expression::This => Ok(Value::new(
                call("address", vec![]),
                TypeDescriptor::Contract(self.class.clone()),
            )),
            ast::Expression::Super => Err(Error::unsupported("`super` used as a value")),
            ast::Expression::Member { object, property } => self.lower_member(expr, object, property),
            ast::Expression::Index { .. } => {
                let place = self.place_of(expr, false)?;
                self.load(&place)
            }
            ast::Expression::Call { callee, args } => {
                let mut values = self.lower_call(callee, args)?;
                match values.len() {
                    0 => Ok(Value::void()),
                    1 => Ok(values.remove(0)),
                    n => Err(Error::unsupported(format!(
                        "{} return values used as a single value",
                        n
                    ))),
                }
            }
            ast::Expression::New {
                class,
                args,
                value,
                salt,
            } => self.lower_new(class, args, value.as_deref(), salt.as_deref()),
            ast::Expression::Binary { op, left, right } => self.lower_binary(*op, left, right),
            ast::Expression::Unary { op, operand } => self.lower_unary(*op, operand),
            ast::Expression::Update { op, prefix, target } => {
                self.lower_update(*op, *prefix, target, true)
            }
            ast::Expression::Assign { op, target, value } => {
                self.lower_assign(*op, target, value, true)
            }
            ast::Expression::Conditional {
                condition,
                then_expr,
                else_expr,
            } => self.lower_conditional(condition, then_expr, else_expr, None),
            ast::Expression::Tuple(elems) if elems.len() == 1 => self.lower_expr(&elems[0]),
            ast::Expression::Tuple(_) => Err(Error::unsupported("tuple used as a single value")),
            ast::Expression::ArrayLiteral(elems) => self.array_literal(elems, None),
            ast::Expression::ObjectLiteral { type_name, fields } => match type_name {
                Some(name) => self.struct_literal(name, fields),
                None => Err(Error::unsupported("object literal without a struct type")),
            },
            ast::Expression::Cast { expr: inner, ty } => {
                let target = self.resolve(ty)?;
                if literal_bytes(inner).is_some()
                    || matches!(
                        inner.as_ref(),
                        ast::Expression::ArrayLiteral(_) | ast::Expression::ObjectLiteral { .. }
                    )
                {
                    return self.lower_expr_as(inner, &target);
                }
                let v = self.lower_expr(inner)?;
                self.convert(v, &target)
            }
        }
    }

    /// Lower an expression in a context expecting `ty`
    pub(super) fn lower_expr_as(
        &mut self,
        expr: &ast::Expression,
        ty: &TypeDescriptor,
    ) -> Result<Value> {
        if let Some(bytes) = literal_bytes(expr) {
            let bytes = bytes?;
            match ty {
                TypeDescriptor::FixedBytes(n) => {
                    if bytes.len() > usize::from(*n) {
                        return Err(Error::MalformedType {
                            text: ty.describe(),
                            reason: format!("literal of {} bytes does not fit", bytes.len()),
                        });
                    }
                    return Ok(Value::new(left_aligned(&bytes), ty.clone()));
                }
                TypeDescriptor::String | TypeDescriptor::DynamicBytes => {
                    return Ok(self.bytes_literal(&bytes, ty.clone()));
                }
                _ => {}
            }
        }
        match (expr, ty) {
            (ast::Expression::ObjectLiteral { type_name, fields }, TypeDescriptor::Struct(name)) => {
                self.struct_literal(type_name.as_deref().unwrap_or(name), fields)
            }
            (ast::Expression::ArrayLiteral(elems), TypeDescriptor::Array(elem, len)) => {
                if let Some(len) = len {
                    if elems.len() as u64 != *len {
                        return Err(Error::ArityMismatch {
                            callee: format!("{} literal", ty.describe()),
                            expected: *len as usize,
                            got: elems.len(),
                        });
                    }
                }
                let v = self.array_literal(elems, Some(elem))?;
                Ok(Value::new(v.expr, ty.clone()))
            }
            (
                ast::Expression::Conditional {
                    condition,
                    then_expr,
                    else_expr,
                },
                _,
            ) => self.lower_conditional(condition, then_expr, else_expr, Some(ty)),
            _ => {
                let v = self.lower_expr(expr)?;
                self.coerce(v, ty)
            }
        }
    }

    /// Lower an expression that may produce several values (tuples, calls)
    pub(super) fn lower_multi(&mut self, expr: &ast::Expression) -> Result<Vec<Value>> {
        match expr {
            ast::Expression::Tuple(elems) => self.lower_ordered(elems),
            ast::Expression::Call { callee, args } => self.lower_call(callee, args),
            other => Ok(vec![self.lower_expr(other)?]),
        }
    }

    /// Lower expressions left to right; earlier values are captured when a
    /// later one needs statements of its own
    pub(super) fn lower_ordered(&mut self, exprs: &[ast::Expression]) -> Result<Vec<Value>> {
        self.lower_ordered_with(exprs.len(), |this, i| this.lower_expr(&exprs[i]))
    }

    pub(super) fn lower_ordered_as(
        &mut self,
        exprs: &[ast::Expression],
        types: &[TypeDescriptor],
    ) -> Result<Vec<Value>> {
        self.lower_ordered_with(exprs.len(), |this, i| this.lower_expr_as(&exprs[i], &types[i]))
    }

    fn lower_ordered_with(
        &mut self,
        count: usize,
        mut lower: impl FnMut(&mut Self, usize) -> Result<Value>,
    ) -> Result<Vec<Value>> {
        let mut values: Vec<Value> = Vec::with_capacity(count);
        for i in 0..count {
            let (prelude, v) = self.with_block(|this| lower(this, i))?;
            if !prelude.is_empty() {
                for earlier in values.iter_mut() {
                    if matches!(earlier.expr, ir::Expression::Call { .. }) {
                        *earlier = self.capture(earlier.clone());
                    }
                }
                self.emit_all(prelude);
            }
            values.push(v);
        }
        Ok(values)
    }

    pub(super) fn emit_all(&mut self, stmts: Vec<Statement>) {
        for s in stmts {
            self.emit(s);
        }
    }

    // =========================================================================
    // NAMES AND MEMBERS
    // =========================================================================

    fn lower_identifier(&mut self, name: &str) -> Result<Value> {
        if let Some(local) = self.lookup(name) {
            return Ok(Value::new(ident(&local.ir_name), local.ty.clone()));
        }
        if let Some(field) = self.constant_field(name) {
            return self.lower_constant(field);
        }
        Err(self.undefined(name))
    }

    /// Constant declared by the class chain (or the library being lowered)
    pub(super) fn constant_field(&self, name: &str) -> Option<&'a ast::FieldDecl> {
        let is_constant = |f: &&ast::FieldDecl| f.name == name && f.storage == StorageClass::Constant;
        match &self.owner {
            Owner::Library(library) => self
                .ctx
                .catalog
                .library(library)?
                .fields
                .iter()
                .find(is_constant),
            _ => self
                .ctx
                .chain
                .classes()
                .iter()
                .rev()
                .find_map(|&c| c.fields.iter().find(is_constant)),
        }
    }

    /// Constant declared by the named class or library (`Lib.CONST`)
    fn named_constant(&self, owner: &str, name: &str) -> Option<ast::FieldDecl> {
        let class = self
            .ctx
            .catalog
            .library(owner)
            .or_else(|| self.ctx.catalog.class(owner))?;
        class
            .fields
            .iter()
            .find(|f| f.name == name && f.storage == StorageClass::Constant)
            .cloned()
    }

    fn lower_constant(&mut self, field: &ast::FieldDecl) -> Result<Value> {
        let init = field.initializer.as_ref().ok_or_else(|| {
            Error::compiler(format!("constant `{}` has no value", field.name))
        })?;
        if self.inline_depth >= MAX_INLINE_DEPTH {
            return Err(Error::compiler(format!(
                "constant `{}` refers to itself",
                field.name
            )));
        }
        let ty = self.resolve(&field.ty)?;
        self.inline_depth += 1;
        let v = self.lower_expr_as(init, &ty);
        self.inline_depth -= 1;
        v
    }

    fn lower_member(
        &mut self,
        expr: &ast::Expression,
        object: &ast::Expression,
        property: &str,
    ) -> Result<Value> {
        // x.code.length
        if property == "length" {
            if let ast::Expression::Member {
                object: inner,
                property: code,
            } = object
            {
                if code == "code" && !self.is_struct_place(inner) {
                    let target = self.lower_expr(inner)?;
                    return Ok(Value::new(
                        call("extcodesize", vec![target.expr]),
                        TypeDescriptor::UInt(256),
                    ));
                }
            }
        }

        if self.place_type(expr).is_some() {
            let place = self.place_of(expr, false)?;
            return self.load(&place);
        }

        if property == "length" && self.place_type(object).is_some() {
            let place = self.place_of(object, false)?;
            return self.length_of_place(place);
        }

        match object {
            ast::Expression::This => {
                if let Some(field) = self.constant_field(property) {
                    return self.lower_constant(field);
                }
                if property == "balance" {
                    return Ok(Value::new(call("selfbalance", vec![]), TypeDescriptor::UInt(256)));
                }
                return Err(Error::UnknownMember {
                    member: property.to_string(),
                    on: format!("class {}", self.class),
                });
            }
            ast::Expression::Identifier(name) if self.lookup(name).is_none() => {
                if let Some(v) = self.environment(name, property)? {
                    return Ok(v);
                }
            }
            _ => {}
        }

        let v = self.lower_expr(object)?;
        match (property, &v.ty) {
            ("length", _) => {
                let place = self.value_place(v);
                self.length_of_place(place)
            }
            ("balance", TypeDescriptor::Address | TypeDescriptor::Contract(_)) => Ok(Value::new(
                call("balance", vec![v.expr]),
                TypeDescriptor::UInt(256),
            )),
            ("codehash", TypeDescriptor::Address | TypeDescriptor::Contract(_)) => Ok(Value::new(
                call("extcodehash", vec![v.expr]),
                TypeDescriptor::FixedBytes(32),
            )),
            (_, TypeDescriptor::Struct(_)) => {
                let base = self.value_place(v);
                let place = self.member_place(base, property)?;
                self.load(&place)
            }
            (_, ty) => Err(Error::UnknownMember {
                member: property.to_string(),
                on: ty.describe(),
            }),
        }
    }

    fn is_struct_place(&self, expr: &ast::Expression) -> bool {
        matches!(self.place_type(expr), Some(TypeDescriptor::Struct(_)))
    }

    fn length_of_place(&mut self, place: super::Place) -> Result<Value> {
        let ty = place.ty();
        let length = match (&place, &ty) {
            (_, TypeDescriptor::Array(_, Some(n))) => num(u128::from(*n)),
            (
                super::Place::Storage { slot, .. },
                TypeDescriptor::Array(_, None) | TypeDescriptor::String | TypeDescriptor::DynamicBytes,
            ) => call("sload", vec![slot.clone()]),
            (
                _,
                TypeDescriptor::Array(_, None) | TypeDescriptor::String | TypeDescriptor::DynamicBytes,
            ) => {
                let ptr = self.load(&place)?;
                call("mload", vec![ptr.expr])
            }
            (_, other) => {
                return Err(Error::UnknownMember {
                    member: "length".to_string(),
                    on: other.describe(),
                })
            }
        };
        Ok(Value::new(length, TypeDescriptor::UInt(256)))
    }

    /// `msg.*`, `block.*`, `tx.*`, enum members, type bounds and named constants
    fn environment(&mut self, object: &str, property: &str) -> Result<Option<Value>> {
        let word = |name: &str, ty: TypeDescriptor| Some(Value::new(call(name, vec![]), ty));
        let u256 = TypeDescriptor::UInt(256);
        let value = match (object, property) {
            ("msg", "sender") => word("caller", TypeDescriptor::Address),
            ("msg", "value") => word("callvalue", u256),
            ("msg", "sig") => Some(Value::new(
                call(
                    "shl",
                    vec![num(224), call("shr", vec![num(224), call("calldataload", vec![num(0)])])],
                ),
                TypeDescriptor::FixedBytes(4),
            )),
            ("msg", "data") => Some(self.calldata_copy()),
            ("block", "timestamp") => word("timestamp", u256),
            ("block", "number") => word("number", u256),
            ("block", "chainid") => word("chainid", u256),
            ("block", "coinbase") => word("coinbase", TypeDescriptor::Address),
            ("block", "basefee") => word("basefee", u256),
            ("block", "gaslimit") => word("gaslimit", u256),
            ("block", "prevrandao") | ("block", "difficulty") => word("prevrandao", u256),
            ("tx", "origin") => word("origin", TypeDescriptor::Address),
            ("tx", "gasprice") => word("gasprice", u256),
            ("msg" | "block" | "tx", _) => {
                return Err(Error::UnknownMember {
                    member: property.to_string(),
                    on: object.to_string(),
                })
            }
            _ => None,
        };
        if value.is_some() {
            return Ok(value);
        }

        if self.ctx.catalog.is_enum(object) {
            let member = self.ctx.catalog.enum_member(object, property).ok_or_else(|| {
                Error::UnknownMember {
                    member: property.to_string(),
                    on: format!("enum {}", object),
                }
            })?;
            return Ok(Some(Value::new(num(member), TypeDescriptor::UInt(8))));
        }

        if let Ok(ty @ (TypeDescriptor::UInt(_) | TypeDescriptor::Int(_))) =
            TypeDescriptor::parse(object, &NoNames)
        {
            if let Some(bounds) = ty.bounds() {
                let bound = match property {
                    "max" => ir::Expression::num_text(bounds.max),
                    "min" if bounds.negative_min => {
                        call("not", vec![ir::Expression::num_text(bounds.min)])
                    }
                    "min" => ir::Expression::num_text(bounds.min),
                    _ => {
                        return Err(Error::UnknownMember {
                            member: property.to_string(),
                            on: ty.describe(),
                        })
                    }
                };
                return Ok(Some(Value::new(bound, ty)));
            }
        }

        if let Some(field) = self.named_constant(object, property) {
            return self.lower_constant(&field).map(Some);
        }
        Ok(None)
    }

    /// Copy of the whole calldata as a memory `bytes`
    fn calldata_copy(&mut self) -> Value {
        let alloc = self.call_rt(
            RuntimeHelper::AllocateMemory,
            vec![call("add", vec![call("calldatasize", vec![]), num(32)])],
        );
        let ptr = self.capture_fresh(Value::new(alloc, TypeDescriptor::DynamicBytes));
        self.emit_expr(call("mstore", vec![ptr.expr.clone(), call("calldatasize", vec![])]));
        self.emit_expr(call(
            "calldatacopy",
            vec![
                call("add", vec![ptr.expr.clone(), num(32)]),
                num(0),
                call("calldatasize", vec![]),
            ],
        ));
        ptr
    }

    // =========================================================================
    // LITERALS
    // =========================================================================

    /// `[length][data]` copy of a literal byte string
    pub(super) fn bytes_literal(&mut self, bytes: &[u8], ty: TypeDescriptor) -> Value {
        if bytes.is_empty() {
            return Value::new(num(EMPTY_MEMORY), ty);
        }
        let words = bytes.len().div_ceil(32);
        let alloc = self.call_rt(
            RuntimeHelper::AllocateMemory,
            vec![num(32 * (words as u128 + 1))],
        );
        let ptr = self.capture_fresh(Value::new(alloc, ty));
        self.emit_expr(call("mstore", vec![ptr.expr.clone(), num(bytes.len() as u128)]));
        for (i, chunk) in bytes.chunks(32).enumerate() {
            self.emit_expr(call(
                "mstore",
                vec![word_at(ptr.expr.clone(), i as u128 + 1), left_aligned(chunk)],
            ));
        }
        ptr
    }

    fn array_literal(
        &mut self,
        elems: &[ast::Expression],
        elem_ty: Option<&TypeDescriptor>,
    ) -> Result<Value> {
        let values = match elem_ty {
            Some(ty) => self.lower_ordered_as(elems, &vec![ty.clone(); elems.len()])?,
            None => self.lower_ordered(elems)?,
        };
        let elem = elem_ty
            .cloned()
            .or_else(|| values.first().map(|v| v.ty.clone()))
            .unwrap_or(TypeDescriptor::UInt(256));
        if values.is_empty() {
            return Ok(Value::new(
                num(EMPTY_MEMORY),
                TypeDescriptor::Array(Box::new(elem), None),
            ));
        }
        let n = values.len() as u128;
        let alloc = self.call_rt(RuntimeHelper::AllocateMemory, vec![num(32 * (n + 1))]);
        let ty = TypeDescriptor::Array(Box::new(elem), Some(n as u64));
        let ptr = self.capture_fresh(Value::new(alloc, ty));
        self.emit_expr(call("mstore", vec![ptr.expr.clone(), num(n)]));
        for (i, v) in values.into_iter().enumerate() {
            self.emit_expr(call(
                "mstore",
                vec![word_at(ptr.expr.clone(), i as u128 + 1), v.expr],
            ));
        }
        Ok(ptr)
    }

    fn struct_literal(&mut self, name: &str, fields: &[(String, ast::Expression)]) -> Result<Value> {
        let layout = self
            .ctx
            .catalog
            .struct_layout(name)
            .cloned()
            .ok_or_else(|| Error::unresolved("struct", name))?;
        let mut types = Vec::with_capacity(fields.len());
        for (field, _) in fields {
            let f = layout.fields.get(field).ok_or_else(|| Error::UnknownMember {
                member: field.clone(),
                on: format!("struct {}", name),
            })?;
            types.push(f.ty.clone());
        }
        let exprs: Vec<ast::Expression> = fields.iter().map(|(_, e)| e.clone()).collect();
        let values = self.lower_ordered_as(&exprs, &types)?;

        let alloc = self.call_rt(
            RuntimeHelper::AllocateMemory,
            vec![num(32 * layout.fields.len() as u128)],
        );
        let ptr = self.capture_fresh(Value::new(alloc, TypeDescriptor::Struct(name.to_string())));
        for (i, (field, f)) in layout.fields.iter().enumerate() {
            let value = match fields.iter().position(|(n, _)| n == field) {
                Some(at) => values[at].expr.clone(),
                None => self.default_value(&f.ty)?,
            };
            self.emit_expr(call("mstore", vec![word_at(ptr.expr.clone(), i as u128), value]));
        }
        Ok(ptr)
    }

    /// Zero value of a type; reference types get fresh memory
    pub(super) fn default_value(&mut self, ty: &TypeDescriptor) -> Result<ir::Expression> {
        match ty {
            t if t.is_value_type() => Ok(num(0)),
            TypeDescriptor::String | TypeDescriptor::DynamicBytes | TypeDescriptor::Array(_, None) => {
                Ok(num(EMPTY_MEMORY))
            }
            TypeDescriptor::Struct(name) => Ok(self.struct_literal(name, &[])?.expr),
            TypeDescriptor::Array(elem, Some(n)) => {
                let n = u128::from(*n);
                let alloc = self.call_rt(RuntimeHelper::AllocateMemory, vec![num(32 * (n + 1))]);
                let ptr = self.capture_fresh(Value::new(alloc, ty.clone()));
                self.emit_expr(call("mstore", vec![ptr.expr.clone(), num(n)]));
                if elem.is_value_type() {
                    self.emit_expr(call(
                        "calldatacopy",
                        vec![
                            call("add", vec![ptr.expr.clone(), num(32)]),
                            call("calldatasize", vec![]),
                            num(32 * n),
                        ],
                    ));
                } else {
                    for i in 0..n {
                        let v = self.default_value(elem)?;
                        self.emit_expr(call("mstore", vec![word_at(ptr.expr.clone(), i + 1), v]));
                    }
                }
                Ok(ptr.expr)
            }
            other => Err(Error::unsupported(format!(
                "`{}` outside storage",
                other.describe()
            ))),
        }
    }

    // =========================================================================
    // OPERATORS
    // =========================================================================

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        left: &ast::Expression,
        right: &ast::Expression,
    ) -> Result<Value> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.lower_logical(op, left, right);
        }
        let mut pair =
            self.lower_ordered_with(2, |this, i| this.lower_expr(if i == 0 { left } else { right }))?;
        let r = pair.pop().ok_or_else(|| Error::compiler("missing right operand"))?;
        let l = pair.pop().ok_or_else(|| Error::compiler("missing left operand"))?;
        let ty = if is_number_literal(left) && !is_number_literal(right) {
            r.ty.clone()
        } else {
            l.ty.clone()
        };
        self.apply_binary(op, l, r, &ty)
    }

    /// Combine two lowered operands of type `ty`
    pub(super) fn apply_binary(
        &mut self,
        op: BinaryOp,
        l: Value,
        r: Value,
        ty: &TypeDescriptor,
    ) -> Result<Value> {
        if ty.is_bytes_like() {
            return match op {
                BinaryOp::Add => {
                    let joined = self.call_rt(RuntimeHelper::StringConcat, vec![l.expr, r.expr]);
                    Ok(self.capture(Value::new(joined, ty.clone())))
                }
                BinaryOp::Eq | BinaryOp::NotEq => {
                    let eq = self.call_rt(RuntimeHelper::StringEqual, vec![l.expr, r.expr]);
                    let eq = if op == BinaryOp::NotEq {
                        call("iszero", vec![eq])
                    } else {
                        eq
                    };
                    Ok(Value::new(eq, TypeDescriptor::Bool))
                }
                other => Err(Error::unsupported(format!(
                    "operator {:?} on {}",
                    other,
                    ty.describe()
                ))),
            };
        }

        let signed = ty.is_signed();
        let pick = |s: &'static str, u: &'static str| if signed { s } else { u };
        let (a, b) = (l.expr, r.expr);
        let expr = match op {
            BinaryOp::Add => clean(call("add", vec![a, b]), ty),
            BinaryOp::Sub => clean(call("sub", vec![a, b]), ty),
            BinaryOp::Mul => clean(call("mul", vec![a, b]), ty),
            BinaryOp::Div => call(pick("sdiv", "div"), vec![a, b]),
            BinaryOp::Mod => call(pick("smod", "mod"), vec![a, b]),
            BinaryOp::Pow => clean(call("exp", vec![a, b]), ty),
            BinaryOp::BitAnd => call("and", vec![a, b]),
            BinaryOp::BitOr => call("or", vec![a, b]),
            BinaryOp::BitXor => call("xor", vec![a, b]),
            BinaryOp::Shl => clean(call("shl", vec![b, a]), ty),
            BinaryOp::Shr => call(pick("sar", "shr"), vec![b, a]),
            BinaryOp::Eq => call("eq", vec![a, b]),
            BinaryOp::NotEq => call("iszero", vec![call("eq", vec![a, b])]),
            BinaryOp::Lt => call(pick("slt", "lt"), vec![a, b]),
            BinaryOp::Gt => call(pick("sgt", "gt"), vec![a, b]),
            BinaryOp::LtEq => call("iszero", vec![call(pick("sgt", "gt"), vec![a, b])]),
            BinaryOp::GtEq => call("iszero", vec![call(pick("slt", "lt"), vec![a, b])]),
            BinaryOp::And => call("and", vec![bool_of(a, &l.ty), bool_of(b, &r.ty)]),
            BinaryOp::Or => call("or", vec![bool_of(a, &l.ty), bool_of(b, &r.ty)]),
        };
        let result_ty = if op.is_comparison() || matches!(op, BinaryOp::And | BinaryOp::Or) {
            TypeDescriptor::Bool
        } else {
            ty.clone()
        };
        Ok(Value::new(expr, result_ty))
    }

    /// `&&` / `||`: the right operand only runs when it decides the result
    fn lower_logical(
        &mut self,
        op: BinaryOp,
        left: &ast::Expression,
        right: &ast::Expression,
    ) -> Result<Value> {
        let l = self.lower_expr(left)?;
        let l = bool_of(l.expr, &l.ty);
        let (prelude, r) = self.with_block(|this| this.lower_expr(right))?;
        let r = bool_of(r.expr, &r.ty);

        if prelude.is_empty() && r.is_pure() {
            let name = if op == BinaryOp::And { "and" } else { "or" };
            return Ok(Value::new(call(name, vec![l, r]), TypeDescriptor::Bool));
        }

        let t = self.temp();
        self.emit(Statement::let_(t.clone(), l));
        let mut body = prelude;
        body.push(Statement::assign(t.clone(), r));
        let guard = if op == BinaryOp::And {
            ident(&t)
        } else {
            call("iszero", vec![ident(&t)])
        };
        self.emit(Statement::if_(guard, body));
        Ok(Value::new(ident(&t), TypeDescriptor::Bool))
    }

    fn lower_conditional(
        &mut self,
        condition: &ast::Expression,
        then_expr: &ast::Expression,
        else_expr: &ast::Expression,
        ty: Option<&TypeDescriptor>,
    ) -> Result<Value> {
        let c = self.lower_expr(condition)?;
        let cond = self.cond_temp();
        self.emit(Statement::let_(cond.clone(), c.expr));

        let t = self.temp();
        self.emit(Statement::Let {
            names: vec![t.clone()],
            value: None,
        });
        let (mut then_body, tv) = self.with_block(|this| match ty {
            Some(ty) => this.lower_expr_as(then_expr, ty),
            None => this.lower_expr(then_expr),
        })?;
        let result_ty = tv.ty.clone();
        then_body.push(Statement::assign(t.clone(), tv.expr));
        let (mut else_body, ev) = self.with_block(|this| this.lower_expr_as(else_expr, &result_ty))?;
        else_body.push(Statement::assign(t.clone(), ev.expr));

        self.emit(Statement::if_(ident(&cond), then_body));
        self.emit(Statement::if_(call("iszero", vec![ident(&cond)]), else_body));
        Ok(Value::new(ident(&t), result_ty))
    }

    fn lower_unary(&mut self, op: UnaryOp, operand: &ast::Expression) -> Result<Value> {
        match op {
            UnaryOp::Delete => {
                let place = self.place_of(operand, true)?;
                self.clear(&place)?;
                Ok(Value::void())
            }
            UnaryOp::Neg => {
                let v = self.lower_expr(operand)?;
                let ty = if is_number_literal(operand) {
                    TypeDescriptor::Int(256)
                } else {
                    v.ty.clone()
                };
                Ok(Value::new(clean(call("sub", vec![num(0), v.expr]), &ty), ty))
            }
            UnaryOp::Not => {
                let v = self.lower_expr(operand)?;
                Ok(Value::new(call("iszero", vec![v.expr]), TypeDescriptor::Bool))
            }
            UnaryOp::BitNot => {
                let v = self.lower_expr(operand)?;
                let flipped = call("not", vec![v.expr]);
                let expr = match &v.ty {
                    TypeDescriptor::FixedBytes(n) if *n < 32 => {
                        call("and", vec![flipped, high_mask(*n)])
                    }
                    ty => clean(flipped, ty),
                };
                Ok(Value::new(expr, v.ty))
            }
        }
    }

    /// `x++`, `--x`; `want` is false in statement position
    pub(super) fn lower_update(
        &mut self,
        op: UpdateOp,
        prefix: bool,
        target: &ast::Expression,
        want: bool,
    ) -> Result<Value> {
        let place = self.place_of(target, true)?;
        let ty = place.ty();
        let old = self.load(&place)?;
        let old = if want && !prefix {
            self.capture_fresh(old)
        } else {
            old
        };
        let name = if op == UpdateOp::Increment { "add" } else { "sub" };
        let new = Value::new(clean(call(name, vec![old.expr.clone(), num(1)]), &ty), ty);

        if !want {
            self.store(&place, new)?;
            return Ok(Value::void());
        }
        if prefix {
            let new = self.capture_fresh(new);
            self.store(&place, new.clone())?;
            Ok(new)
        } else {
            self.store(&place, new)?;
            Ok(old)
        }
    }

    /// `=`, `op=` and tuple assignment; `want` is false in statement position
    pub(super) fn lower_assign(
        &mut self,
        op: AssignOp,
        target: &ast::Expression,
        value: &ast::Expression,
        want: bool,
    ) -> Result<Value> {
        if let ast::Expression::Tuple(targets) = target {
            if op != AssignOp::Assign {
                return Err(Error::InvalidAssignmentTarget(self.function.clone()));
            }
            return self.lower_tuple_assign(targets, value);
        }

        let place = self.place_of(target, true)?;
        let ty = place.ty();
        let new = match op.binary_op() {
            None => self.lower_expr_as(value, &ty)?,
            Some(bop) => {
                let old = self.load(&place)?;
                let (prelude, r) = self.with_block(|this| this.lower_expr_as(value, &ty))?;
                let old = if prelude.is_empty() {
                    old
                } else {
                    self.capture(old)
                };
                self.emit_all(prelude);
                self.apply_binary(bop, old, r, &ty)?
            }
        };

        if want {
            let new = self.capture(new);
            self.store(&place, new.clone())?;
            Ok(new)
        } else {
            self.store(&place, new)?;
            Ok(Value::void())
        }
    }

    fn lower_tuple_assign(
        &mut self,
        targets: &[ast::Expression],
        value: &ast::Expression,
    ) -> Result<Value> {
        let values = self.lower_multi(value)?;
        if values.len() != targets.len() {
            return Err(Error::ArityMismatch {
                callee: "tuple assignment".to_string(),
                expected: targets.len(),
                got: values.len(),
            });
        }
        // Every right-hand value is read before any target is written
        let mut captured = Vec::with_capacity(values.len());
        for v in values {
            captured.push(match v.expr {
                ir::Expression::Literal(_) => v,
                _ => self.capture_fresh(v),
            });
        }
        for (target, v) in targets.iter().zip(captured) {
            if matches!(target, ast::Expression::Identifier(n) if n == "_") {
                continue;
            }
            let place = self.place_of(target, true)?;
            let v = self.coerce(v, &place.ty())?;
            self.store(&place, v)?;
        }
        Ok(Value::void())
    }

    // =========================================================================
    // CONVERSIONS
    // =========================================================================

    /// Implicit conversion: retypes the value
    pub(super) fn coerce(&mut self, v: Value, to: &TypeDescriptor) -> Result<Value> {
        if v.is_void() {
            return Err(Error::compiler(format!(
                "expression without a value used as {} in {}",
                to.describe(),
                self.function
            )));
        }
        Ok(Value::new(v.expr, to.clone()))
    }

    /// Explicit conversion (`x as T`, `T(x)`)
    pub(super) fn convert(&mut self, v: Value, to: &TypeDescriptor) -> Result<Value> {
        use TypeDescriptor as T;
        if v.is_void() {
            return self.coerce(v, to);
        }
        if &v.ty == to {
            return Ok(v);
        }
        let e = v.expr;
        let expr = match (&v.ty, to) {
            (T::FixedBytes(n), T::UInt(_) | T::Int(_)) => {
                let shifted = shift_right(e, 256 - 8 * u128::from(*n));
                clean(shifted, to)
            }
            (
                T::UInt(_) | T::Int(_) | T::Bool | T::Address | T::Contract(_),
                T::UInt(_) | T::Int(_),
            ) => clean(e, to),
            (T::Address | T::Contract(_), T::Address | T::Contract(_)) => e,
            (T::FixedBytes(n), T::Address | T::Contract(_)) => {
                let shifted = shift_right(e, 256 - 8 * u128::from(*n));
                call("and", vec![shifted, address_mask()])
            }
            (T::UInt(_) | T::Int(_), T::Address | T::Contract(_)) => {
                call("and", vec![e, address_mask()])
            }
            (T::UInt(_) | T::Int(_) | T::Address | T::Contract(_), T::FixedBytes(n)) => {
                if *n == 32 {
                    e
                } else {
                    call("shl", vec![num(256 - 8 * u128::from(*n)), e])
                }
            }
            (T::FixedBytes(m), T::FixedBytes(n)) => {
                if m > n {
                    call("and", vec![e, high_mask(*n)])
                } else {
                    e
                }
            }
            (T::DynamicBytes | T::String, T::FixedBytes(n)) => {
                let word = call("mload", vec![call("add", vec![e, num(32)])]);
                if *n == 32 {
                    word
                } else {
                    call("and", vec![word, high_mask(*n)])
                }
            }
            (_, T::Bool) if v.ty.is_value_type() => call("iszero", vec![call("iszero", vec![e])]),
            (T::DynamicBytes | T::String, T::DynamicBytes | T::String) => e,
            (from, to) => {
                return Err(Error::unsupported(format!(
                    "conversion from {} to {}",
                    from.describe(),
                    to.describe()
                )))
            }
        };
        Ok(Value::new(expr, to.clone()))
    }
}

fn shift_right(e: ir::Expression, bits: u128) -> ir::Expression {
    if bits == 0 {
        e
    } else {
        call("shr", vec![num(bits), e])
    }
}

fn address_mask() -> ir::Expression {
    ir::Expression::num_text(format!("0x{}", "ff".repeat(20)))
}

/// Normalize a word to 0/1 unless it is already a boolean
fn bool_of(e: ir::Expression, ty: &TypeDescriptor) -> ir::Expression {
    if *ty == TypeDescriptor::Bool {
        e
    } else {
        call("iszero", vec![call("iszero", vec![e])])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_normalization() {
        assert_eq!(normalize_number("1_000").unwrap(), "1000");
        assert_eq!(normalize_number("10n").unwrap(), "10");
        assert_eq!(normalize_number("0xFF").unwrap(), "0xff");
        assert_eq!(normalize_number("1e18").unwrap(), "1000000000000000000");
        assert_eq!(normalize_number("2.5e3").unwrap(), "2500");
        assert_eq!(normalize_number("007").unwrap(), "7");
        assert_eq!(normalize_number("0").unwrap(), "0");
    }

    #[test]
    fn test_number_rejections() {
        assert!(normalize_number("1.5").is_err());
        assert!(normalize_number("2.55e1").is_err());
        assert!(normalize_number("0x").is_err());
        assert!(normalize_number(&format!("{}0", MAX_U256)).is_err());
        assert!(normalize_number(
            "115792089237316195423570985008687907853269984665640564039457584007913129639936"
        )
        .is_err());
        assert!(normalize_number(MAX_U256).is_ok());
        assert!(normalize_number("1e99999999999").is_err());
        assert!(normalize_number("1e79").is_err());
        assert_eq!(normalize_number("0e99999999999").unwrap(), "0");
        assert_eq!(normalize_number("1e77").unwrap().len(), 78);
    }

    #[test]
    fn test_left_aligned_literal() {
        assert_eq!(
            left_aligned(b"ab"),
            ir::Expression::num_text(format!("0x6162{}", "00".repeat(30)))
        );
        assert_eq!(left_aligned(b""), num(0));
    }

    #[test]
    fn test_clean_narrow_results() {
        assert_eq!(
            clean(ident("x"), &TypeDescriptor::UInt(8)),
            call("and", vec![ident("x"), ir::Expression::num_text("0xff")])
        );
        assert_eq!(
            clean(ident("x"), &TypeDescriptor::Int(16)),
            call("signextend", vec![num(1), ident("x")])
        );
        assert_eq!(clean(ident("x"), &TypeDescriptor::UInt(256)), ident("x"));
    }
}
