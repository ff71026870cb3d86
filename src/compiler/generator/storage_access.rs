//! Places: storage fields, mapping entries, array elements, struct members
//! and memory words, plus the loads and stores between them and values.
//!
//! Storage encodings:
//!
//! | Type | Layout |
//! |------|--------|
//! | packed scalar | `and(shr(8 * offset, sload(slot)), mask)` |
//! | mapping entry | `keccak256(key . slot)` |
//! | dynamic array | length at `slot`, element `i` at `keccak256(slot) + i * span` |
//! | fixed array | element `i` at `slot + i * span` |
//! | string / bytes | length at `slot`, data words at `keccak256(slot)` |
//! | struct | one slot (or region) per field, in declaration order |
//!
//! Reference values in memory are pointers: `[length][words]` for strings,
//! bytes and arrays, `[words]` for structs. Reading a storage struct or array
//! copies it into memory.

use super::helpers::HelperKey;
use super::{FunctionLowerer, LoweringMode, Owner, Place, Value};
use crate::ast;
use crate::compiler::ir::{self, call, ident, num, FunctionDef, Statement};
use crate::compiler::runtime::{bounds_check, RuntimeHelper, PANIC_OUT_OF_BOUNDS};
use crate::compiler::types::TypeDescriptor;
use crate::{Error, Result};

/// Zero-length memory array/string (the zero slot at `0x60`)
pub(crate) const EMPTY_MEMORY: u128 = 0x60;

impl FunctionLowerer<'_, '_> {
    // =========================================================================
    // PLACE RESOLUTION
    // =========================================================================

    /// Storage place of a state field
    pub(super) fn field_place(&mut self, name: &str, write: bool) -> Result<Place> {
        if self.owner != Owner::Contract {
            return Err(Error::UnknownMember {
                member: name.to_string(),
                on: format!("`this` outside a contract in {}", self.function),
            });
        }
        let Some(slot) = self.ctx.layout.get(name).cloned() else {
            if self.constant_field(name).is_some() {
                return Err(if write {
                    Error::ReadOnlyAssignment {
                        kind: "constant",
                        name: name.to_string(),
                    }
                } else {
                    Error::compiler(format!("constant `{}` has no storage", name))
                });
            }
            return Err(Error::UnknownMember {
                member: name.to_string(),
                on: format!("class {}", self.class),
            });
        };
        if write && slot.immutable && self.mode == LoweringMode::Runtime {
            return Err(Error::ReadOnlyAssignment {
                kind: "immutable",
                name: name.to_string(),
            });
        }
        Ok(Place::Storage {
            slot: num(slot.slot),
            offset: slot.byte_offset,
            size: slot.byte_size,
            ty: slot.ty,
            transient: slot.transient,
        })
    }

    /// Static type of an expression that denotes a place, without lowering it
    pub(super) fn place_type(&self, expr: &ast::Expression) -> Option<TypeDescriptor> {
        match expr {
            ast::Expression::Identifier(name) => self.lookup(name).map(|l| l.ty.clone()),
            ast::Expression::Member { object, property } => match object.as_ref() {
                ast::Expression::This if self.owner == Owner::Contract => {
                    self.ctx.layout.get(property).map(|s| s.ty.clone())
                }
                other => match self.place_type(other)? {
                    TypeDescriptor::Struct(name) => self
                        .ctx
                        .catalog
                        .struct_layout(&name)?
                        .fields
                        .get(property)
                        .map(|f| f.ty.clone()),
                    _ => None,
                },
            },
            ast::Expression::Index { object, .. } => match self.place_type(object)? {
                TypeDescriptor::Mapping(_, value) => Some(*value),
                TypeDescriptor::Array(elem, _) => Some(*elem),
                TypeDescriptor::DynamicBytes => Some(TypeDescriptor::FixedBytes(1)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Resolve an expression to a place
    pub(super) fn place_of(&mut self, expr: &ast::Expression, write: bool) -> Result<Place> {
        match expr {
            ast::Expression::Identifier(name) => {
                if let Some(local) = self.lookup(name) {
                    return Ok(Place::Local {
                        name: local.ir_name.clone(),
                        ty: local.ty.clone(),
                    });
                }
                if write && self.constant_field(name).is_some() {
                    return Err(Error::ReadOnlyAssignment {
                        kind: "constant",
                        name: name.clone(),
                    });
                }
                Err(self.undefined(name))
            }
            ast::Expression::Member { object, property } => {
                if matches!(object.as_ref(), ast::Expression::This) {
                    return self.field_place(property, write);
                }
                let base = self.base_place(object)?;
                self.member_place(base, property)
            }
            ast::Expression::Index { object, index } => {
                let base = self.base_place(object)?;
                let idx = self.lower_expr(index)?;
                self.index_place(base, idx, &describe(object))
            }
            _ if write => Err(Error::InvalidAssignmentTarget(self.function.clone())),
            _ => {
                let v = self.lower_expr(expr)?;
                Ok(self.value_place(v))
            }
        }
    }

    fn base_place(&mut self, object: &ast::Expression) -> Result<Place> {
        if self.place_type(object).is_some() {
            self.place_of(object, false)
        } else {
            let v = self.lower_expr(object)?;
            Ok(self.value_place(v))
        }
    }

    /// Treat a value (a memory pointer) as a place
    pub(super) fn value_place(&mut self, v: Value) -> Place {
        match v.expr {
            ir::Expression::Identifier(name) => Place::Local { name, ty: v.ty },
            expr => {
                let t = self.capture_fresh(Value::new(expr, v.ty.clone()));
                match t.expr {
                    ir::Expression::Identifier(name) => Place::Local { name, ty: v.ty },
                    addr => Place::Memory { addr, ty: v.ty },
                }
            }
        }
    }

    /// Element or entry of `base` at `index`
    pub(super) fn index_place(&mut self, base: Place, index: Value, label: &str) -> Result<Place> {
        match base {
            Place::Storage {
                slot,
                ty,
                transient,
                ..
            } => match ty {
                TypeDescriptor::Mapping(key, value) => {
                    let helper = if key.is_bytes_like() {
                        RuntimeHelper::MappingSlotBytes
                    } else {
                        RuntimeHelper::MappingSlot
                    };
                    let entry = self.call_rt(helper, vec![index.expr, slot]);
                    let entry = self.capture(Value::new(entry, TypeDescriptor::UInt(256)));
                    Ok(storage_place(entry.expr, *value, transient))
                }
                TypeDescriptor::Array(elem, None) => {
                    let span = elem.storage_slots(&self.ctx.catalog)?;
                    let at = self.call_rt(
                        RuntimeHelper::StorageArrayIndex,
                        vec![slot, index.expr, num(u128::from(span))],
                    );
                    let at = self.capture(Value::new(at, TypeDescriptor::UInt(256)));
                    Ok(storage_place(at.expr, *elem, transient))
                }
                TypeDescriptor::Array(elem, Some(len)) => {
                    let span = u128::from(elem.storage_slots(&self.ctx.catalog)?);
                    let at = match index.expr.as_u128() {
                        Some(i) => {
                            check_literal_index(label, i, len)?;
                            offset_slot(slot, i * span)
                        }
                        None => {
                            let idx = self.capture(index);
                            self.rt(RuntimeHelper::Panic(PANIC_OUT_OF_BOUNDS));
                            self.emit(bounds_check(idx.expr.clone(), num(u128::from(len))));
                            let scaled = if span == 1 {
                                idx.expr
                            } else {
                                call("mul", vec![idx.expr, num(span)])
                            };
                            self.capture(Value::new(
                                call("add", vec![slot, scaled]),
                                TypeDescriptor::UInt(256),
                            ))
                            .expr
                        }
                    };
                    Ok(storage_place(at, *elem, transient))
                }
                other => Err(Error::unsupported(format!(
                    "indexing storage `{}` ({}); copy it to memory first",
                    label,
                    other.describe()
                ))),
            },
            other => {
                let ty = other.ty();
                let ptr = self.load(&other)?.expr;
                match ty {
                    TypeDescriptor::Array(elem, len) => {
                        if let (Some(i), Some(len)) = (index.expr.as_u128(), len) {
                            check_literal_index(label, i, len)?;
                        }
                        let addr = self.call_rt(RuntimeHelper::MemoryArrayIndex, vec![ptr, index.expr]);
                        let addr = self.capture(Value::new(addr, TypeDescriptor::UInt(256)));
                        Ok(Place::Memory {
                            addr: addr.expr,
                            ty: *elem,
                        })
                    }
                    TypeDescriptor::DynamicBytes | TypeDescriptor::String => {
                        let addr = self.call_rt(RuntimeHelper::MemoryByteIndex, vec![ptr, index.expr]);
                        let addr = self.capture(Value::new(addr, TypeDescriptor::UInt(256)));
                        Ok(Place::MemoryByte { addr: addr.expr })
                    }
                    other => Err(Error::UnknownMember {
                        member: "[]".to_string(),
                        on: other.describe(),
                    }),
                }
            }
        }
    }

    /// Member `member` of a struct place
    pub(super) fn member_place(&mut self, base: Place, member: &str) -> Result<Place> {
        let ty = base.ty();
        let TypeDescriptor::Struct(name) = &ty else {
            return Err(Error::UnknownMember {
                member: member.to_string(),
                on: ty.describe(),
            });
        };
        let layout = self
            .ctx
            .catalog
            .struct_layout(name)
            .cloned()
            .ok_or_else(|| Error::unresolved("struct", name.clone()))?;
        let index = layout.field_index(member).ok_or_else(|| Error::UnknownMember {
            member: member.to_string(),
            on: format!("struct {}", name),
        })?;
        let field = &layout.fields[index];

        match base {
            Place::Storage {
                slot, transient, ..
            } => Ok(storage_place(
                offset_slot(slot, u128::from(field.offset_in_slots)),
                field.ty.clone(),
                transient,
            )),
            other => {
                let ptr = self.load(&other)?;
                let ptr = self.capture(ptr);
                Ok(Place::Memory {
                    addr: word_at(ptr.expr, index as u128),
                    ty: field.ty.clone(),
                })
            }
        }
    }

    // =========================================================================
    // LOADS AND STORES
    // =========================================================================

    /// Read a place
    pub(super) fn load(&mut self, place: &Place) -> Result<Value> {
        match place {
            Place::Local { name, ty } => Ok(Value::new(ident(name), ty.clone())),
            Place::Memory { addr, ty } => Ok(Value::new(call("mload", vec![addr.clone()]), ty.clone())),
            Place::MemoryByte { addr } => Ok(Value::new(
                call(
                    "shl",
                    vec![num(248), call("byte", vec![num(0), call("mload", vec![addr.clone()])])],
                ),
                TypeDescriptor::FixedBytes(1),
            )),
            Place::Storage {
                slot,
                offset,
                size,
                ty,
                transient,
            } => {
                if ty.is_value_type() {
                    return Ok(Value::new(
                        storage_read(slot.clone(), *offset, *size, ty, *transient),
                        ty.clone(),
                    ));
                }
                if *transient {
                    return Err(transient_reference(ty));
                }
                let copy = match ty {
                    TypeDescriptor::String | TypeDescriptor::DynamicBytes => {
                        self.call_rt(RuntimeHelper::StorageLoadBytes, vec![slot.clone()])
                    }
                    TypeDescriptor::Array(elem, None) if elem.is_value_type() => {
                        self.call_rt(RuntimeHelper::StorageLoadArray, vec![slot.clone()])
                    }
                    TypeDescriptor::Array(elem, Some(len)) if elem.is_value_type() => self.call_rt(
                        RuntimeHelper::StorageLoadWords,
                        vec![slot.clone(), num(u128::from(*len))],
                    ),
                    TypeDescriptor::Struct(name) => {
                        let helper = self.struct_load_helper(name)?;
                        call(&helper, vec![slot.clone()])
                    }
                    TypeDescriptor::Mapping(..) => {
                        return Err(Error::unsupported("mapping used as a value"))
                    }
                    other => {
                        return Err(Error::unsupported(format!(
                            "copying storage `{}` to memory",
                            other.describe()
                        )))
                    }
                };
                Ok(self.capture(Value::new(copy, ty.clone())))
            }
        }
    }

    /// Write a value into a place
    pub(super) fn store(&mut self, place: &Place, value: Value) -> Result<()> {
        match place {
            Place::Local { name, .. } => self.emit(Statement::assign(name.clone(), value.expr)),
            Place::Memory { addr, .. } => {
                self.emit_expr(call("mstore", vec![addr.clone(), value.expr]))
            }
            Place::MemoryByte { addr } => self.emit_expr(call(
                "mstore8",
                vec![addr.clone(), call("byte", vec![num(0), value.expr])],
            )),
            Place::Storage {
                slot,
                offset,
                size,
                ty,
                transient,
            } => {
                if ty.is_value_type() {
                    let stmt = storage_write(slot.clone(), *offset, *size, ty, *transient, value.expr);
                    self.emit(stmt);
                    return Ok(());
                }
                if *transient {
                    return Err(transient_reference(ty));
                }
                let stmt = match ty {
                    TypeDescriptor::String | TypeDescriptor::DynamicBytes => {
                        self.call_rt(RuntimeHelper::StorageStoreBytes, vec![slot.clone(), value.expr])
                    }
                    TypeDescriptor::Array(elem, None) if elem.is_value_type() => {
                        self.call_rt(RuntimeHelper::StorageStoreArray, vec![slot.clone(), value.expr])
                    }
                    TypeDescriptor::Array(elem, Some(len)) if elem.is_value_type() => self.call_rt(
                        RuntimeHelper::StorageStoreWords,
                        vec![slot.clone(), value.expr, num(u128::from(*len))],
                    ),
                    TypeDescriptor::Struct(name) => {
                        let helper = self.struct_store_helper(name)?;
                        call(&helper, vec![slot.clone(), value.expr])
                    }
                    other => {
                        return Err(Error::unsupported(format!(
                            "assigning `{}` to storage",
                            other.describe()
                        )))
                    }
                };
                self.emit_expr(stmt);
            }
        }
        Ok(())
    }

    /// Reset a place to its zero value (`delete x`)
    pub(super) fn clear(&mut self, place: &Place) -> Result<()> {
        let ty = place.ty();
        match place {
            Place::Storage { slot, transient, .. } if !ty.is_value_type() => {
                if *transient {
                    return Err(transient_reference(&ty));
                }
                match &ty {
                    TypeDescriptor::Array(elem, None) => {
                        let span = elem.storage_slots(&self.ctx.catalog)?;
                        let len = self.capture(Value::new(
                            call("sload", vec![slot.clone()]),
                            TypeDescriptor::UInt(256),
                        ));
                        let data = self.call_rt(RuntimeHelper::ArrayDataSlot, vec![slot.clone()]);
                        let count = if span == 1 {
                            len.expr
                        } else {
                            call("mul", vec![len.expr, num(u128::from(span))])
                        };
                        let zero = self.call_rt(RuntimeHelper::ZeroStorage, vec![data, count]);
                        self.emit_expr(zero);
                        self.emit_expr(call("sstore", vec![slot.clone(), num(0)]));
                    }
                    TypeDescriptor::String | TypeDescriptor::DynamicBytes => {
                        let len = call("sload", vec![slot.clone()]);
                        let words = call("div", vec![call("add", vec![len, num(31)]), num(32)]);
                        let data = self.call_rt(RuntimeHelper::ArrayDataSlot, vec![slot.clone()]);
                        let zero = self.call_rt(RuntimeHelper::ZeroStorage, vec![data, words]);
                        self.emit_expr(zero);
                        self.emit_expr(call("sstore", vec![slot.clone(), num(0)]));
                    }
                    TypeDescriptor::Struct(_) | TypeDescriptor::Array(_, Some(_)) => {
                        let span = ty.storage_slots(&self.ctx.catalog)?;
                        let zero = self.call_rt(
                            RuntimeHelper::ZeroStorage,
                            vec![slot.clone(), num(u128::from(span))],
                        );
                        self.emit_expr(zero);
                    }
                    other => {
                        return Err(Error::unsupported(format!("delete of `{}`", other.describe())))
                    }
                }
                Ok(())
            }
            _ => {
                let zero = if ty.is_value_type() {
                    num(0)
                } else {
                    num(EMPTY_MEMORY)
                };
                self.store(place, Value::new(zero, ty))
            }
        }
    }

    // =========================================================================
    // DYNAMIC STORAGE ARRAYS
    // =========================================================================

    /// `arr.push()` / `arr.push(v)` on a storage array
    pub(super) fn storage_push(&mut self, place: Place, args: &[ast::Expression]) -> Result<()> {
        let (slot, elem) = dynamic_storage_array(&place)?;
        if args.len() > 1 {
            return Err(Error::ArityMismatch {
                callee: "push".to_string(),
                expected: 1,
                got: args.len(),
            });
        }
        let value = match args.first() {
            Some(arg) => {
                let v = self.lower_expr_as(arg, &elem)?;
                Some(self.capture(v))
            }
            None => None,
        };
        let span = elem.storage_slots(&self.ctx.catalog)?;
        let grow = self.call_rt(
            RuntimeHelper::StorageArrayGrow,
            vec![slot, num(u128::from(span))],
        );
        match value {
            Some(value) => {
                let at = self.capture_fresh(Value::new(grow, TypeDescriptor::UInt(256)));
                self.store(&storage_place(at.expr, elem, false), value)
            }
            None => {
                self.emit(Statement::expr(call("pop", vec![grow])));
                Ok(())
            }
        }
    }

    /// `arr.pop()` on a storage array
    pub(super) fn storage_pop(&mut self, place: Place) -> Result<()> {
        let (slot, elem) = dynamic_storage_array(&place)?;
        let span = elem.storage_slots(&self.ctx.catalog)?;
        let pop = self.call_rt(RuntimeHelper::StorageArrayPop, vec![slot, num(u128::from(span))]);
        self.emit_expr(pop);
        Ok(())
    }

    // =========================================================================
    // STRUCT COPY HELPERS
    // =========================================================================

    /// `storage_load_struct_<S>(slot) -> memPtr`
    fn struct_load_helper(&mut self, name: &str) -> Result<String> {
        let helper = format!("storage_load_struct_{}", name);
        let key = HelperKey::StructLoad(name.to_string());
        if self.ctx.helpers.contains(&key) {
            return Ok(helper);
        }
        let layout = self
            .ctx
            .catalog
            .struct_layout(name)
            .cloned()
            .ok_or_else(|| Error::unresolved("struct", name))?;

        let alloc = self.rt(RuntimeHelper::AllocateMemory);
        let mut body = vec![Statement::assign(
            "memPtr",
            call(&alloc, vec![num(32 * layout.fields.len() as u128)]),
        )];
        for (i, field) in layout.fields.values().enumerate() {
            let at = offset_slot(ident("slot"), u128::from(field.offset_in_slots));
            let value = match &field.ty {
                t if t.is_value_type() => storage_read(at, 0, slot_size(t), t, false),
                TypeDescriptor::Struct(inner) => {
                    let inner = self.struct_load_helper(inner)?;
                    call(&inner, vec![at])
                }
                TypeDescriptor::String | TypeDescriptor::DynamicBytes => {
                    self.call_rt(RuntimeHelper::StorageLoadBytes, vec![at])
                }
                TypeDescriptor::Array(elem, None) if elem.is_value_type() => {
                    self.call_rt(RuntimeHelper::StorageLoadArray, vec![at])
                }
                TypeDescriptor::Array(elem, Some(len)) if elem.is_value_type() => {
                    self.call_rt(RuntimeHelper::StorageLoadWords, vec![at, num(u128::from(*len))])
                }
                TypeDescriptor::Mapping(..) => num(0),
                other => {
                    return Err(Error::unsupported(format!(
                        "copying struct member `{}` to memory",
                        other.describe()
                    )))
                }
            };
            body.push(Statement::expr(call(
                "mstore",
                vec![word_at(ident("memPtr"), i as u128), value],
            )));
        }

        self.ctx.helpers.insert(
            key,
            FunctionDef {
                name: helper.clone(),
                params: vec!["slot".into()],
                returns: vec!["memPtr".into()],
                body,
            },
        );
        Ok(helper)
    }

    /// `storage_store_struct_<S>(slot, memPtr)`
    fn struct_store_helper(&mut self, name: &str) -> Result<String> {
        let helper = format!("storage_store_struct_{}", name);
        let key = HelperKey::StructStore(name.to_string());
        if self.ctx.helpers.contains(&key) {
            return Ok(helper);
        }
        let layout = self
            .ctx
            .catalog
            .struct_layout(name)
            .cloned()
            .ok_or_else(|| Error::unresolved("struct", name))?;

        let mut body = Vec::with_capacity(layout.fields.len());
        for (i, field) in layout.fields.values().enumerate() {
            let at = offset_slot(ident("slot"), u128::from(field.offset_in_slots));
            let value = call("mload", vec![word_at(ident("memPtr"), i as u128)]);
            let stmt = match &field.ty {
                t if t.is_value_type() => storage_write(at, 0, slot_size(t), t, false, value),
                TypeDescriptor::Struct(inner) => {
                    let inner = self.struct_store_helper(inner)?;
                    Statement::expr(call(&inner, vec![at, value]))
                }
                TypeDescriptor::String | TypeDescriptor::DynamicBytes => Statement::expr(
                    self.call_rt(RuntimeHelper::StorageStoreBytes, vec![at, value]),
                ),
                TypeDescriptor::Array(elem, None) if elem.is_value_type() => Statement::expr(
                    self.call_rt(RuntimeHelper::StorageStoreArray, vec![at, value]),
                ),
                TypeDescriptor::Array(elem, Some(len)) if elem.is_value_type() => {
                    Statement::expr(self.call_rt(
                        RuntimeHelper::StorageStoreWords,
                        vec![at, value, num(u128::from(*len))],
                    ))
                }
                TypeDescriptor::Mapping(..) => continue,
                other => {
                    return Err(Error::unsupported(format!(
                        "copying struct member `{}` to storage",
                        other.describe()
                    )))
                }
            };
            body.push(stmt);
        }

        self.ctx.helpers.insert(
            key,
            FunctionDef {
                name: helper.clone(),
                params: vec!["slot".into(), "memPtr".into()],
                returns: Vec::new(),
                body,
            },
        );
        Ok(helper)
    }
}

/// Storage place of a whole slot (or region) holding `ty`
fn storage_place(slot: ir::Expression, ty: TypeDescriptor, transient: bool) -> Place {
    Place::Storage {
        slot,
        offset: 0,
        size: slot_size(&ty),
        ty,
        transient,
    }
}

/// Bytes a value of `ty` occupies when it owns its slot
fn slot_size(ty: &TypeDescriptor) -> u8 {
    if ty.is_value_type() {
        ty.byte_size().min(32) as u8
    } else {
        32
    }
}

fn dynamic_storage_array(place: &Place) -> Result<(ir::Expression, TypeDescriptor)> {
    match place {
        Place::Storage {
            slot,
            ty: TypeDescriptor::Array(elem, None),
            transient: false,
            ..
        } => Ok((slot.clone(), (**elem).clone())),
        other => Err(Error::UnknownMember {
            member: "push/pop".to_string(),
            on: other.ty().describe(),
        }),
    }
}

fn check_literal_index(label: &str, index: u128, len: u64) -> Result<()> {
    if index >= u128::from(len) {
        return Err(Error::IndexOutOfBounds {
            name: label.to_string(),
            index,
            size: len,
        });
    }
    Ok(())
}

fn transient_reference(ty: &TypeDescriptor) -> Error {
    Error::unsupported(format!("transient `{}` outside value types", ty.describe()))
}

/// `slot + offset`, folded when the slot is a literal
pub(super) fn offset_slot(slot: ir::Expression, offset: u128) -> ir::Expression {
    if offset == 0 {
        return slot;
    }
    match slot.as_u128().and_then(|s| s.checked_add(offset)) {
        Some(folded) => num(folded),
        None => call("add", vec![slot, num(offset)]),
    }
}

/// Address of word `index` of a memory struct
pub(super) fn word_at(ptr: ir::Expression, index: u128) -> ir::Expression {
    if index == 0 {
        ptr
    } else {
        call("add", vec![ptr, num(32 * index)])
    }
}

fn mask_literal(size: u8) -> ir::Expression {
    ir::Expression::num_text(format!("0x{}", "ff".repeat(usize::from(size))))
}

/// Read a value-type field of `size` bytes at `offset` in `slot`
pub(crate) fn storage_read(
    slot: ir::Expression,
    offset: u8,
    size: u8,
    ty: &TypeDescriptor,
    transient: bool,
) -> ir::Expression {
    let word = call(if transient { "tload" } else { "sload" }, vec![slot]);
    if size >= 32 {
        return word;
    }
    let shifted = if offset == 0 {
        word
    } else {
        call("shr", vec![num(8 * u128::from(offset)), word])
    };
    let raw = call("and", vec![shifted, mask_literal(size)]);
    match ty {
        TypeDescriptor::Int(_) => call("signextend", vec![num(u128::from(size) - 1), raw]),
        TypeDescriptor::FixedBytes(n) => call("shl", vec![num(256 - 8 * u128::from(*n)), raw]),
        _ => raw,
    }
}

/// Write a value-type field; packed fields are read-modify-write
pub(crate) fn storage_write(
    slot: ir::Expression,
    offset: u8,
    size: u8,
    ty: &TypeDescriptor,
    transient: bool,
    value: ir::Expression,
) -> Statement {
    let (load, store) = if transient {
        ("tload", "tstore")
    } else {
        ("sload", "sstore")
    };
    if size >= 32 {
        return Statement::expr(call(store, vec![slot, value]));
    }
    let value = match ty {
        TypeDescriptor::FixedBytes(n) => call("shr", vec![num(256 - 8 * u128::from(*n)), value]),
        _ => value,
    };
    let shift = |e: ir::Expression| {
        if offset == 0 {
            e
        } else {
            call("shl", vec![num(8 * u128::from(offset)), e])
        }
    };
    let cleared = call(
        "and",
        vec![
            call(load, vec![slot.clone()]),
            call("not", vec![shift(mask_literal(size))]),
        ],
    );
    let inserted = shift(call("and", vec![value, mask_literal(size)]));
    Statement::expr(call(store, vec![slot, call("or", vec![cleared, inserted])]))
}

fn describe(expr: &ast::Expression) -> String {
    match expr {
        ast::Expression::Identifier(name) => name.clone(),
        ast::Expression::Member { property, .. } => property.clone(),
        ast::Expression::Index { object, .. } => describe(object),
        _ => "value".to_string(),
    }
}
