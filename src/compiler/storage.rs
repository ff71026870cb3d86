//! # Storage Layout Allocator
//!
//! Assigns every persistent and transient field of a linearized chain a slot
//! and, for sub-word scalars, a byte offset inside that slot.
//!
//! ## Algorithm
//!
//! 1. **Validation.** Collect pinned slots across the chain (duplicates and
//!    pins inside the immutable range are fatal) and reject field names
//!    declared by two chain entries.
//! 2. **Assignment.** Walk fields base to derived with a `(slot, byte)`
//!    cursor. Packable scalars go first-fit into the current slot; anything
//!    else flushes the partial slot and takes the next free region. Pinned
//!    fields use their literal slot and never move the cursor, but meeting
//!    one mid-slot flushes the partial slot. Auto-assigned regions skip every
//!    pinned slot.
//!
//! Offset 0 is the least-significant byte of the slot word. Immutables live
//! at `IMMUTABLE_SLOT_BASE + n`; constants occupy no slot.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::catalog::Catalog;
use super::inheritance::InheritanceChain;
use super::types::TypeDescriptor;
use crate::ast::StorageClass;
use crate::{Error, Result};

/// First slot of the range reserved for immutables; pins must stay below it
pub const IMMUTABLE_SLOT_BASE: u128 = 1 << 64;

/// What a slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotKind {
    /// Value type, possibly packed
    Scalar,
    /// Mapping root (the slot itself stays empty)
    Mapping,
    /// Dynamic array: length at the slot, elements at keccak(slot)
    Array,
    /// Struct spanning consecutive slots
    Struct,
    /// Fixed array spanning consecutive slots
    FixedArray,
    /// Dynamic bytes: length at the slot, data at keccak(slot)
    DynamicBytes,
    /// String: length at the slot, data at keccak(slot)
    DynamicString,
    /// External function reference (address + selector)
    ExternalFunctionRef,
}

impl SlotKind {
    fn of(ty: &TypeDescriptor) -> Self {
        match ty {
            TypeDescriptor::Mapping(..) => SlotKind::Mapping,
            TypeDescriptor::Array(_, None) => SlotKind::Array,
            TypeDescriptor::Array(_, Some(_)) => SlotKind::FixedArray,
            TypeDescriptor::Struct(_) | TypeDescriptor::Tuple(_) => SlotKind::Struct,
            TypeDescriptor::DynamicBytes => SlotKind::DynamicBytes,
            TypeDescriptor::String => SlotKind::DynamicString,
            TypeDescriptor::FunctionRef => SlotKind::ExternalFunctionRef,
            _ => SlotKind::Scalar,
        }
    }
}

/// Physical location of one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSlot {
    /// Slot number
    pub slot: u128,
    /// Byte offset from the least-significant end (0..=31)
    pub byte_offset: u8,
    /// Width in bytes (1..=32)
    pub byte_size: u8,
    /// Number of consecutive slots occupied
    pub span: u64,
    /// Kind of content
    pub kind: SlotKind,
    /// Lives in transient storage
    pub transient: bool,
    /// Set once in the constructor
    pub immutable: bool,
    /// Declaring class
    pub owner: String,
    /// Declared type text
    pub type_text: String,
    /// Resolved type
    #[serde(skip)]
    pub ty: TypeDescriptor,
}

impl StorageSlot {
    /// True when the field shares its slot with neighbours
    pub fn is_packed(&self) -> bool {
        self.kind == SlotKind::Scalar && self.byte_size < 32
    }

    /// Half-open range of slots covered
    fn slot_range(&self) -> (u128, u128) {
        (self.slot, self.slot + u128::from(self.span))
    }

    /// True if the two locations share any byte
    pub fn overlaps(&self, other: &StorageSlot) -> bool {
        if self.transient != other.transient {
            return false;
        }
        let (a0, a1) = self.slot_range();
        let (b0, b1) = other.slot_range();
        if a1 <= b0 || b1 <= a0 {
            return false;
        }
        if self.span == 1 && other.span == 1 && self.slot == other.slot {
            let (x0, x1) = (self.byte_offset, self.byte_offset + self.byte_size);
            let (y0, y1) = (other.byte_offset, other.byte_offset + other.byte_size);
            return x0 < y1 && y0 < x1;
        }
        true
    }
}

/// Field name → storage location for one compiled class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageLayout {
    slots: IndexMap<String, StorageSlot>,
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    slot: u128,
    offset: u32,
}

struct Pins {
    ranges: BTreeMap<u128, (u128, String)>,
}

impl Pins {
    fn is_pinned(&self, slot: u128) -> bool {
        self.ranges
            .range(..=slot)
            .next_back()
            .map_or(false, |(_, (end, _))| slot < *end)
    }

    /// First slot at or after `from` such that `[s, s + len)` avoids every pin
    fn free_region(&self, from: u128, len: u64) -> u128 {
        let mut start = from;
        'search: loop {
            for s in start..start + u128::from(len.max(1)) {
                if self.is_pinned(s) {
                    let end = self
                        .ranges
                        .range(..=s)
                        .next_back()
                        .map_or(s + 1, |(_, (end, _))| *end);
                    start = end;
                    continue 'search;
                }
            }
            return start;
        }
    }
}

impl StorageLayout {
    /// Allocate slots for every stateful field of `chain`
    pub fn allocate(
        chain: &InheritanceChain<'_>,
        catalog: &Catalog<'_>,
        transient_supported: bool,
    ) -> Result<Self> {
        // Pass 1: validation
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        let mut pins = Pins {
            ranges: BTreeMap::new(),
        };
        let mut resolved = Vec::new();
        for class in chain.classes() {
            for field in &class.fields {
                if field.storage == StorageClass::Constant {
                    continue;
                }
                if let Some(first) = owners.insert(&field.name, &class.name) {
                    return Err(Error::DuplicateStorageField {
                        name: field.name.clone(),
                        first: first.to_string(),
                        second: class.name.clone(),
                    });
                }
                if field.storage == StorageClass::Transient && !transient_supported {
                    return Err(Error::TransientUnsupported(field.name.clone()));
                }
                let ty = catalog.resolve_type(&field.ty)?;
                let span = ty.storage_slots(catalog)?;
                if let Some(pin) = field.slot {
                    if field.storage == StorageClass::Immutable {
                        warn!(field = %field.name, "Slot pin on an immutable field is ignored");
                    } else {
                        if pin >= IMMUTABLE_SLOT_BASE {
                            return Err(Error::ReservedSlotPin {
                                slot: pin,
                                field: field.name.clone(),
                            });
                        }
                        let end = pin + u128::from(span);
                        if let Some((&other_start, (_, other))) = pins
                            .ranges
                            .iter()
                            .find(|&(&s, &(e, _))| pin < e && s < end)
                        {
                            return Err(Error::DuplicateSlotPin {
                                slot: other_start.max(pin),
                                first: other.clone(),
                                second: field.name.clone(),
                            });
                        }
                        pins.ranges.insert(pin, (end, field.name.clone()));
                    }
                }
                resolved.push((class.name.as_str(), field, ty, span));
            }
        }

        // Pass 2: assignment
        let mut layout = StorageLayout::default();
        let mut cursor = Cursor { slot: 0, offset: 0 };
        let mut next_immutable = IMMUTABLE_SLOT_BASE;

        for (owner, field, ty, span) in resolved {
            let kind = SlotKind::of(&ty);
            let byte_size = if kind == SlotKind::Scalar {
                ty.byte_size().min(32)
            } else {
                32
            };
            let place = |slot: u128, offset: u32| StorageSlot {
                slot,
                byte_offset: offset as u8,
                byte_size: byte_size as u8,
                span,
                kind,
                transient: field.storage == StorageClass::Transient,
                immutable: field.storage == StorageClass::Immutable,
                owner: owner.to_string(),
                type_text: field.ty.clone(),
                ty: ty.clone(),
            };

            let location = if field.storage == StorageClass::Immutable {
                let slot = next_immutable;
                next_immutable += u128::from(span);
                place(slot, 0)
            } else if let Some(pin) = field.slot {
                if cursor.offset > 0 {
                    warn!(
                        field = %field.name,
                        wasted_bytes = 32 - cursor.offset,
                        slot = %cursor.slot,
                        "Pinned field flushes a partially packed slot"
                    );
                    cursor = Cursor {
                        slot: cursor.slot + 1,
                        offset: 0,
                    };
                }
                place(pin, 0)
            } else if kind == SlotKind::Scalar && ty.can_pack() {
                if cursor.offset + byte_size > 32 {
                    cursor = Cursor {
                        slot: cursor.slot + 1,
                        offset: 0,
                    };
                }
                if cursor.offset == 0 {
                    cursor.slot = pins.free_region(cursor.slot, 1);
                }
                let loc = place(cursor.slot, cursor.offset);
                cursor.offset += byte_size;
                loc
            } else {
                if cursor.offset > 0 {
                    cursor = Cursor {
                        slot: cursor.slot + 1,
                        offset: 0,
                    };
                }
                let start = pins.free_region(cursor.slot, span);
                cursor = Cursor {
                    slot: start + u128::from(span),
                    offset: 0,
                };
                place(start, 0)
            };
            layout.slots.insert(field.name.clone(), location);
        }

        debug!(
            class = %chain.most_derived().name,
            fields = layout.slots.len(),
            next_free_slot = %cursor.slot,
            "Storage layout computed"
        );
        Ok(layout)
    }

    /// Location of a field
    pub fn get(&self, name: &str) -> Option<&StorageSlot> {
        self.slots.get(name)
    }

    /// Locations in allocation order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &StorageSlot)> {
        self.slots.iter()
    }

    /// Number of allocated fields
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True for a class without stateful fields
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ClassDecl, FieldDecl, InterfaceDecl, SourceUnit};

    fn layout_of(unit: &SourceUnit, class: &str) -> Result<StorageLayout> {
        let catalog = Catalog::build(unit, &[])?;
        let chain = InheritanceChain::linearize(catalog.class(class).unwrap(), &catalog)?;
        StorageLayout::allocate(&chain, &catalog, true)
    }

    #[test]
    fn test_packing_20_8_4() {
        let unit = SourceUnit::new("a.ts").with_class(
            ClassDecl::new("Packed")
                .field(FieldDecl::new("owner", "address"))
                .field(FieldDecl::new("stamp", "u64"))
                .field(FieldDecl::new("nonce", "u32"))
                .field(FieldDecl::new("supply", "u256")),
        );
        let layout = layout_of(&unit, "Packed").unwrap();
        let at = |n: &str| {
            let s = layout.get(n).unwrap();
            (s.slot, s.byte_offset)
        };
        assert_eq!(at("owner"), (0, 0));
        assert_eq!(at("stamp"), (0, 20));
        assert_eq!(at("nonce"), (0, 28));
        assert_eq!(at("supply"), (1, 0));
    }

    #[test]
    fn test_overflowing_scalar_moves_to_next_slot() {
        let unit = SourceUnit::new("a.ts").with_class(
            ClassDecl::new("C")
                .field(FieldDecl::new("a", "address"))
                .field(FieldDecl::new("b", "u128"))
                .field(FieldDecl::new("c", "bool")),
        );
        let layout = layout_of(&unit, "C").unwrap();
        assert_eq!(layout.get("b").unwrap().slot, 1);
        assert_eq!(layout.get("c").unwrap().slot, 1);
        assert_eq!(layout.get("c").unwrap().byte_offset, 16);
    }

    #[test]
    fn test_pins_are_skipped_and_flush() {
        let unit = SourceUnit::new("a.ts").with_class(
            ClassDecl::new("C")
                .field(FieldDecl::new("flag", "bool"))
                .field(FieldDecl::new("admin", "address").pinned(1))
                .field(FieldDecl::new("other", "bool"))
                .field(FieldDecl::new("total", "u256")),
        );
        let layout = layout_of(&unit, "C").unwrap();
        assert_eq!(layout.get("flag").unwrap().slot, 0);
        assert_eq!(layout.get("admin").unwrap().slot, 1);
        // cursor flushed past slot 0, slot 1 is pinned
        assert_eq!(layout.get("other").unwrap().slot, 2);
        assert_eq!(layout.get("total").unwrap().slot, 3);
    }

    #[test]
    fn test_regions_avoid_pins() {
        let unit = SourceUnit::new("a.ts")
            .with_interface(
                InterfaceDecl::new("Pair")
                    .field("a", "u256")
                    .field("b", "u256"),
            )
            .with_class(
                ClassDecl::new("C")
                    .field(FieldDecl::new("x", "u256"))
                    .field(FieldDecl::new("reserved", "u256").pinned(2))
                    .field(FieldDecl::new("pair", "Pair"))
                    .field(FieldDecl::new("list", "u8[3]")),
            );
        let layout = layout_of(&unit, "C").unwrap();
        assert_eq!(layout.get("x").unwrap().slot, 0);
        let pair = layout.get("pair").unwrap();
        assert_eq!((pair.slot, pair.span, pair.kind), (3, 2, SlotKind::Struct));
        let list = layout.get("list").unwrap();
        assert_eq!((list.slot, list.span, list.kind), (5, 3, SlotKind::FixedArray));
    }

    #[test]
    fn test_duplicate_pin_and_field() {
        let unit = SourceUnit::new("a.ts").with_class(
            ClassDecl::new("C")
                .field(FieldDecl::new("a", "u256").pinned(4))
                .field(FieldDecl::new("b", "u256").pinned(4)),
        );
        assert!(matches!(
            layout_of(&unit, "C"),
            Err(Error::DuplicateSlotPin { slot: 4, .. })
        ));

        let unit = SourceUnit::new("a.ts")
            .with_class(ClassDecl::new("A").field(FieldDecl::new("owner", "address")))
            .with_class(ClassDecl::new("B").field(FieldDecl::new("owner", "address")))
            .with_class(ClassDecl::new("C").compose(&["A", "B"]));
        assert!(matches!(
            layout_of(&unit, "C"),
            Err(Error::DuplicateStorageField { .. })
        ));

        let unit = SourceUnit::new("a.ts").with_class(
            ClassDecl::new("C").field(FieldDecl::new("a", "u256").pinned(IMMUTABLE_SLOT_BASE)),
        );
        assert!(matches!(layout_of(&unit, "C"), Err(Error::ReservedSlotPin { .. })));
    }

    #[test]
    fn test_immutables_constants_and_transients() {
        let unit = SourceUnit::new("a.ts").with_class(
            ClassDecl::new("C")
                .field(FieldDecl::new("MAX", "u256").storage(StorageClass::Constant))
                .field(FieldDecl::new("deployer", "address").storage(StorageClass::Immutable))
                .field(FieldDecl::new("lock", "bool").storage(StorageClass::Transient))
                .field(FieldDecl::new("count", "u8")),
        );
        let layout = layout_of(&unit, "C").unwrap();
        assert!(layout.get("MAX").is_none());
        assert_eq!(layout.get("deployer").unwrap().slot, IMMUTABLE_SLOT_BASE);
        let lock = layout.get("lock").unwrap();
        assert!(lock.transient);
        assert_eq!((lock.slot, lock.byte_offset), (0, 0));
        assert_eq!(layout.get("count").unwrap().byte_offset, 1);
    }

    #[test]
    fn test_transient_requires_support() {
        let unit = SourceUnit::new("a.ts").with_class(
            ClassDecl::new("C").field(FieldDecl::new("lock", "bool").storage(StorageClass::Transient)),
        );
        let catalog = Catalog::build(&unit, &[]).unwrap();
        let chain = InheritanceChain::linearize(catalog.class("C").unwrap(), &catalog).unwrap();
        assert!(matches!(
            StorageLayout::allocate(&chain, &catalog, false),
            Err(Error::TransientUnsupported(_))
        ));
    }

    #[test]
    fn test_empty_class() {
        let unit = SourceUnit::new("a.ts").with_class(ClassDecl::new("Empty"));
        assert!(layout_of(&unit, "Empty").unwrap().is_empty());
    }
}
