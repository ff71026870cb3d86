//! Property-based tests for storage allocation and output determinism
//!
//! These tests use proptest to generate random field lists and verify that:
//! 1. No two allocated fields overlap
//! 2. Packed scalars stay inside their slot
//! 3. Compiling the same class twice yields byte-identical IR

use proptest::prelude::*;
use tsyul::ast::{ClassDecl, FieldDecl, SourceUnit, StorageClass};
use tsyul::compiler::storage::SlotKind;
use tsyul::Compiler;

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

/// Field type texts covering every slot kind
fn field_type() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("address"),
        Just("bool"),
        Just("u8"),
        Just("u16"),
        Just("u32"),
        Just("u64"),
        Just("u128"),
        Just("u256"),
        Just("i64"),
        Just("bytes4"),
        Just("bytes32"),
        Just("string"),
        Just("bytes"),
        Just("u256[]"),
        Just("u64[3]"),
        Just("Mapping<address, u256>"),
    ]
}

/// Field type plus optional pin and transient flag
fn field_spec() -> impl Strategy<Value = (&'static str, Option<u128>, bool)> {
    (
        field_type(),
        prop::option::weighted(0.15, 0u128..64),
        prop::bool::weighted(0.15),
    )
}

fn build_class(specs: &[(&'static str, Option<u128>, bool)]) -> SourceUnit {
    let mut class = ClassDecl::new("Fuzz");
    let mut pins = std::collections::BTreeSet::new();
    for (i, (ty, pin, transient)) in specs.iter().enumerate() {
        let mut field = FieldDecl::new(&format!("f{}", i), ty);
        if let Some(slot) = pin.filter(|_| *ty != "u64[3]") {
            if pins.insert(slot) {
                field = field.pinned(slot);
            }
        }
        if *transient && matches!(*ty, "u8" | "u64" | "u256" | "address" | "bool") {
            field = field.storage(StorageClass::Transient);
        }
        class = class.field(field);
    }
    SourceUnit::new("fuzz.ts").with_class(class)
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_slots_are_disjoint(specs in prop::collection::vec(field_spec(), 1..24)) {
        let unit = build_class(&specs);
        let result = Compiler::default().compile(&unit, &[], "Fuzz").unwrap();
        let slots: Vec<_> = result.layout.iter().map(|(_, s)| s.clone()).collect();
        prop_assert_eq!(slots.len(), specs.len());
        for (i, a) in slots.iter().enumerate() {
            for b in &slots[i + 1..] {
                prop_assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn prop_packed_fields_fit_their_slot(specs in prop::collection::vec(field_spec(), 1..24)) {
        let unit = build_class(&specs);
        let result = Compiler::default().compile(&unit, &[], "Fuzz").unwrap();
        for (name, slot) in result.layout.iter() {
            prop_assert!(u16::from(slot.byte_offset) + u16::from(slot.byte_size) <= 32, "{}", name);
            if slot.kind != SlotKind::Scalar {
                prop_assert_eq!(slot.byte_offset, 0);
            }
        }
    }

    #[test]
    fn prop_compilation_is_deterministic(specs in prop::collection::vec(field_spec(), 1..16)) {
        let unit = build_class(&specs);
        let compiler = Compiler::default();
        let first = compiler.compile(&unit, &[], "Fuzz").unwrap();
        let second = compiler.compile(&unit, &[], "Fuzz").unwrap();
        prop_assert_eq!(&first.fingerprint, &second.fingerprint);
        prop_assert_eq!(first.module, second.module);
    }
}
