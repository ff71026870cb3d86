//! # Dynamic Helper Generator
//!
//! Every IR helper a compilation needs is synthesized once and shared by all
//! call sites. Fixed runtime helpers are keyed by their [`RuntimeHelper`];
//! arity-specialized helpers are keyed by `(kind, arity)` only. Per-argument
//! shapes (static word, bytes, word array) and packed widths travel as a
//! literal runtime argument, so two calls with the same arity share one
//! helper regardless of their argument types.
//!
//! ## Helper Signatures
//!
//! | Kind | Signature |
//! |------|-----------|
//! | `AbiEncode` | `__abi_encode_N(dst, shapes, a0..) -> end` |
//! | `AbiEncodePacked` | `__abi_encode_packed_N(dst, widths, a0..) -> end` |
//! | `AbiEncodeSelector` | `__abi_encode_selector_N(dst, sel, shapes, a0..) -> end` |
//! | `AbiDecode` | `__abi_decode_N(data, shapes) -> v0..` |
//! | `Call` | `__call_N(target, value, sel, shapes, a0..) -> success, ret` |
//! | `StaticCall` | `__staticcall_N(target, sel, shapes, a0..) -> success, ret` |
//! | `DelegateCall` | `__delegatecall_N(target, sel, shapes, a0..) -> success, ret` |
//! | `Create` | `__create_N(codeOffset, codeSize, value, shapes, a0..) -> addr` |
//! | `Create2` | `__create2_N(codeOffset, codeSize, value, salt, shapes, a0..) -> addr` |
//!
//! Shapes use two bits per argument: `0` static word, `1` bytes/string,
//! `2` array of words. Packed widths use one byte per argument: `0` for
//! dynamic bytes, otherwise the byte width of a right-aligned value.

use std::collections::BTreeMap;
use tracing::trace;

use crate::compiler::ir::{call, ident, num, Expression, FunctionDef, Literal, Statement, SwitchCase};
use crate::compiler::runtime::RuntimeHelper;
use crate::compiler::types::TypeDescriptor;
use crate::compiler::EvmVersion;
use crate::{Error, Result};

/// Arity-specialized helper family
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DynamicHelper {
    /// Standard ABI encoding
    AbiEncode,
    /// Tightly packed encoding
    AbiEncodePacked,
    /// Selector followed by standard encoding
    AbiEncodeSelector,
    /// Standard ABI decoding from a memory blob
    AbiDecode,
    /// Value-carrying external call
    Call,
    /// Read-only external call
    StaticCall,
    /// Call in the caller's storage context
    DelegateCall,
    /// Contract creation
    Create,
    /// Salted contract creation
    Create2,
}

impl DynamicHelper {
    /// IR name of the helper for `arity` arguments
    pub fn name(&self, arity: usize) -> String {
        let stem = match self {
            DynamicHelper::AbiEncode => "abi_encode",
            DynamicHelper::AbiEncodePacked => "abi_encode_packed",
            DynamicHelper::AbiEncodeSelector => "abi_encode_selector",
            DynamicHelper::AbiDecode => "abi_decode",
            DynamicHelper::Call => "call",
            DynamicHelper::StaticCall => "staticcall",
            DynamicHelper::DelegateCall => "delegatecall",
            DynamicHelper::Create => "create",
            DynamicHelper::Create2 => "create2",
        };
        format!("__{}_{}", stem, arity)
    }
}

/// Memo key of a synthesized helper
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HelperKey {
    /// Fixed runtime helper
    Runtime(RuntimeHelper),
    /// Arity-specialized helper
    Dynamic(DynamicHelper, usize),
    /// Storage → memory copy of a struct
    StructLoad(String),
    /// Memory → storage copy of a struct
    StructStore(String),
}

/// Helpers synthesized so far in one compilation
#[derive(Debug, Clone)]
pub struct HelperRegistry {
    evm: EvmVersion,
    defs: BTreeMap<HelperKey, FunctionDef>,
}

impl HelperRegistry {
    /// Empty registry for a target
    pub fn new(evm: EvmVersion) -> Self {
        Self {
            evm,
            defs: BTreeMap::new(),
        }
    }

    /// True once `key` has been synthesized
    pub fn contains(&self, key: &HelperKey) -> bool {
        self.defs.contains_key(key)
    }

    /// Register a helper built by the caller
    pub fn insert(&mut self, key: HelperKey, def: FunctionDef) {
        trace!(helper = %def.name, "Helper synthesized");
        self.defs.insert(key, def);
    }

    /// Ensure a fixed runtime helper (and its dependencies) exists
    pub fn runtime(&mut self, helper: RuntimeHelper) -> String {
        let key = HelperKey::Runtime(helper);
        if !self.defs.contains_key(&key) {
            for dep in helper.dependencies() {
                self.runtime(dep);
            }
            let def = helper.build(self.evm);
            self.insert(key, def);
        }
        helper.name()
    }

    /// Ensure the `(kind, arity)` helper exists
    pub fn dynamic(&mut self, kind: DynamicHelper, arity: usize) -> String {
        let key = HelperKey::Dynamic(kind, arity);
        if !self.defs.contains_key(&key) {
            let def = self.build_dynamic(kind, arity);
            self.insert(key, def);
        }
        kind.name(arity)
    }

    /// Number of synthesized helpers
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// True when nothing has been synthesized
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Definitions in key order
    pub fn definitions(&self) -> Vec<FunctionDef> {
        self.defs.values().cloned().collect()
    }

    /// Names in key order
    pub fn names(&self) -> Vec<String> {
        self.defs.values().map(|d| d.name.clone()).collect()
    }

    fn build_dynamic(&mut self, kind: DynamicHelper, arity: usize) -> FunctionDef {
        let name = kind.name(arity);
        let args: Vec<String> = (0..arity).map(|i| format!("a{}", i)).collect();
        match kind {
            DynamicHelper::AbiEncode => self.abi_encode(name, args),
            DynamicHelper::AbiEncodePacked => self.abi_encode_packed(name, args),
            DynamicHelper::AbiEncodeSelector => {
                let encode = self.dynamic(DynamicHelper::AbiEncode, arity);
                let mut inner = vec![call("add", vec![ident("dst"), num(4)]), ident("shapes")];
                inner.extend(args.iter().map(|a| ident(a)));
                FunctionDef {
                    name,
                    params: with_prefix(&["dst", "sel", "shapes"], &args),
                    returns: vec!["end".into()],
                    body: vec![
                        Statement::expr(call(
                            "mstore",
                            vec![ident("dst"), call("shl", vec![num(224), ident("sel")])],
                        )),
                        Statement::assign("end", call(&encode, inner)),
                    ],
                }
            }
            DynamicHelper::AbiDecode => self.abi_decode(name, arity),
            DynamicHelper::Call | DynamicHelper::StaticCall | DynamicHelper::DelegateCall => {
                self.external_call(kind, name, args)
            }
            DynamicHelper::Create | DynamicHelper::Create2 => self.create(kind, name, args),
        }
    }

    fn abi_encode(&mut self, name: String, args: Vec<String>) -> FunctionDef {
        let item = self.runtime(RuntimeHelper::AbiEncodeItem);
        let mut body = vec![
            Statement::let_("base", ident("dst")),
            Statement::let_(
                "tail",
                call("add", vec![ident("dst"), num(32 * args.len() as u128)]),
            ),
        ];
        for (i, a) in args.iter().enumerate() {
            body.push(Statement::assign(
                "tail",
                call(
                    &item,
                    vec![
                        call("add", vec![ident("dst"), num(32 * i as u128)]),
                        ident("base"),
                        ident("tail"),
                        call("and", vec![shifted("shapes", 2 * i as u128), num(3)]),
                        ident(a),
                    ],
                ),
            ));
        }
        body.push(Statement::assign("end", ident("tail")));
        FunctionDef {
            name,
            params: with_prefix(&["dst", "shapes"], &args),
            returns: vec!["end".into()],
            body,
        }
    }

    fn abi_encode_packed(&mut self, name: String, args: Vec<String>) -> FunctionDef {
        let copy = self.runtime(RuntimeHelper::CopyMemory);
        let mut body = vec![Statement::let_("pos", ident("dst"))];
        for (i, a) in args.iter().enumerate() {
            let width = format!("w{}", i);
            let length = format!("l{}", i);
            body.push(Statement::Block(vec![
                Statement::let_(
                    width.clone(),
                    call("and", vec![shifted("widths", 8 * i as u128), num(0xff)]),
                ),
                Statement::Switch {
                    expr: ident(&width),
                    cases: vec![SwitchCase {
                        value: Literal::Number("0".into()),
                        body: vec![
                            Statement::let_(length.clone(), call("mload", vec![ident(a)])),
                            Statement::expr(call(
                                &copy,
                                vec![
                                    call("add", vec![ident(a), num(32)]),
                                    ident("pos"),
                                    ident(&length),
                                ],
                            )),
                            Statement::assign("pos", call("add", vec![ident("pos"), ident(&length)])),
                        ],
                    }],
                    default: Some(vec![
                        Statement::expr(call(
                            "mstore",
                            vec![
                                ident("pos"),
                                call(
                                    "shl",
                                    vec![
                                        call("sub", vec![num(256), call("mul", vec![num(8), ident(&width)])]),
                                        ident(a),
                                    ],
                                ),
                            ],
                        )),
                        Statement::assign("pos", call("add", vec![ident("pos"), ident(&width)])),
                    ]),
                },
            ]));
        }
        body.push(Statement::assign("end", ident("pos")));
        FunctionDef {
            name,
            params: with_prefix(&["dst", "widths"], &args),
            returns: vec!["end".into()],
            body,
        }
    }

    fn abi_decode(&mut self, name: String, arity: usize) -> FunctionDef {
        let outs: Vec<String> = (0..arity).map(|i| format!("v{}", i)).collect();
        let mut body = vec![
            Statement::if_(
                call("lt", vec![call("mload", vec![ident("data")]), num(32 * arity as u128)]),
                vec![Statement::expr(call("revert", vec![num(0), num(0)]))],
            ),
            Statement::let_("payload", call("add", vec![ident("data"), num(32)])),
        ];
        for (i, v) in outs.iter().enumerate() {
            let head = call("mload", vec![call("add", vec![ident("payload"), num(32 * i as u128)])]);
            body.push(Statement::Switch {
                expr: call("and", vec![shifted("shapes", 2 * i as u128), num(3)]),
                cases: vec![SwitchCase {
                    value: Literal::Number("0".into()),
                    body: vec![Statement::assign(v.clone(), head.clone())],
                }],
                default: Some(vec![Statement::assign(
                    v.clone(),
                    call("add", vec![ident("payload"), head]),
                )]),
            });
        }
        FunctionDef {
            name,
            params: vec!["data".into(), "shapes".into()],
            returns: outs,
            body,
        }
    }

    fn external_call(&mut self, kind: DynamicHelper, name: String, args: Vec<String>) -> FunctionDef {
        let encode = self.dynamic(DynamicHelper::AbiEncodeSelector, args.len());
        let returndata = self.runtime(RuntimeHelper::ReturndataToMemory);
        let mut encode_args = vec![ident("pos"), ident("sel"), ident("shapes")];
        encode_args.extend(args.iter().map(|a| ident(a)));

        let (prefix, opcode): (&[&str], &str) = match kind {
            DynamicHelper::Call => (&["target", "value", "sel", "shapes"], "call"),
            DynamicHelper::StaticCall => (&["target", "sel", "shapes"], "staticcall"),
            _ => (&["target", "sel", "shapes"], "delegatecall"),
        };
        let mut call_args = vec![call("gas", vec![]), ident("target")];
        if kind == DynamicHelper::Call {
            call_args.push(ident("value"));
        }
        call_args.extend([
            ident("pos"),
            call("sub", vec![ident("end"), ident("pos")]),
            num(0),
            num(0),
        ]);

        FunctionDef {
            name,
            params: with_prefix(prefix, &args),
            returns: vec!["success".into(), "ret".into()],
            body: vec![
                Statement::let_("pos", call("mload", vec![num(64)])),
                Statement::let_("end", call(&encode, encode_args)),
                Statement::assign("success", call(opcode, call_args)),
                Statement::assign("ret", call(&returndata, vec![])),
            ],
        }
    }

    fn create(&mut self, kind: DynamicHelper, name: String, args: Vec<String>) -> FunctionDef {
        let encode = self.dynamic(DynamicHelper::AbiEncode, args.len());
        let mut encode_args = vec![
            call("add", vec![ident("pos"), ident("codeSize")]),
            ident("shapes"),
        ];
        encode_args.extend(args.iter().map(|a| ident(a)));

        let salted = kind == DynamicHelper::Create2;
        let prefix: &[&str] = if salted {
            &["codeOffset", "codeSize", "value", "salt", "shapes"]
        } else {
            &["codeOffset", "codeSize", "value", "shapes"]
        };
        let mut create_args = vec![
            ident("value"),
            ident("pos"),
            call("sub", vec![ident("end"), ident("pos")]),
        ];
        if salted {
            create_args.push(ident("salt"));
        }

        FunctionDef {
            name,
            params: with_prefix(prefix, &args),
            returns: vec!["addr".into()],
            body: vec![
                Statement::let_("pos", call("mload", vec![num(64)])),
                Statement::expr(call(
                    "datacopy",
                    vec![ident("pos"), ident("codeOffset"), ident("codeSize")],
                )),
                Statement::let_("end", call(&encode, encode_args)),
                Statement::assign(
                    "addr",
                    call(if salted { "create2" } else { "create" }, create_args),
                ),
            ],
        }
    }
}

fn with_prefix(prefix: &[&str], args: &[String]) -> Vec<String> {
    prefix
        .iter()
        .map(|p| p.to_string())
        .chain(args.iter().cloned())
        .collect()
}

fn shifted(var: &str, bits: u128) -> Expression {
    if bits == 0 {
        ident(var)
    } else {
        call("shr", vec![num(bits), ident(var)])
    }
}

/// ABI shape code of one argument
pub fn abi_shape(ty: &TypeDescriptor) -> Result<u8> {
    match ty {
        t if t.is_value_type() => Ok(0),
        TypeDescriptor::DynamicBytes | TypeDescriptor::String => Ok(1),
        TypeDescriptor::Array(elem, None) if elem.is_value_type() => Ok(2),
        other => Err(Error::unsupported(format!(
            "`{}` in ABI encoding",
            other.describe()
        ))),
    }
}

/// Packed width of one argument (`0` for dynamic bytes)
pub fn packed_width(ty: &TypeDescriptor) -> Result<u8> {
    match ty {
        TypeDescriptor::DynamicBytes | TypeDescriptor::String => Ok(0),
        t if t.is_value_type() && *t != TypeDescriptor::FunctionRef => Ok(t.byte_size() as u8),
        other => Err(Error::unsupported(format!(
            "`{}` in packed encoding",
            other.describe()
        ))),
    }
}

/// Pack per-argument codes of `bits` width into one literal word
pub fn shape_literal(codes: &[u8], bits: usize) -> Result<Expression> {
    if codes.len() * bits > 256 {
        return Err(Error::unsupported(format!(
            "{} arguments in one encoding",
            codes.len()
        )));
    }
    let mut word = [0u8; 32];
    for (i, code) in codes.iter().enumerate() {
        let bit = i * bits;
        for b in 0..bits {
            if (u32::from(*code) >> b) & 1 == 1 {
                let pos = bit + b;
                word[31 - pos / 8] |= 1 << (pos % 8);
            }
        }
    }
    let text = hex::encode(word);
    let trimmed = text.trim_start_matches('0');
    Ok(if trimmed.is_empty() {
        num(0)
    } else {
        Expression::num_text(format!("0x{}", trimmed))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers_are_memoized_by_arity() {
        let mut registry = HelperRegistry::new(EvmVersion::Cancun);
        let a = registry.dynamic(DynamicHelper::AbiEncode, 3);
        let before = registry.len();
        let b = registry.dynamic(DynamicHelper::AbiEncode, 3);
        assert_eq!(a, b);
        assert_eq!(registry.len(), before);

        let c = registry.dynamic(DynamicHelper::AbiEncode, 2);
        assert_eq!(c, "__abi_encode_2");
        assert_eq!(registry.len(), before + 1);
    }

    #[test]
    fn test_call_helper_pulls_dependencies() {
        let mut registry = HelperRegistry::new(EvmVersion::Cancun);
        registry.dynamic(DynamicHelper::Call, 2);
        let names = registry.names();
        for expected in [
            "__call_2",
            "__abi_encode_selector_2",
            "__abi_encode_2",
            "abi_encode_item",
            "copy_memory",
            "returndata_to_memory",
            "allocate_memory",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_decode_rejects_short_data() {
        let mut registry = HelperRegistry::new(EvmVersion::Cancun);
        let name = registry.dynamic(DynamicHelper::AbiDecode, 2);
        let def = registry
            .definitions()
            .into_iter()
            .find(|f| f.name == name)
            .unwrap();
        assert_eq!(
            def.body[0],
            Statement::if_(
                call("lt", vec![call("mload", vec![ident("data")]), num(64)]),
                vec![Statement::expr(call("revert", vec![num(0), num(0)]))],
            )
        );
    }

    #[test]
    fn test_shape_literal_packing() {
        assert_eq!(shape_literal(&[0, 0], 2).unwrap(), num(0));
        // arg 0 word, arg 1 bytes, arg 2 word array: 0b10_01_00
        assert_eq!(
            shape_literal(&[0, 1, 2], 2).unwrap(),
            Expression::num_text("0x24")
        );
        // packed widths 20, 32
        assert_eq!(
            shape_literal(&[20, 32], 8).unwrap(),
            Expression::num_text("0x2014")
        );
    }

    #[test]
    fn test_shapes_reject_structs() {
        assert_eq!(abi_shape(&TypeDescriptor::UInt(8)).unwrap(), 0);
        assert_eq!(abi_shape(&TypeDescriptor::String).unwrap(), 1);
        assert!(abi_shape(&TypeDescriptor::Struct("Pos".into())).is_err());
        assert_eq!(packed_width(&TypeDescriptor::Address).unwrap(), 20);
    }
}
