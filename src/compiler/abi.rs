//! # Selector / Signature Engine
//!
//! Canonical signatures, 4-byte selectors and 32-byte topics, plus the
//! metadata records the dispatcher and the ABI description are built from.
//!
//! ## ABI Format
//! ```json
//! [
//!   { "type": "function", "name": "transfer",
//!     "inputs": [{ "name": "to", "type": "address" }, { "name": "amount", "type": "uint256" }],
//!     "outputs": [{ "name": "", "type": "bool" }],
//!     "stateMutability": "nonpayable" },
//!   { "type": "event", "name": "Transfer", "inputs": [...], "anonymous": false }
//! ]
//! ```

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use super::types::{NamedType, TypeDescriptor, TypeNames};
use crate::ast::Mutability;
use crate::Result;

/// Keccak-256 of `data`
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// `name(t1,t2,...)` from canonical type names
pub fn signature(name: &str, canonical_types: &[String]) -> String {
    format!("{}({})", name, canonical_types.join(","))
}

/// First four bytes of the keccak of a signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Full keccak of a signature (event topic 0)
pub fn topic(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}

/// Selector as a `0x`-prefixed IR literal
pub fn selector_hex(selector: &[u8; 4]) -> String {
    format!("0x{}", hex::encode(selector))
}

/// Selector as an integer (switch case values)
pub fn selector_value(selector: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*selector)
}

/// Parameter of an externally reachable function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamMeta {
    /// Parameter name
    pub name: String,
    /// Declared type text
    pub type_text: String,
    /// Resolved type
    pub ty: TypeDescriptor,
    /// Dynamic array parameters decode as offset/length pairs
    pub is_dynamic_array: bool,
}

impl ParamMeta {
    /// Resolve a declared parameter
    pub fn resolve(name: &str, type_text: &str, names: &dyn TypeNames) -> Result<Self> {
        let ty = TypeDescriptor::parse(type_text, names)?;
        Ok(Self {
            name: name.to_string(),
            type_text: type_text.to_string(),
            is_dynamic_array: matches!(ty, TypeDescriptor::Array(_, None)),
            ty,
        })
    }
}

/// Externally reachable function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionMeta {
    /// Source-level name
    pub name: String,
    /// IR function invoked by the dispatcher
    pub ir_name: String,
    /// Canonical signature
    pub signature: String,
    /// Dispatch selector
    pub selector: [u8; 4],
    /// Number of parameters
    pub param_count: usize,
    /// True when the function returns at least one value
    pub has_return: bool,
    /// Number of returned values
    pub return_arity: usize,
    /// Accepts value
    pub is_payable: bool,
    /// State mutability for the ABI
    pub mutability: Mutability,
    /// Parameters in order
    pub params: Vec<ParamMeta>,
    /// Return types in order
    pub returns: Vec<TypeDescriptor>,
}

impl FunctionMeta {
    /// Build metadata for a function with resolved parameters and returns
    pub fn new(
        name: &str,
        ir_name: &str,
        params: Vec<ParamMeta>,
        returns: Vec<TypeDescriptor>,
        mutability: Mutability,
        names: &dyn TypeNames,
    ) -> Result<Self> {
        let canonical = params
            .iter()
            .map(|p| p.ty.canonical_name(names))
            .collect::<Result<Vec<_>>>()?;
        let signature = signature(name, &canonical);
        Ok(Self {
            name: name.to_string(),
            ir_name: ir_name.to_string(),
            selector: selector(&signature),
            signature,
            param_count: params.len(),
            has_return: !returns.is_empty(),
            return_arity: returns.len(),
            is_payable: mutability == Mutability::Payable,
            mutability,
            params,
            returns,
        })
    }

    /// True when any returned value needs ABI encoding with offsets
    pub fn returns_dynamic(&self) -> bool {
        self.returns.iter().any(|r| r.is_dynamic())
    }
}

/// Event field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFieldMeta {
    /// Field name
    pub name: String,
    /// Resolved type
    pub ty: TypeDescriptor,
    /// Emitted as a topic
    pub indexed: bool,
}

/// Event declaration with its topic hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    /// Event name
    pub name: String,
    /// Canonical signature
    pub signature: String,
    /// Full signature hash (topic 0 unless anonymous)
    pub topic: [u8; 32],
    /// Ordered fields
    pub fields: Vec<EventFieldMeta>,
    /// Anonymous events carry no signature topic
    pub anonymous: bool,
}

impl EventMeta {
    /// Maximum number of indexed fields
    pub fn max_indexed(anonymous: bool) -> usize {
        if anonymous {
            4
        } else {
            3
        }
    }
}

/// Custom error declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomErrorMeta {
    /// Error name
    pub name: String,
    /// Canonical signature
    pub signature: String,
    /// 4-byte selector
    pub selector: [u8; 4],
    /// Parameter names and types in order
    pub params: Vec<(String, TypeDescriptor)>,
}

/// Kind of an ABI entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbiKind {
    /// Callable function
    Function,
    /// Deployment constructor
    Constructor,
    /// Log event
    Event,
    /// Custom error
    Error,
    /// Fallback handler
    Fallback,
    /// Plain value receiver
    Receive,
}

/// Parameter in an ABI entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParam {
    /// Parameter name
    pub name: String,
    /// Canonical type (`tuple` for structs, with `components`)
    #[serde(rename = "type")]
    pub ty: String,
    /// Struct members
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<AbiParam>,
    /// Event fields only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed: Option<bool>,
}

impl AbiParam {
    /// Describe a parameter of the given type
    pub fn from_type(name: &str, ty: &TypeDescriptor, names: &dyn TypeNames) -> Result<Self> {
        let (base, suffix) = array_suffix(ty);
        let (ty_text, components) = match base {
            TypeDescriptor::Struct(struct_name) => {
                let mut components = Vec::new();
                if let Some(NamedType::Struct(fields)) = names.named_type(struct_name) {
                    for (field, text) in fields {
                        let field_ty = TypeDescriptor::parse(&text, names)?;
                        components.push(AbiParam::from_type(&field, &field_ty, names)?);
                    }
                }
                ("tuple".to_string(), components)
            }
            TypeDescriptor::Tuple(elems) => {
                let components = elems
                    .iter()
                    .map(|e| AbiParam::from_type("", e, names))
                    .collect::<Result<Vec<_>>>()?;
                ("tuple".to_string(), components)
            }
            other => (other.canonical_name(names)?, Vec::new()),
        };
        Ok(Self {
            name: name.to_string(),
            ty: format!("{}{}", ty_text, suffix),
            components,
            indexed: None,
        })
    }
}

fn array_suffix(ty: &TypeDescriptor) -> (&TypeDescriptor, String) {
    match ty {
        TypeDescriptor::Array(elem, len) => {
            let (base, inner) = array_suffix(elem);
            let own = match len {
                Some(n) => format!("[{}]", n),
                None => "[]".to_string(),
            };
            (base, format!("{}{}", inner, own))
        }
        other => (other, String::new()),
    }
}

/// One entry of the ABI description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiEntry {
    /// Entry kind
    #[serde(rename = "type")]
    pub kind: AbiKind,
    /// Name (absent for constructor, fallback, receive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Inputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Vec<AbiParam>>,
    /// Outputs (functions only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<AbiParam>>,
    /// State mutability (functions, constructor, fallback, receive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_mutability: Option<String>,
    /// Events only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymous: Option<bool>,
}

impl AbiEntry {
    /// Function entry
    pub fn function(meta: &FunctionMeta, names: &dyn TypeNames) -> Result<Self> {
        let inputs = meta
            .params
            .iter()
            .map(|p| AbiParam::from_type(&p.name, &p.ty, names))
            .collect::<Result<Vec<_>>>()?;
        let outputs = meta
            .returns
            .iter()
            .map(|r| AbiParam::from_type("", r, names))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            kind: AbiKind::Function,
            name: Some(meta.name.clone()),
            inputs: Some(inputs),
            outputs: Some(outputs),
            state_mutability: Some(meta.mutability.as_abi_str().to_string()),
            anonymous: None,
        })
    }

    /// Event entry
    pub fn event(meta: &EventMeta, names: &dyn TypeNames) -> Result<Self> {
        let mut inputs = Vec::with_capacity(meta.fields.len());
        for field in &meta.fields {
            let mut param = AbiParam::from_type(&field.name, &field.ty, names)?;
            param.indexed = Some(field.indexed);
            inputs.push(param);
        }
        Ok(Self {
            kind: AbiKind::Event,
            name: Some(meta.name.clone()),
            inputs: Some(inputs),
            outputs: None,
            state_mutability: None,
            anonymous: Some(meta.anonymous),
        })
    }

    /// Custom error entry
    pub fn error(meta: &CustomErrorMeta, names: &dyn TypeNames) -> Result<Self> {
        let inputs = meta
            .params
            .iter()
            .map(|(n, t)| AbiParam::from_type(n, t, names))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            kind: AbiKind::Error,
            name: Some(meta.name.clone()),
            inputs: Some(inputs),
            outputs: None,
            state_mutability: None,
            anonymous: None,
        })
    }

    /// Constructor entry
    pub fn constructor(params: &[ParamMeta], payable: bool, names: &dyn TypeNames) -> Result<Self> {
        let inputs = params
            .iter()
            .map(|p| AbiParam::from_type(&p.name, &p.ty, names))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            kind: AbiKind::Constructor,
            name: None,
            inputs: Some(inputs),
            outputs: None,
            state_mutability: Some(if payable { "payable" } else { "nonpayable" }.to_string()),
            anonymous: None,
        })
    }

    /// Fallback or receive entry
    pub fn special(kind: AbiKind, payable: bool) -> Self {
        Self {
            kind,
            name: None,
            inputs: None,
            outputs: None,
            state_mutability: Some(if payable { "payable" } else { "nonpayable" }.to_string()),
            anonymous: None,
        }
    }
}

/// Serialize an ABI description as pretty-printed JSON
pub fn abi_json(entries: &[AbiEntry]) -> Result<String> {
    serde_json::to_string_pretty(entries)
        .map_err(|e| crate::Error::compiler(format!("ABI serialization failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::types::NoNames;

    #[test]
    fn test_known_selectors() {
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(selector("balanceOf(address)"), [0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(selector_hex(&selector("Error(string)")), "0x08c379a0");
        assert_eq!(selector_hex(&selector("Panic(uint256)")), "0x4e487b71");
    }

    #[test]
    fn test_event_topic() {
        let t = topic("Transfer(address,address,uint256)");
        assert_eq!(
            hex::encode(t),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_function_meta_signature() {
        let params = vec![
            ParamMeta::resolve("to", "address", &NoNames).unwrap(),
            ParamMeta::resolve("amount", "u256", &NoNames).unwrap(),
        ];
        let meta = FunctionMeta::new(
            "transfer",
            "fun_transfer",
            params,
            vec![TypeDescriptor::Bool],
            Mutability::NonPayable,
            &NoNames,
        )
        .unwrap();
        assert_eq!(meta.signature, "transfer(address,uint256)");
        assert_eq!(selector_value(&meta.selector), 0xa9059cbb);
        assert_eq!(meta.return_arity, 1);
        assert!(!meta.is_payable);
        assert!(!meta.returns_dynamic());
    }

    #[test]
    fn test_abi_json_shape() {
        let params = vec![ParamMeta::resolve("ids", "u256[]", &NoNames).unwrap()];
        assert!(params[0].is_dynamic_array);
        let meta = FunctionMeta::new(
            "sum",
            "fun_sum",
            params,
            vec![TypeDescriptor::UInt(256)],
            Mutability::View,
            &NoNames,
        )
        .unwrap();
        let entry = AbiEntry::function(&meta, &NoNames).unwrap();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["inputs"][0]["type"], "uint256[]");
        assert_eq!(json["stateMutability"], "view");
        assert!(json.get("anonymous").is_none());
    }
}
