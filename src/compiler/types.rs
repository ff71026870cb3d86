//! # Type Mapper
//!
//! Maps surface type text to a closed [`TypeDescriptor`] and answers the
//! questions the rest of the compiler asks about a type: byte width, whether
//! it packs into a shared slot, how many slots it spans, its canonical ABI
//! name, and its numeric bounds.
//!
//! Named types (enums, structs, user-defined value types, contracts) are
//! resolved through the [`TypeNames`] trait, implemented by the declaration
//! catalog.

use crate::{Error, Result};

/// Resolved kind of a user-declared type name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamedType {
    /// Enum with its member count (lowered as `uint8`)
    Enum(usize),
    /// Struct with ordered `(field, type text)` pairs
    Struct(Vec<(String, String)>),
    /// User-defined value type over an elementary type
    Alias(String),
    /// Interface or class used as a contract reference
    Contract,
}

/// Lookup of user-declared type names
pub trait TypeNames {
    /// Resolve a user-declared name
    fn named_type(&self, name: &str) -> Option<NamedType>;

    /// Slot count of a struct whose layout is already known
    fn struct_slots(&self, name: &str) -> Option<u64>;
}

/// Closed type descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeDescriptor {
    /// Unsigned integer with bit width 8..=256
    UInt(u16),
    /// Signed integer with bit width 8..=256
    Int(u16),
    /// 20-byte account address
    Address,
    /// Boolean
    Bool,
    /// Fixed byte array, 1..=32 bytes, left-aligned in a word
    FixedBytes(u8),
    /// Dynamic byte array
    DynamicBytes,
    /// UTF-8 string
    String,
    /// Array with optional fixed length
    Array(Box<TypeDescriptor>, Option<u64>),
    /// Key → value mapping (storage only)
    Mapping(Box<TypeDescriptor>, Box<TypeDescriptor>),
    /// Tuple of values
    Tuple(Vec<TypeDescriptor>),
    /// Named struct (a tuple with field names, laid out through the catalog)
    Struct(String),
    /// Interface or class reference; an address at runtime
    Contract(String),
    /// External function reference (address + selector, 24 bytes)
    FunctionRef,
}

impl TypeDescriptor {
    /// Parse type text, resolving names through `names`
    pub fn parse(text: &str, names: &dyn TypeNames) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(malformed(text, "empty type"));
        }

        // Tuple: [A, B, ...]
        if text.starts_with('[') && matching_close(text, 0) == Some(text.len() - 1) {
            let inner = &text[1..text.len() - 1];
            let parts = split_top_level(inner).map_err(|reason| malformed(text, &reason))?;
            if parts.iter().any(|p| p.trim().is_empty()) {
                return Err(malformed(text, "empty tuple element"));
            }
            let elems = parts
                .iter()
                .map(|p| Self::parse(p, names))
                .collect::<Result<Vec<_>>>()?;
            return Ok(TypeDescriptor::Tuple(elems));
        }

        // Arrays: T[] / T[N]
        if text.ends_with(']') {
            let open = matching_open(text, text.len() - 1)
                .ok_or_else(|| malformed(text, "unbalanced brackets"))?;
            let elem_text = &text[..open];
            if elem_text.trim().is_empty() {
                return Err(malformed(text, "array without element type"));
            }
            let len_text = text[open + 1..text.len() - 1].trim();
            let len = if len_text.is_empty() {
                None
            } else {
                let n: u64 = len_text
                    .replace('_', "")
                    .parse()
                    .map_err(|_| malformed(text, "array length is not an integer"))?;
                if n == 0 {
                    return Err(malformed(text, "zero-length fixed array"));
                }
                Some(n)
            };
            let elem = Self::parse(elem_text, names)?;
            if matches!(elem, TypeDescriptor::Mapping(..)) && len.is_none() {
                return Err(malformed(text, "dynamic array of mappings"));
            }
            return Ok(TypeDescriptor::Array(Box::new(elem), len));
        }

        // Mapping<K, V>
        if let Some(rest) = text
            .strip_prefix("Mapping<")
            .or_else(|| text.strip_prefix("Map<"))
        {
            let inner = rest
                .strip_suffix('>')
                .ok_or_else(|| malformed(text, "missing closing `>`"))?;
            let parts = split_top_level(inner).map_err(|reason| malformed(text, &reason))?;
            if parts.len() != 2 {
                return Err(malformed(text, "mapping needs exactly a key and a value type"));
            }
            let key = Self::parse(&parts[0], names)?;
            if !key.is_valid_mapping_key() {
                return Err(malformed(text, "mapping key must be an elementary type"));
            }
            let value = Self::parse(&parts[1], names)?;
            return Ok(TypeDescriptor::Mapping(Box::new(key), Box::new(value)));
        }

        if text.contains(|c: char| "<>,[]() ".contains(c)) {
            return Err(malformed(text, "unexpected punctuation"));
        }

        if let Some(elementary) = parse_elementary(text)? {
            return Ok(elementary);
        }

        match names.named_type(text) {
            Some(NamedType::Enum(_)) => Ok(TypeDescriptor::UInt(8)),
            Some(NamedType::Struct(_)) => Ok(TypeDescriptor::Struct(text.to_string())),
            Some(NamedType::Alias(underlying)) => {
                let resolved = Self::parse(&underlying, names)?;
                if !resolved.is_value_type() {
                    return Err(malformed(text, "user-defined value type over a reference type"));
                }
                Ok(resolved)
            }
            Some(NamedType::Contract) => Ok(TypeDescriptor::Contract(text.to_string())),
            None => Err(Error::unresolved("type", text)),
        }
    }

    /// Elementary value types fit in one word and are copied by value
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::UInt(_)
                | TypeDescriptor::Int(_)
                | TypeDescriptor::Address
                | TypeDescriptor::Bool
                | TypeDescriptor::FixedBytes(_)
                | TypeDescriptor::Contract(_)
                | TypeDescriptor::FunctionRef
        )
    }

    fn is_valid_mapping_key(&self) -> bool {
        (self.is_value_type() && *self != TypeDescriptor::FunctionRef)
            || matches!(self, TypeDescriptor::String | TypeDescriptor::DynamicBytes)
    }

    /// True for signed integers
    pub fn is_signed(&self) -> bool {
        matches!(self, TypeDescriptor::Int(_))
    }

    /// True for string and bytes
    pub fn is_bytes_like(&self) -> bool {
        matches!(self, TypeDescriptor::String | TypeDescriptor::DynamicBytes)
    }

    /// Width in bytes when stored (32 for reference types)
    pub fn byte_size(&self) -> u32 {
        match self {
            TypeDescriptor::UInt(bits) | TypeDescriptor::Int(bits) => u32::from(*bits) / 8,
            TypeDescriptor::Address | TypeDescriptor::Contract(_) => 20,
            TypeDescriptor::Bool => 1,
            TypeDescriptor::FixedBytes(n) => u32::from(*n),
            TypeDescriptor::FunctionRef => 24,
            _ => 32,
        }
    }

    /// Scalars narrower than a word share slots with their neighbours
    pub fn can_pack(&self) -> bool {
        self.is_value_type() && *self != TypeDescriptor::FunctionRef && self.byte_size() < 32
    }

    /// Number of consecutive slots a value of this type occupies in storage
    pub fn storage_slots(&self, names: &dyn TypeNames) -> Result<u64> {
        match self {
            TypeDescriptor::Struct(name) => names
                .struct_slots(name)
                .ok_or_else(|| Error::unresolved("struct", name.clone())),
            TypeDescriptor::Array(elem, Some(len)) => Ok(elem.storage_slots(names)? * len),
            TypeDescriptor::Tuple(elems) => {
                let mut total = 0;
                for e in elems {
                    total += e.storage_slots(names)?;
                }
                Ok(total)
            }
            _ => Ok(1),
        }
    }

    /// ABI-dynamic types are encoded out of line behind an offset
    pub fn is_dynamic(&self) -> bool {
        match self {
            TypeDescriptor::DynamicBytes | TypeDescriptor::String => true,
            TypeDescriptor::Array(_, None) => true,
            TypeDescriptor::Array(elem, Some(_)) => elem.is_dynamic(),
            TypeDescriptor::Tuple(elems) => elems.iter().any(|e| e.is_dynamic()),
            _ => false,
        }
    }

    /// Canonical ABI type name used in signatures (`uint256`, `(address,bool)[]`)
    pub fn canonical_name(&self, names: &dyn TypeNames) -> Result<String> {
        Ok(match self {
            TypeDescriptor::UInt(bits) => format!("uint{}", bits),
            TypeDescriptor::Int(bits) => format!("int{}", bits),
            TypeDescriptor::Address | TypeDescriptor::Contract(_) => "address".to_string(),
            TypeDescriptor::Bool => "bool".to_string(),
            TypeDescriptor::FixedBytes(n) => format!("bytes{}", n),
            TypeDescriptor::DynamicBytes => "bytes".to_string(),
            TypeDescriptor::String => "string".to_string(),
            TypeDescriptor::FunctionRef => "function".to_string(),
            TypeDescriptor::Array(elem, len) => match len {
                Some(n) => format!("{}[{}]", elem.canonical_name(names)?, n),
                None => format!("{}[]", elem.canonical_name(names)?),
            },
            TypeDescriptor::Tuple(elems) => {
                let parts = elems
                    .iter()
                    .map(|e| e.canonical_name(names))
                    .collect::<Result<Vec<_>>>()?;
                format!("({})", parts.join(","))
            }
            TypeDescriptor::Struct(name) => match names.named_type(name) {
                Some(NamedType::Struct(fields)) => {
                    let mut parts = Vec::with_capacity(fields.len());
                    for (_, ty) in &fields {
                        parts.push(Self::parse(ty, names)?.canonical_name(names)?);
                    }
                    format!("({})", parts.join(","))
                }
                _ => return Err(Error::unresolved("struct", name.clone())),
            },
            TypeDescriptor::Mapping(..) => {
                return Err(Error::unsupported("mappings have no ABI representation"))
            }
        })
    }

    /// Mask selecting the low `byte_size` bytes, `None` for full words
    pub fn mask(&self) -> Option<String> {
        let size = self.byte_size();
        if size >= 32 || !self.is_value_type() {
            return None;
        }
        Some(format!("0x{}", "ff".repeat(size as usize)))
    }

    /// Inclusive numeric bounds for integer types
    pub fn bounds(&self) -> Option<NumericBounds> {
        match self {
            TypeDescriptor::UInt(bits) => Some(NumericBounds {
                min: "0".to_string(),
                max: format!("0x{}", "ff".repeat(usize::from(*bits) / 8)),
                negative_min: false,
            }),
            TypeDescriptor::Int(bits) => {
                let bytes = usize::from(*bits) / 8;
                let max = format!("0x7f{}", "ff".repeat(bytes - 1));
                Some(NumericBounds {
                    min: max.clone(),
                    max,
                    negative_min: true,
                })
            }
            _ => None,
        }
    }

    /// Short name used in diagnostics
    pub fn describe(&self) -> String {
        match self {
            TypeDescriptor::UInt(bits) => format!("u{}", bits),
            TypeDescriptor::Int(bits) => format!("i{}", bits),
            TypeDescriptor::Address => "address".into(),
            TypeDescriptor::Bool => "bool".into(),
            TypeDescriptor::FixedBytes(n) => format!("bytes{}", n),
            TypeDescriptor::DynamicBytes => "bytes".into(),
            TypeDescriptor::String => "string".into(),
            TypeDescriptor::Array(e, Some(n)) => format!("{}[{}]", e.describe(), n),
            TypeDescriptor::Array(e, None) => format!("{}[]", e.describe()),
            TypeDescriptor::Mapping(k, v) => format!("Mapping<{}, {}>", k.describe(), v.describe()),
            TypeDescriptor::Tuple(es) => format!(
                "[{}]",
                es.iter().map(|e| e.describe()).collect::<Vec<_>>().join(", ")
            ),
            TypeDescriptor::Struct(n) | TypeDescriptor::Contract(n) => n.clone(),
            TypeDescriptor::FunctionRef => "Function".into(),
        }
    }
}

/// Inclusive bounds of an integer type as IR literal text
///
/// For signed types `min` holds the magnitude bound `M` and the real minimum
/// is `not(M)` in two's complement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumericBounds {
    /// Minimum (or its complement for signed types)
    pub min: String,
    /// Maximum
    pub max: String,
    /// True when `min` must be complemented
    pub negative_min: bool,
}

fn malformed(text: &str, reason: &str) -> Error {
    Error::MalformedType {
        text: text.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_width(text: &str, digits: &str, max: u32, step: u32) -> Result<u32> {
    let width: u32 = digits
        .parse()
        .map_err(|_| malformed(text, "width is not a number"))?;
    if width == 0 || width > max || width % step != 0 {
        return Err(Error::InvalidWidth {
            text: text.to_string(),
            width,
        });
    }
    Ok(width)
}

fn parse_elementary(text: &str) -> Result<Option<TypeDescriptor>> {
    let ty = match text {
        "number" | "bigint" | "uint" | "u256" => TypeDescriptor::UInt(256),
        "int" => TypeDescriptor::Int(256),
        "address" | "Address" => TypeDescriptor::Address,
        "bool" | "boolean" => TypeDescriptor::Bool,
        "bytes" => TypeDescriptor::DynamicBytes,
        "string" => TypeDescriptor::String,
        "Function" => TypeDescriptor::FunctionRef,
        _ => {
            let numeric = |prefix: &str| {
                text.strip_prefix(prefix)
                    .filter(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()))
            };
            if let Some(d) = numeric("uint").or_else(|| numeric("u")) {
                TypeDescriptor::UInt(parse_width(text, d, 256, 8)? as u16)
            } else if let Some(d) = numeric("int").or_else(|| numeric("i")) {
                TypeDescriptor::Int(parse_width(text, d, 256, 8)? as u16)
            } else if let Some(d) = numeric("bytes") {
                TypeDescriptor::FixedBytes(parse_width(text, d, 32, 1)? as u8)
            } else {
                return Ok(None);
            }
        }
    };
    Ok(Some(ty))
}

/// Split on commas that are not nested inside `<>`, `[]` or `()`
pub(crate) fn split_top_level(text: &str) -> std::result::Result<Vec<String>, String> {
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '<' | '[' | '(' => depth += 1,
            '>' | ']' | ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err("unbalanced brackets".to_string());
                }
            }
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if depth != 0 {
        return Err("unbalanced brackets".to_string());
    }
    parts.push(current.trim().to_string());
    Ok(parts)
}

fn matching_close(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0;
    for (i, c) in text.char_indices().skip(open) {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn matching_open(text: &str, close: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0;
    let mut i = close as isize;
    while i >= 0 {
        match bytes[i as usize] {
            b']' => depth += 1,
            b'[' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i as usize);
                }
            }
            _ => {}
        }
        i -= 1;
    }
    None
}

/// Name table with no user declarations, for elementary-only contexts
pub struct NoNames;

impl TypeNames for NoNames {
    fn named_type(&self, _name: &str) -> Option<NamedType> {
        None
    }

    fn struct_slots(&self, _name: &str) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Names;

    impl TypeNames for Names {
        fn named_type(&self, name: &str) -> Option<NamedType> {
            match name {
                "Status" => Some(NamedType::Enum(3)),
                "Price" => Some(NamedType::Alias("u128".into())),
                "Point" => Some(NamedType::Struct(vec![
                    ("x".into(), "u256".into()),
                    ("y".into(), "address".into()),
                ])),
                "IToken" => Some(NamedType::Contract),
                _ => None,
            }
        }

        fn struct_slots(&self, name: &str) -> Option<u64> {
            (name == "Point").then_some(2)
        }
    }

    fn parse(text: &str) -> Result<TypeDescriptor> {
        TypeDescriptor::parse(text, &Names)
    }

    #[test]
    fn test_elementary_types() {
        assert_eq!(parse("u8").unwrap(), TypeDescriptor::UInt(8));
        assert_eq!(parse("uint256").unwrap(), TypeDescriptor::UInt(256));
        assert_eq!(parse("i64").unwrap(), TypeDescriptor::Int(64));
        assert_eq!(parse("bytes4").unwrap(), TypeDescriptor::FixedBytes(4));
        assert_eq!(parse("string").unwrap(), TypeDescriptor::String);
        assert_eq!(parse("number").unwrap(), TypeDescriptor::UInt(256));
    }

    #[test]
    fn test_width_validation() {
        assert!(matches!(parse("u7"), Err(Error::InvalidWidth { width: 7, .. })));
        assert!(matches!(parse("u264"), Err(Error::InvalidWidth { .. })));
        assert!(matches!(parse("bytes33"), Err(Error::InvalidWidth { .. })));
        assert!(matches!(parse("i0"), Err(Error::InvalidWidth { .. })));
    }

    #[test]
    fn test_composite_types() {
        let ty = parse("Mapping<address, Mapping<address, u256>>").unwrap();
        assert_eq!(
            ty,
            TypeDescriptor::Mapping(
                Box::new(TypeDescriptor::Address),
                Box::new(TypeDescriptor::Mapping(
                    Box::new(TypeDescriptor::Address),
                    Box::new(TypeDescriptor::UInt(256))
                ))
            )
        );
        assert_eq!(
            parse("u8[4][]").unwrap(),
            TypeDescriptor::Array(
                Box::new(TypeDescriptor::Array(Box::new(TypeDescriptor::UInt(8)), Some(4))),
                None
            )
        );
        assert_eq!(
            parse("[u256, bool]").unwrap(),
            TypeDescriptor::Tuple(vec![TypeDescriptor::UInt(256), TypeDescriptor::Bool])
        );
    }

    #[test]
    fn test_malformed_types() {
        assert!(matches!(parse("Mapping<address>"), Err(Error::MalformedType { .. })));
        assert!(matches!(parse("Mapping<address, u256"), Err(Error::MalformedType { .. })));
        assert!(matches!(parse("u256[abc]"), Err(Error::MalformedType { .. })));
        assert!(matches!(parse("[u256, ]"), Err(Error::MalformedType { .. })));
        assert!(matches!(parse("Mapping<u256[], u8>"), Err(Error::MalformedType { .. })));
        assert!(matches!(parse("Unknown"), Err(Error::UnresolvedReference { .. })));
    }

    #[test]
    fn test_named_types() {
        assert_eq!(parse("Status").unwrap(), TypeDescriptor::UInt(8));
        assert_eq!(parse("Price").unwrap(), TypeDescriptor::UInt(128));
        assert_eq!(parse("IToken").unwrap().canonical_name(&Names).unwrap(), "address");
        assert_eq!(
            parse("Point[]").unwrap().canonical_name(&Names).unwrap(),
            "(uint256,address)[]"
        );
        assert_eq!(parse("Point[3]").unwrap().storage_slots(&Names).unwrap(), 6);
    }

    #[test]
    fn test_sizes_and_packing() {
        assert_eq!(TypeDescriptor::Address.byte_size(), 20);
        assert!(TypeDescriptor::Address.can_pack());
        assert!(!TypeDescriptor::UInt(256).can_pack());
        assert!(!TypeDescriptor::FunctionRef.can_pack());
        assert!(!TypeDescriptor::String.can_pack());
        assert_eq!(TypeDescriptor::UInt(16).mask().as_deref(), Some("0xffff"));
        assert!(TypeDescriptor::String.is_dynamic());
        assert!(!TypeDescriptor::Array(Box::new(TypeDescriptor::Bool), Some(3)).is_dynamic());
    }

    #[test]
    fn test_bounds() {
        let b = TypeDescriptor::UInt(8).bounds().unwrap();
        assert_eq!(b.max, "0xff");
        let b = TypeDescriptor::Int(16).bounds().unwrap();
        assert_eq!(b.max, "0x7fff");
        assert!(b.negative_min);
    }
}
