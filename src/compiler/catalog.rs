//! # Declaration Catalog
//!
//! One pass over the compiled unit and the declarations it imports, indexing
//! everything the lowering engine looks up by name:
//!
//! - enum members
//! - struct layouts, resolved in dependency order so an embedding struct
//!   sees the full size of the structs it embeds
//! - external-contract method tables (method-bearing interfaces and classes)
//! - libraries (classes whose methods are all static)
//! - free functions and custom errors
//! - events
//! - `@using Library for Type` extension bindings found in comments
//!
//! The catalog is read-only once built and lives for one compilation.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::abi::{self, CustomErrorMeta, EventFieldMeta, EventMeta};
use super::types::{NamedType, TypeDescriptor, TypeNames};
use crate::ast::{
    ClassDecl, EventDecl, FunctionDecl, InterfaceDecl, MethodDecl, Mutability, SourceUnit,
};
use crate::{Error, Result};

lazy_static! {
    static ref USING_BINDING: Regex =
        Regex::new(r"@using\s+([A-Za-z_][A-Za-z0-9_]*)\s+for\s+(.+?)\s*;?\s*$").unwrap();
}

/// Field of a struct layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    /// Slot offset from the start of the struct
    pub offset_in_slots: u64,
    /// Declared type text
    pub type_text: String,
    /// Resolved type
    pub ty: TypeDescriptor,
}

/// Storage layout of a struct: one slot (or region) per field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    /// Struct name
    pub name: String,
    /// Fields in declaration order
    pub fields: IndexMap<String, StructField>,
    /// Total slot count
    pub slots: u64,
}

impl StructLayout {
    /// Position of a field in declaration order (memory word index)
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.get_index_of(name)
    }
}

/// Method callable on an external contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalMethod {
    /// Method name
    pub name: String,
    /// Canonical signature
    pub signature: String,
    /// 4-byte selector
    pub selector: [u8; 4],
    /// Parameter types
    pub params: Vec<TypeDescriptor>,
    /// Return types
    pub returns: Vec<TypeDescriptor>,
    /// Declared mutability (view/pure calls use staticcall)
    pub mutability: Mutability,
}

/// Indexed declarations visible to one compilation
pub struct Catalog<'a> {
    classes: IndexMap<String, &'a ClassDecl>,
    interfaces: IndexMap<String, &'a InterfaceDecl>,
    struct_decls: IndexMap<String, Vec<(String, String)>>,
    structs: IndexMap<String, StructLayout>,
    enums: IndexMap<String, Vec<String>>,
    aliases: IndexMap<String, String>,
    functions: IndexMap<String, &'a FunctionDecl>,
    errors: IndexMap<String, CustomErrorMeta>,
    events: IndexMap<String, &'a EventDecl>,
    extensions: BTreeMap<String, BTreeSet<String>>,
}

impl<'a> Catalog<'a> {
    /// Index `unit` together with the declarations it imports from `deps`
    pub fn build(unit: &'a SourceUnit, deps: &'a [SourceUnit]) -> Result<Self> {
        let mut catalog = Catalog {
            classes: IndexMap::new(),
            interfaces: IndexMap::new(),
            struct_decls: IndexMap::new(),
            structs: IndexMap::new(),
            enums: IndexMap::new(),
            aliases: IndexMap::new(),
            functions: IndexMap::new(),
            errors: IndexMap::new(),
            events: IndexMap::new(),
            extensions: BTreeMap::new(),
        };

        let mut comments: Vec<&'a str> = Vec::new();
        for import in &unit.imports {
            let dep = deps
                .iter()
                .find(|d| d.path == import.path)
                .ok_or_else(|| Error::UnresolvedImport {
                    path: import.path.clone(),
                    name: String::new(),
                })?;
            if import.names.is_empty() {
                catalog.index_unit(dep, None);
                comments.extend(dep.comments.iter().map(String::as_str));
            } else {
                for name in &import.names {
                    if !catalog.index_unit(dep, Some(name)) {
                        return Err(Error::UnresolvedImport {
                            path: import.path.clone(),
                            name: name.clone(),
                        });
                    }
                }
            }
        }
        catalog.index_unit(unit, None);
        comments.extend(unit.comments.iter().map(String::as_str));

        catalog.layout_structs()?;
        catalog.index_errors()?;
        for comment in comments {
            catalog.bind_extension(comment)?;
        }

        debug!(
            classes = catalog.classes.len(),
            interfaces = catalog.interfaces.len(),
            structs = catalog.structs.len(),
            enums = catalog.enums.len(),
            errors = catalog.errors.len(),
            extensions = catalog.extension_count(),
            "Declaration catalog built"
        );
        Ok(catalog)
    }

    /// Index declarations of `unit`; with `only`, just the named one.
    /// Returns whether anything was indexed.
    fn index_unit(&mut self, unit: &'a SourceUnit, only: Option<&str>) -> bool {
        let wanted = |name: &str| only.map_or(true, |o| o == name);
        let mut found = false;

        for class in unit.classes.iter().filter(|c| wanted(&c.name)) {
            for event in &class.events {
                self.events.entry(event.name.clone()).or_insert(event);
            }
            self.classes.insert(class.name.clone(), class);
            found = true;
        }
        for iface in unit.interfaces.iter().filter(|i| wanted(&i.name)) {
            if iface.is_struct() {
                let fields = iface
                    .fields
                    .iter()
                    .map(|f| (f.name.clone(), f.ty.clone()))
                    .collect();
                self.struct_decls.insert(iface.name.clone(), fields);
            } else {
                self.interfaces.insert(iface.name.clone(), iface);
            }
            found = true;
        }
        for e in unit.enums.iter().filter(|e| wanted(&e.name)) {
            self.enums.insert(e.name.clone(), e.members.clone());
            found = true;
        }
        for alias in unit.type_aliases.iter().filter(|a| wanted(&a.name)) {
            self.aliases
                .insert(alias.name.clone(), alias.underlying.clone());
            found = true;
        }
        for f in unit.functions.iter().filter(|f| wanted(&f.name)) {
            self.functions.insert(f.name.clone(), f);
            found = true;
        }
        found
    }

    /// Compute struct layouts depth-first so embedded structs are sized first
    fn layout_structs(&mut self) -> Result<()> {
        let names: Vec<String> = self.struct_decls.keys().cloned().collect();
        let mut visiting = BTreeSet::new();
        for name in names {
            self.layout_struct(&name, &mut visiting)?;
        }
        Ok(())
    }

    fn layout_struct(&mut self, name: &str, visiting: &mut BTreeSet<String>) -> Result<()> {
        if self.structs.contains_key(name) {
            return Ok(());
        }
        if !visiting.insert(name.to_string()) {
            return Err(Error::CyclicStruct(name.to_string()));
        }

        let decl = self
            .struct_decls
            .get(name)
            .cloned()
            .ok_or_else(|| Error::unresolved("struct", name))?;

        let mut resolved = Vec::with_capacity(decl.len());
        for (field, text) in &decl {
            let ty = TypeDescriptor::parse(text, &*self)?;
            for dep in embedded_structs(&ty) {
                self.layout_struct(&dep, visiting)?;
            }
            resolved.push((field.clone(), text.clone(), ty));
        }

        let mut fields = IndexMap::new();
        let mut offset = 0u64;
        for (field, type_text, ty) in resolved {
            let slots = ty.storage_slots(&*self)?;
            fields.insert(
                field,
                StructField {
                    offset_in_slots: offset,
                    type_text,
                    ty,
                },
            );
            offset += slots;
        }

        visiting.remove(name);
        self.structs.insert(
            name.to_string(),
            StructLayout {
                name: name.to_string(),
                fields,
                slots: offset.max(1),
            },
        );
        Ok(())
    }

    fn index_errors(&mut self) -> Result<()> {
        let decls: Vec<&'a FunctionDecl> = self
            .functions
            .values()
            .filter(|f| f.never_returns)
            .copied()
            .collect();
        for decl in decls {
            let mut params = Vec::with_capacity(decl.params.len());
            for p in &decl.params {
                params.push((p.name.clone(), TypeDescriptor::parse(&p.ty, &*self)?));
            }
            let canonical = params
                .iter()
                .map(|(_, t)| t.canonical_name(&*self))
                .collect::<Result<Vec<_>>>()?;
            let signature = abi::signature(&decl.name, &canonical);
            self.errors.insert(
                decl.name.clone(),
                CustomErrorMeta {
                    name: decl.name.clone(),
                    selector: abi::selector(&signature),
                    signature,
                    params,
                },
            );
        }
        Ok(())
    }

    fn bind_extension(&mut self, comment: &str) -> Result<()> {
        let Some(caps) = USING_BINDING.captures(comment.trim()) else {
            return Ok(());
        };
        let library = caps[1].to_string();
        if self.library(&library).is_none() {
            return Err(Error::unresolved("library", library));
        }
        let target = caps[2].trim();
        let key = if target == "*" {
            "*".to_string()
        } else {
            TypeDescriptor::parse(target, &*self)?.describe()
        };
        debug!(library = %library, target = %key, "Extension binding");
        self.extensions.entry(key).or_default().insert(library);
        Ok(())
    }

    /// Resolve type text against the catalog
    pub fn resolve_type(&self, text: &str) -> Result<TypeDescriptor> {
        TypeDescriptor::parse(text, self)
    }

    /// Class by name (local or imported)
    pub fn class(&self, name: &str) -> Option<&'a ClassDecl> {
        self.classes.get(name).copied()
    }

    /// Library (all-static class) by name
    pub fn library(&self, name: &str) -> Option<&'a ClassDecl> {
        self.class(name).filter(|c| c.is_library())
    }

    /// Static method of a library
    pub fn library_method(&self, library: &str, method: &str) -> Result<&'a MethodDecl> {
        let lib = self
            .library(library)
            .ok_or_else(|| Error::unresolved("library", library))?;
        lib.find_method(method).ok_or_else(|| Error::UnknownMember {
            member: method.to_string(),
            on: format!("library {}", library),
        })
    }

    /// All libraries, in declaration order
    pub fn libraries(&self) -> impl Iterator<Item = &'a ClassDecl> + '_ {
        self.classes.values().copied().filter(|c| c.is_library())
    }

    /// Free (non-error) function by name
    pub fn free_function(&self, name: &str) -> Option<&'a FunctionDecl> {
        self.functions
            .get(name)
            .copied()
            .filter(|f| !f.never_returns)
    }

    /// Custom error by name
    pub fn custom_error(&self, name: &str) -> Option<&CustomErrorMeta> {
        self.errors.get(name)
    }

    /// All custom errors, in declaration order
    pub fn custom_errors(&self) -> impl Iterator<Item = &CustomErrorMeta> {
        self.errors.values()
    }

    /// Event declaration by name
    pub fn event(&self, name: &str) -> Option<&'a EventDecl> {
        self.events.get(name).copied()
    }

    /// Resolve an event declaration, checking its indexed field count
    pub fn event_meta(&self, decl: &EventDecl) -> Result<EventMeta> {
        let mut fields = Vec::with_capacity(decl.fields.len());
        for f in &decl.fields {
            fields.push(EventFieldMeta {
                name: f.name.clone(),
                ty: self.resolve_type(&f.ty)?,
                indexed: f.indexed,
            });
        }
        let indexed = fields.iter().filter(|f| f.indexed).count();
        let max = EventMeta::max_indexed(decl.anonymous);
        if indexed > max {
            return Err(Error::TooManyIndexedFields {
                event: decl.name.clone(),
                count: indexed,
                max,
            });
        }
        let canonical = fields
            .iter()
            .map(|f| f.ty.canonical_name(self))
            .collect::<Result<Vec<_>>>()?;
        let signature = abi::signature(&decl.name, &canonical);
        Ok(EventMeta {
            name: decl.name.clone(),
            topic: abi::topic(&signature),
            signature,
            fields,
            anonymous: decl.anonymous,
        })
    }

    /// Value of an enum member
    pub fn enum_member(&self, enum_name: &str, member: &str) -> Option<u128> {
        self.enums
            .get(enum_name)?
            .iter()
            .position(|m| m == member)
            .map(|i| i as u128)
    }

    /// True if `name` is a declared enum
    pub fn is_enum(&self, name: &str) -> bool {
        self.enums.contains_key(name)
    }

    /// Struct layout by name
    pub fn struct_layout(&self, name: &str) -> Option<&StructLayout> {
        self.structs.get(name)
    }

    /// Struct layouts in dependency order
    pub fn struct_layouts(&self) -> impl Iterator<Item = &StructLayout> {
        self.structs.values()
    }

    /// True if `name` is a method-bearing interface or a non-library class
    pub fn is_contract(&self, name: &str) -> bool {
        self.interfaces.contains_key(name)
            || self.classes.get(name).map_or(false, |c| !c.is_library())
    }

    /// Method of an external contract (interface, or another class's public surface)
    pub fn contract_method(&self, contract: &str, method: &str) -> Result<ExternalMethod> {
        if let Some(iface) = self.interfaces.get(contract) {
            let decl = iface
                .methods
                .iter()
                .find(|m| m.name == method)
                .ok_or_else(|| unknown_method(contract, method))?;
            return self.external_method(decl);
        }
        if let Some(class) = self.classes.get(contract) {
            if let Some(decl) = self.class_method(class, method) {
                return self.external_method(decl);
            }
            if let Some(field) = class
                .fields
                .iter()
                .find(|f| f.name == method && f.visibility.is_external())
            {
                let ty = self.resolve_type(&field.ty)?;
                let (params, ret) = getter_shape(&ty);
                return self.external_signature(method, params, vec![ret], Mutability::View);
            }
            return Err(unknown_method(contract, method));
        }
        Err(Error::unresolved("interface", contract))
    }

    /// Public method of a class or one of its ancestors
    fn class_method(&self, class: &'a ClassDecl, method: &str) -> Option<&'a MethodDecl> {
        let mut current = Some(class);
        let mut guard = 0;
        while let Some(c) = current {
            if let Some(m) = c
                .methods
                .iter()
                .find(|m| m.name == method && m.visibility.is_external() && !m.is_static)
            {
                return Some(m);
            }
            current = match &c.heritage {
                Some(crate::ast::Heritage::Extends(parent)) => self.class(parent),
                Some(crate::ast::Heritage::Compose(parents)) => parents
                    .iter()
                    .rev()
                    .filter_map(|p| self.class(p))
                    .find_map(|p| self.class_method(p, method).map(|_| p)),
                None => None,
            };
            guard += 1;
            if guard > self.classes.len() {
                return None;
            }
        }
        None
    }

    fn external_method(&self, decl: &MethodDecl) -> Result<ExternalMethod> {
        let params = decl
            .params
            .iter()
            .map(|p| self.resolve_type(&p.ty))
            .collect::<Result<Vec<_>>>()?;
        let returns = decl
            .returns
            .iter()
            .map(|r| self.resolve_type(r))
            .collect::<Result<Vec<_>>>()?;
        self.external_signature(&decl.name, params, returns, decl.mutability)
    }

    fn external_signature(
        &self,
        name: &str,
        params: Vec<TypeDescriptor>,
        returns: Vec<TypeDescriptor>,
        mutability: Mutability,
    ) -> Result<ExternalMethod> {
        let canonical = params
            .iter()
            .map(|p| p.canonical_name(self))
            .collect::<Result<Vec<_>>>()?;
        let signature = abi::signature(name, &canonical);
        Ok(ExternalMethod {
            name: name.to_string(),
            selector: abi::selector(&signature),
            signature,
            params,
            returns,
            mutability,
        })
    }

    /// Libraries bound to a receiver type with `@using`, wildcard bindings last
    pub fn extensions_for(&self, ty: &TypeDescriptor) -> Vec<&str> {
        let mut libs: Vec<&str> = Vec::new();
        for key in [ty.describe(), "*".to_string()] {
            if let Some(bound) = self.extensions.get(&key) {
                libs.extend(bound.iter().map(String::as_str));
            }
        }
        libs
    }

    /// Number of extension bindings (type → libraries)
    pub fn extension_count(&self) -> usize {
        self.extensions.values().map(BTreeSet::len).sum()
    }
}

impl TypeNames for Catalog<'_> {
    fn named_type(&self, name: &str) -> Option<NamedType> {
        if let Some(members) = self.enums.get(name) {
            return Some(NamedType::Enum(members.len()));
        }
        if let Some(fields) = self.struct_decls.get(name) {
            return Some(NamedType::Struct(fields.clone()));
        }
        if let Some(underlying) = self.aliases.get(name) {
            return Some(NamedType::Alias(underlying.clone()));
        }
        if self.is_contract(name) {
            return Some(NamedType::Contract);
        }
        None
    }

    fn struct_slots(&self, name: &str) -> Option<u64> {
        self.structs.get(name).map(|s| s.slots)
    }
}

fn unknown_method(contract: &str, method: &str) -> Error {
    Error::UnknownMember {
        member: method.to_string(),
        on: format!("contract {}", contract),
    }
}

/// Structs whose size contributes to the size of `ty`
fn embedded_structs(ty: &TypeDescriptor) -> Vec<String> {
    match ty {
        TypeDescriptor::Struct(name) => vec![name.clone()],
        TypeDescriptor::Array(elem, Some(_)) => embedded_structs(elem),
        TypeDescriptor::Tuple(elems) => elems.iter().flat_map(embedded_structs).collect(),
        _ => Vec::new(),
    }
}

/// Getter parameters and returned type for a public field:
/// one key per mapping level, one index per array level
pub fn getter_shape(ty: &TypeDescriptor) -> (Vec<TypeDescriptor>, TypeDescriptor) {
    let mut params = Vec::new();
    let mut current = ty;
    loop {
        match current {
            TypeDescriptor::Mapping(key, value) => {
                params.push((**key).clone());
                current = value;
            }
            TypeDescriptor::Array(elem, _) => {
                params.push(TypeDescriptor::UInt(256));
                current = elem;
            }
            other => return (params, other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FieldDecl, InterfaceDecl, MethodDecl, Param};

    fn unit() -> SourceUnit {
        SourceUnit::new("main.ts")
            .with_enum("Status", &["Pending", "Active", "Closed"])
            .with_interface(
                InterfaceDecl::new("Order")
                    .field("maker", "address")
                    .field("price", "Price")
                    .field("legs", "Leg[2]"),
            )
            .with_interface(InterfaceDecl::new("Leg").field("amount", "u256").field("side", "u8"))
            .with_interface(
                InterfaceDecl::new("IERC20")
                    .method(
                        MethodDecl::new("transfer")
                            .param("to", "address")
                            .param("amount", "u256")
                            .returns("bool"),
                    )
                    .method(
                        MethodDecl::new("balanceOf")
                            .param("who", "address")
                            .returns("u256")
                            .mutability(Mutability::View),
                    ),
            )
            .with_type_alias("Price", "u128")
            .with_function(FunctionDecl::error(
                "InsufficientBalance",
                vec![Param::new("needed", "u256"), Param::new("available", "u256")],
            ))
            .with_class(
                ClassDecl::new("SafeMath").method(
                    MethodDecl::new("add")
                        .static_()
                        .param("a", "u256")
                        .param("b", "u256")
                        .returns("u256"),
                ),
            )
            .with_comment("// @using SafeMath for u256")
    }

    #[test]
    fn test_struct_layouts_are_dependency_ordered() {
        let u = unit();
        let catalog = Catalog::build(&u, &[]).unwrap();
        let order: Vec<&str> = catalog.struct_layouts().map(|s| s.name.as_str()).collect();
        assert_eq!(order, vec!["Leg", "Order"]);

        let order_layout = catalog.struct_layout("Order").unwrap();
        assert_eq!(order_layout.fields["maker"].offset_in_slots, 0);
        assert_eq!(order_layout.fields["price"].offset_in_slots, 1);
        assert_eq!(order_layout.fields["legs"].offset_in_slots, 2);
        assert_eq!(order_layout.slots, 6);
    }

    #[test]
    fn test_cyclic_struct_is_rejected() {
        let u = SourceUnit::new("main.ts")
            .with_interface(InterfaceDecl::new("A").field("b", "B"))
            .with_interface(InterfaceDecl::new("B").field("a", "A"));
        assert!(matches!(Catalog::build(&u, &[]), Err(Error::CyclicStruct(_))));
    }

    #[test]
    fn test_struct_behind_mapping_is_not_a_cycle() {
        let u = SourceUnit::new("main.ts").with_interface(
            InterfaceDecl::new("Node")
                .field("value", "u256")
                .field("children", "Mapping<u256, Node>"),
        );
        let catalog = Catalog::build(&u, &[]).unwrap();
        assert_eq!(catalog.struct_layout("Node").unwrap().slots, 2);
    }

    #[test]
    fn test_external_methods_and_errors() {
        let u = unit();
        let catalog = Catalog::build(&u, &[]).unwrap();
        let m = catalog.contract_method("IERC20", "transfer").unwrap();
        assert_eq!(abi::selector_hex(&m.selector), "0xa9059cbb");
        assert_eq!(m.returns, vec![TypeDescriptor::Bool]);

        let err = catalog.custom_error("InsufficientBalance").unwrap();
        assert_eq!(err.signature, "InsufficientBalance(uint256,uint256)");
        assert_eq!(catalog.enum_member("Status", "Closed"), Some(2));
        assert!(catalog.library("SafeMath").is_some());
        assert_eq!(catalog.extensions_for(&TypeDescriptor::UInt(256)), vec!["SafeMath"]);
    }

    #[test]
    fn test_imports() {
        let dep = SourceUnit::new("lib.ts")
            .with_enum("Side", &["Buy", "Sell"])
            .with_class(ClassDecl::new("Ownable").field(FieldDecl::new("owner", "address")));
        let main = SourceUnit::new("main.ts").with_import("lib.ts", &["Ownable"]);
        let deps = vec![dep];
        let catalog = Catalog::build(&main, &deps).unwrap();
        assert!(catalog.class("Ownable").is_some());
        assert!(!catalog.is_enum("Side"));

        let bad = SourceUnit::new("main.ts").with_import("lib.ts", &["Missing"]);
        assert!(matches!(
            Catalog::build(&bad, &deps),
            Err(Error::UnresolvedImport { .. })
        ));
        let missing = SourceUnit::new("main.ts").with_import("nope.ts", &[]);
        assert!(matches!(
            Catalog::build(&missing, &deps),
            Err(Error::UnresolvedImport { .. })
        ));
    }

    #[test]
    fn test_unknown_library_binding() {
        let u = SourceUnit::new("main.ts").with_comment("// @using Nope for u256");
        assert!(matches!(
            Catalog::build(&u, &[]),
            Err(Error::UnresolvedReference { kind: "library", .. })
        ));
    }

    #[test]
    fn test_getter_shape() {
        let ty = TypeDescriptor::Mapping(
            Box::new(TypeDescriptor::Address),
            Box::new(TypeDescriptor::Array(Box::new(TypeDescriptor::UInt(64)), None)),
        );
        let (params, ret) = getter_shape(&ty);
        assert_eq!(params, vec![TypeDescriptor::Address, TypeDescriptor::UInt(256)]);
        assert_eq!(ret, TypeDescriptor::UInt(64));
    }
}
