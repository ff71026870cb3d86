//! Typed declaration tree consumed by the compiler.
//!
//! The front-end that turns source text into this tree is a separate
//! collaborator; the compiler only relies on the shapes below. Every node is
//! serde-serializable so a front-end in another process can hand the tree
//! over as JSON.
//!
//! Type annotations are kept as surface type text (`u256`,
//! `Mapping<address, u256>`, `Position[4]`) and resolved by the
//! [`TypeDescriptor`](crate::compiler::types::TypeDescriptor) parser.

mod expr;
mod stmt;

pub use expr::{AssignOp, BinaryOp, Expression, UnaryOp, UpdateOp};
pub use stmt::Statement;

use serde::{Deserialize, Serialize};

/// One compilation unit (a source file after parsing)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceUnit {
    /// Module path other units import this one by
    pub path: String,
    /// Imported declarations
    #[serde(default)]
    pub imports: Vec<Import>,
    /// Class declarations (contracts, and libraries when every method is static)
    #[serde(default)]
    pub classes: Vec<ClassDecl>,
    /// Interface declarations (structs when field-only, external contracts otherwise)
    #[serde(default)]
    pub interfaces: Vec<InterfaceDecl>,
    /// Enum declarations
    #[serde(default)]
    pub enums: Vec<EnumDecl>,
    /// Free function declarations (custom errors when returning the bottom type)
    #[serde(default)]
    pub functions: Vec<FunctionDecl>,
    /// User-defined value types
    #[serde(default)]
    pub type_aliases: Vec<TypeAliasDecl>,
    /// Raw comment lines, scanned for `@using Library for Type` bindings
    #[serde(default)]
    pub comments: Vec<String>,
}

impl SourceUnit {
    /// Create an empty unit
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            ..Default::default()
        }
    }

    /// Add a class
    pub fn with_class(mut self, class: ClassDecl) -> Self {
        self.classes.push(class);
        self
    }

    /// Add an interface
    pub fn with_interface(mut self, interface: InterfaceDecl) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Add an enum
    pub fn with_enum(mut self, name: &str, members: &[&str]) -> Self {
        self.enums.push(EnumDecl {
            name: name.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
        });
        self
    }

    /// Add a free function
    pub fn with_function(mut self, function: FunctionDecl) -> Self {
        self.functions.push(function);
        self
    }

    /// Add a user-defined value type
    pub fn with_type_alias(mut self, name: &str, underlying: &str) -> Self {
        self.type_aliases.push(TypeAliasDecl {
            name: name.to_string(),
            underlying: underlying.to_string(),
        });
        self
    }

    /// Add an import
    pub fn with_import(mut self, path: &str, names: &[&str]) -> Self {
        self.imports.push(Import {
            path: path.to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
        });
        self
    }

    /// Add a comment line
    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comments.push(comment.to_string());
        self
    }
}

/// Import of declarations from another unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    /// Path of the imported unit
    pub path: String,
    /// Imported names; empty imports everything
    #[serde(default)]
    pub names: Vec<String>,
}

/// Ancestor reference of a class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Heritage {
    /// `class A extends B`
    Extends(String),
    /// `class A extends Compose(B, C, D)`: parents linearized in listed order
    Compose(Vec<String>),
}

/// Class declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    /// Class name
    pub name: String,
    /// Optional ancestor reference
    pub heritage: Option<Heritage>,
    /// Field declarations in source order
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    /// Method declarations in source order
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
    /// Constructor, if declared
    pub constructor: Option<ConstructorDecl>,
    /// Event declarations
    #[serde(default)]
    pub events: Vec<EventDecl>,
    /// Abstract classes are never deployed on their own
    #[serde(default)]
    pub is_abstract: bool,
}

impl ClassDecl {
    /// Create an empty class
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// `extends parent`
    pub fn extends(mut self, parent: &str) -> Self {
        self.heritage = Some(Heritage::Extends(parent.to_string()));
        self
    }

    /// `extends Compose(parents...)`
    pub fn compose(mut self, parents: &[&str]) -> Self {
        self.heritage = Some(Heritage::Compose(
            parents.iter().map(|p| p.to_string()).collect(),
        ));
        self
    }

    /// Add a field
    pub fn field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a method
    pub fn method(mut self, method: MethodDecl) -> Self {
        self.methods.push(method);
        self
    }

    /// Set the constructor
    pub fn constructor(mut self, ctor: ConstructorDecl) -> Self {
        self.constructor = Some(ctor);
        self
    }

    /// Add an event
    pub fn event(mut self, event: EventDecl) -> Self {
        self.events.push(event);
        self
    }

    /// True when every method is static and there is no state: a library
    pub fn is_library(&self) -> bool {
        !self.methods.is_empty()
            && self.methods.iter().all(|m| m.is_static)
            && self.fields.iter().all(|f| f.storage == StorageClass::Constant)
            && self.constructor.is_none()
    }

    /// Look up a method by name
    pub fn find_method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// Storage class of a field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    /// Persistent storage (sload/sstore)
    #[default]
    Persistent,
    /// Transient storage (tload/tstore), cleared after each transaction
    Transient,
    /// Set once in the constructor, read-only afterwards
    Immutable,
    /// Compile-time literal constant, occupies no slot
    Constant,
}

/// Visibility of a field or method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    /// Callable externally and internally
    #[default]
    Public,
    /// Callable externally only
    External,
    /// Callable from this class and descendants
    Internal,
    /// Callable from this class only
    Private,
}

impl Visibility {
    /// True when the member is part of the external interface
    pub fn is_external(&self) -> bool {
        matches!(self, Visibility::Public | Visibility::External)
    }
}

/// Field declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    /// Field name
    pub name: String,
    /// Type text
    pub ty: String,
    /// Storage class modifier
    #[serde(default)]
    pub storage: StorageClass,
    /// Explicit slot pin (`@slot(5)`)
    #[serde(default)]
    pub slot: Option<u128>,
    /// Visibility (public fields get getters)
    #[serde(default = "private_visibility")]
    pub visibility: Visibility,
    /// Initializer expression
    pub initializer: Option<Expression>,
}

fn private_visibility() -> Visibility {
    Visibility::Private
}

impl FieldDecl {
    /// Private persistent field
    pub fn new(name: &str, ty: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.to_string(),
            storage: StorageClass::Persistent,
            slot: None,
            visibility: Visibility::Private,
            initializer: None,
        }
    }

    /// Make the field public
    pub fn public(mut self) -> Self {
        self.visibility = Visibility::Public;
        self
    }

    /// Pin to an explicit slot
    pub fn pinned(mut self, slot: u128) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Set the storage class
    pub fn storage(mut self, storage: StorageClass) -> Self {
        self.storage = storage;
        self
    }

    /// Set the initializer
    pub fn init(mut self, value: Expression) -> Self {
        self.initializer = Some(value);
        self
    }
}

/// State mutability of a method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutability {
    /// Accepts value
    Payable,
    /// Rejects value
    #[default]
    NonPayable,
    /// Reads state only
    View,
    /// Touches no state
    Pure,
}

impl Mutability {
    /// ABI `stateMutability` string
    pub fn as_abi_str(&self) -> &'static str {
        match self {
            Mutability::Payable => "payable",
            Mutability::NonPayable => "nonpayable",
            Mutability::View => "view",
            Mutability::Pure => "pure",
        }
    }
}

/// Special role of a method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodKind {
    /// Ordinary method
    #[default]
    Normal,
    /// Invoked when no selector matches
    Fallback,
    /// Invoked on plain value transfers with empty calldata
    Receive,
}

/// Parameter declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// Type text
    pub ty: String,
}

impl Param {
    /// Create a parameter
    pub fn new(name: &str, ty: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.to_string(),
        }
    }
}

/// Method declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    /// Method name
    pub name: String,
    /// Parameters in order
    #[serde(default)]
    pub params: Vec<Param>,
    /// Return types (more than one for tuple returns)
    #[serde(default)]
    pub returns: Vec<String>,
    /// Body; `None` for abstract/interface methods
    pub body: Option<Vec<Statement>>,
    /// Visibility
    #[serde(default)]
    pub visibility: Visibility,
    /// State mutability
    #[serde(default)]
    pub mutability: Mutability,
    /// Static methods belong to libraries
    #[serde(default)]
    pub is_static: bool,
    /// Declared overridable
    #[serde(default)]
    pub is_virtual: bool,
    /// Declared as an override
    #[serde(default)]
    pub is_override: bool,
    /// Special role
    #[serde(default)]
    pub kind: MethodKind,
}

impl MethodDecl {
    /// Public non-payable method with an empty body
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
            returns: Vec::new(),
            body: Some(Vec::new()),
            visibility: Visibility::Public,
            mutability: Mutability::NonPayable,
            is_static: false,
            is_virtual: false,
            is_override: false,
            kind: MethodKind::Normal,
        }
    }

    /// Add a parameter
    pub fn param(mut self, name: &str, ty: &str) -> Self {
        self.params.push(Param::new(name, ty));
        self
    }

    /// Add a return type
    pub fn returns(mut self, ty: &str) -> Self {
        self.returns.push(ty.to_string());
        self
    }

    /// Set the body
    pub fn body(mut self, body: Vec<Statement>) -> Self {
        self.body = Some(body);
        self
    }

    /// Set visibility
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Set mutability
    pub fn mutability(mut self, mutability: Mutability) -> Self {
        self.mutability = mutability;
        self
    }

    /// Mark as static (library method)
    pub fn static_(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Mark as fallback or receive
    pub fn kind(mut self, kind: MethodKind) -> Self {
        self.kind = kind;
        self
    }

    /// Remove the body (interface/abstract method)
    pub fn abstract_(mut self) -> Self {
        self.body = None;
        self
    }
}

/// Constructor declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstructorDecl {
    /// Parameters in order
    #[serde(default)]
    pub params: Vec<Param>,
    /// Body; `super(args)` calls run the parent constructor
    #[serde(default)]
    pub body: Vec<Statement>,
    /// Accepts value on deployment
    #[serde(default)]
    pub payable: bool,
}

impl ConstructorDecl {
    /// Constructor with the given parameters and body
    pub fn new(params: Vec<Param>, body: Vec<Statement>) -> Self {
        Self {
            params,
            body,
            payable: false,
        }
    }
}

/// Event field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventField {
    /// Field name
    pub name: String,
    /// Type text
    pub ty: String,
    /// Emitted as a topic
    #[serde(default)]
    pub indexed: bool,
}

/// Event declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDecl {
    /// Event name
    pub name: String,
    /// Ordered fields
    pub fields: Vec<EventField>,
    /// Anonymous events omit the signature topic
    #[serde(default)]
    pub anonymous: bool,
}

impl EventDecl {
    /// Non-anonymous event without fields
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            anonymous: false,
        }
    }

    /// Add a field
    pub fn field(mut self, name: &str, ty: &str, indexed: bool) -> Self {
        self.fields.push(EventField {
            name: name.to_string(),
            ty: ty.to_string(),
            indexed,
        });
        self
    }

    /// Mark anonymous
    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }
}

/// Interface declaration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceDecl {
    /// Interface name
    pub name: String,
    /// Fields (a field-only interface is a struct)
    #[serde(default)]
    pub fields: Vec<Param>,
    /// Methods (a method-bearing interface is an external contract)
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
}

impl InterfaceDecl {
    /// Create an empty interface
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Add a field
    pub fn field(mut self, name: &str, ty: &str) -> Self {
        self.fields.push(Param::new(name, ty));
        self
    }

    /// Add a method
    pub fn method(mut self, method: MethodDecl) -> Self {
        self.methods.push(method.abstract_());
        self
    }

    /// Field-only interfaces describe structs
    pub fn is_struct(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Enum declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    /// Enum name
    pub name: String,
    /// Members in declaration order (value = position)
    pub members: Vec<String>,
}

/// User-defined value type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeAliasDecl {
    /// Alias name
    pub name: String,
    /// Underlying elementary type text
    pub underlying: String,
}

/// Free function declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    /// Function name
    pub name: String,
    /// Parameters in order
    #[serde(default)]
    pub params: Vec<Param>,
    /// Return types
    #[serde(default)]
    pub returns: Vec<String>,
    /// Return type is the bottom type: a custom error declaration
    #[serde(default)]
    pub never_returns: bool,
    /// Body for ordinary functions
    #[serde(default)]
    pub body: Vec<Statement>,
}

impl FunctionDecl {
    /// Custom error declaration (`function Err(a: u256): never`)
    pub fn error(name: &str, params: Vec<Param>) -> Self {
        Self {
            name: name.to_string(),
            params,
            returns: Vec::new(),
            never_returns: true,
            body: Vec::new(),
        }
    }

    /// Ordinary free function
    pub fn new(name: &str, params: Vec<Param>, returns: Vec<String>, body: Vec<Statement>) -> Self {
        Self {
            name: name.to_string(),
            params,
            returns,
            never_returns: false,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_detection() {
        let lib = ClassDecl::new("SafeMath").method(MethodDecl::new("add").static_());
        assert!(lib.is_library());

        let contract = ClassDecl::new("Token")
            .field(FieldDecl::new("supply", "u256"))
            .method(MethodDecl::new("add").static_());
        assert!(!contract.is_library());
    }

    #[test]
    fn test_ast_json_round_trip() {
        let unit = SourceUnit::new("token.ts").with_class(
            ClassDecl::new("Token")
                .field(FieldDecl::new("owner", "address").public())
                .method(MethodDecl::new("owner_of").returns("address")),
        );
        let json = serde_json::to_string(&unit).unwrap();
        let back: SourceUnit = serde_json::from_str(&json).unwrap();
        assert_eq!(unit, back);
    }
}
