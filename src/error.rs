//! Error types for the tsyul compiler
//!
//! Every variant is a compile-time failure: it aborts the compilation of the
//! class and no partial IR is returned. Failures of the compiled program
//! (reverts, panics, invalid) are emitted into the IR instead and never show
//! up here.

use thiserror::Error;

/// Compiler errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Storage layout errors
    /// Two classes in the inheritance chain declare the same storage field
    ///
    /// **Triggered by:** Composition of parents that both declare `owner`, or a
    /// child redeclaring a parent's field
    #[error("Duplicate storage field `{name}` declared by both {first} and {second}")]
    DuplicateStorageField {
        /// Field name
        name: String,
        /// Class that declared it first
        first: String,
        /// Class that declared it again
        second: String,
    },

    /// Two fields pinned to the same slot
    #[error("Slot {slot} is pinned by both `{first}` and `{second}`")]
    DuplicateSlotPin {
        /// Pinned slot number
        slot: u128,
        /// First field claiming the slot
        first: String,
        /// Second field claiming the slot
        second: String,
    },

    /// A pin inside the range reserved for immutables
    #[error("Slot pin {slot} on `{field}` is inside the reserved immutable range")]
    ReservedSlotPin {
        /// Pinned slot number
        slot: u128,
        /// Field name
        field: String,
    },

    // Resolution errors
    /// Ancestor named in `extends`/`Compose` not found
    #[error("Unresolved ancestor `{name}` of class {class}")]
    UnresolvedAncestor {
        /// Missing ancestor
        name: String,
        /// Class referencing it
        class: String,
    },

    /// Class inherits from itself
    #[error("Cyclic inheritance through class {0}")]
    CyclicInheritance(String),

    /// Imported unit or name not found
    #[error("Unresolved import `{name}` from `{path}`")]
    UnresolvedImport {
        /// Import path
        path: String,
        /// Imported name (empty when the unit itself is missing)
        name: String,
    },

    /// Referenced library, interface, struct, event or error not found
    #[error("Unresolved {kind} `{name}`")]
    UnresolvedReference {
        /// Kind of declaration ("library", "interface", "event", ...)
        kind: &'static str,
        /// Referenced name
        name: String,
    },

    /// Class to compile not found in the unit
    #[error("Class `{0}` not found")]
    ClassNotFound(String),

    /// Identifier not bound in the current scope
    #[error("Undefined identifier `{name}` in {function}")]
    UndefinedIdentifier {
        /// Identifier
        name: String,
        /// Function being lowered
        function: String,
    },

    /// Member not available on the value
    #[error("Unknown member `{member}` on {on}")]
    UnknownMember {
        /// Member name
        member: String,
        /// Description of the receiver
        on: String,
    },

    // Type errors
    /// Type text could not be parsed
    #[error("Malformed type `{text}`: {reason}")]
    MalformedType {
        /// Offending type text
        text: String,
        /// What is wrong with it
        reason: String,
    },

    /// Integer or bytes width outside the legal range
    #[error("Invalid width {width} for `{text}`")]
    InvalidWidth {
        /// Offending type text
        text: String,
        /// Parsed width
        width: u32,
    },

    /// Structs embed each other in a cycle
    #[error("Cyclic struct embedding involving {0}")]
    CyclicStruct(String),

    /// Mismatched argument count at a call site
    #[error("`{callee}` expects {expected} argument(s), got {got}")]
    ArityMismatch {
        /// Called function, event or error
        callee: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        got: usize,
    },

    // Lowering errors
    /// `super.method()` without a parent implementation
    #[error("No parent implementation of `{method}` above class {class}")]
    MissingSuperImplementation {
        /// Class containing the super call
        class: String,
        /// Method name
        method: String,
    },

    /// Literal index at or past the end of a fixed array
    #[error("Index {index} out of bounds for `{name}` of size {size}")]
    IndexOutOfBounds {
        /// Field or variable name
        name: String,
        /// Literal index
        index: u128,
        /// Declared array size
        size: u64,
    },

    /// `try` block without an external call
    #[error("Guarded block in {0} contains no external call")]
    TryWithoutCall(String),

    /// Event declares more indexed fields than topics allow
    #[error("Event {event} has {count} indexed fields, at most {max} allowed")]
    TooManyIndexedFields {
        /// Event name
        event: String,
        /// Indexed field count
        count: usize,
        /// Maximum for this event kind
        max: usize,
    },

    /// Transient storage used on a target without tload/tstore
    #[error("Transient field `{0}` requires the cancun target")]
    TransientUnsupported(String),

    /// Assignment to a constant, or to an immutable outside the constructor
    #[error("Cannot assign to {kind} `{name}`")]
    ReadOnlyAssignment {
        /// "constant" or "immutable"
        kind: &'static str,
        /// Field name
        name: String,
    },

    /// Expression is not an assignable location
    #[error("Invalid assignment target in {0}")]
    InvalidAssignmentTarget(String),

    /// Construct the lowering does not handle
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Configuration could not be parsed
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// General compiler error
    #[error("Compiler error: {0}")]
    CompilerError(String),
}

impl Error {
    /// Create a compiler error with a message
    pub fn compiler(msg: impl Into<String>) -> Self {
        Error::CompilerError(msg.into())
    }

    /// Create an unsupported-construct error with a message
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Create an unresolved-reference error
    pub fn unresolved(kind: &'static str, name: impl Into<String>) -> Self {
        Error::UnresolvedReference {
            kind,
            name: name.into(),
        }
    }
}

/// Result type for tsyul operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_offender() {
        let err = Error::DuplicateSlotPin {
            slot: 5,
            first: "a".into(),
            second: "b".into(),
        };
        assert_eq!(err.to_string(), "Slot 5 is pinned by both `a` and `b`");

        let err = Error::unresolved("library", "SafeMath");
        assert_eq!(err.to_string(), "Unresolved library `SafeMath`");
    }
}
