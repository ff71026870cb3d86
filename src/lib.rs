//! # tsyul - contract classes to Yul IR
//!
//! A compiler back-end that turns classes of a typed, class-based contract
//! language into Yul-style IR objects for the EVM: a constructor region, a
//! deployed region with a selector dispatcher, and the ABI, event and error
//! metadata that go with them.
//!
//! ## Features
//!
//! - **Inheritance** - single and composed bases, linearized base first,
//!   with `super` calls to renamed parent implementations
//! - **Storage packing** - value fields share slots in declaration order,
//!   pinned slots, transient and immutable fields
//! - **External calls** - typed interface calls, low-level calls,
//!   `try`/`catch` and contract creation with `create`/`create2`
//! - **Deterministic output** - identical input produces byte-identical IR,
//!   checked by a SHA-256 fingerprint
//!
//! ## Quick Start
//!
//! The front-end that parses source text is a separate collaborator; the
//! compiler consumes its declaration tree (see [`ast`]):
//!
//! ```rust
//! use tsyul::ast::{ClassDecl, Expression, FieldDecl, MethodDecl, SourceUnit, Statement};
//! use tsyul::{CompileOptions, Compiler};
//!
//! # fn main() -> tsyul::Result<()> {
//! let unit = SourceUnit::new("counter.ts").with_class(
//!     ClassDecl::new("Counter")
//!         .field(FieldDecl::new("count", "u256").public())
//!         .method(MethodDecl::new("increment").body(vec![Statement::expr(
//!             Expression::post_inc(Expression::this_field("count")),
//!         )])),
//! );
//!
//! let compiler = Compiler::new(CompileOptions::default());
//! let result = compiler.compile(&unit, &[], "Counter")?;
//!
//! assert_eq!(result.function("increment").map(|f| f.signature.as_str()), Some("increment()"));
//! assert!(result.module.to_string().starts_with("object \"Counter\""));
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! | Stage | Module |
//! |-------|--------|
//! | Declaration index | [`compiler::catalog`] |
//! | Type resolution | [`compiler::types`] |
//! | Linearization | [`compiler::inheritance`] |
//! | Slot allocation | [`compiler::storage`] |
//! | Lowering | [`compiler::generator`] |
//! | Dispatch | [`compiler::dispatcher`] |
//! | Printing | [`compiler::debug`] |
//!
//! ## Error Handling
//!
//! Every compile-time failure is an [`Error`]; no partial IR is returned.
//! Failures of the compiled program (reverts, panics) are emitted into the
//! IR instead.

#![allow(clippy::too_many_arguments)]

/// Version of the tsyul compiler
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod ast;
pub mod compiler;
pub mod error;

// Re-export main types
pub use compiler::{CompileOptions, CompileResult, Compiler, EvmVersion, RevertStrings};
pub use error::{Error, Result};
