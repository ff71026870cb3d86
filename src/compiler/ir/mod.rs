//! # Intermediate Representation (IR)
//!
//! The compiler's output contract: a Yul-style tree of statements and
//! expressions grouped into a constructor region and a deployed region.
//!
//! ## Module Structure
//!
//! ```text
//! ir/
//! ├── mod.rs          # This file - module definition and re-exports
//! ├── instruction.rs  # Literal, Expression, Statement, FunctionDef
//! └── program.rs      # IrModule, DeployedObject
//! ```
//!
//! Expressions are direct-style: operands are nested expressions, never
//! registers. Statements that must run before an expression's value is
//! available are emitted into the enclosing block by the lowering engine.
//! There is no `else`; two-way branches are built from two `if`s.

mod instruction;
mod program;

pub use instruction::{
    call, ident, num, Expression, FunctionDef, Literal, Statement, SwitchCase,
};
pub use program::{deployed_name, DeployedObject, IrModule};
