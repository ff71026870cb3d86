use super::expr::Expression;
use serde::{Deserialize, Serialize};

/// Statements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// Local declaration: `let x: T = init` or `const [a, b] = f()`
    VarDecl {
        /// Declared names (more than one for tuple destructuring)
        names: Vec<String>,
        /// Optional declared type text (single-name declarations only)
        ty: Option<String>,
        /// Optional initializer
        init: Option<Expression>,
    },

    /// Expression statement
    Expression(Expression),

    /// If statement
    If {
        /// Condition expression to evaluate
        condition: Expression,
        /// Statements to execute if condition is true
        then_branch: Vec<Statement>,
        /// Optional statements to execute if condition is false
        else_branch: Option<Vec<Statement>>,
    },

    /// While loop
    While {
        /// Loop condition expression
        condition: Expression,
        /// Statements to execute in loop body
        body: Vec<Statement>,
    },

    /// Do-while loop (body runs at least once)
    DoWhile {
        /// Statements to execute in loop body
        body: Vec<Statement>,
        /// Condition checked after each iteration
        condition: Expression,
    },

    /// C-style for loop
    For {
        /// Initializer (declaration or expression statement)
        init: Option<Box<Statement>>,
        /// Loop condition, absent means always true
        condition: Option<Expression>,
        /// Step expression
        update: Option<Expression>,
        /// Statements to execute in loop body
        body: Vec<Statement>,
    },

    /// Break statement
    Break,

    /// Continue statement
    Continue,

    /// Return statement
    Return(Option<Expression>),

    /// Nested block
    Block(Vec<Statement>),

    /// Block whose arithmetic is not overflow checked
    Unchecked(Vec<Statement>),

    /// Event emission: `emit Transfer(from, to, amount)`
    Emit {
        /// Event name
        event: String,
        /// Positional field values
        args: Vec<Expression>,
    },

    /// `throw ErrorName(args)` or `throw "message"`
    Throw(Expression),

    /// Guarded external call block
    Try {
        /// Guarded statements; the first one containing an external call is the guarded call
        body: Vec<Statement>,
        /// Optional binding for the failure returndata
        catch_binding: Option<String>,
        /// Statements to execute when the call fails
        catch_body: Vec<Statement>,
    },
}

impl Statement {
    /// `let name = init`
    pub fn let_(name: &str, init: Expression) -> Self {
        Statement::VarDecl {
            names: vec![name.to_string()],
            ty: None,
            init: Some(init),
        }
    }

    /// `let name: ty = init`
    pub fn let_typed(name: &str, ty: &str, init: Option<Expression>) -> Self {
        Statement::VarDecl {
            names: vec![name.to_string()],
            ty: Some(ty.to_string()),
            init,
        }
    }

    /// `return value`
    pub fn ret(value: Expression) -> Self {
        Statement::Return(Some(value))
    }

    /// Expression statement
    pub fn expr(e: Expression) -> Self {
        Statement::Expression(e)
    }

    /// `if (condition) { then_branch }`
    pub fn if_(condition: Expression, then_branch: Vec<Statement>) -> Self {
        Statement::If {
            condition,
            then_branch,
            else_branch: None,
        }
    }

    /// `if (condition) { then_branch } else { else_branch }`
    pub fn if_else(
        condition: Expression,
        then_branch: Vec<Statement>,
        else_branch: Vec<Statement>,
    ) -> Self {
        Statement::If {
            condition,
            then_branch,
            else_branch: Some(else_branch),
        }
    }

    /// `emit event(args)`
    pub fn emit(event: &str, args: Vec<Expression>) -> Self {
        Statement::Emit {
            event: event.to_string(),
            args,
        }
    }
}
