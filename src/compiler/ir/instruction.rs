//! IR statement and expression definitions

/// Literal value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Literal {
    /// Decimal or `0x` hex number, kept as text so 256-bit values survive
    Number(String),
    /// String literal (only valid as an argument of `datasize`/`dataoffset`)
    Str(String),
}

/// IR expression (direct-style: every operand is itself an expression)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    /// Literal constant
    Literal(Literal),
    /// Local variable or parameter
    Identifier(String),
    /// Builtin opcode or user/helper function call
    Call {
        /// Function or opcode name
        name: String,
        /// Arguments, evaluated right to left by the VM
        args: Vec<Expression>,
    },
}

impl Expression {
    /// Numeric literal from an integer
    pub fn num(value: u128) -> Self {
        Expression::Literal(Literal::Number(value.to_string()))
    }

    /// Numeric literal from text (decimal or hex)
    pub fn num_text(text: impl Into<String>) -> Self {
        Expression::Literal(Literal::Number(text.into()))
    }

    /// Hex literal from raw bytes
    pub fn hex(bytes: &[u8]) -> Self {
        Expression::Literal(Literal::Number(format!("0x{}", hex::encode(bytes))))
    }

    /// String literal
    pub fn str_lit(value: impl Into<String>) -> Self {
        Expression::Literal(Literal::Str(value.into()))
    }

    /// Identifier reference
    pub fn ident(name: impl Into<String>) -> Self {
        Expression::Identifier(name.into())
    }

    /// Call with arguments
    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::Call {
            name: name.into(),
            args,
        }
    }

    /// Numeric value if this is a decimal/hex literal that fits in u128
    pub fn as_u128(&self) -> Option<u128> {
        match self {
            Expression::Literal(Literal::Number(text)) => {
                if let Some(hex) = text.strip_prefix("0x") {
                    u128::from_str_radix(hex, 16).ok()
                } else {
                    text.parse().ok()
                }
            }
            _ => None,
        }
    }

    /// True if evaluating this expression cannot have side effects
    pub fn is_pure(&self) -> bool {
        match self {
            Expression::Literal(_) | Expression::Identifier(_) => true,
            Expression::Call { name, args } => {
                PURE_BUILTINS.contains(&name.as_str()) && args.iter().all(|a| a.is_pure())
            }
        }
    }
}

/// Builtins without side effects (reads are fine, they are not reordered past writes
/// by the lowering since operands are evaluated in place)
const PURE_BUILTINS: &[&str] = &[
    "add", "sub", "mul", "div", "sdiv", "mod", "smod", "exp", "not", "lt", "gt", "slt", "sgt",
    "eq", "iszero", "and", "or", "xor", "byte", "shl", "shr", "sar", "signextend", "caller",
    "callvalue", "calldataload", "calldatasize", "address", "origin", "timestamp", "number",
    "chainid", "gasprice", "coinbase", "prevrandao", "basefee", "gaslimit", "selfbalance",
    "mload", "sload", "tload",
];

/// Shorthand for `Expression::call` used throughout the lowering
pub fn call(name: &str, args: Vec<Expression>) -> Expression {
    Expression::call(name, args)
}

/// Shorthand for `Expression::ident`
pub fn ident(name: &str) -> Expression {
    Expression::ident(name)
}

/// Shorthand for `Expression::num`
pub fn num(value: u128) -> Expression {
    Expression::num(value)
}

/// Case of a switch statement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SwitchCase {
    /// Matched literal
    pub value: Literal,
    /// Case body
    pub body: Vec<Statement>,
}

/// Function definition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionDef {
    /// Function name
    pub name: String,
    /// Parameter names
    pub params: Vec<String>,
    /// Return variable names
    pub returns: Vec<String>,
    /// Body
    pub body: Vec<Statement>,
}

/// IR statement
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Statement {
    /// Nested scope
    Block(Vec<Statement>),
    /// Variable declaration: `let a, b := value`
    Let {
        /// Declared names
        names: Vec<String>,
        /// Optional initial value
        value: Option<Expression>,
    },
    /// Assignment: `a, b := value`
    Assign {
        /// Assigned names
        names: Vec<String>,
        /// Assigned value
        value: Expression,
    },
    /// Expression evaluated for its effects
    Expression(Expression),
    /// Conditional block (the IR has no else branch)
    If {
        /// Condition (nonzero = true)
        condition: Expression,
        /// Body
        body: Vec<Statement>,
    },
    /// Switch over literal cases
    Switch {
        /// Scrutinee
        expr: Expression,
        /// Cases in emission order
        cases: Vec<SwitchCase>,
        /// Default body
        default: Option<Vec<Statement>>,
    },
    /// Loop with init/condition/post regions
    For {
        /// Initializer region (its declarations are scoped to the loop)
        init: Vec<Statement>,
        /// Condition, evaluated before every iteration
        condition: Expression,
        /// Post-iteration region
        post: Vec<Statement>,
        /// Loop body
        body: Vec<Statement>,
    },
    /// Exit the innermost loop
    Break,
    /// Next iteration of the innermost loop
    Continue,
    /// Return from the current function
    Leave,
    /// Function definition
    FunctionDef(FunctionDef),
    /// Verbatim IR text
    Raw(String),
    /// Comment line
    Comment(String),
}

impl Statement {
    /// `let name := value`
    pub fn let_(name: impl Into<String>, value: Expression) -> Self {
        Statement::Let {
            names: vec![name.into()],
            value: Some(value),
        }
    }

    /// `name := value`
    pub fn assign(name: impl Into<String>, value: Expression) -> Self {
        Statement::Assign {
            names: vec![name.into()],
            value,
        }
    }

    /// Expression statement
    pub fn expr(e: Expression) -> Self {
        Statement::Expression(e)
    }

    /// `if condition { body }`
    pub fn if_(condition: Expression, body: Vec<Statement>) -> Self {
        Statement::If { condition, body }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_values() {
        assert_eq!(Expression::num_text("0xff").as_u128(), Some(255));
        assert_eq!(num(42).as_u128(), Some(42));
        assert_eq!(ident("x").as_u128(), None);
    }

    #[test]
    fn test_purity() {
        assert!(call("add", vec![ident("a"), num(1)]).is_pure());
        assert!(!call("sstore", vec![num(0), num(1)]).is_pure());
        assert!(!call("fun_transfer", vec![]).is_pure());
    }
}
