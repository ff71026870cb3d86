use serde::{Deserialize, Serialize};
use std::fmt;

/// Expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    // Literals
    /// Integer literal, kept as source text (`42`, `0xff`, `1_000`, `1e18`, `10n`)
    Number(String),
    /// Boolean literal expression
    Bool(bool),
    /// String literal expression
    Str(String),
    /// Hex byte string literal (`hex"deadbeef"`), without the `0x` prefix
    HexBytes(String),

    // Names
    /// Variable, parameter, enum, library or builtin reference
    Identifier(String),
    /// The current contract instance
    This,
    /// Explicit reference to the parent implementation (`super.method()`)
    Super,

    /// Member access expression (object.property)
    Member {
        /// Object being accessed
        object: Box<Expression>,
        /// Name of the member
        property: String,
    },

    /// Index access expression (object\[index\])
    Index {
        /// Mapping, array or bytes value being indexed
        object: Box<Expression>,
        /// Index or key expression
        index: Box<Expression>,
    },

    /// Call expression
    Call {
        /// Callee expression (identifier, member, super member)
        callee: Box<Expression>,
        /// Positional arguments
        args: Vec<Expression>,
    },

    /// Contract creation (`new Token(args)`)
    New {
        /// Name of the class being deployed
        class: String,
        /// Constructor arguments
        args: Vec<Expression>,
        /// Optional value forwarded to the new contract
        value: Option<Box<Expression>>,
        /// Optional salt, selects create2
        salt: Option<Box<Expression>>,
    },

    /// Binary operation expression
    Binary {
        /// Binary operator to apply
        op: BinaryOp,
        /// Left operand expression
        left: Box<Expression>,
        /// Right operand expression
        right: Box<Expression>,
    },

    /// Unary operation expression
    Unary {
        /// Unary operator to apply
        op: UnaryOp,
        /// Operand expression
        operand: Box<Expression>,
    },

    /// Increment/decrement (`x++`, `--x`)
    Update {
        /// Increment or decrement
        op: UpdateOp,
        /// True for the prefix form
        prefix: bool,
        /// Assignable target
        target: Box<Expression>,
    },

    /// Assignment (`=`, `+=`, ...)
    Assign {
        /// Assignment operator
        op: AssignOp,
        /// Assignable target (or a tuple of targets for `=`)
        target: Box<Expression>,
        /// Assigned value
        value: Box<Expression>,
    },

    /// Ternary conditional expression
    Conditional {
        /// Condition expression to evaluate
        condition: Box<Expression>,
        /// Expression to evaluate if condition is true
        then_expr: Box<Expression>,
        /// Expression to evaluate if condition is false
        else_expr: Box<Expression>,
    },

    /// Tuple expression (`[a, b]` on either side of a destructuring assignment)
    Tuple(Vec<Expression>),

    /// Array literal expression
    ArrayLiteral(Vec<Expression>),

    /// Struct literal with named fields
    ObjectLiteral {
        /// Struct name when known from context (`{...} as Position`)
        type_name: Option<String>,
        /// Field initializers in source order
        fields: Vec<(String, Expression)>,
    },

    /// Explicit conversion (`x as u8`, `address(x)`)
    Cast {
        /// Converted expression
        expr: Box<Expression>,
        /// Target type text
        ty: String,
    },
}

impl Expression {
    /// Integer literal from a Rust integer
    pub fn num(value: u128) -> Self {
        Expression::Number(value.to_string())
    }

    /// Identifier reference
    pub fn ident(name: &str) -> Self {
        Expression::Identifier(name.to_string())
    }

    /// String literal
    pub fn string(value: &str) -> Self {
        Expression::Str(value.to_string())
    }

    /// `this.<field>`
    pub fn this_field(field: &str) -> Self {
        Expression::This.member(field)
    }

    /// `<self>.<property>`
    pub fn member(self, property: &str) -> Self {
        Expression::Member {
            object: Box::new(self),
            property: property.to_string(),
        }
    }

    /// `<self>[index]`
    pub fn index(self, index: Expression) -> Self {
        Expression::Index {
            object: Box::new(self),
            index: Box::new(index),
        }
    }

    /// `<self>(args)`
    pub fn call(self, args: Vec<Expression>) -> Self {
        Expression::Call {
            callee: Box::new(self),
            args,
        }
    }

    /// `<self>.<method>(args)`
    pub fn method(self, method: &str, args: Vec<Expression>) -> Self {
        self.member(method).call(args)
    }

    /// Binary expression
    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Unary expression
    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        Expression::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Plain assignment
    pub fn assign(target: Expression, value: Expression) -> Self {
        Expression::Assign {
            op: AssignOp::Assign,
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    /// Compound assignment (`+=`, `-=`, ...)
    pub fn compound(op: AssignOp, target: Expression, value: Expression) -> Self {
        Expression::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    /// Postfix increment
    pub fn post_inc(target: Expression) -> Self {
        Expression::Update {
            op: UpdateOp::Increment,
            prefix: false,
            target: Box::new(target),
        }
    }

    /// Explicit conversion
    pub fn cast(self, ty: &str) -> Self {
        Expression::Cast {
            expr: Box::new(self),
            ty: ty.to_string(),
        }
    }

    /// `new Class(args)`
    pub fn new_contract(class: &str, args: Vec<Expression>) -> Self {
        Expression::New {
            class: class.to_string(),
            args,
            value: None,
            salt: None,
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    /// Addition operator (+), also string concatenation
    Add,
    /// Subtraction operator (-)
    Sub,
    /// Multiplication operator (*)
    Mul,
    /// Division operator (/)
    Div,
    /// Modulo operator (%)
    Mod,
    /// Power operator (**)
    Pow,

    // Bitwise
    /// Bitwise AND (&)
    BitAnd,
    /// Bitwise OR (|)
    BitOr,
    /// Bitwise XOR (^)
    BitXor,
    /// Left shift (<<)
    Shl,
    /// Right shift (>>)
    Shr,

    // Comparison
    /// Equality operator (==, ===)
    Eq,
    /// Inequality operator (!=, !==)
    NotEq,
    /// Less than operator (<)
    Lt,
    /// Greater than operator (>)
    Gt,
    /// Less than or equal operator (<=)
    LtEq,
    /// Greater than or equal operator (>=)
    GtEq,

    // Logical
    /// Short-circuit logical AND (&&)
    And,
    /// Short-circuit logical OR (||)
    Or,
}

impl BinaryOp {
    /// True for operators producing a boolean
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::LtEq
                | BinaryOp::GtEq
                | BinaryOp::And
                | BinaryOp::Or
        )
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Negation operator (-x)
    Neg,
    /// Logical NOT operator (!x)
    Not,
    /// Bitwise NOT operator (~x)
    BitNot,
    /// Reset a storage location to its zero value (`delete x`)
    Delete,
}

/// Increment / decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOp {
    /// `++`
    Increment,
    /// `--`
    Decrement,
}

/// Assignment operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `+=`
    Add,
    /// `-=`
    Sub,
    /// `*=`
    Mul,
    /// `/=`
    Div,
    /// `%=`
    Mod,
    /// `&=`
    BitAnd,
    /// `|=`
    BitOr,
    /// `^=`
    BitXor,
    /// `<<=`
    Shl,
    /// `>>=`
    Shr,
}

impl AssignOp {
    /// Binary operator a compound assignment desugars into
    pub fn binary_op(&self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Mod => Some(BinaryOp::Mod),
            AssignOp::BitAnd => Some(BinaryOp::BitAnd),
            AssignOp::BitOr => Some(BinaryOp::BitOr),
            AssignOp::BitXor => Some(BinaryOp::BitXor),
            AssignOp::Shl => Some(BinaryOp::Shl),
            AssignOp::Shr => Some(BinaryOp::Shr),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::LtEq => "<=",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::BitNot => write!(f, "~"),
            UnaryOp::Delete => write!(f, "delete "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_shapes() {
        let e = Expression::this_field("balances").index(Expression::ident("owner"));
        match e {
            Expression::Index { object, index } => {
                assert_eq!(*object, Expression::This.member("balances"));
                assert_eq!(*index, Expression::ident("owner"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_compound_desugar_op() {
        assert_eq!(AssignOp::Add.binary_op(), Some(BinaryOp::Add));
        assert_eq!(AssignOp::Assign.binary_op(), None);
        assert!(BinaryOp::LtEq.is_comparison());
        assert!(!BinaryOp::Shl.is_comparison());
    }
}
