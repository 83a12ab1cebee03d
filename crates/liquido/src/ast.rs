//! Template syntax tree

use serde_json::Value;

use crate::lexer::Position;

/// A node of a parsed template. Each node owns its children.
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    /// Text copied to the output as-is
    TextLiteral(String),

    /// `{{ expression }}`
    Output {
        expression: Expression,
        position: Position,
    },

    /// `{% for variable in iterable %} ... {% endfor %}`
    ForLoop(ForLoop),

    /// `{% if %}`, `{% unless %}` and `{% case %}` all lower to this node.
    /// `elsif` and later `when` arms are tried in order once `condition`
    /// fails, before `else_branch`.
    If {
        condition: Expression,
        then_branch: Vec<AstNode>,
        alternatives: Vec<Branch>,
        else_branch: Vec<AstNode>,
        position: Position,
    },

    /// `{% assign name = expression %}`
    Assign {
        name: String,
        expression: Expression,
        position: Position,
    },

    /// `{% capture name %} ... {% endcapture %}`
    Capture {
        name: String,
        body: Vec<AstNode>,
        position: Position,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub variable: String,
    pub iterable: Expression,
    pub body: Vec<AstNode>,
    /// Rendered instead of `body` when there is nothing to iterate
    pub else_body: Vec<AstNode>,
    pub reversed: bool,
    pub limit: Option<Expression>,
    pub offset: Option<Expression>,
    pub position: Position,
}

/// One `elsif` or `when` arm
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub condition: Expression,
    pub body: Vec<AstNode>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Dotted/bracketed variable path, e.g. `user.tags[0]`
    VariableRef(Vec<PathSegment>),

    Literal(Value),

    /// `base | name: args | name ...`, applied left to right
    FilterChain {
        base: Box<Expression>,
        filters: Vec<FilterCall>,
    },

    BinaryOp {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// Truthiness negation, produced by `unless`
    Not(Box<Expression>),

    /// Inclusive integer range `(start..end)`
    Range {
        start: Box<Expression>,
        end: Box<Expression>,
        position: Position,
    },
}

impl Expression {
    /// Single-segment variable reference
    pub fn variable(name: impl Into<String>) -> Self {
        Expression::VariableRef(vec![PathSegment::Field(name.into())])
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Expression::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Join operands of an associative operator (`and`, `or`) into a
    /// balanced tree, so long chains stay shallow. Operands keep their
    /// left-to-right order.
    pub fn balanced(op: BinaryOp, mut operands: Vec<Expression>) -> Option<Self> {
        if operands.len() <= 1 {
            return operands.pop();
        }
        let right = operands.split_off(operands.len() / 2);
        Some(Expression::binary(
            op,
            Expression::balanced(op, operands)?,
            Expression::balanced(op, right)?,
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Field(String),
    Index(i64),
    /// `[expression]` whose value picks a key or index at render time
    Lookup(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<Expression>,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Contains,
    And,
    Or,
}

impl BinaryOp {
    /// Comparison operator for an operator token's text
    pub fn from_operator(text: &str) -> Option<Self> {
        match text {
            "==" => Some(BinaryOp::Eq),
            "!=" | "<>" => Some(BinaryOp::Ne),
            "<" => Some(BinaryOp::Lt),
            ">" => Some(BinaryOp::Gt),
            "<=" => Some(BinaryOp::Le),
            ">=" => Some(BinaryOp::Ge),
            _ => None,
        }
    }
}
