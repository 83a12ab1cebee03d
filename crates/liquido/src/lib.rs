//! Liquido - Liquid-style template rendering over JSON data
//!
//! This crate provides:
//! - JSON document parsing into a [`Value`] tree
//! - A lazy template lexer and a recursive-descent parser producing an AST
//! - An expression evaluator with forgiving variable resolution
//! - A fixed, process-wide filter registry
//! - A renderer that walks the AST and produces text
//!
//! # Example
//!
//! ```
//! use liquido::{parse_document, Template};
//!
//! let data = parse_document(r#"{ "name": "Ann" }"#)?;
//! let template = Template::parse("Hello, {{ name }}!")?;
//! assert_eq!(template.render(&data)?, "Hello, Ann!");
//! # Ok::<(), liquido::TemplateError>(())
//! ```
//!
//! Hosts that only shuttle strings around (HTTP endpoints, editor glue) can use
//! [`render_document`], which never fails and reports errors as a
//! [`RenderOutcome`].

pub mod ast;
pub mod eval;
pub mod filters;
pub mod lexer;
mod options;
mod outcome;
pub mod parser;
mod renderer;
pub mod scope;
pub mod value;

pub use ast::AstNode;
pub use filters::FilterRegistry;
pub use lexer::{tokenize, Position};
pub use options::RenderOptions;
pub use outcome::{render_document, render_document_with, ErrorKind, RenderOutcome};
pub use parser::parse_template;
pub use renderer::{render, Renderer};
pub use serde_json::Value;
pub use value::{parse_document, value_to_string};

use thiserror::Error;

/// Errors raised while turning template source into an AST
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("unterminated tag `{delimiter}` starting at {position}")]
    UnterminatedTag {
        delimiter: &'static str,
        position: Position,
    },

    #[error("`{tag}` block opened at {position} is never closed")]
    UnclosedBlock { tag: String, position: Position },

    #[error(
        "unexpected `{tag}` at {position}{}",
        .expected.as_ref().map(|e| format!(" (expected `{e}`)")).unwrap_or_default()
    )]
    MismatchedBlock {
        tag: String,
        expected: Option<String>,
        position: Position,
    },

    #[error("unknown tag `{name}` at {position}")]
    UnknownTag { name: String, position: Position },

    #[error("unexpected {found} at {position}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: String,
        position: Position,
    },

    #[error("unexpected character `{found}` at {position}")]
    UnexpectedCharacter { found: char, position: Position },

    #[error("nesting deeper than {limit} levels at {position}")]
    NestingTooDeep { limit: usize, position: Position },
}

impl SyntaxError {
    /// Source position the error points at
    pub fn position(&self) -> Position {
        match self {
            SyntaxError::UnterminatedTag { position, .. }
            | SyntaxError::UnclosedBlock { position, .. }
            | SyntaxError::MismatchedBlock { position, .. }
            | SyntaxError::UnknownTag { position, .. }
            | SyntaxError::UnexpectedToken { position, .. }
            | SyntaxError::UnexpectedCharacter { position, .. }
            | SyntaxError::NestingTooDeep { position, .. } => *position,
        }
    }
}

/// Errors that can occur during template processing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Invalid document at {position}: {message}")]
    InvalidDocument { message: String, position: Position },

    #[error("Syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("Unknown filter `{name}` at {position}")]
    UnknownFilter { name: String, position: Position },

    #[error("Iteration limit of {limit} exceeded at {position}")]
    IterationLimitExceeded { limit: usize, position: Position },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TemplateError {
    /// Coarse error category exposed at the host boundary
    pub fn kind(&self) -> ErrorKind {
        match self {
            TemplateError::InvalidDocument { .. } => ErrorKind::InvalidDocument,
            TemplateError::Syntax(_) => ErrorKind::SyntaxError,
            TemplateError::UnknownFilter { .. } => ErrorKind::UnknownFilter,
            TemplateError::IterationLimitExceeded { .. } => ErrorKind::IterationLimitExceeded,
            TemplateError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// Position in the template (or document) the error refers to, if any
    pub fn position(&self) -> Option<Position> {
        match self {
            TemplateError::InvalidDocument { position, .. }
            | TemplateError::UnknownFilter { position, .. }
            | TemplateError::IterationLimitExceeded { position, .. } => Some(*position),
            TemplateError::Syntax(err) => Some(err.position()),
            TemplateError::Internal(_) => None,
        }
    }
}

/// Result type for template operations
pub type Result<T> = std::result::Result<T, TemplateError>;

/// A parsed template, ready to be rendered against any number of documents
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<AstNode>,
    options: RenderOptions,
}

impl Template {
    /// Parse template source with default options
    pub fn parse(source: &str) -> Result<Self> {
        Self::parse_with(source, RenderOptions::default())
    }

    /// Parse template source; `options` also govern later renders
    pub fn parse_with(source: &str, options: RenderOptions) -> Result<Self> {
        let nodes = parse_template(source, &options)?;
        Ok(Self { nodes, options })
    }

    /// Top-level AST nodes
    pub fn nodes(&self) -> &[AstNode] {
        &self.nodes
    }

    /// Options this template renders with
    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Render the template against a data document
    pub fn render(&self, data: &Value) -> Result<String> {
        Renderer::new(&self.options).render(&self.nodes, data)
    }
}

/// Parse the document, parse the template, and render
///
/// The document is parsed first, so a request with both a malformed document
/// and a malformed template reports the document error.
pub fn render_str(document_text: &str, template_text: &str, options: &RenderOptions) -> Result<String> {
    let data = parse_document(document_text)?;
    let template = Template::parse_with(template_text, options.clone())?;
    template.render(&data)
}
