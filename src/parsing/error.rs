
use super::source::Span;

use thiserror::Error;

/// A syntax error in source text, with the span it was found at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at {span}")]
pub struct ParseError {
  pub message: String,
  pub span: Span,
}

impl ParseError {
  pub fn new(message: impl Into<String>, span: Span) -> Self {
    Self { message: message.into(), span }
  }
}
