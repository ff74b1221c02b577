
use std::fmt::{self, Display, Formatter};
use std::ops::Add;

/// A byte position in parsed source text, used for error reporting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceOffset(pub usize);

/// A half-open range of source offsets: `start` is included and `end`
/// is not.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Span {
  pub start: SourceOffset,
  pub end: SourceOffset,
}

impl Span {
  pub fn new(start: SourceOffset, end: SourceOffset) -> Self {
    Self { start, end }
  }

  /// The empty span at `pos`.
  pub fn at(pos: SourceOffset) -> Self {
    Self::new(pos, pos)
  }

  /// The smallest span covering both `self` and `other`.
  pub fn to(self, other: Span) -> Span {
    Span::new(self.start.min(other.start), self.end.max(other.end))
  }
}

impl Add<usize> for SourceOffset {
  type Output = Self;

  fn add(self, rhs: usize) -> Self::Output {
    Self(self.0 + rhs)
  }
}

impl Display for SourceOffset {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl Display for Span {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.start, self.end)
  }
}
