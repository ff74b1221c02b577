
/// The recoverable problems collected while a pass runs. Nothing in
/// the list stops the pass; the caller inspects it once the pass is
/// done.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorList<E> {
  errors: Vec<E>,
}

impl<E> ErrorList<E> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, error: E) {
    self.errors.push(error)
  }

  /// Pushes `error` unless an equal one was already reported.
  pub fn push_once(&mut self, error: E)
  where E: PartialEq {
    if !self.errors.contains(&error) {
      self.errors.push(error);
    }
  }

  /// Moves every error from `other` onto the end of `self`.
  pub fn append(&mut self, other: &mut Self) {
    self.errors.append(&mut other.errors)
  }

  pub fn is_empty(&self) -> bool {
    self.errors.is_empty()
  }

  pub fn len(&self) -> usize {
    self.errors.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, E> {
    self.errors.iter()
  }

  pub fn into_vec(self) -> Vec<E> {
    self.errors
  }
}

impl<E> IntoIterator for ErrorList<E> {
  type Item = E;
  type IntoIter = std::vec::IntoIter<E>;

  fn into_iter(self) -> Self::IntoIter {
    self.errors.into_iter()
  }
}

impl<'a, E> IntoIterator for &'a ErrorList<E> {
  type Item = &'a E;
  type IntoIter = std::slice::Iter<'a, E>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

impl<E> Default for ErrorList<E> {
  fn default() -> Self {
    Self { errors: Vec::new() }
  }
}

impl<E> Extend<E> for ErrorList<E> {
  fn extend<I: IntoIterator<Item = E>>(&mut self, iter: I) {
    self.errors.extend(iter)
  }
}

impl<E> FromIterator<E> for ErrorList<E> {
  fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
    Self { errors: iter.into_iter().collect() }
  }
}
