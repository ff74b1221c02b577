
//! The side table of helper definitions introduced while optimizing
//! one compilation unit.

use crate::ast::HelperDefinition;
use crate::ast::walker::free_call_names;

use log::{debug, warn};

use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub struct HelperEntry {
  pub definition: HelperDefinition,
  /// Set once a rewrite that calls this helper has been accepted.
  pub referenced: bool,
}

/// Helper definitions, deduplicated by structure, in registration
/// order.
#[derive(Debug, Clone, Default)]
pub struct HelperTable {
  entries: Vec<HelperEntry>,
}

impl HelperTable {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn contains(&self, definition: &HelperDefinition) -> bool {
    self.entries.iter().any(|e| e.definition == *definition)
  }

  pub fn entries(&self) -> &[HelperEntry] {
    &self.entries
  }

  pub fn definitions(&self) -> impl Iterator<Item = &HelperDefinition> {
    self.entries.iter().map(|e| &e.definition)
  }

  /// Adds `definition` unless an identical one is present, and marks
  /// it referenced. Returns false if a different definition already
  /// occupies the same overload, in which case the table is unchanged.
  pub fn register(&mut self, definition: HelperDefinition) -> bool {
    if let Some(entry) = self.entries.iter_mut().find(|e| e.definition.signature_matches(&definition)) {
      if entry.definition != definition {
        warn!("Conflicting definitions for helper {}", definition.name);
        return false;
      }
      entry.referenced = true;
      return true;
    }
    debug!("Registered helper {}", definition.name);
    self.entries.push(HelperEntry { definition, referenced: true });
    true
  }

  /// Keeps only the helpers reachable from `roots`, the names called by
  /// the rewritten code, directly or through other helpers. Returns the
  /// names of the helpers removed.
  pub fn prune(&mut self, roots: &HashSet<String>) -> Vec<String> {
    let mut reachable: HashSet<String> = HashSet::new();
    let mut pending: Vec<String> = roots.iter().cloned().collect();
    while let Some(name) = pending.pop() {
      if !reachable.insert(name.clone()) {
        continue;
      }
      for entry in self.entries.iter().filter(|e| e.definition.name == name) {
        for stmt in &entry.definition.body {
          for expr in stmt.expressions() {
            pending.extend(free_call_names(expr));
          }
        }
      }
    }
    let mut removed = Vec::new();
    for entry in &mut self.entries {
      entry.referenced = reachable.contains(&entry.definition.name);
      if !entry.referenced {
        removed.push(entry.definition.name.clone());
      }
    }
    self.entries.retain(|e| e.referenced);
    for name in &removed {
      debug!("Pruned unreferenced helper {name}");
    }
    removed
  }

  pub fn into_definitions(self) -> Vec<HelperDefinition> {
    self.entries.into_iter().map(|e| e.definition).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parsing::parse_helper;

  fn helper(source: &str) -> HelperDefinition {
    parse_helper(source).unwrap()
  }

  #[test]
  fn test_register_deduplicates() {
    let mut table = HelperTable::new();
    assert!(table.register(helper("static double Sq(double x) => x * x;")));
    assert!(table.register(helper("static double Sq(double x) => x * x;")));
    assert!(table.register(helper("static float Sq(float x) => x * x;")));
    assert_eq!(table.len(), 2);
    assert!(!table.register(helper("static double Sq(double x) => x + x;")));
    assert_eq!(table.len(), 2);
  }

  #[test]
  fn test_prune_follows_helper_calls() {
    let mut table = HelperTable::new();
    table.register(helper("static double A(double x) => x;"));
    table.register(helper("static double B(double x) => A(x) + 1.0;"));
    table.register(helper("static double C(double x) => x * 2.0;"));
    let roots = HashSet::from(["B".to_owned()]);
    let removed = table.prune(&roots);
    assert_eq!(removed, vec!["C".to_owned()]);
    let names = table.definitions().map(|d| d.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["A", "B"]);
    assert!(table.entries().iter().all(|e| e.referenced));
  }
}
