//! Path-indexed rule collection.

use crate::config::RuleDefinition;
use std::collections::HashMap;
use std::sync::Arc;

/// Every configured rule, grouped by the path it is registered under.
///
/// Built once at startup and never mutated afterwards. Each group keeps the
/// relative order the rules were written in, which the selector relies on.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    by_path: HashMap<String, Arc<[RuleDefinition]>>,
}

impl RuleSet {
    /// Group rules by path, preserving configuration order within a path.
    pub fn new(rules: &[RuleDefinition]) -> Self {
        let mut grouped: HashMap<String, Vec<RuleDefinition>> = HashMap::new();
        for rule in rules {
            grouped
                .entry(rule.request.path.clone())
                .or_default()
                .push(rule.clone());
        }

        let by_path = grouped
            .into_iter()
            .map(|(path, rules)| (path, Arc::<[RuleDefinition]>::from(rules)))
            .collect();

        Self { by_path }
    }

    /// Rules registered under `path`, in configuration order.
    pub fn rules_for(&self, path: &str) -> Option<&Arc<[RuleDefinition]>> {
        self.by_path.get(path)
    }

    /// Iterate over `(path, rules)` groups.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<[RuleDefinition]>)> {
        self.by_path.iter().map(|(path, rules)| (path.as_str(), rules))
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}
