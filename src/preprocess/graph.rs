//! Call-syntax reachability over macro names.

use std::collections::{HashMap, HashSet};

/// Invocation context for code outside any late definition.
pub(crate) const ROOT: &str = "";

/// Directed edges from an invocation context (a macro name, or [`ROOT`]
/// for ordinary code) to the identifiers it textually invokes with call
/// syntax. Purely textual; no semantics attached.
#[derive(Debug, Default)]
pub struct CallGraph {
    edges: HashMap<String, HashSet<String>>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    /// Identifiers invoked directly from `context`.
    pub fn successors(&self, context: &str) -> HashSet<String> {
        self.edges.get(context).cloned().unwrap_or_default()
    }

    /// Names transitively reachable from `root`, including `root` itself.
    /// Explicit work-list traversal; macro bodies can nest arbitrarily
    /// deep, so recursion is off the table.
    pub fn reachable_from(&self, root: &str) -> HashSet<String> {
        let mut reachable = HashSet::new();
        let mut queue = vec![root.to_string()];
        while let Some(name) = queue.pop() {
            if reachable.insert(name.clone()) {
                if let Some(next) = self.edges.get(&name) {
                    queue.extend(next.iter().cloned());
                }
            }
        }
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &str)]) -> CallGraph {
        let mut g = CallGraph::new();
        for (from, to) in edges {
            g.add_edge(from, to);
        }
        g
    }

    #[test]
    fn test_reachability_is_transitive() {
        let g = graph(&[(ROOT, "A"), ("A", "B"), ("B", "C")]);
        let reachable = g.reachable_from(ROOT);
        assert!(reachable.contains("A"));
        assert!(reachable.contains("B"));
        assert!(reachable.contains("C"));
    }

    #[test]
    fn test_disconnected_nodes_are_not_reached() {
        let g = graph(&[(ROOT, "A"), ("X", "Y")]);
        let reachable = g.reachable_from(ROOT);
        assert!(reachable.contains("A"));
        assert!(!reachable.contains("X"));
        assert!(!reachable.contains("Y"));
    }

    #[test]
    fn test_cycles_terminate() {
        let g = graph(&[(ROOT, "A"), ("A", "B"), ("B", "A"), ("B", "B")]);
        let reachable = g.reachable_from(ROOT);
        assert!(reachable.contains("A"));
        assert!(reachable.contains("B"));
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let mut g = CallGraph::new();
        let names: Vec<String> = (0..10_000).map(|i| format!("m{i}")).collect();
        g.add_edge(ROOT, &names[0]);
        for pair in names.windows(2) {
            g.add_edge(&pair[0], &pair[1]);
        }
        let reachable = g.reachable_from(ROOT);
        assert!(reachable.contains("m9999"));
    }

    #[test]
    fn test_successors_are_direct_only() {
        let g = graph(&[(ROOT, "A"), ("A", "B")]);
        let direct = g.successors(ROOT);
        assert!(direct.contains("A"));
        assert!(!direct.contains("B"));
    }
}
