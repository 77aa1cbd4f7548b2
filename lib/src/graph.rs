//! The dependency graph: which outputs were produced from which inputs.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

/// A directed, acyclic edge set between resource paths.
///
/// An edge `a -> b` records that `b` was produced from `a`. Edges that would
/// close a cycle are refused.
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    edges: FxHashMap<Arc<Path>, Vec<Arc<Path>>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph::default()
    }

    /// Adds the edge `src -> dst`. Returns `false`, leaving the graph
    /// unchanged, if `dst` already reaches `src` or `src == dst`.
    pub fn add_edge<S, D>(&mut self, src: S, dst: D) -> bool
        where S: AsRef<Path>, D: AsRef<Path>
    {
        let (src, dst) = (src.as_ref(), dst.as_ref());
        if self.path_exists(dst, src) {
            return false;
        }

        let targets = self.edges.entry(src.into()).or_default();
        if !targets.iter().any(|t| &**t == dst) {
            targets.push(dst.into());
        }

        true
    }

    /// Drops every edge out of `src`, returning the old targets in insertion
    /// order.
    pub fn remove_edges_from<P: AsRef<Path>>(&mut self, src: P) -> Vec<PathBuf> {
        self.edges.remove(src.as_ref())
            .unwrap_or_default()
            .iter()
            .map(|p| p.to_path_buf())
            .collect()
    }

    /// Whether `b` is reachable from `a`. A path is always reachable from
    /// itself.
    pub fn path_exists<A, B>(&self, a: A, b: B) -> bool
        where A: AsRef<Path>, B: AsRef<Path>
    {
        let (a, b) = (a.as_ref(), b.as_ref());
        if a == b {
            return true;
        }

        let mut seen: FxHashSet<&Path> = FxHashSet::default();
        let mut queue: VecDeque<&Path> = VecDeque::new();
        queue.push_back(a);
        while let Some(node) = queue.pop_front() {
            for next in self.edges.get(node).into_iter().flatten() {
                if &**next == b {
                    return true;
                }

                if seen.insert(&**next) {
                    queue.push_back(&**next);
                }
            }
        }

        false
    }

    /// The paths directly produced from `src`.
    pub fn targets_of<P: AsRef<Path>>(&self, src: P) -> &[Arc<Path>] {
        self.edges.get(src.as_ref()).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// The paths `dst` was directly produced from.
    pub fn sources_of<P: AsRef<Path>>(&self, dst: P) -> Vec<&Path> {
        let dst = dst.as_ref();
        self.edges.iter()
            .filter(|(_, targets)| targets.iter().any(|t| &**t == dst))
            .map(|(src, _)| &**src)
            .collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|v| v.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_edge_is_rejected() {
        let mut graph = DependencyGraph::new();
        assert!(graph.add_edge("a", "b"));
        assert!(!graph.add_edge("b", "a"));
        assert!(graph.targets_of("b").is_empty());
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn transitive_cycles_and_self_loops_are_rejected() {
        let mut graph = DependencyGraph::new();
        assert!(graph.add_edge("a", "b"));
        assert!(graph.add_edge("b", "c"));
        assert!(!graph.add_edge("c", "a"));
        assert!(!graph.add_edge("c", "c"));
        assert!(graph.add_edge("a", "c"));
        assert!(graph.path_exists("a", "c"));
        assert!(!graph.path_exists("c", "a"));
    }

    #[test]
    fn duplicate_edges_collapse() {
        let mut graph = DependencyGraph::new();
        assert!(graph.add_edge("a", "b"));
        assert!(graph.add_edge("a", "b"));
        assert_eq!(graph.targets_of("a").len(), 1);
        assert_eq!(graph.sources_of("b"), [Path::new("a")]);
    }

    #[test]
    fn removing_edges_reopens_paths() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("src/[tag].md", "out/go");
        graph.add_edge("src/[tag].md", "out/rust");
        assert!(!graph.add_edge("out/go", "src/[tag].md"));

        let old = graph.remove_edges_from("src/[tag].md");
        assert_eq!(old, [PathBuf::from("out/go"), PathBuf::from("out/rust")]);
        assert!(graph.add_edge("out/go", "src/[tag].md"));
        assert!(graph.remove_edges_from("missing").is_empty());
    }
}
