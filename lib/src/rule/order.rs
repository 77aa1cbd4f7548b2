use std::collections::BTreeSet;
use std::path::Path;

use crate::rule::Capabilities;

/// The coarse overlap test between a dependency pattern and a production
/// pattern: equal extensions, or either pattern containing the other.
pub fn overlaps(a: &str, b: &str) -> bool {
    fn ext(pattern: &str) -> Option<&str> {
        Path::new(pattern).extension().and_then(|e| e.to_str())
    }

    matches!((ext(a), ext(b)), (Some(x), Some(y)) if x == y) || a.contains(b) || b.contains(a)
}

/// Orders rules so that a rule producing what another depends on comes
/// first. Returns indices into `rules`.
///
/// Among rules free to go next, the earliest declared goes first, so rules
/// without declared dependencies keep their declaration order. If the
/// dependencies form a cycle, declaration order is returned as-is.
pub fn order(rules: &[(&str, &Capabilities)]) -> Vec<usize> {
    let n = rules.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![vec![]; n];

    for (x, (_, producer)) in rules.iter().enumerate() {
        for (y, (_, consumer)) in rules.iter().enumerate() {
            if x == y {
                continue;
            }

            let feeds = consumer.depends_on.iter()
                .any(|dep| producer.produces.iter().any(|prod| overlaps(dep, prod)));

            if feeds {
                dependents[x].push(y);
                in_degree[y] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted = Vec::with_capacity(n);
    while let Some(i) = ready.pop_first() {
        sorted.push(i);
        for &j in &dependents[i] {
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.insert(j);
            }
        }
    }

    if sorted.len() != n {
        let names: Vec<_> = rules.iter().map(|(name, _)| *name).collect();
        tracing::warn!(rules = ?names, "rule dependencies form a cycle; using declaration order");
        return (0..n).collect();
    }

    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(depends_on: &[&str], produces: &[&str]) -> Capabilities {
        Capabilities {
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            produces: produces.iter().map(|s| s.to_string()).collect(),
            ..Capabilities::default()
        }
    }

    #[test]
    fn overlap_heuristic() {
        assert!(overlaps("**/*.css", "*.css"));
        assert!(overlaps("data", "data/items.json"));
        assert!(!overlaps("*.css", "*.html"));
        assert!(!overlaps("styles", "scripts"));
    }

    #[test]
    fn no_dependencies_keeps_declaration_order() {
        let (a, b, c) = (caps(&[], &[]), caps(&[], &[]), caps(&[], &[]));
        let rules = [("a", &a), ("b", &b), ("c", &c)];
        assert_eq!(order(&rules), [0, 1, 2]);
    }

    #[test]
    fn producers_come_first() {
        let page = caps(&["*.css"], &["*.html"]);
        let feed = caps(&["*.html"], &["feed.xml"]);
        let sass = caps(&["*.scss"], &["*.css"]);
        let rules = [("feed", &feed), ("page", &page), ("sass", &sass)];
        assert_eq!(order(&rules), [2, 1, 0]);
    }

    #[test]
    fn cycles_fall_back_to_declaration_order() {
        let a = caps(&["*.b"], &["*.a"]);
        let b = caps(&["*.a"], &["*.b"]);
        let c = caps(&[], &["*.c"]);
        let rules = [("c", &c), ("a", &a), ("b", &b)];
        assert_eq!(order(&rules), [0, 1, 2]);
    }
}
