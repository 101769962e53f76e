use mapharvest_core::types::normalize_name;
use std::collections::HashSet;

/// In-memory identity sets for one stage run.
///
/// An identity is (normalized name, canonical link). A match on either
/// component counts as already seen.
#[derive(Debug, Default)]
pub struct DedupIndex {
    names: HashSet<String>,
    links: HashSet<String>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, name: &str, link: &str) -> bool {
        let name = normalize_name(name);
        (!name.is_empty() && self.names.contains(&name)) || self.links.contains(link)
    }

    pub fn record(&mut self, name: &str, link: &str) {
        let name = normalize_name(name);
        if !name.is_empty() {
            self.names.insert(name);
        }
        self.links.insert(link.to_string());
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_either_component_is_a_duplicate() {
        let mut index = DedupIndex::new();
        let mut kept = Vec::new();
        for (name, link) in [("Acme Textiles", "A"), ("acme textiles", "B"), ("Beta Co", "A")] {
            if index.seen(name, link) {
                continue;
            }
            index.record(name, link);
            kept.push((name, link));
        }
        assert_eq!(kept, vec![("Acme Textiles", "A")]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_blank_names_do_not_collide() {
        let mut index = DedupIndex::new();
        index.record("  ", "A");
        assert!(!index.seen("", "B"));
        assert!(index.seen("", "A"));
    }
}
