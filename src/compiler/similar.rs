//! Similar-software closure
//!
//! Similarity is undirected: if B lists A, A is similar to B too. Explicit
//! lists on every row are folded into one adjacency map, and the similar set
//! of a software is its connected component minus itself. An external entry
//! whose wikidata id belongs to a catalogued software is that software.

use crate::rows::{normalize_software_name, Rows, SimilarSoftwareRef};
use crate::types::SoftwareId;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::warn;

/// Node identity in the similarity graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SimilarNode {
    Software(SoftwareId),
    External(String),
}

/// Adjacency over all rows plus the components found so far in this pass
pub struct SimilarityGraph {
    adjacency: HashMap<SimilarNode, BTreeSet<SimilarNode>>,
    components: HashMap<SimilarNode, Arc<BTreeSet<SimilarNode>>>,
}

impl SimilarityGraph {
    pub fn build(rows: &Rows) -> Self {
        let by_name: HashMap<String, SoftwareId> = rows
            .software
            .iter()
            .map(|s| (normalize_software_name(&s.name), s.id))
            .collect();
        let by_wikidata: HashMap<&str, SoftwareId> = rows
            .software
            .iter()
            .filter_map(|s| s.wikidata_id.as_deref().map(|w| (w, s.id)))
            .collect();

        let mut adjacency: HashMap<SimilarNode, BTreeSet<SimilarNode>> = HashMap::new();
        for software in &rows.software {
            let from = SimilarNode::Software(software.id);
            for reference in &software.similar_software {
                let to = match reference {
                    SimilarSoftwareRef::InCatalog { software_name } => {
                        // Names that are not catalogued carry no identity
                        match by_name.get(&normalize_software_name(software_name)) {
                            Some(id) => SimilarNode::Software(*id),
                            None => {
                                warn!(
                                    software_id = software.id,
                                    software_name = %software_name,
                                    "Similar software names no catalogued software; edge dropped"
                                );
                                continue;
                            }
                        }
                    }
                    SimilarSoftwareRef::External { wikidata_id } => {
                        match by_wikidata.get(wikidata_id.as_str()) {
                            Some(id) => SimilarNode::Software(*id),
                            None => SimilarNode::External(wikidata_id.clone()),
                        }
                    }
                };
                if to == from {
                    continue;
                }
                adjacency.entry(from.clone()).or_default().insert(to.clone());
                adjacency.entry(to).or_default().insert(from.clone());
            }
        }

        Self {
            adjacency,
            components: HashMap::new(),
        }
    }

    /// Every node transitively similar to `software_id`, excluding itself
    pub fn closure(&mut self, software_id: SoftwareId) -> Vec<SimilarNode> {
        let start = SimilarNode::Software(software_id);
        let component = match self.components.get(&start) {
            Some(component) => Arc::clone(component),
            None => self.explore(&start),
        };
        component.iter().filter(|n| **n != start).cloned().collect()
    }

    fn explore(&mut self, start: &SimilarNode) -> Arc<BTreeSet<SimilarNode>> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        seen.insert(start.clone());
        queue.push_back(start.clone());

        while let Some(node) = queue.pop_front() {
            if let Some(neighbours) = self.adjacency.get(&node) {
                for next in neighbours {
                    if seen.insert(next.clone()) {
                        queue.push_back(next.clone());
                    }
                }
            }
        }

        let component = Arc::new(seen);
        for node in component.iter() {
            self.components.insert(node.clone(), Arc::clone(&component));
        }
        component
    }

    #[cfg(test)]
    fn memoized(&self, node: &SimilarNode) -> bool {
        self.components.contains_key(node)
    }
}
