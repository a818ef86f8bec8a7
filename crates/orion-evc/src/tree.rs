//! EVC tree and trial view (spec §3 "EVC Node", §4.4).

use orion_adapters::AdapterChain;
use orion_trial::{hash_params, Trial};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct EvcNode {
    pub experiment_id: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    /// Adapter chain on this node's inbound edge; empty for the root
    /// (spec §3 invariant).
    pub inbound: AdapterChain,
}

/// One experiment's place in the EVC DAG, as stored (spec §3 Experiment's
/// `refers` tuple).
#[derive(Debug, Clone)]
pub struct Refers {
    pub root_id: String,
    pub parent_id: Option<String>,
    pub adapter_chain: AdapterChain,
}

/// DAG of experiment versions, built lazily from storage (spec §4.4).
#[derive(Debug, Clone, Default)]
pub struct EvcTree {
    nodes: HashMap<String, EvcNode>,
    root_id: Option<String>,
}

impl EvcTree {
    /// Builds the tree given every experiment's `(id, refers)` pair sharing
    /// a root (spec §4.4: "walks `refers.parent_id` until root, then
    /// descends to enumerate siblings").
    pub fn build(experiments: &[(String, Refers)]) -> Self {
        let mut nodes = HashMap::new();
        let mut root_id = None;
        for (id, refers) in experiments {
            nodes.insert(
                id.clone(),
                EvcNode {
                    experiment_id: id.clone(),
                    parent: refers.parent_id.clone(),
                    children: Vec::new(),
                    inbound: refers.adapter_chain.clone(),
                },
            );
            root_id.get_or_insert_with(|| refers.root_id.clone());
        }
        let child_edges: Vec<(String, String)> = nodes
            .values()
            .filter_map(|n| n.parent.clone().map(|p| (p, n.experiment_id.clone())))
            .collect();
        for (parent, child) in child_edges {
            if let Some(parent_node) = nodes.get_mut(&parent) {
                parent_node.children.push(child);
            }
        }
        Self { nodes, root_id }
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&EvcNode> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn root_id(&self) -> Option<&str> {
        self.root_id.as_deref()
    }

    /// The composed adapter chain along the path from `from` to `to`,
    /// ascending through parents then descending through children. Returns
    /// `None` if the two nodes are not connected in this tree.
    #[must_use]
    pub fn path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if from == to {
            return Some(vec![from.to_owned()]);
        }
        let ancestors_of = |mut id: String| -> Vec<String> {
            let mut chain = vec![id.clone()];
            while let Some(node) = self.nodes.get(&id) {
                match &node.parent {
                    Some(parent) => {
                        chain.push(parent.clone());
                        id = parent.clone();
                    }
                    None => break,
                }
            }
            chain
        };
        let from_chain = ancestors_of(from.to_owned());
        let to_chain = ancestors_of(to.to_owned());
        let common = from_chain.iter().find(|id| to_chain.contains(id))?;
        let up: Vec<String> = from_chain.iter().take_while(|id| *id != common).cloned().chain(std::iter::once(common.clone())).collect();
        let mut down: Vec<String> = to_chain.iter().take_while(|id| *id != common).cloned().collect();
        down.reverse();
        Some(up.into_iter().chain(down).collect())
    }

    /// `fetch_trials_from_tree(leaf)` (spec §4.4): the union of `leaf`'s own
    /// trials plus every ancestor/descendant's trials after running them
    /// through the composed adapter chain to `leaf`. Deduplicates by
    /// `hash_params`, preferring `leaf`'s own copy.
    #[must_use]
    pub fn fetch_trials_from_tree(
        &self,
        leaf: &str,
        trials_by_experiment: &HashMap<String, Vec<Trial>>,
    ) -> Vec<Trial> {
        let mut by_hash: HashMap<String, Trial> = HashMap::new();

        for (experiment_id, trials) in trials_by_experiment {
            let Some(path) = self.path(experiment_id, leaf) else { continue };
            let adapted = self.adapt_along_path(trials, &path);
            for trial in adapted {
                let hash = hash_params(&trial.params);
                if experiment_id == leaf {
                    by_hash.insert(hash, trial);
                } else {
                    by_hash.entry(hash).or_insert(trial);
                }
            }
        }

        by_hash.into_values().collect()
    }

    fn adapter_chain_between(&self, a: &str, b: &str) -> Option<AdapterChain> {
        // `b`'s inbound chain transforms `b`'s parent-view into `b`'s
        // child-view; used only for direct parent-child edges.
        let node = self.nodes.get(b)?;
        if node.parent.as_deref() == Some(a) {
            Some(node.inbound.clone())
        } else {
            let node_a = self.nodes.get(a)?;
            if node_a.parent.as_deref() == Some(b) {
                Some(node_a.inbound.clone())
            } else {
                None
            }
        }
    }

    fn adapt_along_path(&self, trials: &[Trial], path: &[String]) -> Vec<Trial> {
        let mut frontier = trials.to_vec();
        for window in path.windows(2) {
            let (a, b) = (&window[0], &window[1]);
            let Some(chain) = self.adapter_chain_between(a, b) else { continue };
            let going_down = self.nodes.get(b).is_some_and(|n| n.parent.as_deref() == Some(a.as_str()));
            frontier = frontier
                .iter()
                .flat_map(|t| if going_down { chain.forward(t) } else { chain.backward(t) })
                .collect();
            if frontier.is_empty() {
                break;
            }
        }
        frontier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orion_adapters::Adapter;
    use orion_trial::Param;
    use orion_types::{ParamKind, Value};

    fn trial(id_param: f64) -> Trial {
        Trial::new("root", vec![Param { name: "a".into(), kind: ParamKind::Real, value: Value::Real(id_param) }])
    }

    #[test]
    fn build_links_parent_and_children() {
        let refers_root = Refers { root_id: "root".into(), parent_id: None, adapter_chain: AdapterChain::default() };
        let refers_child = Refers {
            root_id: "root".into(),
            parent_id: Some("root".into()),
            adapter_chain: AdapterChain::new(vec![Adapter::DimensionRenaming { old: "a".into(), new: "b".into() }]),
        };
        let tree = EvcTree::build(&[("root".into(), refers_root), ("child".into(), refers_child)]);
        assert_eq!(tree.root_id(), Some("root"));
        assert_eq!(tree.node("root").unwrap().children, vec!["child".to_owned()]);
        assert!(tree.node("child").unwrap().inbound.0.len() == 1);
    }

    #[test]
    fn fetch_trials_from_tree_dedupes_preferring_leaf() {
        let refers_root = Refers { root_id: "root".into(), parent_id: None, adapter_chain: AdapterChain::default() };
        let refers_child = Refers { root_id: "root".into(), parent_id: Some("root".into()), adapter_chain: AdapterChain::default() };
        let tree = EvcTree::build(&[("root".into(), refers_root), ("child".into(), refers_child)]);

        let mut trials = HashMap::new();
        trials.insert("root".to_owned(), vec![trial(1.0)]);
        trials.insert("child".to_owned(), vec![trial(1.0)]);

        let fetched = tree.fetch_trials_from_tree("child", &trials);
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].experiment_id, "child");
    }

    #[test]
    fn fetch_trials_from_tree_filters_via_adapter() {
        let refers_root = Refers { root_id: "root".into(), parent_id: None, adapter_chain: AdapterChain::default() };
        let refers_child = Refers {
            root_id: "root".into(),
            parent_id: Some("root".into()),
            adapter_chain: AdapterChain::new(vec![Adapter::DimensionPriorChange {
                name: "a".into(),
                new_prior: orion_space::Prior::parse("uniform(0,1)").unwrap(),
            }]),
        };
        let tree = EvcTree::build(&[("root".into(), refers_root), ("child".into(), refers_child)]);

        let mut trials = HashMap::new();
        trials.insert("root".to_owned(), vec![trial(5.0)]); // outside [0,1]

        let fetched = tree.fetch_trials_from_tree("child", &trials);
        assert!(fetched.is_empty());
    }
}
