use serde::Serialize;
use std::collections::BTreeMap;

use super::cluster::GeneAndSatelliteCluster;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DropDirection {
    /// Leave over the top of the cluster (target laid out earlier).
    Up,
    /// Leave under the bottom of the cluster (target laid out later).
    Down,
}

/// Answers which way an outbound trace leaves a cluster, based on where its
/// target's cluster sits in the layout sequence.
///
/// Siblings are held by core id, so a copied cluster set only needs
/// [`DropDirectionOracle::reattach`] to point at the copies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DropDirectionOracle {
    order: BTreeMap<String, usize>,
    owner: BTreeMap<String, String>,
}

impl DropDirectionOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(clusters: &[GeneAndSatelliteCluster]) -> Self {
        let mut oracle = Self::new();
        oracle.reattach(clusters);
        oracle
    }

    /// Re-points the oracle at `clusters`, e.g. after the whole set was
    /// cloned for a placement trial.
    pub fn reattach(&mut self, clusters: &[GeneAndSatelliteCluster]) {
        self.order.clear();
        self.owner.clear();
        for (idx, cluster) in clusters.iter().enumerate() {
            self.order.insert(cluster.core_id().to_string(), idx);
            for node in cluster.all_nodes_in_cluster() {
                self.owner
                    .entry(node)
                    .or_insert_with(|| cluster.core_id().to_string());
            }
        }
        tracing::debug!(clusters = clusters.len(), nodes = self.owner.len(), "drop oracle attached");
    }

    pub fn is_attached(&self) -> bool {
        !self.order.is_empty()
    }

    pub fn cluster_of(&self, node_id: &str) -> Option<&str> {
        self.owner.get(node_id).map(String::as_str)
    }

    pub fn position(&self, core_id: &str) -> Option<usize> {
        self.order.get(core_id).copied()
    }

    pub fn direction(&self, from_core: &str, target: &str) -> DropDirection {
        let from = self.position(from_core);
        let to = self.cluster_of(target).and_then(|core| self.position(core));
        match (from, to) {
            (Some(from), Some(to)) if to <= from => DropDirection::Up,
            _ => DropDirection::Down,
        }
    }
}

/// Attaches one freshly built oracle to every cluster in the set.
pub fn reattach_all(clusters: &mut [GeneAndSatelliteCluster]) {
    let oracle = DropDirectionOracle::attach(clusters);
    for cluster in clusters.iter_mut() {
        cluster.set_drop_oracle(oracle.clone());
    }
}
