use std::collections::{BTreeSet, VecDeque};

use crate::ir::{Graph, Link, LinkIndex, NodeKind};

use super::{ClusterGroups, ClusterPhase, FanInType, GeneAndSatelliteCluster, LinkClass};
use crate::layout::error::{LayoutError, LayoutResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Owner {
    Core,
    FanIn,
    FanOut,
    External,
}

/// Genes anchor their own clusters and never become satellites.
fn satellite_eligible(graph: &Graph, id: &str) -> bool {
    graph.node(id).is_some_and(|n| n.kind != NodeKind::Gene)
}

impl GeneAndSatelliteCluster {
    /// Builds topology from a subgraph's link superset: fan-in is grown by
    /// closure over upstream nodes whose every target is already owned,
    /// fan-out over downstream nodes whose every source is owned.
    pub fn prep_from_remainders_phase_one(
        &mut self,
        graph: &Graph,
        subset: &BTreeSet<String>,
    ) -> LayoutResult<()> {
        self.require(ClusterPhase::Created)?;
        if graph.node(&self.core).is_none() {
            return Err(LayoutError::UnknownNode(self.core.clone()));
        }
        let index = LinkIndex::for_links(graph, subset.iter().map(String::as_str));
        self.fan_in = self.grow_fan_in(graph, &index);
        self.fan_out = self.grow_fan_out(graph, &index);
        self.finish_topology(graph, &index)
    }

    /// Builds topology from a supplied grouping, then repairs it: dead-end
    /// fan-out nodes move to fan-in and fan-in nodes that cannot reach the
    /// core move to fan-out, until nothing moves.
    pub fn prep_from_groups_phase_one(
        &mut self,
        graph: &Graph,
        groups: &ClusterGroups,
        subset: &BTreeSet<String>,
    ) -> LayoutResult<()> {
        self.require(ClusterPhase::Created)?;
        if groups.core != self.core {
            return Err(LayoutError::GroupMismatch {
                cluster: self.core.clone(),
                found: groups.core.clone(),
            });
        }
        for id in groups.fan_in.iter().chain(&groups.fan_out) {
            if graph.node(id).is_none() {
                return Err(LayoutError::UnknownNode(id.clone()));
            }
        }
        let index = LinkIndex::for_links(graph, subset.iter().map(String::as_str));
        self.fan_in = groups
            .fan_in
            .iter()
            .filter(|n| **n != self.core)
            .cloned()
            .collect();
        self.fan_out = groups
            .fan_out
            .iter()
            .filter(|n| **n != self.core && !self.fan_in.contains(*n))
            .cloned()
            .collect();
        self.regroup(graph, &index);
        self.finish_topology(graph, &index)
    }

    fn finish_topology(&mut self, graph: &Graph, index: &LinkIndex) -> LayoutResult<()> {
        self.classify_links(graph, index)?;
        self.fan_in_type = self.classify_fan_in(graph, index);
        tracing::debug!(
            cluster = %self.core,
            fan_in = self.fan_in.len(),
            fan_out = self.fan_out.len(),
            internal = self.internal.len(),
            inbound = self.inbound.len(),
            outbound = self.outbound.len(),
            feedback = self.feedback.len(),
            fan_in_type = ?self.fan_in_type,
            "cluster topology built"
        );
        self.advance(ClusterPhase::TopologyBuilt);
        Ok(())
    }

    fn grow_fan_in(&self, graph: &Graph, index: &LinkIndex) -> BTreeSet<String> {
        let mut fan_in: BTreeSet<String> = BTreeSet::new();
        loop {
            let candidates: BTreeSet<String> = std::iter::once(&self.core)
                .chain(&fan_in)
                .flat_map(|n| index.distinct_sources(graph, n))
                .collect();
            let mut added = false;
            for cand in candidates {
                if cand == self.core || fan_in.contains(&cand) || !satellite_eligible(graph, &cand) {
                    continue;
                }
                if !index.between(&self.core, &cand).is_empty() {
                    continue;
                }
                let targets = index.targets(graph, &cand);
                let owned = targets
                    .iter()
                    .all(|t| *t == self.core || *t == cand || fan_in.contains(t));
                if owned && targets.iter().any(|t| *t != cand) {
                    fan_in.insert(cand);
                    added = true;
                }
            }
            if !added {
                return fan_in;
            }
        }
    }

    fn grow_fan_out(&self, graph: &Graph, index: &LinkIndex) -> BTreeSet<String> {
        let mut fan_out: BTreeSet<String> = BTreeSet::new();
        loop {
            let candidates: BTreeSet<String> = std::iter::once(&self.core)
                .chain(&fan_out)
                .flat_map(|n| index.targets(graph, n))
                .collect();
            let mut added = false;
            for cand in candidates {
                if cand == self.core
                    || self.fan_in.contains(&cand)
                    || fan_out.contains(&cand)
                    || !satellite_eligible(graph, &cand)
                {
                    continue;
                }
                let owned = index
                    .distinct_sources(graph, &cand)
                    .iter()
                    .all(|s| *s == self.core || *s == cand || fan_out.contains(s));
                if owned {
                    fan_out.insert(cand);
                    added = true;
                }
            }
            if !added {
                return fan_out;
            }
        }
    }

    /// True when `start` reaches the core along links between owned nodes.
    pub(super) fn reaches_core(&self, graph: &Graph, index: &LinkIndex, start: &str) -> bool {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<String> = VecDeque::from([start.to_string()]);
        while let Some(node) = queue.pop_front() {
            if node == self.core {
                return true;
            }
            if !seen.insert(node.clone()) {
                continue;
            }
            for trg in index.targets(graph, &node) {
                if self.is_in_cluster(&trg) && !seen.contains(&trg) {
                    queue.push_back(trg);
                }
            }
        }
        false
    }

    fn regroup(&mut self, graph: &Graph, index: &LinkIndex) {
        // A node moves at most once, which bounds the closure.
        let mut moved: BTreeSet<String> = BTreeSet::new();
        loop {
            let dead_ends: Vec<String> = self
                .fan_out
                .iter()
                .filter(|n| !moved.contains(*n))
                .filter(|n| {
                    let fed = index
                        .distinct_sources(graph, n)
                        .iter()
                        .any(|s| *s == self.core || (s != *n && self.fan_out.contains(s)));
                    let targets = index.targets(graph, n);
                    !fed && !targets.is_empty()
                        && targets.iter().all(|t| self.is_in_cluster(t))
                        && self.reaches_core(graph, index, n)
                })
                .cloned()
                .collect();
            let strays: Vec<String> = self
                .fan_in
                .iter()
                .filter(|n| !moved.contains(*n))
                .filter(|n| {
                    let targets: BTreeSet<String> = index
                        .targets(graph, n)
                        .into_iter()
                        .filter(|t| t != *n)
                        .collect();
                    !targets.is_empty()
                        && targets.iter().all(|t| self.fan_out.contains(t))
                        && !targets.iter().any(|t| self.reaches_core(graph, index, t))
                })
                .cloned()
                .collect();
            if dead_ends.is_empty() && strays.is_empty() {
                return;
            }
            for node in dead_ends {
                tracing::debug!(cluster = %self.core, node = %node, "dead-end fan-out node moved to fan-in");
                self.fan_out.remove(&node);
                self.fan_in.insert(node.clone());
                moved.insert(node);
            }
            for node in strays {
                tracing::debug!(cluster = %self.core, node = %node, "fan-in node moved to fan-out");
                self.fan_in.remove(&node);
                self.fan_out.insert(node.clone());
                moved.insert(node);
            }
        }
    }

    fn owner(&self, node_id: &str) -> Owner {
        if node_id == self.core {
            Owner::Core
        } else if self.fan_in.contains(node_id) {
            Owner::FanIn
        } else if self.fan_out.contains(node_id) {
            Owner::FanOut
        } else {
            Owner::External
        }
    }

    fn link_class(&self, graph: &Graph, index: &LinkIndex, link: &Link) -> LayoutResult<LinkClass> {
        let src = self.owner(&link.src);
        let trg = self.owner(&link.trg);
        let class = match (src, trg) {
            _ if link.is_self_loop() => LinkClass::Feedback,
            (Owner::External, _) => LinkClass::Inbound,
            (_, Owner::External) => LinkClass::Outbound,
            (Owner::FanOut, Owner::Core | Owner::FanIn) => LinkClass::Outbound,
            (Owner::Core | Owner::FanIn, Owner::FanOut) => {
                if self.reaches_core(graph, index, &link.trg) {
                    LinkClass::Internal
                } else {
                    LinkClass::Outbound
                }
            }
            (Owner::FanIn, Owner::Core | Owner::FanIn) | (Owner::FanOut, Owner::FanOut) => {
                LinkClass::Internal
            }
            (Owner::Core, Owner::Core | Owner::FanIn) => {
                return Err(LayoutError::UnclassifiedLink {
                    cluster: self.core.clone(),
                    link: link.id.clone(),
                    src: link.src.clone(),
                    trg: link.trg.clone(),
                });
            }
        };
        Ok(class)
    }

    fn classify_links(&mut self, graph: &Graph, index: &LinkIndex) -> LayoutResult<()> {
        self.internal.clear();
        self.inbound.clear();
        self.outbound.clear();
        self.feedback.clear();
        self.large_scale_feedback.clear();
        self.penultimate.clear();
        self.inputs.clear();

        for link_id in index.links() {
            let Some(link) = graph.link(link_id) else {
                continue;
            };
            if !self.is_in_cluster(&link.src) && !self.is_in_cluster(&link.trg) {
                continue;
            }
            let class = self.link_class(graph, index, link)?;
            match class {
                LinkClass::Internal => {
                    self.internal.insert(link.id.clone());
                }
                LinkClass::Inbound => {
                    self.inputs.insert(link.src.clone());
                    if self.fan_in.contains(&link.trg) {
                        self.penultimate
                            .entry(link.trg.clone())
                            .or_default()
                            .insert(link.src.clone());
                    }
                    self.inbound.insert(link.id.clone());
                }
                LinkClass::Outbound => {
                    if self.fan_out.contains(&link.src)
                        && (link.trg == self.core || self.fan_in.contains(&link.trg))
                    {
                        self.large_scale_feedback.insert(link.id.clone());
                    }
                    self.outbound.insert(link.id.clone());
                }
                LinkClass::Feedback => {
                    self.feedback.insert(link.id.clone());
                }
            }
        }
        Ok(())
    }

    /// Decides the fan-in variant from fixed structural rules.
    pub fn classify_fan_in(&self, graph: &Graph, index: &LinkIndex) -> FanInType {
        if self.fan_in.is_empty() {
            return FanInType::NoFanIn;
        }
        let feeds_fan_out = self
            .fan_in
            .iter()
            .any(|n| index.targets(graph, n).iter().any(|t| self.fan_out.contains(t)));
        if feeds_fan_out {
            return FanInType::ComplexFanIn;
        }
        for link_id in &self.internal {
            let Some(link) = graph.link(link_id) else {
                continue;
            };
            if !self.fan_in.contains(&link.src) {
                continue;
            }
            if link.trg != self.core {
                return FanInType::ComplexFanIn;
            }
            let Some(node) = graph.node(&link.src) else {
                return FanInType::ComplexFanIn;
            };
            let inbound = index.inbound_count(&node.id);
            let eligible = node.kind.supports_simple_fan_in()
                && node.has_default_pads()
                && inbound <= 2
                && index.outbound_count(&node.id) <= 1
                && inbound <= index.distinct_sources(graph, &node.id).len();
            if !eligible {
                return FanInType::ComplexFanIn;
            }
        }
        FanInType::SimpleFanIn
    }
}
