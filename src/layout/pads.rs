use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{Link, Node, NodeKind, Orientation};

use super::Point;
use super::error::{LayoutError, LayoutResult};

/// Launch and landing pad chosen for one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PadResult {
    pub launch: usize,
    pub landing: usize,
}

impl PadResult {
    pub fn new(launch: usize, landing: usize) -> Self {
        Self { launch, landing }
    }

    pub fn of(link: &Link) -> Self {
        Self {
            launch: link.launch_pad,
            landing: link.landing_pad,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PadSide {
    Left,
    Top,
    Right,
}

/// First landing pad on the top edge; non-gene pad 0 sits on the left edge.
pub fn first_top_pad(kind: NodeKind) -> usize {
    if kind.has_left_pad() { 1 } else { 0 }
}

pub fn landing_side(kind: NodeKind, pad: usize) -> PadSide {
    if kind.has_left_pad() && pad == 0 {
        PadSide::Left
    } else {
        PadSide::Top
    }
}

/// Absolute landing point of `pad` on a node whose upper-left is `origin`.
///
/// `capacity` is the pad count after any growth, which also widens
/// growable glyphs.
pub fn landing_anchor(node: &Node, capacity: usize, pad: usize, origin: Point) -> (PadSide, Point) {
    let (w, h) = node.footprint_for(capacity);
    let side = landing_side(node.kind, pad);
    let point = match (node.kind, side) {
        (_, PadSide::Left) => (origin.0, origin.1 + h / 2.0),
        (NodeKind::Gene, _) => {
            let slot = crate::ir::GLYPH_PAD_WIDTH;
            (origin.0 + slot + pad as f32 * slot + slot / 2.0, origin.1)
        }
        _ => {
            let top_pads = capacity.saturating_sub(1).max(1) as f32;
            let k = pad.saturating_sub(1) as f32;
            (origin.0 + w * (k + 0.5) / top_pads, origin.1)
        }
    };
    (side, point)
}

/// Launch point: all links from a source leave its right edge.
pub fn launch_anchor(node: &Node, capacity: usize, origin: Point) -> Point {
    let (w, h) = node.footprint_for(capacity);
    (origin.0 + w, origin.1 + h / 2.0)
}

/// Pad assignments with per-node usage and capacity growth.
///
/// Used both as a cluster-local plan and as the map shared across clusters.
/// Commits follow "first committer wins": a later writer only replaces an
/// existing assignment when it owns the link's source node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PadLedger {
    assignments: BTreeMap<String, PadResult>,
    committed_by: BTreeMap<String, String>,
    landing_used: BTreeMap<String, BTreeMap<usize, BTreeSet<String>>>,
    capacity: BTreeMap<String, usize>,
}

impl PadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, link_id: &str) -> Option<PadResult> {
        self.assignments.get(link_id).copied()
    }

    pub fn contains(&self, link_id: &str) -> bool {
        self.assignments.contains_key(link_id)
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn assignments(&self) -> impl Iterator<Item = (&str, PadResult)> {
        self.assignments.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn committer(&self, link_id: &str) -> Option<&str> {
        self.committed_by.get(link_id).map(String::as_str)
    }

    pub fn capacity(&self, node: &Node) -> usize {
        self.capacity
            .get(&node.id)
            .copied()
            .unwrap_or(node.pad_count)
            .max(node.pad_count)
    }

    pub fn grown_capacity(&self, node_id: &str) -> Option<usize> {
        self.capacity.get(node_id).copied()
    }

    pub fn is_landing_used(&self, node_id: &str, pad: usize) -> bool {
        self.landing_used
            .get(node_id)
            .and_then(|pads| pads.get(&pad))
            .is_some_and(|links| !links.is_empty())
    }

    pub fn used_landing(&self, node_id: &str) -> BTreeSet<usize> {
        self.landing_used
            .get(node_id)
            .map(|pads| {
                pads.iter()
                    .filter(|(_, links)| !links.is_empty())
                    .map(|(pad, _)| *pad)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Links landing on `(node, pad)`.
    pub fn landing_links(&self, node_id: &str, pad: usize) -> Vec<&str> {
        self.landing_used
            .get(node_id)
            .and_then(|pads| pads.get(&pad))
            .map(|links| links.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Records `result` for `link` on behalf of `committer`; returns the
    /// assignment that stands afterwards.
    pub fn commit(&mut self, link: &Link, result: PadResult, committer: &str) -> PadResult {
        if let Some(existing) = self.assignments.get(&link.id).copied() {
            if existing == result || committer != link.src {
                return existing;
            }
            self.release_landing(&link.trg, existing.landing, &link.id);
        }
        self.assignments.insert(link.id.clone(), result);
        self.committed_by
            .insert(link.id.clone(), committer.to_string());
        self.landing_used
            .entry(link.trg.clone())
            .or_default()
            .entry(result.landing)
            .or_default()
            .insert(link.id.clone());
        result
    }

    /// Folds another plan in under the same first-committer rule.
    pub fn merge(&mut self, other: &PadLedger, links: &BTreeMap<String, Link>) {
        for (node, cap) in &other.capacity {
            let slot = self.capacity.entry(node.clone()).or_insert(*cap);
            *slot = (*slot).max(*cap);
        }
        for (link_id, result) in &other.assignments {
            let Some(link) = links.get(link_id) else {
                continue;
            };
            let committer = other
                .committed_by
                .get(link_id)
                .map(String::as_str)
                .unwrap_or(link.src.as_str());
            self.commit(link, *result, committer);
        }
    }

    fn release_landing(&mut self, node_id: &str, pad: usize, link_id: &str) {
        if let Some(links) = self
            .landing_used
            .get_mut(node_id)
            .and_then(|pads| pads.get_mut(&pad))
        {
            links.remove(link_id);
        }
    }

    /// Marks a pad as taken by a link that is not (yet) committed, e.g. a
    /// pad held by a link outside the current computation.
    pub fn reserve_landing(&mut self, node_id: &str, pad: usize, link_id: &str) {
        self.landing_used
            .entry(node_id.to_string())
            .or_default()
            .entry(pad)
            .or_default()
            .insert(link_id.to_string());
    }

    /// Finds a free landing pad at or after `start`, growing the node when
    /// its kind allows it.
    pub fn next_free_landing(&mut self, node: &Node, start: usize) -> LayoutResult<usize> {
        let mut capacity = self.capacity(node);
        loop {
            if let Some(pad) = (start..capacity).find(|p| !self.is_landing_used(&node.id, *p)) {
                return Ok(pad);
            }
            let growth = node.kind.pad_growth();
            if growth == 0 {
                break;
            }
            capacity += growth;
            self.capacity.insert(node.id.clone(), capacity);
        }
        if node.kind.allows_pad_sharing() && start < capacity {
            return Ok(start);
        }
        Err(LayoutError::PadCapacity {
            node: node.id.clone(),
            requested: start.max(capacity),
            capacity,
        })
    }

    /// Raises a node's recorded capacity; never shrinks it.
    pub fn grow_to(&mut self, node: &Node, capacity: usize) {
        let slot = self
            .capacity
            .entry(node.id.clone())
            .or_insert(node.pad_count);
        *slot = (*slot).max(capacity);
    }

    /// Nodes whose capacity grew past their current pad count.
    pub fn grown_nodes<'a>(
        &'a self,
        nodes: &'a BTreeMap<String, Node>,
    ) -> impl Iterator<Item = (&'a Node, usize)> + 'a {
        self.capacity.iter().filter_map(move |(id, cap)| {
            nodes
                .get(id)
                .filter(|node| *cap > node.pad_count)
                .map(|node| (node, *cap))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PadChange {
    pub link: String,
    pub old: PadResult,
    pub new: PadResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeChange {
    pub node: String,
    pub old_pads: usize,
    pub new_pads: usize,
    pub extra_width: f32,
    pub orientation: Option<Orientation>,
}

/// Caller-owned output maps for pad and node change records.
#[derive(Debug, Clone, Default)]
pub struct ChangeSink {
    pub pad_changes: BTreeMap<String, PadChange>,
    pub node_changes: BTreeMap<String, NodeChange>,
}

impl ChangeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pads(&mut self, link: &Link, planned: PadResult) {
        let old = PadResult::of(link);
        if old == planned {
            return;
        }
        self.pad_changes.insert(
            link.id.clone(),
            PadChange {
                link: link.id.clone(),
                old,
                new: planned,
            },
        );
    }

    pub fn record_growth(&mut self, node: &Node, new_pads: usize) {
        if new_pads <= node.pad_count {
            return;
        }
        let (width, _) = node.footprint_for(new_pads);
        let entry = self
            .node_changes
            .entry(node.id.clone())
            .or_insert_with(|| NodeChange {
                node: node.id.clone(),
                old_pads: node.pad_count,
                new_pads,
                extra_width: 0.0,
                orientation: None,
            });
        entry.new_pads = entry.new_pads.max(new_pads);
        entry.extra_width = entry.extra_width.max(width - node.width);
    }

    pub fn record_orientation(&mut self, node: &Node, orientation: Orientation) {
        if node.orientation == orientation {
            return;
        }
        self.node_changes
            .entry(node.id.clone())
            .or_insert_with(|| NodeChange {
                node: node.id.clone(),
                old_pads: node.pad_count,
                new_pads: node.pad_count,
                extra_width: 0.0,
                orientation: None,
            })
            .orientation = Some(orientation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Graph, LinkSign, NodeKind};

    fn graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_node("G", NodeKind::Gene);
        graph.add_node("B", NodeKind::Bubble);
        graph.add_node("C", NodeKind::Bubble);
        graph.add_node("I", NodeKind::Intercell);
        graph.add_link("L1", "B", "G", LinkSign::Positive);
        graph.add_link("L2", "C", "G", LinkSign::Positive);
        graph
    }

    #[test]
    fn first_committer_wins_unless_source_owner() {
        let graph = graph();
        let l1 = &graph.links["L1"];
        let mut ledger = PadLedger::new();
        ledger.commit(l1, PadResult::new(0, 2), "G");
        let kept = ledger.commit(l1, PadResult::new(0, 3), "G");
        assert_eq!(kept.landing, 2);
        let replaced = ledger.commit(l1, PadResult::new(0, 3), "B");
        assert_eq!(replaced.landing, 3);
        assert!(!ledger.is_landing_used("G", 2));
        assert!(ledger.is_landing_used("G", 3));
        assert_eq!(ledger.committer("L1"), Some("B"));
    }

    #[test]
    fn gene_grows_when_pads_run_out() {
        let graph = graph();
        let gene = &graph.nodes["G"];
        let mut ledger = PadLedger::new();
        for pad in 0..gene.pad_count {
            ledger.reserve_landing("G", pad, &format!("X{pad}"));
        }
        let pad = ledger.next_free_landing(gene, 0).unwrap();
        assert_eq!(pad, 5);
        assert_eq!(ledger.capacity(gene), 6);
        let grown: Vec<_> = ledger.grown_nodes(&graph.nodes).collect();
        assert_eq!(grown.len(), 1);
        ledger.grow_to(gene, 3);
        assert_eq!(ledger.capacity(gene), 6);
    }

    #[test]
    fn bubble_cannot_grow_but_intercell_shares() {
        let graph = graph();
        let bubble = &graph.nodes["B"];
        let mut ledger = PadLedger::new();
        for pad in 0..bubble.pad_count {
            ledger.reserve_landing("B", pad, &format!("X{pad}"));
        }
        assert!(matches!(
            ledger.next_free_landing(bubble, 1),
            Err(LayoutError::PadCapacity { .. })
        ));
        let inter = &graph.nodes["I"];
        for pad in 0..inter.pad_count {
            ledger.reserve_landing("I", pad, &format!("Y{pad}"));
        }
        assert_eq!(ledger.next_free_landing(inter, 1).unwrap(), 1);
    }

    #[test]
    fn merge_keeps_existing_assignments() {
        let graph = graph();
        let mut core = PadLedger::new();
        core.commit(&graph.links["L1"], PadResult::new(0, 0), "G");
        let mut fan = PadLedger::new();
        fan.commit(&graph.links["L1"], PadResult::new(0, 4), "G");
        fan.commit(&graph.links["L2"], PadResult::new(0, 1), "G");
        core.merge(&fan, &graph.links);
        assert_eq!(core.get("L1").unwrap().landing, 0);
        assert_eq!(core.get("L2").unwrap().landing, 1);
    }

    #[test]
    fn anchors_follow_pad_sides() {
        let graph = graph();
        let gene = &graph.nodes["G"];
        let (side, p) = landing_anchor(gene, 5, 0, (0.0, 100.0));
        assert_eq!(side, PadSide::Top);
        assert_eq!(p, (15.0, 100.0));
        let bubble = &graph.nodes["B"];
        let (side, p) = landing_anchor(bubble, 4, 0, (0.0, 0.0));
        assert_eq!(side, PadSide::Left);
        assert_eq!(p, (0.0, 5.0));
        assert_eq!(launch_anchor(bubble, 4, (0.0, 0.0)), (10.0, 5.0));
    }

    #[test]
    fn change_sink_records_only_differences() {
        let graph = graph();
        let mut sink = ChangeSink::new();
        sink.record_pads(&graph.links["L1"], PadResult::new(0, 0));
        assert!(sink.pad_changes.is_empty());
        sink.record_pads(&graph.links["L1"], PadResult::new(0, 2));
        assert_eq!(sink.pad_changes["L1"].new.landing, 2);
        sink.record_growth(&graph.nodes["G"], 7);
        assert_eq!(sink.node_changes["G"].extra_width, 20.0);
    }
}
