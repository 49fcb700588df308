//! A core node with its fan-in and fan-out satellites.
//!
//! Call sequence per cluster: one of the `prep_*_phase_one` builders, then
//! [`GeneAndSatelliteCluster::prep_phase_two`], then `locate_as_target` or
//! `locate_as_source`, then the routing steps in order (internal, inbound,
//! outbound, feedback). Out-of-order calls fail with
//! [`LayoutError::PhaseOrder`].

mod dims;
mod placement;
mod planning;
mod routing;
mod topology;

pub use dims::ClusterDims;
pub use routing::{LinkMap, merge_link_maps};

use once_cell::unsync::OnceCell;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::LayoutConfig;

use super::Point;
use super::drop_oracle::DropDirectionOracle;
use super::error::{LayoutError, LayoutResult};
use super::grid_router::GridLinkRouter;
use super::pads::PadLedger;
use super::tracked_grid::TrackedGrid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ClusterPhase {
    Created,
    TopologyBuilt,
    PadPlanned,
    Placed,
    InternalRouted,
    InboundRouted,
    OutboundRouted,
    FeedbackRouted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FanInType {
    NoFanIn,
    SimpleFanIn,
    ComplexFanIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LinkClass {
    Internal,
    Inbound,
    Outbound,
    Feedback,
}

/// Externally supplied fan-in/fan-out grouping for one core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterGroups {
    pub core: String,
    pub fan_in: BTreeSet<String>,
    pub fan_out: BTreeSet<String>,
}

impl ClusterGroups {
    pub fn new(core: &str) -> Self {
        Self {
            core: core.to_string(),
            ..Self::default()
        }
    }

    pub fn with_fan_in<I: IntoIterator<Item = S>, S: Into<String>>(mut self, nodes: I) -> Self {
        self.fan_in.extend(nodes.into_iter().map(Into::into));
        self
    }

    pub fn with_fan_out<I: IntoIterator<Item = S>, S: Into<String>>(mut self, nodes: I) -> Self {
        self.fan_out.extend(nodes.into_iter().map(Into::into));
        self
    }
}

/// Conditions derived once in phase two and consulted by placement and
/// routing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClusterFlags {
    pub stacked: bool,
    pub has_fan_out: bool,
    pub single_row_fan_in: bool,
    /// Some fan-in node also feeds the fan-out side.
    pub fan_in_reaches_fan_out: bool,
    pub has_feedback: bool,
}

/// Track lanes reserved above the core, counted from the core top upwards:
/// left-entering core landings, then right-entering ones, then lanes that
/// carry traces across the core.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct CoreLanes {
    pub left: BTreeMap<String, usize>,
    pub right: BTreeMap<String, usize>,
    pub across: BTreeMap<String, usize>,
    /// Left lanes spent on pen outputs and extra pen inputs.
    pub pen_levels: usize,
}

impl CoreLanes {
    pub fn total(&self) -> usize {
        self.left.len() + self.right.len() + self.across.len()
    }

    /// Lane index counted from the core top, 0 nearest.
    pub fn level_of(&self, link_id: &str) -> Option<usize> {
        if let Some(k) = self.left.get(link_id) {
            return Some(*k);
        }
        if let Some(k) = self.right.get(link_id) {
            return Some(self.left.len() + *k);
        }
        None
    }

    pub fn across_level(&self, src: &str) -> Option<usize> {
        self.across
            .get(src)
            .map(|k| self.left.len() + self.right.len() + *k)
    }
}

#[derive(Debug, Clone)]
pub struct GeneAndSatelliteCluster {
    core: String,
    config: LayoutConfig,
    phase: ClusterPhase,
    fan_in: BTreeSet<String>,
    fan_out: BTreeSet<String>,
    internal: BTreeSet<String>,
    inbound: BTreeSet<String>,
    outbound: BTreeSet<String>,
    feedback: BTreeSet<String>,
    large_scale_feedback: BTreeSet<String>,
    penultimate: BTreeMap<String, BTreeSet<String>>,
    inputs: BTreeSet<String>,
    fan_in_type: FanInType,
    flags: ClusterFlags,
    fan_in_grid: TrackedGrid,
    fan_out_grid: TrackedGrid,
    fan_in_router: Option<GridLinkRouter>,
    fan_out_router: Option<GridLinkRouter>,
    core_jumpers: BTreeSet<String>,
    pads: PadLedger,
    pen_order: Vec<String>,
    inbound_order: Vec<String>,
    lanes: CoreLanes,
    to_core_channels: BTreeMap<String, usize>,
    base: Option<Point>,
    placements: BTreeMap<String, Point>,
    feedback_exits: BTreeMap<String, Vec<Point>>,
    feedback_entries: BTreeMap<String, Vec<Point>>,
    dims: OnceCell<ClusterDims>,
    ddo: Option<DropDirectionOracle>,
}

impl GeneAndSatelliteCluster {
    pub fn new(core: &str, config: &LayoutConfig) -> Self {
        Self {
            core: core.to_string(),
            config: config.clone(),
            phase: ClusterPhase::Created,
            fan_in: BTreeSet::new(),
            fan_out: BTreeSet::new(),
            internal: BTreeSet::new(),
            inbound: BTreeSet::new(),
            outbound: BTreeSet::new(),
            feedback: BTreeSet::new(),
            large_scale_feedback: BTreeSet::new(),
            penultimate: BTreeMap::new(),
            inputs: BTreeSet::new(),
            fan_in_type: FanInType::NoFanIn,
            flags: ClusterFlags::default(),
            fan_in_grid: TrackedGrid::empty(config),
            fan_out_grid: TrackedGrid::empty(config),
            fan_in_router: None,
            fan_out_router: None,
            core_jumpers: BTreeSet::new(),
            pads: PadLedger::new(),
            pen_order: Vec::new(),
            inbound_order: Vec::new(),
            lanes: CoreLanes::default(),
            to_core_channels: BTreeMap::new(),
            base: None,
            placements: BTreeMap::new(),
            feedback_exits: BTreeMap::new(),
            feedback_entries: BTreeMap::new(),
            dims: OnceCell::new(),
            ddo: None,
        }
    }

    fn require(&self, expected: ClusterPhase) -> LayoutResult<()> {
        if self.phase == expected {
            return Ok(());
        }
        Err(LayoutError::PhaseOrder {
            cluster: self.core.clone(),
            expected,
            found: self.phase,
        })
    }

    fn advance(&mut self, next: ClusterPhase) {
        tracing::debug!(cluster = %self.core, from = ?self.phase, to = ?next, "cluster phase");
        self.phase = next;
    }

    pub fn core_id(&self) -> &str {
        &self.core
    }

    pub fn phase(&self) -> ClusterPhase {
        self.phase
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn fan_in_type(&self) -> FanInType {
        self.fan_in_type
    }

    pub fn flags(&self) -> ClusterFlags {
        self.flags
    }

    pub fn fan_in_nodes(&self) -> &BTreeSet<String> {
        &self.fan_in
    }

    pub fn fan_out_nodes(&self) -> &BTreeSet<String> {
        &self.fan_out
    }

    pub fn internal_links(&self) -> &BTreeSet<String> {
        &self.internal
    }

    pub fn inbound_links(&self) -> &BTreeSet<String> {
        &self.inbound
    }

    pub fn outbound_links(&self) -> &BTreeSet<String> {
        &self.outbound
    }

    pub fn feedback_links(&self) -> &BTreeSet<String> {
        &self.feedback
    }

    /// Outbound links that re-enter the core or fan-in; routed both as an
    /// exit and as a re-entry.
    pub fn large_scale_feedback(&self) -> &BTreeSet<String> {
        &self.large_scale_feedback
    }

    pub fn penultimate(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.penultimate
    }

    pub fn inputs(&self) -> &BTreeSet<String> {
        &self.inputs
    }

    pub fn core_jumpers(&self) -> &BTreeSet<String> {
        &self.core_jumpers
    }

    pub fn fan_in_grid(&self) -> &TrackedGrid {
        &self.fan_in_grid
    }

    pub fn fan_out_grid(&self) -> &TrackedGrid {
        &self.fan_out_grid
    }

    pub fn fan_in_router(&self) -> Option<&GridLinkRouter> {
        self.fan_in_router.as_ref()
    }

    pub fn fan_out_router(&self) -> Option<&GridLinkRouter> {
        self.fan_out_router.as_ref()
    }

    /// The cluster's own pad plan (core, fan and jumper pads).
    pub fn pad_plan(&self) -> &PadLedger {
        &self.pads
    }

    pub fn placements(&self) -> &BTreeMap<String, Point> {
        &self.placements
    }

    pub fn placement(&self, node_id: &str) -> Option<Point> {
        self.placements.get(node_id).copied()
    }

    pub fn drop_oracle(&self) -> Option<&DropDirectionOracle> {
        self.ddo.as_ref()
    }

    pub fn set_drop_oracle(&mut self, oracle: DropDirectionOracle) {
        self.ddo = Some(oracle);
    }

    pub fn class_of(&self, link_id: &str) -> Option<LinkClass> {
        if self.internal.contains(link_id) {
            Some(LinkClass::Internal)
        } else if self.inbound.contains(link_id) {
            Some(LinkClass::Inbound)
        } else if self.outbound.contains(link_id) {
            Some(LinkClass::Outbound)
        } else if self.feedback.contains(link_id) {
            Some(LinkClass::Feedback)
        } else {
            None
        }
    }

    /// Every classified link, each exactly once.
    pub fn classified_links(&self) -> BTreeSet<String> {
        self.internal
            .iter()
            .chain(&self.inbound)
            .chain(&self.outbound)
            .chain(&self.feedback)
            .cloned()
            .collect()
    }

    pub fn all_nodes_in_cluster(&self) -> BTreeSet<String> {
        let mut nodes: BTreeSet<String> = self.fan_in.iter().chain(&self.fan_out).cloned().collect();
        nodes.insert(self.core.clone());
        nodes
    }

    pub fn is_in_cluster(&self, node_id: &str) -> bool {
        node_id == self.core || self.fan_in.contains(node_id) || self.fan_out.contains(node_id)
    }

    /// Links landing on the core node, whatever their class.
    pub fn links_to_core(&self, graph: &crate::ir::Graph) -> BTreeSet<String> {
        self.classified_links()
            .into_iter()
            .filter(|id| graph.link(id).is_some_and(|l| l.trg == self.core))
            .collect()
    }

    /// Links landing on fan-in nodes.
    pub fn links_to_fan_in(&self, graph: &crate::ir::Graph) -> BTreeSet<String> {
        self.classified_links()
            .into_iter()
            .filter(|id| graph.link(id).is_some_and(|l| self.fan_in.contains(&l.trg)))
            .collect()
    }

    /// Order in which links land on the core, leftmost pad first. Available
    /// after phase two.
    pub fn get_inbound_link_order(&self) -> &[String] {
        &self.inbound_order
    }

    /// Translates every committed placement, e.g. for a module shift pass.
    pub fn shift_placements(&mut self, dx: f32, dy: f32) {
        for p in self.placements.values_mut() {
            *p = (p.0 + dx, p.1 + dy);
        }
        if let Some(base) = self.base.as_mut() {
            *base = (base.0 + dx, base.1 + dy);
        }
        for route in self
            .feedback_exits
            .values_mut()
            .chain(self.feedback_entries.values_mut())
        {
            for p in route.iter_mut() {
                *p = (p.0 + dx, p.1 + dy);
            }
        }
    }

    fn committer_for(&self, src: &str) -> String {
        if self.is_in_cluster(src) {
            src.to_string()
        } else {
            self.core.clone()
        }
    }
}
