use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{Graph, Link, Orientation};
use crate::layout::diagnostics::{self, FailureContext, LayoutDiagnostics};
use crate::layout::drop_oracle::DropDirection;
use crate::layout::error::{LayoutError, LayoutResult};
use crate::layout::grid::GridDir;
use crate::layout::grid_router::GridGeometry;
use crate::layout::link_data::{PendingAnchor, SpecialtyLayoutLinkData, SpliceOutcome, TrackPos};
use crate::layout::pads::{ChangeSink, PadSide, landing_anchor, launch_anchor};
use crate::layout::tracked_grid::TrackedGrid;
use crate::layout::{Point, compress_path, elbow};

use super::{ClusterDims, ClusterPhase, FanInType, GeneAndSatelliteCluster};

/// Routed links keyed by source node.
pub type LinkMap = BTreeMap<String, SpecialtyLayoutLinkData>;

/// Placed geometry shared by the routing steps.
struct Frame {
    base: Point,
    dims: ClusterDims,
    core_pos: Point,
    spacing: f32,
    offset: f32,
}

impl Frame {
    /// Lane `level` above the core top; level 0 is nearest.
    fn lane_y(&self, level: usize) -> f32 {
        self.core_pos.1 - (level + 1) as f32 * self.spacing
    }

    fn core_right(&self) -> f32 {
        self.core_pos.0 + self.dims.core_size.0
    }

    fn trunk_x(&self) -> f32 {
        self.core_right() + self.offset
    }

    /// Column right of every glyph where traces turn back into the cluster.
    fn return_x(&self) -> f32 {
        self.base.0 + self.dims.width - self.offset
    }

    fn right(&self) -> f32 {
        self.base.0 + self.dims.width
    }

    fn bottom(&self) -> f32 {
        self.base.1 + self.dims.height
    }

    fn at(&self, offset: Option<Point>) -> Option<Point> {
        offset.map(|(x, y)| (self.base.0 + x, self.base.1 + y))
    }
}

fn emit(out: &mut LinkMap, link: &Link, points: &[Point], tail: Option<PendingAnchor>) {
    let data = out
        .entry(link.src.clone())
        .or_insert_with(|| SpecialtyLayoutLinkData::new(&link.src));
    data.start_link(&link.id);
    data.add_positions(&link.id, compress_path(points));
    if let Some(anchor) = tail {
        data.add_position(&link.id, TrackPos::Pending(anchor));
    }
}

fn finish(out: &mut LinkMap) {
    for data in out.values_mut() {
        data.normalize();
        data.reorder_for_tree();
    }
}

fn finite(points: &[Point]) -> bool {
    points.iter().all(|(x, y)| x.is_finite() && y.is_finite())
}

/// Folds `from` into `into`, splicing links both maps know.
pub fn merge_link_maps(into: &mut LinkMap, from: &LinkMap) -> Vec<(String, SpliceOutcome)> {
    let mut outcomes = Vec::new();
    for (src, data) in from {
        let target = into
            .entry(src.clone())
            .or_insert_with(|| SpecialtyLayoutLinkData::new(src));
        outcomes.extend(target.merge(data));
    }
    outcomes
}

impl GeneAndSatelliteCluster {
    fn frame(&self, graph: &Graph) -> LayoutResult<Frame> {
        let base = self
            .base
            .ok_or_else(|| LayoutError::Unplaced(self.core.clone()))?;
        let core_pos = self
            .placement(&self.core)
            .ok_or_else(|| LayoutError::Unplaced(self.core.clone()))?;
        Ok(Frame {
            base,
            dims: self.get_cluster_dims(graph)?.clone(),
            core_pos,
            spacing: self.config.trace_spacing,
            offset: self.config.channel_offset,
        })
    }

    fn launch_of(&self, graph: &Graph, node_id: &str) -> Option<Point> {
        let node = graph.node(node_id)?;
        let pos = self.placements.get(node_id)?;
        Some(launch_anchor(node, self.pads.capacity(node), *pos))
    }

    fn landing_pad(&self, link: &Link) -> usize {
        self.pads.get(&link.id).map_or(link.landing_pad, |r| r.landing)
    }

    fn landing_of(&self, graph: &Graph, link: &Link) -> Option<(PadSide, Point)> {
        let node = graph.node(&link.trg)?;
        let pos = self.placements.get(&link.trg)?;
        Some(landing_anchor(
            node,
            self.pads.capacity(node),
            self.landing_pad(link),
            *pos,
        ))
    }

    fn pending_landing(&self, link: &Link) -> PendingAnchor {
        PendingAnchor::Landing {
            node: link.trg.clone(),
            pad: self.landing_pad(link),
        }
    }

    fn geometry<'a>(
        &'a self,
        graph: &'a Graph,
        grid: &'a TrackedGrid,
        origin: Point,
        entry_x: f32,
    ) -> GridGeometry<'a> {
        GridGeometry {
            origin,
            grid,
            placements: &self.placements,
            graph,
            pads: &self.pads,
            entry_x,
        }
    }

    fn links_of<'g>(&self, graph: &'g Graph, ids: &BTreeSet<String>) -> Vec<&'g Link> {
        ids.iter().filter_map(|id| graph.link(id)).collect()
    }

    /// True when a stacked single-row complex fan-in link may skip the
    /// channel and lane prefix and drop straight onto its core pad.
    pub fn can_chop(&self, graph: &Graph, link_id: &str) -> bool {
        let Some(link) = graph.link(link_id) else {
            return false;
        };
        if !self.flags.stacked
            || self.fan_in_type != FanInType::ComplexFanIn
            || self.fan_in_grid.rows() != 1
            || link.trg != self.core
            || !self.fan_in_grid.contains(&link.src)
        {
            return false;
        }
        if self
            .fan_in_grid
            .grid()
            .neighbor(&link.src, GridDir::Right)
            .is_some()
        {
            return false;
        }
        let outgoing = self
            .classified_links()
            .iter()
            .filter_map(|id| graph.link(id))
            .filter(|l| l.src == link.src && !l.is_self_loop())
            .count();
        outgoing == 1
    }

    #[allow(clippy::too_many_arguments)]
    fn emergency(
        &self,
        graph: &Graph,
        link: &Link,
        step: &'static str,
        reason: &str,
        partial: Vec<Point>,
        diag: &mut dyn LayoutDiagnostics,
        out: &mut LinkMap,
    ) {
        let from = partial
            .last()
            .copied()
            .or_else(|| self.launch_of(graph, &link.src));
        let to = self.landing_of(graph, link).map(|(_, p)| p);
        diagnostics::report(
            diag,
            FailureContext {
                cluster: self.core.clone(),
                step,
                pass: None,
                link: link.id.clone(),
                attempted: to,
                partial_route: partial.clone(),
                reason: reason.to_string(),
            },
        );
        let mut points = partial;
        match (from, to) {
            (Some(from), Some(to)) => {
                points.extend(elbow(from, to));
                emit(out, link, &points, None);
            }
            (Some(from), None) => {
                if points.is_empty() {
                    points.push(from);
                }
                emit(out, link, &points, Some(self.pending_landing(link)));
            }
            (None, _) => {
                let data = out
                    .entry(link.src.clone())
                    .or_insert_with(|| SpecialtyLayoutLinkData::new(&link.src));
                data.start_link(&link.id);
                data.add_position(
                    &link.id,
                    TrackPos::Pending(PendingAnchor::Launch {
                        node: link.src.clone(),
                    }),
                );
                data.add_position(&link.id, TrackPos::Pending(self.pending_landing(link)));
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_or_fallback(
        &self,
        graph: &Graph,
        link: &Link,
        step: &'static str,
        route: Option<Vec<Point>>,
        sink: &mut ChangeSink,
        diag: &mut dyn LayoutDiagnostics,
        out: &mut LinkMap,
    ) {
        match route {
            Some(points) if points.len() >= 2 && finite(&points) => emit(out, link, &points, None),
            Some(points) => self.emergency(
                graph,
                link,
                step,
                "degenerate route geometry",
                points.into_iter().filter(|(x, y)| x.is_finite() && y.is_finite()).take(1).collect(),
                diag,
                out,
            ),
            None => self.emergency(graph, link, step, "missing anchor or plan", Vec::new(), diag, out),
        }
        if let Some(planned) = self.pads.get(&link.id) {
            sink.record_pads(link, planned);
        }
    }

    fn grid_route(&self, graph: &Graph, frame: &Frame, link: &Link) -> Option<Vec<Point>> {
        if self.fan_in_grid.contains(&link.trg) {
            let router = self.fan_in_router.as_ref()?;
            let origin = frame.at(frame.dims.fan_in_offset)?;
            let geo = self.geometry(graph, &self.fan_in_grid, origin, frame.base.0);
            return router.route(&link.id, &geo);
        }
        let router = self.fan_out_router.as_ref()?;
        let origin = frame.at(frame.dims.fan_out_offset)?;
        let geo = self.geometry(graph, &self.fan_out_grid, origin, frame.base.0);
        router.route(&link.id, &geo)
    }

    /// Core to fan-out: out along the trunk, then the fan-out plan.
    fn fan_out_entry_route(&self, graph: &Graph, frame: &Frame, link: &Link) -> Option<Vec<Point>> {
        let router = self.fan_out_router.as_ref()?;
        let origin = frame.at(frame.dims.fan_out_offset)?;
        let launch = self.launch_of(graph, &link.src)?;
        let trunk = frame.trunk_x();
        let geo = self.geometry(graph, &self.fan_out_grid, origin, trunk);
        let mut points = vec![launch, (trunk, launch.1)];
        points.extend(router.route(&link.id, &geo)?);
        Some(points)
    }

    /// Fan-in or external source to fan-out: over the core on an across
    /// lane, then into the fan-out plan.
    fn across_route(&self, graph: &Graph, frame: &Frame, link: &Link) -> Option<Vec<Point>> {
        let router = self.fan_out_router.as_ref()?;
        let origin = frame.at(frame.dims.fan_out_offset)?;
        let y = frame.lane_y(self.lanes.across_level(&link.src)?);
        let jx = origin.0 - frame.offset;
        let mut points = if self.is_in_cluster(&link.src) {
            let launch = self.launch_of(graph, &link.src)?;
            let x = launch.0 + frame.offset / 2.0;
            vec![launch, (x, launch.1), (x, y)]
        } else {
            vec![(frame.base.0, y)]
        };
        points.push((jx, y));
        let geo = self.geometry(graph, &self.fan_out_grid, origin, jx);
        points.extend(router.route(&link.id, &geo)?);
        Some(points)
    }

    /// Complex fan-in node to core: the grid plan to the grid's right edge,
    /// a per-link channel, the link's lane, then down onto the pad.
    fn to_core_route(&self, graph: &Graph, frame: &Frame, link: &Link) -> Option<Vec<Point>> {
        let (_, pad) = self.landing_of(graph, link)?;
        if self.can_chop(graph, &link.id) {
            let launch = self.launch_of(graph, &link.src)?;
            return Some(vec![launch, (pad.0, launch.1), pad]);
        }
        let router = self.fan_in_router.as_ref()?;
        let origin = frame.at(frame.dims.fan_in_offset)?;
        let geo = self.geometry(graph, &self.fan_in_grid, origin, frame.base.0);
        let mut points = router.route(&link.id, &geo)?;
        let (_, ey) = *points.last()?;
        let j = *self.to_core_channels.get(&link.id)?;
        let n = self.to_core_channels.len();
        let grid_right = origin.0 + self.fan_in_grid.width();
        let cx = if self.flags.stacked {
            grid_right + (j + 1) as f32 * frame.offset
        } else {
            grid_right + (n - j) as f32 * frame.offset
        };
        let y = frame.lane_y(self.lanes.level_of(&link.id)?);
        points.extend([(cx, ey), (cx, y), (pad.0, y), pad]);
        Some(points)
    }

    fn pen_to_core_route(&self, graph: &Graph, link: &Link) -> Option<Vec<Point>> {
        let launch = self.launch_of(graph, &link.src)?;
        let (_, pad) = self.landing_of(graph, link)?;
        Some(vec![launch, (pad.0, launch.1), pad])
    }

    /// External source entering from the cluster's left edge on its lane.
    fn from_left_route(&self, graph: &Graph, frame: &Frame, link: &Link) -> Option<Vec<Point>> {
        let (side, end) = self.landing_of(graph, link)?;
        if side == PadSide::Left {
            return Some(vec![(frame.base.0, end.1), end]);
        }
        let y = match self.lanes.level_of(&link.id) {
            Some(level) => frame.lane_y(level),
            None => end.1 - frame.spacing,
        };
        Some(vec![(frame.base.0, y), (end.0, y), end])
    }

    fn feedback_lane(&self, frame: &Frame, link: &Link) -> Option<f32> {
        let level = if link.trg == self.core {
            self.lanes.level_of(&link.id)?
        } else {
            self.lanes.across_level(&link.src)?
        };
        Some(frame.lane_y(level))
    }

    fn feedback_exit_route(&self, graph: &Graph, frame: &Frame, link: &Link) -> Option<Vec<Point>> {
        let launch = self.launch_of(graph, &link.src)?;
        let y = self.feedback_lane(frame, link)?;
        let rx = frame.return_x();
        Some(vec![launch, (rx, launch.1), (rx, y)])
    }

    fn feedback_entry_route(&self, graph: &Graph, frame: &Frame, link: &Link) -> Option<Vec<Point>> {
        let (side, pad) = self.landing_of(graph, link)?;
        let y = self.feedback_lane(frame, link)?;
        let rx = frame.return_x();
        if side == PadSide::Left {
            let x = pad.0 - frame.offset;
            return Some(vec![(rx, y), (x, y), (x, pad.1), pad]);
        }
        Some(vec![(rx, y), (pad.0, y), pad])
    }

    /// Leaves the cluster on its right edge, below or above it depending on
    /// where the target's cluster sits; the far end stays pending until the
    /// target is placed.
    fn exit_route(&self, graph: &Graph, frame: &Frame, link: &Link) -> Option<(Vec<Point>, Point)> {
        let launch = self.launch_of(graph, &link.src)?;
        let chan = if link.src == self.core {
            frame.trunk_x()
        } else {
            launch.0 + frame.offset / 2.0
        };
        let direction = self
            .ddo
            .as_ref()
            .map_or(DropDirection::Down, |o| o.direction(&self.core, &link.trg));
        let exit_y = match direction {
            DropDirection::Down => frame.bottom(),
            DropDirection::Up => frame.base.1,
        };
        let exit = (frame.right(), exit_y);
        Some((vec![launch, (chan, launch.1), (chan, exit_y), exit], exit))
    }

    fn self_loop_route(&self, graph: &Graph, frame: &Frame, link: &Link) -> Option<Vec<Point>> {
        let launch = self.launch_of(graph, &link.src)?;
        let (_, pad) = self.landing_of(graph, link)?;
        if link.src == self.core {
            let y = frame.lane_y(self.lanes.level_of(&link.id)?);
            let trunk = frame.trunk_x();
            return Some(vec![launch, (trunk, launch.1), (trunk, y), (pad.0, y), pad]);
        }
        let top = self.placements.get(&link.src)?.1;
        let y = top - frame.spacing;
        let x = launch.0 + frame.offset / 2.0;
        Some(vec![launch, (x, launch.1), (x, y), (pad.0, y), pad])
    }

    /// Links among fan nodes and from the core into the fan-out side.
    pub fn route_internal_links(
        &mut self,
        graph: &Graph,
        sink: &mut ChangeSink,
        diag: &mut dyn LayoutDiagnostics,
    ) -> LayoutResult<LinkMap> {
        self.require(ClusterPhase::Placed)?;
        let frame = self.frame(graph)?;
        for id in self.fan_in_grid.grid().node_ids().chain(self.fan_out_grid.grid().node_ids()) {
            if let Some(node) = graph.node(id) {
                sink.record_orientation(node, Orientation::Right);
            }
        }
        for (node, capacity) in self.pads.grown_nodes(&graph.nodes) {
            sink.record_growth(node, capacity);
        }

        let mut out = LinkMap::new();
        for link in self.links_of(graph, &self.internal) {
            if self.fan_in.contains(&link.src) && link.trg == self.core {
                continue;
            }
            let route = if self.fan_in.contains(&link.src) && self.fan_out.contains(&link.trg) {
                self.across_route(graph, &frame, link)
            } else if link.src == self.core {
                self.fan_out_entry_route(graph, &frame, link)
            } else {
                self.grid_route(graph, &frame, link)
            };
            self.emit_or_fallback(graph, link, "internal", route, sink, diag, &mut out);
        }
        finish(&mut out);
        self.advance(ClusterPhase::InternalRouted);
        Ok(out)
    }

    /// External sources into the cluster, fan-in into the core, and the
    /// re-entry half of large-scale feedback.
    pub fn inbound_link_routing(
        &mut self,
        graph: &Graph,
        sink: &mut ChangeSink,
        diag: &mut dyn LayoutDiagnostics,
    ) -> LayoutResult<LinkMap> {
        self.require(ClusterPhase::InternalRouted)?;
        let frame = self.frame(graph)?;
        let mut out = LinkMap::new();

        let fan_in_to_core: Vec<&Link> = self
            .links_of(graph, &self.internal)
            .into_iter()
            .filter(|l| self.fan_in.contains(&l.src) && l.trg == self.core)
            .collect();
        let externals = self.links_of(graph, &self.inbound);
        let (first, second) = if self.flags.fan_in_reaches_fan_out {
            (fan_in_to_core, externals)
        } else {
            (externals, fan_in_to_core)
        };
        for link in first.into_iter().chain(second) {
            let route = if !self.is_in_cluster(&link.src) {
                if self.fan_out.contains(&link.trg) {
                    self.across_route(graph, &frame, link)
                } else if self.fan_in_grid.contains(&link.trg) {
                    self.grid_route(graph, &frame, link)
                } else {
                    self.from_left_route(graph, &frame, link)
                }
            } else if self.fan_in_type == FanInType::ComplexFanIn {
                self.to_core_route(graph, &frame, link)
            } else {
                self.pen_to_core_route(graph, link)
            };
            self.emit_or_fallback(graph, link, "inbound", route, sink, diag, &mut out);
        }

        let mut entries = BTreeMap::new();
        for link in self.links_of(graph, &self.large_scale_feedback) {
            match self.feedback_entry_route(graph, &frame, link) {
                Some(points) => {
                    entries.insert(link.id.clone(), compress_path(&points));
                }
                None => diagnostics::report(
                    diag,
                    FailureContext {
                        cluster: self.core.clone(),
                        step: "inbound",
                        pass: None,
                        link: link.id.clone(),
                        attempted: None,
                        partial_route: Vec::new(),
                        reason: "feedback re-entry has no lane or landing".to_string(),
                    },
                ),
            }
        }
        self.feedback_entries = entries;
        finish(&mut out);
        self.advance(ClusterPhase::InboundRouted);
        Ok(out)
    }

    /// Links leaving the cluster, plus the exit half of large-scale
    /// feedback.
    pub fn route_outbound_links(
        &mut self,
        graph: &Graph,
        sink: &mut ChangeSink,
        diag: &mut dyn LayoutDiagnostics,
    ) -> LayoutResult<LinkMap> {
        self.require(ClusterPhase::InboundRouted)?;
        let frame = self.frame(graph)?;
        let mut out = LinkMap::new();
        let mut exits = BTreeMap::new();

        for link in self.links_of(graph, &self.outbound) {
            if self.large_scale_feedback.contains(&link.id) {
                if let Some(points) = self.feedback_exit_route(graph, &frame, link) {
                    exits.insert(link.id.clone(), compress_path(&points));
                }
                continue;
            }
            if self.fan_out.contains(&link.trg) {
                let route = if link.src == self.core {
                    self.fan_out_entry_route(graph, &frame, link)
                } else {
                    self.across_route(graph, &frame, link)
                };
                self.emit_or_fallback(graph, link, "outbound", route, sink, diag, &mut out);
                continue;
            }
            match self.exit_route(graph, &frame, link) {
                Some((points, exit)) => {
                    emit(&mut out, link, &points, Some(self.pending_landing(link)));
                    if let Some(data) = out.get_mut(&link.src) {
                        data.exits_mut().set(&link.id, exit);
                    }
                    if let Some(planned) = self.pads.get(&link.id) {
                        sink.record_pads(link, planned);
                    }
                }
                None => self.emergency(
                    graph,
                    link,
                    "outbound",
                    "source not placed",
                    Vec::new(),
                    diag,
                    &mut out,
                ),
            }
        }
        self.feedback_exits = exits;
        finish(&mut out);
        self.advance(ClusterPhase::OutboundRouted);
        Ok(out)
    }

    /// Self-loops, and large-scale feedback spliced from its exit and
    /// re-entry halves.
    pub fn route_feedback(
        &mut self,
        graph: &Graph,
        sink: &mut ChangeSink,
        diag: &mut dyn LayoutDiagnostics,
    ) -> LayoutResult<LinkMap> {
        self.require(ClusterPhase::OutboundRouted)?;
        let frame = self.frame(graph)?;
        let mut out = LinkMap::new();

        for link in self.links_of(graph, &self.feedback) {
            let route = self.self_loop_route(graph, &frame, link);
            self.emit_or_fallback(graph, link, "feedback", route, sink, diag, &mut out);
        }

        for link in self.links_of(graph, &self.large_scale_feedback) {
            let (Some(exit), Some(entry)) = (
                self.feedback_exits.get(&link.id),
                self.feedback_entries.get(&link.id),
            ) else {
                self.emergency(
                    graph,
                    link,
                    "feedback",
                    "feedback fragment missing",
                    self.feedback_exits.get(&link.id).cloned().unwrap_or_default(),
                    diag,
                    &mut out,
                );
                continue;
            };
            let data = out
                .entry(link.src.clone())
                .or_insert_with(|| SpecialtyLayoutLinkData::new(&link.src));
            data.start_link(&link.id);
            data.add_positions(&link.id, exit.iter().copied());
            let tail: Vec<TrackPos> = entry.iter().copied().map(TrackPos::from).collect();
            if let SpliceOutcome::Fallback { from, to } = data.splice(&link.id, &tail) {
                diagnostics::report(
                    diag,
                    FailureContext {
                        cluster: self.core.clone(),
                        step: "feedback",
                        pass: None,
                        link: link.id.clone(),
                        attempted: Some(to),
                        partial_route: vec![from],
                        reason: "feedback halves share no point".to_string(),
                    },
                );
            }
            if let Some(planned) = self.pads.get(&link.id) {
                sink.record_pads(link, planned);
            }
        }
        finish(&mut out);
        self.advance(ClusterPhase::FeedbackRouted);
        Ok(out)
    }

    /// Runs the four routing steps in order and merges their output.
    pub fn route_all(
        &mut self,
        graph: &Graph,
        sink: &mut ChangeSink,
        diag: &mut dyn LayoutDiagnostics,
    ) -> LayoutResult<LinkMap> {
        let mut all = self.route_internal_links(graph, sink, diag)?;
        let steps = [
            self.inbound_link_routing(graph, sink, diag)?,
            self.route_outbound_links(graph, sink, diag)?,
            self.route_feedback(graph, sink, diag)?,
        ];
        for step in &steps {
            for (link, outcome) in merge_link_maps(&mut all, step) {
                if let SpliceOutcome::Fallback { from, to } = outcome {
                    tracing::debug!(cluster = %self.core, link = %link, ?from, ?to, "bridged route fragments");
                }
            }
        }
        finish(&mut all);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;
    use crate::config::LayoutConfig;
    use crate::ir::{LinkSign, NodeKind};
    use crate::layout::diagnostics::RecordingDiagnostics;
    use crate::layout::is_orthogonal;
    use crate::layout::pads::PadLedger;

    fn prepared(graph: &Graph, core: &str) -> GeneAndSatelliteCluster {
        let mut cluster = GeneAndSatelliteCluster::new(core, &LayoutConfig::default());
        let all: BTreeSet<String> = graph.links.keys().cloned().collect();
        cluster.prep_from_remainders_phase_one(graph, &all).unwrap();
        cluster
            .prep_phase_two(graph, &mut PadLedger::new(), None)
            .unwrap();
        cluster
    }

    fn located(graph: &Graph, core: &str) -> GeneAndSatelliteCluster {
        let mut cluster = prepared(graph, core);
        let mut placements = BTreeMap::new();
        cluster
            .locate_as_source(graph, (0.0, 0.0), &mut placements)
            .unwrap();
        cluster
    }

    fn feedback_graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_node("G", NodeKind::Gene);
        graph.add_node("X", NodeKind::Gene);
        graph.add_node("O", NodeKind::Bubble);
        graph.add_link("x-g", "X", "G", LinkSign::Positive);
        graph.add_link("g-o", "G", "O", LinkSign::Positive);
        graph.add_link("o-g", "O", "G", LinkSign::Negative);
        graph.add_link("g-g", "G", "G", LinkSign::Positive);
        graph
    }

    #[test]
    fn routing_before_placement_is_rejected() {
        let graph = feedback_graph();
        let mut cluster = prepared(&graph, "G");
        let err = cluster
            .route_internal_links(&graph, &mut ChangeSink::new(), &mut RecordingDiagnostics::default())
            .unwrap_err();
        assert!(matches!(err, LayoutError::PhaseOrder { .. }));
    }

    #[test]
    fn steps_must_run_in_order() {
        let graph = feedback_graph();
        let mut cluster = located(&graph, "G");
        let err = cluster
            .route_outbound_links(&graph, &mut ChangeSink::new(), &mut RecordingDiagnostics::default())
            .unwrap_err();
        assert!(matches!(err, LayoutError::PhaseOrder { .. }));
    }

    #[test]
    fn every_owned_route_is_orthogonal_and_lands_on_its_pad() {
        let graph = feedback_graph();
        let mut cluster = located(&graph, "G");
        let mut diag = RecordingDiagnostics::default();
        let routes = cluster
            .route_all(&graph, &mut ChangeSink::new(), &mut diag)
            .unwrap();
        assert!(diag.failures.is_empty(), "{:?}", diag.failures);
        assert_eq!(cluster.phase(), ClusterPhase::FeedbackRouted);

        for id in ["x-g", "g-o", "o-g", "g-g"] {
            let link = graph.link(id).unwrap();
            let points = routes[&link.src].points(id);
            assert!(points.len() >= 2, "{id}: {points:?}");
            assert!(is_orthogonal(&points), "{id}: {points:?}");
            let (_, pad) = cluster.landing_of(&graph, link).unwrap();
            assert!(same_point_approx(*points.last().unwrap(), pad), "{id}");
        }
    }

    fn same_point_approx(a: Point, b: Point) -> bool {
        (a.0 - b.0).abs() < 1e-3 && (a.1 - b.1).abs() < 1e-3
    }

    #[test]
    fn large_scale_feedback_is_spliced_from_both_halves() {
        let graph = feedback_graph();
        let mut cluster = located(&graph, "G");
        let mut sink = ChangeSink::new();
        let mut diag = RecordingDiagnostics::default();
        cluster.route_internal_links(&graph, &mut sink, &mut diag).unwrap();
        let inbound = cluster.inbound_link_routing(&graph, &mut sink, &mut diag).unwrap();
        assert!(!inbound.contains_key("O"));
        cluster.route_outbound_links(&graph, &mut sink, &mut diag).unwrap();
        let feedback = cluster.route_feedback(&graph, &mut sink, &mut diag).unwrap();
        let points = feedback["O"].points("o-g");
        let launch = cluster.launch_of(&graph, "O").unwrap();
        assert!(same_point_approx(points[0], launch));
        assert!(diag.failures.is_empty());
    }

    #[test]
    fn external_targets_exit_right_with_pending_landing() {
        let mut graph = Graph::new();
        graph.add_node("G", NodeKind::Gene);
        graph.add_node("T", NodeKind::Gene);
        graph.add_link("g-t", "G", "T", LinkSign::Positive);
        let mut cluster = located(&graph, "G");
        let routes = cluster
            .route_all(&graph, &mut ChangeSink::new(), &mut RecordingDiagnostics::default())
            .unwrap();
        let data = &routes["G"];
        assert_eq!(data.pending().len(), 1);
        let exit = data.exits().get("g-t").unwrap();
        let dims = cluster.get_cluster_dims(&graph).unwrap();
        assert_eq!(exit, (dims.width, dims.height));
    }

    #[test]
    fn unplaced_fan_out_falls_back_and_reports() {
        let mut graph = Graph::new();
        graph.add_node("G", NodeKind::Gene);
        graph.add_node("O1", NodeKind::Bubble);
        graph.add_link("g-o1", "G", "O1", LinkSign::Positive);
        let mut cluster = prepared(&graph, "G");
        let mut placements = BTreeMap::new();
        cluster
            .locate_as_target(&graph, (0.0, 0.0), 0.0, &mut placements)
            .unwrap();
        let mut diag = RecordingDiagnostics::default();
        let routes = cluster
            .route_all(&graph, &mut ChangeSink::new(), &mut diag)
            .unwrap();
        assert_eq!(diag.failures.len(), 1);
        assert_eq!(diag.failures[0].link, "g-o1");
        assert_eq!(routes["G"].pending().len(), 1);
    }
}
