use serde::Serialize;

use crate::ir::{Graph, NodeKind};
use crate::layout::Point;
use crate::layout::error::{LayoutError, LayoutResult};

use super::{ClusterPhase, FanInType, GeneAndSatelliteCluster};

/// Cluster envelope and the offsets of its parts, relative to the upper-left
/// corner of the cluster (the base point handed to `locate_as_*`).
///
/// Offsets already include `downshift`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterDims {
    pub width: f32,
    pub height: f32,
    pub core_offset: Point,
    pub core_size: (f32, f32),
    pub fan_in_offset: Option<Point>,
    pub fan_out_offset: Option<Point>,
    pub fan_in_width: f32,
    pub fan_out_width: f32,
    /// Highest trace or glyph edge above the core top (zero or negative).
    pub trace_top: f32,
    pub downshift: f32,
}

impl GeneAndSatelliteCluster {
    /// Memoized envelope; invalidated when phase two re-runs.
    pub fn get_cluster_dims(&self, graph: &Graph) -> LayoutResult<&ClusterDims> {
        if self.phase < ClusterPhase::PadPlanned {
            return Err(LayoutError::MissingDims(self.core.clone()));
        }
        self.dims.get_or_try_init(|| self.compute_dims(graph))
    }

    /// Vertical room above the core for simple fan-in pens and the lanes
    /// their traces drop through.
    pub fn space_for_pen_nodes(&self) -> f32 {
        if self.fan_in_type != FanInType::SimpleFanIn {
            return 0.0;
        }
        let levels = self.lanes.pen_levels + 2;
        self.config.snap_up(levels as f32 * self.config.trace_spacing)
    }

    pub(super) fn core_size(&self, graph: &Graph) -> LayoutResult<(f32, f32)> {
        let core = graph
            .node(&self.core)
            .ok_or_else(|| LayoutError::UnknownNode(self.core.clone()))?;
        let (w, h) = core.footprint_for(self.pads.capacity(core));
        let extra = if core.kind == NodeKind::Gene {
            self.config.gene_extra_height
        } else {
            0.0
        };
        Ok((w, h + extra))
    }

    fn compute_dims(&self, graph: &Graph) -> LayoutResult<ClusterDims> {
        let config = &self.config;
        let spacing = config.trace_spacing;
        let (cw, ch) = self.core_size(graph)?;

        let lanes = self.lanes.total();
        let mut tops: Vec<f32> = vec![0.0];
        if lanes > 0 {
            tops.push(-((lanes + 1) as f32) * spacing);
        }
        let mut bottoms: Vec<f32> = vec![ch];

        let mut fan_in_grid_pos: Option<Point> = None;
        let fan_in_width = match self.fan_in_type {
            FanInType::NoFanIn => config.core_gap,
            FanInType::SimpleFanIn => {
                let pens = self.pen_offsets(graph)?;
                let reach = pens
                    .iter()
                    .map(|(_, (x, _))| -x)
                    .fold(0.0, f32::max);
                for (id, (_, y)) in &pens {
                    tops.push(*y);
                    if let Some(node) = graph.node(id) {
                        bottoms.push(y + node.height);
                    }
                }
                let externals = self.lanes.left.len().saturating_sub(self.lanes.pen_levels);
                tops.push(-(externals as f32 * spacing + self.space_for_pen_nodes()));
                (reach + config.channel_offset).max(config.core_gap)
            }
            FanInType::ComplexFanIn => {
                let grid_w = self.fan_in_grid.width();
                let grid_h = self.fan_in_grid.height();
                let grid_y = if self.flags.stacked {
                    -((lanes + 1) as f32) * spacing - grid_h
                } else {
                    ch - grid_h
                };
                let reserved = self.fan_in_router.as_ref().map_or(0, |r| r.top_reservations());
                tops.push(grid_y - reserved as f32 * spacing);
                bottoms.push(grid_y + grid_h);
                fan_in_grid_pos = Some((config.channel_offset, grid_y));
                config.channel_offset
                    + grid_w
                    + self.to_core_channels.len() as f32 * config.channel_offset
                    + config.cluster.fan_in_padding
            }
        };
        let core_x = config.snap_up(fan_in_width);
        // Outbound trunk plus one channel for exits.
        let mut right = core_x + cw + 2.0 * config.channel_offset;

        let mut fan_out_pos: Option<Point> = None;
        let mut fan_out_width = 0.0;
        if !self.fan_out_grid.is_empty() {
            let fx = config.snap_up(core_x + cw + config.cluster.fan_out_padding);
            let reserved = self.fan_out_router.as_ref().map_or(0, |r| r.top_reservations());
            let entries = self.fan_out_router.as_ref().map_or(0, |r| r.same_row_entries());
            tops.push(-(reserved as f32) * spacing);
            bottoms.push(self.fan_out_grid.height());
            fan_out_width = self.fan_out_grid.width()
                + config.cluster.fan_out_width_pad
                + entries as f32 * spacing;
            fan_out_pos = Some((fx, 0.0));
            right = right.max(fx + fan_out_width);
        }

        let trace_top = tops.into_iter().fold(0.0, f32::min);
        let downshift = config.snap_up(-trace_top);
        let any_grid = fan_in_grid_pos.is_some() || fan_out_pos.is_some();
        let bottom = bottoms.into_iter().fold(0.0, f32::max);
        let height = config.snap_up(
            bottom
                + config.cluster.bottom_padding
                + if any_grid { config.cluster.height_padding } else { 0.0 }
                + downshift,
        );
        let width = config.snap_up(right + config.channel_offset);

        let shift = |p: Point| (p.0, p.1 + downshift);
        let dims = ClusterDims {
            width,
            height,
            core_offset: (core_x, downshift),
            core_size: (cw, ch),
            fan_in_offset: fan_in_grid_pos.map(shift),
            fan_out_offset: fan_out_pos.map(shift),
            fan_in_width,
            fan_out_width,
            trace_top,
            downshift,
        };
        tracing::debug!(
            cluster = %self.core,
            width = dims.width,
            height = dims.height,
            downshift = dims.downshift,
            "cluster dims"
        );
        Ok(dims)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use crate::config::LayoutConfig;
    use crate::ir::{Graph, LinkSign, NodeKind};
    use crate::layout::cluster::GeneAndSatelliteCluster;
    use crate::layout::error::LayoutError;
    use crate::layout::pads::PadLedger;

    fn planned(graph: &Graph, core: &str) -> GeneAndSatelliteCluster {
        let mut cluster = GeneAndSatelliteCluster::new(core, &LayoutConfig::default());
        let all: BTreeSet<String> = graph.links.keys().cloned().collect();
        cluster.prep_from_remainders_phase_one(graph, &all).unwrap();
        cluster
            .prep_phase_two(graph, &mut PadLedger::new(), None)
            .unwrap();
        cluster
    }

    #[test]
    fn dims_require_pad_planning() {
        let mut graph = Graph::new();
        graph.add_node("G", NodeKind::Gene);
        let cluster = GeneAndSatelliteCluster::new("G", &LayoutConfig::default());
        assert!(matches!(
            cluster.get_cluster_dims(&graph),
            Err(LayoutError::MissingDims(_))
        ));
    }

    #[test]
    fn lone_core_has_gap_and_no_downshift() {
        let mut graph = Graph::new();
        graph.add_node("G", NodeKind::Gene);
        let cluster = planned(&graph, "G");
        let dims = cluster.get_cluster_dims(&graph).unwrap();
        assert_eq!(dims.core_offset, (20.0, 0.0));
        assert_eq!(dims.core_size, (70.0, 30.0));
        assert_eq!(dims.downshift, 0.0);
        assert!(dims.fan_in_offset.is_none() && dims.fan_out_offset.is_none());
        assert_eq!(dims.height, 40.0);
        assert_eq!(dims.width % 10.0, 0.0);
    }

    #[test]
    fn pens_push_core_down() {
        let mut graph = Graph::new();
        graph.add_node("G1", NodeKind::Gene);
        graph.add_node("B1", NodeKind::Bubble);
        graph.add_node("B2", NodeKind::Bubble);
        graph.add_link("b1-g", "B1", "G1", LinkSign::Positive);
        graph.add_link("b2-g", "B2", "G1", LinkSign::Positive);
        let cluster = planned(&graph, "G1");
        assert_eq!(cluster.space_for_pen_nodes(), 40.0);
        let dims = cluster.get_cluster_dims(&graph).unwrap();
        assert!(dims.downshift >= 40.0);
        assert_eq!(dims.core_offset.1, dims.downshift);
        assert!(dims.core_offset.0 >= 30.0);
    }

    #[test]
    fn fan_out_sits_right_of_core() {
        let mut graph = Graph::new();
        graph.add_node("G", NodeKind::Gene);
        graph.add_node("O1", NodeKind::Bubble);
        graph.add_link("g-o1", "G", "O1", LinkSign::Positive);
        let cluster = planned(&graph, "G");
        let dims = cluster.get_cluster_dims(&graph).unwrap();
        let (fx, _) = dims.fan_out_offset.unwrap();
        assert!(fx >= dims.core_offset.0 + dims.core_size.0);
        assert!(dims.width >= fx + dims.fan_out_width);
        assert!(std::ptr::eq(dims, cluster.get_cluster_dims(&graph).unwrap()));
    }
}
