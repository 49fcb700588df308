use std::collections::{BTreeMap, BTreeSet};

use crate::ir::Graph;
use crate::layout::Point;
use crate::layout::error::{LayoutError, LayoutResult};
use crate::layout::pads::landing_anchor;

use super::{ClusterPhase, FanInType, GeneAndSatelliteCluster};

impl GeneAndSatelliteCluster {
    /// Orders simple fan-in pens by their sources' mutual dependencies.
    ///
    /// Pen `a` precedes pen `b` when a source feeding `a` also links to a
    /// source feeding `b`. Cycles are broken at the pen with the fewest
    /// unresolved dependencies.
    pub fn order_parent_pens(&self, graph: &Graph) -> Vec<String> {
        let pens: Vec<&String> = self.fan_in.iter().collect();
        let sources = |pen: &str| -> BTreeSet<&str> {
            self.penultimate
                .get(pen)
                .map(|s| s.iter().map(String::as_str).collect())
                .unwrap_or_default()
        };

        let mut succ: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut indegree: BTreeMap<&str, usize> = pens.iter().map(|p| (p.as_str(), 0)).collect();
        for a in &pens {
            let from = sources(a);
            for b in &pens {
                if a == b {
                    continue;
                }
                let to = sources(b);
                let linked = graph
                    .links
                    .values()
                    .any(|l| from.contains(l.src.as_str()) && to.contains(l.trg.as_str()));
                if linked && succ.entry(a.as_str()).or_default().insert(b.as_str()) {
                    *indegree.entry(b.as_str()).or_default() += 1;
                }
            }
        }

        let mut order: Vec<String> = Vec::with_capacity(pens.len());
        let mut done: BTreeSet<&str> = BTreeSet::new();
        while done.len() < pens.len() {
            let next = indegree
                .iter()
                .filter(|(p, _)| !done.contains(*p))
                .min_by_key(|(p, d)| (**d, **p))
                .map(|(p, _)| *p);
            let Some(pen) = next else {
                break;
            };
            done.insert(pen);
            order.push(pen.to_string());
            for s in succ.get(pen).into_iter().flatten() {
                if let Some(d) = indegree.get_mut(s) {
                    *d = d.saturating_sub(1);
                }
            }
        }
        order
    }

    /// Pen upper-left corners relative to the core's upper-left corner.
    ///
    /// Each pen sits on the lane of its link into the core, left of that
    /// link's landing pad.
    pub(super) fn pen_offsets(&self, graph: &Graph) -> LayoutResult<Vec<(String, Point)>> {
        let core = graph
            .node(&self.core)
            .ok_or_else(|| LayoutError::UnknownNode(self.core.clone()))?;
        let capacity = self.pads.capacity(core);
        let spacing = self.config.trace_spacing;
        let mut offsets = Vec::with_capacity(self.pen_order.len());
        for pen in &self.pen_order {
            let node = graph
                .node(pen)
                .ok_or_else(|| LayoutError::UnknownNode(pen.clone()))?;
            let Some((level, pad)) = self.lanes.left.iter().find_map(|(id, level)| {
                let link = graph.link(id)?;
                if link.src != *pen || link.trg != self.core {
                    return None;
                }
                Some((*level, self.pads.get(id)?.landing))
            }) else {
                continue;
            };
            let (_, (pad_x, _)) = landing_anchor(core, capacity, pad, (0.0, 0.0));
            let x = pad_x - self.config.pen_step - node.width;
            let y = -((level + 1) as f32) * spacing - node.height / 2.0;
            offsets.push((pen.clone(), (x, y)));
        }
        Ok(offsets)
    }

    /// Places the core, pens and fan-in grid with the cluster bottom aligned
    /// to `base.y + max_height`. The fan-out grid is left to whoever places
    /// this cluster as a source.
    pub fn locate_as_target(
        &mut self,
        graph: &Graph,
        base: Point,
        max_height: f32,
        placements: &mut BTreeMap<String, Point>,
    ) -> LayoutResult<()> {
        self.require(ClusterPhase::PadPlanned)?;
        let height = self.get_cluster_dims(graph)?.height;
        let extra = (max_height - height).max(0.0);
        self.locate(graph, (base.0, base.1 + extra), false, placements)
    }

    /// Places every cluster member, fan-out grid included, at `base`.
    pub fn locate_as_source(
        &mut self,
        graph: &Graph,
        base: Point,
        placements: &mut BTreeMap<String, Point>,
    ) -> LayoutResult<()> {
        self.require(ClusterPhase::PadPlanned)?;
        self.locate(graph, base, true, placements)
    }

    fn locate(
        &mut self,
        graph: &Graph,
        base: Point,
        with_fan_out: bool,
        placements: &mut BTreeMap<String, Point>,
    ) -> LayoutResult<()> {
        let dims = self.get_cluster_dims(graph)?.clone();
        let pens = if self.fan_in_type == FanInType::SimpleFanIn {
            self.pen_offsets(graph)?
        } else {
            Vec::new()
        };
        let at = |offset: Point| (base.0 + offset.0, base.1 + offset.1);

        let mut placed: BTreeMap<String, Point> = BTreeMap::new();
        let core_pos = at(dims.core_offset);
        placed.insert(self.core.clone(), core_pos);
        for (pen, (dx, dy)) in pens {
            let pos = (core_pos.0 + dx, core_pos.1 + dy);
            placed.insert(pen, self.config_snap(pos));
        }
        if let Some(offset) = dims.fan_in_offset {
            placed.extend(self.fan_in_grid.placements(at(offset)));
        }
        if with_fan_out {
            if let Some(offset) = dims.fan_out_offset {
                placed.extend(self.fan_out_grid.placements(at(offset)));
            }
        }

        tracing::debug!(
            cluster = %self.core,
            x = base.0,
            y = base.1,
            nodes = placed.len(),
            with_fan_out,
            "cluster located"
        );
        placements.extend(placed.iter().map(|(k, v)| (k.clone(), *v)));
        self.placements = placed;
        self.base = Some(base);
        self.advance(ClusterPhase::Placed);
        Ok(())
    }

    fn config_snap(&self, p: Point) -> Point {
        crate::layout::snap_point(p, self.config.grid_unit / 2.0)
    }

    /// Upper-left corner of the cluster envelope once placed.
    pub fn base(&self) -> Option<Point> {
        self.base
    }
}
