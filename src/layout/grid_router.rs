use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::config::LayoutConfig;
use crate::ir::{Graph, Link};

use super::error::{LayoutError, LayoutResult};
use super::grid::GridDir;
use super::pads::{
    PadLedger, PadResult, PadSide, first_top_pad, landing_anchor, landing_side, launch_anchor,
};
use super::tracked_grid::TrackedGrid;
use super::{Point, snap_point};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FanSide {
    FanIn,
    FanOut,
}

/// Geometric relationship between a link and a fan grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum GridLinkClass {
    /// Both ends in the grid, adjacent in one row: a straight run.
    SameRow,
    /// Both ends in the grid otherwise: channel, row track, drop.
    CrossRow,
    /// From outside into a first-column node's left pad.
    EnterFromLeft,
    /// From outside onto a top pad via a track reserved above the grid.
    DropFromAbove,
    /// Fan-in grid node to the core; leaves the grid's right edge.
    ToCore,
    /// Fan-in node straight to a fan-out node, bypassing the core.
    CoreJumping,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridLink {
    pub id: String,
    pub src: String,
    pub trg: String,
    pub class: GridLinkClass,
}

/// Everything the router needs to plan one fan side.
pub struct RouterInput<'a> {
    pub side: FanSide,
    pub core: &'a str,
    pub grid: &'a TrackedGrid,
    pub links: Vec<&'a Link>,
    pub source_order: &'a [String],
    pub jumper_sources: &'a BTreeSet<String>,
    /// Nodes of the planning cluster; it may only move pads of links whose
    /// source is one of them.
    pub members: &'a BTreeSet<String>,
}

impl RouterInput<'_> {
    fn committer<'s>(&'s self, link: &'s Link) -> &'s str {
        if self.members.contains(&link.src) {
            &link.src
        } else {
            self.core
        }
    }
}

/// Geometry needed to turn a plan into polylines.
pub struct GridGeometry<'a> {
    pub origin: Point,
    pub grid: &'a TrackedGrid,
    pub placements: &'a BTreeMap<String, Point>,
    pub graph: &'a Graph,
    pub pads: &'a PadLedger,
    /// X coordinate where traces from outside the grid begin.
    pub entry_x: f32,
}

/// Pad and track planner for the links touching one fan grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLinkRouter {
    side: FanSide,
    core: String,
    trace_spacing: f32,
    links: BTreeMap<String, GridLink>,
    plan: PadLedger,
    top_tracks: BTreeMap<String, usize>,
    row_tracks: BTreeMap<usize, BTreeMap<String, usize>>,
    col_channels: BTreeMap<usize, BTreeMap<String, usize>>,
    core_jumpers: BTreeSet<String>,
}

impl GridLinkRouter {
    pub fn plan(
        input: &RouterInput<'_>,
        graph: &Graph,
        shared: &PadLedger,
        config: &LayoutConfig,
    ) -> LayoutResult<Self> {
        let mut router = Self {
            side: input.side,
            core: input.core.to_string(),
            trace_spacing: config.trace_spacing,
            links: BTreeMap::new(),
            plan: PadLedger::new(),
            top_tracks: BTreeMap::new(),
            row_tracks: BTreeMap::new(),
            col_channels: BTreeMap::new(),
            core_jumpers: BTreeSet::new(),
        };
        let grid = input.grid;
        let source_rank = |src: &str| {
            input
                .source_order
                .iter()
                .position(|s| s == src)
                .unwrap_or(usize::MAX)
        };

        let mut ordered: Vec<&Link> = input.links.clone();
        ordered.sort_by(|a, b| {
            source_rank(&a.src)
                .cmp(&source_rank(&b.src))
                .then_with(|| a.src.cmp(&b.src))
                .then_with(|| a.sign.rank().cmp(&b.sign.rank()))
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut working = shared.clone();
        for link in &ordered {
            let class = router.classify(link, grid, input.jumper_sources);
            let class = match class {
                Some(class) => class,
                None => continue,
            };
            if class == GridLinkClass::CoreJumping {
                router.core_jumpers.insert(link.id.clone());
            }
            router.links.insert(
                link.id.clone(),
                GridLink {
                    id: link.id.clone(),
                    src: link.src.clone(),
                    trg: link.trg.clone(),
                    class,
                },
            );
        }

        // Pads another cluster committed for links it owns stay where they are.
        let mut standing: BTreeSet<String> = BTreeSet::new();
        for link in &ordered {
            let Some(class) = router.links.get(&link.id).map(|l| l.class) else {
                continue;
            };
            let Some(existing) = working.get(&link.id) else {
                continue;
            };
            if input.members.contains(&link.src) {
                continue;
            }
            let trg = graph
                .node(&link.trg)
                .ok_or_else(|| LayoutError::UnknownNode(link.trg.clone()))?;
            let on_left = landing_side(trg.kind, existing.landing) == PadSide::Left;
            let first_col = grid.cell_of(&link.trg).is_some_and(|(_, c)| c == 0);
            let class = match class {
                GridLinkClass::EnterFromLeft | GridLinkClass::DropFromAbove => {
                    if on_left && first_col {
                        GridLinkClass::EnterFromLeft
                    } else {
                        GridLinkClass::DropFromAbove
                    }
                }
                other => other,
            };
            if let Some(entry) = router.links.get_mut(&link.id) {
                entry.class = class;
            }
            router.plan.grow_to(trg, working.capacity(trg));
            router.plan.commit(link, existing, input.committer(link));
            standing.insert(link.id.clone());
        }

        // Left pads go first so blocked entries can fall back to the top.
        for link in &ordered {
            if standing.contains(&link.id) {
                continue;
            }
            let Some(class) = router.links.get(&link.id).map(|l| l.class) else {
                continue;
            };
            if !matches!(class, GridLinkClass::EnterFromLeft | GridLinkClass::SameRow) {
                continue;
            }
            let trg = graph
                .node(&link.trg)
                .ok_or_else(|| LayoutError::UnknownNode(link.trg.clone()))?;
            let holders = working.landing_links(&trg.id, 0);
            let free = trg.kind.has_left_pad() && holders.iter().all(|id| *id == link.id);
            if free {
                let committer = input.committer(link);
                let kept = working.commit(link, PadResult::new(0, 0), committer);
                router.plan.commit(link, kept, committer);
            } else if let Some(entry) = router.links.get_mut(&link.id) {
                entry.class = match class {
                    GridLinkClass::SameRow => GridLinkClass::CrossRow,
                    _ => GridLinkClass::DropFromAbove,
                };
            }
        }

        router.assign_tracks(&ordered, grid, &source_rank);

        // Top pads: per target, nearest tracks take the leftmost pads.
        let mut top: BTreeMap<String, Vec<(usize, usize, &Link)>> = BTreeMap::new();
        for link in &ordered {
            if standing.contains(&link.id) {
                continue;
            }
            let Some(entry) = router.links.get(&link.id) else {
                continue;
            };
            let key = match entry.class {
                GridLinkClass::CrossRow => {
                    let row = grid.cell_of(&link.trg).map_or(0, |(r, _)| r);
                    (0, router.row_track(row, &link.src))
                }
                GridLinkClass::DropFromAbove | GridLinkClass::CoreJumping => {
                    (1, router.top_tracks.get(&link.src).copied().unwrap_or(0))
                }
                _ => continue,
            };
            top.entry(link.trg.clone())
                .or_default()
                .push((key.0, key.1, *link));
        }
        for (trg_id, mut entries) in top {
            let trg = graph
                .node(&trg_id)
                .ok_or_else(|| LayoutError::UnknownNode(trg_id.clone()))?;
            entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
            for (_, _, link) in entries {
                let pad = working.next_free_landing(trg, first_top_pad(trg.kind))?;
                router.plan.grow_to(trg, working.capacity(trg));
                let committer = input.committer(link);
                let kept = working.commit(link, PadResult::new(0, pad), committer);
                router.plan.commit(link, kept, committer);
            }
        }

        tracing::debug!(
            core = %router.core,
            side = ?router.side,
            links = router.links.len(),
            top_tracks = router.top_tracks.len(),
            jumpers = router.core_jumpers.len(),
            "planned grid links"
        );
        Ok(router)
    }

    fn classify(
        &self,
        link: &Link,
        grid: &TrackedGrid,
        jumper_sources: &BTreeSet<String>,
    ) -> Option<GridLinkClass> {
        let src_cell = grid.cell_of(&link.src);
        let trg_cell = grid.cell_of(&link.trg);
        match (src_cell, trg_cell) {
            (Some((sr, _)), Some((tr, _))) => {
                let adjacent = grid.grid().neighbor(&link.src, GridDir::Right) == Some(link.trg.as_str());
                if sr == tr && adjacent {
                    Some(GridLinkClass::SameRow)
                } else {
                    Some(GridLinkClass::CrossRow)
                }
            }
            (Some(_), None) if self.side == FanSide::FanIn && link.trg == self.core => {
                Some(GridLinkClass::ToCore)
            }
            (None, Some((_, tc))) => {
                if self.side == FanSide::FanOut && jumper_sources.contains(&link.src) {
                    Some(GridLinkClass::CoreJumping)
                } else if tc == 0 {
                    Some(GridLinkClass::EnterFromLeft)
                } else {
                    Some(GridLinkClass::DropFromAbove)
                }
            }
            _ => None,
        }
    }

    fn assign_tracks(
        &mut self,
        ordered: &[&Link],
        grid: &TrackedGrid,
        source_rank: &dyn Fn(&str) -> usize,
    ) {
        let mut drops: Vec<(usize, usize, &str)> = Vec::new();
        for link in ordered {
            let Some(entry) = self.links.get(&link.id) else {
                continue;
            };
            match entry.class {
                GridLinkClass::DropFromAbove => {
                    let group = if link.src == self.core { 0 } else { 1 };
                    drops.push((group, source_rank(&link.src), link.src.as_str()));
                }
                GridLinkClass::CoreJumping => {
                    drops.push((2, source_rank(&link.src), link.src.as_str()));
                }
                GridLinkClass::CrossRow => {
                    let (Some((_, sc)), Some((tr, _))) =
                        (grid.cell_of(&link.src), grid.cell_of(&link.trg))
                    else {
                        continue;
                    };
                    let row = self.row_tracks.entry(tr).or_default();
                    let next = row.len();
                    row.entry(link.src.clone()).or_insert(next);
                    let col = self.col_channels.entry(sc).or_default();
                    let next = col.len();
                    col.entry(link.src.clone()).or_insert(next);
                }
                GridLinkClass::ToCore => {
                    if grid.grid().neighbor(&link.src, GridDir::Right).is_none() {
                        continue;
                    }
                    let Some((sr, sc)) = grid.cell_of(&link.src) else {
                        continue;
                    };
                    let row = self.row_tracks.entry(sr).or_default();
                    let next = row.len();
                    row.entry(link.src.clone()).or_insert(next);
                    let col = self.col_channels.entry(sc).or_default();
                    let next = col.len();
                    col.entry(link.src.clone()).or_insert(next);
                }
                _ => {}
            }
        }
        drops.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));
        for (_, _, src) in drops {
            let next = self.top_tracks.len();
            self.top_tracks.entry(src.to_string()).or_insert(next);
        }
    }

    fn row_track(&self, row: usize, src: &str) -> usize {
        self.row_tracks
            .get(&row)
            .and_then(|tracks| tracks.get(src))
            .copied()
            .unwrap_or(0)
    }

    fn col_channel(&self, col: usize, src: &str) -> usize {
        self.col_channels
            .get(&col)
            .and_then(|tracks| tracks.get(src))
            .copied()
            .unwrap_or(0)
    }

    /// Widens rows and columns of `grid` to hold the planned tracks.
    pub fn apply_reservations(&self, grid: &mut TrackedGrid) {
        for (row, tracks) in &self.row_tracks {
            grid.reserve_row_tracks(*row, tracks.len());
        }
        for (col, tracks) in &self.col_channels {
            grid.reserve_col_tracks(*col, tracks.len());
        }
    }

    pub fn side(&self) -> FanSide {
        self.side
    }

    /// Tracks reserved above the grid for traces that skip over it.
    pub fn top_reservations(&self) -> usize {
        self.top_tracks.len()
    }

    pub fn top_track(&self, src: &str) -> Option<usize> {
        self.top_tracks.get(src).copied()
    }

    pub fn pad_plan(&self) -> &PadLedger {
        &self.plan
    }

    pub fn core_jumpers(&self) -> &BTreeSet<String> {
        &self.core_jumpers
    }

    pub fn link(&self, link_id: &str) -> Option<&GridLink> {
        self.links.get(link_id)
    }

    pub fn class_of(&self, link_id: &str) -> Option<GridLinkClass> {
        self.links.get(link_id).map(|l| l.class)
    }

    pub fn links(&self) -> impl Iterator<Item = &GridLink> {
        self.links.values()
    }

    /// Number of distinct traces landing on same-row neighbours of the
    /// first column; used to widen the fan-out envelope.
    pub fn same_row_entries(&self) -> usize {
        self.links
            .values()
            .filter(|l| l.class == GridLinkClass::EnterFromLeft)
            .count()
    }

    /// Converts the plan for one link into a polyline.
    ///
    /// `ToCore` routes end at the grid's right edge; the cluster finishes
    /// them. Returns `None` when an endpoint has no placement.
    pub fn route(&self, link_id: &str, geo: &GridGeometry<'_>) -> Option<Vec<Point>> {
        let entry = self.links.get(link_id)?;
        let spacing = self.trace_spacing;
        let (ox, oy) = geo.origin;
        let landing = |geo: &GridGeometry<'_>| -> Option<Point> {
            let node = geo.graph.node(&entry.trg)?;
            let pos = geo.placements.get(&entry.trg)?;
            let pad = geo.pads.get(link_id).or_else(|| self.plan.get(link_id))?.landing;
            Some(landing_anchor(node, geo.pads.capacity(node).max(self.plan.capacity(node)), pad, *pos).1)
        };
        let launch = |geo: &GridGeometry<'_>| -> Option<Point> {
            let node = geo.graph.node(&entry.src)?;
            let pos = geo.placements.get(&entry.src)?;
            Some(launch_anchor(node, geo.pads.capacity(node), *pos))
        };

        let points = match entry.class {
            GridLinkClass::SameRow => {
                let start = launch(geo)?;
                let end = landing(geo)?;
                if (start.1 - end.1).abs() < 1e-3 {
                    vec![start, end]
                } else {
                    let mid = snap_point(((start.0 + end.0) / 2.0, start.1), spacing).0;
                    vec![start, (mid, start.1), (mid, end.1), end]
                }
            }
            GridLinkClass::CrossRow => {
                let start = launch(geo)?;
                let end = landing(geo)?;
                let (_, sc) = geo.grid.cell_of(&entry.src)?;
                let (tr, _) = geo.grid.cell_of(&entry.trg)?;
                let ch_x = ox + geo.grid.channel_x(sc, self.col_channel(sc, &entry.src));
                let track_y = oy + geo.grid.track_y(tr, self.row_track(tr, &entry.src));
                vec![start, (ch_x, start.1), (ch_x, track_y), (end.0, track_y), end]
            }
            GridLinkClass::EnterFromLeft => {
                let end = landing(geo)?;
                vec![(geo.entry_x, end.1), end]
            }
            GridLinkClass::DropFromAbove | GridLinkClass::CoreJumping => {
                let end = landing(geo)?;
                let k = self.top_tracks.get(&entry.src).copied().unwrap_or(0);
                let track_y = oy - (k + 1) as f32 * spacing;
                vec![(geo.entry_x, track_y), (end.0, track_y), end]
            }
            GridLinkClass::ToCore => {
                let start = launch(geo)?;
                let right = ox + geo.grid.width();
                if geo.grid.grid().neighbor(&entry.src, GridDir::Right).is_none() {
                    vec![start, (right, start.1)]
                } else {
                    let (sr, sc) = geo.grid.cell_of(&entry.src)?;
                    let ch_x = ox + geo.grid.channel_x(sc, self.col_channel(sc, &entry.src));
                    let track_y = oy + geo.grid.track_y(sr, self.row_track(sr, &entry.src));
                    vec![start, (ch_x, start.1), (ch_x, track_y), (right, track_y)]
                }
            }
        };
        Some(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{LinkSign, NodeKind};
    use crate::layout::tracked_grid::{Motif, TreeFlow};

    fn fan_out_graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_node("G", NodeKind::Gene);
        graph.add_node("O1", NodeKind::Bubble);
        graph.add_node("O2", NodeKind::Bubble);
        graph.add_node("O3", NodeKind::Box);
        graph.add_node("F1", NodeKind::Bubble);
        graph.add_link("g-o1", "G", "O1", LinkSign::Positive);
        graph.add_link("g-o2", "G", "O2", LinkSign::Positive);
        graph.add_link("o1-o3", "O1", "O3", LinkSign::Positive);
        graph.add_link("o2-o3", "O2", "O3", LinkSign::Negative);
        graph.add_link("f1-o3", "F1", "O3", LinkSign::Positive);
        graph
    }

    fn fan_out_grid(graph: &Graph, config: &LayoutConfig) -> TrackedGrid {
        let motifs = vec![Motif::link("O1", "O3"), Motif::link("O2", "O3")];
        TrackedGrid::from_motifs(
            &motifs,
            |id| {
                let n = graph.node(id).unwrap();
                (n.width, n.height)
            },
            TreeFlow::FromSource,
            None,
            config,
        )
        .unwrap()
    }

    fn members() -> BTreeSet<String> {
        ["G", "O1", "O2", "O3", "F1"].iter().map(|s| s.to_string()).collect()
    }

    fn plan(graph: &Graph, grid: &TrackedGrid, config: &LayoutConfig) -> GridLinkRouter {
        let jumpers: BTreeSet<String> = ["F1".to_string()].into_iter().collect();
        let order = vec!["G".to_string(), "F1".to_string()];
        let members = members();
        let input = RouterInput {
            side: FanSide::FanOut,
            core: "G",
            grid,
            links: graph.links.values().collect(),
            source_order: &order,
            jumper_sources: &jumpers,
            members: &members,
        };
        GridLinkRouter::plan(&input, graph, &PadLedger::new(), config).unwrap()
    }

    #[test]
    fn classifies_fan_out_links() {
        let config = LayoutConfig::default();
        let graph = fan_out_graph();
        let grid = fan_out_grid(&graph, &config);
        let router = plan(&graph, &grid, &config);
        assert_eq!(router.class_of("g-o1"), Some(GridLinkClass::EnterFromLeft));
        assert_eq!(router.class_of("g-o2"), Some(GridLinkClass::EnterFromLeft));
        assert_eq!(router.class_of("o1-o3"), Some(GridLinkClass::SameRow));
        assert_eq!(router.class_of("o2-o3"), Some(GridLinkClass::CrossRow));
        assert_eq!(router.class_of("f1-o3"), Some(GridLinkClass::CoreJumping));
        assert!(router.core_jumpers().contains("f1-o3"));
        assert_eq!(router.top_reservations(), 1);
    }

    #[test]
    fn landing_pads_are_unique_per_node() {
        let config = LayoutConfig::default();
        let graph = fan_out_graph();
        let grid = fan_out_grid(&graph, &config);
        let router = plan(&graph, &grid, &config);
        let o3: Vec<usize> = ["o1-o3", "o2-o3", "f1-o3"]
            .iter()
            .map(|l| router.pad_plan().get(l).unwrap().landing)
            .collect();
        assert_eq!(o3[0], 0);
        let unique: BTreeSet<usize> = o3.iter().copied().collect();
        assert_eq!(unique.len(), 3);
        // The row track (nearer) lands left of the jumper's top track.
        assert!(o3[1] < o3[2]);
    }

    #[test]
    fn reservations_widen_grid_and_routes_are_orthogonal() {
        let config = LayoutConfig::default();
        let graph = fan_out_graph();
        let mut grid = fan_out_grid(&graph, &config);
        let router = plan(&graph, &grid, &config);
        let before = grid.height();
        router.apply_reservations(&mut grid);
        assert!(grid.height() > before);

        let origin = (100.0, 100.0);
        let placements = grid.placements(origin);
        let pads = PadLedger::new();
        let geo = GridGeometry {
            origin,
            grid: &grid,
            placements: &placements,
            graph: &graph,
            pads: &pads,
            entry_x: 80.0,
        };
        for link in ["g-o1", "o1-o3", "o2-o3", "f1-o3"] {
            let points = router.route(link, &geo).unwrap();
            assert!(points.len() >= 2, "{link}");
            for pair in points.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                assert!(
                    (a.0 - b.0).abs() < 1e-3 || (a.1 - b.1).abs() < 1e-3,
                    "{link}: diagonal segment {a:?} -> {b:?}"
                );
            }
        }
        let jumper = router.route("f1-o3", &geo).unwrap();
        assert_eq!(jumper[0], (80.0, 100.0 - config.trace_spacing));
    }

    #[test]
    fn blocked_left_pad_falls_back_to_top() {
        let config = LayoutConfig::default();
        let graph = fan_out_graph();
        let grid = fan_out_grid(&graph, &config);
        let mut shared = PadLedger::new();
        shared.reserve_landing("O1", 0, "elsewhere");
        let jumpers = BTreeSet::new();
        let order = vec!["G".to_string()];
        let members = members();
        let input = RouterInput {
            side: FanSide::FanOut,
            core: "G",
            grid: &grid,
            links: vec![&graph.links["g-o1"]],
            source_order: &order,
            jumper_sources: &jumpers,
            members: &members,
        };
        let router = GridLinkRouter::plan(&input, &graph, &shared, &config).unwrap();
        assert_eq!(router.class_of("g-o1"), Some(GridLinkClass::DropFromAbove));
        assert_eq!(router.pad_plan().get("g-o1").unwrap().landing, 1);
        assert_eq!(router.top_reservations(), 1);
    }

    #[test]
    fn pads_committed_by_another_cluster_are_kept() {
        let config = LayoutConfig::default();
        let mut graph = fan_out_graph();
        graph.add_node("X", NodeKind::Gene);
        graph.add_link("x-o1", "X", "O1", LinkSign::Positive);
        graph.add_link("x-o3", "X", "O3", LinkSign::Positive);
        let grid = fan_out_grid(&graph, &config);
        let mut shared = PadLedger::new();
        shared.commit(&graph.links["x-o1"], PadResult::new(0, 0), "X");
        shared.commit(&graph.links["x-o3"], PadResult::new(0, 3), "X");

        let jumpers = BTreeSet::new();
        let order = vec!["G".to_string(), "X".to_string()];
        let members = members();
        let input = RouterInput {
            side: FanSide::FanOut,
            core: "G",
            grid: &grid,
            links: vec![&graph.links["x-o1"], &graph.links["x-o3"], &graph.links["o1-o3"]],
            source_order: &order,
            jumper_sources: &jumpers,
            members: &members,
        };
        let router = GridLinkRouter::plan(&input, &graph, &shared, &config).unwrap();
        assert_eq!(router.class_of("x-o1"), Some(GridLinkClass::EnterFromLeft));
        assert_eq!(router.pad_plan().get("x-o1"), shared.get("x-o1"));
        assert_eq!(router.class_of("x-o3"), Some(GridLinkClass::DropFromAbove));
        assert_eq!(router.pad_plan().get("x-o3"), shared.get("x-o3"));
        assert_eq!(router.top_reservations(), 1);
        // The in-grid link steers around the pad X already holds.
        let own = router.pad_plan().get("o1-o3").unwrap().landing;
        assert_ne!(own, 3);

        let origin = (100.0, 100.0);
        let placements = grid.placements(origin);
        let geo = GridGeometry {
            origin,
            grid: &grid,
            placements: &placements,
            graph: &graph,
            pads: &shared,
            entry_x: 80.0,
        };
        let o1 = graph.node("O1").unwrap();
        let end = *router.route("x-o1", &geo).unwrap().last().unwrap();
        assert_eq!(end, landing_anchor(o1, 4, 0, placements["O1"]).1);
    }

    #[test]
    fn owned_link_may_move_its_own_left_pad() {
        let config = LayoutConfig::default();
        let graph = fan_out_graph();
        let grid = fan_out_grid(&graph, &config);
        let mut shared = PadLedger::new();
        shared.commit(&graph.links["g-o1"], PadResult::new(0, 0), "Y");
        let jumpers = BTreeSet::new();
        let order = vec!["G".to_string()];
        let members = members();
        let input = RouterInput {
            side: FanSide::FanOut,
            core: "G",
            grid: &grid,
            links: vec![&graph.links["g-o1"]],
            source_order: &order,
            jumper_sources: &jumpers,
            members: &members,
        };
        let router = GridLinkRouter::plan(&input, &graph, &shared, &config).unwrap();
        assert_eq!(router.class_of("g-o1"), Some(GridLinkClass::EnterFromLeft));
        assert_eq!(router.pad_plan().get("g-o1").unwrap().landing, 0);
        assert_eq!(router.top_reservations(), 0);
    }
}
