use std::collections::{BTreeMap, BTreeSet};

use crate::config::LayoutConfig;

use super::Point;
use super::error::LayoutResult;
use super::grid::Grid;

/// Pairwise adjacency between two fan nodes; `trg == None` keeps an
/// isolated node in the layout.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Motif {
    pub src: String,
    pub trg: Option<String>,
}

impl Motif {
    pub fn link(src: &str, trg: &str) -> Self {
        Self {
            src: src.to_string(),
            trg: Some(trg.to_string()),
        }
    }

    pub fn single(node: &str) -> Self {
        Self {
            src: node.to_string(),
            trg: None,
        }
    }
}

/// Which end of the motif tree anchors row assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeFlow {
    /// Rows follow targets (fan-in trees converge on a sink).
    TowardSink,
    /// Rows follow sources (fan-out trees spread from a root).
    FromSource,
}

/// A [`Grid`] with node footprints and reserved routing tracks.
///
/// Row heights and column widths come from the largest footprint in the row
/// or column plus cell padding and any reserved tracks.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedGrid {
    grid: Grid,
    footprints: BTreeMap<String, (f32, f32)>,
    row_tracks: Vec<usize>,
    col_tracks: Vec<usize>,
    cell_padding: f32,
    trace_spacing: f32,
    grid_unit: f32,
}

impl TrackedGrid {
    pub fn empty(config: &LayoutConfig) -> Self {
        Self::from_grid(Grid::new(0, 0), BTreeMap::new(), config)
    }

    pub fn from_grid(
        grid: Grid,
        footprints: BTreeMap<String, (f32, f32)>,
        config: &LayoutConfig,
    ) -> Self {
        let rows = grid.rows();
        let cols = grid.cols();
        Self {
            grid,
            footprints,
            row_tracks: vec![0; rows],
            col_tracks: vec![0; cols],
            cell_padding: config.cell_padding,
            trace_spacing: config.trace_spacing,
            grid_unit: config.grid_unit,
        }
    }

    /// Lays out the motif tree on a grid: columns by longest-path depth,
    /// rows inherited along the tree in `flow` direction.
    ///
    /// `first` forces a node to the head of the topological order, which
    /// pins it to column zero.
    pub fn from_motifs<F>(
        motifs: &[Motif],
        footprint: F,
        flow: TreeFlow,
        first: Option<&str>,
        config: &LayoutConfig,
    ) -> LayoutResult<Self>
    where
        F: Fn(&str) -> (f32, f32),
    {
        let mut nodes: BTreeSet<String> = BTreeSet::new();
        let mut succ: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut pred: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for motif in motifs {
            nodes.insert(motif.src.clone());
            if let Some(trg) = &motif.trg {
                nodes.insert(trg.clone());
                if trg != &motif.src {
                    succ.entry(motif.src.clone()).or_default().insert(trg.clone());
                    pred.entry(trg.clone()).or_default().insert(motif.src.clone());
                }
            }
        }

        let order = topo_order(&nodes, &succ, &pred, first);
        let mut depth: BTreeMap<&str, usize> = BTreeMap::new();
        for node in &order {
            let d = pred
                .get(node)
                .into_iter()
                .flatten()
                .filter_map(|p| depth.get(p.as_str()).map(|d| d + 1))
                .max()
                .unwrap_or(0);
            depth.insert(node.as_str(), d);
        }
        let cols = depth.values().copied().max().map_or(0, |d| d + 1);

        let mut grid = Grid::new(0, cols);
        let walk: Vec<&String> = match flow {
            TreeFlow::FromSource => order.iter().collect(),
            TreeFlow::TowardSink => order.iter().rev().collect(),
        };
        for node in walk {
            let col = depth[node.as_str()];
            let anchors = match flow {
                TreeFlow::FromSource => pred.get(node),
                TreeFlow::TowardSink => succ.get(node),
            };
            let anchor_row = anchors
                .into_iter()
                .flatten()
                .filter_map(|a| grid.find(a).map(|(r, _)| r))
                .min();
            let row = match anchor_row {
                Some(r) if grid.get(r, col).is_none() => r,
                Some(r) => {
                    let mut target = r + 1;
                    while target < grid.rows() && grid.get(target, col).is_some() {
                        target += 1;
                    }
                    if target >= grid.rows() {
                        grid.insert_row(target);
                    }
                    target
                }
                None => grid.push_row(),
            };
            // Rows were chosen free above; a fresh row is the fallback.
            if grid.place(node, row, col).is_err() {
                let row = grid.push_row();
                grid.place(node, row, col)?;
            }
        }

        let footprints = nodes.iter().map(|n| (n.clone(), footprint(n))).collect();
        Ok(Self::from_grid(grid, footprints, config))
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn rows(&self) -> usize {
        self.grid.rows()
    }

    pub fn cols(&self) -> usize {
        self.grid.cols()
    }

    pub fn is_empty(&self) -> bool {
        self.grid.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.grid.contains(id)
    }

    pub fn cell_of(&self, id: &str) -> Option<(usize, usize)> {
        self.grid.find(id)
    }

    pub fn footprint(&self, id: &str) -> (f32, f32) {
        self.footprints.get(id).copied().unwrap_or((0.0, 0.0))
    }

    /// Removes a node after layout and drops rows and columns it leaves empty.
    pub fn remove_node(&mut self, id: &str) -> bool {
        if self.grid.remove(id).is_none() {
            return false;
        }
        self.footprints.remove(id);
        let rows = self.grid.drop_empty_rows();
        let cols = self.grid.drop_empty_cols();
        self.row_tracks = rows.iter().map(|&r| self.row_tracks[r]).collect();
        self.col_tracks = cols.iter().map(|&c| self.col_tracks[c]).collect();
        true
    }

    pub fn reserve_row_tracks(&mut self, row: usize, count: usize) {
        if let Some(slot) = self.row_tracks.get_mut(row) {
            *slot = (*slot).max(count);
        }
    }

    pub fn reserve_col_tracks(&mut self, col: usize, count: usize) {
        if let Some(slot) = self.col_tracks.get_mut(col) {
            *slot = (*slot).max(count);
        }
    }

    pub fn row_track_count(&self, row: usize) -> usize {
        self.row_tracks.get(row).copied().unwrap_or(0)
    }

    pub fn col_track_count(&self, col: usize) -> usize {
        self.col_tracks.get(col).copied().unwrap_or(0)
    }

    fn content_height(&self, row: usize) -> f32 {
        self.grid
            .row_nodes(row)
            .into_iter()
            .map(|id| self.footprint(id).1)
            .fold(0.0, f32::max)
    }

    fn content_width(&self, col: usize) -> f32 {
        self.grid
            .col_nodes(col)
            .into_iter()
            .map(|id| self.footprint(id).0)
            .fold(0.0, f32::max)
    }

    pub fn row_height(&self, row: usize) -> f32 {
        self.row_track_count(row) as f32 * self.trace_spacing
            + self.content_height(row)
            + self.cell_padding
    }

    pub fn col_width(&self, col: usize) -> f32 {
        self.content_width(col) + self.cell_padding + self.col_track_count(col) as f32 * self.trace_spacing
    }

    pub fn row_top(&self, row: usize) -> f32 {
        (0..row).map(|r| self.row_height(r)).sum()
    }

    pub fn col_left(&self, col: usize) -> f32 {
        (0..col).map(|c| self.col_width(c)).sum()
    }

    pub fn height(&self) -> f32 {
        self.row_top(self.rows())
    }

    pub fn width(&self) -> f32 {
        self.col_left(self.cols())
    }

    fn content_top(&self, row: usize) -> f32 {
        self.row_top(row) + self.row_track_count(row) as f32 * self.trace_spacing + self.cell_padding / 2.0
    }

    /// Vertical centre of a row's content, relative to the grid top.
    pub fn row_center(&self, row: usize) -> f32 {
        self.content_top(row) + self.content_height(row) / 2.0
    }

    /// Horizontal track `k` above a row's content (k = 0 is nearest the row).
    pub fn track_y(&self, row: usize, k: usize) -> f32 {
        self.content_top(row) - (k + 1) as f32 * self.trace_spacing
    }

    /// Vertical channel `k` to the right of a column's content.
    pub fn channel_x(&self, col: usize, k: usize) -> f32 {
        self.col_left(col)
            + self.cell_padding
            + self.content_width(col)
            + k as f32 * self.trace_spacing
    }

    fn snap(&self, value: f32) -> f32 {
        let unit = self.grid_unit.max(1.0);
        (value / unit).round() * unit
    }

    /// Upper-left corner of one node, relative to the grid origin.
    pub fn node_offset(&self, id: &str) -> Option<Point> {
        let (row, col) = self.grid.find(id)?;
        let (_, h) = self.footprint(id);
        let x = self.col_left(col) + self.cell_padding / 2.0;
        let y = self.content_top(row) + (self.content_height(row) - h) / 2.0;
        Some((self.snap(x), self.snap(y)))
    }

    /// Absolute upper-left corner of every node given the grid origin.
    pub fn placements(&self, origin: Point) -> BTreeMap<String, Point> {
        self.grid
            .node_ids()
            .filter_map(|id| {
                self.node_offset(id)
                    .map(|(x, y)| (id.to_string(), (origin.0 + x, origin.1 + y)))
            })
            .collect()
    }
}

fn topo_order(
    nodes: &BTreeSet<String>,
    succ: &BTreeMap<String, BTreeSet<String>>,
    pred: &BTreeMap<String, BTreeSet<String>>,
    first: Option<&str>,
) -> Vec<String> {
    let mut indegree: BTreeMap<String, usize> = nodes
        .iter()
        .map(|n| (n.clone(), pred.get(n).map_or(0, BTreeSet::len)))
        .collect();
    let mut order: Vec<String> = Vec::with_capacity(nodes.len());
    let mut next = first.filter(|f| nodes.contains(*f)).map(str::to_string);

    while order.len() < nodes.len() {
        let node = match next.take() {
            Some(node) => node,
            // Cycles are broken at the node with the fewest unresolved predecessors.
            None => match indegree.iter().min_by_key(|(_, d)| **d) {
                Some((node, _)) => node.clone(),
                None => break,
            },
        };
        indegree.remove(&node);
        for trg in succ.get(&node).into_iter().flatten() {
            if let Some(d) = indegree.get_mut(trg) {
                *d = d.saturating_sub(1);
            }
        }
        order.push(node);
    }
    order
}
