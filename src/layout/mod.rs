//! Cluster layout for gene regulatory networks.
//!
//! A cluster is a core node with its fan-in and fan-out satellites. Fan
//! nodes are laid out on tracked grids, pads are planned per cluster and
//! merged into a shared ledger, and routes accumulate per source node.

pub mod cluster;
pub mod diagnostics;
pub mod drop_oracle;
pub mod error;
pub mod grid;
pub mod grid_router;
pub mod link_data;
pub mod pads;
pub mod tracked_grid;

pub use cluster::{
    ClusterDims, ClusterFlags, ClusterGroups, ClusterPhase, FanInType, GeneAndSatelliteCluster,
    LinkClass, LinkMap, merge_link_maps,
};
pub use diagnostics::{FailureContext, LayoutDiagnostics, NoopDiagnostics, PassId, RecordingDiagnostics};
pub use drop_oracle::{DropDirection, DropDirectionOracle};
pub use error::{LayoutError, LayoutResult};
pub use grid::{Grid, GridDir};
pub use grid_router::{FanSide, GridLinkClass, GridLinkRouter};
pub use link_data::{
    BorderCrossing, ExitFramework, PendingAnchor, RectEdge, SpecialtyLayoutLinkData, SpliceOutcome,
    TrackPos,
};
pub use pads::{ChangeSink, NodeChange, PadChange, PadLedger, PadResult, PadSide};
pub use tracked_grid::{Motif, TrackedGrid, TreeFlow};

use serde::Serialize;

pub type Point = (f32, f32);

const EPS: f32 = 1e-4;

pub fn same_point(a: Point, b: Point) -> bool {
    (a.0 - b.0).abs() <= EPS && (a.1 - b.1).abs() <= EPS
}

pub(crate) fn snap_point(p: Point, unit: f32) -> Point {
    let unit = unit.max(1.0);
    ((p.0 / unit).round() * unit, (p.1 / unit).round() * unit)
}

/// Two-segment orthogonal bridge from `a` to `b`, horizontal first.
pub(crate) fn elbow(a: Point, b: Point) -> Vec<Point> {
    if same_point(a, b) {
        return vec![a];
    }
    if (a.0 - b.0).abs() <= EPS || (a.1 - b.1).abs() <= EPS {
        return vec![a, b];
    }
    vec![a, (b.0, a.1), b]
}

/// Drops repeated points and interior points of straight runs.
pub(crate) fn compress_path(points: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        if out.last().is_some_and(|last| same_point(*last, p)) {
            continue;
        }
        if out.len() >= 2 {
            let a = out[out.len() - 2];
            let b = out[out.len() - 1];
            let vertical = (a.0 - b.0).abs() <= EPS && (b.0 - p.0).abs() <= EPS;
            let horizontal = (a.1 - b.1).abs() <= EPS && (b.1 - p.1).abs() <= EPS;
            let forward = (b.0 - a.0) * (p.0 - b.0) + (b.1 - a.1) * (p.1 - b.1) > 0.0;
            if (vertical || horizontal) && forward {
                out.pop();
            }
        }
        out.push(p);
    }
    out
}

pub(crate) fn is_orthogonal(points: &[Point]) -> bool {
    points
        .windows(2)
        .all(|w| (w[0].0 - w[1].0).abs() <= EPS || (w[0].1 - w[1].1).abs() <= EPS)
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Inclusive of the border.
    pub fn contains(&self, p: Point) -> bool {
        p.0 >= self.x - EPS && p.0 <= self.right() + EPS && p.1 >= self.y - EPS && p.1 <= self.bottom() + EPS
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right() && other.x < self.right() && self.y < other.bottom() && other.y < self.bottom()
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(x, y, self.right().max(other.right()) - x, self.bottom().max(other.bottom()) - y)
    }

    /// Point where segment `a -> b` crosses the border.
    ///
    /// Leaving (a inside) takes the first hit along the segment; entering
    /// takes the last.
    pub fn crossing(&self, a: Point, b: Point) -> Option<(Point, RectEdge)> {
        let (dx, dy) = (b.0 - a.0, b.1 - a.1);
        let mut hits: Vec<(f32, Point, RectEdge)> = Vec::new();
        if dx.abs() > EPS {
            for (x, edge) in [(self.x, RectEdge::Left), (self.right(), RectEdge::Right)] {
                let t = (x - a.0) / dx;
                let y = a.1 + t * dy;
                if (-EPS..=1.0 + EPS).contains(&t) && y >= self.y - EPS && y <= self.bottom() + EPS {
                    hits.push((t, (x, y), edge));
                }
            }
        }
        if dy.abs() > EPS {
            for (y, edge) in [(self.y, RectEdge::Top), (self.bottom(), RectEdge::Bottom)] {
                let t = (y - a.1) / dy;
                let x = a.0 + t * dx;
                if (-EPS..=1.0 + EPS).contains(&t) && x >= self.x - EPS && x <= self.right() + EPS {
                    hits.push((t, (x, y), edge));
                }
            }
        }
        let pick = if self.contains(a) {
            hits.into_iter()
                .filter(|(t, _, _)| *t > EPS)
                .min_by(|l, r| l.0.total_cmp(&r.0))
        } else {
            hits.into_iter().max_by(|l, r| l.0.total_cmp(&r.0))
        };
        pick.map(|(_, p, edge)| (p, edge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_leaving_and_entering() {
        let rect = Rect::new(0.0, 0.0, 100.0, 50.0);
        let (p, edge) = rect.crossing((50.0, 25.0), (150.0, 25.0)).unwrap();
        assert_eq!(p, (100.0, 25.0));
        assert_eq!(edge, RectEdge::Right);
        let (p, edge) = rect.crossing((50.0, -40.0), (50.0, 25.0)).unwrap();
        assert_eq!(p, (50.0, 0.0));
        assert_eq!(edge, RectEdge::Top);
        assert!(rect.crossing((150.0, 25.0), (200.0, 25.0)).is_none());
    }

    #[test]
    fn compress_path_drops_collinear_points() {
        let path = vec![(0.0, 0.0), (5.0, 0.0), (10.0, 0.0), (10.0, 0.0), (10.0, 10.0)];
        assert_eq!(compress_path(&path), vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        // A reversal is kept so spikes stay visible to normalisation.
        let spike = vec![(0.0, 0.0), (10.0, 0.0), (5.0, 0.0)];
        assert_eq!(compress_path(&spike).len(), 3);
    }

    #[test]
    fn elbow_is_orthogonal() {
        let route = elbow((0.0, 0.0), (10.0, 20.0));
        assert_eq!(route, vec![(0.0, 0.0), (10.0, 0.0), (10.0, 20.0)]);
        assert!(is_orthogonal(&route));
        assert_eq!(elbow((1.0, 1.0), (1.0, 1.0)).len(), 1);
    }

    #[test]
    fn rect_union_and_contains() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(20.0, 5.0, 10.0, 10.0);
        let u = a.union(&b);
        assert_eq!(u, Rect::new(0.0, 0.0, 30.0, 15.0));
        assert!(u.contains((30.0, 15.0)));
        assert!(!a.intersects(&b));
    }
}
