use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::{Point, Rect, same_point};

/// An endpoint that can only be resolved once the owning node is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PendingAnchor {
    Launch { node: String },
    Landing { node: String, pad: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TrackPos {
    Fixed(Point),
    Pending(PendingAnchor),
}

impl TrackPos {
    pub fn point(&self) -> Option<Point> {
        match self {
            TrackPos::Fixed(p) => Some(*p),
            TrackPos::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, TrackPos::Pending(_))
    }

    fn same_as(&self, other: &TrackPos) -> bool {
        match (self, other) {
            (TrackPos::Fixed(a), TrackPos::Fixed(b)) => same_point(*a, *b),
            (TrackPos::Pending(a), TrackPos::Pending(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Point> for TrackPos {
    fn from(p: Point) -> Self {
        TrackPos::Fixed(p)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RectEdge {
    Top,
    Bottom,
    Left,
    Right,
}

/// Where a route leaves or enters a rectangle; `segment` is the index of
/// the point that starts the crossing segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BorderCrossing {
    pub point: Point,
    pub edge: RectEdge,
    pub segment: usize,
}

/// Named anchor points used to splice a source's geometry into a
/// neighbouring subgraph.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExitFramework {
    anchors: BTreeMap<String, Point>,
}

impl ExitFramework {
    pub fn set(&mut self, name: &str, point: Point) {
        self.anchors.insert(name.to_string(), point);
    }

    pub fn get(&self, name: &str) -> Option<Point> {
        self.anchors.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.anchors.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    fn shift(&mut self, dx: f32, dy: f32) {
        for p in self.anchors.values_mut() {
            *p = (p.0 + dx, p.1 + dy);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpliceOutcome {
    Joined,
    /// No shared point was found; an orthogonal elbow bridges `from` to `to`.
    Fallback { from: Point, to: Point },
}

/// Ordered route points for every link leaving one source node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecialtyLayoutLinkData {
    src_id: String,
    link_order: Vec<String>,
    positions: BTreeMap<String, Vec<TrackPos>>,
    exits: ExitFramework,
    crossings: BTreeMap<String, Vec<BorderCrossing>>,
}

impl SpecialtyLayoutLinkData {
    pub fn new(src_id: &str) -> Self {
        Self {
            src_id: src_id.to_string(),
            link_order: Vec::new(),
            positions: BTreeMap::new(),
            exits: ExitFramework::default(),
            crossings: BTreeMap::new(),
        }
    }

    pub fn src_id(&self) -> &str {
        &self.src_id
    }

    pub fn start_link(&mut self, link_id: &str) {
        if !self.positions.contains_key(link_id) {
            self.positions.insert(link_id.to_string(), Vec::new());
            self.link_order.push(link_id.to_string());
        }
    }

    pub fn has_link(&self, link_id: &str) -> bool {
        self.positions.contains_key(link_id)
    }

    pub fn links(&self) -> impl Iterator<Item = &str> {
        self.link_order.iter().map(String::as_str)
    }

    pub fn link_count(&self) -> usize {
        self.link_order.len()
    }

    pub fn positions(&self, link_id: &str) -> &[TrackPos] {
        self.positions.get(link_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fixed points of a link, skipping unresolved placeholders.
    pub fn points(&self, link_id: &str) -> Vec<Point> {
        self.positions(link_id)
            .iter()
            .filter_map(TrackPos::point)
            .collect()
    }

    pub fn last_point(&self, link_id: &str) -> Option<Point> {
        self.positions(link_id).iter().rev().find_map(TrackPos::point)
    }

    /// Appends a point unless it repeats the link's last point.
    pub fn add_position(&mut self, link_id: &str, pos: impl Into<TrackPos>) -> bool {
        let pos = pos.into();
        self.start_link(link_id);
        let Some(list) = self.positions.get_mut(link_id) else {
            return false;
        };
        if list.last().is_some_and(|last| last.same_as(&pos)) {
            return false;
        }
        list.push(pos);
        true
    }

    pub fn add_positions<I, P>(&mut self, link_id: &str, positions: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<TrackPos>,
    {
        for pos in positions {
            self.add_position(link_id, pos);
        }
    }

    pub fn add_position_to_front(&mut self, link_id: &str, pos: impl Into<TrackPos>) -> bool {
        let pos = pos.into();
        self.start_link(link_id);
        let Some(list) = self.positions.get_mut(link_id) else {
            return false;
        };
        if list.first().is_some_and(|first| first.same_as(&pos)) {
            return false;
        }
        list.insert(0, pos);
        for crossing in self.crossings.get_mut(link_id).into_iter().flatten() {
            crossing.segment += 1;
        }
        true
    }

    pub fn remove_link(&mut self, link_id: &str) -> Option<Vec<TrackPos>> {
        self.link_order.retain(|l| l != link_id);
        self.crossings.remove(link_id);
        self.positions.remove(link_id)
    }

    pub fn exits(&self) -> &ExitFramework {
        &self.exits
    }

    pub fn exits_mut(&mut self) -> &mut ExitFramework {
        &mut self.exits
    }

    pub fn crossings(&self, link_id: &str) -> &[BorderCrossing] {
        self.crossings.get(link_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pending(&self) -> Vec<(&str, &PendingAnchor)> {
        self.link_order
            .iter()
            .flat_map(|link| {
                self.positions(link).iter().filter_map(move |pos| match pos {
                    TrackPos::Pending(anchor) => Some((link.as_str(), anchor)),
                    TrackPos::Fixed(_) => None,
                })
            })
            .collect()
    }

    /// Replaces placeholders the resolver can answer; returns how many
    /// remain unresolved.
    pub fn resolve<F>(&mut self, resolver: F) -> usize
    where
        F: Fn(&PendingAnchor) -> Option<Point>,
    {
        let mut unresolved = 0;
        for list in self.positions.values_mut() {
            for pos in list.iter_mut() {
                if let TrackPos::Pending(anchor) = pos {
                    match resolver(anchor) {
                        Some(p) => *pos = TrackPos::Fixed(p),
                        None => unresolved += 1,
                    }
                }
            }
        }
        self.normalize();
        unresolved
    }

    /// Removes repeated points and zero-width spikes introduced by
    /// resolution, merging or shifting.
    pub fn normalize(&mut self) {
        for list in self.positions.values_mut() {
            let mut out: Vec<TrackPos> = Vec::with_capacity(list.len());
            for pos in list.drain(..) {
                if out.last().is_some_and(|last| last.same_as(&pos)) {
                    continue;
                }
                // a -> b -> a collapses to a
                if out.len() >= 2 && out[out.len() - 2].same_as(&pos) {
                    out.pop();
                    continue;
                }
                out.push(pos);
            }
            *list = out;
        }
    }

    pub fn shift(&mut self, dx: f32, dy: f32) {
        for list in self.positions.values_mut() {
            for pos in list.iter_mut() {
                if let TrackPos::Fixed(p) = pos {
                    *p = (p.0 + dx, p.1 + dy);
                }
            }
        }
        for crossing in self.crossings.values_mut().flatten() {
            crossing.point = (crossing.point.0 + dx, crossing.point.1 + dy);
        }
        self.exits.shift(dx, dy);
    }

    fn shared_prefix(a: &[TrackPos], b: &[TrackPos]) -> usize {
        a.iter().zip(b).take_while(|(x, y)| x.same_as(y)).count()
    }

    /// Orders links so each one branches off a link listed before it: the
    /// longest route first, then whichever link shares the longest prefix
    /// with the tree built so far.
    pub fn tree_order(&self) -> Vec<String> {
        let mut remaining: Vec<&String> = self.link_order.iter().collect();
        let mut ordered: Vec<String> = Vec::with_capacity(remaining.len());
        let Some(trunk_idx) = remaining
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                self.positions(a)
                    .len()
                    .cmp(&self.positions(b).len())
                    .then(ib.cmp(ia))
            })
            .map(|(idx, _)| idx)
        else {
            return ordered;
        };
        ordered.push(remaining.remove(trunk_idx).clone());

        while !remaining.is_empty() {
            let mut best = 0usize;
            let mut best_shared = 0usize;
            for (idx, link) in remaining.iter().enumerate() {
                let shared = ordered
                    .iter()
                    .map(|placed| {
                        Self::shared_prefix(self.positions(placed), self.positions(link))
                    })
                    .max()
                    .unwrap_or(0);
                if shared > best_shared {
                    best = idx;
                    best_shared = shared;
                }
            }
            ordered.push(remaining.remove(best).clone());
        }
        ordered
    }

    pub fn reorder_for_tree(&mut self) {
        self.link_order = self.tree_order();
    }

    /// Joins a route tail onto an existing link at the first shared point.
    pub fn splice(&mut self, link_id: &str, tail: &[TrackPos]) -> SpliceOutcome {
        self.start_link(link_id);
        let Some(list) = self.positions.get_mut(link_id) else {
            return SpliceOutcome::Joined;
        };
        if list.is_empty() || tail.is_empty() {
            list.extend(tail.iter().cloned());
            return SpliceOutcome::Joined;
        }
        if let Some(idx) = list.iter().rposition(|pos| pos.same_as(&tail[0])) {
            list.truncate(idx + 1);
            list.extend(tail[1..].iter().cloned());
            self.normalize();
            return SpliceOutcome::Joined;
        }
        let last = list.last().cloned();
        if let Some(last) = last {
            if let Some(idx) = tail.iter().position(|pos| pos.same_as(&last)) {
                list.extend(tail[idx + 1..].iter().cloned());
                self.normalize();
                return SpliceOutcome::Joined;
            }
        }
        let from = list.iter().rev().find_map(TrackPos::point);
        let to = tail.iter().find_map(TrackPos::point);
        match (from, to) {
            (Some(from), Some(to)) => {
                list.push(TrackPos::Fixed((to.0, from.1)));
                list.extend(tail.iter().cloned());
                self.normalize();
                SpliceOutcome::Fallback { from, to }
            }
            _ => {
                list.extend(tail.iter().cloned());
                self.normalize();
                SpliceOutcome::Joined
            }
        }
    }

    /// Merges another fragment for the same source. Links this data does
    /// not know are adopted; known links are spliced with the other tail.
    pub fn merge(&mut self, other: &SpecialtyLayoutLinkData) -> Vec<(String, SpliceOutcome)> {
        let mut outcomes = Vec::new();
        for link in &other.link_order {
            let tail = other.positions(link);
            if self.positions(link).is_empty() {
                self.start_link(link);
                self.add_positions(link, tail.iter().cloned());
                if let Some(crossings) = other.crossings.get(link) {
                    self.crossings.insert(link.clone(), crossings.clone());
                }
                continue;
            }
            let outcome = self.splice(link, tail);
            outcomes.push((link.clone(), outcome));
        }
        let names: Vec<String> = other.exits.names().map(str::to_string).collect();
        for name in names {
            if self.exits.get(&name).is_none() {
                if let Some(p) = other.exits.get(&name) {
                    self.exits.set(&name, p);
                }
            }
        }
        outcomes
    }

    /// Records where a link's route crosses the edges of `rect`.
    pub fn mark_border_crossings(&mut self, link_id: &str, rect: &Rect) -> usize {
        let points: Vec<Option<Point>> = self.positions(link_id).iter().map(TrackPos::point).collect();
        let mut found = Vec::new();
        for (idx, pair) in points.windows(2).enumerate() {
            let (Some(a), Some(b)) = (pair[0], pair[1]) else {
                continue;
            };
            if rect.contains(a) == rect.contains(b) {
                continue;
            }
            if let Some((point, edge)) = rect.crossing(a, b) {
                found.push(BorderCrossing {
                    point,
                    edge,
                    segment: idx,
                });
            }
        }
        let count = found.len();
        if count > 0 {
            self.crossings.insert(link_id.to_string(), found);
        }
        count
    }

    /// Keeps only the part of a link up to its first crossing of `rect`'s
    /// border, returning the chopped remainder (starting at the crossing).
    pub fn chop_at_border(&mut self, link_id: &str, rect: &Rect) -> Option<Vec<TrackPos>> {
        if self.crossings(link_id).is_empty() {
            self.mark_border_crossings(link_id, rect);
        }
        let crossing = self.crossings(link_id).first()?.clone();
        let list = self.positions.get_mut(link_id)?;
        let mut rest: Vec<TrackPos> = vec![TrackPos::Fixed(crossing.point)];
        rest.extend(list.drain(crossing.segment + 1..));
        list.push(TrackPos::Fixed(crossing.point));
        self.crossings.insert(link_id.to_string(), vec![crossing]);
        self.normalize();
        Some(rest)
    }

    /// Reassembles links chopped at a shared boundary: a link of `self`
    /// ending at its last crossing is joined to the matching link of `other`
    /// starting at the same crossing point.
    pub fn glue_at_crossings(&mut self, other: &SpecialtyLayoutLinkData) -> BTreeSet<String> {
        let mut glued = BTreeSet::new();
        for link in &other.link_order {
            let Some(mine) = self.crossings(link).last().cloned() else {
                continue;
            };
            let Some(theirs) = other
                .crossings(link)
                .iter()
                .find(|c| same_point(c.point, mine.point))
                .cloned()
            else {
                continue;
            };
            let Some(list) = self.positions.get_mut(link) else {
                continue;
            };
            list.truncate(mine.segment + 1);
            list.push(TrackPos::Fixed(mine.point));
            list.extend(other.positions(link)[theirs.segment + 1..].iter().cloned());
            glued.insert(link.clone());
        }
        if !glued.is_empty() {
            self.normalize();
        }
        glued
    }
}
