use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Width of one landing pad slot along a glyph edge.
pub const GLYPH_PAD_WIDTH: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    Gene,
    Bubble,
    Box,
    Diamond,
    Intercell,
    Slash,
    Bare,
}

impl NodeKind {
    pub fn default_pad_count(self) -> usize {
        match self {
            NodeKind::Gene => 5,
            NodeKind::Slash => 2,
            NodeKind::Bubble
            | NodeKind::Box
            | NodeKind::Diamond
            | NodeKind::Intercell
            | NodeKind::Bare => 4,
        }
    }

    /// Pads added per growth step; zero means the glyph cannot be lengthened.
    pub fn pad_growth(self) -> usize {
        match self {
            NodeKind::Gene | NodeKind::Box => 1,
            _ => 0,
        }
    }

    pub fn supports_simple_fan_in(self) -> bool {
        matches!(self, NodeKind::Bubble | NodeKind::Diamond | NodeKind::Slash)
    }

    pub fn allows_pad_sharing(self) -> bool {
        matches!(self, NodeKind::Intercell)
    }

    /// Genes only accept links on their top edge.
    pub fn has_left_pad(self) -> bool {
        !matches!(self, NodeKind::Gene)
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "gene" => Some(Self::Gene),
            "bubble" => Some(Self::Bubble),
            "box" => Some(Self::Box),
            "diamond" => Some(Self::Diamond),
            "intercell" => Some(Self::Intercell),
            "slash" => Some(Self::Slash),
            "bare" => Some(Self::Bare),
            _ => None,
        }
    }

    fn footprint(self, pad_count: usize) -> (f32, f32) {
        match self {
            NodeKind::Gene => (pad_count as f32 * GLYPH_PAD_WIDTH + 20.0, 20.0),
            NodeKind::Box => (pad_count as f32 * GLYPH_PAD_WIDTH, 20.0),
            NodeKind::Bubble | NodeKind::Diamond | NodeKind::Slash => (10.0, 10.0),
            NodeKind::Intercell => (20.0, 20.0),
            NodeKind::Bare => (30.0, 10.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Right,
    Left,
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub pad_count: usize,
    pub width: f32,
    pub height: f32,
    pub orientation: Orientation,
}

impl Node {
    pub fn new(id: &str, kind: NodeKind) -> Self {
        let pad_count = kind.default_pad_count();
        let (width, height) = kind.footprint(pad_count);
        Self {
            id: id.to_string(),
            kind,
            pad_count,
            width,
            height,
            orientation: Orientation::Right,
        }
    }

    pub fn has_default_pads(&self) -> bool {
        self.pad_count == self.kind.default_pad_count()
    }

    /// Glyph footprint if the node were lengthened to `pad_count` pads.
    pub fn footprint_for(&self, pad_count: usize) -> (f32, f32) {
        if self.kind.pad_growth() == 0 || pad_count <= self.pad_count {
            return (self.width, self.height);
        }
        let extra = (pad_count - self.pad_count) as f32 * GLYPH_PAD_WIDTH;
        (self.width + extra, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkSign {
    Positive,
    Negative,
    Neutral,
}

impl LinkSign {
    /// Arbitrary but fixed tie-break rank for links sharing a source.
    pub fn rank(self) -> u8 {
        match self {
            LinkSign::Positive => 0,
            LinkSign::Negative => 1,
            LinkSign::Neutral => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub src: String,
    pub trg: String,
    pub launch_pad: usize,
    pub landing_pad: usize,
    pub sign: LinkSign,
}

impl Link {
    pub fn is_self_loop(&self) -> bool {
        self.src == self.trg
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: BTreeMap<String, Node>,
    pub links: BTreeMap<String, Link>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: &str, kind: NodeKind) -> &mut Node {
        self.nodes
            .entry(id.to_string())
            .or_insert_with(|| Node::new(id, kind))
    }

    pub fn add_link(&mut self, id: &str, src: &str, trg: &str, sign: LinkSign) -> &mut Link {
        self.links.entry(id.to_string()).or_insert_with(|| Link {
            id: id.to_string(),
            src: src.to_string(),
            trg: trg.to_string(),
            launch_pad: 0,
            landing_pad: 0,
            sign,
        })
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn link(&self, id: &str) -> Option<&Link> {
        self.links.get(id)
    }

    pub fn index(&self) -> LinkIndex {
        LinkIndex::for_links(self, self.links.keys().map(String::as_str))
    }
}

/// Source/target index over a subset of a graph's links.
#[derive(Debug, Clone, Default)]
pub struct LinkIndex {
    inbound: BTreeMap<String, BTreeSet<String>>,
    outbound: BTreeMap<String, BTreeSet<String>>,
    between: BTreeMap<(String, String), BTreeSet<String>>,
    links: BTreeSet<String>,
}

impl LinkIndex {
    pub fn for_links<'a>(graph: &Graph, link_ids: impl IntoIterator<Item = &'a str>) -> Self {
        let mut index = Self::default();
        for link_id in link_ids {
            let Some(link) = graph.link(link_id) else {
                continue;
            };
            index.links.insert(link.id.clone());
            index
                .outbound
                .entry(link.src.clone())
                .or_default()
                .insert(link.id.clone());
            index
                .inbound
                .entry(link.trg.clone())
                .or_default()
                .insert(link.id.clone());
            index
                .between
                .entry((link.src.clone(), link.trg.clone()))
                .or_default()
                .insert(link.id.clone());
        }
        index
    }

    pub fn links(&self) -> &BTreeSet<String> {
        &self.links
    }

    pub fn contains(&self, link_id: &str) -> bool {
        self.links.contains(link_id)
    }

    pub fn inbound(&self, node_id: &str) -> impl Iterator<Item = &str> {
        self.inbound
            .get(node_id)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn outbound(&self, node_id: &str) -> impl Iterator<Item = &str> {
        self.outbound
            .get(node_id)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn inbound_count(&self, node_id: &str) -> usize {
        self.inbound.get(node_id).map_or(0, BTreeSet::len)
    }

    pub fn outbound_count(&self, node_id: &str) -> usize {
        self.outbound.get(node_id).map_or(0, BTreeSet::len)
    }

    /// Links running from `src` to `trg` (direction matters).
    pub fn between(&self, src: &str, trg: &str) -> Vec<&str> {
        self.between
            .get(&(src.to_string(), trg.to_string()))
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn distinct_sources(&self, graph: &Graph, node_id: &str) -> BTreeSet<String> {
        self.inbound(node_id)
            .filter_map(|link_id| graph.link(link_id))
            .map(|link| link.src.clone())
            .collect()
    }

    pub fn targets(&self, graph: &Graph, node_id: &str) -> BTreeSet<String> {
        self.outbound(node_id)
            .filter_map(|link_id| graph.link(link_id))
            .map(|link| link.trg.clone())
            .collect()
    }

    pub fn neighbors(&self, graph: &Graph, node_id: &str) -> BTreeSet<String> {
        let mut out = self.distinct_sources(graph, node_id);
        out.extend(self.targets(graph, node_id));
        out.remove(node_id);
        out
    }

    /// Every node that is an endpoint of an indexed link.
    pub fn nodes(&self) -> BTreeSet<String> {
        self.inbound
            .keys()
            .chain(self.outbound.keys())
            .cloned()
            .collect()
    }
}
