pub mod config;
pub mod ir;
pub mod layout;
pub mod layout_dump;

pub use config::{LayoutConfig, LayoutStyle, load_config};
pub use ir::{Graph, Link, LinkSign, Node, NodeKind};
pub use layout::{GeneAndSatelliteCluster, LayoutError, LayoutResult};
