use crate::ir::Graph;
use crate::layout::{GeneAndSatelliteCluster, LayoutResult, LinkMap, TrackPos};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct ClusterDump {
    pub style: String,
    pub width: f32,
    pub height: f32,
    pub clusters: Vec<ClusterEntryDump>,
    pub nodes: Vec<NodeDump>,
    pub links: Vec<LinkDump>,
}

#[derive(Debug, Serialize)]
pub struct ClusterEntryDump {
    pub core: String,
    pub phase: String,
    pub fan_in_type: String,
    pub fan_in: Vec<String>,
    pub fan_out: Vec<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub id: String,
    pub kind: String,
    pub cluster: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub pads: usize,
}

#[derive(Debug, Serialize)]
pub struct LinkDump {
    pub id: String,
    pub from: String,
    pub to: String,
    pub landing_pad: Option<usize>,
    pub points: Vec<[f32; 2]>,
    /// Ends still waiting for a placement outside the dumped clusters.
    pub pending: usize,
}

impl ClusterDump {
    /// Collects placed clusters and their routes. Clusters that were never
    /// placed are listed with a zero-sized envelope.
    pub fn from_clusters(
        clusters: &[GeneAndSatelliteCluster],
        graph: &Graph,
        routes: &LinkMap,
    ) -> LayoutResult<Self> {
        let mut entries = Vec::with_capacity(clusters.len());
        let mut nodes = Vec::new();
        let mut width: f32 = 0.0;
        let mut height: f32 = 0.0;
        let mut style = String::new();

        for cluster in clusters {
            style = format!("{:?}", cluster.config().style);
            let (x, y) = cluster.base().unwrap_or((0.0, 0.0));
            let (w, h) = match cluster.base() {
                Some(_) => {
                    let dims = cluster.get_cluster_dims(graph)?;
                    (dims.width, dims.height)
                }
                None => (0.0, 0.0),
            };
            width = width.max(x + w);
            height = height.max(y + h);
            entries.push(ClusterEntryDump {
                core: cluster.core_id().to_string(),
                phase: format!("{:?}", cluster.phase()),
                fan_in_type: format!("{:?}", cluster.fan_in_type()),
                fan_in: cluster.fan_in_nodes().iter().cloned().collect(),
                fan_out: cluster.fan_out_nodes().iter().cloned().collect(),
                x,
                y,
                width: w,
                height: h,
            });

            for (id, (nx, ny)) in cluster.placements() {
                let Some(node) = graph.node(id) else {
                    continue;
                };
                let pads = cluster.pad_plan().capacity(node);
                let (nw, nh) = node.footprint_for(pads);
                nodes.push(NodeDump {
                    id: id.clone(),
                    kind: format!("{:?}", node.kind),
                    cluster: cluster.core_id().to_string(),
                    x: *nx,
                    y: *ny,
                    width: nw,
                    height: nh,
                    pads,
                });
            }
        }

        let mut links = Vec::new();
        for data in routes.values() {
            for link_id in data.links() {
                let Some(link) = graph.link(link_id) else {
                    continue;
                };
                let positions = data.positions(link_id);
                let landing_pad = clusters
                    .iter()
                    .find_map(|c| c.pad_plan().get(link_id))
                    .map(|r| r.landing);
                links.push(LinkDump {
                    id: link.id.clone(),
                    from: link.src.clone(),
                    to: link.trg.clone(),
                    landing_pad,
                    points: positions
                        .iter()
                        .filter_map(TrackPos::point)
                        .map(|(x, y)| [x, y])
                        .collect(),
                    pending: positions.iter().filter(|p| p.is_pending()).count(),
                });
            }
        }

        Ok(ClusterDump {
            style,
            width,
            height,
            clusters: entries,
            nodes,
            links,
        })
    }
}

pub fn write_cluster_dump(
    path: &Path,
    clusters: &[GeneAndSatelliteCluster],
    graph: &Graph,
    routes: &LinkMap,
) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = ClusterDump::from_clusters(clusters, graph, routes)?;
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}
