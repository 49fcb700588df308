use std::collections::{BTreeMap, BTreeSet};

use regnet_layout::config::{LayoutConfig, LayoutStyle};
use regnet_layout::ir::{Graph, LinkSign, NodeKind};
use regnet_layout::layout::drop_oracle::reattach_all;
use regnet_layout::layout::pads::landing_anchor;
use regnet_layout::layout::{
    ChangeSink, ClusterGroups, ClusterPhase, FanInType, GeneAndSatelliteCluster, GridLinkClass,
    LayoutError, LinkMap, NoopDiagnostics, PadLedger, Point, RecordingDiagnostics, TrackPos,
};
use tracing_test::traced_test;

fn all_links(graph: &Graph) -> BTreeSet<String> {
    graph.links.keys().cloned().collect()
}

fn built(graph: &Graph, core: &str, config: &LayoutConfig) -> GeneAndSatelliteCluster {
    let mut cluster = GeneAndSatelliteCluster::new(core, config);
    cluster
        .prep_from_remainders_phase_one(graph, &all_links(graph))
        .expect("topology");
    cluster
}

fn planned(graph: &Graph, core: &str, config: &LayoutConfig) -> GeneAndSatelliteCluster {
    let mut cluster = built(graph, core, config);
    cluster
        .prep_phase_two(graph, &mut PadLedger::new(), None)
        .expect("pad planning");
    cluster
}

fn routed(cluster: &mut GeneAndSatelliteCluster, graph: &Graph) -> LinkMap {
    let mut placements = BTreeMap::new();
    cluster
        .locate_as_source(graph, (0.0, 0.0), &mut placements)
        .expect("placement");
    cluster
        .route_all(graph, &mut ChangeSink::new(), &mut NoopDiagnostics)
        .expect("routing")
}

fn pad_point(cluster: &GeneAndSatelliteCluster, graph: &Graph, link_id: &str) -> Point {
    let link = graph.link(link_id).unwrap();
    let node = graph.node(&link.trg).unwrap();
    let pad = cluster.pad_plan().get(link_id).unwrap().landing;
    let origin = cluster.placement(&link.trg).unwrap();
    landing_anchor(node, cluster.pad_plan().capacity(node), pad, origin).1
}

fn close(a: Point, b: Point) -> bool {
    (a.0 - b.0).abs() < 1e-3 && (a.1 - b.1).abs() < 1e-3
}

/// A core with fan-in, fan-out, external inputs, a self-loop and feedback.
fn mixed_graph() -> Graph {
    let mut graph = Graph::new();
    for gene in ["G", "X1", "X2", "T"] {
        graph.add_node(gene, NodeKind::Gene);
    }
    for bubble in ["F1", "F2", "O1", "O2"] {
        graph.add_node(bubble, NodeKind::Bubble);
    }
    graph.add_node("O3", NodeKind::Box);
    graph.add_link("x1-f1", "X1", "F1", LinkSign::Positive);
    graph.add_link("x2-f2", "X2", "F2", LinkSign::Negative);
    graph.add_link("f2-f1", "F2", "F1", LinkSign::Positive);
    graph.add_link("f1-g", "F1", "G", LinkSign::Positive);
    graph.add_link("x1-g", "X1", "G", LinkSign::Positive);
    graph.add_link("g-g", "G", "G", LinkSign::Negative);
    graph.add_link("g-o1", "G", "O1", LinkSign::Positive);
    graph.add_link("g-o2", "G", "O2", LinkSign::Positive);
    graph.add_link("g-o3", "G", "O3", LinkSign::Positive);
    graph.add_link("o1-o3", "O1", "O3", LinkSign::Positive);
    graph.add_link("o2-o3", "O2", "O3", LinkSign::Negative);
    graph.add_link("o3-g", "O3", "G", LinkSign::Negative);
    graph.add_link("g-t", "G", "T", LinkSign::Positive);
    graph
}

#[test]
fn simple_fan_in_pens_stack_latest_nearest_the_core() {
    let mut graph = Graph::new();
    graph.add_node("G1", NodeKind::Gene);
    graph.add_node("B1", NodeKind::Bubble);
    graph.add_node("B2", NodeKind::Bubble);
    graph.add_link("b1-g1", "B1", "G1", LinkSign::Positive);
    graph.add_link("b2-g1", "B2", "G1", LinkSign::Positive);
    let config = LayoutConfig::default();

    let mut cluster = planned(&graph, "G1", &config);
    assert_eq!(cluster.fan_in_type(), FanInType::SimpleFanIn);
    // (two inbound links + 2) trace spacings, on the grid.
    assert_eq!(cluster.space_for_pen_nodes(), 40.0);

    let b1 = cluster.pad_plan().get("b1-g1").unwrap().landing;
    let b2 = cluster.pad_plan().get("b2-g1").unwrap().landing;
    assert_ne!(b1, b2);
    assert_eq!(cluster.order_parent_pens(&graph), vec!["B1", "B2"]);
    assert!(b2 < b1, "latest pen takes the innermost pad");
    assert_eq!(cluster.get_inbound_link_order(), ["b2-g1", "b1-g1"]);

    let routes = routed(&mut cluster, &graph);
    assert!(cluster.placement("B2").unwrap().1 > cluster.placement("B1").unwrap().1);
    for (src, id) in [("B1", "b1-g1"), ("B2", "b2-g1")] {
        let points = routes[src].points(id);
        assert!(close(*points.last().unwrap(), pad_point(&cluster, &graph, id)));
    }
}

#[test]
fn stacked_single_row_fan_in_is_chopped() {
    let mut graph = Graph::new();
    graph.add_node("G1", NodeKind::Gene);
    graph.add_node("F1", NodeKind::Box);
    graph.add_link("f1-g1", "F1", "G1", LinkSign::Positive);
    let config = LayoutConfig::default();
    assert!(config.is_stacked());

    let mut cluster = planned(&graph, "G1", &config);
    assert_eq!(cluster.fan_in_type(), FanInType::ComplexFanIn);
    assert_eq!(cluster.fan_in_grid().rows(), 1);
    assert!(cluster.can_chop(&graph, "f1-g1"));

    let routes = routed(&mut cluster, &graph);
    let points = routes["F1"].points("f1-g1");
    assert_eq!(points.len(), 3, "{points:?}");
    assert!(close(points[2], pad_point(&cluster, &graph, "f1-g1")));
    assert_eq!(points[0].1, points[1].1);
    assert_eq!(points[1].0, points[2].0);
}

#[test]
fn halo_layout_keeps_the_channel_prefix() {
    let mut graph = Graph::new();
    graph.add_node("G1", NodeKind::Gene);
    graph.add_node("F1", NodeKind::Box);
    graph.add_link("f1-g1", "F1", "G1", LinkSign::Positive);
    let config = LayoutConfig {
        style: LayoutStyle::Halo,
        ..LayoutConfig::default()
    };

    let mut cluster = planned(&graph, "G1", &config);
    assert!(!cluster.can_chop(&graph, "f1-g1"));
    let routes = routed(&mut cluster, &graph);
    let points = routes["F1"].points("f1-g1");
    assert!(points.len() > 3, "{points:?}");
    assert!(close(*points.last().unwrap(), pad_point(&cluster, &graph, "f1-g1")));
}

#[test]
fn fan_in_to_fan_out_link_jumps_the_core() {
    let mut graph = Graph::new();
    graph.add_node("G1", NodeKind::Gene);
    graph.add_node("F1", NodeKind::Bubble);
    graph.add_node("O1", NodeKind::Bubble);
    graph.add_link("f1-g1", "F1", "G1", LinkSign::Positive);
    graph.add_link("f1-o1", "F1", "O1", LinkSign::Positive);
    graph.add_link("g1-o1", "G1", "O1", LinkSign::Positive);
    let groups = ClusterGroups::new("G1").with_fan_in(["F1"]).with_fan_out(["O1"]);

    let mut cluster = GeneAndSatelliteCluster::new("G1", &LayoutConfig::default());
    cluster
        .prep_from_groups_phase_one(&graph, &groups, &all_links(&graph))
        .unwrap();
    cluster
        .prep_phase_two(&graph, &mut PadLedger::new(), None)
        .unwrap();

    assert!(cluster.core_jumpers().contains("f1-o1"));
    let router = cluster.fan_out_router().unwrap();
    assert_eq!(router.class_of("f1-o1"), Some(GridLinkClass::CoreJumping));
    assert!(router.top_reservations() >= 1);
    assert!(!cluster.get_inbound_link_order().contains(&"f1-o1".to_string()));
    assert!(!cluster.links_to_core(&graph).contains("f1-o1"));

    let mut diag = RecordingDiagnostics::default();
    let mut placements = BTreeMap::new();
    cluster
        .locate_as_source(&graph, (0.0, 0.0), &mut placements)
        .unwrap();
    let routes = cluster
        .route_all(&graph, &mut ChangeSink::new(), &mut diag)
        .unwrap();
    assert!(diag.failures.is_empty(), "{:?}", diag.failures);
    let points = routes["F1"].points("f1-o1");
    assert!(close(*points.last().unwrap(), pad_point(&cluster, &graph, "f1-o1")));
}

#[test]
fn every_touching_link_has_exactly_one_class() {
    let graph = mixed_graph();
    let cluster = built(&graph, "G", &LayoutConfig::default());
    let members = cluster.all_nodes_in_cluster();
    let sets = [
        cluster.internal_links(),
        cluster.inbound_links(),
        cluster.outbound_links(),
        cluster.feedback_links(),
    ];
    let total: usize = sets.iter().map(|s| s.len()).sum();
    assert_eq!(total, cluster.classified_links().len());
    for link in graph.links.values() {
        let touches = members.contains(&link.src) || members.contains(&link.trg);
        assert_eq!(cluster.class_of(&link.id).is_some(), touches, "{}", link.id);
    }
    assert!(cluster.large_scale_feedback().contains("o3-g"));
}

#[test]
fn planned_landing_pads_are_unique_per_node() {
    let graph = mixed_graph();
    let cluster = planned(&graph, "G", &LayoutConfig::default());
    let mut seen: BTreeMap<(String, usize), String> = BTreeMap::new();
    for (link_id, result) in cluster.pad_plan().assignments() {
        let link = graph.link(link_id).unwrap();
        let node = graph.node(&link.trg).unwrap();
        assert!(result.landing < cluster.pad_plan().capacity(node));
        if let Some(other) = seen.insert((link.trg.clone(), result.landing), link_id.to_string()) {
            panic!("{link_id} and {other} share pad {} on {}", result.landing, link.trg);
        }
    }
}

#[test]
fn routes_have_no_zero_length_segments() {
    let graph = mixed_graph();
    let mut cluster = planned(&graph, "G", &LayoutConfig::default());
    let routes = routed(&mut cluster, &graph);
    assert!(!routes.is_empty());
    for data in routes.values() {
        for link in data.links() {
            let points: Vec<Option<Point>> = data.positions(link).iter().map(TrackPos::point).collect();
            for pair in points.windows(2) {
                if let (Some(a), Some(b)) = (pair[0], pair[1]) {
                    assert!(!close(a, b), "{link}: repeated point {a:?}");
                }
            }
        }
    }
}

#[test]
fn clones_are_independent() {
    let graph = mixed_graph();
    let original = planned(&graph, "G", &LayoutConfig::default());
    let mut trial = original.clone();
    let mut placements = BTreeMap::new();
    trial
        .locate_as_source(&graph, (100.0, 50.0), &mut placements)
        .unwrap();
    trial.shift_placements(10.0, 0.0);

    assert_eq!(original.phase(), ClusterPhase::PadPlanned);
    assert!(original.placements().is_empty());
    assert_eq!(trial.phase(), ClusterPhase::Placed);

    let mut second = original.clone();
    second
        .locate_as_source(&graph, (0.0, 0.0), &mut BTreeMap::new())
        .unwrap();
    assert_ne!(second.placement("G"), trial.placement("G"));
    assert_eq!(original.pad_plan(), second.pad_plan());
}

#[test]
fn placement_before_pad_planning_is_rejected() {
    let graph = mixed_graph();
    let mut cluster = built(&graph, "G", &LayoutConfig::default());
    let err = cluster
        .locate_as_source(&graph, (0.0, 0.0), &mut BTreeMap::new())
        .unwrap_err();
    assert!(matches!(
        err,
        LayoutError::PhaseOrder {
            expected: ClusterPhase::PadPlanned,
            found: ClusterPhase::TopologyBuilt,
            ..
        }
    ));
}

#[test]
fn core_feeding_its_own_fan_in_is_unclassified() {
    let mut graph = Graph::new();
    graph.add_node("G", NodeKind::Gene);
    graph.add_node("B", NodeKind::Bubble);
    graph.add_link("b-g", "B", "G", LinkSign::Positive);
    graph.add_link("g-b", "G", "B", LinkSign::Positive);
    let groups = ClusterGroups::new("G").with_fan_in(["B"]);
    let mut cluster = GeneAndSatelliteCluster::new("G", &LayoutConfig::default());
    let err = cluster
        .prep_from_groups_phase_one(&graph, &groups, &all_links(&graph))
        .unwrap_err();
    assert!(matches!(err, LayoutError::UnclassifiedLink { .. }));
    assert_eq!(cluster.phase(), ClusterPhase::Created);
}

#[test]
fn shared_pads_agree_across_clusters() {
    let mut graph = Graph::new();
    graph.add_node("G1", NodeKind::Gene);
    graph.add_node("G2", NodeKind::Gene);
    graph.add_node("B", NodeKind::Bubble);
    graph.add_link("g1-b", "G1", "B", LinkSign::Positive);
    graph.add_link("b-g2", "B", "G2", LinkSign::Positive);
    let config = LayoutConfig::default();

    for order in [["G1", "G2"], ["G2", "G1"]] {
        let mut shared = PadLedger::new();
        let mut clusters: Vec<GeneAndSatelliteCluster> =
            order.iter().map(|core| built(&graph, core, &config)).collect();
        for cluster in clusters.iter_mut() {
            cluster.prep_phase_two(&graph, &mut shared, None).unwrap();
        }
        let standing = shared.get("g1-b").unwrap();
        for cluster in &clusters {
            if let Some(mine) = cluster.pad_plan().get("g1-b") {
                assert_eq!(mine, standing, "{order:?}: {}", cluster.core_id());
            }
        }
    }
}

#[test]
fn routes_land_on_the_shared_pad_when_a_node_sits_in_two_clusters() {
    // O is fan-out of G1 and complex fan-in of G2.
    let mut graph = Graph::new();
    graph.add_node("G1", NodeKind::Gene);
    graph.add_node("G2", NodeKind::Gene);
    graph.add_node("O", NodeKind::Box);
    graph.add_link("g1-o", "G1", "O", LinkSign::Positive);
    graph.add_link("o-g2", "O", "G2", LinkSign::Positive);
    let config = LayoutConfig::default();

    let mut clusters = vec![built(&graph, "G1", &config), built(&graph, "G2", &config)];
    let mut shared = PadLedger::new();
    for cluster in clusters.iter_mut() {
        cluster.prep_phase_two(&graph, &mut shared, None).unwrap();
    }
    assert_eq!(clusters[1].pad_plan().get("g1-o"), shared.get("g1-o"));

    let mut x = 0.0;
    let mut checked = 0;
    for cluster in clusters.iter_mut() {
        let mut placements = BTreeMap::new();
        cluster
            .locate_as_source(&graph, (x, 0.0), &mut placements)
            .unwrap();
        x += cluster.get_cluster_dims(&graph).unwrap().width + 100.0;
        let routes = cluster
            .route_all(&graph, &mut ChangeSink::new(), &mut NoopDiagnostics)
            .unwrap();
        for data in routes.values() {
            for id in data.links() {
                let link = graph.link(id).unwrap();
                let Some(origin) = cluster.placement(&link.trg) else {
                    continue;
                };
                if data.positions(id).last().is_none_or(|p| p.is_pending()) {
                    continue;
                }
                let node = graph.node(&link.trg).unwrap();
                let pad = shared.get(id).unwrap().landing;
                let expected = landing_anchor(node, shared.capacity(node), pad, origin).1;
                let end = data.last_point(id).unwrap();
                assert!(
                    close(end, expected),
                    "{} ends at {end:?}, pad {pad} is at {expected:?}",
                    cluster.core_id()
                );
                checked += 1;
            }
        }
    }
    assert!(checked >= 2, "only {checked} routes checked");

    let mut taken = BTreeSet::new();
    for (id, result) in shared.assignments() {
        let trg = &graph.link(id).unwrap().trg;
        assert!(taken.insert((trg.clone(), result.landing)), "{trg} pad {} reused", result.landing);
    }
}

#[test]
fn exits_toward_earlier_clusters_leave_over_the_top() {
    let mut graph = Graph::new();
    graph.add_node("GA", NodeKind::Gene);
    graph.add_node("GB", NodeKind::Gene);
    graph.add_link("ga-gb", "GA", "GB", LinkSign::Positive);
    graph.add_link("gb-ga", "GB", "GA", LinkSign::Negative);
    let config = LayoutConfig::default();

    let mut clusters = vec![built(&graph, "GA", &config), built(&graph, "GB", &config)];
    reattach_all(&mut clusters);
    let mut shared = PadLedger::new();
    for cluster in clusters.iter_mut() {
        cluster.prep_phase_two(&graph, &mut shared, None).unwrap();
        assert!(cluster.drop_oracle().is_some_and(|o| o.is_attached()));
    }

    let mut exits = BTreeMap::new();
    for (idx, cluster) in clusters.iter_mut().enumerate() {
        let base = (idx as f32 * 200.0, 0.0);
        cluster
            .locate_as_source(&graph, base, &mut BTreeMap::new())
            .unwrap();
        let routes = cluster
            .route_all(&graph, &mut ChangeSink::new(), &mut NoopDiagnostics)
            .unwrap();
        let height = cluster.get_cluster_dims(&graph).unwrap().height;
        for data in routes.values() {
            for name in data.exits().names() {
                exits.insert(name.to_string(), (data.exits().get(name).unwrap(), height));
            }
        }
    }

    let (down, height) = exits["ga-gb"];
    assert_eq!(down.1, height);
    let (up, _) = exits["gb-ga"];
    assert_eq!(up.1, 0.0);
}

#[traced_test]
#[test]
fn degenerate_geometry_is_logged_and_reported() {
    let mut graph = Graph::new();
    graph.add_node("G", NodeKind::Gene);
    graph.add_node("O1", NodeKind::Bubble);
    graph.add_link("g-o1", "G", "O1", LinkSign::Positive);
    let mut cluster = planned(&graph, "G", &LayoutConfig::default());
    cluster
        .locate_as_target(&graph, (0.0, 0.0), 0.0, &mut BTreeMap::new())
        .unwrap();
    let mut diag = RecordingDiagnostics::default();
    cluster
        .route_all(&graph, &mut ChangeSink::new(), &mut diag)
        .unwrap();
    assert_eq!(diag.failures.len(), 1);
    assert!(logs_contain("using emergency route"));
}
