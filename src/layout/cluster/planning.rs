use once_cell::unsync::OnceCell;
use std::cmp::Reverse;
use std::collections::BTreeSet;

use crate::ir::{Graph, Link, Node};
use crate::layout::drop_oracle::DropDirectionOracle;
use crate::layout::error::{LayoutError, LayoutResult};
use crate::layout::grid_router::{FanSide, GridLinkRouter, RouterInput};
use crate::layout::pads::{PadLedger, PadResult, first_top_pad};
use crate::layout::tracked_grid::{Motif, TrackedGrid, TreeFlow};

use super::{ClusterFlags, ClusterPhase, CoreLanes, FanInType, GeneAndSatelliteCluster};

fn sort_links(links: &mut [&Link]) {
    links.sort_by(|a, b| {
        a.src
            .cmp(&b.src)
            .then_with(|| a.sign.rank().cmp(&b.sign.rank()))
            .then_with(|| a.id.cmp(&b.id))
    });
}

impl GeneAndSatelliteCluster {
    /// Builds the fan grids, plans every pad the cluster lands on and
    /// reserves routing lanes, then merges the plan into `shared`.
    ///
    /// Assignments already in `shared` win unless this cluster owns the
    /// link's source; the cluster adopts whatever stands afterwards.
    pub fn prep_phase_two(
        &mut self,
        graph: &Graph,
        shared: &mut PadLedger,
        ddo: Option<DropDirectionOracle>,
    ) -> LayoutResult<()> {
        self.require(ClusterPhase::TopologyBuilt)?;
        if ddo.is_some() {
            self.ddo = ddo;
        }
        let links: Vec<&Link> = self
            .classified_links()
            .iter()
            .filter_map(|id| graph.link(id))
            .collect();

        self.build_grids(graph, &links)?;
        self.flags = ClusterFlags {
            stacked: self.config.is_stacked(),
            has_fan_out: !self.fan_out.is_empty(),
            single_row_fan_in: self.fan_in_grid.rows() == 1,
            fan_in_reaches_fan_out: links
                .iter()
                .any(|l| self.fan_in.contains(&l.src) && self.fan_out.contains(&l.trg)),
            has_feedback: !self.feedback.is_empty() || !self.large_scale_feedback.is_empty(),
        };

        let mut working = shared.clone();
        self.pads = PadLedger::new();
        self.plan_routers(graph, &links, &mut working)?;
        self.pen_order = if self.fan_in_type == FanInType::SimpleFanIn {
            self.order_parent_pens(graph)
        } else {
            Vec::new()
        };
        self.plan_core_pads(graph, &links, &mut working)?;
        self.plan_satellite_pads(graph, &links, &mut working)?;

        shared.merge(&self.pads, &graph.links);
        self.adopt_shared(shared, &links);
        self.dims = OnceCell::new();

        tracing::debug!(
            cluster = %self.core,
            pads = self.pads.len(),
            lanes = self.lanes.total(),
            jumpers = self.core_jumpers.len(),
            fan_in_rows = self.fan_in_grid.rows(),
            fan_out_rows = self.fan_out_grid.rows(),
            "cluster pads planned"
        );
        self.advance(ClusterPhase::PadPlanned);
        Ok(())
    }

    fn build_grids(&mut self, graph: &Graph, links: &[&Link]) -> LayoutResult<()> {
        let footprint = |id: &str| graph.node(id).map_or((0.0, 0.0), |n| (n.width, n.height));
        self.fan_in_grid = TrackedGrid::empty(&self.config);
        self.fan_out_grid = TrackedGrid::empty(&self.config);

        if self.fan_in_type == FanInType::ComplexFanIn {
            let motifs = self.motifs(links, &self.fan_in, |l| {
                self.fan_in.contains(&l.src) && (l.trg == self.core || self.fan_in.contains(&l.trg))
            });
            let mut grid =
                TrackedGrid::from_motifs(&motifs, footprint, TreeFlow::TowardSink, None, &self.config)?;
            grid.remove_node(&self.core);
            self.fan_in_grid = grid;
        }
        if !self.fan_out.is_empty() {
            let motifs = self.motifs(links, &self.fan_out, |l| {
                (l.src == self.core || self.fan_out.contains(&l.src)) && self.fan_out.contains(&l.trg)
            });
            let mut grid = TrackedGrid::from_motifs(
                &motifs,
                footprint,
                TreeFlow::FromSource,
                Some(&self.core),
                &self.config,
            )?;
            grid.remove_node(&self.core);
            self.fan_out_grid = grid;
        }
        Ok(())
    }

    fn motifs<P>(&self, links: &[&Link], members: &BTreeSet<String>, keep: P) -> Vec<Motif>
    where
        P: Fn(&Link) -> bool,
    {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut motifs: Vec<Motif> = Vec::new();
        for link in links {
            if link.is_self_loop() || !keep(link) {
                continue;
            }
            motifs.push(Motif::link(&link.src, &link.trg));
            seen.insert(&link.src);
            seen.insert(&link.trg);
        }
        for node in members {
            if !seen.contains(node.as_str()) {
                motifs.push(Motif::single(node));
            }
        }
        motifs.sort();
        motifs.dedup();
        motifs
    }

    fn plan_routers(
        &mut self,
        graph: &Graph,
        links: &[&Link],
        working: &mut PadLedger,
    ) -> LayoutResult<()> {
        self.fan_in_router = None;
        self.fan_out_router = None;
        self.core_jumpers.clear();
        let inputs: Vec<String> = self.inputs.iter().cloned().collect();
        let members = self.all_nodes_in_cluster();

        if !self.fan_in_grid.is_empty() {
            let grid_links: Vec<&Link> = links
                .iter()
                .copied()
                .filter(|l| !l.is_self_loop())
                .filter(|l| {
                    self.fan_in_grid.contains(&l.trg)
                        || (self.fan_in_grid.contains(&l.src) && l.trg == self.core)
                })
                .collect();
            let no_jumpers = BTreeSet::new();
            let input = RouterInput {
                side: FanSide::FanIn,
                core: &self.core,
                grid: &self.fan_in_grid,
                links: grid_links,
                source_order: &inputs,
                jumper_sources: &no_jumpers,
                members: &members,
            };
            let router = GridLinkRouter::plan(&input, graph, working, &self.config)?;
            router.apply_reservations(&mut self.fan_in_grid);
            self.adopt_router_plan(graph, &router, working)?;
            self.fan_in_router = Some(router);
        }

        if !self.fan_out_grid.is_empty() {
            let grid_links: Vec<&Link> = links
                .iter()
                .copied()
                .filter(|l| !l.is_self_loop() && self.fan_out_grid.contains(&l.trg))
                .collect();
            let mut order: Vec<String> = vec![self.core.clone()];
            order.extend(self.fan_in.iter().cloned());
            order.extend(inputs.iter().cloned());
            let jumpers = self.fan_in.clone();
            let input = RouterInput {
                side: FanSide::FanOut,
                core: &self.core,
                grid: &self.fan_out_grid,
                links: grid_links,
                source_order: &order,
                jumper_sources: &jumpers,
                members: &members,
            };
            let router = GridLinkRouter::plan(&input, graph, working, &self.config)?;
            router.apply_reservations(&mut self.fan_out_grid);
            self.adopt_router_plan(graph, &router, working)?;
            self.core_jumpers = router.core_jumpers().clone();
            self.fan_out_router = Some(router);
        }
        Ok(())
    }

    fn adopt_router_plan(
        &mut self,
        graph: &Graph,
        router: &GridLinkRouter,
        working: &mut PadLedger,
    ) -> LayoutResult<()> {
        for (link_id, result) in router.pad_plan().assignments() {
            let link = graph
                .link(link_id)
                .ok_or_else(|| LayoutError::UnknownLink(link_id.to_string()))?;
            let committer = self.committer_for(&link.src);
            self.pads.commit(link, result, &committer);
            working.commit(link, result, &committer);
        }
        for (node, capacity) in router.pad_plan().grown_nodes(&graph.nodes) {
            self.pads.grow_to(node, capacity);
            working.grow_to(node, capacity);
        }
        Ok(())
    }

    fn commit_landing(
        &mut self,
        link: &Link,
        node: &Node,
        start: usize,
        working: &mut PadLedger,
    ) -> LayoutResult<usize> {
        let committer = self.committer_for(&link.src);
        if let Some(existing) = working.get(&link.id).filter(|_| committer != link.src) {
            self.pads.grow_to(node, working.capacity(node));
            self.pads.commit(link, existing, &committer);
            return Ok(existing.landing);
        }
        let pad = working.next_free_landing(node, start)?;
        let result = PadResult::new(link.launch_pad, pad);
        working.commit(link, result, &committer);
        self.pads.grow_to(node, working.capacity(node));
        self.pads.commit(link, result, &committer);
        Ok(pad)
    }

    /// Orders core landings and reserves the lanes above the core.
    ///
    /// Left-entering links take pads left to right with lanes rising from
    /// the core top, so no drop crosses an earlier horizontal. Links
    /// entering from the right take the remaining pads with lanes rising
    /// right to left.
    fn plan_core_pads(
        &mut self,
        graph: &Graph,
        links: &[&Link],
        working: &mut PadLedger,
    ) -> LayoutResult<()> {
        let core = graph
            .node(&self.core)
            .ok_or_else(|| LayoutError::UnknownNode(self.core.clone()))?;
        let to_core: Vec<&Link> = links.iter().copied().filter(|l| l.trg == self.core).collect();

        let mut externals: Vec<&Link> = to_core
            .iter()
            .copied()
            .filter(|l| !self.is_in_cluster(&l.src))
            .collect();
        sort_links(&mut externals);

        let mut pens: Vec<&Link> = Vec::new();
        for pen in self.pen_order.iter().rev() {
            let mut from_pen: Vec<&Link> = to_core.iter().copied().filter(|l| l.src == *pen).collect();
            sort_links(&mut from_pen);
            pens.extend(from_pen);
        }

        let mut from_grid: Vec<&Link> = to_core
            .iter()
            .copied()
            .filter(|l| self.fan_in_grid.contains(&l.src))
            .collect();
        from_grid.sort_by_key(|l| {
            let cell = self.fan_in_grid.cell_of(&l.src).unwrap_or((0, 0));
            (Reverse(cell.0), Reverse(cell.1), l.id.clone())
        });

        // Self-loops climb the trunk right of the core, so they take the
        // rightmost pads and the lowest right lanes.
        let mut right: Vec<&Link> = to_core
            .iter()
            .copied()
            .filter(|l| self.large_scale_feedback.contains(&l.id))
            .collect();
        sort_links(&mut right);
        let mut loops: Vec<&Link> = to_core.iter().copied().filter(|l| l.is_self_loop()).collect();
        loops.sort_by(|a, b| a.id.cmp(&b.id));
        right.extend(loops);

        self.inbound_order.clear();
        for link in externals.iter().chain(&pens).chain(&from_grid).chain(&right) {
            self.commit_landing(link, core, 0, working)?;
            self.inbound_order.push(link.id.clone());
        }

        self.lanes = CoreLanes::default();
        self.to_core_channels.clear();
        let mut level = 0;
        for link in &externals {
            self.lanes.left.insert(link.id.clone(), level);
            level += 1;
        }
        for link in &pens {
            self.lanes.left.insert(link.id.clone(), level);
            level += 1;
            self.lanes.pen_levels += 1;
            // A pen's second input drops onto its top from the lane above.
            for extra in self.pen_inputs(links, &link.src).into_iter().skip(1) {
                self.lanes.left.insert(extra.id.clone(), level);
                level += 1;
                self.lanes.pen_levels += 1;
            }
        }
        for (j, link) in from_grid.iter().enumerate() {
            self.lanes.left.insert(link.id.clone(), level);
            self.to_core_channels.insert(link.id.clone(), j);
            level += 1;
        }
        let n = right.len();
        for (i, link) in right.iter().enumerate() {
            self.lanes.right.insert(link.id.clone(), n - 1 - i);
        }

        let mut across: BTreeSet<&str> = BTreeSet::new();
        for link in links {
            let crosses = (self.fan_out_grid.contains(&link.trg)
                && (self.fan_in.contains(&link.src) || !self.is_in_cluster(&link.src)))
                || (self.large_scale_feedback.contains(&link.id) && self.fan_in.contains(&link.trg));
            if crosses && !link.is_self_loop() {
                across.insert(&link.src);
            }
        }
        for (k, src) in across.into_iter().enumerate() {
            self.lanes.across.insert(src.to_string(), k);
        }
        Ok(())
    }

    /// Links landing on a simple fan-in pen, external sources first.
    pub(super) fn pen_inputs<'g>(&self, links: &[&'g Link], pen: &str) -> Vec<&'g Link> {
        let mut inputs: Vec<&Link> = links
            .iter()
            .copied()
            .filter(|l| l.trg == pen && !l.is_self_loop())
            .collect();
        inputs.sort_by(|a, b| {
            self.is_in_cluster(&a.src)
                .cmp(&self.is_in_cluster(&b.src))
                .then_with(|| a.src.cmp(&b.src))
                .then_with(|| a.sign.rank().cmp(&b.sign.rank()))
                .then_with(|| a.id.cmp(&b.id))
        });
        inputs
    }

    /// Pen inputs and satellite self-loops; grid-resident landings belong to
    /// the routers.
    fn plan_satellite_pads(
        &mut self,
        graph: &Graph,
        links: &[&Link],
        working: &mut PadLedger,
    ) -> LayoutResult<()> {
        for pen in self.pen_order.clone() {
            let node = graph
                .node(&pen)
                .ok_or_else(|| LayoutError::UnknownNode(pen.clone()))?;
            for link in self.pen_inputs(links, &pen) {
                self.commit_landing(link, node, 0, working)?;
            }
        }
        for link in links.iter().copied() {
            if !link.is_self_loop() || link.src == self.core {
                continue;
            }
            let node = graph
                .node(&link.src)
                .ok_or_else(|| LayoutError::UnknownNode(link.src.clone()))?;
            self.commit_landing(link, node, first_top_pad(node.kind), working)?;
        }
        Ok(())
    }

    fn adopt_shared(&mut self, shared: &PadLedger, links: &[&Link]) {
        for link in links {
            let (Some(mine), Some(standing)) = (self.pads.get(&link.id), shared.get(&link.id)) else {
                continue;
            };
            if mine != standing {
                tracing::debug!(
                    cluster = %self.core,
                    link = %link.id,
                    planned = mine.landing,
                    standing = standing.landing,
                    "pad kept by earlier committer"
                );
                self.pads.commit(link, standing, &link.src);
            }
        }
    }
}
