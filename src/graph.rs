//! Communication pair graph and force-directed layout.
//!
//! # Layout
//!
//! Fruchterman-Reingold with optimal node distance `k`. Each iteration moves
//! node i by at most the current temperature along
//!
//! dᵢ = Σⱼ (xᵢ - xⱼ) · (k² / |xᵢ - xⱼ|² - wᵢⱼ · |xᵢ - xⱼ| / k)
//!
//! where wᵢⱼ is the (undirected) edge weight normalized to the heaviest pair.
//! The temperature starts at a tenth of the initial spread and cools linearly
//! to zero. Final positions are centered and scaled into [-1, 1].

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::analyzer::PairCount;

/// Minimum distance between two nodes when computing forces.
const MIN_DISTANCE: f64 = 0.01;

/// Directed graph of the top communication pairs.
///
/// Nodes are addresses, edges carry the pair's occurrence count.
#[derive(Debug, Clone, Default)]
pub struct PairGraph {
    graph: DiGraph<String, usize>,
}

impl PairGraph {
    pub fn from_pairs(pairs: &[PairCount]) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

        for pair in pairs {
            let src = *nodes
                .entry(pair.src_ip.as_str())
                .or_insert_with(|| graph.add_node(pair.src_ip.clone()));
            let dst = *nodes
                .entry(pair.dst_ip.as_str())
                .or_insert_with(|| graph.add_node(pair.dst_ip.clone()));
            graph.add_edge(src, dst, pair.count);
        }

        debug!(
            "Built pair graph: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        Self { graph }
    }

    pub fn graph(&self) -> &DiGraph<String, usize> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

/// Node positions in layout space, indexed by `NodeIndex::index()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    positions: Vec<(f64, f64)>,
}

impl Layout {
    pub fn position(&self, node: NodeIndex) -> (f64, f64) {
        self.positions[node.index()]
    }

    #[cfg(test)]
    pub fn positions(&self) -> &[(f64, f64)] {
        &self.positions
    }
}

/// Spring layout parameters.
#[derive(Debug, Clone)]
pub struct SpringLayout {
    /// Optimal distance between nodes.
    pub k: f64,
    pub iterations: usize,
    /// Fixed seed for reproducible layouts (None = fresh entropy).
    pub seed: Option<u64>,
}

impl Default for SpringLayout {
    fn default() -> Self {
        Self {
            k: 0.8,
            iterations: 50,
            seed: None,
        }
    }
}

impl SpringLayout {
    pub fn compute(&self, pair_graph: &PairGraph) -> Layout {
        let graph = pair_graph.graph();
        let n = graph.node_count();

        match n {
            0 => return Layout { positions: vec![] },
            1 => {
                return Layout {
                    positions: vec![(0.0, 0.0)],
                }
            }
            _ => {}
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut positions: Vec<(f64, f64)> =
            (0..n).map(|_| (rng.gen::<f64>(), rng.gen::<f64>())).collect();

        let weights = attraction_weights(pair_graph);

        let mut temperature = spread(&positions) * 0.1;
        let cooling = temperature / (self.iterations as f64 + 1.0);

        for _ in 0..self.iterations {
            let mut displacement = vec![(0.0, 0.0); n];

            for i in 0..n {
                for j in 0..n {
                    if i == j {
                        continue;
                    }
                    let dx = positions[i].0 - positions[j].0;
                    let dy = positions[i].1 - positions[j].1;
                    let distance = (dx * dx + dy * dy).sqrt().max(MIN_DISTANCE);
                    let force = self.k * self.k / (distance * distance)
                        - weights[i][j] * distance / self.k;
                    displacement[i].0 += dx * force;
                    displacement[i].1 += dy * force;
                }
            }

            for (position, (dx, dy)) in positions.iter_mut().zip(displacement) {
                let length = (dx * dx + dy * dy).sqrt().max(MIN_DISTANCE);
                position.0 += dx * temperature / length;
                position.1 += dy * temperature / length;
            }

            temperature -= cooling;
        }

        Layout {
            positions: rescale(positions),
        }
    }
}

/// Symmetric weight matrix, heaviest edge = 1.0.
fn attraction_weights(pair_graph: &PairGraph) -> Vec<Vec<f64>> {
    let graph = pair_graph.graph();
    let n = graph.node_count();
    let max_weight = graph
        .edge_references()
        .map(|e| *e.weight())
        .max()
        .unwrap_or(1)
        .max(1) as f64;

    let mut weights = vec![vec![0.0; n]; n];
    for edge in graph.edge_references() {
        let (a, b) = (edge.source().index(), edge.target().index());
        if a == b {
            continue;
        }
        let w = *edge.weight() as f64 / max_weight;
        weights[a][b] += w;
        weights[b][a] += w;
    }
    weights
}

fn spread(positions: &[(f64, f64)]) -> f64 {
    let (min_x, max_x) = min_max(positions.iter().map(|p| p.0));
    let (min_y, max_y) = min_max(positions.iter().map(|p| p.1));
    (max_x - min_x).max(max_y - min_y)
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

/// Centers positions on their mean and scales the largest coordinate to 1.
fn rescale(positions: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    let n = positions.len() as f64;
    let mean_x = positions.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = positions.iter().map(|p| p.1).sum::<f64>() / n;

    let centered: Vec<(f64, f64)> = positions
        .into_iter()
        .map(|(x, y)| (x - mean_x, y - mean_y))
        .collect();

    let extent = centered
        .iter()
        .map(|(x, y)| x.abs().max(y.abs()))
        .fold(0.0, f64::max);

    if extent == 0.0 {
        return centered;
    }

    centered
        .into_iter()
        .map(|(x, y)| (x / extent, y / extent))
        .collect()
}
