//! HNSW (Hierarchical Navigable Small World) graph index.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{FalcataError, Result};
use crate::index::{GraphControls, VectorIndex};
use crate::metric::DistanceMetric;

/// Default construction-time candidate list size.
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Default search-time candidate list size.
pub const DEFAULT_EF_SEARCH: usize = 16;

const MAX_LEVEL: usize = 16;

/// The layered navigable-small-world graph shared by the float and binary
/// HNSW indexes.
///
/// `nodes[node][level]` holds the neighbor list of `node` at that level;
/// level 0 is the base layer. Distances are supplied by the caller as a
/// closure over its own vector storage, so the graph itself is element-type
/// agnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswGraph {
    /// Entry point node, usually the node present at the highest level.
    entry_point: Option<u32>,
    /// Maximum level currently in the graph.
    max_level: usize,
    /// Maximum number of connections per node for levels above 0.
    m: usize,
    /// Maximum number of connections per node at level 0 (usually 2*M).
    m_max_0: usize,
    ef_construction: usize,
    ef_search: usize,
    nodes: Vec<Vec<Vec<u32>>>,
}

impl HnswGraph {
    /// Create an empty graph with the given connectivity parameter.
    pub fn new(m: usize) -> Self {
        Self {
            entry_point: None,
            max_level: 0,
            m,
            m_max_0: m * 2,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef_search: DEFAULT_EF_SEARCH,
            nodes: Vec::new(),
        }
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The connectivity parameter M.
    pub fn m(&self) -> usize {
        self.m
    }

    /// The current entry point, if any node has been inserted.
    pub fn entry_point(&self) -> Option<u32> {
        self.entry_point
    }

    /// Construction-time candidate list size.
    pub fn ef_construction(&self) -> usize {
        self.ef_construction
    }

    /// Search-time candidate list size.
    pub fn ef_search(&self) -> usize {
        self.ef_search
    }

    /// Override the construction-time candidate list size.
    pub fn set_ef_construction(&mut self, ef_construction: usize) {
        self.ef_construction = ef_construction;
    }

    /// Override the search-time candidate list size.
    pub fn set_ef_search(&mut self, ef_search: usize) {
        self.ef_search = ef_search;
    }

    /// Neighbors of a node at a specific level.
    pub fn neighbors(&self, node: u32, level: usize) -> Option<&[u32]> {
        self.nodes
            .get(node as usize)
            .and_then(|layers| layers.get(level))
            .map(|list| list.as_slice())
    }

    /// Sample the level for a new node.
    fn random_level(&self) -> usize {
        let mut rng = rand::rng();
        let mut level = 0;

        while rand::Rng::random::<f64>(&mut rng) < 0.5 && level < MAX_LEVEL {
            level += 1;
        }

        level
    }

    /// Insert the next node into the graph and return its id.
    ///
    /// The caller must have stored the node's vector before calling, so that
    /// `dist(a, b)` can evaluate any pair of node ids including the new one.
    pub fn insert<F>(&mut self, dist: F) -> u32
    where
        F: Fn(u32, u32) -> f32,
    {
        let node = self.nodes.len() as u32;
        let level = self.random_level();
        self.nodes.push(vec![Vec::new(); level + 1]);

        let Some(mut current) = self.entry_point else {
            self.entry_point = Some(node);
            self.max_level = level;
            return node;
        };

        // Greedy descent through the levels above the insertion level.
        for l in ((level + 1)..=self.max_level).rev() {
            if let Some(&(_, closest)) = self.search_layer(node, current, l, 1, &dist).first() {
                current = closest;
            }
        }

        // Link into every level the new node participates in.
        for l in (0..=level.min(self.max_level)).rev() {
            let candidates = self.search_layer(node, current, l, self.ef_construction, &dist);
            let max_links = if l == 0 { self.m_max_0 } else { self.m };

            let neighbors: Vec<u32> = candidates
                .iter()
                .take(max_links)
                .map(|&(_, id)| id)
                .collect();
            self.nodes[node as usize][l] = neighbors.clone();

            for neighbor in neighbors {
                let links = &mut self.nodes[neighbor as usize][l];
                links.push(node);
                if links.len() > max_links {
                    let mut scored: Vec<(f32, u32)> =
                        links.iter().map(|&other| (dist(neighbor, other), other)).collect();
                    scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
                    *links = scored.into_iter().take(max_links).map(|(_, id)| id).collect();
                }
            }

            if let Some(&(_, closest)) = candidates.first() {
                current = closest;
            }
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(node);
        }

        node
    }

    /// Beam search over one level, returning up to `ef` nodes closest to
    /// `query`, nearest first.
    fn search_layer<F>(
        &self,
        query: u32,
        entry: u32,
        level: usize,
        ef: usize,
        dist: &F,
    ) -> Vec<(f32, u32)>
    where
        F: Fn(u32, u32) -> f32,
    {
        let mut visited: HashSet<u32> = HashSet::new();
        visited.insert(entry);
        visited.insert(query);

        let mut frontier = vec![(dist(query, entry), entry)];
        let mut results = frontier.clone();

        while let Some(candidate) = pop_nearest(&mut frontier) {
            let worst = worst_distance(&results);
            if results.len() >= ef && candidate.0 > worst {
                break;
            }

            let neighbors = self
                .neighbors(candidate.1, level)
                .map(|list| list.to_vec())
                .unwrap_or_default();
            for neighbor in neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }

                let neighbor_dist = dist(query, neighbor);
                if results.len() < ef || neighbor_dist < worst_distance(&results) {
                    frontier.push((neighbor_dist, neighbor));
                    results.push((neighbor_dist, neighbor));
                    if results.len() > ef {
                        remove_worst(&mut results);
                    }
                }
            }
        }

        results.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        results
    }
}

fn pop_nearest(candidates: &mut Vec<(f32, u32)>) -> Option<(f32, u32)> {
    let nearest = candidates
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.0.partial_cmp(&b.1.0).unwrap_or(std::cmp::Ordering::Equal))?
        .0;
    Some(candidates.swap_remove(nearest))
}

fn worst_distance(results: &[(f32, u32)]) -> f32 {
    results
        .iter()
        .map(|&(d, _)| d)
        .fold(f32::NEG_INFINITY, f32::max)
}

fn remove_worst(results: &mut Vec<(f32, u32)>) {
    if let Some(worst) = results
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.0.partial_cmp(&b.1.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
    {
        results.swap_remove(worst);
    }
}

/// A float vector index backed by an HNSW proximity graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswIndex {
    dimension: usize,
    metric: DistanceMetric,
    graph: HnswGraph,
    data: Vec<f32>,
}

impl HnswIndex {
    /// Create an empty HNSW index.
    pub fn new(dimension: usize, m: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            graph: HnswGraph::new(m),
            data: Vec::new(),
        }
    }

    /// The distance metric this index was created with.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// The underlying proximity graph.
    pub fn graph(&self) -> &HnswGraph {
        &self.graph
    }
}

impl VectorIndex for HnswIndex {
    type Elem = f32;

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn code_size(&self) -> usize {
        self.dimension
    }

    fn is_trained(&self) -> bool {
        true
    }

    fn ntotal(&self) -> u64 {
        (self.data.len() / self.dimension) as u64
    }

    fn train(&mut self, _vectors: &[f32]) -> Result<()> {
        Ok(())
    }

    fn add(&mut self, count: usize, vectors: &[f32]) -> Result<()> {
        if vectors.len() != count * self.dimension {
            return Err(FalcataError::index(format!(
                "expected {} elements for {} vectors of dimension {}, got {}",
                count * self.dimension,
                count,
                self.dimension,
                vectors.len()
            )));
        }

        let dimension = self.dimension;
        let metric = self.metric;

        for vector in vectors.chunks(dimension) {
            self.data.extend_from_slice(vector);

            let data = &self.data;
            self.graph.insert(|a, b| {
                let a = &data[a as usize * dimension..(a as usize + 1) * dimension];
                let b = &data[b as usize * dimension..(b as usize + 1) * dimension];
                metric.distance(a, b).unwrap_or(f32::INFINITY)
            });
        }

        Ok(())
    }

    fn reconstruct(&self, position: u64) -> Result<Vec<f32>> {
        if position >= self.ntotal() {
            return Err(FalcataError::index(format!(
                "vector position {position} out of range (ntotal = {})",
                self.ntotal()
            )));
        }

        let start = position as usize * self.dimension;
        Ok(self.data[start..start + self.dimension].to_vec())
    }
}

impl GraphControls for HnswIndex {
    fn set_ef_construction(&mut self, ef_construction: usize) {
        self.graph.set_ef_construction(ef_construction);
    }

    fn set_ef_search(&mut self, ef_search: usize) {
        self.graph.set_ef_search(ef_search);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vectors(count: usize, dimension: usize) -> Vec<f32> {
        (0..count * dimension).map(|i| (i % 17) as f32).collect()
    }

    #[test]
    fn test_insert_builds_connected_graph() {
        let mut index = HnswIndex::new(4, 8, DistanceMetric::L2);
        let vectors = sample_vectors(32, 4);
        index.add(32, &vectors).unwrap();

        assert_eq!(index.ntotal(), 32);

        let graph = index.graph();
        assert!(graph.entry_point().is_some());
        assert_eq!(graph.len(), 32);

        // Every node except possibly the first must have at least one
        // base-layer neighbor.
        for node in 1..32u32 {
            assert!(!graph.neighbors(node, 0).unwrap().is_empty());
        }
    }

    #[test]
    fn test_reconstruct_returns_original_vector() {
        let mut index = HnswIndex::new(3, 4, DistanceMetric::L2);
        index.add(2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();

        assert_eq!(index.reconstruct(0).unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(index.reconstruct(1).unwrap(), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_graph_controls_override_breadth() {
        let mut index = HnswIndex::new(4, 8, DistanceMetric::L2);
        index.set_ef_construction(300);
        index.set_ef_search(75);

        assert_eq!(index.graph().ef_construction(), 300);
        assert_eq!(index.graph().ef_search(), 75);
    }

    #[test]
    fn test_add_rejects_ragged_buffer() {
        let mut index = HnswIndex::new(4, 8, DistanceMetric::L2);
        assert!(index.add(2, &[1.0; 7]).is_err());
    }
}
