//! Splits a graph into `P` contiguous node ranges of roughly balanced work,
//! each independently walkable by its own sequential decoder.
//!
//! Requires the graph bytes to be memory-resident, since each partition's
//! decoder is produced by deep-copying a sequential iterator positioned at
//! the partition's first node (`SequentialDecoder::copy`) rather than by
//! reopening and fast-forwarding the file once per partition.

use crate::error::{GraphError, Result};
use crate::metadata::GraphMetadata;
use crate::sequential::SequentialDecoder;

/// A single partition: the node range `[start, end)` it covers and a
/// decoder already positioned at `start`.
pub struct Partition<'g> {
    pub start: u64,
    pub end: u64,
    pub decoder: SequentialDecoder<'g>,
}

/// Builds `p` partitions of a graph's node range, balancing
/// `node_weight * n_i + edge_weight * m_i` across them.
pub struct ParallelPartitioner;

impl ParallelPartitioner {
    /// First pass walks the whole graph once to total its weight. Second
    /// pass walks it again with a single decoder, forking a partition off
    /// via `copy()` (cheap relative to reopening) every time the running
    /// weight crosses the next `1/p` threshold.
    pub fn partition<'g>(
        graph: &'g GraphMetadata,
        p: usize,
        node_weight: u64,
        edge_weight: u64,
    ) -> Result<Vec<Partition<'g>>> {
        graph.graph_byte_source().map_err(|_| {
            GraphError::Unsupported(
                "parallel partitioning requires a memory-resident graph".into(),
            )
        })?;

        let n = graph.properties.nodes;
        if p == 0 || n == 0 {
            return Ok(Vec::new());
        }
        let p = p.min(n as usize) as u64;

        let total = Self::total_weight(graph, node_weight, edge_weight)?;

        let mut partitions = Vec::with_capacity(p as usize);
        let mut walker = SequentialDecoder::new(graph)?;
        let mut running = 0u64;
        let mut next_target_rank = 1u64;
        let mut partition_start = 0u64;

        for node in 0..n {
            // `node > partition_start` keeps a zero (or near-zero) weighted
            // graph from forking a degenerate, empty partition right at the
            // threshold check for rank 1 (where `running` is still 0): the
            // range has to actually contain at least one node before it's
            // worth splitting off.
            if next_target_rank < p
                && running >= total * next_target_rank / p
                && node > partition_start
            {
                let fork = walker.copy()?;
                partitions.push(Partition {
                    start: partition_start,
                    end: node,
                    decoder: fork,
                });
                partition_start = node;
                next_target_rank += 1;
            }
            let m_i = walker.outedges().len() as u64;
            running += node_weight + edge_weight * m_i;
            if node + 1 < n {
                walker.next()?;
            }
        }
        partitions.push(Partition {
            start: partition_start,
            end: n,
            decoder: walker,
        });

        Ok(partitions)
    }

    fn total_weight(graph: &GraphMetadata, node_weight: u64, edge_weight: u64) -> Result<u64> {
        let mut walker = SequentialDecoder::new(graph)?;
        let mut total = 0u64;
        let n = graph.properties.nodes;
        for node in 0..n {
            total += node_weight + edge_weight * walker.outedges().len() as u64;
            if node + 1 < n {
                walker.next()?;
            }
        }
        walker.close();
        Ok(total)
    }

    /// The partition index that node `i` falls into.
    pub fn pick(partitions: &[Partition<'_>], i: u64) -> Option<usize> {
        partitions
            .iter()
            .position(|part| i >= part.start && i < part.end)
    }
}
