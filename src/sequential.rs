//! Forward-only iteration over a graph's compressed bitstream, node 0 first.
//!
//! Grounded in the reference decoder's sequential iterator: a cyclic window
//! of the last `W+1` decoded successor lists (so a node's encoding can refer
//! back to a recent predecessor's list instead of repeating it), plus the
//! interval/residual machinery for whatever isn't covered by the copy.

use dsi_progress_logger::ProgressLogger;

use crate::bitreader::BitReader;
use crate::error::{GraphError, Result};
use crate::metadata::GraphMetadata;
use crate::properties::Properties;
use crate::utils::{merge_three, nat2int};

/// One node's decoded successor list plus the outdegree it was decoded
/// against (kept alongside so copy blocks referencing this slot don't need
/// to recompute it).
#[derive(Clone, Default)]
struct WindowSlot {
    successors: Vec<u64>,
}

enum State {
    Fresh,
    AtNode(u64),
    Exhausted,
}

/// Forward iterator over a graph's nodes, decoding each successor list in
/// turn. Not `Send`: it owns a `BitReader` and per-node scratch buffers.
pub struct SequentialDecoder<'g> {
    graph: &'g GraphMetadata,
    reader: BitReader,
    state: State,
    n: u64,
    window: Vec<WindowSlot>,
    successors: Vec<u64>,
    block: Vec<i64>,
    left: Vec<u64>,
    length: Vec<u64>,
    max_outdegree_seen: u64,
}

impl<'g> SequentialDecoder<'g> {
    pub fn new(graph: &'g GraphMetadata) -> Result<Self> {
        let reader = graph.open_graph_reader()?;
        let window_size = graph.properties.window_size as usize;
        let mut decoder = SequentialDecoder {
            graph,
            reader,
            state: State::Fresh,
            n: graph.properties.nodes,
            window: vec![WindowSlot::default(); window_size + 1],
            successors: Vec::new(),
            block: Vec::new(),
            left: Vec::new(),
            length: Vec::new(),
            max_outdegree_seen: 0,
        };
        if decoder.n > 0 {
            decoder.decode_node(0)?;
            decoder.state = State::AtNode(0);
        } else {
            decoder.state = State::Exhausted;
        }
        Ok(decoder)
    }

    pub fn valid(&self) -> bool {
        matches!(self.state, State::AtNode(i) if i < self.n)
    }

    pub fn current_node(&self) -> Option<u64> {
        match self.state {
            State::AtNode(i) => Some(i),
            _ => None,
        }
    }

    /// Advances to the next node and decodes its successor list.
    pub fn next(&mut self) -> Result<()> {
        let i = match self.state {
            State::AtNode(i) => i,
            State::Exhausted => {
                return Err(GraphError::Unsupported(
                    "next() called on an exhausted sequential iterator".into(),
                ))
            }
            State::Fresh => {
                return Err(GraphError::Unsupported(
                    "next() called before construction completed".into(),
                ))
            }
        };
        let next_idx = i + 1;
        if next_idx >= self.n {
            self.state = State::Exhausted;
            return Ok(());
        }
        self.decode_node(next_idx)?;
        self.state = State::AtNode(next_idx);
        Ok(())
    }

    /// The current node's decoded successor list.
    pub fn outedges(&self) -> &[u64] {
        &self.successors
    }

    fn window_slot(&self, x: u64) -> &WindowSlot {
        &self.window[(x % self.window.len() as u64) as usize]
    }

    fn decode_node(&mut self, x: u64) -> Result<()> {
        let flags = self.graph.properties.comp_flags;
        let w = self.graph.properties.window_size as u64;
        let l = self.graph.properties.min_interval_length as u64;

        let d = self.reader.read_code(flags.outdegrees)?;
        self.successors.clear();
        if d == 0 {
            let slot = &mut self.window[(x % (w + 1)) as usize];
            slot.successors.clear();
            return Ok(());
        }

        let mut reference: i64 = -1;
        if w > 0 {
            let r = self.reader.read_code(flags.references)?;
            if r > 0 {
                reference = r as i64;
            }
        }

        let mut copy_source: Vec<u64> = Vec::new();
        let mut copied_count: u64 = 0;

        if reference > 0 {
            let ref_index = x
                .wrapping_sub(reference as u64)
                .wrapping_add(w + 1)
                % (w + 1);
            let referred = self.window_slot(ref_index).successors.clone();

            let block_count = self.reader.read_code(flags.block_count)? as usize;
            self.block.clear();
            for i in 0..block_count {
                let v = self.reader.read_code(flags.blocks)?;
                let v = if i == 0 { v } else { v + 1 };
                self.block.push(v as i64);
            }

            let mut pos = 0usize;
            let mut is_copying = true; // block 0 is a copy-run
            for (i, &len) in self.block.iter().enumerate() {
                let len = len as usize;
                if is_copying {
                    for j in pos..(pos + len).min(referred.len()) {
                        copy_source.push(referred[j]);
                    }
                    copied_count += len as u64;
                } else {
                    // skip run, nothing copied
                }
                pos += len;
                is_copying = !is_copying;
                let _ = i;
            }
            if block_count % 2 == 0 {
                // implicit final run is a copy-run to the end of `referred`
                for j in pos.min(referred.len())..referred.len() {
                    copy_source.push(referred[j]);
                }
                copied_count += referred.len().saturating_sub(pos) as u64;
            }
        }

        let extra_count = d.saturating_sub(copied_count);

        self.left.clear();
        self.length.clear();
        let mut remaining_extra = extra_count;

        if extra_count > 0 && l > 0 {
            let interval_count = self.reader.read_gamma()?;
            if interval_count > 0 {
                let mut prev_end: Option<i64> = None;
                for i in 0..interval_count {
                    let delta = self.reader.read_gamma()?;
                    let signed = nat2int(delta);
                    let left_val = if i == 0 {
                        x as i64 + signed
                    } else {
                        prev_end.unwrap() + 1 + signed
                    };
                    let len = self.reader.read_gamma()? + l;
                    self.left.push(left_val as u64);
                    self.length.push(len);
                    prev_end = Some(left_val + len as i64 - 1);
                    remaining_extra = remaining_extra.saturating_sub(len);
                }
            }
        }

        let mut residuals: Vec<u64> = Vec::with_capacity(remaining_extra as usize);
        if remaining_extra > 0 {
            let first = self.reader.read_code(flags.residuals)?;
            let mut prev = (x as i64 + nat2int(first)) as u64;
            residuals.push(prev);
            for _ in 1..remaining_extra {
                let r = self.reader.read_code(flags.residuals)?;
                prev = prev + 1 + r;
                residuals.push(prev);
            }
        }

        let mut intervals_expanded: Vec<u64> = Vec::new();
        for (&low, &len) in self.left.iter().zip(self.length.iter()) {
            for i in 0..len {
                intervals_expanded.push(low + i);
            }
        }

        self.successors = merge_three(&copy_source, &intervals_expanded, &residuals);

        let slot = &mut self.window[(x % (w + 1)) as usize];
        slot.successors.clear();
        slot.successors.extend_from_slice(&self.successors);
        self.max_outdegree_seen = self.max_outdegree_seen.max(d);
        Ok(())
    }

    /// On close, if iteration reached the end, report the observed maximum
    /// outdegree back to the graph handle.
    pub fn close(self) {
        if matches!(self.state, State::Exhausted) {
            let current = self.graph.max_outdegree.get();
            if self.max_outdegree_seen > current {
                self.graph.max_outdegree.set(self.max_outdegree_seen);
            }
        }
    }

    /// Produces an independent copy positioned at the same node, for use by
    /// the parallel partitioner. Only valid when the graph bytes are
    /// memory-resident (streaming mode can't be cheaply cloned).
    pub fn copy(&self) -> Result<Self> {
        let reader = self.graph.open_graph_reader()?;
        let mut cloned = SequentialDecoder {
            graph: self.graph,
            reader,
            state: State::Fresh,
            n: self.n,
            window: self.window.clone(),
            successors: self.successors.clone(),
            block: self.block.clone(),
            left: self.left.clone(),
            length: self.length.clone(),
            max_outdegree_seen: self.max_outdegree_seen,
        };
        if let Some(i) = self.current_node() {
            cloned.reader.position(self.reader.tell())?;
            cloned.state = State::AtNode(i);
        } else {
            cloned.state = State::Exhausted;
        }
        Ok(cloned)
    }
}

/// Merges three already-sorted, duplicate-free runs into one sorted vector.
/// Runs the sequential decode once end to end, recording each node's
/// starting bit offset (used to reconstruct a missing `.offsets` file).
pub(crate) fn scan_offsets(reader: &mut BitReader, properties: &Properties) -> Result<Vec<u64>> {
    let n = properties.nodes;
    let w = properties.window_size as u64;
    let l = properties.min_interval_length as u64;
    let flags = properties.comp_flags;

    let mut offsets = Vec::with_capacity(n as usize);
    // Only the *length* of each cached list is needed to reconstruct bit
    // offsets, since the block logic only consumes `referred.len()`.
    let mut window_lens: Vec<u64> = vec![0; (w + 1) as usize];

    let mut pl = ProgressLogger::default().display_memory();
    pl.item_name = "node";
    pl.expected_updates = Some(n as usize);
    pl.start("reconstructing offsets by replaying the bitstream");

    for x in 0..n {
        offsets.push(reader.tell());
        let d = reader.read_code(flags.outdegrees)?;
        if d == 0 {
            window_lens[(x % (w + 1)) as usize] = 0;
            pl.update();
            continue;
        }

        let mut reference: i64 = -1;
        if w > 0 {
            let r = reader.read_code(flags.references)?;
            if r > 0 {
                reference = r as i64;
            }
        }

        let mut copied_count = 0u64;
        if reference > 0 {
            let ref_index = x.wrapping_sub(reference as u64).wrapping_add(w + 1) % (w + 1);
            let referred_len = window_lens[ref_index as usize] as usize;
            let block_count = reader.read_code(flags.block_count)? as usize;
            let mut blocks = Vec::with_capacity(block_count);
            for i in 0..block_count {
                let v = reader.read_code(flags.blocks)?;
                blocks.push(if i == 0 { v } else { v + 1 });
            }
            let mut pos = 0usize;
            let mut is_copying = true;
            for &len in &blocks {
                let len = len as usize;
                if is_copying {
                    copied_count += len.min(referred_len.saturating_sub(pos)) as u64;
                }
                pos += len;
                is_copying = !is_copying;
            }
            if block_count % 2 == 0 {
                copied_count += referred_len.saturating_sub(pos) as u64;
            }
        }

        let mut extra_count = d.saturating_sub(copied_count);
        let mut interval_total = 0u64;
        if extra_count > 0 && l > 0 {
            let interval_count = reader.read_gamma()?;
            let mut prev_end: Option<i64> = None;
            for i in 0..interval_count {
                let delta = reader.read_gamma()?;
                let signed = nat2int(delta);
                let left_val = if i == 0 {
                    x as i64 + signed
                } else {
                    prev_end.unwrap() + 1 + signed
                };
                let len = reader.read_gamma()? + l;
                prev_end = Some(left_val + len as i64 - 1);
                interval_total += len;
            }
        }
        extra_count = extra_count.saturating_sub(interval_total);
        for i in 0..extra_count {
            reader.read_code(flags.residuals)?;
            let _ = i;
        }

        window_lens[(x % (w + 1)) as usize] = d;
        pl.update();
    }
    pl.done();

    Ok(offsets)
}
