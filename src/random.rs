//! Random access into a graph whose offsets index is available: `outdegree`
//! in O(1) plus a BitReader seek, `successors` by decoding from the node's
//! offset and recursing through its reference chain.
//!
//! Grounded in the reference decoder's random-access reader, which keeps two
//! independent bitstream cursors (one for plain outdegree peeks, one for the
//! full successor decode) precisely so a caller can ask for an outdegree
//! without disturbing an in-progress `successors` call.

use crate::bitreader::BitReader;
use crate::error::{GraphError, Result};
use crate::metadata::GraphMetadata;
use crate::utils::{merge_three, nat2int};

/// A random-access decoder over one graph. Holds its own pair of
/// `BitReader`s; cheap enough that each thread should hold its own rather
/// than share one across threads.
pub struct RandomDecoder<'g> {
    graph: &'g GraphMetadata,
    outd_reader: BitReader,
    succ_reader: BitReader,
    buffer: Vec<u64>,
}

impl<'g> RandomDecoder<'g> {
    /// Requires the graph to have been loaded with an offsets index (modes
    /// 1, 2, or > 2).
    pub fn new(graph: &'g GraphMetadata) -> Result<Self> {
        if !graph.has_offsets() {
            return Err(GraphError::RequiresOffsets);
        }
        Ok(RandomDecoder {
            graph,
            outd_reader: graph.open_graph_reader()?,
            succ_reader: graph.open_graph_reader()?,
            buffer: Vec::new(),
        })
    }

    /// The outdegree of node `x`, without disturbing any in-progress
    /// `successors` call.
    pub fn outdegree(&mut self, x: u64) -> Result<u64> {
        if x >= self.graph.properties.nodes {
            return Err(GraphError::VertexOutOfRange);
        }
        let offset = self.graph.offset(x)?;
        self.outd_reader.position(offset)?;
        self.outd_reader.read_code(self.graph.properties.comp_flags.outdegrees)
    }

    /// The sorted successor list of node `x`. The returned slice is
    /// invalidated by the next call to `successors` on this decoder.
    pub fn successors(&mut self, x: u64) -> Result<&[u64]> {
        if x >= self.graph.properties.nodes {
            return Err(GraphError::VertexOutOfRange);
        }
        let offset = self.graph.offset(x)?;
        self.succ_reader.position(offset)?;
        let result = self.decode_successors(x)?;
        self.buffer = result;
        Ok(&self.buffer)
    }

    /// Decodes node `x`'s successor list, recursing into the reference chain
    /// as needed. Returns an owned vector (not the shared scratch buffer)
    /// because recursive calls reuse the same `BitReader` and would otherwise
    /// clobber a parent frame's in-progress result; the read position is
    /// snapshotted across the recursive call for the same reason.
    fn decode_successors(&mut self, x: u64) -> Result<Vec<u64>> {
        let flags = self.graph.properties.comp_flags;
        let w = self.graph.properties.window_size as u64;
        let l = self.graph.properties.min_interval_length as u64;

        let offset = self.graph.offset(x)?;
        self.succ_reader.position(offset)?;
        let d = self.succ_reader.read_code(flags.outdegrees)?;
        if d == 0 {
            return Ok(Vec::new());
        }

        let mut reference: i64 = -1;
        if w > 0 {
            let r = self.succ_reader.read_code(flags.references)?;
            if r > 0 {
                reference = r as i64;
            }
        }

        let mut copy_source: Vec<u64> = Vec::new();
        let mut copied_count: u64 = 0;

        if reference > 0 {
            if reference as u64 > x {
                return Err(GraphError::Unsupported(
                    "reference points before node 0".into(),
                ));
            }
            // Recurse first: this clobbers `self.succ_reader`'s position, so
            // save exactly where we were (right after the reference field)
            // and restore it once the recursive decode returns.
            let resume_at = self.succ_reader.tell();
            let referred = self.decode_successors(x - reference as u64)?;
            self.succ_reader.position(resume_at)?;

            let block_count = self.succ_reader.read_code(flags.block_count)? as usize;
            let mut blocks = Vec::with_capacity(block_count);
            for i in 0..block_count {
                let v = self.succ_reader.read_code(flags.blocks)?;
                blocks.push(if i == 0 { v } else { v + 1 });
            }

            let mut pos = 0usize;
            let mut is_copying = true;
            for &len in &blocks {
                let len = len as usize;
                if is_copying {
                    for j in pos..(pos + len).min(referred.len()) {
                        copy_source.push(referred[j]);
                    }
                    copied_count += len as u64;
                }
                pos += len;
                is_copying = !is_copying;
            }
            if block_count % 2 == 0 {
                for j in pos.min(referred.len())..referred.len() {
                    copy_source.push(referred[j]);
                }
                copied_count += referred.len().saturating_sub(pos) as u64;
            }
        }

        let extra_count = d.saturating_sub(copied_count);
        let mut left = Vec::new();
        let mut length = Vec::new();
        let mut remaining_extra = extra_count;

        if extra_count > 0 && l > 0 {
            let interval_count = self.succ_reader.read_gamma()?;
            if interval_count > 0 {
                let mut prev_end: Option<i64> = None;
                for i in 0..interval_count {
                    let delta = self.succ_reader.read_gamma()?;
                    let signed = nat2int(delta);
                    let left_val = if i == 0 {
                        x as i64 + signed
                    } else {
                        prev_end.unwrap() + 1 + signed
                    };
                    let len = self.succ_reader.read_gamma()? + l;
                    left.push(left_val as u64);
                    length.push(len);
                    prev_end = Some(left_val + len as i64 - 1);
                    remaining_extra = remaining_extra.saturating_sub(len);
                }
            }
        }

        let mut residuals = Vec::with_capacity(remaining_extra as usize);
        if remaining_extra > 0 {
            let first = self.succ_reader.read_code(flags.residuals)?;
            let mut prev = (x as i64 + nat2int(first)) as u64;
            residuals.push(prev);
            for _ in 1..remaining_extra {
                let r = self.succ_reader.read_code(flags.residuals)?;
                prev = prev + 1 + r;
                residuals.push(prev);
            }
        }

        let mut intervals_expanded = Vec::new();
        for (&lo, &len) in left.iter().zip(length.iter()) {
            for i in 0..len {
                intervals_expanded.push(lo + i);
            }
        }

        Ok(merge_three(&copy_source, &intervals_expanded, &residuals))
    }
}
