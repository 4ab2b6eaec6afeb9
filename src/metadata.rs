//! Loads a graph's on-disk representation into a handle the sequential and
//! random decoders build on: parsed properties, the graph bitstream (memory
//! resident or file-backed), and an optional offsets index.

use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;

use crate::bitreader::{BitReader, MemSource};
use crate::elias_fano::EliasFanoList;
use crate::error::{GraphError, Result};
use crate::properties::Properties;

const MAX_BASENAME_LEN: usize = 1023;

/// How offsets (if any) are represented once loaded.
pub enum OffsetsIndex {
    None,
    Plain(Vec<u64>),
    EliasFano(EliasFanoList),
}

/// How the graph bitstream is backed.
enum GraphBytes {
    /// Mode −1: stream straight from disk, nothing resident.
    Streamed(PathBuf),
    /// Memory-mapped `.graph` file (see `map_graph_file`).
    Owned(MemSource),
    /// Borrowed from a caller-supplied buffer (`load_external`).
    External(MemSource),
}

/// A loaded graph: its properties, its bitstream, and (if requested) an
/// offsets index for random access.
pub struct GraphMetadata {
    pub properties: Properties,
    base: PathBuf,
    bytes: GraphBytes,
    pub offsets: OffsetsIndex,
    pub max_outdegree: std::cell::Cell<u64>,
}

fn check_basename_len(name: &Path) -> Result<()> {
    if name.as_os_str().len() > MAX_BASENAME_LEN {
        return Err(GraphError::FilenameTooLong);
    }
    Ok(())
}

fn read_whole_file(path: &Path) -> Result<Vec<u8>> {
    let mut f = File::open(path).map_err(GraphError::from)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).map_err(GraphError::from)?;
    Ok(buf)
}

/// Memory-maps the `.graph` file read-only, copying it into mapped pages
/// rather than opening it from the file system's page cache directly (mirrors
/// the reference loader's own anonymous-mapping-plus-`read_exact` approach,
/// which sidesteps having to keep the `File` handle alive alongside the map).
fn map_graph_file(path: &Path) -> Result<MemSource> {
    let mut file = File::open(path).map_err(GraphError::from)?;
    let len = file.metadata().map_err(GraphError::from)?.len() as usize;
    if len == 0 {
        return Ok(Arc::new(Vec::<u8>::new()) as MemSource);
    }
    let mut mmap = mmap_rs::MmapOptions::new(len)
        .map_err(|e| GraphError::IoError(e.to_string()))?
        .map_mut()
        .map_err(|e| GraphError::IoError(e.to_string()))?;
    file.read_exact(&mut mmap[..len]).map_err(GraphError::from)?;
    let mmap = mmap
        .make_read_only()
        .map_err(|(_, e)| GraphError::IoError(e.to_string()))?;
    Ok(Arc::new(mmap) as MemSource)
}

impl GraphMetadata {
    /// Loads `<name>.properties` and, per `mode`, the `.graph` bitstream and
    /// offsets. See the load-mode table: −1 streams the graph from disk, 0
    /// loads it in memory with no offsets, 1/2 load a plain/Elias-Fano
    /// offsets index, and a mode > 2 is a memory budget in MiB that picks
    /// plain offsets if they fit and Elias-Fano otherwise.
    pub fn load(name: &Path, mode: i64) -> Result<GraphMetadata> {
        check_basename_len(name)?;
        let props_path = with_ext(name, "properties");
        let text = std::fs::read_to_string(&props_path).map_err(GraphError::from)?;
        let properties = Properties::parse(&text)?;
        info!(
            "loaded properties for {:?}: n={} m={}",
            name, properties.nodes, properties.arcs
        );

        let graph_path = with_ext(name, "graph");
        let bytes = if mode == -1 {
            GraphBytes::Streamed(graph_path)
        } else {
            GraphBytes::Owned(map_graph_file(&graph_path)?)
        };

        let offsets = if mode <= 0 {
            OffsetsIndex::None
        } else {
            let use_elias_fano = if mode == 1 {
                false
            } else if mode == 2 {
                true
            } else {
                let budget_bytes = (mode as u64) * 1024 * 1024;
                let plain_bytes = 8 * properties.nodes;
                plain_bytes > budget_bytes
            };
            Self::load_or_reconstruct_offsets(name, &properties, &bytes, use_elias_fano)?
        };

        Ok(GraphMetadata {
            properties,
            base: name.to_path_buf(),
            bytes,
            offsets,
            max_outdegree: std::cell::Cell::new(0),
        })
    }

    /// Like `load`, but the caller supplies the graph bytes (and, if
    /// non-empty, the offsets) directly; the handle borrows them and never
    /// frees them.
    pub fn load_external(
        name: &Path,
        mode: i64,
        graph_bytes: MemSource,
        external_offsets: Option<Vec<u64>>,
    ) -> Result<GraphMetadata> {
        check_basename_len(name)?;
        let props_path = with_ext(name, "properties");
        let text = std::fs::read_to_string(&props_path).map_err(GraphError::from)?;
        let properties = Properties::parse(&text)?;

        let bytes = GraphBytes::External(graph_bytes);
        let offsets = match external_offsets {
            Some(v) => OffsetsIndex::Plain(v),
            None if mode <= 0 => OffsetsIndex::None,
            None => Self::load_or_reconstruct_offsets(name, &properties, &bytes, mode != 1)?,
        };

        Ok(GraphMetadata {
            properties,
            base: name.to_path_buf(),
            bytes,
            offsets,
            max_outdegree: std::cell::Cell::new(0),
        })
    }

    fn load_or_reconstruct_offsets(
        name: &Path,
        properties: &Properties,
        bytes: &GraphBytes,
        use_elias_fano: bool,
    ) -> Result<OffsetsIndex> {
        let offsets_path = with_ext(name, "offsets");
        let plain = if offsets_path.exists() {
            decode_offsets_file(&offsets_path, properties.nodes)?
        } else {
            reconstruct_offsets(bytes, properties)?
        };
        if use_elias_fano {
            let max = *plain.last().unwrap_or(&0);
            let mut ef = EliasFanoList::create(plain.len() as u64, max);
            ef.add_batch(&plain)?;
            Ok(OffsetsIndex::EliasFano(ef))
        } else {
            Ok(OffsetsIndex::Plain(plain))
        }
    }

    pub fn graph_byte_source(&self) -> Result<MemSource> {
        match &self.bytes {
            GraphBytes::Owned(b) | GraphBytes::External(b) => Ok(b.clone()),
            GraphBytes::Streamed(_) => Err(GraphError::Unsupported(
                "graph was loaded in streaming mode (-1); no memory-resident bytes".into(),
            )),
        }
    }

    pub fn open_graph_reader(&self) -> Result<BitReader> {
        match &self.bytes {
            GraphBytes::Owned(b) | GraphBytes::External(b) => Ok(BitReader::map_memory(b.clone())),
            GraphBytes::Streamed(path) => {
                let f = File::open(path).map_err(GraphError::from)?;
                Ok(BitReader::open_file(f))
            }
        }
    }

    pub fn offset(&self, x: u64) -> Result<u64> {
        match &self.offsets {
            OffsetsIndex::None => Err(GraphError::RequiresOffsets),
            OffsetsIndex::Plain(v) => v
                .get(x as usize)
                .copied()
                .ok_or(GraphError::VertexOutOfRange),
            OffsetsIndex::EliasFano(ef) => {
                if x >= ef.len() {
                    return Err(GraphError::VertexOutOfRange);
                }
                Ok(ef.get(x))
            }
        }
    }

    pub fn has_offsets(&self) -> bool {
        !matches!(self.offsets, OffsetsIndex::None)
    }

    /// Bytes required to hold the graph and (if requested) the offsets index
    /// for `mode`, without actually loading anything. Per the historical
    /// behavior note: a mode >= 0 reports the `.graph` file's size rather
    /// than a hardcoded zero.
    pub fn required_memory(name: &Path, mode: i64) -> Result<u64> {
        let graph_path = with_ext(name, "graph");
        let graph_bytes = if mode >= 0 {
            std::fs::metadata(&graph_path).map_err(GraphError::from)?.len()
        } else {
            0
        };
        if mode <= 0 {
            return Ok(graph_bytes);
        }
        let props_path = with_ext(name, "properties");
        let text = std::fs::read_to_string(&props_path).map_err(GraphError::from)?;
        let properties = Properties::parse(&text)?;
        // Offsets are bit positions into the graph stream, so their upper
        // bound is the stream's bit length, not the arc count.
        let offsets_universe = (graph_bytes * 8).max(1);
        let offsets_bytes = if mode == 1 {
            8 * properties.nodes
        } else if mode == 2 {
            EliasFanoList::size_estimate(properties.nodes, offsets_universe) as u64
        } else {
            let budget_bytes = (mode as u64) * 1024 * 1024;
            let plain = 8 * properties.nodes;
            if plain <= budget_bytes {
                plain
            } else {
                EliasFanoList::size_estimate(properties.nodes, offsets_universe) as u64
            }
        };
        Ok(graph_bytes + offsets_bytes)
    }

    pub fn base_path(&self) -> &Path {
        &self.base
    }
}

fn with_ext(name: &Path, ext: &str) -> PathBuf {
    let mut p = name.to_path_buf();
    let new_name = match p.file_name() {
        Some(n) => format!("{}.{}", n.to_string_lossy(), ext),
        None => ext.to_string(),
    };
    p.set_file_name(new_name);
    p
}

fn decode_offsets_file(path: &Path, n: u64) -> Result<Vec<u64>> {
    let bytes = read_whole_file(path)?;
    let mut br = BitReader::map_memory(Arc::new(bytes));
    let mut offsets = Vec::with_capacity(n as usize);
    let mut prev = 0u64;
    for _ in 0..n {
        let delta = br.read_gamma()?;
        prev += delta;
        offsets.push(prev);
    }
    Ok(offsets)
}

/// Rebuilds the offsets array by running the sequential decoder once and
/// recording each node's starting bit position.
fn reconstruct_offsets(bytes: &GraphBytes, properties: &Properties) -> Result<Vec<u64>> {
    let mut br = match bytes {
        GraphBytes::Owned(b) | GraphBytes::External(b) => BitReader::map_memory(b.clone()),
        GraphBytes::Streamed(path) => {
            let f = File::open(path).map_err(GraphError::from)?;
            BitReader::open_file(f)
        }
    };
    crate::sequential::scan_offsets(&mut br, properties)
}
