//! A Rust decoder for the Boldi-Vigna compressed WebGraph format: bit-level
//! universal codes, reference-based successor-list compression, and an
//! Elias-Fano offsets index, wrapped in sequential and random-access
//! decoders over a `<name>.graph`/`<name>.properties`/`<name>.offsets`
//! file triple.
//!
//! Start from [`metadata::GraphMetadata::load`] to open a graph, then drive
//! either [`sequential::SequentialDecoder`] for a forward scan or
//! [`random::RandomDecoder`] for point queries. [`partition::ParallelPartitioner`]
//! splits a memory-resident graph into balanced ranges for concurrent scans.

pub mod bitreader;
pub mod elias_fano;
pub mod error;
pub mod metadata;
pub mod partition;
pub mod properties;
pub mod random;
pub mod sequential;
mod tables;
mod utils;

pub use error::{GraphError, Result};
pub use metadata::GraphMetadata;
pub use partition::{ParallelPartitioner, Partition};
pub use random::RandomDecoder;
pub use sequential::SequentialDecoder;
