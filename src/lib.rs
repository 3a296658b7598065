pub mod cluster;
pub mod config;
pub mod consensus;
pub mod dsranges_structs;
pub mod error;
pub mod greedy;
pub mod invrep;
pub mod io;
pub mod merge;
pub mod nearest;
pub mod overlaps;
pub mod pipeline;
pub mod scoring;
pub mod sorts;
pub mod spliced_subsequence;
pub mod tracks;

#[cfg(feature = "python")]
mod numpy_bindings;

pub use error::{Error, Result};
