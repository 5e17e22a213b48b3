//! Range math and chunk planning.
//!
//! Splits a download into N contiguous chunks, maps each chunk to its part file
//! and recovers per-chunk progress from part file lengths on resume.

mod chunk;
mod parts;

pub use chunk::{plan_spans, Chunk};
pub use parts::{part_path, prepare_chunks, remove_parts, ChunkPlan};
