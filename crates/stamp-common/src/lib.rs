//! Shared types for the stamp reprojection engine.
//!
//! Provides the vocabulary used across the workspace:
//! - World-coordinate extents with ±360° wrap helpers
//! - Source raster rectangles and f32 sample buffers
//! - The visual/numeric pixel-semantics variant
//! - A compute-once memoization wrapper
//! - The shared error type

pub mod error;
pub mod extent;
pub mod memo;
pub mod pixel;
pub mod semantics;

pub use error::{StampError, StampResult};
pub use extent::WorldExtent;
pub use memo::Memo;
pub use pixel::{PixelBuffer, PixelRect};
pub use semantics::PixelSemantics;
