//! On-demand reprojection and tiling engine for corner-referenced
//! remotely-sensed images.
//!
//! A stamp arrives as a native pixel grid geo-referenced only by corner
//! points on a sphere. This crate splits the grid adaptively into frames,
//! reprojects visible frames into the application's working projection at
//! a requested pixel density, composites them onto caller-owned targets,
//! and caches both raw source pixels and reprojected tiles on disk.
//!
//! Entry points:
//! - [`StampEngine`]: process-wide services (cache store, source LRU,
//!   background pool)
//! - [`StampImage`]: one stamp's tiling and rendering
//! - [`PixelProvider`]: the external metadata/pixel source the engine
//!   consumes

pub mod autoscale;
pub mod colormap;
pub mod composite;
pub mod config;
pub mod engine;
pub mod frame;
pub mod image;
pub mod provider;

pub use autoscale::Autoscale;
pub use colormap::Color;
pub use composite::{SampleTarget, Surface};
pub use config::EngineConfig;
pub use engine::StampEngine;
pub use image::{PointValue, StampImage};
pub use provider::{GeometrySpec, PixelProvider, StampInfo};
