//! Spherical geometry for stamp tiles.
//!
//! A stamp's native pixel grid is geo-referenced only by corner points on
//! a sphere. This crate provides the quadrilateral cell abstraction that
//! maps points on the sphere into normalized tile-local coordinates and
//! back, plus the curved-edge-aware geographic bounds used for tile
//! visibility tests.

pub mod bounds;
pub mod cell;
pub mod latlon;

pub use bounds::GeographicBounds;
pub use cell::GeometryCell;
pub use latlon::LonLat;
