//! Map projections for the stamp engine.
//!
//! Two distinct projection roles live here:
//!
//! - The **working projection**: the application's flat world coordinate
//!   space that everything renders into. Carries the stable hash used in
//!   cache keys and frame-build state.
//! - **Source projection strategies**: stateless per-parameter-set
//!   mappings between a stamp's native (line, sample) grid and geodetic
//!   coordinates, one per map-projection kind a provider can declare.
//!
//! Malformed or incomplete source parameters fall back to the
//! corner-interpolated unprojected strategy rather than failing.

pub mod cylindrical;
pub mod equirectangular;
pub mod params;
pub mod polar;
pub mod sinusoidal;
pub mod strategy;
pub mod work;

pub use cylindrical::CornerCylindrical;
pub use equirectangular::Equirectangular;
pub use params::{ProjectionKind, ProjectionParams};
pub use polar::PolarStereographic;
pub use sinusoidal::Sinusoidal;
pub use strategy::SourceProjection;
pub use work::WorkProjection;
