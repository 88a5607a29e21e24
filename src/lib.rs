//! Geometric sound propagation paths.
//!
//! Feed a [`ProfileBuilder`] with buildings, walls, ground zones and
//! topography, freeze it, then look for the direct, diffracted and reflected
//! paths between sources and receivers with a [`PathFinder`] (one pair) or
//! [`ComputeRays`] (many pairs on a worker pool).
pub mod compute;
pub mod config;
pub mod error;
pub mod geom;
pub mod index;
pub mod paths;
pub mod scene;
pub mod terrain;

// Prelude
pub use compute::{CancellationToken, ComputeRays, PairRequest, PairResult, PathSink, VecSink};
pub use config::{ComputeConfig, PathConfig};
pub use error::{GeometryError, PathError, Result};
pub use geom::point::Point;
pub use geom::polygon::Polygon;
pub use geom::vector::Vector;
pub use paths::finder::PathFinder;
pub use paths::path::{Path, PathKind};
pub use scene::profile::{CutPoint, CutPointKind, CutProfile};
pub use scene::{ProfileBuilder, Scene};
