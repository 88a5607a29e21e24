//! Propagation path search: direct, diffracted and reflected paths.
pub mod diffraction;
pub mod finder;
pub mod mirror;
pub mod path;
