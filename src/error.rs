use thiserror::Error;

/// Caller-supplied feature identifier (usually a database key).
pub type FeatureId = u64;

/// Degenerate or invalid feature geometry.
///
/// Recoverable: the offending feature (or path candidate) is skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("feature {feature_id}: degenerate footprint ({reason})")]
    DegenerateFootprint { feature_id: FeatureId, reason: String },

    #[error("feature {feature_id}: self-intersecting outline")]
    SelfIntersecting { feature_id: FeatureId },

    #[error("feature {feature_id}: non-positive height {height}")]
    NonPositiveHeight { feature_id: FeatureId, height: f64 },

    #[error("degenerate terrain triangle near ({x:.3}, {y:.3})")]
    DegenerateTriangle { x: f64, y: f64 },

    #[error("feature {feature_id}: coefficient {value} out of range")]
    InvalidCoefficient { feature_id: FeatureId, value: f64 },

    #[error("feature {feature_id}: non-finite coordinate")]
    NonFinite { feature_id: FeatureId },

    #[error("feature {feature_id}: zero-length wall segment")]
    ZeroLengthWall { feature_id: FeatureId },

    #[error("feature {feature_id}: duplicate id")]
    DuplicateId { feature_id: FeatureId },
}

impl GeometryError {
    /// Id of the offending feature, when the error is tied to one.
    pub fn feature_id(&self) -> Option<FeatureId> {
        match self {
            Self::DegenerateFootprint { feature_id, .. }
            | Self::SelfIntersecting { feature_id }
            | Self::NonPositiveHeight { feature_id, .. }
            | Self::InvalidCoefficient { feature_id, .. }
            | Self::NonFinite { feature_id }
            | Self::ZeroLengthWall { feature_id }
            | Self::DuplicateId { feature_id } => Some(*feature_id),
            Self::DegenerateTriangle { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PathError {
    /// API misuse: query before freeze or mutation after freeze.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// No cut profile could be built for the pair.
    #[error("pair (source {source_id}, receiver {receiver_id}) failed: {reason}")]
    PairComputation {
        source_id: u64,
        receiver_id: u64,
        reason: String,
    },

    /// Cooperative stop requested by the caller.
    #[error("computation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PathError>;
