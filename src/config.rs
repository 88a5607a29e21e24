//! Path search configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PathError;

fn default_epsilon() -> f64 {
    1e-7
}

fn default_true() -> bool {
    true
}

fn default_max_line_length() -> f64 {
    60.0
}

fn default_wide_angle_offset() -> f64 {
    0.01
}

fn default_propagation_distance() -> f64 {
    f64::INFINITY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathConfig {
    // Acoustic standard
    pub max_reflection_order: usize,
    pub max_diffraction_order: usize,
    /// Radius around a receiver (or mirror) in which reflecting walls are searched.
    pub search_radius: f64,
    /// Candidate paths longer than `direct × (1 + ratio)` are discarded.
    pub max_length_excess_ratio: f64,

    /// Pairs farther apart than this produce no path.
    #[serde(default = "default_propagation_distance")]
    pub max_propagation_distance: f64,

    // Tolerances
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    // Diffraction
    #[serde(default = "default_true")]
    pub compute_horizontal_diffraction: bool,
    #[serde(default = "default_true")]
    pub compute_vertical_diffraction: bool,
    /// Offset of diffraction points from building corners.
    #[serde(default = "default_wide_angle_offset")]
    pub wide_angle_offset: f64,

    // Ground
    /// G value outside every ground zone.
    #[serde(default)]
    pub default_ground_coefficient: f64,

    // Scene
    /// Maximum length of the pieces a line is cut into for index queries.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: f64,
    /// If `true`, invalid features are skipped with a warning instead of failing the scene.
    #[serde(default)]
    pub lenient: bool,
    /// If `true`, non-zero footprint elevations are absolute roof altitudes
    /// instead of being ignored.
    #[serde(default)]
    pub z_buildings: bool,
    /// Upper bound on terrain triangle areas (square meters). Larger triangles
    /// are refined.
    #[serde(default)]
    pub max_triangle_area: Option<f64>,
}

impl PathConfig {
    /// Creates a configuration.
    ///
    /// Reflection/diffraction orders, search radius and length excess ratio
    /// depend on the targeted standard and have no default.
    pub fn new(
        max_reflection_order: usize,
        max_diffraction_order: usize,
        search_radius: f64,
        max_length_excess_ratio: f64,
    ) -> Self {
        Self {
            max_reflection_order,
            max_diffraction_order,
            search_radius,
            max_length_excess_ratio,
            max_propagation_distance: default_propagation_distance(),
            epsilon: default_epsilon(),
            compute_horizontal_diffraction: true,
            compute_vertical_diffraction: true,
            wide_angle_offset: default_wide_angle_offset(),
            default_ground_coefficient: 0.0,
            max_line_length: default_max_line_length(),
            lenient: false,
            z_buildings: false,
            max_triangle_area: None,
        }
    }

    pub fn with_max_propagation_distance(mut self, d: f64) -> Self {
        self.max_propagation_distance = d;
        self
    }

    pub fn with_epsilon(mut self, eps: f64) -> Self {
        self.epsilon = eps;
        self
    }

    pub fn with_horizontal_diffraction(mut self, on: bool) -> Self {
        self.compute_horizontal_diffraction = on;
        self
    }

    pub fn with_vertical_diffraction(mut self, on: bool) -> Self {
        self.compute_vertical_diffraction = on;
        self
    }

    pub fn with_wide_angle_offset(mut self, offset: f64) -> Self {
        self.wide_angle_offset = offset;
        self
    }

    pub fn with_default_ground_coefficient(mut self, g: f64) -> Self {
        self.default_ground_coefficient = g;
        self
    }

    pub fn with_max_line_length(mut self, length: f64) -> Self {
        self.max_line_length = length;
        self
    }

    pub fn with_lenient(mut self, lenient: bool) -> Self {
        self.lenient = lenient;
        self
    }

    pub fn with_z_buildings(mut self, z_buildings: bool) -> Self {
        self.z_buildings = z_buildings;
        self
    }

    pub fn with_max_triangle_area(mut self, area: f64) -> Self {
        self.max_triangle_area = Some(area);
        self
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), PathError> {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0. {
                Ok(())
            } else {
                Err(PathError::Config(format!("{} must be positive, got {}", name, v)))
            }
        };
        let non_negative = |name: &str, v: f64| {
            if v.is_finite() && v >= 0. {
                Ok(())
            } else {
                Err(PathError::Config(format!(
                    "{} must be finite and non-negative, got {}",
                    name, v
                )))
            }
        };
        non_negative("search_radius", self.search_radius)?;
        non_negative("max_length_excess_ratio", self.max_length_excess_ratio)?;
        positive("epsilon", self.epsilon)?;
        positive("max_line_length", self.max_line_length)?;
        non_negative("wide_angle_offset", self.wide_angle_offset)?;
        if let Some(area) = self.max_triangle_area {
            positive("max_triangle_area", area)?;
        }
        if !(0.0..=1.0).contains(&self.default_ground_coefficient) {
            return Err(PathError::Config(format!(
                "default_ground_coefficient must be in [0, 1], got {}",
                self.default_ground_coefficient
            )));
        }
        if self.max_propagation_distance.is_nan() || self.max_propagation_distance <= 0. {
            return Err(PathError::Config(format!(
                "max_propagation_distance must be positive, got {}",
                self.max_propagation_distance
            )));
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse path config")?;
        config.validate()?;
        Ok(config)
    }
}

/// Reads a path configuration from a JSON file.
pub fn read_config(path: &Path) -> Result<PathConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    PathConfig::from_json_str(&json)
        .with_context(|| format!("Invalid config file: {}", path.display()))
}

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Capacity of the result channel (workers block when it is full).
    pub channel_capacity: usize,
    /// Pairs per work unit.
    pub unit_size: usize,
    /// Search loop iterations between two cancellation checks.
    pub cancel_check_interval: usize,
    /// Results between two progress notifications. 0 disables notifications.
    pub progress_every: usize,
}

impl ComputeConfig {
    pub fn new() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            workers,
            channel_capacity: 256,
            unit_size: 64,
            cancel_check_interval: 64,
            progress_every: 1000,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_unit_size(mut self, unit_size: usize) -> Self {
        self.unit_size = unit_size;
        self
    }

    pub fn with_cancel_check_interval(mut self, interval: usize) -> Self {
        self.cancel_check_interval = interval;
        self
    }

    pub fn with_progress_every(mut self, every: usize) -> Self {
        self.progress_every = every;
        self
    }

    pub fn validate(&self) -> Result<(), PathError> {
        if self.workers == 0 {
            return Err(PathError::Config("workers must be at least 1".to_string()));
        }
        if self.channel_capacity == 0 {
            return Err(PathError::Config(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.unit_size == 0 {
            return Err(PathError::Config("unit_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self::new()
    }
}
