//! Index creation options and their validation.

use crate::config;
use crate::error::{HnswError, Result};
use crate::hnsw::{DistanceMetric, HnswConfig};
use serde::{Deserialize, Serialize};

/// Options accepted when an index is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    pub m: usize,
    pub ef_construction: usize,
    pub metric: DistanceMetric,
    pub random_seed: u64,
    pub heuristic: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            m: config::HNSW_DEFAULT_M,
            ef_construction: config::HNSW_DEFAULT_EF_CONSTRUCTION,
            metric: DistanceMetric::L2,
            random_seed: config::HNSW_DEFAULT_SEED,
            heuristic: true,
        }
    }
}

impl IndexOptions {
    /// Check bounds: `1 <= M <= 100`, `M <= ef_construction <= 1000`.
    pub fn validate(&self) -> Result<()> {
        if !(config::HNSW_MIN_M..=config::HNSW_MAX_M).contains(&self.m) {
            return Err(HnswError::InvalidOptions(format!(
                "M must be between {} and {}, got {}",
                config::HNSW_MIN_M,
                config::HNSW_MAX_M,
                self.m
            )));
        }
        if self.ef_construction < self.m {
            return Err(HnswError::InvalidOptions(format!(
                "ef_construction ({}) must be at least M ({})",
                self.ef_construction, self.m
            )));
        }
        if self.ef_construction > config::HNSW_MAX_EF_CONSTRUCTION {
            return Err(HnswError::InvalidOptions(format!(
                "ef_construction must be at most {}, got {}",
                config::HNSW_MAX_EF_CONSTRUCTION,
                self.ef_construction
            )));
        }
        Ok(())
    }

    /// Validated graph configuration for vectors of `dimensions` components.
    pub fn into_config(self, dimensions: usize) -> Result<HnswConfig> {
        self.validate()?;
        if dimensions == 0 || dimensions > config::MAX_DIMENSION {
            return Err(HnswError::InvalidOptions(format!(
                "dimensions must be between 1 and {}, got {}",
                config::MAX_DIMENSION,
                dimensions
            )));
        }
        Ok(HnswConfig {
            dimensions,
            m: self.m,
            ef_construction: self.ef_construction,
            metric: self.metric,
            random_seed: self.random_seed,
            heuristic: self.heuristic,
        })
    }
}

impl From<&HnswConfig> for IndexOptions {
    fn from(config: &HnswConfig) -> Self {
        Self {
            m: config.m,
            ef_construction: config.ef_construction,
            metric: config.metric,
            random_seed: config.random_seed,
            heuristic: config.heuristic,
        }
    }
}

/// Parse and check the user-facing options; the remaining fields take defaults.
pub fn validate_options(m: usize, ef_construction: usize, metric: &str) -> Result<IndexOptions> {
    let options = IndexOptions {
        m,
        ef_construction,
        metric: metric.parse()?,
        ..IndexOptions::default()
    };
    options.validate()?;
    Ok(options)
}
