//! Distance metrics for graph construction and search.
//!
//! Three metrics are supported: L2, inner product and cosine. All return a
//! value where **lower is better**. A metric is fixed at index creation and
//! stored in the meta page by its [`code`](DistanceMetric::code).

use crate::error::{HnswError, Result};
use std::fmt;
use std::str::FromStr;

/// Distance metric used for vector similarity computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Squared Euclidean distance (L2²) internally. Scans report `sqrt`.
    L2,
    /// Negative dot product: `-dot(a, b)`. Lower = higher similarity.
    InnerProduct,
    /// Cosine distance: `1 - cosine_similarity`. Range: \[0, 2\].
    Cosine,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length.
    ///
    /// Callers validate both operands with [`check_vector`](Self::check_vector)
    /// first, so the result is never NaN.
    #[inline]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        match self {
            DistanceMetric::L2 => euclidean_sq(a, b),
            DistanceMetric::InnerProduct => -dot_product(a, b),
            DistanceMetric::Cosine => {
                let denom = (norm_sq(a) * norm_sq(b)).sqrt();
                // Clamp rounding drift so identical vectors land on 0.
                (1.0 - dot_product(a, b) / denom).max(0.0)
            }
        }
    }

    /// Converts an internal distance into the value reported to the host.
    pub fn to_reported(&self, distance: f32) -> f32 {
        match self {
            DistanceMetric::L2 => distance.sqrt(),
            _ => distance,
        }
    }

    /// Rejects vectors for which this metric would produce an undefined distance.
    pub fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if let Some(pos) = vector.iter().position(|x| !x.is_finite()) {
            return Err(HnswError::InvalidVector(format!(
                "component {pos} is not finite"
            )));
        }
        if *self == DistanceMetric::Cosine && norm_sq(vector) == 0.0 {
            return Err(HnswError::InvalidVector(
                "cosine distance is undefined for a zero vector".into(),
            ));
        }
        Ok(())
    }

    /// Stable one-byte code used in the meta page.
    pub fn code(&self) -> u8 {
        match self {
            DistanceMetric::L2 => 1,
            DistanceMetric::InnerProduct => 2,
            DistanceMetric::Cosine => 3,
        }
    }

    /// Inverse of [`code`](Self::code).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(DistanceMetric::L2),
            2 => Some(DistanceMetric::InnerProduct),
            3 => Some(DistanceMetric::Cosine),
            _ => None,
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DistanceMetric::L2 => "l2",
            DistanceMetric::InnerProduct => "inner_product",
            DistanceMetric::Cosine => "cosine",
        })
    }
}

impl FromStr for DistanceMetric {
    type Err = HnswError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(DistanceMetric::L2),
            "ip" | "inner_product" | "dot" => Ok(DistanceMetric::InnerProduct),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(HnswError::InvalidOptions(format!(
                "unknown metric '{other}'"
            ))),
        }
    }
}

#[inline]
fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
fn euclidean_sq(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[inline]
fn norm_sq(a: &[f32]) -> f32 {
    dot_product(a, a)
}
