use serde::{Deserialize, Serialize};

use crate::error::{Result, StatError};

/// Security reference data needed for price bucketing.
///
/// Statistics objects keep only the `id` and re-resolve everything else
/// through the source they are handed on each call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Security {
    pub id: String,
    pub tick_size: f64,
}

impl Security {
    pub fn new(id: impl Into<String>, tick_size: f64) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(StatError::invalid("security id must not be empty"));
        }
        if !(tick_size.is_finite() && tick_size > 0.0) {
            return Err(StatError::invalid(format!(
                "tick size must be positive, got {tick_size}"
            )));
        }
        Ok(Self { id, tick_size })
    }

    /// Width in price units of one histogram bucket of `bucket_width` ticks.
    pub fn bucket_size(&self, bucket_width: u32) -> f64 {
        self.tick_size * f64::from(bucket_width)
    }
}
