//! Generation output types.

use serde::{Deserialize, Serialize};

/// Raw output of a single model invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    /// Text produced by the model, with runtime chatter stripped.
    pub text: String,
    /// Timing and resource statistics for the call.
    pub stats: GenerationStats,
}

/// Timing statistics reported alongside every extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Wall-clock generation time in seconds (2 decimals).
    pub generation_time_s: f64,
    /// Decode throughput, when the runtime reports it (1 decimal).
    pub tokens_per_second: Option<f64>,
    /// Peak memory in GB, when the runtime reports it (2 decimals).
    pub peak_memory_gb: Option<f64>,
}

impl GenerationStats {
    /// Build stats from raw measurements, rounding and dropping zero readings.
    pub fn new(generation_time_s: f64, tokens_per_second: f64, peak_memory_gb: f64) -> Self {
        Self {
            generation_time_s: round_to(generation_time_s, 2),
            tokens_per_second: non_zero(tokens_per_second).map(|v| round_to(v, 1)),
            peak_memory_gb: non_zero(peak_memory_gb).map(|v| round_to(v, 2)),
        }
    }
}

fn non_zero(value: f64) -> Option<f64> {
    if value.is_finite() && value > 0.0 {
        Some(value)
    } else {
        None
    }
}

/// Round to a fixed number of decimal places.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
