//! Validated command for creating one idea record

use serde::{Deserialize, Serialize};

/// Output of the row transformer, input of the record sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateIdea {
    pub title: String,
    pub description: String,
    /// Uniqueness key; collisions are resolved by the sink
    pub slug: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub target_market: Option<String>,
    pub revenue_model: Option<String>,
    /// Estimated addressable market (currency units)
    pub market_size: Option<f64>,
    /// 1 (easy) to 5 (hard)
    pub difficulty: Option<u8>,
    pub featured: bool,
    /// Free-form JSON object
    pub metadata: Option<serde_json::Value>,
}
