//! Render limits

use serde::{Deserialize, Serialize};

/// Bounds applied while parsing and rendering
///
/// Deserializes from camelCase JSON; missing fields take their defaults:
///
/// ```
/// use liquido::RenderOptions;
///
/// let options = RenderOptions::from_json(r#"{ "maxIterations": 500 }"#).unwrap();
/// assert_eq!(options.max_iterations, 500);
/// assert_eq!(options.max_nesting_depth, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    /// Total loop iterations allowed in one render, across all loops
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Deepest allowed nesting of block tags
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,
}

fn default_max_iterations() -> usize {
    1_000_000
}

fn default_max_nesting_depth() -> usize {
    64
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_nesting_depth: default_max_nesting_depth(),
        }
    }
}

impl RenderOptions {
    /// Parse options from JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_nesting_depth(mut self, max_nesting_depth: usize) -> Self {
        self.max_nesting_depth = max_nesting_depth;
        self
    }
}
