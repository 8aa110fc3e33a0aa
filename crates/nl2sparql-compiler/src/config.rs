//! Compiler configuration.
//!
//! Every field has a default, so a config file only needs the keys it
//! changes:
//!
//! ```json
//! { "direct_match_threshold": 0.9, "points": { "class": "Point", "coordinates": ["X", "Y", "Z"] } }
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Minimum fuzzy score of an entity against the root word itself.
    pub direct_match_threshold: f64,
    /// Minimum fuzzy score of an entity against one of the word's synonyms.
    pub synonym_match_threshold: f64,
    /// Shortest simple paths enumerated per root-word pair.
    pub max_candidate_paths: usize,
    /// Shortest simple paths enumerated per annotated segment.
    pub max_annotation_paths: usize,
    /// Prefix bound to the schema namespace in the generated query.
    pub schema_prefix: String,
    /// Drop data-property groups whose variable nothing else mentions.
    pub prune_unreferenced_properties: bool,
    pub points: Option<PointsConfig>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            direct_match_threshold: 0.80,
            synonym_match_threshold: 0.85,
            max_candidate_paths: 10,
            max_annotation_paths: 64,
            schema_prefix: "schema".to_string(),
            prune_unreferenced_properties: true,
            points: None,
        }
    }
}

impl CompilerConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Point-cloud profile: occurrences of `class` (or a subclass) always expose
/// their coordinate properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsConfig {
    pub class: String,
    #[serde(default)]
    pub coordinates: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg = CompilerConfig::from_json(
            r#"{"direct_match_threshold": 0.9, "points": {"class": "Point", "coordinates": ["X"]}}"#,
        )
        .expect("config");
        assert_eq!(cfg.direct_match_threshold, 0.9);
        assert_eq!(cfg.synonym_match_threshold, 0.85);
        assert_eq!(cfg.max_candidate_paths, 10);
        assert_eq!(cfg.schema_prefix, "schema");
        assert_eq!(cfg.points.map(|p| p.coordinates), Some(vec!["X".to_string()]));
    }
}
