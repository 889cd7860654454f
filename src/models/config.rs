// Studio and show-style configuration

use serde::{Deserialize, Serialize};

use crate::{Result, RundownError};

/// Routes an output layer to a playout device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerMapping {
    pub layer: String,

    pub device_id: String,

    /// Content the layer holds when nothing from the rundown plays on it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<serde_json::Value>,
}

/// Studio settings: the physical side of the show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudioSettings {
    pub studio_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub mappings: Vec<LayerMapping>,

    /// Layer that carries part transitions, if the studio has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_layer: Option<String>,

    /// Pre-load the next part's pieces as lookahead objects
    #[serde(default)]
    pub lookahead: bool,
}

impl StudioSettings {
    pub fn mapping_for(&self, layer: &str) -> Option<&LayerMapping> {
        self.mappings.iter().find(|m| m.layer == layer)
    }
}

/// Show-style settings: the editorial side of the show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowStyleSettings {
    pub show_style_id: String,

    #[serde(default)]
    pub name: String,

    /// Blueprint-specific configuration document
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Studio + show-style settings, immutable for one cache epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub studio: StudioSettings,

    pub show_style: ShowStyleSettings,
}

impl Configuration {
    /// Reject configurations the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.studio.studio_id.trim().is_empty() {
            return Err(RundownError::Misconfiguration(
                "studio.studio_id must not be empty".to_string(),
            ));
        }
        if self.show_style.show_style_id.trim().is_empty() {
            return Err(RundownError::Misconfiguration(
                "show_style.show_style_id must not be empty".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for mapping in &self.studio.mappings {
            if !seen.insert(mapping.layer.as_str()) {
                return Err(RundownError::Misconfiguration(format!(
                    "layer {} is mapped more than once",
                    mapping.layer
                )));
            }
        }
        Ok(())
    }
}
