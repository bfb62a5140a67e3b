use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ops::MoveMode;

/// Tool settings for an editing session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Grid pitch for treating nearby positions as coincident. `None` means
    /// only bit-identical positions are.
    pub weld_quantum: Option<f64>,
    /// Whether dragging a vertex also drags every vertex coincident with it.
    pub weld_duplicates: bool,
    /// Edge length of exported selection textures, in texels.
    pub texture_size: u32,
    pub move_mode: MoveMode,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            weld_quantum: None,
            weld_duplicates: true,
            texture_size: 256,
            move_mode: MoveMode::ByDelta,
        }
    }
}

impl ToolConfig {
    pub fn load<P: AsRef<Path>>(file: P) -> Result<Self> {
        let string = std::fs::read_to_string(file)?;
        Ok(serde_json::from_str(&string)?)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: ToolConfig =
            serde_json::from_str(r#"{"weld_quantum": 0.001, "move_mode": "snap_to_point"}"#)
                .expect("valid json");
        assert_eq!(
            config,
            ToolConfig {
                weld_quantum: Some(0.001),
                move_mode: MoveMode::SnapToPoint,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("seamweld.json");
        std::fs::write(&path, r#"{"texture_size": 512, "weld_duplicates": false}"#)
            .expect("write");
        let config = ToolConfig::load(&path).expect("load");
        assert_eq!(config.texture_size, 512);
        assert!(!config.weld_duplicates);
        assert_eq!(config.weld_quantum, None);
    }
}
