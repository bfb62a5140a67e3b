//! Vertex selection, seam welding and group transforms for triangle meshes.

pub mod adjacency;
pub mod coincidence;
pub mod config;
pub mod error;
pub mod format;
pub mod idx;
pub mod mesh;
pub mod ops;
pub mod selection;
pub mod session;
pub mod texture;

pub use config::ToolConfig;
pub use error::{Error, Result};
pub use mesh::{MeshBuffer, Vertex};
pub use selection::{SavedSelection, SavedSelections, SelectionSet};
pub use session::{DisplayMode, EditSession, Interaction, Outcome, VisibilityFilter};
