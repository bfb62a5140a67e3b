use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("selection is empty")]
    EmptySelection,
    #[error("length mismatch: expected {expected} vertices, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("vertex {index} out of range for mesh with {len} vertices")]
    VertexOutOfRange { index: usize, len: usize },
    #[error("gesture was started on a mesh with a different vertex count")]
    GestureOutdated,
    #[error("no gesture of the requested kind is active")]
    NoActiveGesture,
    #[error("saved selection {index} out of range ({len} saved)")]
    SavedSelectionOutOfRange { index: usize, len: usize },

    #[error("unsupported format {0:?}; supported formats are jpg, png, tga, exr")]
    UnsupportedFormat(PathBuf),
    #[error("line {line}: bad vertex index {token:?}")]
    Parse { line: usize, token: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Obj(#[from] obj::ObjError),
}
