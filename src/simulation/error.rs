//! Error types of the neighbor-configuration subsystem and its I/O collaborators.
//!
//! Configuration and consistency errors are returned to the caller instead of terminating the
//! process; the binary decides whether a failure is fatal.

use std::path::PathBuf;

use thiserror::Error;

use crate::floating_type_mod::FT;

pub type SphResult<T> = Result<T, SphError>;

#[derive(Error, Debug)]
pub enum SphError {
    #[error("bounding box is inverted or empty: lower {lower:?} is not below upper {upper:?}")]
    InvertedBoundingBox { lower: Vec<FT>, upper: Vec<FT> },

    #[error("cell spacing must be positive and finite, got {0}")]
    NonPositiveCellSpacing(FT),

    #[error("cutoff radius must be positive and finite, got {0}")]
    NonPositiveCutoffRadius(FT),

    #[error("smoothing length must be positive and finite, got {0}")]
    NonPositiveSmoothingLength(FT),

    #[error("buffer size must be at least one cell layer")]
    ZeroBufferSize,

    /// The particle moved further than the buffer layers allow since the last rebuild.
    #[error(
        "particle {particle} at {position:?} maps to cell {cell:?} outside of the {number_of_cells:?} grid \
         (buffer size too small for the particle displacement)"
    )]
    ParticleOutsideMesh {
        particle: usize,
        position: Vec<FT>,
        cell: Vec<i64>,
        number_of_cells: Vec<usize>,
    },

    #[error("kernel cutoff radius {kernel} exceeds the search cutoff {mesh} the cell linked list was built for")]
    CutoffRadiusExceedsMesh { kernel: FT, mesh: FT },

    #[error("{what}: expected {expected}, found {found}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("no body named '{0}'")]
    UnknownBody(String),

    #[error("a body named '{0}' already exists")]
    DuplicateBody(String),

    #[error("body '{0}' cannot be a contact body of itself")]
    SelfContact(String),

    #[error("neighbor configuration of particle {particle} is inconsistent: {details}")]
    InconsistentConfiguration { particle: usize, details: String },

    #[error("invalid simulation parameter '{name}': {details}")]
    InvalidParameter { name: &'static str, details: String },

    #[error("input file '{0}' does not exist")]
    MissingInput(PathBuf),

    #[error("i/o error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to export '{path}': {details}")]
    Export { path: PathBuf, details: String },
}

impl SphError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SphError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn yaml(path: impl Into<PathBuf>, source: serde_yaml::Error) -> Self {
        SphError::Yaml {
            path: path.into(),
            source,
        }
    }
}
