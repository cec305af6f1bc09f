use std::fmt;

use thiserror::Error;

use crate::open::ImageDataFormat;

/// I/O errors raised by a [`Transport`](crate::io::Transport).
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object or file not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local filesystem failure other than a missing file
    #[error("I/O error on {path}: {message}")]
    Local { path: String, message: String },

    /// Location cannot be parsed or is not served by this transport
    #[error("Invalid location: {0}")]
    InvalidLocation(String),
}

/// Errors raised while parsing a BDV scene descriptor.
#[derive(Debug, Clone, Error)]
pub enum DescriptorError {
    /// Required element missing, unparseable value, or broken id reference
    #[error("Malformed scene descriptor: {0}")]
    Malformed(String),

    /// `<Timepoints type="...">` other than `range`
    #[error("Unsupported timepoint style: {0:?} (only \"range\" is supported)")]
    UnsupportedTimepointStyle(String),
}

impl DescriptorError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

/// Errors raised while turning an `<ImageLoader>` element into a backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// A mandatory loader field is absent
    #[error("Incomplete backend descriptor: missing <{0}>")]
    IncompleteBackendDescriptor(&'static str),

    /// The loader `format` attribute has no resolver
    #[error("Unsupported image loader format: {0}")]
    UnsupportedLoader(String),

    /// Requested resolution level is not addressable
    #[error("Resolution level {level} out of range: backend has {count} level(s)")]
    LevelOutOfRange { level: usize, count: usize },

    /// Requested timepoint or setup lies past the end of its array axis
    #[error("{axis} index {index} out of range: axis has length {length}")]
    ViewOutOfRange {
        axis: &'static str,
        index: u64,
        length: u64,
    },

    /// I/O error during resolution
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

/// Errors raised while reading array-group attribute documents.
#[derive(Debug, Clone, Error)]
pub enum AttributeError {
    /// Mandatory version or axis field absent
    #[error("Missing attributes: {0}")]
    MissingAttributes(String),

    /// Declared schema major version has no parser
    #[error("Unsupported {schema} version: {version}")]
    UnsupportedVersion {
        schema: &'static str,
        version: String,
    },

    /// Axis metadata does not match the array dimensionality
    #[error("Axis mismatch: {axes} axes declared for a {dimensions}-dimensional array")]
    AxisMismatch { axes: usize, dimensions: usize },

    /// Axis entry with an unknown type
    #[error("Invalid axis: {0}")]
    InvalidAxis(String),

    /// Document is not valid JSON for its schema
    #[error("Invalid attribute document {path}: {message}")]
    Json { path: String, message: String },

    /// I/O error while fetching a document
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

/// Any failure below the dispatcher.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Attributes(#[from] AttributeError),
}

/// Which half of a composed open failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeStage {
    /// The scene descriptor providing timepoints, setups and registrations
    Primary,
    /// The separately described store providing the image loader
    Secondary,
    /// Combining both halves
    Merge,
}

impl fmt::Display for ComposeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComposeStage::Primary => "primary descriptor",
            ComposeStage::Secondary => "secondary backend",
            ComposeStage::Merge => "merge",
        };
        f.write_str(name)
    }
}

/// Errors returned by [`SpimDataOpener::open`](crate::open::SpimDataOpener::open).
#[derive(Debug, Clone, Error)]
pub enum OpenError {
    /// No strategy registered for the declared format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(ImageDataFormat),

    /// One half of a composed dataset could not be resolved
    #[error("Failed to compose dataset ({stage}): {source}")]
    ComposeFailure {
        stage: ComposeStage,
        #[source]
        source: ResolveError,
    },

    /// Any lower-level parsing or I/O failure
    #[error("Failed to open dataset: {0}")]
    OpenFailure(#[source] ResolveError),
}

impl OpenError {
    pub(crate) fn compose(stage: ComposeStage, source: impl Into<ResolveError>) -> Self {
        Self::ComposeFailure {
            stage,
            source: source.into(),
        }
    }

    /// The lower-level cause, if any.
    pub fn cause(&self) -> Option<&ResolveError> {
        match self {
            OpenError::UnsupportedFormat(_) => None,
            OpenError::ComposeFailure { source, .. } => Some(source),
            OpenError::OpenFailure(source) => Some(source),
        }
    }
}

impl From<ResolveError> for OpenError {
    fn from(err: ResolveError) -> Self {
        OpenError::OpenFailure(err)
    }
}

impl From<IoError> for OpenError {
    fn from(err: IoError) -> Self {
        OpenError::OpenFailure(err.into())
    }
}

impl From<DescriptorError> for OpenError {
    fn from(err: DescriptorError) -> Self {
        OpenError::OpenFailure(err.into())
    }
}

impl From<BackendError> for OpenError {
    fn from(err: BackendError) -> Self {
        OpenError::OpenFailure(err.into())
    }
}

impl From<AttributeError> for OpenError {
    fn from(err: AttributeError) -> Self {
        OpenError::OpenFailure(err.into())
    }
}
