use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};
use url::Url;

use super::S3Address;
use crate::error::IoError;

/// Where a dataset document or store lives.
///
/// Strings containing `://` are URLs, everything else is a filesystem path.
/// The scheme is never used to pick a dataset format, only to pick a transport.
/// Stores resolved from object-store fields are addressed as
/// [`Location::Object`], which keeps their signing region.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Path(PathBuf),
    Url(Url),
    Object(S3Address),
}

impl Location {
    /// Parse a path or URL string.
    pub fn parse(input: &str) -> Result<Self, IoError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(IoError::InvalidLocation("empty location".to_string()));
        }

        if input.contains("://") {
            let url = Url::parse(input)
                .map_err(|e| IoError::InvalidLocation(format!("{}: {}", input, e)))?;
            Ok(Location::Url(url))
        } else {
            Ok(Location::Path(PathBuf::from(input)))
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Location::Path(path) => Some(path),
            Location::Url(_) | Location::Object(_) => None,
        }
    }

    pub fn as_url(&self) -> Option<&Url> {
        match self {
            Location::Url(url) => Some(url),
            Location::Path(_) | Location::Object(_) => None,
        }
    }

    /// Whether this location is served by an object store rather than the
    /// local filesystem.
    pub fn is_remote(&self) -> bool {
        !matches!(self, Location::Path(_))
    }

    /// Resolve `child` beneath this location, treating it as a directory.
    ///
    /// ```
    /// use spim_resolver::io::Location;
    ///
    /// let root = Location::parse("https://s3.example.org/bucket/image.ome.zarr").unwrap();
    /// let attrs = root.join(".zattrs").unwrap();
    /// assert_eq!(attrs.to_string(), "https://s3.example.org/bucket/image.ome.zarr/.zattrs");
    /// ```
    pub fn join(&self, child: &str) -> Result<Location, IoError> {
        match self {
            Location::Path(path) => Ok(Location::Path(path.join(child))),
            Location::Url(url) => {
                let mut base = url.clone();
                if !base.path().ends_with('/') {
                    let path = format!("{}/", base.path());
                    base.set_path(&path);
                }
                base.join(child)
                    .map(Location::Url)
                    .map_err(|e| IoError::InvalidLocation(format!("{} + {}: {}", url, child, e)))
            }
            Location::Object(address) => Ok(Location::Object(address.child(child))),
        }
    }

    /// Resolve `sibling` next to this location, treating it as a file.
    ///
    /// This is how `type="relative"` paths inside a descriptor are anchored.
    pub fn sibling(&self, sibling: &str) -> Result<Location, IoError> {
        match self {
            Location::Path(path) => {
                let parent = path.parent().unwrap_or_else(|| Path::new(""));
                Ok(Location::Path(parent.join(sibling)))
            }
            Location::Url(url) => url
                .join(sibling)
                .map(Location::Url)
                .map_err(|e| IoError::InvalidLocation(format!("{} ~ {}: {}", url, sibling, e))),
            Location::Object(address) => Ok(Location::Object(address.parent().child(sibling))),
        }
    }

    /// Directory containing this location.
    pub fn parent(&self) -> Result<Location, IoError> {
        match self {
            Location::Path(path) => Ok(Location::Path(
                path.parent().map(Path::to_path_buf).unwrap_or_default(),
            )),
            Location::Url(url) => url
                .join("./")
                .map(Location::Url)
                .map_err(|e| IoError::InvalidLocation(format!("{}: {}", url, e))),
            Location::Object(address) => Ok(Location::Object(address.parent())),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Path(path) => write!(f, "{}", path.display()),
            Location::Url(url) => write!(f, "{}", url),
            Location::Object(address) => write!(f, "{}", address),
        }
    }
}

impl From<PathBuf> for Location {
    fn from(path: PathBuf) -> Self {
        Location::Path(path)
    }
}

impl From<Url> for Location {
    fn from(url: Url) -> Self {
        Location::Url(url)
    }
}

impl From<S3Address> for Location {
    fn from(address: S3Address) -> Self {
        Location::Object(address)
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
