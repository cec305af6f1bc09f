//! BDV scene descriptors (`SpimData` XML).
//!
//! A scene descriptor lists timepoints, view setups and view registrations,
//! plus one `<ImageLoader>` element naming the pixel backend. The parser keeps
//! the loader element raw; turning it into an [`ImageLoader`] is the job of
//! [`crate::backend`], which needs the descriptor's own location to anchor
//! relative paths.
//!
//! [`ImageLoader`]: crate::backend::ImageLoader

mod parser;
mod writer;

use std::collections::BTreeMap;

use crate::model::{SequenceShell, ViewRegistrations};

pub use parser::parse_scene_descriptor;
pub use writer::write_scene_descriptor;

/// Text of a descriptor element together with its `type` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextField {
    pub text: String,
    pub path_type: Option<String>,
}

impl TextField {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            path_type: None,
        }
    }

    pub fn relative(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            path_type: Some("relative".to_string()),
        }
    }

    /// True for `type="relative"` path elements.
    pub fn is_relative(&self) -> bool {
        self.path_type.as_deref() == Some("relative")
    }
}

/// Raw `<ImageLoader>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderElement {
    /// `format` attribute, e.g. `bdv.n5.s3`
    pub format: String,
    pub version: Option<String>,
    /// Child elements by tag name; the first occurrence of a tag wins
    pub fields: BTreeMap<String, TextField>,
}

impl LoaderElement {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            version: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, field: TextField) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&TextField> {
        self.fields.get(name)
    }

    /// Trimmed, non-empty text of `name`.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|f| f.text.trim())
            .filter(|t| !t.is_empty())
    }
}

/// A parsed scene descriptor whose backend is not yet resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDescriptor {
    pub shell: SequenceShell,
    pub registrations: ViewRegistrations,
    pub image_loader: Option<LoaderElement>,
    pub base_path: Option<TextField>,
}
