use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

use super::{Location, Transport};
use crate::error::IoError;

/// In-memory transport keyed by the location's string form.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    documents: HashMap<String, Bytes>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, location: &str, body: &str) -> Self {
        self.documents
            .insert(location.to_string(), Bytes::from(body.to_string()));
        self
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn read(&self, location: &Location) -> Result<Bytes, IoError> {
        self.documents
            .get(&location.to_string())
            .cloned()
            .ok_or_else(|| IoError::NotFound(location.to_string()))
    }

    async fn exists(&self, location: &Location) -> Result<bool, IoError> {
        let key = location.to_string();
        let prefix = format!("{}/", key.trim_end_matches('/'));
        Ok(self
            .documents
            .keys()
            .any(|k| *k == key || k.starts_with(&prefix)))
    }
}
