//! Response envelope types returned by resource reads.

use serde::{Deserialize, Serialize};

use crate::pagination::PaginationMeta;

/// Best-effort metadata attached to note-like resources. Populated by
/// [`crate::resources::metadata::MetadataEnricher`]; absent fields fall
/// back to conservative defaults rather than blocking the response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResourceMeta {
    pub size: u64,
    pub size_formatted: String,
    pub last_modified: Option<String>,
}

impl ResourceMeta {
    pub fn conservative_default() -> Self {
        Self {
            size: 0,
            size_formatted: "0 B".to_string(),
            last_modified: None,
        }
    }
}

/// The envelope a `CachedResourceHandler` stores in the cache and hands
/// back to the transport layer. Carries either `contents` (text/JSON) or a
/// `blob` (base64 bytes plus mime type).
#[derive(Debug, Clone, Serialize)]
pub struct ResourceResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResourceMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationMeta>,
}

impl ResourceResponse {
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            contents: Some(value),
            blob: None,
            mime_type: None,
            meta: None,
            pagination: None,
        }
    }

    pub fn blob(blob: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            contents: None,
            blob: Some(blob.into()),
            mime_type: Some(mime_type.into()),
            meta: None,
            pagination: None,
        }
    }

    pub fn with_meta(mut self, meta: ResourceMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationMeta) -> Self {
        self.pagination = Some(pagination);
        self
    }
}
