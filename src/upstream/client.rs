//! The `UpstreamClient` trait consumed by vault resource handlers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;

/// A single tag with its occurrence count across the vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagCount {
    pub name: String,
    pub count: u64,
}

/// Content format requested from `getFileContents`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    Markdown,
    Json,
}

/// Tag mutation operation for `manage_file_tags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOp {
    Add,
    Remove,
}

/// Where in the note a tag lives, for `manage_file_tags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagLocation {
    Frontmatter,
    Inline,
}

/// A vault file entry as returned by directory/listing calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub is_dir: bool,
}

/// The interface raw resource handlers call into, injected rather than
/// owned by the core so handlers can be tested against a stub. This crate
/// provides exactly one implementation, `ObsidianRestClient`.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn list_files_in_vault(&self) -> Result<Vec<FileEntry>, UpstreamError>;
    async fn list_files_in_dir(&self, path: &str) -> Result<Vec<FileEntry>, UpstreamError>;
    async fn get_file_contents(
        &self,
        path: &str,
        format: Option<ContentFormat>,
    ) -> Result<serde_json::Value, UpstreamError>;
    async fn get_binary_file_contents(&self, path: &str) -> Result<String, UpstreamError>;
    async fn search(&self, query: &str) -> Result<serde_json::Value, UpstreamError>;
    async fn get_all_tags(&self) -> Result<Vec<TagCount>, UpstreamError>;
    async fn get_files_by_tag(&self, name: &str) -> Result<Vec<FileEntry>, UpstreamError>;
    async fn manage_file_tags(
        &self,
        path: &str,
        op: TagOp,
        tags: &[String],
        location: TagLocation,
    ) -> Result<(), UpstreamError>;

    async fn create_file(&self, path: &str, content: &str) -> Result<(), UpstreamError>;
    async fn delete_file(&self, path: &str) -> Result<(), UpstreamError>;
    async fn rename_file(&self, path: &str, new_path: &str) -> Result<(), UpstreamError>;
    async fn move_file(&self, path: &str, new_path: &str) -> Result<(), UpstreamError>;
    async fn copy_file(&self, path: &str, new_path: &str) -> Result<(), UpstreamError>;

    async fn create_directory(&self, path: &str) -> Result<(), UpstreamError>;
    async fn delete_directory(&self, path: &str) -> Result<(), UpstreamError>;
}
