//! Thin `RawResourceHandler` implementations translating `vault://` URIs
//! into `UpstreamClient` calls. This is glue, not a designed component —
//! the interesting engineering lives in `resources::handler`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::batch::BatchProcessor;
use crate::error::{Error, UpstreamError, ValidationError};
use crate::pagination::{PaginationEngine, PaginationMeta};
use crate::resources::{MetadataEnricher, RawResourceHandler, ResourceMeta};
use crate::upstream::{ContentFormat, TagLocation, TagOp, UpstreamClient};

fn require_param<'a>(params: &'a HashMap<String, String>, name: &str) -> Result<&'a str, Error> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| Error::from(ValidationError::MissingArgument(name.to_string())))
}

/// Slices `items` to the page described by `uri`'s `limit`/`offset`/`page`
/// query parameters, alongside the pagination metadata for the full
/// (unsliced) collection. An offset past the end of `items` yields an empty
/// page with `hasMore = false`, per the boundary case list handlers share.
fn paginate<T>(uri: &str, items: Vec<T>) -> (Vec<T>, PaginationMeta) {
    let params = PaginationEngine::parse(uri);
    let total_items = items.len() as u64;
    let start = params.offset.min(total_items) as usize;
    let end = params.offset.saturating_add(params.limit).min(total_items) as usize;

    let page = if start < end {
        items.into_iter().skip(start).take(end - start).collect()
    } else {
        Vec::new()
    };

    (page, PaginationEngine::meta(params, total_items))
}

/// Pulls `size`/`mtime` out of the `stat` block the plugin's JSON-format
/// note payload carries, falling back to zero/`None` for whichever fields
/// are missing.
fn meta_from_stat(value: &Value) -> ResourceMeta {
    let stat = value.get("stat");
    let size = stat
        .and_then(|s| s.get("size"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let last_modified = stat
        .and_then(|s| s.get("mtime"))
        .and_then(Value::as_i64)
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|dt: chrono::DateTime<chrono::Utc>| dt.to_rfc3339());

    ResourceMeta {
        size,
        size_formatted: MetadataEnricher::format_size(size),
        last_modified,
    }
}

pub struct VaultTagsHandler {
    upstream: Arc<dyn UpstreamClient>,
}

impl VaultTagsHandler {
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self { upstream }
    }
}

#[async_trait]
impl RawResourceHandler for VaultTagsHandler {
    async fn handle_request(
        &self,
        uri: &str,
        _params: &HashMap<String, String>,
    ) -> Result<serde_json::Value, Error> {
        let tags = self.upstream.get_all_tags().await?;
        let (page, pagination) = paginate(uri, tags);
        Ok(json!({ "tags": page, "pagination": pagination }))
    }
}

pub struct VaultStatsHandler {
    upstream: Arc<dyn UpstreamClient>,
}

impl VaultStatsHandler {
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self { upstream }
    }
}

#[async_trait]
impl RawResourceHandler for VaultStatsHandler {
    async fn handle_request(
        &self,
        _uri: &str,
        _params: &HashMap<String, String>,
    ) -> Result<serde_json::Value, Error> {
        let files = self.upstream.list_files_in_vault().await?;
        let (dirs, notes): (Vec<_>, Vec<_>) = files.iter().partition(|f| f.is_dir);
        Ok(json!({
            "totalFiles": notes.len(),
            "totalDirectories": dirs.len(),
        }))
    }
}

pub struct VaultStructureHandler {
    upstream: Arc<dyn UpstreamClient>,
}

impl VaultStructureHandler {
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self { upstream }
    }
}

#[async_trait]
impl RawResourceHandler for VaultStructureHandler {
    async fn handle_request(
        &self,
        uri: &str,
        _params: &HashMap<String, String>,
    ) -> Result<serde_json::Value, Error> {
        let files = self.upstream.list_files_in_vault().await?;
        let (page, pagination) = paginate(uri, files);
        Ok(json!({ "entries": page, "pagination": pagination }))
    }
}

/// Fans out over the vault's file listing with a bounded-concurrency
/// `BatchProcessor` to assemble the recent-changes view — the one vault
/// handler that exercises the batch fan-out component per the data-flow
/// note in the system overview.
pub struct VaultRecentHandler {
    upstream: Arc<dyn UpstreamClient>,
    batch: Arc<BatchProcessor>,
}

impl VaultRecentHandler {
    pub fn new(upstream: Arc<dyn UpstreamClient>, batch: Arc<BatchProcessor>) -> Self {
        Self { upstream, batch }
    }
}

#[async_trait]
impl RawResourceHandler for VaultRecentHandler {
    async fn handle_request(
        &self,
        uri: &str,
        _params: &HashMap<String, String>,
    ) -> Result<serde_json::Value, Error> {
        let files = self.upstream.list_files_in_vault().await?;
        let paths: Vec<String> = files
            .into_iter()
            .filter(|f| !f.is_dir)
            .map(|f| f.path)
            .collect();
        let (page_paths, pagination) = paginate(uri, paths);

        let upstream = self.upstream.clone();
        let results = self
            .batch
            .process(page_paths, move |path: String| {
                let upstream = upstream.clone();
                async move {
                    let value = upstream
                        .get_file_contents(&path, Some(ContentFormat::Json))
                        .await?;
                    let meta =
                        MetadataEnricher::enrich(|| async { Ok::<_, UpstreamError>(meta_from_stat(&value)) })
                            .await;
                    Ok::<_, UpstreamError>(json!({ "path": path, "contents": value, "_meta": meta }))
                }
            })
            .await;

        let entries: Vec<serde_json::Value> = results
            .into_iter()
            .filter_map(|r| r.result)
            .collect();

        Ok(json!({ "recent": entries, "pagination": pagination }))
    }
}

pub struct VaultNoteHandler {
    upstream: Arc<dyn UpstreamClient>,
}

impl VaultNoteHandler {
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self { upstream }
    }
}

#[async_trait]
impl RawResourceHandler for VaultNoteHandler {
    async fn handle_request(
        &self,
        _uri: &str,
        params: &HashMap<String, String>,
    ) -> Result<serde_json::Value, Error> {
        let path = require_param(params, "path")?;
        let contents = self
            .upstream
            .get_file_contents(path, Some(ContentFormat::Markdown))
            .await?;

        let upstream = self.upstream.clone();
        let path_owned = path.to_string();
        let meta = MetadataEnricher::enrich(|| async move {
            let json_value = upstream
                .get_file_contents(&path_owned, Some(ContentFormat::Json))
                .await?;
            Ok::<_, UpstreamError>(meta_from_stat(&json_value))
        })
        .await;

        Ok(json!({ "path": path, "contents": contents, "_meta": meta }))
    }
}

pub struct VaultFolderHandler {
    upstream: Arc<dyn UpstreamClient>,
}

impl VaultFolderHandler {
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self { upstream }
    }
}

#[async_trait]
impl RawResourceHandler for VaultFolderHandler {
    async fn handle_request(
        &self,
        uri: &str,
        params: &HashMap<String, String>,
    ) -> Result<serde_json::Value, Error> {
        let path = require_param(params, "path")?;
        let files = self.upstream.list_files_in_dir(path).await?;
        let (page, pagination) = paginate(uri, files);
        Ok(json!({ "path": path, "entries": page, "pagination": pagination }))
    }
}

pub struct VaultTagHandler {
    upstream: Arc<dyn UpstreamClient>,
}

impl VaultTagHandler {
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self { upstream }
    }
}

#[async_trait]
impl RawResourceHandler for VaultTagHandler {
    async fn handle_request(
        &self,
        uri: &str,
        params: &HashMap<String, String>,
    ) -> Result<serde_json::Value, Error> {
        let tagname = require_param(params, "tagname")?;
        let files = self.upstream.get_files_by_tag(tagname).await?;
        let (page, pagination) = paginate(uri, files);
        Ok(json!({ "tag": tagname, "files": page, "pagination": pagination }))
    }
}

pub struct VaultDailyHandler {
    upstream: Arc<dyn UpstreamClient>,
}

impl VaultDailyHandler {
    pub fn new(upstream: Arc<dyn UpstreamClient>) -> Self {
        Self { upstream }
    }
}

#[async_trait]
impl RawResourceHandler for VaultDailyHandler {
    async fn handle_request(
        &self,
        _uri: &str,
        params: &HashMap<String, String>,
    ) -> Result<serde_json::Value, Error> {
        let date = require_param(params, "date")?;
        let path = format!("Daily/{date}.md");
        let contents = self
            .upstream
            .get_file_contents(&path, Some(ContentFormat::Markdown))
            .await?;
        Ok(json!({ "date": date, "contents": contents }))
    }
}

/// Used by `manage_file_tags`-backed tool handlers (outside the resource
/// registry, which is read-only) — kept here since it shares the param
/// parsing helpers above.
pub fn parse_tag_op(raw: &str) -> Result<TagOp, Error> {
    match raw {
        "add" => Ok(TagOp::Add),
        "remove" => Ok(TagOp::Remove),
        other => Err(Error::from(ValidationError::InvalidUri(format!(
            "unknown tag operation: {other}"
        )))),
    }
}

pub fn parse_tag_location(raw: &str) -> Result<TagLocation, Error> {
    match raw {
        "frontmatter" => Ok(TagLocation::Frontmatter),
        "inline" => Ok(TagLocation::Inline),
        other => Err(Error::from(ValidationError::InvalidUri(format!(
            "unknown tag location: {other}"
        )))),
    }
}
