//! Best-effort metadata enrichment.
//!
//! Size/mtime lookups run under a bounded timeout and fall back to
//! conservative defaults on timeout or error, rather than blocking or
//! failing the primary resource response.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::envelope::ResourceMeta;

const ENRICHMENT_TIMEOUT: Duration = Duration::from_millis(500);

pub struct MetadataEnricher;

impl MetadataEnricher {
    /// Runs `fetch` with a bounded timeout. On timeout or error, returns
    /// `ResourceMeta::conservative_default()` instead of propagating —
    /// enrichment errors are captured and discarded, never surfaced to the
    /// caller of the primary response.
    pub async fn enrich<F, Fut, E>(fetch: F) -> ResourceMeta
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ResourceMeta, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(ENRICHMENT_TIMEOUT, fetch()).await {
            Ok(Ok(meta)) => meta,
            Ok(Err(err)) => {
                debug!(error = %err, "metadata enrichment failed, using defaults");
                ResourceMeta::conservative_default()
            }
            Err(_) => {
                debug!("metadata enrichment timed out, using defaults");
                ResourceMeta::conservative_default()
            }
        }
    }

    /// Formats a byte count the way response payloads expect it
    /// (`"1.5 KB"`, `"12 B"`), used when only a raw size is cheaply
    /// available inline.
    pub fn format_size(bytes: u64) -> String {
        const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
        if bytes == 0 {
            return "0 B".to_string();
        }

        let mut size = bytes as f64;
        let mut unit = 0;
        while size >= 1024.0 && unit < UNITS.len() - 1 {
            size /= 1024.0;
            unit += 1;
        }

        if unit == 0 {
            format!("{bytes} B")
        } else {
            format!("{size:.1} {}", UNITS[unit])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enrichment_returns_value_when_fast() {
        let meta = MetadataEnricher::enrich(|| async {
            Ok::<_, std::io::Error>(ResourceMeta {
                size: 42,
                size_formatted: "42 B".to_string(),
                last_modified: None,
            })
        })
        .await;
        assert_eq!(meta.size, 42);
    }

    #[tokio::test]
    async fn enrichment_falls_back_on_timeout() {
        let meta = MetadataEnricher::enrich(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, std::io::Error>(ResourceMeta::conservative_default())
        })
        .await;
        assert_eq!(meta.size, 0);
        assert_eq!(meta.size_formatted, "0 B");
    }

    #[tokio::test]
    async fn enrichment_falls_back_on_error() {
        let meta = MetadataEnricher::enrich(|| async {
            Err::<ResourceMeta, _>(std::io::Error::other("boom"))
        })
        .await;
        assert_eq!(meta.size, 0);
    }

    #[test]
    fn format_size_human_readable() {
        assert_eq!(MetadataEnricher::format_size(0), "0 B");
        assert_eq!(MetadataEnricher::format_size(512), "512 B");
        assert_eq!(MetadataEnricher::format_size(2048), "2.0 KB");
    }
}
