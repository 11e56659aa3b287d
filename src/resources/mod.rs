//! The read-side serving layer: registry, cached handler, envelope types,
//! and metadata enrichment.

pub mod envelope;
pub mod handler;
pub mod metadata;
pub mod registry;

pub use envelope::{ResourceMeta, ResourceResponse};
pub use handler::{CachedResourceHandler, HandlerStats, RawResourceHandler};
pub use metadata::MetadataEnricher;
pub use registry::{Resolution, ResourceRegistry};
