//! Maps static URIs and URI templates to raw resource handlers.

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::RawResourceHandler;

/// A bound template match: the handler plus the extracted parameters.
pub struct Resolution {
    pub handler: Arc<dyn RawResourceHandler>,
    pub params: HashMap<String, String>,
}

struct Template {
    /// Segments before the first `{name}` placeholder, e.g. `vault://note/`.
    prefix: String,
    param_name: String,
    handler: Arc<dyn RawResourceHandler>,
}

/// Resolves `vault://` URIs to handlers. Exact static matches win over
/// templates; templates bind everything after their prefix as one greedy
/// parameter (`vault://note/{path}` against `vault://note/a/b.md` binds
/// `path = "a/b.md"`).
#[derive(Default)]
pub struct ResourceRegistry {
    exact: HashMap<String, Arc<dyn RawResourceHandler>>,
    templates: Vec<Template>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a static URI, e.g. `vault://tags`.
    pub fn register_static(&mut self, uri: impl Into<String>, handler: Arc<dyn RawResourceHandler>) {
        self.exact.insert(uri.into(), handler);
    }

    /// Registers a handler for a template URI containing exactly one
    /// `{name}` placeholder at the end, e.g. `vault://note/{path}`.
    pub fn register_template(
        &mut self,
        template: &str,
        handler: Arc<dyn RawResourceHandler>,
    ) {
        let (prefix, param_name) = split_template(template);
        self.templates.push(Template {
            prefix,
            param_name,
            handler,
        });
    }

    /// Resolves `uri` against exact matches first, then templates.
    pub fn resolve(&self, uri: &str) -> Option<Resolution> {
        let base = strip_query(uri);

        if let Some(handler) = self.exact.get(base) {
            return Some(Resolution {
                handler: handler.clone(),
                params: HashMap::new(),
            });
        }

        self.templates
            .iter()
            .find(|t| base.starts_with(t.prefix.as_str()) && base.len() > t.prefix.len())
            .map(|t| {
                let value = &base[t.prefix.len()..];
                let mut params = HashMap::new();
                params.insert(t.param_name.clone(), value.to_string());
                Resolution {
                    handler: t.handler.clone(),
                    params,
                }
            })
    }

    /// Lists every registered template string, static URIs first.
    pub fn list(&self) -> Vec<String> {
        let mut out: Vec<String> = self.exact.keys().cloned().collect();
        out.sort();
        let mut templated: Vec<String> = self
            .templates
            .iter()
            .map(|t| format!("{}{{{}}}", t.prefix, t.param_name))
            .collect();
        templated.sort();
        out.extend(templated);
        out
    }
}

fn split_template(template: &str) -> (String, String) {
    let open = template.rfind('{').expect("template must contain {name}");
    let close = template.rfind('}').expect("template must contain {name}");
    let prefix = template[..open].to_string();
    let param_name = template[open + 1..close].to_string();
    (prefix, param_name)
}

fn strip_query(uri: &str) -> &str {
    uri.split_once('?').map(|(base, _)| base).unwrap_or(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;

    struct StubHandler(&'static str);

    #[async_trait]
    impl RawResourceHandler for StubHandler {
        async fn handle_request(
            &self,
            _uri: &str,
            _params: &HashMap<String, String>,
        ) -> Result<serde_json::Value, Error> {
            Ok(serde_json::json!({ "handler": self.0 }))
        }
    }

    #[test]
    fn exact_match_wins_over_template() {
        let mut registry = ResourceRegistry::new();
        registry.register_static("vault://tags", Arc::new(StubHandler("tags")));
        registry.register_template("vault://note/{path}", Arc::new(StubHandler("note")));

        let resolution = registry.resolve("vault://tags").unwrap();
        assert!(resolution.params.is_empty());
    }

    #[test]
    fn template_captures_greedy_suffix() {
        let mut registry = ResourceRegistry::new();
        registry.register_template("vault://note/{path}", Arc::new(StubHandler("note")));

        let resolution = registry
            .resolve("vault://note/Daily/2024-01-01.md")
            .unwrap();
        assert_eq!(
            resolution.params.get("path").map(String::as_str),
            Some("Daily/2024-01-01.md")
        );
    }

    #[test]
    fn unresolved_uri_returns_none() {
        let registry = ResourceRegistry::new();
        assert!(registry.resolve("vault://unknown").is_none());
    }

    #[test]
    fn query_string_is_stripped_before_matching() {
        let mut registry = ResourceRegistry::new();
        registry.register_static("vault://recent", Arc::new(StubHandler("recent")));

        assert!(registry.resolve("vault://recent?limit=10").is_some());
    }
}
