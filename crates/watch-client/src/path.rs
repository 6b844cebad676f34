//! REST path resolution for resource collections
//!
//! Pure functions mapping a [`ResourceModel`] and a [`Filters`] set to the URL
//! of the collection (or a single named object), the watch URL derived from it,
//! and the cache ID callers use to key persisted watch state.
//!
//! Label and field selectors are held in `BTreeMap`s, so selector strings are
//! always emitted sorted by key. Two filter sets with the same entries resolve
//! to the same URL and cache ID regardless of the order they were built in.

use crate::error::WatchError;
use kinds::ResourceModel;
use reqwest::Url;
use sha2::{Digest, Sha224};
use std::collections::BTreeMap;

/// Number of hex characters kept from the SHA-224 digest for a cache ID.
///
/// Cache IDs are persisted by callers; changing this changes every stored key.
pub const CACHE_ID_LEN: usize = 10;

const CACHE_ID_SERVER: &str = "https://ignore";

/// Filters narrowing a request to a namespace, a named object or a selector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    /// Namespace (ignored for cluster-scoped models)
    pub namespace: Option<String>,
    /// Object name
    pub name: Option<String>,
    /// Label selector, `key=value` terms
    pub labels: BTreeMap<String, String>,
    /// Field selector, `key=value` terms
    pub fields: BTreeMap<String, String>,
}

impl Filters {
    /// Empty filter set (every object of the collection, all namespaces)
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a namespace
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Restrict to a single object
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add a `key=value` label selector term
    #[must_use]
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add a `key=value` field selector term
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    fn namespace_value(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    fn name_value(&self) -> Option<&str> {
        self.name.as_deref().filter(|name| !name.is_empty())
    }
}

/// Build the URL for a model and filter set.
///
/// With `exclude_name` the object name is left out of the path, which yields
/// the collection URL used for list and watch requests.
///
/// # Errors
///
/// * `InvalidModel` when the model has no kind
/// * `MissingVersion` when the model has no version
/// * `InvalidConfig` when `server_url` is not an absolute URL
pub fn build_url(
    server_url: &str,
    model: &ResourceModel,
    filters: &Filters,
    exclude_name: bool,
) -> Result<Url, WatchError> {
    let path = resolve_path(model, filters, exclude_name)?;
    let mut query = Vec::new();
    push_selector(&mut query, "fieldSelector", &filters.fields);
    push_selector(&mut query, "labelSelector", &filters.labels);
    assemble(server_url, &path, &query)
}

/// Build the URL of a watch request.
///
/// The path always excludes the object name; a named watch is expressed as a
/// `metadata.name` field selector merged with any field filters.
///
/// # Errors
///
/// Same as [`build_url`].
pub fn build_watch_url(
    server_url: &str,
    model: &ResourceModel,
    filters: &Filters,
    resource_version: Option<&str>,
    allow_bookmarks: bool,
) -> Result<Url, WatchError> {
    let path = resolve_path(model, filters, true)?;

    let mut fields = filters.fields.clone();
    if let Some(name) = filters.name_value() {
        fields.insert("metadata.name".to_string(), name.to_string());
    }

    let mut query = Vec::new();
    push_selector(&mut query, "fieldSelector", &fields);
    push_selector(&mut query, "labelSelector", &filters.labels);
    query.push(("watch", "true".to_string()));
    if allow_bookmarks {
        query.push(("allowWatchBookmarks", "true".to_string()));
    }
    if let Some(rv) = resource_version.filter(|rv| !rv.is_empty()) {
        query.push(("resourceVersion", rv.to_string()));
    }
    assemble(server_url, &path, &query)
}

/// Stable identifier for a model and filter set.
///
/// The first [`CACHE_ID_LEN`] hex characters of the SHA-224 digest of the
/// request path and query (name included). Server address and resource
/// version do not take part, so the ID survives reconnects and moves between
/// clusters.
///
/// # Errors
///
/// Same validation errors as [`build_url`].
pub fn cache_id(model: &ResourceModel, filters: &Filters) -> Result<String, WatchError> {
    let url = build_url(CACHE_ID_SERVER, model, filters, false)?;
    let mut key = url.path().to_string();
    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }

    let digest = format!("{:x}", Sha224::digest(key.as_bytes()));
    Ok(digest[..CACHE_ID_LEN].to_string())
}

fn resolve_path(
    model: &ResourceModel,
    filters: &Filters,
    exclude_name: bool,
) -> Result<String, WatchError> {
    if model.kind.is_empty() {
        return Err(WatchError::InvalidModel(model.display_name().to_string()));
    }
    if model.version.is_empty() {
        return Err(WatchError::MissingVersion(model.kind.clone()));
    }

    let mut path = if model.is_core() {
        format!("/api/{}", model.version)
    } else {
        format!("/apis/{}/{}", model.group, model.version)
    };

    if model.namespaced {
        if let Some(namespace) = filters.namespace_value() {
            path.push_str("/namespaces/");
            path.push_str(namespace);
        }
    }

    path.push('/');
    path.push_str(&model.plural);

    if !exclude_name {
        if let Some(name) = filters.name_value() {
            path.push('/');
            path.push_str(name);
        }
    }

    Ok(path)
}

fn push_selector(
    query: &mut Vec<(&'static str, String)>,
    key: &'static str,
    terms: &BTreeMap<String, String>,
) {
    if terms.is_empty() {
        return;
    }
    let selector = terms
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",");
    query.push((key, selector));
}

fn assemble(
    server_url: &str,
    path: &str,
    query: &[(&'static str, String)],
) -> Result<Url, WatchError> {
    let mut url = Url::parse(server_url).map_err(|e| {
        WatchError::InvalidConfig(format!("invalid server URL {}: {}", server_url, e))
    })?;
    if url.cannot_be_a_base() {
        return Err(WatchError::InvalidConfig(format!(
            "server URL {} cannot carry a path",
            server_url
        )));
    }

    url.set_path(path);
    url.set_query(None);
    url.set_fragment(None);
    // An empty query_pairs_mut() still leaves a trailing '?'
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
    }
    Ok(url)
}
