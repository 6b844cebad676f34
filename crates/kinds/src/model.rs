//! Resource model descriptor
//!
//! A `ResourceModel` carries everything needed to resolve the REST path of a
//! resource collection: API group, version, kind, plural name and scope.

use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::fmt;

/// Type descriptor for a Kubernetes resource collection.
///
/// An empty `group` denotes the core API group (`/api/v1`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceModel {
    /// API group (e.g. "networking.k8s.io"), empty for the core group
    #[serde(default)]
    pub group: String,

    /// API version within the group (e.g. "v1")
    pub version: String,

    /// Kind (e.g. "Ingress")
    pub kind: String,

    /// Lowercase plural used in URL paths (e.g. "ingresses")
    pub plural: String,

    /// Whether the resource lives inside a namespace
    #[serde(default)]
    pub namespaced: bool,
}

impl ResourceModel {
    /// Create a model for a resource in a named API group
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
        plural: impl Into<String>,
        namespaced: bool,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
            plural: plural.into(),
            namespaced,
        }
    }

    /// Create a model for a resource in the core API group
    pub fn core(
        version: impl Into<String>,
        kind: impl Into<String>,
        plural: impl Into<String>,
        namespaced: bool,
    ) -> Self {
        Self::new("", version, kind, plural, namespaced)
    }

    /// Derive a model from the metadata generated by `k8s-openapi`
    ///
    /// ```
    /// use k8s_openapi::api::networking::v1::Ingress;
    /// use kinds::ResourceModel;
    ///
    /// let model = ResourceModel::of::<Ingress>();
    /// assert_eq!(model.api_version(), "networking.k8s.io/v1");
    /// assert_eq!(model.plural, "ingresses");
    /// ```
    #[must_use]
    pub fn of<K>() -> Self
    where
        K: k8s_openapi::Resource,
        K::Scope: 'static,
    {
        Self {
            group: K::GROUP.to_string(),
            version: K::VERSION.to_string(),
            kind: K::KIND.to_string(),
            plural: K::URL_PATH_SEGMENT.to_string(),
            namespaced: TypeId::of::<K::Scope>() == TypeId::of::<k8s_openapi::NamespaceResourceScope>(),
        }
    }

    /// True when the model belongs to the core ("legacy") API group
    pub fn is_core(&self) -> bool {
        self.group.is_empty()
    }

    /// `apiVersion` as it appears in object manifests
    pub fn api_version(&self) -> String {
        if self.is_core() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Name used in diagnostics when the kind itself is missing
    pub fn display_name(&self) -> &str {
        if !self.kind.is_empty() {
            &self.kind
        } else if !self.plural.is_empty() {
            &self.plural
        } else if !self.group.is_empty() {
            &self.group
        } else {
            "<unknown>"
        }
    }
}

impl fmt::Display for ResourceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.plural, self.api_version())
    }
}
