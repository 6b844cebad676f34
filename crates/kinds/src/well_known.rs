//! Built-in Kubernetes kinds
//!
//! Models for the kinds shipped with Kubernetes, derived from `k8s-openapi`
//! so group, version and plural never drift from the generated API types.

use crate::model::ResourceModel;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, Event, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod,
    Secret, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;

/// Pod (core/v1, namespaced)
pub fn pod() -> ResourceModel {
    ResourceModel::of::<Pod>()
}

/// Ingress (networking.k8s.io/v1, namespaced)
pub fn ingress() -> ResourceModel {
    ResourceModel::of::<Ingress>()
}

/// ClusterRole (rbac.authorization.k8s.io/v1, cluster scoped)
pub fn cluster_role() -> ResourceModel {
    ResourceModel::of::<ClusterRole>()
}

/// All built-in models known to [`lookup`]
pub fn all() -> Vec<ResourceModel> {
    vec![
        // core/v1
        ResourceModel::of::<ConfigMap>(),
        ResourceModel::of::<Endpoints>(),
        ResourceModel::of::<Event>(),
        ResourceModel::of::<Namespace>(),
        ResourceModel::of::<Node>(),
        ResourceModel::of::<PersistentVolume>(),
        ResourceModel::of::<PersistentVolumeClaim>(),
        pod(),
        ResourceModel::of::<Secret>(),
        ResourceModel::of::<Service>(),
        ResourceModel::of::<ServiceAccount>(),
        // apps/v1
        ResourceModel::of::<DaemonSet>(),
        ResourceModel::of::<Deployment>(),
        ResourceModel::of::<ReplicaSet>(),
        ResourceModel::of::<StatefulSet>(),
        // batch/v1
        ResourceModel::of::<CronJob>(),
        ResourceModel::of::<Job>(),
        // networking.k8s.io/v1
        ingress(),
        ResourceModel::of::<NetworkPolicy>(),
        // rbac.authorization.k8s.io/v1
        cluster_role(),
        ResourceModel::of::<ClusterRoleBinding>(),
        ResourceModel::of::<Role>(),
        ResourceModel::of::<RoleBinding>(),
        // apiextensions.k8s.io/v1
        ResourceModel::of::<CustomResourceDefinition>(),
    ]
}

/// Find a built-in model by kind ("Pod") or plural ("pods"), case-insensitive
pub fn lookup(name: &str) -> Option<ResourceModel> {
    all().into_iter().find(|model| {
        model.kind.eq_ignore_ascii_case(name) || model.plural.eq_ignore_ascii_case(name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_kind_and_plural() {
        assert_eq!(lookup("Pod"), Some(pod()));
        assert_eq!(lookup("pods"), Some(pod()));
        assert_eq!(lookup("INGRESSES"), Some(ingress()));
        assert_eq!(lookup("deployment").map(|m| m.group), Some("apps".to_string()));
    }

    #[test]
    fn test_lookup_unknown() {
        assert!(lookup("widgets").is_none());
    }

    #[test]
    fn test_all_models_are_complete() {
        for model in all() {
            assert!(!model.kind.is_empty());
            assert!(!model.version.is_empty(), "{} has no version", model.kind);
            assert!(!model.plural.is_empty(), "{} has no plural", model.kind);
        }
    }

    #[test]
    fn test_scopes() {
        assert!(pod().namespaced);
        assert!(ingress().namespaced);
        assert!(!cluster_role().namespaced);
        assert!(!lookup("Namespace").unwrap().namespaced);
    }
}
