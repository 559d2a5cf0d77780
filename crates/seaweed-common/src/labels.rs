//! Label scheme shared by every object the operator creates
//!
//! The same `(cluster, component)` pair always yields the same label set, so
//! the labels double as the Service and StatefulSet selector.

use std::collections::BTreeMap;

/// Standard label for the name of the application
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for the component within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the instance (the Seaweed resource name)
pub const K8S_INSTANCE: &str = "app.kubernetes.io/instance";

/// Standard label for the tool managing the object
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value for `app.kubernetes.io/name`
pub const APP_NAME: &str = "seaweedfs";

/// Component value for the master tier
pub const COMPONENT_MASTER: &str = "master";

/// Labels for objects belonging to `component` of the cluster `name`
pub fn labels_for(name: &str, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (K8S_NAME.to_string(), APP_NAME.to_string()),
        (K8S_COMPONENT.to_string(), component.to_string()),
        (K8S_INSTANCE.to_string(), name.to_string()),
        (K8S_MANAGED_BY.to_string(), crate::FIELD_MANAGER.to_string()),
    ])
}

/// Labels for master-tier objects of the cluster `name`
pub fn master_labels(name: &str) -> BTreeMap<String, String> {
    labels_for(name, COMPONENT_MASTER)
}

/// Render labels as a Kubernetes label selector string (`k=v,k=v`)
pub fn selector_string(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Returns true when every entry of `selector` is present in `labels`
pub fn selects(selector: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable_for_the_same_cluster() {
        assert_eq!(master_labels("cluster1"), master_labels("cluster1"));
        assert_ne!(master_labels("cluster1"), master_labels("cluster2"));
    }

    #[test]
    fn master_labels_contents() {
        let labels = master_labels("cluster1");
        assert_eq!(labels.get(K8S_NAME).map(String::as_str), Some("seaweedfs"));
        assert_eq!(labels.get(K8S_COMPONENT).map(String::as_str), Some("master"));
        assert_eq!(labels.get(K8S_INSTANCE).map(String::as_str), Some("cluster1"));
        assert_eq!(
            labels.get(K8S_MANAGED_BY).map(String::as_str),
            Some("seaweed-operator")
        );
    }

    #[test]
    fn selector_string_is_sorted() {
        let s = selector_string(&master_labels("c"));
        assert_eq!(
            s,
            "app.kubernetes.io/component=master,app.kubernetes.io/instance=c,\
             app.kubernetes.io/managed-by=seaweed-operator,app.kubernetes.io/name=seaweedfs"
        );
    }

    #[test]
    fn selects_requires_every_selector_entry() {
        let labels = master_labels("c");
        assert!(selects(&labels, &labels));

        let mut extra = labels.clone();
        extra.insert("statefulset.kubernetes.io/pod-name".into(), "c-master-0".into());
        assert!(selects(&labels, &extra));
        assert!(!selects(&extra, &labels));
        assert!(!selects(&master_labels("other"), &labels));
    }
}
