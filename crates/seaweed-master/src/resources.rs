//! Builders for master-tier objects
//!
//! Pure functions from a `Seaweed` to the full Kubernetes object for each
//! role. No I/O. Every map is a `BTreeMap`, so equal inputs serialize to
//! byte-identical objects. Owner references are added separately by
//! [`crate::bind_owner`].

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar,
    EnvVarSource, HTTPGetAction, ObjectFieldSelector, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use seaweed_common::crd::{ComputeResources, MasterSpec, Seaweed};
use seaweed_common::labels::master_labels;
use seaweed_common::{MASTER_GRPC_PORT, MASTER_HTTP_PORT};

/// Suffix of the headless peer Service
pub const PEER_SERVICE_SUFFIX: &str = "-master-peer";
/// Suffix of the client Service
pub const CLIENT_SERVICE_SUFFIX: &str = "-master";
/// Suffix of the master ConfigMap
pub const CONFIG_SUFFIX: &str = "-master-config";
/// Suffix of the master StatefulSet
pub const STATEFULSET_SUFFIX: &str = "-master";

/// Key of the configuration file inside the ConfigMap
pub const MASTER_CONFIG_FILE: &str = "master.toml";
/// Mount path of the ConfigMap inside master pods
pub const CONFIG_MOUNT_PATH: &str = "/etc/seaweedfs";
/// Metadata directory inside master pods
pub const DATA_MOUNT_PATH: &str = "/data";
/// Name of the master container
pub const MASTER_CONTAINER: &str = "master";

const CONFIG_VOLUME: &str = "master-config";
const DATA_VOLUME: &str = "master-data";
const READINESS_PATH: &str = "/cluster/status";

/// Name of the headless peer Service for cluster `name`
pub fn peer_service_name(name: &str) -> String {
    format!("{}{}", name, PEER_SERVICE_SUFFIX)
}

/// Name of the client Service for cluster `name`
pub fn client_service_name(name: &str) -> String {
    format!("{}{}", name, CLIENT_SERVICE_SUFFIX)
}

/// Name of the master ConfigMap for cluster `name`
pub fn config_map_name(name: &str) -> String {
    format!("{}{}", name, CONFIG_SUFFIX)
}

/// Name of the master StatefulSet for cluster `name`
pub fn statefulset_name(name: &str) -> String {
    format!("{}{}", name, STATEFULSET_SUFFIX)
}

/// Comma-separated `host:port` list of every master replica, resolved through
/// the peer Service (`<sts>-<i>.<peer-svc>.<ns>:9333`)
pub fn master_peers(name: &str, namespace: &str, replicas: i32) -> String {
    let peer_svc = peer_service_name(name);
    let sts = statefulset_name(name);
    (0..replicas.max(1))
        .map(|i| format!("{}-{}.{}.{}:{}", sts, i, peer_svc, namespace, MASTER_HTTP_PORT))
        .collect::<Vec<_>>()
        .join(",")
}

fn object_meta(seaweed: &Seaweed, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: seaweed.namespace(),
        labels: Some(master_labels(&seaweed.name_any())),
        ..Default::default()
    }
}

fn master_ports() -> Vec<ServicePort> {
    vec![
        ServicePort {
            name: Some("master-http".to_string()),
            port: MASTER_HTTP_PORT,
            target_port: Some(IntOrString::Int(MASTER_HTTP_PORT)),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        },
        ServicePort {
            name: Some("master-grpc".to_string()),
            port: MASTER_GRPC_PORT,
            target_port: Some(IntOrString::Int(MASTER_GRPC_PORT)),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        },
    ]
}

/// Build the headless Service used by masters to find each other.
///
/// Publishes not-ready addresses so peers resolve during raft bootstrap,
/// before any replica passes its readiness probe.
pub fn build_peer_service(seaweed: &Seaweed) -> Service {
    let name = seaweed.name_any();
    Service {
        metadata: object_meta(seaweed, peer_service_name(&name)),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            selector: Some(master_labels(&name)),
            ports: Some(master_ports()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the client-facing master Service
pub fn build_client_service(seaweed: &Seaweed) -> Service {
    let name = seaweed.name_any();
    let service = seaweed.spec.master_or_default().service.unwrap_or_default();

    let mut metadata = object_meta(seaweed, client_service_name(&name));
    if !service.annotations.is_empty() {
        metadata.annotations = Some(service.annotations);
    }

    Service {
        metadata,
        spec: Some(ServiceSpec {
            type_: Some(service.type_.unwrap_or_else(|| "ClusterIP".to_string())),
            selector: Some(master_labels(&name)),
            ports: Some(master_ports()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the ConfigMap holding `master.toml`
pub fn build_config_map(seaweed: &Seaweed) -> ConfigMap {
    let name = seaweed.name_any();
    let config = seaweed.spec.master_or_default().config.unwrap_or_default();

    ConfigMap {
        metadata: object_meta(seaweed, config_map_name(&name)),
        data: Some(BTreeMap::from([(MASTER_CONFIG_FILE.to_string(), config)])),
        ..Default::default()
    }
}

/// Arguments for `weed master`, tier flags appended in a fixed order
fn master_args(name: &str, namespace: &str, master: &MasterSpec) -> Vec<String> {
    let mut args = vec![
        "-logtostderr=true".to_string(),
        "master".to_string(),
        format!("-port={}", MASTER_HTTP_PORT),
        format!("-mdir={}", DATA_MOUNT_PATH),
        "-ip.bind=0.0.0.0".to_string(),
        format!("-ip=$(POD_NAME).{}.{}", peer_service_name(name), namespace),
        format!("-peers={}", master_peers(name, namespace, master.replicas)),
    ];
    if master.volume_preallocate == Some(true) {
        args.push("-volumePreallocate".to_string());
    }
    if let Some(limit) = master.volume_size_limit_mb {
        args.push(format!("-volumeSizeLimitMB={}", limit));
    }
    if let Some(ref threshold) = master.garbage_threshold {
        args.push(format!("-garbageThreshold={}", threshold));
    }
    if let Some(pulse) = master.pulse_seconds {
        args.push(format!("-pulseSeconds={}", pulse));
    }
    if let Some(ref replication) = master.default_replication {
        args.push(format!("-defaultReplication={}", replication));
    }
    args
}

fn field_env(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn to_quantities(values: &BTreeMap<String, String>) -> Option<BTreeMap<String, Quantity>> {
    if values.is_empty() {
        return None;
    }
    Some(
        values
            .iter()
            .map(|(k, v)| (k.clone(), Quantity(v.clone())))
            .collect(),
    )
}

fn resource_requirements(resources: &ComputeResources) -> ResourceRequirements {
    ResourceRequirements {
        requests: to_quantities(&resources.requests),
        limits: to_quantities(&resources.limits),
        ..Default::default()
    }
}

/// Build the master StatefulSet.
///
/// Pods get stable DNS names through the peer Service and read
/// `master.toml` from the ConfigMap mounted at `/etc/seaweedfs`.
pub fn build_statefulset(seaweed: &Seaweed) -> StatefulSet {
    let name = seaweed.name_any();
    let namespace = seaweed.namespace().unwrap_or_default();
    let master = seaweed.spec.master_or_default();
    let labels = master_labels(&name);

    let container = Container {
        name: MASTER_CONTAINER.to_string(),
        image: Some(seaweed.spec.image.clone()),
        image_pull_policy: master.image_pull_policy.clone(),
        command: Some(vec!["weed".to_string()]),
        args: Some(master_args(&name, &namespace, &master)),
        env: Some(vec![
            field_env("POD_IP", "status.podIP"),
            field_env("POD_NAME", "metadata.name"),
            field_env("NAMESPACE", "metadata.namespace"),
        ]),
        ports: Some(vec![
            ContainerPort {
                name: Some("master-http".to_string()),
                container_port: MASTER_HTTP_PORT,
                ..Default::default()
            },
            ContainerPort {
                name: Some("master-grpc".to_string()),
                container_port: MASTER_GRPC_PORT,
                ..Default::default()
            },
        ]),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some(READINESS_PATH.to_string()),
                port: IntOrString::Int(MASTER_HTTP_PORT),
                scheme: Some("HTTP".to_string()),
                ..Default::default()
            }),
            initial_delay_seconds: Some(10),
            period_seconds: Some(15),
            success_threshold: Some(2),
            failure_threshold: Some(100),
            timeout_seconds: Some(3),
            ..Default::default()
        }),
        resources: master.resources.as_ref().map(resource_requirements),
        volume_mounts: Some(vec![
            VolumeMount {
                name: CONFIG_VOLUME.to_string(),
                mount_path: CONFIG_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
            VolumeMount {
                name: DATA_VOLUME.to_string(),
                mount_path: DATA_MOUNT_PATH.to_string(),
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    let volumes = vec![
        Volume {
            name: CONFIG_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map_name(&name),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: DATA_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        },
    ];

    let pod_management_policy = if master.concurrent_start == Some(true) {
        "Parallel"
    } else {
        "OrderedReady"
    };

    StatefulSet {
        metadata: object_meta(seaweed, statefulset_name(&name)),
        spec: Some(StatefulSetSpec {
            service_name: peer_service_name(&name),
            replicas: Some(master.replicas),
            pod_management_policy: Some(pod_management_policy.to_string()),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: (!master.annotations.is_empty())
                        .then(|| master.annotations.clone()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(volumes),
                    node_selector: (!master.node_selector.is_empty())
                        .then(|| master.node_selector.clone()),
                    enable_service_links: Some(false),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Image of the master container in a StatefulSet, if it has one
pub fn statefulset_image(sts: &StatefulSet) -> Option<&str> {
    sts.spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| {
            p.containers
                .iter()
                .find(|c| c.name == MASTER_CONTAINER)
                .or_else(|| p.containers.first())
        })
        .and_then(|c| c.image.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use seaweed_common::crd::{MasterServiceSpec, SeaweedSpec};

    fn seaweed(replicas: i32) -> Seaweed {
        let mut sw = Seaweed::new(
            "cluster1",
            SeaweedSpec {
                image: "repo/master:1.0".to_string(),
                master: Some(MasterSpec {
                    replicas,
                    ..Default::default()
                }),
            },
        );
        sw.metadata.namespace = Some("ns".to_string());
        sw.metadata.uid = Some("uid-123".to_string());
        sw
    }

    fn pod_spec(sts: &StatefulSet) -> &PodSpec {
        sts.spec.as_ref().unwrap().template.spec.as_ref().unwrap()
    }

    #[test]
    fn names_use_role_suffixes() {
        assert_eq!(peer_service_name("c"), "c-master-peer");
        assert_eq!(client_service_name("c"), "c-master");
        assert_eq!(config_map_name("c"), "c-master-config");
        assert_eq!(statefulset_name("c"), "c-master");
    }

    #[test]
    fn peer_service_is_headless_and_publishes_not_ready() {
        let svc = build_peer_service(&seaweed(3));
        assert_eq!(svc.metadata.name.as_deref(), Some("cluster1-master-peer"));
        assert_eq!(svc.metadata.namespace.as_deref(), Some("ns"));
        let spec = svc.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(spec.publish_not_ready_addresses, Some(true));
        assert_eq!(spec.selector, Some(master_labels("cluster1")));
        let ports: Vec<i32> = spec.ports.unwrap().iter().map(|p| p.port).collect();
        assert_eq!(ports, vec![9333, 19333]);
    }

    #[test]
    fn client_service_defaults_to_cluster_ip() {
        let svc = build_client_service(&seaweed(1));
        assert_eq!(svc.metadata.name.as_deref(), Some("cluster1-master"));
        let spec = svc.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        assert!(spec.cluster_ip.is_none());
        assert_eq!(spec.selector, Some(master_labels("cluster1")));
    }

    #[test]
    fn client_service_honors_type_and_annotations() {
        let mut sw = seaweed(1);
        sw.spec.master.as_mut().unwrap().service = Some(MasterServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            annotations: BTreeMap::from([("lb/internal".to_string(), "true".to_string())]),
        });
        let svc = build_client_service(&sw);
        assert_eq!(svc.spec.unwrap().type_.as_deref(), Some("LoadBalancer"));
        assert_eq!(
            svc.metadata.annotations.unwrap().get("lb/internal").map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn config_map_carries_master_toml() {
        let mut sw = seaweed(1);
        sw.spec.master.as_mut().unwrap().config = Some("[master.maintenance]\n".to_string());
        let cm = build_config_map(&sw);
        assert_eq!(cm.metadata.name.as_deref(), Some("cluster1-master-config"));
        assert_eq!(
            cm.data.unwrap().get(MASTER_CONFIG_FILE).map(String::as_str),
            Some("[master.maintenance]\n")
        );

        let cm = build_config_map(&seaweed(1));
        assert_eq!(
            cm.data.unwrap().get(MASTER_CONFIG_FILE).map(String::as_str),
            Some("")
        );
    }

    #[test]
    fn statefulset_matches_desired_replicas_and_image() {
        let sts = build_statefulset(&seaweed(3));
        assert_eq!(sts.metadata.name.as_deref(), Some("cluster1-master"));
        let spec = sts.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.service_name, "cluster1-master-peer");
        assert_eq!(spec.pod_management_policy.as_deref(), Some("OrderedReady"));
        assert_eq!(spec.selector.match_labels, Some(master_labels("cluster1")));
        assert_eq!(statefulset_image(&sts), Some("repo/master:1.0"));
        assert_eq!(pod_spec(&sts).containers.len(), 1);
    }

    #[test]
    fn statefulset_mounts_the_config_map() {
        let sts = build_statefulset(&seaweed(1));
        let pod = pod_spec(&sts);
        let config_volume = pod
            .volumes
            .as_ref()
            .unwrap()
            .iter()
            .find(|v| v.config_map.is_some())
            .unwrap();
        assert_eq!(
            config_volume.config_map.as_ref().unwrap().name,
            "cluster1-master-config"
        );
        let mounts = pod.containers[0].volume_mounts.as_ref().unwrap();
        assert!(mounts
            .iter()
            .any(|m| m.name == config_volume.name && m.mount_path == CONFIG_MOUNT_PATH));
    }

    #[test]
    fn master_args_list_every_peer() {
        let sts = build_statefulset(&seaweed(3));
        let args = pod_spec(&sts).containers[0].args.clone().unwrap();
        assert!(args.contains(&"-ip=$(POD_NAME).cluster1-master-peer.ns".to_string()));
        assert!(args.contains(
            &"-peers=cluster1-master-0.cluster1-master-peer.ns:9333,\
              cluster1-master-1.cluster1-master-peer.ns:9333,\
              cluster1-master-2.cluster1-master-peer.ns:9333"
                .to_string()
        ));
    }

    #[test]
    fn optional_tier_flags_are_appended() {
        let mut sw = seaweed(1);
        {
            let master = sw.spec.master.as_mut().unwrap();
            master.volume_preallocate = Some(true);
            master.volume_size_limit_mb = Some(1000);
            master.garbage_threshold = Some("0.3".to_string());
            master.pulse_seconds = Some(5);
            master.default_replication = Some("001".to_string());
            master.concurrent_start = Some(true);
        }
        let sts = build_statefulset(&sw);
        let args = pod_spec(&sts).containers[0].args.clone().unwrap();
        for flag in [
            "-volumePreallocate",
            "-volumeSizeLimitMB=1000",
            "-garbageThreshold=0.3",
            "-pulseSeconds=5",
            "-defaultReplication=001",
        ] {
            assert!(args.contains(&flag.to_string()), "missing {}", flag);
        }
        assert_eq!(
            sts.spec.unwrap().pod_management_policy.as_deref(),
            Some("Parallel")
        );
    }

    #[test]
    fn resources_become_quantities() {
        let mut sw = seaweed(1);
        sw.spec.master.as_mut().unwrap().resources = Some(ComputeResources {
            requests: BTreeMap::from([("cpu".to_string(), "250m".to_string())]),
            limits: BTreeMap::new(),
        });
        let sts = build_statefulset(&sw);
        let resources = pod_spec(&sts).containers[0].resources.clone().unwrap();
        assert_eq!(
            resources.requests.unwrap().get("cpu"),
            Some(&Quantity("250m".to_string()))
        );
        assert!(resources.limits.is_none());
    }

    #[test]
    fn builders_are_deterministic() {
        let sw = seaweed(3);
        let a = serde_json::to_vec(&build_statefulset(&sw)).unwrap();
        let b = serde_json::to_vec(&build_statefulset(&sw.clone())).unwrap();
        assert_eq!(a, b);

        assert_eq!(build_peer_service(&sw), build_peer_service(&sw));
        assert_eq!(build_client_service(&sw), build_client_service(&sw));
        assert_eq!(
            serde_json::to_vec(&build_config_map(&sw)).unwrap(),
            serde_json::to_vec(&build_config_map(&sw)).unwrap()
        );
    }

    #[test]
    fn every_builder_stamps_the_label_scheme() {
        let sw = seaweed(1);
        let expected = Some(master_labels("cluster1"));
        assert_eq!(build_peer_service(&sw).metadata.labels, expected);
        assert_eq!(build_client_service(&sw).metadata.labels, expected);
        assert_eq!(build_config_map(&sw).metadata.labels, expected);
        assert_eq!(build_statefulset(&sw).metadata.labels, expected);
    }
}
