//! Kubernetes objects declared by the add-ons
//!
//! Objects are built from k8s-openapi types and serialized to JSON, which is
//! both the server-side apply body and the recorded resource input.

use crds::{ClusterIssuer, ClusterIssuerSpec, LETSENCRYPT_PRODUCTION};
use k8s_openapi::api::apps::v1::{ReplicaSet, ReplicaSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, Namespace, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Secret, Service, ServicePort, ServiceSpec,
    Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend,
    IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const TEST_NAMESPACE: &str = "test";
pub const WHOAMI: &str = "whoami-test";
pub const STATEFUL_TEST: &str = "stateful-test";
pub const CLUSTER_ISSUER: &str = "letsencrypt-prod";
pub const INGRESS_CLASS: &str = "contour";
pub const GRAFANA_ADMIN_SECRET: &str = "grafana-admin";
pub const GRAFANA_ADMIN_USER_KEY: &str = "admin-user";
pub const GRAFANA_ADMIN_PASSWORD_KEY: &str = "admin-password";

/// JSON body of a typed object
pub fn to_manifest<K: Serialize>(object: &K) -> Result<Value, serde_json::Error> {
    serde_json::to_value(object)
}

fn meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        ..Default::default()
    }
}

fn app_labels(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), app.to_string())])
}

pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: meta(name, None),
        ..Default::default()
    }
}

fn opaque_secret(name: &str, namespace: &str, data: BTreeMap<String, String>) -> Secret {
    Secret {
        metadata: meta(name, Some(namespace)),
        type_: Some("Opaque".to_string()),
        string_data: Some(data),
        ..Default::default()
    }
}

/// Cloud token for the storage driver, `kube-system/hcloud`
pub fn hcloud_token_secret(token: &str) -> Secret {
    opaque_secret(
        "hcloud",
        "kube-system",
        BTreeMap::from([("token".to_string(), token.to_string())]),
    )
}

/// Dashboards administrator credential referenced by the monitoring chart
pub fn grafana_admin_secret(namespace: &str, username: &str, password: &str) -> Secret {
    opaque_secret(
        GRAFANA_ADMIN_SECRET,
        namespace,
        BTreeMap::from([
            (GRAFANA_ADMIN_USER_KEY.to_string(), username.to_string()),
            (GRAFANA_ADMIN_PASSWORD_KEY.to_string(), password.to_string()),
        ]),
    )
}

pub fn letsencrypt_issuer(email: Option<String>) -> ClusterIssuer {
    ClusterIssuer::new(
        CLUSTER_ISSUER,
        ClusterIssuerSpec::acme_http01(LETSENCRYPT_PRODUCTION, email, CLUSTER_ISSUER, INGRESS_CLASS),
    )
}

/// Volume claim backed by the cloud storage driver's default class
pub fn test_volume_claim() -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: meta(TEST_NAMESPACE, Some(TEST_NAMESPACE)),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([("storage".to_string(), Quantity("15Gi".to_string()))])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn replica_set(name: &str, replicas: i32, pod: PodSpec) -> ReplicaSet {
    ReplicaSet {
        metadata: meta(name, Some(TEST_NAMESPACE)),
        spec: Some(ReplicaSetSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(app_labels(name)),
                ..Default::default()
            },
            template: Some(PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels(name)),
                    ..Default::default()
                }),
                spec: Some(pod),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Single pod keeping the test volume mounted
pub fn stateful_test() -> ReplicaSet {
    replica_set(
        STATEFUL_TEST,
        1,
        PodSpec {
            containers: vec![Container {
                name: STATEFUL_TEST.to_string(),
                image: Some("alpine:latest".to_string()),
                command: Some(vec!["tail".to_string(), "-f".to_string(), "/dev/null".to_string()]),
                volume_mounts: Some(vec![VolumeMount {
                    name: "data".to_string(),
                    mount_path: "/data".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            volumes: Some(vec![Volume {
                name: "data".to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: TEST_NAMESPACE.to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        },
    )
}

pub fn whoami() -> ReplicaSet {
    replica_set(
        WHOAMI,
        5,
        PodSpec {
            containers: vec![Container {
                name: WHOAMI.to_string(),
                image: Some("traefik/whoami".to_string()),
                ports: Some(vec![ContainerPort {
                    name: Some("http".to_string()),
                    container_port: 80,
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            ..Default::default()
        },
    )
}

pub fn whoami_service() -> Service {
    Service {
        metadata: meta(WHOAMI, Some(TEST_NAMESPACE)),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(app_labels(WHOAMI)),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: 80,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Route to the whoami service; TLS and the SSL redirect only apply with a host
pub fn whoami_ingress(host: Option<&str>) -> Ingress {
    let annotations = BTreeMap::from([
        ("cert-manager.io/cluster-issuer".to_string(), CLUSTER_ISSUER.to_string()),
        (
            "ingress.kubernetes.io/force-ssl-redirect".to_string(),
            host.is_some().to_string(),
        ),
        ("kubernetes.io/ingress.class".to_string(), INGRESS_CLASS.to_string()),
        ("kubernetes.io/tls-acme".to_string(), "true".to_string()),
    ]);

    let tls = host.map(|host| {
        vec![IngressTLS {
            hosts: Some(vec![host.to_string()]),
            secret_name: Some(format!("{}-tls", WHOAMI)),
        }]
    });

    Ingress {
        metadata: ObjectMeta {
            annotations: Some(annotations),
            ..meta(WHOAMI, Some(TEST_NAMESPACE))
        },
        spec: Some(IngressSpec {
            tls,
            rules: Some(vec![IngressRule {
                host: host.map(str::to_string),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: WHOAMI.to_string(),
                                port: Some(ServiceBackendPort {
                                    number: Some(80),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
