//! Add-on selection and declaration
//!
//! Configuration flags select a list of [`AddOn`] variants; each variant
//! declares its objects, chart releases and cloud resources into one
//! resource graph. Cross add-on edges (volumes need the storage driver,
//! routes need the ingress controller) point at the add-ons that are
//! always selected.

use crate::cluster::ManifestRef;
use crate::config::{AddonsConfig, ObservabilityProfile};
use crate::error::AddonError;
use crate::helm::HelmRelease;
use crate::manifests::{self, to_manifest, GRAFANA_ADMIN_PASSWORD_KEY, GRAFANA_ADMIN_SECRET, GRAFANA_ADMIN_USER_KEY};
use crate::resources::{
    AdminSecretResource, CredentialResource, LoadBalancerResource, ManifestReaper, ManifestResource,
    ReleaseReaper, ReleaseResource, SharedCluster, SharedHcloud, SharedHelm, KIND_CREDENTIAL,
    KIND_LOAD_BALANCER, KIND_MANIFEST, KIND_RELEASE,
};
use hcloud_client::{LoadBalancerService, LoadBalancerSpec, TargetBinding};
use resource_graph::{Graph, GraphBuilder, ResourceId};
use serde::Serialize;
use serde_json::json;
use std::fmt;

pub const INGRESS_LB_NAME: &str = "http-ingress";
pub const INGRESS_LB_TYPE: &str = "lb11";
pub const INGRESS_LB_LOCATION: &str = "fsn1";
pub const INGRESS_HTTP_NODE_PORT: u16 = 30080;
pub const INGRESS_HTTPS_NODE_PORT: u16 = 30443;
pub const MONITORING_NAMESPACE: &str = "monitoring";

const HCLOUD_CSI: &str = "hcloud-csi";
const CONTOUR: &str = "contour";
const CERT_MANAGER: &str = "cert-manager";
const CLOUDNATIVE_PG: &str = "cloudnative-pg";
const KUBE_PROMETHEUS_STACK: &str = "kube-prometheus-stack";
const LOKI: &str = "loki";

/// One optional or fixed part of the cluster's add-on set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOn {
    /// Cloud volume driver and the token secret it reads
    CloudStorage,
    /// Edge proxy exposed on fixed node ports
    IngressController,
    /// Cloud load balancer forwarding 80/443 to the workers' node ports
    IngressLoadBalancer,
    /// Certificate controller and a public ACME issuer
    CertificateIssuer { email: Option<String> },
    /// Relational database operator
    DatabaseOperator,
    /// Metrics, dashboards and logs
    Observability(ObservabilityProfile),
    /// Smoke-test workloads: a volume, a stateful pod and a routed service
    TestWorkloads { ingress_host: Option<String> },
}

impl fmt::Display for AddOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddOn::CloudStorage => f.write_str("cloud-storage"),
            AddOn::IngressController => f.write_str("ingress-controller"),
            AddOn::IngressLoadBalancer => f.write_str("ingress-load-balancer"),
            AddOn::CertificateIssuer { .. } => f.write_str("certificate-issuer"),
            AddOn::DatabaseOperator => f.write_str("database-operator"),
            AddOn::Observability(profile) => write!(f, "observability ({})", profile),
            AddOn::TestWorkloads { .. } => f.write_str("test-workloads"),
        }
    }
}

/// The add-ons selected by the configuration flags
pub fn plan(config: &AddonsConfig) -> Vec<AddOn> {
    let mut addons = vec![AddOn::CloudStorage, AddOn::IngressController, AddOn::IngressLoadBalancer];
    if config.enable_cert_manager {
        addons.push(AddOn::CertificateIssuer {
            email: config.acme_email.clone(),
        });
    }
    if config.enable_database_operator {
        addons.push(AddOn::DatabaseOperator);
    }
    if config.enable_observability {
        addons.push(AddOn::Observability(config.observability_profile));
    }
    if config.enable_test_workloads {
        addons.push(AddOn::TestWorkloads {
            ingress_host: config.ingress_host.clone(),
        });
    }
    addons
}

/// Clients and published values the add-ons are declared with
#[derive(Clone)]
pub struct AddonContext {
    pub cluster: SharedCluster,
    pub helm: SharedHelm,
    pub hcloud: SharedHcloud,
    pub hcloud_token: String,
}

pub fn release_id(name: &str) -> ResourceId {
    ResourceId::new(KIND_RELEASE, name)
}

pub fn ingress_load_balancer_id() -> ResourceId {
    ResourceId::new(KIND_LOAD_BALANCER, INGRESS_LB_NAME)
}

pub fn ingress_load_balancer_spec() -> LoadBalancerSpec {
    LoadBalancerSpec {
        name: INGRESS_LB_NAME.to_string(),
        load_balancer_type: INGRESS_LB_TYPE.to_string(),
        location: INGRESS_LB_LOCATION.to_string(),
        labels: Default::default(),
        services: vec![
            LoadBalancerService::tcp(443, INGRESS_HTTPS_NODE_PORT),
            LoadBalancerService::tcp(80, INGRESS_HTTP_NODE_PORT),
        ],
        targets: vec![TargetBinding::role("worker")],
    }
}

struct Declarer<'a> {
    builder: GraphBuilder,
    ctx: &'a AddonContext,
}

impl Declarer<'_> {
    fn manifest<K: Serialize>(&mut self, object: &K, depends_on: &[ResourceId]) -> Result<ResourceId, AddonError> {
        let manifest = to_manifest(object)?;
        let id = ResourceId::new(KIND_MANIFEST, &ManifestRef::from_manifest(&manifest)?.to_string());
        self.builder.add(
            id.clone(),
            ManifestResource::new(self.ctx.cluster.clone(), manifest),
            depends_on,
        )?;
        Ok(id)
    }

    fn release(&mut self, release: HelmRelease, depends_on: &[ResourceId]) -> Result<ResourceId, AddonError> {
        let id = release_id(&release.name);
        self.builder
            .add(id.clone(), ReleaseResource::new(self.ctx.helm.clone(), release), depends_on)?;
        Ok(id)
    }

    fn declare(&mut self, addon: &AddOn) -> Result<(), AddonError> {
        match addon {
            AddOn::CloudStorage => {
                let secret = self.manifest(&manifests::hcloud_token_secret(&self.ctx.hcloud_token), &[])?;
                self.release(
                    HelmRelease::new(HCLOUD_CSI, HCLOUD_CSI, "https://charts.hetzner.cloud", "kube-system"),
                    &[secret],
                )?;
            }
            AddOn::IngressController => {
                self.release(
                    HelmRelease::new(CONTOUR, CONTOUR, "https://charts.bitnami.com/bitnami", "projectcontour")
                        .create_namespace()
                        .values(json!({
                            "envoy": {
                                "service": {
                                    "type": "NodePort",
                                    "nodePorts": {
                                        "http": INGRESS_HTTP_NODE_PORT,
                                        "https": INGRESS_HTTPS_NODE_PORT,
                                    }
                                }
                            }
                        })),
                    &[],
                )?;
            }
            AddOn::IngressLoadBalancer => {
                self.builder.add(
                    ingress_load_balancer_id(),
                    LoadBalancerResource::new(self.ctx.hcloud.clone(), ingress_load_balancer_spec()),
                    &[],
                )?;
            }
            AddOn::CertificateIssuer { email } => {
                let cert_manager = self.release(
                    HelmRelease::new(CERT_MANAGER, CERT_MANAGER, "https://charts.jetstack.io", CERT_MANAGER)
                        .create_namespace()
                        .values(json!({"crds": {"enabled": true}})),
                    &[],
                )?;
                self.manifest(
                    &manifests::letsencrypt_issuer(email.clone()),
                    &[cert_manager, release_id(CONTOUR)],
                )?;
            }
            AddOn::DatabaseOperator => {
                self.release(
                    HelmRelease::new(
                        CLOUDNATIVE_PG,
                        CLOUDNATIVE_PG,
                        "https://cloudnative-pg.github.io/charts",
                        "cnpg-system",
                    )
                    .create_namespace(),
                    &[],
                )?;
            }
            AddOn::Observability(profile) => self.declare_observability(*profile)?,
            AddOn::TestWorkloads { ingress_host } => {
                let namespace = self.manifest(&manifests::namespace(manifests::TEST_NAMESPACE), &[])?;
                let claim = self.manifest(
                    &manifests::test_volume_claim(),
                    &[namespace.clone(), release_id(HCLOUD_CSI)],
                )?;
                self.manifest(&manifests::stateful_test(), &[claim])?;
                self.manifest(&manifests::whoami(), &[namespace.clone()])?;
                let service = self.manifest(&manifests::whoami_service(), &[namespace])?;
                self.manifest(
                    &manifests::whoami_ingress(ingress_host.as_deref()),
                    &[service, release_id(CONTOUR)],
                )?;
            }
        }
        Ok(())
    }

    fn declare_observability(&mut self, profile: ObservabilityProfile) -> Result<(), AddonError> {
        let namespace = self.manifest(&manifests::namespace(MONITORING_NAMESPACE), &[])?;

        let mut values = json!({
            "grafana": {
                "additionalDataSources": [{
                    "name": "Loki",
                    "type": "loki",
                    "url": format!("http://{}.{}:3100", LOKI, MONITORING_NAMESPACE),
                }]
            }
        });
        let mut depends_on = vec![namespace.clone()];

        if profile == ObservabilityProfile::GeneratedCredential {
            // One credential; the chart only references the secret holding it
            let credential = ResourceId::new(KIND_CREDENTIAL, GRAFANA_ADMIN_SECRET);
            self.builder
                .add(credential.clone(), CredentialResource::new("admin"), &[])?;

            let secret = ResourceId::new(
                KIND_MANIFEST,
                &format!("Secret/{}/{}", MONITORING_NAMESPACE, GRAFANA_ADMIN_SECRET),
            );
            self.builder.add(
                secret.clone(),
                AdminSecretResource::new(self.ctx.cluster.clone(), credential.clone(), MONITORING_NAMESPACE),
                &[credential, namespace.clone()],
            )?;

            values["grafana"]["admin"] = json!({
                "existingSecret": GRAFANA_ADMIN_SECRET,
                "userKey": GRAFANA_ADMIN_USER_KEY,
                "passwordKey": GRAFANA_ADMIN_PASSWORD_KEY,
            });
            depends_on.push(secret);
        }

        self.release(
            HelmRelease::new(
                KUBE_PROMETHEUS_STACK,
                KUBE_PROMETHEUS_STACK,
                "https://prometheus-community.github.io/helm-charts",
                MONITORING_NAMESPACE,
            )
            .values(values),
            &depends_on,
        )?;

        self.release(
            HelmRelease::new(LOKI, LOKI, "https://grafana.github.io/helm-charts", MONITORING_NAMESPACE).values(
                json!({
                    "deploymentMode": "SingleBinary",
                    "loki": {
                        "auth_enabled": false,
                        "commonConfig": {"replication_factor": 1},
                        "storage": {"type": "filesystem"},
                        "schemaConfig": {
                            "configs": [{
                                "from": "2024-04-01",
                                "store": "tsdb",
                                "object_store": "filesystem",
                                "schema": "v13",
                                "index": {"prefix": "index_", "period": "24h"},
                            }]
                        },
                    },
                    "singleBinary": {"replicas": 1},
                    "read": {"replicas": 0},
                    "write": {"replicas": 0},
                    "backend": {"replicas": 0},
                }),
            ),
            &[namespace, release_id(HCLOUD_CSI)],
        )?;
        Ok(())
    }
}

/// Declare every selected add-on into one graph
pub fn build(addons: &[AddOn], ctx: &AddonContext) -> Result<Graph, AddonError> {
    let mut declarer = Declarer {
        builder: Graph::builder(),
        ctx,
    };
    for addon in addons {
        declarer.declare(addon)?;
    }

    let mut builder = declarer.builder;
    builder
        .reaper(KIND_MANIFEST, ManifestReaper::new(ctx.cluster.clone()))
        .reaper(KIND_RELEASE, ReleaseReaper::new(ctx.helm.clone()));
    Ok(builder.build()?)
}

#[cfg(test)]
#[path = "addons_test.rs"]
mod addons_test;
