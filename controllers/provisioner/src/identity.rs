//! Cluster identity
//!
//! Generates the secrets bundle every machine configuration is rendered
//! from: the OS, Kubernetes, aggregator and etcd certificate authorities,
//! the service-account signing key, join tokens, the secretbox encryption
//! secret and the admin client certificate used to talk to the management
//! plane. The bundle is generated once and kept in graph state.

use crate::error::ProvisionerError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{Datelike, Duration, Utc};
use rand::Rng;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue, ExtendedKeyUsagePurpose, IsCa, Issuer,
    KeyPair, KeyUsagePurpose, PKCS_ED25519,
};
use serde::{Deserialize, Serialize};
use talos_client::ClientConfiguration;

/// Validity of the generated authorities
const CA_VALIDITY_DAYS: i64 = 3650;

/// Validity of the admin client certificate
const CLIENT_VALIDITY_DAYS: i64 = 365;

const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Certificate and key, each a base64-encoded PEM document
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificatePair {
    pub crt: String,
    pub key: String,
}

impl std::fmt::Debug for CertificatePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificatePair")
            .field("crt", &self.crt)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Everything secret a cluster is built from
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSecrets {
    pub cluster_id: String,
    pub cluster_secret: String,
    pub bootstrap_token: String,
    pub trustd_token: String,
    pub secretbox_encryption_secret: String,
    pub os_ca: CertificatePair,
    pub kubernetes_ca: CertificatePair,
    pub aggregator_ca: CertificatePair,
    pub etcd_ca: CertificatePair,
    /// base64-encoded PEM of the service-account signing key
    pub service_account_key: String,
    /// Admin credentials for the management plane
    pub client: ClientConfiguration,
}

impl std::fmt::Debug for ClusterSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterSecrets")
            .field("cluster_id", &self.cluster_id)
            .field("os_ca", &self.os_ca)
            .field("kubernetes_ca", &self.kubernetes_ca)
            .finish_non_exhaustive()
    }
}

/// A freshly generated authority, kept together with its signing key
struct Authority {
    pair: CertificatePair,
    pem: String,
    issuer: Issuer<'static, KeyPair>,
}

impl ClusterSecrets {
    /// Generate a new, independent identity for `cluster_name`
    pub fn generate(cluster_name: &str) -> Result<Self, ProvisionerError> {
        let os = authority("talos", KeyPair::generate_for(&PKCS_ED25519)?)?;
        let kubernetes = authority("kubernetes", KeyPair::generate()?)?;
        let aggregator = authority("front-proxy", KeyPair::generate()?)?;
        let etcd = authority("etcd", KeyPair::generate()?)?;

        let client = admin_client(&os)?;
        let service_account_key = encode(&KeyPair::generate()?.serialize_pem());

        tracing::info!("Generated cluster identity for {}", cluster_name);

        Ok(Self {
            cluster_id: random_base64(32),
            cluster_secret: random_base64(32),
            bootstrap_token: join_token(),
            trustd_token: join_token(),
            secretbox_encryption_secret: random_base64(32),
            os_ca: os.pair,
            kubernetes_ca: kubernetes.pair,
            aggregator_ca: aggregator.pair,
            etcd_ca: etcd.pair,
            service_account_key,
            client,
        })
    }

    /// Management-plane credentials
    pub fn client_configuration(&self) -> &ClientConfiguration {
        &self.client
    }
}

fn authority(common_name: &str, key: KeyPair) -> Result<Authority, ProvisionerError> {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, DnValue::Utf8String(common_name.to_string()));
    params.distinguished_name = dn;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    validity(&mut params, CA_VALIDITY_DAYS);

    let cert = params.self_signed(&key)?;
    let pem = cert.pem();
    let pair = CertificatePair {
        crt: encode(&pem),
        key: encode(&key.serialize_pem()),
    };
    Ok(Authority {
        pair,
        pem,
        issuer: Issuer::new(params, key),
    })
}

fn admin_client(os: &Authority) -> Result<ClientConfiguration, ProvisionerError> {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, DnValue::Utf8String("admin".to_string()));
    dn.push(DnType::OrganizationName, DnValue::Utf8String("os:admin".to_string()));
    params.distinguished_name = dn;
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    validity(&mut params, CLIENT_VALIDITY_DAYS);

    let key = KeyPair::generate_for(&PKCS_ED25519)?;
    let cert = params.signed_by(&key, &os.issuer)?;
    Ok(ClientConfiguration::from_pem(&os.pem, &cert.pem(), &key.serialize_pem()))
}

fn validity(params: &mut CertificateParams, days: i64) {
    let now = Utc::now();
    let until = now + Duration::days(days);
    params.not_before = rcgen::date_time_ymd(now.year(), now.month() as u8, now.day() as u8);
    params.not_after = rcgen::date_time_ymd(until.year(), until.month() as u8, until.day() as u8);
}

fn encode(pem: &str) -> String {
    STANDARD.encode(pem)
}

fn random_base64(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();
    STANDARD.encode(bytes)
}

fn random_token_part(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// `[a-z0-9]{6}.[a-z0-9]{16}`
fn join_token() -> String {
    format!("{}.{}", random_token_part(6), random_token_part(16))
}
