//! Integration tests for the Hetzner Cloud client
//!
//! These tests require a real Hetzner Cloud project.
//! Set HCLOUD_TOKEN to run. They only read state.

use hcloud_client::{HcloudClient, HcloudClientTrait, LabelSelector};

fn client() -> HcloudClient {
    let token = std::env::var("HCLOUD_TOKEN")
        .expect("HCLOUD_TOKEN environment variable must be set");
    HcloudClient::with_token(token).expect("Failed to create client")
}

#[tokio::test]
#[ignore] // Requires a Hetzner Cloud project
async fn test_validate_token() {
    client().validate_token().await.expect("Token should be valid");
}

#[tokio::test]
#[ignore]
async fn test_list_servers_by_label() {
    let selector = LabelSelector::parse("type=controlplane").expect("valid selector");
    let servers = client()
        .list_servers(Some(&selector))
        .await
        .expect("Failed to list servers");

    for server in &servers {
        assert_eq!(server.labels.get("type").map(String::as_str), Some("controlplane"));
    }
    println!("Found {} control plane servers", servers.len());
}

#[tokio::test]
#[ignore]
async fn test_missing_load_balancer_is_none() {
    let found = client()
        .get_load_balancer_by_name("does-not-exist-7f3a")
        .await
        .expect("Lookup should succeed");
    assert!(found.is_none());
}
