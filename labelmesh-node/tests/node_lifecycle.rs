//! End-to-end tests against a real [`Node`] (real UDP/TCP sockets, real
//! actor task) rather than the in-process `NodeState` unit tests in
//! `src/node.rs`. Kept deliberately self-contained — no scenario here
//! depends on UDP broadcast actually reaching a second node, since that
//! needs a routable broadcast interface this sandbox may not have.

use std::time::Duration;

use labelmesh_node::{ClientConfig, Node, NodeConfig};

fn client_config(name: &str) -> NodeConfig {
    NodeConfig {
        port: 0,
        dport: 0,
        ttl: 5.0,
        tpf: 5.0,
        client: Some(ClientConfig { name: name.to_string(), ttp: 1.0, labels: vec![], key_path: None }),
        debug_port: None,
    }
}

fn relay_config() -> NodeConfig {
    NodeConfig { port: 0, dport: 0, ttl: 5.0, tpf: 5.0, client: None, debug_port: None }
}

#[tokio::test]
async fn set_then_get_round_trips_on_a_single_node() {
    let node = Node::start(client_config("alice")).await.unwrap();

    node.handle.set("weather", Some("sunny"), None).await.unwrap();
    let value = tokio::time::timeout(Duration::from_secs(2), node.handle.get("weather", 5.0, 5.0, 1.0, None))
        .await
        .expect("get should not hang waiting on its own just-written value")
        .unwrap();
    assert_eq!(value, "sunny");

    node.shutdown().await;
}

#[tokio::test]
async fn status_reports_client_identity_and_table_sizes() {
    let node = Node::start(client_config("alice")).await.unwrap();
    let status = node.handle.status().await.unwrap();
    assert!(status.is_main); // port == dport (both 0)
    assert_eq!(status.peer_count, 0);
    assert_eq!(status.group_count, 0);
    node.shutdown().await;
}

#[tokio::test]
async fn relay_node_without_client_identity_rejects_get_and_set_and_join() {
    let node = Node::start(relay_config()).await.unwrap();
    let (_priv_key, pub_key) = labelmesh_crypto::generate_keypair().unwrap();

    assert!(node.handle.set("weather", Some("sunny"), None).await.is_err());
    assert!(node.handle.join("friends", "bob", pub_key, vec![], 5.0, 5.0, 1.0).await.is_err());

    node.shutdown().await;
}

#[tokio::test]
async fn shutdown_is_clean_and_idempotent_with_no_client() {
    let node = Node::start(relay_config()).await.unwrap();
    node.shutdown().await;
}
