//! Cluster store tests

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use clusternet_core::{ConflictError, NetworkError};
use clusternet_shared_types::{
    ConfigMap, EntityRef, NetworkStatus, WarningStatus, WarningType, VOLATILE_LAST_STATE_CREATED,
};

use crate::file::FileClusterStore;
use crate::memory::MemoryClusterStore;
use crate::settings::Settings;
use crate::store::{ClusterStore, NicDevice, StoreError};
use crate::warnings::{ClusterWarnings, WarningSink};

fn config(pairs: &[(&str, &str)]) -> ConfigMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn declare(store: &dyn ClusterStore, name: &str, parent: &str) -> i64 {
    let cfg = config(&[("parent", parent)]);
    store
        .query(|tx| tx.create_pending_network("default", name, "physical", "", &cfg))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_pending_network_has_node_entries() {
    let store: Arc<dyn ClusterStore> = Arc::new(MemoryClusterStore::with_members(["node1", "node2"]));
    let id = declare(store.as_ref(), "physical0", "eth0").await;

    let record = store.query(|tx| tx.get_network_by_id(id)).await.unwrap();
    assert_eq!(record.status, NetworkStatus::Pending);
    assert_eq!(record.nodes.len(), 2);
    assert_eq!(record.local_status("node1"), NetworkStatus::Pending);

    let dup = store
        .query(|tx| tx.create_pending_network("default", "physical0", "physical", "", &ConfigMap::new()))
        .await
        .unwrap_err();
    assert!(matches!(dup, StoreError::AlreadyExists { .. }));
    assert!(matches!(
        NetworkError::from(dup),
        NetworkError::Conflict(ConflictError::AlreadyExists { .. })
    ));
}

#[tokio::test]
async fn test_node_local_keys_are_per_member() {
    let store: Arc<dyn ClusterStore> = Arc::new(MemoryClusterStore::with_members(["node1", "node2"]));
    let id = declare(store.as_ref(), "physical0", "eth0").await;

    let cfg = config(&[
        ("parent", "eth0"),
        ("mtu", "9000"),
        (VOLATILE_LAST_STATE_CREATED, "true"),
    ]);
    store
        .query(|tx| tx.update_network(id, "node1", "uplink", &cfg))
        .await
        .unwrap();

    let record = store.query(|tx| tx.get_network_by_id(id)).await.unwrap();
    assert_eq!(record.description, "uplink");
    assert!(!record.config.contains_key(VOLATILE_LAST_STATE_CREATED));
    assert_eq!(
        record.config_for("node1").get(VOLATILE_LAST_STATE_CREATED).map(String::as_str),
        Some("true")
    );
    assert!(!record.config_for("node2").contains_key(VOLATILE_LAST_STATE_CREATED));
    assert_eq!(record.config_for("node2").get("mtu").map(String::as_str), Some("9000"));

    store
        .query(|tx| tx.update_node_config(id, "node1", &ConfigMap::new()))
        .await
        .unwrap();
    let record = store.query(|tx| tx.get_network_by_id(id)).await.unwrap();
    assert!(!record.config_for("node1").contains_key(VOLATILE_LAST_STATE_CREATED));
    assert_eq!(record.config.get("mtu").map(String::as_str), Some("9000"));
}

#[tokio::test]
async fn test_scan_counter_and_failed_transaction_discards() {
    let store = Arc::new(MemoryClusterStore::with_members(["node1"]));
    let dyn_store: Arc<dyn ClusterStore> = store.clone();
    declare(dyn_store.as_ref(), "physical0", "eth0").await;
    assert_eq!(dyn_store.scan_count(), 0);

    let result = dyn_store
        .transaction(Box::new(|tx| {
            let networks = tx.get_created_networks_by_project();
            assert_eq!(networks["default"].len(), 1);
            tx.create_pending_network("default", "physical1", "physical", "", &ConfigMap::new())?;
            Err(StoreError::Internal("abort".into()))
        }))
        .await;
    assert!(result.is_err());
    assert_eq!(dyn_store.scan_count(), 1);
    assert_eq!(store.snapshot().networks.len(), 1);

    store.set_fail_writes(true);
    let err = dyn_store
        .query(|tx| tx.create_pending_network("default", "physical1", "physical", "", &ConfigMap::new()))
        .await
        .unwrap_err();
    assert!(matches!(NetworkError::from(err), NetworkError::Persistence(_)));

    // Read-only transactions still succeed.
    assert_eq!(dyn_store.query(|tx| Ok(tx.get_networks(None).len())).await.unwrap(), 1);
}

#[tokio::test]
async fn test_conflict_in_transaction_discards_write() {
    let store = Arc::new(MemoryClusterStore::with_members(["node1"]));
    let dyn_store: Arc<dyn ClusterStore> = store.clone();
    let id = declare(dyn_store.as_ref(), "physical0", "eth0").await;

    let moved = config(&[("parent", "eth1")]);
    let err = dyn_store
        .query(|tx| {
            tx.update_network(id, "node1", "", &moved)?;
            Err::<(), _>(
                ConflictError::ParentInUse {
                    parent: "eth1".into(),
                }
                .into(),
            )
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
    assert_eq!(err.to_string(), "Parent interface \"eth1\" in use by another network");
    assert!(matches!(
        err.into_network_error("Updating network"),
        NetworkError::Conflict(ConflictError::ParentInUse { .. })
    ));
    assert_eq!(
        store.snapshot().networks[&id].config.get("parent").map(String::as_str),
        Some("eth0")
    );
}

#[tokio::test]
async fn test_created_transitions_and_rename() {
    let store: Arc<dyn ClusterStore> = Arc::new(MemoryClusterStore::with_members(["node1"]));
    let id = declare(store.as_ref(), "physical0", "eth0").await;
    declare(store.as_ref(), "physical1", "eth1").await;

    store
        .query(|tx| {
            tx.network_node_created(id, "node1")?;
            tx.network_created(id)
        })
        .await
        .unwrap();
    let record = store.query(|tx| tx.get_network_by_id(id)).await.unwrap();
    assert!(record.all_nodes_created());
    assert_eq!(record.status, NetworkStatus::Created);

    let err = store.query(|tx| tx.rename_network(id, "physical1")).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));
    store.query(|tx| tx.rename_network(id, "uplink")).await.unwrap();
    assert!(store.query(|tx| tx.get_network("default", "uplink")).await.is_ok());

    store.query(|tx| tx.delete_network(id)).await.unwrap();
    let err = store.query(|tx| tx.get_network_by_id(id)).await.unwrap_err();
    assert!(NetworkError::from(err).is_not_found());
}

#[tokio::test]
async fn test_nic_devices() {
    let store: Arc<dyn ClusterStore> = Arc::new(MemoryClusterStore::with_members(["node1"]));
    let nic = NicDevice {
        project: "default".into(),
        instance: "c1".into(),
        device: "eth0".into(),
        network: "br0".into(),
    };
    let copy = nic.clone();
    store.query(move |tx| tx.add_nic_device(copy)).await.unwrap();

    let users = store
        .query(|tx| Ok(tx.nic_devices_using("default", "br0")))
        .await
        .unwrap();
    assert_eq!(users, vec![nic]);

    store
        .query(|tx| tx.remove_nic_device("default", "c1", "eth0"))
        .await
        .unwrap();
    assert!(store
        .query(|tx| tx.remove_nic_device("default", "c1", "eth0"))
        .await
        .is_err());
}

#[tokio::test]
async fn test_warnings_upsert_and_resolve() {
    let store: Arc<dyn ClusterStore> = Arc::new(MemoryClusterStore::with_members(["node1"]));
    let sink = ClusterWarnings::new(store.clone());
    let entity = EntityRef::network(7);

    for message in ["first failure", "second failure"] {
        sink.upsert_local_warning("node1", "default", entity, WarningType::NetworkStartupFailure, message)
            .await
            .unwrap();
    }

    let warnings = store.query(|tx| Ok(tx.warnings().to_vec())).await.unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].count, 2);
    assert_eq!(warnings[0].last_message, "second failure");

    sink.resolve_local_warnings("node1", "default", WarningType::NetworkStartupFailure, entity)
        .await
        .unwrap();
    let warnings = store.query(|tx| Ok(tx.warnings().to_vec())).await.unwrap();
    assert_eq!(warnings[0].status, WarningStatus::Resolved);
}

#[tokio::test]
async fn test_file_store_persists_between_instances() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state").join("cluster.json");

    let store: Arc<dyn ClusterStore> = Arc::new(FileClusterStore::new(&path));
    store
        .query(|tx| {
            tx.join_member("node1");
            Ok(())
        })
        .await
        .unwrap();
    let id = declare(store.as_ref(), "physical0", "eth0").await;
    assert!(path.exists());
    assert!(!dir.path().join("state").join("cluster.json.lock").exists());

    let reopened: Arc<dyn ClusterStore> = Arc::new(FileClusterStore::new(&path));
    let record = reopened.query(|tx| tx.get_network_by_id(id)).await.unwrap();
    assert_eq!(record.name, "physical0");
    assert_eq!(record.nodes.len(), 1);
}

#[tokio::test]
async fn test_file_store_lock_timeout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cluster.json");
    let lock_path = dir.path().join("cluster.json.lock");

    // Held by a live writer that has not finished writing its lock info.
    std::fs::write(&lock_path, b"").unwrap();

    let store: Arc<dyn ClusterStore> =
        Arc::new(FileClusterStore::new(&path).with_lock_timeout(Duration::from_millis(250)));
    let err = store.query(|tx| Ok(tx.members().len())).await.unwrap_err();
    assert!(matches!(err, StoreError::Lock(_)));
    assert!(NetworkError::from(err).to_string().contains("Persistence"));

    std::fs::remove_file(&lock_path).unwrap();
    assert_eq!(store.query(|tx| Ok(tx.members().len())).await.unwrap(), 0);
}

#[tokio::test]
async fn test_file_store_serialises_concurrent_writers() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn ClusterStore> = Arc::new(FileClusterStore::new(dir.path().join("cluster.json")));

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let name = format!("net{}", i);
            store
                .query(move |tx| tx.create_pending_network("default", &name, "bridge", "", &ConfigMap::new()))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let networks = store.query(|tx| Ok(tx.get_networks(Some("default")))).await.unwrap();
    assert_eq!(networks.len(), 8);
}

#[test]
fn test_settings_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clusternet.toml");
    std::fs::write(
        &path,
        "node_name = \"node1\"\nmembers = [\"node2\", \"node1\"]\nstate_path = \"/tmp/cluster.json\"\n",
    )
    .unwrap();

    let settings = Settings::load(Some(&path)).unwrap();
    assert_eq!(settings.node_name, "node1");
    assert_eq!(settings.cluster_members(), vec!["node1", "node2"]);
    assert_eq!(settings.state_path.to_str(), Some("/tmp/cluster.json"));
    assert_eq!(settings.command_timeout(), Duration::from_secs(10));
    assert_eq!(settings.ip_binary.to_str(), Some("/sbin/ip"));
}

#[test]
fn test_settings_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(Settings::load(Some(&dir.path().join("missing.toml"))).is_err());
}
