//! CLI command tests

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tempfile::TempDir;

use clusternet_config::Settings;
use clusternet_shared_types::NetworkStatus;

use crate::cli::{parse_assignment, Cli, Commands, NetworkSpec, OutputFormat};
use crate::commands::network::UpdateRequest;
use crate::commands::{ClusterCommand, NetworkCommand};
use crate::context::CliContext;

/// Settings rooted in `dir`, with a fake sysfs listing `eth0` and `eth1`.
fn settings(dir: &Path) -> Settings {
    let sysfs = dir.join("net");
    for name in ["eth0", "eth1"] {
        std::fs::create_dir_all(sysfs.join(name)).expect("create sysfs entry");
    }

    Settings {
        node_name: "node1".to_string(),
        members: Vec::new(),
        state_path: dir.join("state").join("cluster.json"),
        ip_binary: dir.join("missing-ip"),
        sysfs_net_path: sysfs,
        command_timeout_secs: 1,
    }
}

async fn context(dir: &TempDir, dry_run: bool) -> Arc<CliContext> {
    CliContext::bootstrap(settings(dir.path()), dry_run)
        .await
        .expect("bootstrap")
}

fn args(name: &str, network_type: &str, pairs: &[(&str, &str)]) -> NetworkSpec {
    NetworkSpec {
        name: name.to_string(),
        network_type: network_type.to_string(),
        set: pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        description: None,
    }
}

#[tokio::test]
async fn test_define_persists_pending_record() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, false).await;
    let networks = NetworkCommand::new(ctx, "default", OutputFormat::Text);

    let out = networks
        .define(args("uplink", "physical", &[("parent", "eth0")]))
        .await
        .unwrap();
    assert_eq!(out, "Network uplink defined (pending)");
    assert!(dir.path().join("state").join("cluster.json").exists());

    // A second invocation reads the same state.
    let ctx = context(&dir, false).await;
    let record = ctx.orchestrator.get("default", "uplink").await.unwrap();
    assert_eq!(record.status, NetworkStatus::Pending);
    assert_eq!(record.config.get("parent").map(String::as_str), Some("eth0"));

    let listing = NetworkCommand::new(ctx, "default", OutputFormat::Text)
        .list(false)
        .await
        .unwrap();
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains("uplink"));
    assert!(lines[1].contains("pending"));
}

#[tokio::test]
async fn test_define_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    let networks = NetworkCommand::new(context(&dir, false).await, "default", OutputFormat::Text);

    let err = networks
        .define(args("uplink", "physical", &[("parent", "eth0"), ("mtu", "huge")]))
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("mtu"));

    assert!(networks
        .define(args("uplink", "physical", &[]))
        .await
        .is_err());
    assert!(networks.list(true).await.unwrap().lines().count() == 1);
}

#[tokio::test]
async fn test_update_sets_and_unsets_keys() {
    let dir = TempDir::new().unwrap();
    let networks = NetworkCommand::new(context(&dir, false).await, "default", OutputFormat::Text);
    networks
        .define(args("uplink", "physical", &[("parent", "eth0"), ("mtu", "9000")]))
        .await
        .unwrap();

    let request = UpdateRequest {
        set: vec![("vlan".to_string(), "20".to_string())],
        unset: vec!["mtu".to_string()],
        description: Some("Trunk".to_string()),
        target: None,
    };
    networks.update("uplink", request).await.unwrap();

    let ctx = context(&dir, false).await;
    let record = ctx.orchestrator.get("default", "uplink").await.unwrap();
    assert_eq!(record.description, "Trunk");
    assert_eq!(record.config.get("vlan").map(String::as_str), Some("20"));
    assert!(!record.config.contains_key("mtu"));
}

#[tokio::test]
async fn test_show_json() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, false).await;
    NetworkCommand::new(ctx.clone(), "default", OutputFormat::Text)
        .define(args("br0", "bridge", &[]))
        .await
        .unwrap();

    let out = NetworkCommand::new(ctx.clone(), "default", OutputFormat::Json)
        .show("br0")
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["name"], "br0");
    assert_eq!(value["type"], "bridge");
    assert_eq!(value["nodes"]["node1"]["status"], "pending");

    let text = NetworkCommand::new(ctx, "default", OutputFormat::Text)
        .show("br0")
        .await
        .unwrap();
    assert!(text.starts_with("name: br0\n"));
    assert!(text.contains("members:\n  node1: pending"));
}

#[tokio::test]
async fn test_rename_and_delete_pending_networks() {
    let dir = TempDir::new().unwrap();
    let networks = NetworkCommand::new(context(&dir, false).await, "default", OutputFormat::Text);
    networks.define(args("br0", "bridge", &[])).await.unwrap();
    networks
        .define(args("uplink", "physical", &[("parent", "eth1")]))
        .await
        .unwrap();

    networks.rename("br0", "br1").await.unwrap();
    networks.delete("uplink").await.unwrap();

    let ctx = context(&dir, false).await;
    let names: Vec<String> = ctx
        .orchestrator
        .list(None)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["br1".to_string()]);
}

#[tokio::test]
async fn test_start_refused_while_pending() {
    let dir = TempDir::new().unwrap();
    let networks = NetworkCommand::new(context(&dir, false).await, "default", OutputFormat::Text);
    networks
        .define(args("uplink", "physical", &[("parent", "eth0")]))
        .await
        .unwrap();

    let err = networks.start("uplink").await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to start network uplink");
    assert!(format!("{:#}", err).contains("is not created on member \"node1\""));
}

#[tokio::test]
async fn test_dry_run_leaves_no_trace() {
    let dir = TempDir::new().unwrap();
    let ctx = context(&dir, true).await;
    assert!(ctx.dry_run);

    let networks = NetworkCommand::new(ctx.clone(), "default", OutputFormat::Text);
    networks
        .create(args("uplink", "physical", &[("parent", "eth0"), ("vlan", "10")]))
        .await
        .unwrap();

    let record = ctx.orchestrator.get("default", "uplink").await.unwrap();
    assert_eq!(record.status, NetworkStatus::Created);
    assert!(!dir.path().join("state").join("cluster.json").exists());

    let fresh = context(&dir, true).await;
    assert!(fresh.orchestrator.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_startup_and_warnings_with_nothing_created() {
    let dir = TempDir::new().unwrap();
    let cluster = ClusterCommand::new(context(&dir, false).await, OutputFormat::Text);

    assert_eq!(cluster.startup().await.unwrap(), "0 network(s) started");
    assert_eq!(cluster.shutdown().await.unwrap(), "0 network(s) stopped");
    assert_eq!(cluster.warnings().await.unwrap(), "No warnings");

    let json = ClusterCommand::new(context(&dir, false).await, OutputFormat::Json);
    let value: serde_json::Value = serde_json::from_str(&json.startup().await.unwrap()).unwrap();
    assert_eq!(value["action"], "started");
    assert_eq!(value["failed"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_members_from_settings_are_joined() {
    let dir = TempDir::new().unwrap();
    let mut settings = settings(dir.path());
    settings.members = vec!["node2".to_string(), "node1".to_string()];
    let ctx = CliContext::bootstrap(settings, false).await.unwrap();

    NetworkCommand::new(ctx.clone(), "default", OutputFormat::Text)
        .define(args("br0", "bridge", &[]))
        .await
        .unwrap();
    let record = ctx.orchestrator.get("default", "br0").await.unwrap();
    let members: Vec<&str> = record.nodes.keys().map(String::as_str).collect();
    assert_eq!(members, vec!["node1", "node2"]);

    // Renaming is refused once the cluster has several members.
    let err = NetworkCommand::new(ctx, "default", OutputFormat::Text)
        .rename("br0", "br1")
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("cluster"));
}

#[test]
fn test_parse_assignment() {
    assert_eq!(
        parse_assignment("parent=eth0").unwrap(),
        ("parent".to_string(), "eth0".to_string())
    );
    assert_eq!(
        parse_assignment("dns.nameservers=").unwrap(),
        ("dns.nameservers".to_string(), String::new())
    );
    assert_eq!(
        parse_assignment("ipv4.routes=10.0.0.0/8=x").unwrap().1,
        "10.0.0.0/8=x"
    );
    assert!(parse_assignment("parent").is_err());
    assert!(parse_assignment("=eth0").is_err());
}

#[test]
fn test_cli_parsing() {
    let cli = Cli::try_parse_from([
        "netctl",
        "--project",
        "blue",
        "create",
        "uplink",
        "--type",
        "physical",
        "--set",
        "parent=eth0",
        "--set",
        "vlan=10",
    ])
    .unwrap();
    assert_eq!(cli.project, "blue");
    assert_eq!(cli.format, OutputFormat::Text);
    assert_eq!(cli.log_level(), "warn");
    match cli.command {
        Commands::Create(args) => {
            assert_eq!(args.name, "uplink");
            assert_eq!(args.network_type, "physical");
            assert_eq!(args.set.len(), 2);
        }
        other => panic!("unexpected command {:?}", other),
    }

    let cli = Cli::try_parse_from(["netctl", "update", "uplink", "--unset", "mtu", "-d", "--format", "json"])
        .unwrap();
    assert_eq!(cli.log_level(), "debug");
    assert_eq!(cli.format, OutputFormat::Json);
    assert!(matches!(cli.command, Commands::Update { ref unset, .. } if unset == &["mtu".to_string()]));

    assert!(Cli::try_parse_from(["netctl", "create", "uplink", "--set", "parent"]).is_err());
    assert!(Cli::try_parse_from(["netctl", "create", "uplink"]).is_err());
}
