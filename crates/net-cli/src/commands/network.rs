//! Network commands

use std::sync::Arc;

use anyhow::{Context, Result};

use clusternet_shared_types::{
    is_volatile_key, ClientType, NetworkPut, NetworkRecord, NetworksPost,
};

use crate::cli::{NetworkSpec, OutputFormat};
use crate::commands::{done, render};
use crate::context::CliContext;

/// Changes requested by `netctl update`
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub set: Vec<(String, String)>,
    pub unset: Vec<String>,
    pub description: Option<String>,
    pub target: Option<String>,
}

pub struct NetworkCommand {
    context: Arc<CliContext>,
    project: String,
    format: OutputFormat,
}

impl NetworkCommand {
    pub fn new(context: Arc<CliContext>, project: impl Into<String>, format: OutputFormat) -> Self {
        Self {
            context,
            project: project.into(),
            format,
        }
    }

    fn request(&self, args: NetworkSpec) -> NetworksPost {
        let mut request = NetworksPost::new(args.name, args.network_type)
            .with_project(self.project.clone())
            .with_description(args.description.unwrap_or_default());
        for (key, value) in args.set {
            request = request.with_config(key, value);
        }
        request
    }

    pub async fn define(&self, args: NetworkSpec) -> Result<String> {
        let record = self
            .context
            .orchestrator
            .define(self.request(args))
            .await
            .context("Failed to define network")?;
        done(
            self.format,
            format!("Network {} defined (pending)", record.name),
        )
    }

    pub async fn create(&self, args: NetworkSpec) -> Result<String> {
        let name = args.name.clone();
        self.context
            .orchestrator
            .create(self.request(args), ClientType::Normal)
            .await
            .with_context(|| format!("Failed to create network {}", name))?;
        done(self.format, format!("Network {} created", name))
    }

    pub async fn start(&self, name: &str) -> Result<String> {
        self.context
            .orchestrator
            .start(&self.project, name)
            .await
            .with_context(|| format!("Failed to start network {}", name))?;
        done(self.format, format!("Network {} started", name))
    }

    pub async fn stop(&self, name: &str) -> Result<String> {
        self.context
            .orchestrator
            .stop(&self.project, name)
            .await
            .with_context(|| format!("Failed to stop network {}", name))?;
        done(self.format, format!("Network {} stopped", name))
    }

    /// Apply `--set`/`--unset` on top of the current cluster-wide config.
    pub async fn update(&self, name: &str, request: UpdateRequest) -> Result<String> {
        let orchestrator = &self.context.orchestrator;
        let record = orchestrator.get(&self.project, name).await?;

        let mut config = record.config.clone();
        config.retain(|key, _| !is_volatile_key(key));
        for key in &request.unset {
            config.shift_remove(key);
        }
        for (key, value) in request.set {
            config.insert(key, value);
        }
        let description = request.description.unwrap_or(record.description);

        orchestrator
            .update(
                &self.project,
                name,
                NetworkPut::new(description, config),
                request.target.as_deref(),
                ClientType::Normal,
            )
            .await
            .with_context(|| format!("Failed to update network {}", name))?;
        done(self.format, format!("Network {} updated", name))
    }

    pub async fn delete(&self, name: &str) -> Result<String> {
        self.context
            .orchestrator
            .delete(&self.project, name, ClientType::Normal)
            .await
            .with_context(|| format!("Failed to delete network {}", name))?;
        done(self.format, format!("Network {} deleted", name))
    }

    pub async fn rename(&self, name: &str, new_name: &str) -> Result<String> {
        self.context
            .orchestrator
            .rename(&self.project, name, new_name)
            .await
            .with_context(|| format!("Failed to rename network {}", name))?;
        done(
            self.format,
            format!("Network {} renamed to {}", name, new_name),
        )
    }

    pub async fn list(&self, all_projects: bool) -> Result<String> {
        let project = (!all_projects).then_some(self.project.as_str());
        let records = self.context.orchestrator.list(project).await?;
        let node = self.context.orchestrator.node().to_string();

        render(self.format, &records, |records| {
            let mut out = format!(
                "{:<12} {:<20} {:<10} {:<8} {}",
                "PROJECT", "NAME", "TYPE", "STATUS", "LOCAL"
            );
            for record in records {
                out.push_str(&format!(
                    "\n{:<12} {:<20} {:<10} {:<8} {}",
                    record.project,
                    record.name,
                    record.network_type,
                    record.status,
                    record.local_status(&node)
                ));
            }
            out
        })
    }

    pub async fn show(&self, name: &str) -> Result<String> {
        let record = self.context.orchestrator.get(&self.project, name).await?;
        let node = self.context.orchestrator.node().to_string();
        render(self.format, &record, |record| describe(record, &node))
    }
}

fn describe(record: &NetworkRecord, node: &str) -> String {
    let mut out = format!(
        "name: {}\nproject: {}\ntype: {}\nstatus: {}\n",
        record.name, record.project, record.network_type, record.status
    );
    if !record.description.is_empty() {
        out.push_str(&format!("description: {}\n", record.description));
    }

    out.push_str("config:");
    for (key, value) in record.config_for(node) {
        out.push_str(&format!("\n  {}: {}", key, value));
    }

    out.push_str("\nmembers:");
    for (member, state) in &record.nodes {
        out.push_str(&format!("\n  {}: {}", member, state.status));
    }
    out
}
