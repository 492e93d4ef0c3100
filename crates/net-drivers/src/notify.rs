//! Collaborators drivers notify after committing a change

use async_trait::async_trait;

use clusternet_core::Result;
use clusternet_shared_types::NetworkPut;

/// Request replayed on the other cluster members as a notification.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberRequest {
    Create,
    Update(NetworkPut),
    Delete,
}

impl MemberRequest {
    pub fn action(&self) -> &'static str {
        match self {
            MemberRequest::Create => "create",
            MemberRequest::Update(_) => "update",
            MemberRequest::Delete => "delete",
        }
    }
}

/// Fan-out of a validated request to the other cluster members.
#[async_trait]
pub trait MemberNotifier: Send + Sync {
    /// Apply `request` for the network on every other member. The first
    /// member failure is returned.
    async fn notify_members(&self, project: &str, name: &str, request: MemberRequest) -> Result<()>;
}

/// Single-member cluster: nothing to notify.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandaloneMember;

#[async_trait]
impl MemberNotifier for StandaloneMember {
    async fn notify_members(&self, _project: &str, _name: &str, _request: MemberRequest) -> Result<()> {
        Ok(())
    }
}

/// Informs networks that use an updated network as their uplink.
#[async_trait]
pub trait DependencyNotifier: Send + Sync {
    async fn network_updated(
        &self,
        project: &str,
        name: &str,
        changed_keys: &[String],
    ) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoDependents;

#[async_trait]
impl DependencyNotifier for NoDependents {
    async fn network_updated(
        &self,
        _project: &str,
        _name: &str,
        _changed_keys: &[String],
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
