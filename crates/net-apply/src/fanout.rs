//! In-process cluster fan-out
//!
//! Replays validated requests as notifications on the orchestrators of the
//! other members. Peers are held weakly so members can reference each other.

use std::sync::{Arc, RwLock, Weak};

use async_trait::async_trait;
use log::{debug, warn};

use clusternet_core::{NetworkError, Result};
use clusternet_drivers::{MemberNotifier, MemberRequest};
use clusternet_shared_types::ClientType;

use crate::lifecycle::LifecycleOrchestrator;

#[derive(Default)]
pub struct ClusterFanout {
    peers: RwLock<Vec<(String, Weak<LifecycleOrchestrator>)>>,
}

impl ClusterFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_peer(&self, node: impl Into<String>, orchestrator: &Arc<LifecycleOrchestrator>) {
        let node = node.into();
        debug!("Adding cluster peer {}", node);
        self.peers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((node, Arc::downgrade(orchestrator)));
    }

    pub fn peer_names(&self) -> Vec<String> {
        self.peers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|(node, _)| node.clone())
            .collect()
    }

    fn live_peers(&self) -> Vec<(String, Arc<LifecycleOrchestrator>)> {
        self.peers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter_map(|(node, peer)| match peer.upgrade() {
                Some(peer) => Some((node.clone(), peer)),
                None => {
                    warn!("Cluster peer {} is gone", node);
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl MemberNotifier for ClusterFanout {
    async fn notify_members(&self, project: &str, name: &str, request: MemberRequest) -> Result<()> {
        for (node, peer) in self.live_peers() {
            debug!(
                "Notifying member {} of {} on network {}/{}",
                node,
                request.action(),
                project,
                name
            );
            let result = match &request {
                MemberRequest::Create => peer.create_local(project, name).await,
                MemberRequest::Update(put) => {
                    peer.update(project, name, put.clone(), None, ClientType::Notification)
                        .await
                }
                MemberRequest::Delete => peer.delete(project, name, ClientType::Notification).await,
            };

            if let Err(err) = result {
                warn!("Member {} failed to {} network {}: {}", node, request.action(), name, err);
                return Err(member_error(&node, request.action(), err));
            }
        }
        Ok(())
    }
}

/// Keep the error kind, naming the member for host failures.
fn member_error(node: &str, action: &str, err: NetworkError) -> NetworkError {
    match err {
        NetworkError::HostOperation(host) => NetworkError::HostOperation(
            host.context(format!("applying {} on member {}", action, node)),
        ),
        other => other,
    }
}
