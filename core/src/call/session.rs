//! State of one call attempt

use crate::error::Result;
use crate::media::{LinkEvent, LinkHandle, LocalMedia, PeerLink, RemoteMedia};
use crate::models::{CallKind, CallStatus, EndReason, IceCandidate, SessionDescription};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Result of the background media + link setup for session `epoch`.
pub struct SetupOutcome {
    pub(crate) epoch: u64,
    pub(crate) result: Result<(LocalMedia, LinkHandle)>,
}

impl std::fmt::Debug for SetupOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupOutcome")
            .field("epoch", &self.epoch)
            .field("ok", &self.result.is_ok())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSummary {
    pub call_id: String,
    pub remote_id: String,
    pub kind: CallKind,
    pub was_connected: bool,
    pub duration_secs: u64,
    pub reason: EndReason,
}

pub struct CallSession {
    pub(crate) call_id: String,
    pub(crate) local_id: String,
    pub(crate) remote_id: String,
    pub(crate) remote_name: String,
    pub(crate) kind: CallKind,
    pub(crate) status: CallStatus,
    pub(crate) elapsed_secs: u64,
    pub(crate) local_media: Option<LocalMedia>,
    pub(crate) remote_media: Option<RemoteMedia>,
    pub(crate) link: Option<LinkHandle>,
    pub(crate) link_events: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    pub(crate) setup: Option<JoinHandle<()>>,
    /// Remote candidates waiting for the remote description.
    pub(crate) pending_candidates: Vec<IceCandidate>,
    /// Offer that arrived before the link was built.
    pub(crate) pending_offer: Option<SessionDescription>,
    pub(crate) remote_applied: bool,
    pub(crate) accepted: bool,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) connected_at: Option<DateTime<Utc>>,
}

impl CallSession {
    pub(crate) fn new(
        local_id: &str,
        remote_id: &str,
        remote_name: &str,
        kind: CallKind,
        status: CallStatus,
    ) -> Self {
        Self {
            call_id: uuid::Uuid::new_v4().to_string(),
            local_id: local_id.to_string(),
            remote_id: remote_id.to_string(),
            remote_name: remote_name.to_string(),
            kind,
            status,
            elapsed_secs: 0,
            local_media: None,
            remote_media: None,
            link: None,
            link_events: None,
            setup: None,
            pending_candidates: Vec::new(),
            pending_offer: None,
            remote_applied: false,
            accepted: false,
            created_at: Utc::now(),
            connected_at: None,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    pub fn has_local_media(&self) -> bool {
        self.local_media.is_some()
    }

    pub fn has_link(&self) -> bool {
        self.link.is_some()
    }

    pub fn remote_media(&self) -> Option<&RemoteMedia> {
        self.remote_media.as_ref()
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub(crate) fn peer_link(&self) -> Option<&dyn PeerLink> {
        self.link.as_ref().and_then(|l| l.get())
    }

    pub(crate) fn summary(&self, reason: EndReason) -> CallSummary {
        CallSummary {
            call_id: self.call_id.clone(),
            remote_id: self.remote_id.clone(),
            kind: self.kind,
            was_connected: self.connected_at.is_some(),
            duration_secs: self.elapsed_secs,
            reason,
        }
    }

    /// Release every resource the session owns.
    pub(crate) async fn release(&mut self) {
        if let Some(task) = self.setup.take() {
            task.abort();
        }
        self.link_events = None;
        if let Some(mut media) = self.local_media.take() {
            media.release();
        }
        self.remote_media = None;
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
        self.pending_candidates.clear();
        self.pending_offer = None;
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        // Media and link release themselves on drop; the setup task does not.
        if let Some(task) = self.setup.take() {
            task.abort();
        }
    }
}
