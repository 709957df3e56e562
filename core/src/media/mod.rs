//! Local capture and peer negotiation primitives.
//!
//! The call controller only talks to these traits. [`WebRtcBackend`] is the
//! production implementation; tests plug in their own backend.

mod rtc;

pub use rtc::{WebRtcBackend, WebRtcTrack};

use crate::error::Result;
use crate::models::{CallKind, IceCandidate, SessionDescription};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::mpsc;

#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Capture local audio (and video for video calls).
    async fn acquire_local(&self, kind: CallKind) -> Result<LocalMedia>;

    /// Build a peer link carrying `local`'s tracks. Link-side events
    /// (gathered candidates, remote tracks, state changes) go to `events`.
    async fn open_link(
        &self,
        local: &LocalMedia,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Box<dyn PeerLink>>;
}

#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;
    async fn create_answer(&self) -> Result<SessionDescription>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

pub trait LocalTrack: Send + Sync {
    fn id(&self) -> &str;
    fn stop(&self);
    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    LocalCandidate(IceCandidate),
    RemoteTrack { id: String, kind: String },
    State(LinkState),
}

/// Captured local tracks. Stops every track when released or dropped.
pub struct LocalMedia {
    kind: CallKind,
    tracks: Vec<Arc<dyn LocalTrack>>,
    released: bool,
}

impl LocalMedia {
    pub fn new(kind: CallKind, tracks: Vec<Arc<dyn LocalTrack>>) -> Self {
        Self {
            kind,
            tracks,
            released: false,
        }
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn tracks(&self) -> &[Arc<dyn LocalTrack>] {
        &self.tracks
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        for track in &self.tracks {
            track.stop();
        }
        self.released = true;
        log::debug!("Released {} local tracks", self.tracks.len());
    }
}

impl Drop for LocalMedia {
    fn drop(&mut self) {
        self.release();
    }
}

/// Remote stream rendered for the current call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMedia {
    pub tracks: Vec<(String, String)>,
}

/// Owned peer link that is closed on every exit path.
///
/// `close` shuts the link down in place; dropping an unclosed handle spawns
/// the close on the current runtime.
pub struct LinkHandle {
    link: Option<Box<dyn PeerLink>>,
}

impl LinkHandle {
    pub fn new(link: Box<dyn PeerLink>) -> Self {
        Self { link: Some(link) }
    }

    pub fn get(&self) -> Option<&dyn PeerLink> {
        self.link.as_deref()
    }

    pub async fn close(&mut self) {
        if let Some(link) = self.link.take() {
            if let Err(e) = link.close().await {
                log::warn!("Failed to close peer link: {}", e);
            }
        }
    }
}

impl Drop for LinkHandle {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = link.close().await {
                            log::warn!("Failed to close dropped peer link: {}", e);
                        }
                    });
                }
                Err(_) => log::warn!("Peer link dropped outside a runtime, not closed"),
            }
        }
    }
}
