//! Shared fixtures: in-process relay, fake media and in-memory backend.

#![allow(dead_code)]

use async_trait::async_trait;
use chatlink_core::api::{CallRecord, ChatBackend, NewMessage, StoredMessage};
use chatlink_core::call::{CallController, CallUpdate};
use chatlink_core::config::CallConfig;
use chatlink_core::media::{LinkEvent, LinkState, LocalMedia, LocalTrack, MediaBackend, PeerLink};
use chatlink_core::signaling::{Relay as Routed, SignalEvent, SignalingHub};
use chatlink_core::{CallKind, Error, IceCandidate, Notification, Result, SdpType, SessionDescription, User};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

// ============================================================================
// Relay
// ============================================================================

/// Routes events between hubs the way the signaling server does.
#[derive(Default)]
pub struct TestRelay {
    hubs: Mutex<HashMap<String, Arc<SignalingHub>>>,
    log: Mutex<Vec<(String, SignalEvent)>>,
}

impl TestRelay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Connect a fresh hub for `user_id`.
    pub fn join(self: &Arc<Self>, user_id: &str) -> Arc<SignalingHub> {
        let hub = Arc::new(SignalingHub::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.bind(tx);
        self.hubs.lock().insert(user_id.to_string(), hub.clone());

        let relay = self.clone();
        let from = user_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                relay.route(&from, event);
            }
        });
        hub
    }

    /// Names of every event emitted by `user_id`, in order.
    pub fn sent_by(&self, user_id: &str) -> Vec<&'static str> {
        self.log
            .lock()
            .iter()
            .filter(|(from, _)| from == user_id)
            .map(|(_, event)| event.kind().name())
            .collect()
    }

    pub fn events_by(&self, user_id: &str) -> Vec<SignalEvent> {
        self.log
            .lock()
            .iter()
            .filter(|(from, _)| from == user_id)
            .map(|(_, event)| event.clone())
            .collect()
    }

    fn deliver(&self, user_id: &str, event: SignalEvent) -> bool {
        match self.hubs.lock().get(user_id) {
            Some(hub) => {
                hub.deliver(event);
                true
            }
            None => false,
        }
    }

    fn route(&self, from: &str, event: SignalEvent) {
        self.log.lock().push((from.to_string(), event.clone()));

        match event {
            SignalEvent::CallUser(request) => {
                let to = request.user_to_call.clone();
                if !self.deliver(&to, SignalEvent::CallUser(request)) {
                    self.deliver(
                        from,
                        SignalEvent::CallFailed {
                            message: format!("user {} is offline", to),
                        },
                    );
                }
            }
            SignalEvent::AnswerCall(answer) => {
                self.deliver(&answer.to, SignalEvent::CallAccepted);
            }
            SignalEvent::RejectCall { to } => {
                self.deliver(&to, SignalEvent::CallRejected);
            }
            SignalEvent::EndCall { to } => {
                self.deliver(&to, SignalEvent::CallEnded);
            }
            SignalEvent::Offer(r) => self.forward(from, r, SignalEvent::Offer),
            SignalEvent::Answer(r) => self.forward(from, r, SignalEvent::Answer),
            SignalEvent::IceCandidate(r) => self.forward(from, r, SignalEvent::IceCandidate),
            SignalEvent::SendMessage(message) => {
                for user in message.chat_id.split('_') {
                    self.deliver(user, SignalEvent::ReceiveMessage(message.clone()));
                }
            }
            _ => {}
        }
    }

    fn forward<T>(&self, from: &str, mut relay: Routed<T>, wrap: fn(Routed<T>) -> SignalEvent) {
        let Some(to) = relay.to.take() else {
            return;
        };
        relay.from = Some(from.to_string());
        self.deliver(&to, wrap(relay));
    }
}

// ============================================================================
// Media
// ============================================================================

#[derive(Default)]
pub struct MediaStats {
    pub acquired: AtomicUsize,
    pub live_tracks: AtomicUsize,
    pub open_links: AtomicUsize,
    pub applied_candidates: AtomicUsize,
}

impl MediaStats {
    pub fn live_tracks(&self) -> usize {
        self.live_tracks.load(Ordering::SeqCst)
    }

    pub fn open_links(&self) -> usize {
        self.open_links.load(Ordering::SeqCst)
    }

    pub fn applied_candidates(&self) -> usize {
        self.applied_candidates.load(Ordering::SeqCst)
    }
}

pub struct FakeMedia {
    pub stats: Arc<MediaStats>,
    gate: Option<Arc<Semaphore>>,
    deny_video: bool,
}

impl FakeMedia {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            stats: Arc::default(),
            gate: None,
            deny_video: false,
        })
    }

    /// Acquisition blocks until a permit is added to the returned semaphore.
    pub fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let media = Arc::new(Self {
            stats: Arc::default(),
            gate: Some(gate.clone()),
            deny_video: false,
        });
        (media, gate)
    }

    pub fn without_camera() -> Arc<Self> {
        Arc::new(Self {
            stats: Arc::default(),
            gate: None,
            deny_video: true,
        })
    }
}

struct FakeTrack {
    id: String,
    stats: Arc<MediaStats>,
    stopped: AtomicBool,
}

impl LocalTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.stats.live_tracks.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl MediaBackend for FakeMedia {
    async fn acquire_local(&self, kind: CallKind) -> Result<LocalMedia> {
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| Error::Media(e.to_string()))?;
        }
        if kind.has_video() && self.deny_video {
            return Err(Error::CapabilityDenied("camera permission denied".into()));
        }

        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        let mut ids = vec!["audio"];
        if kind.has_video() {
            ids.push("video");
        }
        let tracks: Vec<Arc<dyn LocalTrack>> = ids
            .into_iter()
            .map(|id| {
                self.stats.live_tracks.fetch_add(1, Ordering::SeqCst);
                Arc::new(FakeTrack {
                    id: id.to_string(),
                    stats: self.stats.clone(),
                    stopped: AtomicBool::new(false),
                }) as Arc<dyn LocalTrack>
            })
            .collect();
        Ok(LocalMedia::new(kind, tracks))
    }

    async fn open_link(
        &self,
        local: &LocalMedia,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Box<dyn PeerLink>> {
        self.stats.open_links.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeLink {
            stats: self.stats.clone(),
            events,
            kind: local.kind(),
            local_set: AtomicBool::new(false),
            remote_set: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakeLink {
    stats: Arc<MediaStats>,
    events: mpsc::UnboundedSender<LinkEvent>,
    kind: CallKind,
    local_set: AtomicBool,
    remote_set: AtomicBool,
    closed: AtomicBool,
}

#[async_trait]
impl PeerLink for FakeLink {
    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription {
            sdp_type: SdpType::Offer,
            sdp: format!("v=0 fake offer {}", self.kind.as_str()),
        })
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        if !self.remote_set.load(Ordering::SeqCst) {
            return Err(Error::Media("no remote offer".into()));
        }
        Ok(SessionDescription {
            sdp_type: SdpType::Answer,
            sdp: "v=0 fake answer".into(),
        })
    }

    async fn set_local_description(&self, _desc: SessionDescription) -> Result<()> {
        self.local_set.store(true, Ordering::SeqCst);
        let _ = self.events.send(LinkEvent::LocalCandidate(IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 192.0.2.1 54400 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        }));
        Ok(())
    }

    async fn set_remote_description(&self, _desc: SessionDescription) -> Result<()> {
        self.remote_set.store(true, Ordering::SeqCst);
        let _ = self.events.send(LinkEvent::RemoteTrack {
            id: "remote-audio".into(),
            kind: "audio".into(),
        });
        let _ = self.events.send(LinkEvent::State(LinkState::Connecting));
        Ok(())
    }

    async fn add_ice_candidate(&self, _candidate: IceCandidate) -> Result<()> {
        if !self.remote_set.load(Ordering::SeqCst) {
            return Err(Error::Media("remote description not set".into()));
        }
        self.stats.applied_candidates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.open_links.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ============================================================================
// Backend
// ============================================================================

pub struct MemoryBackend {
    messages: Mutex<Vec<StoredMessage>>,
    pub calls: Mutex<Vec<CallRecord>>,
    following: HashMap<String, Vec<User>>,
    next_id: AtomicUsize,
    save_delay: Duration,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        Self::with_following(HashMap::new())
    }

    /// Backend whose message saves take `delay` to complete.
    pub fn slow_saves(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            save_delay: delay,
            ..Self::build(HashMap::new())
        })
    }

    pub fn with_following(following: HashMap<String, Vec<User>>) -> Arc<Self> {
        Arc::new(Self::build(following))
    }

    fn build(following: HashMap<String, Vec<User>>) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            following,
            next_id: AtomicUsize::new(100),
            save_delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl ChatBackend for MemoryBackend {
    async fn fetch_history(&self, chat_id: &str) -> Result<Vec<StoredMessage>> {
        Ok(self
            .messages
            .lock()
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect())
    }

    async fn create_message(&self, draft: &NewMessage) -> Result<StoredMessage> {
        if !self.save_delay.is_zero() {
            tokio::time::sleep(self.save_delay).await;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stored = StoredMessage {
            id: format!("m{}", id),
            chat_id: draft.chat_id.clone(),
            sender_id: draft.sender_id.clone(),
            text: draft.text.clone(),
            created_at: chrono::Utc::now(),
        };
        self.messages.lock().push(stored.clone());
        Ok(stored)
    }

    async fn record_call(&self, record: &CallRecord) -> Result<()> {
        self.calls.lock().push(record.clone());
        Ok(())
    }

    async fn fetch_following(&self, user_id: &str) -> Result<Vec<User>> {
        Ok(self.following.get(user_id).cloned().unwrap_or_default())
    }

    async fn fetch_notifications(&self) -> Result<Vec<Notification>> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Driving controllers
// ============================================================================

pub fn controller(
    user_id: &str,
    name: &str,
    hub: Arc<SignalingHub>,
    media: Arc<FakeMedia>,
    config: CallConfig,
) -> (CallController, mpsc::UnboundedReceiver<CallUpdate>) {
    CallController::new(user_id, name, hub, media, config)
}

/// Feed inputs to every controller until none has anything pending.
pub async fn pump(controllers: &mut [&mut CallController]) {
    loop {
        let mut progressed = false;
        for controller in controllers.iter_mut() {
            if let Ok(input) =
                tokio::time::timeout(Duration::from_millis(50), controller.next_input()).await
            {
                controller.handle_input(input).await;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
}

pub fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}
