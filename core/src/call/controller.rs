//! Call session controller
//!
//! Owns at most one [`CallSession`] and drives it through
//! `idle -> outgoing|incoming -> connected -> ended -> idle`, translating
//! relayed signaling events into peer link calls and back.
//!
//! The controller is not a task of its own. Its owner polls
//! [`CallController::next_input`] from the event loop and feeds the result to
//! [`CallController::handle_input`]; user actions are plain method calls.
//! Everything therefore runs on one logical thread of control.

use super::session::{CallSession, CallSummary, SetupOutcome};
use crate::config::CallConfig;
use crate::error::{Error, Result};
use crate::media::{LinkEvent, LinkHandle, LinkState, MediaBackend, RemoteMedia};
use crate::models::{CallKind, CallStatus, EndReason, IceCandidate, SessionDescription};
use crate::signaling::{
    AnswerCall, CallRequest, EventKind, LinkWatch, Relay, SignalEvent, SignalingHub, Subscription,
};
use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, Sleep};

const TICK: Duration = Duration::from_secs(1);

/// Updates for whoever renders the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallUpdate {
    Status(CallStatus),
    Incoming { from: String, name: String, kind: CallKind },
    Ringing(bool),
    Elapsed(u64),
    RemoteMedia { tracks: usize },
    Failed(String),
    Ended(CallSummary),
}

#[derive(Debug)]
pub enum ControllerInput {
    Signal(SignalEvent),
    Setup(SetupOutcome),
    Link(LinkEvent),
    Tick,
    RingTimeout,
    /// The relay link dropped or the hub went away.
    Closed,
}

pub struct CallController {
    local_id: String,
    local_name: String,
    hub: Arc<SignalingHub>,
    media: Arc<dyn MediaBackend>,
    config: CallConfig,
    subscription: Subscription,
    link: LinkWatch,
    session: Option<CallSession>,
    epoch: u64,
    setup_tx: mpsc::UnboundedSender<SetupOutcome>,
    setup_rx: mpsc::UnboundedReceiver<SetupOutcome>,
    ticker: Option<Interval>,
    ring_deadline: Option<Pin<Box<Sleep>>>,
    ringing: bool,
    updates: mpsc::UnboundedSender<CallUpdate>,
}

impl CallController {
    pub fn new(
        local_id: &str,
        local_name: &str,
        hub: Arc<SignalingHub>,
        media: Arc<dyn MediaBackend>,
        config: CallConfig,
    ) -> (Self, mpsc::UnboundedReceiver<CallUpdate>) {
        let (setup_tx, setup_rx) = mpsc::unbounded_channel();
        let (updates, updates_rx) = mpsc::unbounded_channel();
        let subscription = hub.subscribe(&EventKind::CALL);
        let link = hub.link_watch();

        let controller = Self {
            local_id: local_id.to_string(),
            local_name: local_name.to_string(),
            hub,
            media,
            config,
            subscription,
            link,
            session: None,
            epoch: 0,
            setup_tx,
            setup_rx,
            ticker: None,
            ring_deadline: None,
            ringing: false,
            updates,
        };

        (controller, updates_rx)
    }

    pub fn status(&self) -> CallStatus {
        self.session
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(CallStatus::Idle)
    }

    pub fn session(&self) -> Option<&CallSession> {
        self.session.as_ref()
    }

    pub fn is_ringing(&self) -> bool {
        self.ringing
    }

    // ============= User actions =============

    pub async fn start_call(&mut self, peer_id: &str, kind: CallKind) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::CallBusy);
        }
        if peer_id == self.local_id {
            return Err(Error::InvalidTransition {
                from: CallStatus::Idle.as_str(),
                action: "call yourself",
            });
        }

        self.hub.emit(SignalEvent::CallUser(CallRequest {
            user_to_call: peer_id.to_string(),
            from: self.local_id.clone(),
            name: self.local_name.clone(),
            call_type: kind,
        }))?;

        log::info!("Calling {} ({})", peer_id, kind.as_str());
        self.begin_session(peer_id, "", kind, CallStatus::Outgoing);
        if let Some(timeout) = self.config.ring_timeout() {
            self.ring_deadline = Some(Box::pin(tokio::time::sleep(timeout)));
        }
        Ok(())
    }

    pub async fn accept(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(Error::NoActiveCall)?;
        if session.status != CallStatus::Incoming || session.accepted {
            return Err(Error::InvalidTransition {
                from: session.status.as_str(),
                action: "accept",
            });
        }

        let remote_id = session.remote_id.clone();
        if let Err(e) = self.hub.emit(SignalEvent::AnswerCall(AnswerCall {
            signal: serde_json::Value::Null,
            to: remote_id,
        })) {
            self.notify(CallUpdate::Failed(e.to_string()));
            self.end_session(EndReason::SignalingFailed(e.to_string())).await;
            return Err(e);
        }

        if let Some(session) = self.session.as_mut() {
            session.accepted = true;
        }
        self.set_ringing(false);
        log::info!("Accepted call");

        if self.session.as_ref().map_or(false, |s| s.has_link()) {
            self.send_offer().await;
        }
        Ok(())
    }

    pub async fn reject(&mut self) -> Result<()> {
        let session = self.session.as_ref().ok_or(Error::NoActiveCall)?;
        if session.status != CallStatus::Incoming || session.accepted {
            return Err(Error::InvalidTransition {
                from: session.status.as_str(),
                action: "reject",
            });
        }

        let to = session.remote_id.clone();
        if let Err(e) = self.hub.emit(SignalEvent::RejectCall { to }) {
            log::warn!("Failed to send rejection: {}", e);
        }
        self.end_session(EndReason::LocalReject).await;
        Ok(())
    }

    /// End the call at whatever stage it is in.
    pub async fn hangup(&mut self) -> Result<()> {
        let session = self.session.as_ref().ok_or(Error::NoActiveCall)?;
        if session.status == CallStatus::Incoming && !session.accepted {
            return self.reject().await;
        }

        let to = session.remote_id.clone();
        if let Err(e) = self.hub.emit(SignalEvent::EndCall { to }) {
            log::warn!("Failed to send hangup: {}", e);
        }
        self.end_session(EndReason::LocalHangup).await;
        Ok(())
    }

    /// Tear down any session before the controller goes away.
    pub async fn shutdown(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let event = if session.status == CallStatus::Incoming && !session.accepted {
            SignalEvent::RejectCall {
                to: session.remote_id.clone(),
            }
        } else {
            SignalEvent::EndCall {
                to: session.remote_id.clone(),
            }
        };
        if let Err(e) = self.hub.emit(event) {
            log::debug!("Could not notify peer on shutdown: {}", e);
        }
        self.end_session(EndReason::Shutdown).await;
    }

    // ============= Event loop =============

    pub async fn next_input(&mut self) -> ControllerInput {
        loop {
            let link_events = self
                .session
                .as_mut()
                .and_then(|s| s.link_events.as_mut());

            let woke = tokio::select! {
                event = self.subscription.recv() => match event {
                    Some(event) => Some(ControllerInput::Signal(event)),
                    None => Some(ControllerInput::Closed),
                },
                _ = self.link.lost() => Some(ControllerInput::Closed),
                Some(outcome) = self.setup_rx.recv() => Some(ControllerInput::Setup(outcome)),
                event = recv_or_pending(link_events) => event.map(ControllerInput::Link),
                _ = tick_or_pending(self.ticker.as_mut()) => Some(ControllerInput::Tick),
                _ = sleep_or_pending(self.ring_deadline.as_mut()) => Some(ControllerInput::RingTimeout),
            };

            match woke {
                Some(input) => return input,
                None => {
                    // Link event channel closed: the link is gone.
                    if let Some(session) = self.session.as_mut() {
                        session.link_events = None;
                    }
                }
            }
        }
    }

    pub async fn handle_input(&mut self, input: ControllerInput) {
        match input {
            ControllerInput::Signal(event) => self.handle_signal(event).await,
            ControllerInput::Setup(outcome) => self.on_setup(outcome).await,
            ControllerInput::Link(event) => self.on_link_event(event).await,
            ControllerInput::Tick => self.on_tick(),
            ControllerInput::RingTimeout => self.on_ring_timeout().await,
            ControllerInput::Closed => {
                if self.session.is_some() {
                    self.notify(CallUpdate::Failed("signaling channel closed".to_string()));
                    self.end_session(EndReason::SignalingFailed("channel closed".to_string()))
                        .await;
                }
            }
        }
    }

    pub async fn handle_signal(&mut self, event: SignalEvent) {
        match event {
            SignalEvent::CallUser(request) => self.on_call_request(request).await,
            SignalEvent::CallAccepted => self.on_remote_accepted(),
            SignalEvent::CallRejected => {
                if self.status() == CallStatus::Outgoing {
                    log::info!("Call rejected by peer");
                    self.end_session(EndReason::RemoteRejected).await;
                }
            }
            SignalEvent::CallEnded => {
                if self.session.is_some() {
                    log::info!("Call ended by peer");
                    self.end_session(EndReason::RemoteEnded).await;
                }
            }
            SignalEvent::CallFailed { message } => {
                if self.session.is_some() {
                    log::warn!("Call failed remotely: {}", message);
                    self.notify(CallUpdate::Failed(message.clone()));
                    self.end_session(EndReason::RemoteFailed(message)).await;
                }
            }
            SignalEvent::Offer(relay) => {
                if self.is_from_remote(relay.from.as_deref()) {
                    self.on_remote_offer(relay.body).await;
                }
            }
            SignalEvent::Answer(relay) => {
                if self.is_from_remote(relay.from.as_deref()) {
                    self.on_remote_answer(relay.body).await;
                }
            }
            SignalEvent::IceCandidate(relay) => {
                if self.is_from_remote(relay.from.as_deref()) {
                    self.on_remote_candidate(relay.body).await;
                }
            }
            other => log::debug!("Call controller ignores {}", other.kind().name()),
        }
    }

    // ============= Transitions =============

    fn begin_session(&mut self, remote_id: &str, remote_name: &str, kind: CallKind, status: CallStatus) {
        self.epoch += 1;
        let epoch = self.epoch;

        let mut session = CallSession::new(&self.local_id, remote_id, remote_name, kind, status);
        let (link_tx, link_rx) = mpsc::unbounded_channel();
        session.link_events = Some(link_rx);

        let media = self.media.clone();
        let setup_tx = self.setup_tx.clone();
        session.setup = Some(tokio::spawn(async move {
            let result = async {
                let local = media.acquire_local(kind).await?;
                let link = media.open_link(&local, link_tx).await?;
                Ok::<_, Error>((local, LinkHandle::new(link)))
            }
            .await;
            // If the controller is gone the outcome drops and releases itself.
            let _ = setup_tx.send(SetupOutcome { epoch, result });
        }));

        self.session = Some(session);
        self.notify(CallUpdate::Status(status));
    }

    async fn on_call_request(&mut self, request: CallRequest) {
        if request.from == self.local_id {
            return;
        }
        if self.session.is_some() {
            log::info!("Busy, declining call from {}", request.from);
            if let Err(e) = self.hub.emit(SignalEvent::RejectCall { to: request.from }) {
                log::warn!("Failed to decline call: {}", e);
            }
            return;
        }

        log::info!("Incoming {} call from {}", request.call_type.as_str(), request.from);
        self.begin_session(&request.from, &request.name, request.call_type, CallStatus::Incoming);
        self.notify(CallUpdate::Incoming {
            from: request.from,
            name: request.name,
            kind: request.call_type,
        });
        self.set_ringing(true);
    }

    fn on_remote_accepted(&mut self) {
        if self.status() != CallStatus::Outgoing {
            return;
        }
        log::info!("Call accepted by peer");
        self.enter_connected();
    }

    fn enter_connected(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.status = CallStatus::Connected;
        session.connected_at = Some(chrono::Utc::now());
        session.elapsed_secs = 0;

        self.ring_deadline = None;
        self.ticker = Some(interval_at(Instant::now() + TICK, TICK));
        self.set_ringing(false);
        self.notify(CallUpdate::Status(CallStatus::Connected));
        self.notify(CallUpdate::Elapsed(0));
    }

    async fn on_setup(&mut self, outcome: SetupOutcome) {
        let current = outcome.epoch == self.epoch && self.session.is_some();
        if !current {
            log::debug!("Discarding setup for stale call (epoch {})", outcome.epoch);
            if let Ok((mut media, mut link)) = outcome.result {
                media.release();
                link.close().await;
            }
            return;
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.setup = None;

        match outcome.result {
            Ok((media, link)) => {
                session.local_media = Some(media);
                session.link = Some(link);
                log::debug!("Local media and peer link ready");

                let pending_offer = session.pending_offer.take();
                let offer_now = session.status == CallStatus::Incoming && session.accepted;

                if let Some(offer) = pending_offer {
                    self.on_remote_offer(offer).await;
                } else if offer_now {
                    self.send_offer().await;
                }
            }
            Err(e) => {
                log::warn!("Call setup failed: {}", e);
                let notify = match session.status {
                    CallStatus::Incoming => SignalEvent::RejectCall {
                        to: session.remote_id.clone(),
                    },
                    _ => SignalEvent::EndCall {
                        to: session.remote_id.clone(),
                    },
                };
                if let Err(emit_err) = self.hub.emit(notify) {
                    log::warn!("Failed to notify peer of setup failure: {}", emit_err);
                }

                let reason = match &e {
                    Error::CapabilityDenied(msg) => EndReason::CapabilityDenied(msg.clone()),
                    other => EndReason::RemoteFailed(other.to_string()),
                };
                self.notify(CallUpdate::Failed(e.to_string()));
                self.end_session(reason).await;
            }
        }
    }

    /// Callee side: create the offer, apply it locally, then send it.
    async fn send_offer(&mut self) {
        let result = async {
            let session = self.session.as_ref().ok_or(Error::NoActiveCall)?;
            let link = session.peer_link().ok_or(Error::NoActiveCall)?;
            let offer = link.create_offer().await?;
            link.set_local_description(offer.clone()).await?;
            self.hub.emit(SignalEvent::Offer(Relay::to(
                offer,
                &session.remote_id,
                &self.local_id,
            )))
        }
        .await;

        if let Err(e) = result {
            self.fail_negotiation(e).await;
        }
    }

    /// Caller side: apply the callee's offer and answer it.
    async fn on_remote_offer(&mut self, offer: SessionDescription) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !matches!(session.status, CallStatus::Outgoing | CallStatus::Connected) {
            log::debug!("Ignoring offer while {}", session.status.as_str());
            return;
        }
        if !session.has_link() {
            session.pending_offer = Some(offer);
            return;
        }

        let result = async {
            let session = self.session.as_mut().ok_or(Error::NoActiveCall)?;
            apply_remote(session, offer).await?;
            let link = session.peer_link().ok_or(Error::NoActiveCall)?;
            let answer = link.create_answer().await?;
            link.set_local_description(answer.clone()).await?;
            self.hub.emit(SignalEvent::Answer(Relay::to(
                answer,
                &session.remote_id,
                &self.local_id,
            )))
        }
        .await;

        if let Err(e) = result {
            self.fail_negotiation(e).await;
        }
    }

    async fn on_remote_answer(&mut self, answer: SessionDescription) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.accepted || session.remote_applied || !session.has_link() {
            log::debug!("Ignoring unexpected answer");
            return;
        }

        if let Err(e) = apply_remote(session, answer).await {
            self.fail_negotiation(e).await;
            return;
        }
        if self.status() == CallStatus::Incoming {
            self.enter_connected();
        }
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        let Some(session) = self.session.as_mut() else {
            log::debug!("Dropping candidate with no call in progress");
            return;
        };

        match session.peer_link() {
            Some(link) if session.remote_applied => {
                if let Err(e) = link.add_ice_candidate(candidate).await {
                    log::warn!("Failed to add remote candidate: {}", e);
                }
            }
            _ => session.pending_candidates.push(candidate),
        }
    }

    async fn on_link_event(&mut self, event: LinkEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match event {
            LinkEvent::LocalCandidate(candidate) => {
                let relay = Relay::to(candidate, &session.remote_id, &self.local_id);
                if let Err(e) = self.hub.emit(SignalEvent::IceCandidate(relay)) {
                    log::warn!("Failed to send local candidate: {}", e);
                }
            }
            LinkEvent::RemoteTrack { id, kind } => {
                let remote = session.remote_media.get_or_insert_with(RemoteMedia::default);
                remote.tracks.push((id, kind));
                let tracks = remote.tracks.len();
                self.notify(CallUpdate::RemoteMedia { tracks });
            }
            LinkEvent::State(LinkState::Failed) => {
                log::warn!("Peer link failed");
                let to = session.remote_id.clone();
                self.notify(CallUpdate::Failed("peer connection failed".to_string()));
                if let Err(e) = self.hub.emit(SignalEvent::EndCall { to }) {
                    log::warn!("Failed to send hangup: {}", e);
                }
                self.end_session(EndReason::RemoteFailed("peer connection failed".to_string()))
                    .await;
            }
            LinkEvent::State(state) => log::debug!("Peer link state {:?}", state),
        }
    }

    fn on_tick(&mut self) {
        let Some(session) = self.session.as_mut() else {
            self.ticker = None;
            return;
        };
        if session.status != CallStatus::Connected {
            return;
        }
        session.elapsed_secs += 1;
        let elapsed = session.elapsed_secs;
        self.notify(CallUpdate::Elapsed(elapsed));
    }

    async fn on_ring_timeout(&mut self) {
        self.ring_deadline = None;
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.status != CallStatus::Outgoing {
            return;
        }

        log::info!("No answer from {}, giving up", session.remote_id);
        let to = session.remote_id.clone();
        if let Err(e) = self.hub.emit(SignalEvent::EndCall { to }) {
            log::warn!("Failed to send hangup: {}", e);
        }
        self.end_session(EndReason::Timeout).await;
    }

    async fn fail_negotiation(&mut self, error: Error) {
        log::warn!("Negotiation failed: {}", error);
        if let Some(session) = self.session.as_ref() {
            let to = session.remote_id.clone();
            if let Err(e) = self.hub.emit(SignalEvent::EndCall { to }) {
                log::warn!("Failed to send hangup: {}", e);
            }
        }
        self.notify(CallUpdate::Failed(error.to_string()));
        let reason = match error {
            Error::Signaling(msg) => EndReason::SignalingFailed(msg),
            Error::NotConnected => EndReason::SignalingFailed("not connected".to_string()),
            other => EndReason::RemoteFailed(other.to_string()),
        };
        self.end_session(reason).await;
    }

    /// `ended -> idle`: the single teardown path for every exit.
    async fn end_session(&mut self, reason: EndReason) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        // Late setup results for this session are now stale.
        self.epoch += 1;
        self.ticker = None;
        self.ring_deadline = None;
        self.set_ringing(false);

        session.status = CallStatus::Ended;
        self.notify(CallUpdate::Status(CallStatus::Ended));
        let summary = session.summary(reason);
        log::info!(
            "Call {} with {} ended after {}s: {:?}",
            summary.call_id,
            summary.remote_id,
            summary.duration_secs,
            summary.reason
        );

        session.release().await;
        self.notify(CallUpdate::Ended(summary));
        self.notify(CallUpdate::Status(CallStatus::Idle));
    }

    // ============= Helpers =============

    fn is_from_remote(&self, from: Option<&str>) -> bool {
        match (self.session.as_ref(), from) {
            (Some(session), Some(from)) => session.remote_id == from,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn set_ringing(&mut self, ringing: bool) {
        if self.ringing != ringing {
            self.ringing = ringing;
            self.notify(CallUpdate::Ringing(ringing));
        }
    }

    fn notify(&self, update: CallUpdate) {
        let _ = self.updates.send(update);
    }
}

impl Drop for CallController {
    fn drop(&mut self) {
        if let Some(session) = self.session.as_ref() {
            log::warn!("Call controller dropped with call {} in progress", session.call_id);
        }
    }
}

/// Apply a remote description, then replay candidates buffered before it.
async fn apply_remote(session: &mut CallSession, desc: SessionDescription) -> Result<()> {
    let link = session.peer_link().ok_or(Error::NoActiveCall)?;
    link.set_remote_description(desc).await?;

    let pending = std::mem::take(&mut session.pending_candidates);
    session.remote_applied = true;
    let link = session.peer_link().ok_or(Error::NoActiveCall)?;
    for candidate in pending {
        if let Err(e) = link.add_ice_candidate(candidate).await {
            log::warn!("Failed to add buffered candidate: {}", e);
        }
    }
    Ok(())
}

async fn recv_or_pending<T>(rx: Option<&mut mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}

async fn tick_or_pending(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => pending().await,
    }
}

async fn sleep_or_pending(deadline: Option<&mut Pin<Box<Sleep>>>) {
    match deadline {
        Some(deadline) => deadline.as_mut().await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{LocalMedia, PeerLink};
    use async_trait::async_trait;

    struct NoMedia;

    #[async_trait]
    impl MediaBackend for NoMedia {
        async fn acquire_local(&self, _kind: CallKind) -> Result<LocalMedia> {
            Err(Error::CapabilityDenied("no devices".to_string()))
        }

        async fn open_link(
            &self,
            _local: &LocalMedia,
            _events: mpsc::UnboundedSender<LinkEvent>,
        ) -> Result<Box<dyn PeerLink>> {
            unreachable!("acquire always fails")
        }
    }

    fn controller(hub: Arc<SignalingHub>) -> (CallController, mpsc::UnboundedReceiver<CallUpdate>) {
        CallController::new("u1", "Ann", hub, Arc::new(NoMedia), CallConfig::default())
    }

    #[tokio::test]
    async fn test_start_call_requires_connection() {
        let hub = Arc::new(SignalingHub::new());
        let (mut calls, _updates) = controller(hub);

        assert!(matches!(
            calls.start_call("u2", CallKind::Audio).await,
            Err(Error::NotConnected)
        ));
        assert_eq!(calls.status(), CallStatus::Idle);
    }

    #[tokio::test]
    async fn test_actions_without_call() {
        let hub = Arc::new(SignalingHub::new());
        let (mut calls, _updates) = controller(hub);

        assert!(matches!(calls.accept().await, Err(Error::NoActiveCall)));
        assert!(matches!(calls.reject().await, Err(Error::NoActiveCall)));
        assert!(matches!(calls.hangup().await, Err(Error::NoActiveCall)));
    }

    #[tokio::test]
    async fn test_denied_media_aborts_outgoing_call() {
        let hub = Arc::new(SignalingHub::new());
        let (tx, mut sent) = mpsc::unbounded_channel();
        hub.bind(tx);
        let (mut calls, mut updates) = controller(hub);

        calls.start_call("u2", CallKind::Video).await.unwrap();
        assert_eq!(calls.status(), CallStatus::Outgoing);
        assert!(matches!(calls.accept().await, Err(Error::InvalidTransition { .. })));

        let input = calls.next_input().await;
        assert!(matches!(input, ControllerInput::Setup(_)));
        calls.handle_input(input).await;
        assert_eq!(calls.status(), CallStatus::Idle);

        assert!(matches!(sent.try_recv().unwrap(), SignalEvent::CallUser(_)));
        assert_eq!(sent.try_recv().unwrap(), SignalEvent::EndCall { to: "u2".into() });

        let mut saw_failure = false;
        let mut summary = None;
        while let Ok(update) = updates.try_recv() {
            match update {
                CallUpdate::Failed(msg) => saw_failure = msg.contains("no devices"),
                CallUpdate::Ended(s) => summary = Some(s),
                _ => {}
            }
        }
        assert!(saw_failure);
        let summary = summary.unwrap();
        assert!(!summary.was_connected);
        assert_eq!(summary.reason, EndReason::CapabilityDenied("no devices".into()));
    }

    #[tokio::test]
    async fn test_busy_controller_declines_second_caller() {
        let hub = Arc::new(SignalingHub::new());
        let (tx, mut sent) = mpsc::unbounded_channel();
        hub.bind(tx);
        let (mut calls, _updates) = controller(hub);

        calls.start_call("u2", CallKind::Audio).await.unwrap();
        let _ = sent.try_recv();

        calls
            .handle_signal(SignalEvent::CallUser(CallRequest {
                user_to_call: "u1".into(),
                from: "u3".into(),
                name: "Cy".into(),
                call_type: CallKind::Audio,
            }))
            .await;

        assert_eq!(sent.try_recv().unwrap(), SignalEvent::RejectCall { to: "u3".into() });
        assert_eq!(calls.session().unwrap().remote_id(), "u2");
    }
}
