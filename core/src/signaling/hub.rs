//! Process-wide signaling connection shared by every component.

use super::events::{EventKind, SignalEvent};
use super::ws;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::pending;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

const INBOUND_CAPACITY: usize = 1024;

pub struct SignalingHub {
    outbound: Mutex<Option<mpsc::UnboundedSender<SignalEvent>>>,
    inbound: broadcast::Sender<SignalEvent>,
    link: Arc<watch::Sender<bool>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    listeners: Arc<Mutex<HashMap<EventKind, usize>>>,
}

impl Default for SignalingHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalingHub {
    pub fn new() -> Self {
        let (inbound, _) = broadcast::channel(INBOUND_CAPACITY);
        let (link, _) = watch::channel(false);
        Self {
            outbound: Mutex::new(None),
            inbound,
            link: Arc::new(link),
            tasks: Mutex::new(Vec::new()),
            listeners: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Open the WebSocket relay connection and announce presence.
    pub async fn connect(&self, url: &str, token: Option<&str>, user_id: &str) -> Result<()> {
        if self.is_connected() {
            self.disconnect();
        }
        self.abort_tasks();

        let link = ws::open(url, token, self.inbound.clone(), self.link.clone()).await?;
        *self.tasks.lock() = link.tasks;
        self.bind(link.sender);

        log::info!("Signaling connected to {} as {}", url, user_id);
        self.emit(SignalEvent::UserOnline(user_id.to_string()))
    }

    /// Attach an outbound sink directly. Used by the WebSocket transport
    /// and by in-process relays.
    pub fn bind(&self, sender: mpsc::UnboundedSender<SignalEvent>) {
        *self.outbound.lock() = Some(sender);
        set_link(&self.link, true);
    }

    pub fn disconnect(&self) {
        self.outbound.lock().take();
        self.abort_tasks();
        set_link(&self.link, false);
        log::info!("Signaling disconnected");
    }

    pub fn is_connected(&self) -> bool {
        *self.link.borrow() && self.outbound.lock().as_ref().map_or(false, |tx| !tx.is_closed())
    }

    /// Watch for the relay link going down.
    pub fn link_watch(&self) -> LinkWatch {
        LinkWatch {
            state: Some(self.link.subscribe()),
        }
    }

    pub fn emit(&self, event: SignalEvent) -> Result<()> {
        if !*self.link.borrow() {
            return Err(Error::NotConnected);
        }
        let guard = self.outbound.lock();
        let sender = guard.as_ref().ok_or(Error::NotConnected)?;
        log::debug!("emit {}", event.kind().name());
        sender
            .send(event)
            .map_err(|e| Error::Signaling(format!("relay closed, dropped {}", e.0.kind().name())))
    }

    /// Hand an event received from the relay to every matching subscription.
    pub fn deliver(&self, event: SignalEvent) {
        // No receivers is fine: nobody is listening for that event yet.
        let _ = self.inbound.send(event);
    }

    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        {
            let mut listeners = self.listeners.lock();
            for kind in kinds {
                *listeners.entry(*kind).or_insert(0) += 1;
            }
        }

        Subscription {
            receiver: self.inbound.subscribe(),
            kinds: kinds.to_vec(),
            listeners: self.listeners.clone(),
        }
    }

    /// Live subscriptions registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.lock().get(&kind).copied().unwrap_or(0)
    }

    fn abort_tasks(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for SignalingHub {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// Record the link state, waking watchers only on a change.
pub(crate) fn set_link(link: &watch::Sender<bool>, up: bool) {
    link.send_if_modified(|state| {
        let changed = *state != up;
        *state = up;
        changed
    });
}

pub struct LinkWatch {
    state: Option<watch::Receiver<bool>>,
}

impl LinkWatch {
    /// Resolves when the link goes from up to down. Never resolves once the
    /// hub is dropped.
    pub async fn lost(&mut self) {
        loop {
            let Some(state) = self.state.as_mut() else {
                return pending().await;
            };
            if state.changed().await.is_err() {
                self.state = None;
                continue;
            }
            if !*state.borrow_and_update() {
                return;
            }
        }
    }
}

/// Listener registration for a set of event kinds; deregisters on drop.
pub struct Subscription {
    receiver: broadcast::Receiver<SignalEvent>,
    kinds: Vec<EventKind>,
    listeners: Arc<Mutex<HashMap<EventKind, usize>>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<SignalEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.kinds.contains(&event.kind()) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Subscription lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<SignalEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.kinds.contains(&event.kind()) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    log::warn!("Subscription lagged, {} events skipped", skipped);
                }
                Err(_) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut listeners = self.listeners.lock();
        for kind in &self.kinds {
            if let Some(count) = listeners.get_mut(kind) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    listeners.remove(kind);
                }
            }
        }
    }
}
