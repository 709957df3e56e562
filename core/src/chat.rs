//! Chat conversation view
//!
//! Keeps the selected conversation, unread counters and previews for every
//! counterpart, and reconciles fetched history with relayed messages.

use crate::api::{ChatBackend, NewMessage, StoredMessage};
use crate::error::{Error, Result};
use crate::models::{counterpart_of, pairing_id, Message, Preview, SenderRole, User};
use crate::signaling::{EventKind, RelayedMessage, SignalEvent, SignalingHub, Subscription};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    List,
    Messages,
}

/// The open conversation.
#[derive(Debug, Clone)]
pub struct ActiveConversation {
    pub counterpart_id: String,
    pub chat_id: String,
    messages: Vec<Message>,
    seen: HashSet<String>,
}

impl ActiveConversation {
    fn new(counterpart_id: &str, chat_id: String) -> Self {
        Self {
            counterpart_id: counterpart_id.to_string(),
            chat_id,
            messages: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append unless a message with the same id is already shown.
    fn push(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Shown in the open conversation.
    Appended(Message),
    /// Already shown; dropped.
    Duplicate,
    /// Belongs to another conversation. `unread` is that counterpart's
    /// counter after the message was counted.
    Elsewhere { counterpart_id: String, unread: u32 },
    /// Not addressed to a conversation of the local user.
    Ignored,
}

/// A message accepted for sending, waiting to be persisted.
#[derive(Debug, Clone)]
pub struct Draft {
    pub counterpart_id: String,
    pub message: NewMessage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Other participant of the message's conversation.
    pub counterpart_id: Option<String>,
    pub received: Received,
    pub play_cue: bool,
}

pub struct ChatView {
    local_id: String,
    backend: Arc<dyn ChatBackend>,
    hub: Arc<SignalingHub>,
    subscription: Subscription,
    active: Option<ActiveConversation>,
    unread: HashMap<String, u32>,
    previews: HashMap<String, Preview>,
    contacts: Vec<User>,
    compact: bool,
    pane: Pane,
}

impl ChatView {
    pub fn new(local_id: &str, backend: Arc<dyn ChatBackend>, hub: Arc<SignalingHub>, compact: bool) -> Self {
        let subscription = hub.subscribe(&[EventKind::ReceiveMessage]);
        Self {
            local_id: local_id.to_string(),
            backend,
            hub,
            subscription,
            active: None,
            unread: HashMap::new(),
            previews: HashMap::new(),
            contacts: Vec::new(),
            compact,
            pane: Pane::List,
        }
    }

    // ============= Selection =============

    /// Select the conversation with `counterpart_id` and load its history.
    ///
    /// The selection changes even when the fetch fails; it then shows an
    /// empty list and the error is returned.
    pub async fn open(&mut self, counterpart_id: &str) -> Result<&[Message]> {
        let chat_id = self.select(counterpart_id)?;
        let history = match self.backend.fetch_history(&chat_id).await {
            Ok(history) => history,
            Err(e) => {
                log::warn!("Failed to load history for {}: {}", chat_id, e);
                return Err(e);
            }
        };
        self.load_history(&chat_id, history).ok_or(Error::NoConversation)
    }

    /// Switch the selection without fetching; returns the pairing id.
    pub fn select(&mut self, counterpart_id: &str) -> Result<String> {
        if counterpart_id.is_empty() {
            return Err(Error::NoConversation);
        }

        let chat_id = pairing_id(&self.local_id, counterpart_id);
        self.active = Some(ActiveConversation::new(counterpart_id, chat_id.clone()));
        self.unread.insert(counterpart_id.to_string(), 0);
        if self.compact {
            self.pane = Pane::Messages;
        }
        Ok(chat_id)
    }

    /// Merge fetched history into the open conversation. `None` if the
    /// selection has since moved away from `chat_id`.
    pub fn load_history(&mut self, chat_id: &str, history: Vec<StoredMessage>) -> Option<&[Message]> {
        let local_id = &self.local_id;
        let active = self.active.as_mut().filter(|a| a.chat_id == chat_id)?;
        for stored in history {
            active.push(stored.into_message(local_id));
        }
        // Relayed messages may have arrived while the fetch was running.
        active.messages.sort_by_key(|m| m.timestamp);

        if let Some(last) = active.messages.last() {
            self.previews.insert(
                active.counterpart_id.clone(),
                Preview {
                    text: last.text.clone(),
                    timestamp: last.timestamp,
                },
            );
        }
        log::debug!("Opened {} with {} messages", chat_id, active.messages.len());
        Some(&active.messages)
    }

    pub fn show_list(&mut self) {
        self.pane = Pane::List;
    }

    pub fn set_compact(&mut self, compact: bool) {
        self.compact = compact;
        self.pane = if compact && self.active.is_none() {
            Pane::List
        } else {
            Pane::Messages
        };
    }

    // ============= Messages =============

    pub fn receive(&mut self, message: RelayedMessage) -> Delivery {
        let counterpart_id = match self.active.as_ref().filter(|a| a.chat_id == message.chat_id) {
            Some(active) => Some(active.counterpart_id.clone()),
            None => counterpart_of(&message.chat_id, &self.local_id),
        };
        let Some(counterpart_id) = counterpart_id else {
            log::debug!("Ignoring message for foreign chat {}", message.chat_id);
            return Delivery {
                counterpart_id: None,
                received: Received::Ignored,
                play_cue: false,
            };
        };

        let sender = SenderRole::of(&message.user_id, &self.local_id);
        let msg = Message {
            id: message.id,
            text: message.text,
            timestamp: message.timestamp,
            sender,
        };

        let in_active = self
            .active
            .as_ref()
            .map_or(false, |a| a.chat_id == message.chat_id);

        let received = if in_active {
            let appended = self
                .active
                .as_mut()
                .map_or(false, |active| active.push(msg.clone()));
            if !appended {
                log::debug!("Dropping duplicate message {}", msg.id);
                return Delivery {
                    counterpart_id: Some(counterpart_id),
                    received: Received::Duplicate,
                    play_cue: false,
                };
            }
            Received::Appended(msg.clone())
        } else {
            let count = self.unread.entry(counterpart_id.clone()).or_insert(0);
            if sender == SenderRole::Peer {
                *count += 1;
            }
            Received::Elsewhere {
                counterpart_id: counterpart_id.clone(),
                unread: *count,
            }
        };

        self.previews.insert(
            counterpart_id.clone(),
            Preview {
                text: msg.text.clone(),
                timestamp: msg.timestamp,
            },
        );

        Delivery {
            counterpart_id: Some(counterpart_id),
            received,
            play_cue: sender == SenderRole::Peer,
        }
    }

    /// Persist `text` in the open conversation, show it, then relay it.
    ///
    /// Blank text is ignored (`Ok(None)`).
    pub async fn send(&mut self, text: &str) -> Result<Option<Message>> {
        let Some(draft) = self.draft(text)? else {
            return Ok(None);
        };
        let stored = self.backend.create_message(&draft.message).await.map_err(|e| {
            log::warn!("Failed to save message in {}: {}", draft.message.chat_id, e);
            Error::Persistence(e.to_string())
        })?;
        Ok(Some(self.commit(draft, stored)))
    }

    /// Prepare `text` for the open conversation. Blank text gives `Ok(None)`.
    pub fn draft(&self, text: &str) -> Result<Option<Draft>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let active = self.active.as_ref().ok_or(Error::NoConversation)?;
        Ok(Some(Draft {
            counterpart_id: active.counterpart_id.clone(),
            message: NewMessage {
                chat_id: active.chat_id.clone(),
                sender_id: self.local_id.clone(),
                text: text.to_string(),
            },
        }))
    }

    /// Show a persisted draft and relay it.
    pub fn commit(&mut self, draft: Draft, stored: StoredMessage) -> Message {
        let Draft {
            counterpart_id,
            message: draft,
        } = draft;
        let chat_id = draft.chat_id;
        let message = Message {
            id: stored.id,
            text: draft.text,
            timestamp: stored.created_at.timestamp_millis(),
            sender: SenderRole::Me,
        };

        // The selection may have moved while the message was being saved.
        if let Some(active) = self.active.as_mut().filter(|a| a.chat_id == chat_id) {
            active.push(message.clone());
        }
        self.previews.insert(
            counterpart_id,
            Preview {
                text: message.text.clone(),
                timestamp: message.timestamp,
            },
        );

        let relay = RelayedMessage {
            id: message.id.clone(),
            chat_id,
            user_id: self.local_id.clone(),
            text: message.text.clone(),
            timestamp: message.timestamp,
        };
        if let Err(e) = self.hub.emit(SignalEvent::SendMessage(relay)) {
            log::warn!("Message {} saved but not relayed: {}", message.id, e);
        }

        message
    }

    // ============= Event loop =============

    /// Next relayed message event; `None` once the hub is gone.
    pub async fn next_event(&mut self) -> Option<SignalEvent> {
        self.subscription.recv().await
    }

    pub fn handle_signal(&mut self, event: SignalEvent) -> Option<Delivery> {
        match event {
            SignalEvent::ReceiveMessage(message) => Some(self.receive(message)),
            other => {
                log::debug!("Chat view ignores {}", other.kind().name());
                None
            }
        }
    }

    // ============= Contacts =============

    pub async fn load_contacts(&mut self) -> Result<&[User]> {
        let contacts = self.backend.fetch_following(&self.local_id).await?;
        Ok(self.set_contacts(contacts))
    }

    pub fn set_contacts(&mut self, contacts: Vec<User>) -> &[User] {
        for contact in &contacts {
            self.unread.entry(contact.user_id.clone()).or_insert(0);
        }
        self.contacts = contacts;
        &self.contacts
    }

    // ============= Queries =============

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn pane(&self) -> Pane {
        self.pane
    }

    pub fn is_compact(&self) -> bool {
        self.compact
    }

    pub fn active(&self) -> Option<&ActiveConversation> {
        self.active.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        self.active.as_ref().map(|a| a.messages()).unwrap_or(&[])
    }

    pub fn unread(&self, counterpart_id: &str) -> u32 {
        self.unread.get(counterpart_id).copied().unwrap_or(0)
    }

    pub fn total_unread(&self) -> u32 {
        self.unread.values().sum()
    }

    pub fn preview(&self, counterpart_id: &str) -> Option<&Preview> {
        self.previews.get(counterpart_id)
    }

    pub fn contacts(&self) -> &[User] {
        &self.contacts
    }
}
