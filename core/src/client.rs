//! Chat client: one event loop over user commands, the call controller and
//! the chat view.

use crate::api::{CallRecord, ChatBackend, StoredMessage};
use crate::call::{CallController, CallUpdate};
use crate::chat::{ChatView, Draft, Pane, Received};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::media::MediaBackend;
use crate::models::{CallKind, Message, Notification, User};
use crate::signaling::{LinkWatch, SignalEvent, SignalingHub};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Open(String),
    Back,
    Send(String),
    Call { peer: String, kind: CallKind },
    Accept,
    Reject,
    Hangup,
    Contacts,
    Notifications,
    SetCompact(bool),
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cue {
    Message { from: String, text: String },
    Ring(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientUpdate {
    Call(CallUpdate),
    Conversation { counterpart_id: String, messages: Vec<Message> },
    Message { counterpart_id: String, message: Message },
    Unread { counterpart_id: String, count: u32, total: u32 },
    Cue(Cue),
    Pane(Pane),
    Contacts(Vec<User>),
    Notifications(Vec<Notification>),
    Error(String),
}

// ============================================================================
// Backend requests
// ============================================================================

/// Backend work handed off the event loop.
enum Request {
    History { counterpart_id: String, chat_id: String },
    Save(Draft),
    RecordCall(CallRecord),
    Contacts(String),
    Notifications,
}

/// Result of a [`Request`], fed back into the event loop.
enum Completion {
    History {
        counterpart_id: String,
        chat_id: String,
        result: Result<Vec<StoredMessage>>,
    },
    Saved {
        draft: Draft,
        result: Result<StoredMessage>,
    },
    Contacts(Result<Vec<User>>),
    Notifications(Result<Vec<Notification>>),
}

/// Serve requests one at a time so saves reach the backend in send order.
async fn serve_requests(
    backend: Arc<dyn ChatBackend>,
    mut requests: mpsc::UnboundedReceiver<Request>,
    completions: mpsc::UnboundedSender<Completion>,
) {
    while let Some(request) = requests.recv().await {
        let completion = match request {
            Request::History { counterpart_id, chat_id } => {
                let result = backend.fetch_history(&chat_id).await;
                Completion::History {
                    counterpart_id,
                    chat_id,
                    result,
                }
            }
            Request::Save(draft) => {
                let result = backend.create_message(&draft.message).await;
                Completion::Saved { draft, result }
            }
            Request::RecordCall(record) => {
                if let Err(e) = backend.record_call(&record).await {
                    log::warn!("Failed to record call to {}: {}", record.receiver_id, e);
                }
                continue;
            }
            Request::Contacts(user_id) => Completion::Contacts(backend.fetch_following(&user_id).await),
            Request::Notifications => Completion::Notifications(backend.fetch_notifications().await),
        };
        if completions.send(completion).is_err() {
            break;
        }
    }
}

// ============================================================================
// Client
// ============================================================================

pub struct ChatClient {
    config: AppConfig,
    hub: Arc<SignalingHub>,
    backend: Arc<dyn ChatBackend>,
    calls: CallController,
    call_updates: mpsc::UnboundedReceiver<CallUpdate>,
    chat: ChatView,
    link: LinkWatch,
    requests: mpsc::UnboundedSender<Request>,
    pending: Option<mpsc::UnboundedReceiver<Request>>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    updates: mpsc::UnboundedSender<ClientUpdate>,
}

impl ChatClient {
    pub fn new(
        config: AppConfig,
        hub: Arc<SignalingHub>,
        backend: Arc<dyn ChatBackend>,
        media: Arc<dyn MediaBackend>,
    ) -> (Self, mpsc::UnboundedReceiver<ClientUpdate>) {
        let identity = &config.identity;
        let (calls, call_updates) = CallController::new(
            &identity.user_id,
            &identity.display_name,
            hub.clone(),
            media,
            config.call.clone(),
        );
        let chat = ChatView::new(&identity.user_id, backend.clone(), hub.clone(), config.ui.compact);
        let link = hub.link_watch();
        let (requests, pending) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (updates, updates_rx) = mpsc::unbounded_channel();

        let client = Self {
            config,
            hub,
            backend,
            calls,
            call_updates,
            chat,
            link,
            requests,
            pending: Some(pending),
            completions_tx,
            completions,
            updates,
        };
        (client, updates_rx)
    }

    /// Open the signaling connection for the configured identity.
    pub async fn connect(&self) -> Result<()> {
        self.hub
            .connect(
                &self.config.ws_url(),
                self.config.identity.token.as_deref(),
                &self.config.identity.user_id,
            )
            .await
    }

    pub fn calls(&self) -> &CallController {
        &self.calls
    }

    pub fn chat(&self) -> &ChatView {
        &self.chat
    }

    /// Run until `Quit` or until the command channel closes, then end any
    /// call and disconnect.
    ///
    /// Backend requests run on a worker task; their results come back as
    /// loop inputs, so a slow backend never holds up signaling or calls.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<ClientCommand>) -> Result<()> {
        log::info!("Client loop started for {}", self.config.identity.user_id);
        let worker = self.start_worker();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(ClientCommand::Quit) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                input = self.calls.next_input() => self.calls.handle_input(input).await,
                event = self.chat.next_event() => match event {
                    Some(event) => self.on_chat_event(event),
                    None => {
                        log::warn!("Signaling hub closed");
                        break;
                    }
                },
                Some(update) = self.call_updates.recv() => self.on_call_update(update),
                Some(completion) = self.completions.recv() => self.on_completion(completion),
                _ = self.link.lost() => {
                    log::warn!("Relay connection lost");
                    self.send(ClientUpdate::Error("connection to the relay was lost".to_string()));
                }
            }
        }

        if let Some(worker) = worker {
            worker.abort();
        }
        self.calls.shutdown().await;
        while let Ok(update) = self.call_updates.try_recv() {
            self.on_call_update(update);
        }
        self.hub.disconnect();
        log::info!("Client loop stopped");
        Ok(())
    }

    fn start_worker(&mut self) -> Option<JoinHandle<()>> {
        let requests = self.pending.take()?;
        Some(tokio::spawn(serve_requests(
            self.backend.clone(),
            requests,
            self.completions_tx.clone(),
        )))
    }

    /// Apply a user command. Backend work is queued, not awaited.
    pub async fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Open(counterpart_id) => self.open(counterpart_id),
            ClientCommand::Back => {
                self.chat.show_list();
                self.send(ClientUpdate::Pane(self.chat.pane()));
            }
            ClientCommand::Send(text) => match self.chat.draft(&text) {
                Ok(Some(draft)) => self.request(Request::Save(draft)),
                Ok(None) => {}
                Err(e) => self.report(e),
            },
            ClientCommand::Call { peer, kind } => self.call(peer, kind).await,
            ClientCommand::Accept => {
                if let Err(e) = self.calls.accept().await {
                    self.report(e);
                }
            }
            ClientCommand::Reject => {
                if let Err(e) = self.calls.reject().await {
                    self.report(e);
                }
            }
            ClientCommand::Hangup => {
                if let Err(e) = self.calls.hangup().await {
                    self.report(e);
                }
            }
            ClientCommand::Contacts => {
                self.request(Request::Contacts(self.config.identity.user_id.clone()))
            }
            ClientCommand::Notifications => self.request(Request::Notifications),
            ClientCommand::SetCompact(compact) => {
                self.chat.set_compact(compact);
                self.send(ClientUpdate::Pane(self.chat.pane()));
            }
            ClientCommand::Quit => {}
        }
    }

    fn open(&mut self, counterpart_id: String) {
        let chat_id = match self.chat.select(&counterpart_id) {
            Ok(chat_id) => chat_id,
            Err(e) => {
                self.report(e);
                return;
            }
        };

        self.send(ClientUpdate::Unread {
            counterpart_id: counterpart_id.clone(),
            count: 0,
            total: self.chat.total_unread(),
        });
        self.send(ClientUpdate::Pane(self.chat.pane()));
        self.request(Request::History {
            counterpart_id,
            chat_id,
        });
    }

    async fn call(&mut self, peer: String, kind: CallKind) {
        if let Err(e) = self.calls.start_call(&peer, kind).await {
            self.report(e);
            return;
        }

        self.request(Request::RecordCall(CallRecord {
            caller_id: self.config.identity.user_id.clone(),
            receiver_id: peer,
            call_type: kind,
        }));
    }

    fn request(&self, request: Request) {
        if self.requests.send(request).is_err() {
            log::warn!("Backend worker stopped, request dropped");
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::History {
                counterpart_id,
                chat_id,
                result,
            } => {
                let (messages, error) = match result {
                    Ok(history) => match self.chat.load_history(&chat_id, history) {
                        Some(messages) => (messages.to_vec(), None),
                        None => {
                            log::debug!("Selection left {}, history dropped", chat_id);
                            return;
                        }
                    },
                    Err(e) => {
                        log::warn!("Failed to load history for {}: {}", chat_id, e);
                        if !self.is_active(&chat_id) {
                            return;
                        }
                        (Vec::new(), Some(e))
                    }
                };
                self.send(ClientUpdate::Conversation {
                    counterpart_id,
                    messages,
                });
                if let Some(e) = error {
                    self.report(e);
                }
            }
            Completion::Saved { draft, result } => match result {
                Ok(stored) => {
                    let counterpart_id = draft.counterpart_id.clone();
                    let shown = self.is_active(&draft.message.chat_id);
                    let message = self.chat.commit(draft, stored);
                    if shown {
                        self.send(ClientUpdate::Message {
                            counterpart_id,
                            message,
                        });
                    }
                }
                Err(e) => {
                    log::warn!("Failed to save message in {}: {}", draft.message.chat_id, e);
                    self.report(Error::Persistence(e.to_string()));
                }
            },
            Completion::Contacts(result) => match result {
                Ok(contacts) => {
                    let contacts = self.chat.set_contacts(contacts).to_vec();
                    self.send(ClientUpdate::Contacts(contacts));
                }
                Err(e) => self.report(e),
            },
            Completion::Notifications(result) => match result {
                Ok(list) => self.send(ClientUpdate::Notifications(list)),
                Err(e) => self.report(e),
            },
        }
    }

    fn is_active(&self, chat_id: &str) -> bool {
        self.chat.active().map_or(false, |a| a.chat_id == chat_id)
    }

    fn on_chat_event(&mut self, event: SignalEvent) {
        let Some(delivery) = self.chat.handle_signal(event) else {
            return;
        };

        let cue_text = match &delivery.received {
            Received::Appended(message) => {
                let text = message.text.clone();
                if let Some(counterpart_id) = delivery.counterpart_id.clone() {
                    self.send(ClientUpdate::Message {
                        counterpart_id,
                        message: message.clone(),
                    });
                }
                Some(text)
            }
            Received::Elsewhere { counterpart_id, unread } => {
                self.send(ClientUpdate::Unread {
                    counterpart_id: counterpart_id.clone(),
                    count: *unread,
                    total: self.chat.total_unread(),
                });
                self.chat.preview(counterpart_id).map(|p| p.text.clone())
            }
            Received::Duplicate | Received::Ignored => None,
        };

        if delivery.play_cue && self.config.notifications.enabled {
            if let (Some(from), Some(text)) = (delivery.counterpart_id, cue_text) {
                self.send(ClientUpdate::Cue(Cue::Message { from, text }));
            }
        }
    }

    fn on_call_update(&mut self, update: CallUpdate) {
        if let CallUpdate::Ringing(ringing) = update {
            self.send(ClientUpdate::Cue(Cue::Ring(ringing)));
        }
        self.send(ClientUpdate::Call(update));
    }

    fn report(&self, error: Error) {
        log::warn!("{}", error);
        if error.is_user_visible() {
            self.send(ClientUpdate::Error(error.to_string()));
        }
    }

    fn send(&self, update: ClientUpdate) {
        let _ = self.updates.send(update);
    }
}
