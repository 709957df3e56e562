//! Console output, desktop notifications and audio cues

use chatlink_core::config::NotificationConfig;
use chatlink_core::{CallStatus, CallUpdate, ClientUpdate, Cue, EndReason, Message, Pane};
use std::io::Write;
use tokio::sync::mpsc;

pub struct Renderer {
    notifications: NotificationConfig,
}

impl Renderer {
    pub fn new(notifications: NotificationConfig) -> Self {
        Self { notifications }
    }

    pub async fn run(self, mut updates: mpsc::UnboundedReceiver<ClientUpdate>) {
        while let Some(update) = updates.recv().await {
            match &update {
                ClientUpdate::Cue(cue) => self.play(cue),
                other => {
                    for line in describe(other) {
                        println!("{}", line);
                    }
                }
            }
        }
    }

    fn play(&self, cue: &Cue) {
        match cue {
            Cue::Message { from, text } => {
                if self.notifications.enabled {
                    notify_rust::Notification::new()
                        .summary(&format!("Message from {}", from))
                        .body(text)
                        .show()
                        .ok();
                }
                if self.notifications.sound {
                    bell();
                }
            }
            Cue::Ring(true) => {
                println!("*** ringing ***");
                if self.notifications.sound {
                    bell();
                }
            }
            Cue::Ring(false) => {}
        }
    }
}

fn bell() {
    print!("\x07");
    std::io::stdout().flush().ok();
}

pub fn describe(update: &ClientUpdate) -> Vec<String> {
    match update {
        ClientUpdate::Conversation {
            counterpart_id,
            messages,
        } => {
            let mut lines = vec![format!("== {} ({} messages) ==", counterpart_id, messages.len())];
            lines.extend(messages.iter().map(|m| format_message(counterpart_id, m)));
            lines
        }
        ClientUpdate::Message {
            counterpart_id,
            message,
        } => vec![format_message(counterpart_id, message)],
        ClientUpdate::Unread {
            counterpart_id,
            count,
            total,
        } => {
            if *count == 0 {
                vec![]
            } else {
                vec![format!("({} unread from {}, {} total)", count, counterpart_id, total)]
            }
        }
        ClientUpdate::Pane(Pane::List) => vec!["== conversations ==".to_string()],
        ClientUpdate::Pane(Pane::Messages) => vec![],
        ClientUpdate::Contacts(users) => {
            if users.is_empty() {
                return vec!["(not following anyone)".to_string()];
            }
            users
                .iter()
                .map(|u| format!("  {}  @{}", u.user_id, u.username))
                .collect()
        }
        ClientUpdate::Notifications(list) => {
            if list.is_empty() {
                return vec!["(no notifications)".to_string()];
            }
            list.iter()
                .map(|n| {
                    let mark = if n.read { " " } else { "*" };
                    format!(
                        "{} {} {} {}",
                        mark,
                        format_timestamp(n.created_at.timestamp_millis()),
                        n.kind,
                        n.text.as_deref().unwrap_or(&n.from_user)
                    )
                })
                .collect()
        }
        ClientUpdate::Call(call) => describe_call(call).into_iter().collect(),
        ClientUpdate::Error(message) => vec![format!("error: {}", message)],
        ClientUpdate::Cue(_) => vec![],
    }
}

fn describe_call(update: &CallUpdate) -> Option<String> {
    match update {
        CallUpdate::Incoming { from, name, kind } => {
            let who = if name.is_empty() { from.clone() } else { format!("{} ({})", name, from) };
            Some(format!("Incoming {} call from {}. /accept or /reject", kind.as_str(), who))
        }
        CallUpdate::Status(CallStatus::Outgoing) => Some("Calling...".to_string()),
        CallUpdate::Status(CallStatus::Connected) => Some("Call connected".to_string()),
        CallUpdate::Status(_) => None,
        CallUpdate::Elapsed(secs) if *secs > 0 && secs % 10 == 0 => {
            Some(format!("In call {}", format_duration(*secs as i64)))
        }
        CallUpdate::Elapsed(_) => None,
        CallUpdate::RemoteMedia { tracks } => Some(format!("Receiving {} remote track(s)", tracks)),
        CallUpdate::Failed(message) => Some(format!("Call failed: {}", message)),
        CallUpdate::Ended(summary) => {
            let why = match &summary.reason {
                EndReason::LocalHangup => "you hung up".to_string(),
                EndReason::LocalReject => "you declined".to_string(),
                EndReason::RemoteRejected => "declined".to_string(),
                EndReason::RemoteEnded => "the other side hung up".to_string(),
                EndReason::RemoteFailed(msg) => format!("failed: {}", msg),
                EndReason::CapabilityDenied(msg) => format!("no media: {}", msg),
                EndReason::SignalingFailed(msg) => format!("connection lost: {}", msg),
                EndReason::Timeout => "no answer".to_string(),
                EndReason::Shutdown => "client closed".to_string(),
            };
            if summary.was_connected {
                Some(format!(
                    "Call with {} ended after {} ({})",
                    summary.remote_id,
                    format_duration(summary.duration_secs as i64),
                    why
                ))
            } else {
                Some(format!("Call with {} ended ({})", summary.remote_id, why))
            }
        }
        CallUpdate::Ringing(_) => None,
    }
}

fn format_message(counterpart_id: &str, message: &Message) -> String {
    let who = if message.is_outgoing() { "me" } else { counterpart_id };
    format!("[{}] {}: {}", format_timestamp(message.timestamp), who, message.text)
}

pub fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

pub fn format_timestamp(timestamp: i64) -> String {
    use chrono::{Datelike, Local, TimeZone, Utc};

    let Some(dt) = Utc.timestamp_millis_opt(timestamp).single() else {
        return String::new();
    };
    let local = dt.with_timezone(&Local);
    let now = Local::now();

    if local.date_naive() == now.date_naive() {
        local.format("%H:%M").to_string()
    } else if local.date_naive() == (now - chrono::Duration::days(1)).date_naive() {
        "Yesterday".to_string()
    } else if local.year() == now.year() {
        local.format("%d %b").to_string()
    } else {
        local.format("%d.%m.%Y").to_string()
    }
}
