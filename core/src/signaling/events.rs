//! Typed relay events and their JSON frame encoding.
//!
//! Every frame is `{"event": "<name>", "data": <payload>}`. Decoding goes
//! through an untyped [`Frame`] first so that payload-less events tolerate
//! `data` being absent, `null` or `{}`.

use crate::error::{Error, Result};
use crate::models::{CallKind, IceCandidate, SessionDescription};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CallUser,
    CallAccepted,
    CallRejected,
    CallEnded,
    CallFailed,
    AnswerCall,
    RejectCall,
    EndCall,
    Offer,
    Answer,
    IceCandidate,
    SendMessage,
    ReceiveMessage,
    UserOnline,
}

impl EventKind {
    pub const ALL: [EventKind; 14] = [
        EventKind::CallUser,
        EventKind::CallAccepted,
        EventKind::CallRejected,
        EventKind::CallEnded,
        EventKind::CallFailed,
        EventKind::AnswerCall,
        EventKind::RejectCall,
        EventKind::EndCall,
        EventKind::Offer,
        EventKind::Answer,
        EventKind::IceCandidate,
        EventKind::SendMessage,
        EventKind::ReceiveMessage,
        EventKind::UserOnline,
    ];

    /// Events the call controller listens for.
    pub const CALL: [EventKind; 8] = [
        EventKind::CallUser,
        EventKind::CallAccepted,
        EventKind::CallRejected,
        EventKind::CallEnded,
        EventKind::CallFailed,
        EventKind::Offer,
        EventKind::Answer,
        EventKind::IceCandidate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::CallUser => "callUser",
            EventKind::CallAccepted => "callAccepted",
            EventKind::CallRejected => "callRejected",
            EventKind::CallEnded => "callEnded",
            EventKind::CallFailed => "callFailed",
            EventKind::AnswerCall => "answerCall",
            EventKind::RejectCall => "rejectCall",
            EventKind::EndCall => "endCall",
            EventKind::Offer => "offer",
            EventKind::Answer => "answer",
            EventKind::IceCandidate => "ice-candidate",
            EventKind::SendMessage => "sendMessage",
            EventKind::ReceiveMessage => "receiveMessage",
            EventKind::UserOnline => "userOnline",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub user_to_call: String,
    pub from: String,
    #[serde(default)]
    pub name: String,
    pub call_type: CallKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerCall {
    #[serde(default)]
    pub signal: Value,
    pub to: String,
}

/// Negotiation payload: a description or candidate plus routing ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relay<T> {
    pub body: T,
    pub to: Option<String>,
    pub from: Option<String>,
}

impl<T> Relay<T> {
    pub fn to(body: T, to: &str, from: &str) -> Self {
        Self {
            body,
            to: Some(to.to_string()),
            from: Some(from.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayedMessage {
    pub id: String,
    pub chat_id: String,
    pub user_id: String,
    pub text: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalEvent {
    CallUser(CallRequest),
    CallAccepted,
    CallRejected,
    CallEnded,
    CallFailed { message: String },
    AnswerCall(AnswerCall),
    RejectCall { to: String },
    EndCall { to: String },
    Offer(Relay<SessionDescription>),
    Answer(Relay<SessionDescription>),
    IceCandidate(Relay<IceCandidate>),
    SendMessage(RelayedMessage),
    ReceiveMessage(RelayedMessage),
    UserOnline(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct Route {
    to: String,
}

#[derive(Deserialize)]
struct Failure {
    #[serde(default)]
    message: String,
}

impl SignalEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SignalEvent::CallUser(_) => EventKind::CallUser,
            SignalEvent::CallAccepted => EventKind::CallAccepted,
            SignalEvent::CallRejected => EventKind::CallRejected,
            SignalEvent::CallEnded => EventKind::CallEnded,
            SignalEvent::CallFailed { .. } => EventKind::CallFailed,
            SignalEvent::AnswerCall(_) => EventKind::AnswerCall,
            SignalEvent::RejectCall { .. } => EventKind::RejectCall,
            SignalEvent::EndCall { .. } => EventKind::EndCall,
            SignalEvent::Offer(_) => EventKind::Offer,
            SignalEvent::Answer(_) => EventKind::Answer,
            SignalEvent::IceCandidate(_) => EventKind::IceCandidate,
            SignalEvent::SendMessage(_) => EventKind::SendMessage,
            SignalEvent::ReceiveMessage(_) => EventKind::ReceiveMessage,
            SignalEvent::UserOnline(_) => EventKind::UserOnline,
        }
    }

    pub fn encode(&self) -> Result<String> {
        let data = match self {
            SignalEvent::CallUser(req) => serde_json::to_value(req)?,
            SignalEvent::CallAccepted | SignalEvent::CallRejected | SignalEvent::CallEnded => {
                json!({})
            }
            SignalEvent::CallFailed { message } => json!({ "message": message }),
            SignalEvent::AnswerCall(answer) => serde_json::to_value(answer)?,
            SignalEvent::RejectCall { to } | SignalEvent::EndCall { to } => json!({ "to": to }),
            SignalEvent::Offer(relay) => relay_value("offer", relay)?,
            SignalEvent::Answer(relay) => relay_value("answer", relay)?,
            SignalEvent::IceCandidate(relay) => relay_value("candidate", relay)?,
            SignalEvent::SendMessage(msg) | SignalEvent::ReceiveMessage(msg) => {
                serde_json::to_value(msg)?
            }
            SignalEvent::UserOnline(user_id) => Value::String(user_id.clone()),
        };

        let frame = Frame {
            event: self.kind().name().to_string(),
            data,
        };
        Ok(serde_json::to_string(&frame)?)
    }

    pub fn decode(text: &str) -> Result<Self> {
        let frame: Frame = serde_json::from_str(text)?;
        let kind = EventKind::from_name(&frame.event)
            .ok_or_else(|| Error::Signaling(format!("unknown event: {}", frame.event)))?;
        let data = frame.data;

        let event = match kind {
            EventKind::CallUser => SignalEvent::CallUser(serde_json::from_value(data)?),
            EventKind::CallAccepted => SignalEvent::CallAccepted,
            EventKind::CallRejected => SignalEvent::CallRejected,
            EventKind::CallEnded => SignalEvent::CallEnded,
            EventKind::CallFailed => {
                let failure: Failure = if data.is_null() {
                    Failure { message: String::new() }
                } else {
                    serde_json::from_value(data)?
                };
                SignalEvent::CallFailed {
                    message: failure.message,
                }
            }
            EventKind::AnswerCall => SignalEvent::AnswerCall(serde_json::from_value(data)?),
            EventKind::RejectCall => {
                let route: Route = serde_json::from_value(data)?;
                SignalEvent::RejectCall { to: route.to }
            }
            EventKind::EndCall => {
                let route: Route = serde_json::from_value(data)?;
                SignalEvent::EndCall { to: route.to }
            }
            EventKind::Offer => SignalEvent::Offer(relay_from("offer", data)?),
            EventKind::Answer => SignalEvent::Answer(relay_from("answer", data)?),
            EventKind::IceCandidate => SignalEvent::IceCandidate(relay_from("candidate", data)?),
            EventKind::SendMessage => SignalEvent::SendMessage(serde_json::from_value(data)?),
            EventKind::ReceiveMessage => {
                SignalEvent::ReceiveMessage(serde_json::from_value(data)?)
            }
            EventKind::UserOnline => match data {
                Value::String(user_id) => SignalEvent::UserOnline(user_id),
                other => {
                    return Err(Error::Signaling(format!(
                        "userOnline expects a user id, got {}",
                        other
                    )))
                }
            },
        };

        Ok(event)
    }
}

fn relay_value<T: Serialize>(field: &str, relay: &Relay<T>) -> Result<Value> {
    let mut data = serde_json::Map::new();
    data.insert(field.to_string(), serde_json::to_value(&relay.body)?);
    if let Some(ref to) = relay.to {
        data.insert("to".to_string(), Value::String(to.clone()));
    }
    if let Some(ref from) = relay.from {
        data.insert("from".to_string(), Value::String(from.clone()));
    }
    Ok(Value::Object(data))
}

fn relay_from<T: for<'de> Deserialize<'de>>(field: &str, mut data: Value) -> Result<Relay<T>> {
    let body = data
        .get_mut(field)
        .map(Value::take)
        .ok_or_else(|| Error::Signaling(format!("missing field: {}", field)))?;

    Ok(Relay {
        body: serde_json::from_value(body)?,
        to: data["to"].as_str().map(|s| s.to_string()),
        from: data["from"].as_str().map(|s| s.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SdpType;

    #[test]
    fn test_call_user_wire_shape() {
        let event = SignalEvent::CallUser(CallRequest {
            user_to_call: "u2".into(),
            from: "u1".into(),
            name: "Ann".into(),
            call_type: CallKind::Video,
        });
        let frame: Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(frame["event"], "callUser");
        assert_eq!(frame["data"]["userToCall"], "u2");
        assert_eq!(frame["data"]["callType"], "video");
    }

    #[test]
    fn test_payloadless_events_accept_any_empty_data() {
        for text in [
            r#"{"event":"callAccepted"}"#,
            r#"{"event":"callAccepted","data":null}"#,
            r#"{"event":"callAccepted","data":{}}"#,
        ] {
            assert_eq!(SignalEvent::decode(text).unwrap(), SignalEvent::CallAccepted);
        }
    }

    #[test]
    fn test_decode_candidate_relay() {
        let text = r#"{"event":"ice-candidate","data":{"candidate":{"candidate":"c1","sdpMid":"0","sdpMLineIndex":0},"from":"u2"}}"#;
        match SignalEvent::decode(text).unwrap() {
            SignalEvent::IceCandidate(relay) => {
                assert_eq!(relay.body.candidate, "c1");
                assert_eq!(relay.from.as_deref(), Some("u2"));
                assert_eq!(relay.to, None);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_offer_uses_named_field() {
        let event = SignalEvent::Offer(Relay::to(
            SessionDescription {
                sdp_type: SdpType::Offer,
                sdp: "v=0".into(),
            },
            "u1",
            "u2",
        ));
        let frame: Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(frame["data"]["offer"]["type"], "offer");
        assert_eq!(frame["data"]["to"], "u1");
        assert_eq!(SignalEvent::decode(&event.encode().unwrap()).unwrap(), event);
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        assert!(matches!(
            SignalEvent::decode(r#"{"event":"mystery","data":{}}"#),
            Err(Error::Signaling(_))
        ));
    }

    #[test]
    fn test_call_failed_message() {
        let event = SignalEvent::decode(r#"{"event":"callFailed","data":{"message":"user offline"}}"#)
            .unwrap();
        assert_eq!(
            event,
            SignalEvent::CallFailed {
                message: "user offline".into()
            }
        );
    }
}
