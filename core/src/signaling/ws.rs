//! WebSocket transport for the signaling relay

use super::events::SignalEvent;
use super::hub::set_link;
use crate::error::{Error, Result};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

pub(crate) struct WsLink {
    pub sender: mpsc::UnboundedSender<SignalEvent>,
    pub tasks: Vec<JoinHandle<()>>,
}

pub(crate) async fn open(
    url: &str,
    token: Option<&str>,
    inbound: broadcast::Sender<SignalEvent>,
    link: Arc<watch::Sender<bool>>,
) -> Result<WsLink> {
    let mut request = url.into_client_request()?;
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| Error::Config(format!("invalid token: {}", e)))?;
        request.headers_mut().insert("Authorization", value);
    }

    let (ws_stream, _) = connect_async(request).await?;
    let (mut write, mut read) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<SignalEvent>();
    set_link(&link, true);

    // Receive task
    let link_clone = link.clone();
    let receive = tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => match SignalEvent::decode(&text) {
                    Ok(event) => {
                        log::debug!("relay -> {}", event.kind().name());
                        let _ = inbound.send(event);
                    }
                    Err(e) => log::warn!("Dropping undecodable frame: {}", e),
                },
                Ok(WsMessage::Close(_)) => {
                    log::warn!("Relay closed the connection");
                    break;
                }
                Err(e) => {
                    log::warn!("Relay connection error: {}", e);
                    break;
                }
                _ => {}
            }
        }
        set_link(&link_clone, false);
    });

    // Send task
    let send = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match event.encode() {
                Ok(text) => text,
                Err(e) => {
                    log::error!("Failed to encode {}: {}", event.kind().name(), e);
                    continue;
                }
            };
            if write.send(WsMessage::Text(text)).await.is_err() {
                set_link(&link, false);
                break;
            }
        }
        let _ = write.close().await;
    });

    Ok(WsLink {
        sender: tx,
        tasks: vec![receive, send],
    })
}
