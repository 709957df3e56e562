//! WebRTC-backed media backend

use super::{LinkEvent, LinkState, LocalMedia, LocalTrack, MediaBackend, PeerLink};
use crate::config::CallConfig;
use crate::error::{Error, Result};
use crate::models::{CallKind, IceCandidate, SdpType, SessionDescription};
use async_trait::async_trait;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

const STREAM_ID: &str = "chatlink";

/// Which capture devices the user allows.
#[derive(Debug, Clone)]
pub struct WebRtcBackend {
    ice_servers: Vec<String>,
    allow_audio: bool,
    allow_video: bool,
}

impl WebRtcBackend {
    pub fn new(config: &CallConfig) -> Self {
        Self {
            ice_servers: config.ice_servers.clone(),
            allow_audio: config.allow_audio,
            allow_video: config.allow_video,
        }
    }

    fn rtc_config(&self) -> RTCConfiguration {
        let ice_servers = if self.ice_servers.is_empty() {
            vec![]
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

/// A local sample track. Capture code writes samples into
/// [`WebRtcTrack::sample_track`] until the track is stopped.
pub struct WebRtcTrack {
    id: String,
    track: Arc<TrackLocalStaticSample>,
    stopped: AtomicBool,
}

impl WebRtcTrack {
    fn new(mime_type: &str, id: &str) -> Self {
        let track = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_owned(),
                ..Default::default()
            },
            id.to_owned(),
            STREAM_ID.to_owned(),
        );

        Self {
            id: id.to_string(),
            track: Arc::new(track),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn sample_track(&self) -> Option<Arc<TrackLocalStaticSample>> {
        if self.stopped.load(Ordering::SeqCst) {
            None
        } else {
            Some(self.track.clone())
        }
    }
}

impl LocalTrack for WebRtcTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            log::debug!("Stopped local track {}", self.id);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[async_trait]
impl MediaBackend for WebRtcBackend {
    async fn acquire_local(&self, kind: CallKind) -> Result<LocalMedia> {
        if !self.allow_audio {
            return Err(Error::CapabilityDenied("microphone access is disabled".to_string()));
        }
        if kind.has_video() && !self.allow_video {
            return Err(Error::CapabilityDenied("camera access is disabled".to_string()));
        }

        let mut tracks: Vec<Arc<dyn LocalTrack>> =
            vec![Arc::new(WebRtcTrack::new(MIME_TYPE_OPUS, "audio"))];
        if kind.has_video() {
            tracks.push(Arc::new(WebRtcTrack::new(MIME_TYPE_VP8, "video")));
        }

        Ok(LocalMedia::new(kind, tracks))
    }

    async fn open_link(
        &self,
        local: &LocalMedia,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Box<dyn PeerLink>> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut m)?;
        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let pc = Arc::new(api.new_peer_connection(self.rtc_config()).await?);

        for track in local.tracks() {
            if let Some(rtc_track) = track.as_any().downcast_ref::<WebRtcTrack>() {
                pc.add_track(rtc_track.track.clone() as Arc<dyn TrackLocal + Send + Sync>)
                    .await?;
            }
        }

        let candidate_tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = candidate_tx.clone();
            Box::pin(async move {
                if let Some(candidate) = candidate {
                    match candidate.to_json() {
                        Ok(init) => {
                            let _ = tx.send(LinkEvent::LocalCandidate(IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                            }));
                        }
                        Err(e) => log::warn!("Failed to serialize local candidate: {}", e),
                    }
                }
            })
        }));

        let track_tx = events.clone();
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let _ = track_tx.send(LinkEvent::RemoteTrack {
                id: track.id(),
                kind: track.kind().to_string(),
            });
            Box::pin(async {})
        }));

        let state_tx = events;
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            log::debug!("Peer connection state changed to {}", state);
            let mapped = match state {
                RTCPeerConnectionState::Connected => Some(LinkState::Connected),
                RTCPeerConnectionState::Connecting => Some(LinkState::Connecting),
                RTCPeerConnectionState::Disconnected => Some(LinkState::Disconnected),
                RTCPeerConnectionState::Failed => Some(LinkState::Failed),
                RTCPeerConnectionState::Closed => Some(LinkState::Closed),
                _ => None,
            };
            if let Some(mapped) = mapped {
                let _ = state_tx.send(LinkEvent::State(mapped));
            }
            Box::pin(async {})
        }));

        Ok(Box::new(WebRtcLink { pc }))
    }
}

struct WebRtcLink {
    pc: Arc<RTCPeerConnection>,
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let rtc = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(rtc)
}

fn from_rtc(desc: &RTCSessionDescription) -> Result<SessionDescription> {
    let sdp_type = match desc.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        other => return Err(Error::Media(format!("unsupported description type: {}", other))),
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: desc.sdp.clone(),
    })
}

#[async_trait]
impl PeerLink for WebRtcLink {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await?;
        from_rtc(&offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.pc.create_answer(None).await?;
        from_rtc(&answer)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_local_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: None,
            })
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }
}
