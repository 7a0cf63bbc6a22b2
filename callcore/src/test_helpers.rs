//! In-memory fakes for the platform media stack and the signaling server

use async_trait::async_trait;
use callcore_proto::models::{Codec, PeerType};
use callcore_proto::SignalingMessage;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::stats::StatsReport;

use crate::error::{DeviceError, Error, Result};
use crate::media::{
    DataChannel, IceCandidateHandler, MediaConstraints, MediaDevices, MediaKind, MediaStream,
    MediaTrack, MessageHandler, PeerConnection, PeerConnectionFactory, RtpSender, RtpTransceiver,
    SendParameters, SessionDescription, TrackSettings, TransceiverInit,
};
use crate::retry::{RetryPolicy, RpcInvocationAttempt};
use crate::rpc::{SignalClient, SignalTransport};

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[derive(Debug)]
pub struct FakeTrack {
    id: String,
    kind: MediaKind,
    settings: Mutex<TrackSettings>,
    stopped: AtomicBool,
}

impl FakeTrack {
    pub fn new(id: &str, kind: MediaKind, settings: TrackSettings) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            settings: Mutex::new(settings),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn audio(id: &str) -> Arc<Self> {
        Self::new(
            id,
            MediaKind::Audio,
            TrackSettings {
                device_id: Some(format!("{id}-device")),
                ..Default::default()
            },
        )
    }

    pub fn video(id: &str, width: u32, height: u32) -> Arc<Self> {
        Self::new(
            id,
            MediaKind::Video,
            TrackSettings {
                width: Some(width),
                height: Some(height),
                device_id: Some(format!("{id}-device")),
            },
        )
    }

    pub fn set_settings(&self, settings: TrackSettings) {
        *self.settings.lock() = settings;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl MediaTrack for FakeTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn settings(&self) -> TrackSettings {
        self.settings.lock().clone()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

pub fn stream_of(id: &str, tracks: Vec<Arc<FakeTrack>>) -> MediaStream {
    MediaStream::new(
        id,
        tracks
            .into_iter()
            .map(|track| track as Arc<dyn MediaTrack>)
            .collect(),
    )
}

#[derive(Default)]
pub struct FakeSender {
    track: Mutex<Option<Arc<dyn MediaTrack>>>,
    parameters: Mutex<SendParameters>,
    applied: AtomicUsize,
    pub parameters_applied: Notify,
    /// Reject the next track swaps
    pub fail_replace: AtomicBool,
}

impl FakeSender {
    pub fn applied_count(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    pub fn parameters(&self) -> SendParameters {
        self.parameters.lock().clone()
    }

    /// Rids of the encodings currently marked active
    pub fn active_rids(&self) -> Vec<String> {
        self.parameters
            .lock()
            .encodings
            .iter()
            .filter(|e| e.active)
            .filter_map(|e| e.rid.clone())
            .collect()
    }

    pub fn current_track(&self) -> Option<Arc<dyn MediaTrack>> {
        self.track.lock().clone()
    }
}

#[async_trait]
impl RtpSender for FakeSender {
    fn track(&self) -> Option<Arc<dyn MediaTrack>> {
        self.track.lock().clone()
    }

    async fn replace_track(&self, track: Option<Arc<dyn MediaTrack>>) -> Result<()> {
        if self.fail_replace.load(Ordering::SeqCst) {
            return Err(Error::Transport("replace failed".to_string()));
        }
        *self.track.lock() = track;
        Ok(())
    }

    async fn get_parameters(&self) -> Result<SendParameters> {
        Ok(self.parameters.lock().clone())
    }

    async fn set_parameters(&self, parameters: SendParameters) -> Result<()> {
        *self.parameters.lock() = parameters;
        self.applied.fetch_add(1, Ordering::SeqCst);
        self.parameters_applied.notify_one();
        Ok(())
    }
}

pub struct FakeTransceiver {
    sender: Arc<FakeSender>,
    pub preferences: Mutex<Option<Vec<Codec>>>,
}

impl RtpTransceiver for FakeTransceiver {
    fn sender(&self) -> Arc<dyn RtpSender> {
        Arc::clone(&self.sender) as Arc<dyn RtpSender>
    }

    fn supports_codec_preferences(&self) -> bool {
        true
    }

    fn set_codec_preferences(&self, codecs: &[Codec]) -> Result<()> {
        *self.preferences.lock() = Some(codecs.to_vec());
        Ok(())
    }
}

struct FakeDataChannel {
    label: String,
}

impl DataChannel for FakeDataChannel {
    fn label(&self) -> String {
        self.label.clone()
    }
}

pub struct FakePeerConnection {
    pub role: PeerType,
    offer_sdp: String,
    pub local_descriptions: Mutex<Vec<SessionDescription>>,
    pub remote_descriptions: Mutex<Vec<SessionDescription>>,
    pub remote_candidates: Mutex<Vec<RTCIceCandidateInit>>,
    ice_handler: Mutex<Option<Arc<IceCandidateHandler>>>,
    message_handler: Mutex<Option<Arc<MessageHandler>>>,
    pub channel_labels: Mutex<Vec<String>>,
    senders: Mutex<Vec<Arc<FakeSender>>>,
    pub transceivers: Mutex<Vec<Arc<FakeTransceiver>>>,
    pub removed_tracks: AtomicUsize,
    pub stats_requests: AtomicUsize,
    closed: AtomicBool,
}

impl FakePeerConnection {
    fn new(role: PeerType, offer_sdp: String) -> Self {
        Self {
            role,
            offer_sdp,
            local_descriptions: Mutex::default(),
            remote_descriptions: Mutex::default(),
            remote_candidates: Mutex::default(),
            ice_handler: Mutex::default(),
            message_handler: Mutex::default(),
            channel_labels: Mutex::default(),
            senders: Mutex::default(),
            transceivers: Mutex::default(),
            removed_tracks: AtomicUsize::new(0),
            stats_requests: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Transport("peer connection closed".to_string()));
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Push a signaling event through the data channel
    pub fn deliver(&self, message: &SignalingMessage) {
        let handler = self.message_handler.lock().clone();
        let handler = handler.expect("no data channel opened");
        handler(serde_json::to_vec(message).unwrap());
    }

    /// Report a locally gathered candidate
    pub fn gather(&self, candidate: Option<RTCIceCandidateInit>) {
        let handler = self.ice_handler.lock().clone();
        let handler = handler.expect("no ICE candidate handler");
        handler(candidate);
    }

    pub fn fake_senders(&self) -> Vec<Arc<FakeSender>> {
        self.senders.lock().clone()
    }

    pub fn sender_of(&self, kind: MediaKind) -> Option<Arc<FakeSender>> {
        self.senders
            .lock()
            .iter()
            .find(|s| s.current_track().is_some_and(|t| t.kind() == kind))
            .cloned()
    }
}

#[async_trait]
impl PeerConnection for FakePeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.ensure_open()?;
        Ok(SessionDescription::offer(self.offer_sdp.clone()))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        self.ensure_open()?;
        Ok(SessionDescription::answer("client-answer-sdp"))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.ensure_open()?;
        self.local_descriptions.lock().push(description);
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.ensure_open()?;
        self.remote_descriptions.lock().push(description);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<()> {
        self.ensure_open()?;
        self.remote_candidates.lock().push(candidate);
        Ok(())
    }

    fn on_ice_candidate(&self, handler: IceCandidateHandler) {
        *self.ice_handler.lock() = Some(Arc::new(handler));
    }

    async fn create_data_channel(
        &self,
        label: &str,
        on_message: MessageHandler,
    ) -> Result<Arc<dyn DataChannel>> {
        self.ensure_open()?;
        self.channel_labels.lock().push(label.to_string());
        *self.message_handler.lock() = Some(Arc::new(on_message));
        Ok(Arc::new(FakeDataChannel {
            label: label.to_string(),
        }))
    }

    async fn add_transceiver(
        &self,
        track: Arc<dyn MediaTrack>,
        init: TransceiverInit,
    ) -> Result<Arc<dyn RtpTransceiver>> {
        self.ensure_open()?;
        let sender = Arc::new(FakeSender::default());
        *sender.track.lock() = Some(track);
        sender.parameters.lock().encodings = init.send_encodings;
        self.senders.lock().push(Arc::clone(&sender));

        let transceiver = Arc::new(FakeTransceiver {
            sender,
            preferences: Mutex::default(),
        });
        self.transceivers.lock().push(Arc::clone(&transceiver));
        Ok(transceiver)
    }

    fn senders(&self) -> Vec<Arc<dyn RtpSender>> {
        self.senders
            .lock()
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn RtpSender>)
            .collect()
    }

    async fn remove_track(&self, sender: &Arc<dyn RtpSender>) -> Result<()> {
        sender.replace_track(None).await?;
        self.removed_tracks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn receiver_codecs(&self, kind: MediaKind) -> Vec<Codec> {
        match kind {
            MediaKind::Audio => vec![Codec::new("audio/opus", 48_000)],
            MediaKind::Video => vec![Codec::new("video/VP8", 90_000), Codec::new("video/H264", 90_000)],
        }
    }

    async fn stats(&self) -> Result<StatsReport> {
        self.ensure_open()?;
        self.stats_requests.fetch_add(1, Ordering::SeqCst);
        Ok(StatsReport {
            reports: HashMap::new(),
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeFactory {
    pub offer_sdp: Mutex<String>,
    created: Mutex<Vec<Arc<FakePeerConnection>>>,
}

impl Default for FakeFactory {
    fn default() -> Self {
        Self {
            offer_sdp: Mutex::new("v=0 client-offer".to_string()),
            created: Mutex::default(),
        }
    }
}

impl FakeFactory {
    pub fn connections(&self, role: PeerType) -> Vec<Arc<FakePeerConnection>> {
        self.created
            .lock()
            .iter()
            .filter(|pc| pc.role == role)
            .cloned()
            .collect()
    }

    /// Most recently created connection for `role`
    pub fn latest(&self, role: PeerType) -> Arc<FakePeerConnection> {
        self.connections(role)
            .pop()
            .expect("no connection created for role")
    }
}

#[async_trait]
impl PeerConnectionFactory for FakeFactory {
    async fn create(
        &self,
        _config: &RTCConfiguration,
        role: PeerType,
    ) -> Result<Arc<dyn PeerConnection>> {
        let pc = Arc::new(FakePeerConnection::new(role, self.offer_sdp.lock().clone()));
        self.created.lock().push(Arc::clone(&pc));
        Ok(pc)
    }

    fn sender_codecs(&self, kind: MediaKind) -> Vec<Codec> {
        match kind {
            MediaKind::Audio => vec![Codec::new("audio/opus", 48_000)],
            MediaKind::Video => vec![
                Codec::new("video/H264", 90_000),
                Codec::new("video/VP8", 90_000),
                Codec::new("video/VP9", 90_000),
            ],
        }
    }
}

#[derive(Default)]
pub struct FakeDevices {
    calls: AtomicUsize,
    pub failure: Mutex<Option<DeviceError>>,
    pub acquired: Mutex<Vec<Arc<FakeTrack>>>,
}

impl FakeDevices {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<MediaStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(failure) = self.failure.lock().clone() {
            return Err(failure.into());
        }

        let mut tracks = Vec::new();
        if let Some(video) = constraints.video {
            let device_id = video.device_id.unwrap_or_default();
            tracks.push(FakeTrack::new(
                &format!("camera-{device_id}"),
                MediaKind::Video,
                TrackSettings {
                    width: Some(1280),
                    height: Some(720),
                    device_id: Some(device_id),
                },
            ));
        }
        if let Some(audio) = constraints.audio {
            let device_id = audio.device_id.unwrap_or_default();
            tracks.push(FakeTrack::new(
                &format!("mic-{device_id}"),
                MediaKind::Audio,
                TrackSettings {
                    device_id: Some(device_id),
                    ..Default::default()
                },
            ));
        }

        self.acquired.lock().extend(tracks.iter().cloned());
        Ok(stream_of("acquired", tracks))
    }
}

/// Scripted signaling server recording every request it receives
pub struct FakeSignalServer {
    requests: Mutex<Vec<(String, Value)>>,
    pub join_response: Mutex<Value>,
    failing: Mutex<HashSet<&'static str>>,
    gates: Mutex<HashMap<&'static str, Arc<Notify>>>,
}

impl Default for FakeSignalServer {
    fn default() -> Self {
        Self {
            requests: Mutex::default(),
            join_response: Mutex::new(json!({
                "sdp": "sfu-answer-sdp",
                "callState": {
                    "participants": [
                        {"userId": "alice", "sessionId": "session-alice", "name": "Alice"}
                    ]
                }
            })),
            failing: Mutex::default(),
            gates: Mutex::default(),
        }
    }
}

impl FakeSignalServer {
    /// Make every call to `method` fail with a non-retryable error
    pub fn fail(&self, method: &'static str) {
        self.failing.lock().insert(method);
    }

    /// Hold calls to `method` until the returned gate is notified
    pub fn gate(&self, method: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().insert(method, Arc::clone(&gate));
        gate
    }

    pub fn methods(&self) -> Vec<String> {
        self.requests.lock().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn requests(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

#[async_trait]
impl SignalTransport for FakeSignalServer {
    async fn unary(&self, attempt: RpcInvocationAttempt, payload: Value) -> Result<Value> {
        self.requests
            .lock()
            .push((attempt.method.to_string(), payload));

        let gate = self.gates.lock().get(attempt.method).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.failing.lock().contains(attempt.method) {
            return Err(Error::Rpc {
                method: attempt.method,
                message: "rejected by fake server".to_string(),
                retryable: false,
            });
        }

        Ok(match attempt.method {
            "Join" => self.join_response.lock().clone(),
            "SetPublisher" => json!({"sdp": "sfu-publisher-answer-sdp"}),
            _ => json!({}),
        })
    }
}

pub fn signal_client(server: &Arc<FakeSignalServer>) -> SignalClient {
    SignalClient::new(
        "session-under-test".into(),
        Arc::clone(server) as Arc<dyn SignalTransport>,
        RetryPolicy::default().with_max_attempts(Some(1)),
    )
}
