//! Call session state machine
//!
//! A session owns two peer connections to the SFU: the subscriber receives
//! remote media and carries the signaling data channel, the publisher sends
//! local media. Lifecycle:
//!
//! ```text
//! Idle -> Joining -> Joined -> Leaving -> Left
//!                      |
//!                      +-- publisher: None | Negotiating | Published
//! ```
//!
//! Session state lives behind a mutex that is never held across an await.
//! Every `join`, `publish` and `leave` bumps a generation counter; an
//! operation that observes a newer generation after resuming was preempted
//! and finishes as a no-op.

mod handlers;
mod ice;

use callcore_proto::models::{CallState, PeerType, SfuError};
use callcore_proto::signal::{MuteChanged, MuteStateChange, SubscriptionMap, UserVideoQuality};
use callcore_proto::{EventKind, SessionId, SignalingMessage};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::stats::StatsReport;

use crate::codecs;
use crate::config::ClientConfig;
use crate::dispatcher::{Dispatcher, Subscription};
use crate::error::{DeviceError, Error, Result};
use crate::layers::{self, EncodingLayer};
use crate::media::{
    DeviceKind, MediaConstraints, MediaDevices, MediaKind, MediaStream, PeerConnection,
    PeerConnectionFactory, SessionDescription, TransceiverInit,
};
use crate::rpc::SignalClient;

use ice::IceTrickleBuffer;

/// Label of the data channel the SFU pushes signaling events on
pub const SIGNALING_CHANNEL: &str = "signaling";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Joining,
    Joined,
    Leaving,
    Left,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Joining => "joining",
            Self::Joined => "joined",
            Self::Leaving => "leaving",
            Self::Left => "left",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publishing sub-state while joined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Unpublished,
    Negotiating,
    Published,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuteState {
    pub audio_muted: bool,
    pub video_muted: bool,
}

enum Publisher {
    None,
    Negotiating(Arc<dyn PeerConnection>),
    Published(Arc<dyn PeerConnection>),
}

impl Publisher {
    const fn state(&self) -> PublishState {
        match self {
            Self::None => PublishState::Unpublished,
            Self::Negotiating(_) => PublishState::Negotiating,
            Self::Published(_) => PublishState::Published,
        }
    }

    fn connection(&self) -> Option<&Arc<dyn PeerConnection>> {
        match self {
            Self::None => None,
            Self::Negotiating(pc) | Self::Published(pc) => Some(pc),
        }
    }

    fn into_connection(self) -> Option<Arc<dyn PeerConnection>> {
        match self {
            Self::None => None,
            Self::Negotiating(pc) | Self::Published(pc) => Some(pc),
        }
    }
}

enum Phase {
    Idle,
    /// The subscriber is present once created
    Joining {
        subscriber: Option<Arc<dyn PeerConnection>>,
    },
    Joined {
        subscriber: Arc<dyn PeerConnection>,
        publisher: Publisher,
        call_state: CallState,
    },
    Leaving,
    Left,
}

impl Phase {
    const fn state(&self) -> SessionState {
        match self {
            Self::Idle => SessionState::Idle,
            Self::Joining { .. } => SessionState::Joining,
            Self::Joined { .. } => SessionState::Joined,
            Self::Leaving => SessionState::Leaving,
            Self::Left => SessionState::Left,
        }
    }

    /// Subscriber and publisher connections owned by this phase
    fn into_connections(
        self,
    ) -> (
        Option<Arc<dyn PeerConnection>>,
        Option<Arc<dyn PeerConnection>>,
    ) {
        match self {
            Self::Joining { subscriber } => (subscriber, None),
            Self::Joined {
                subscriber,
                publisher,
                ..
            } => (Some(subscriber), publisher.into_connection()),
            Self::Idle | Self::Leaving | Self::Left => (None, None),
        }
    }
}

struct SessionCore {
    phase: Phase,
    generation: u64,
    /// Client bound to the session id of the current join attempt
    client: SignalClient,
    join_attempts: u64,
    /// Ladder planned during join, reused by publish
    video_layers: Vec<EncodingLayer>,
    mute: MuteState,
    pending_candidates: IceTrickleBuffer,
    last_error: Option<SfuError>,
    events: Option<handlers::EventQueue>,
}

pub(crate) struct SessionInner {
    factory: Arc<dyn PeerConnectionFactory>,
    devices: Arc<dyn MediaDevices>,
    rtc_config: RTCConfiguration,
    dispatcher: Dispatcher,
    core: Mutex<SessionCore>,
}

/// One participant's media session with the SFU.
///
/// Cloning yields another handle to the same session, so `leave` can be
/// issued while another task awaits `join` or `publish`.
#[derive(Clone)]
pub struct CallSession {
    inner: Arc<SessionInner>,
}

async fn close_quietly(connection: &Arc<dyn PeerConnection>) {
    if let Err(e) = connection.close().await {
        warn!(error = %e, "Failed to close peer connection");
    }
}

/// JSON encoded stats of `connection`, empty when it does not exist
async fn encode_stats(connection: Option<Arc<dyn PeerConnection>>) -> Result<String> {
    match connection {
        Some(connection) => Ok(serde_json::to_string(&connection.stats().await?)?),
        None => Ok(String::new()),
    }
}

/// Detach every local track from `publisher`, then close it
async fn release_publisher(publisher: &Arc<dyn PeerConnection>) {
    for sender in publisher.senders() {
        if sender.track().is_none() {
            continue;
        }
        if let Err(e) = publisher.remove_track(&sender).await {
            warn!(error = %e, "Failed to remove local track");
        }
    }
    close_quietly(publisher).await;
}

impl CallSession {
    pub fn new(
        client: SignalClient,
        factory: Arc<dyn PeerConnectionFactory>,
        devices: Arc<dyn MediaDevices>,
        rtc_config: RTCConfiguration,
    ) -> Self {
        let inner = Arc::new(SessionInner {
            factory,
            devices,
            rtc_config,
            dispatcher: Dispatcher::new(),
            core: Mutex::new(SessionCore {
                phase: Phase::Idle,
                generation: 0,
                client,
                join_attempts: 0,
                video_layers: Vec::new(),
                mute: MuteState::default(),
                pending_candidates: IceTrickleBuffer::default(),
                last_error: None,
                events: None,
            }),
        });
        handlers::register_event_handlers(&inner.dispatcher, &Arc::downgrade(&inner));
        Self { inner }
    }

    /// Session whose first join uses a fresh session id, talking to the
    /// configured SFU
    pub fn from_config(
        config: &ClientConfig,
        factory: Arc<dyn PeerConnectionFactory>,
        devices: Arc<dyn MediaDevices>,
    ) -> Result<Self> {
        let session_id = SessionId::new(Uuid::new_v4().to_string());
        let client = SignalClient::from_config(config, session_id)?;
        Ok(Self::new(client, factory, devices, config.rtc_configuration()))
    }

    /// Id of the current join attempt
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.inner.core.lock().client.session_id().clone()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.core.lock().phase.state()
    }

    #[must_use]
    pub fn publish_state(&self) -> PublishState {
        match &self.inner.core.lock().phase {
            Phase::Joined { publisher, .. } => publisher.state(),
            _ => PublishState::Unpublished,
        }
    }

    /// Call state returned by the SFU on join
    #[must_use]
    pub fn call_state(&self) -> Option<CallState> {
        match &self.inner.core.lock().phase {
            Phase::Joined { call_state, .. } => Some(call_state.clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn mute_state(&self) -> MuteState {
        self.inner.core.lock().mute
    }

    /// Most recent error pushed by the SFU over the signaling channel
    #[must_use]
    pub fn last_error(&self) -> Option<SfuError> {
        self.inner.core.lock().last_error.clone()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Listen for signaling events until the session leaves
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&SignalingMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(kind, handler)
    }

    fn client(&self) -> SignalClient {
        self.inner.core.lock().client.clone()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.core.lock().generation == generation
    }

    fn subscriber_connection(&self) -> Option<Arc<dyn PeerConnection>> {
        match &self.inner.core.lock().phase {
            Phase::Joined { subscriber, .. } => Some(Arc::clone(subscriber)),
            _ => None,
        }
    }

    fn publisher_connection(&self) -> Option<(Arc<dyn PeerConnection>, u64)> {
        let core = self.inner.core.lock();
        match &core.phase {
            Phase::Joined { publisher, .. } => publisher
                .connection()
                .map(|pc| (Arc::clone(pc), core.generation)),
            _ => None,
        }
    }

    fn ensure_joined(&self, operation: &'static str) -> Result<()> {
        match self.state() {
            SessionState::Joined => Ok(()),
            state => Err(Error::InvalidState {
                operation,
                state: state.as_str(),
            }),
        }
    }

    /// Join the call through a fresh subscriber connection.
    ///
    /// `video_stream` is the local camera stream the layer ladder is planned
    /// from. Returns the call state reported by the SFU, or `None` when
    /// `leave` ran before the join completed. Joining again while joined
    /// replaces both connections under a freshly generated session id.
    pub async fn join(&self, video_stream: Option<&MediaStream>) -> Result<Option<CallState>> {
        let (generation, previous, client) = {
            let mut core = self.inner.core.lock();
            let previous = match core.phase.state() {
                SessionState::Idle => None,
                SessionState::Joined => Some(std::mem::replace(&mut core.phase, Phase::Idle)),
                state => {
                    return Err(Error::InvalidState {
                        operation: "join",
                        state: state.as_str(),
                    })
                }
            };
            if core.join_attempts > 0 {
                let session_id = SessionId::new(Uuid::new_v4().to_string());
                core.client = core.client.with_session_id(session_id);
            }
            core.join_attempts += 1;
            core.generation += 1;
            core.phase = Phase::Joining { subscriber: None };
            core.pending_candidates.clear();
            if core.events.is_none() {
                core.events = Some(handlers::spawn_event_worker(Arc::downgrade(&self.inner)));
            }
            (core.generation, previous, core.client.clone())
        };

        if let Some(previous) = previous {
            info!(session_id = %self.session_id(), "Rejoining, closing previous connections");
            let (subscriber, publisher) = previous.into_connections();
            if let Some(publisher) = publisher {
                release_publisher(&publisher).await;
            }
            if let Some(subscriber) = subscriber {
                close_quietly(&subscriber).await;
            }
        }

        info!(session_id = %self.session_id(), "Setting up subscriber");
        let subscriber = match self
            .inner
            .factory
            .create(&self.inner.rtc_config, PeerType::Subscriber)
            .await
        {
            Ok(subscriber) => subscriber,
            Err(e) => return self.abort_join(generation, None, e).await,
        };

        let installed = {
            let mut core = self.inner.core.lock();
            if core.generation == generation {
                core.phase = Phase::Joining {
                    subscriber: Some(Arc::clone(&subscriber)),
                };
                true
            } else {
                false
            }
        };
        if !installed {
            debug!("Join preempted before the subscriber was installed");
            close_quietly(&subscriber).await;
            return Ok(None);
        }

        match self
            .negotiate_subscriber(&client, &subscriber, video_stream)
            .await
        {
            Ok(call_state) => Ok(self.complete_join(generation, subscriber, call_state).await),
            Err(e) => self.abort_join(generation, Some(subscriber), e).await,
        }
    }

    async fn negotiate_subscriber(
        &self,
        client: &SignalClient,
        subscriber: &Arc<dyn PeerConnection>,
        video_stream: Option<&MediaStream>,
    ) -> Result<CallState> {
        self.watch_local_candidates(subscriber, PeerType::Subscriber);
        subscriber
            .create_data_channel(SIGNALING_CHANNEL, self.signaling_message_handler())
            .await?;

        let offer = subscriber.create_offer().await?;
        if !offer.has_body() {
            return Err(Error::Protocol("Subscriber offer has no SDP".to_string()));
        }
        subscriber.set_local_description(offer.clone()).await?;

        let video_layers =
            video_stream.map_or_else(layers::default_video_layers, layers::find_optimal_video_layers);
        let codec_settings = codecs::codec_settings(
            self.inner.factory.as_ref(),
            subscriber.as_ref(),
            &video_layers,
        );
        self.inner.core.lock().video_layers = video_layers;

        let response = client.join(offer.sdp, codec_settings).await?;
        if response.sdp.trim().is_empty() {
            return Err(Error::Protocol("Join response has no SDP answer".to_string()));
        }
        subscriber
            .set_remote_description(SessionDescription::answer(response.sdp))
            .await?;

        Ok(response.call_state.unwrap_or_default())
    }

    async fn complete_join(
        &self,
        generation: u64,
        subscriber: Arc<dyn PeerConnection>,
        call_state: CallState,
    ) -> Option<CallState> {
        let pending = {
            let mut core = self.inner.core.lock();
            if core.generation != generation {
                None
            } else {
                core.phase = Phase::Joined {
                    subscriber: Arc::clone(&subscriber),
                    publisher: Publisher::None,
                    call_state: call_state.clone(),
                };
                Some(core.pending_candidates.take(PeerType::Subscriber))
            }
        };

        let Some(pending) = pending else {
            debug!("Join completed after leave, ignoring");
            return None;
        };

        handlers::apply_candidates(&subscriber, pending).await;
        info!(
            session_id = %self.session_id(),
            participants = call_state.participants.len(),
            "Joined call"
        );
        Some(call_state)
    }

    /// Roll back a failed join; a failure after preemption is not reported
    async fn abort_join(
        &self,
        generation: u64,
        subscriber: Option<Arc<dyn PeerConnection>>,
        error: Error,
    ) -> Result<Option<CallState>> {
        let current = {
            let mut core = self.inner.core.lock();
            if core.generation == generation {
                core.generation += 1;
                core.phase = Phase::Left;
                core.events = None;
                core.pending_candidates.clear();
                true
            } else {
                false
            }
        };

        if !current {
            debug!(error = %error, "Join failed after leave, ignoring");
            return Ok(None);
        }

        self.inner.dispatcher.off_all(None);
        if let Some(subscriber) = subscriber {
            close_quietly(&subscriber).await;
        }
        warn!(session_id = %self.session_id(), error = %error, "Join failed");
        Err(error)
    }

    /// Publish local media through a fresh publisher connection.
    ///
    /// Replaces any previous publisher, releasing its tracks first. On
    /// failure the session stays joined without a publisher.
    pub async fn publish(
        &self,
        audio_stream: Option<&MediaStream>,
        video_stream: Option<&MediaStream>,
    ) -> Result<()> {
        let (generation, previous, planned_layers) = {
            let mut core = self.inner.core.lock();
            let state = core.phase.state();
            let Phase::Joined { publisher, .. } = &mut core.phase else {
                return Err(Error::InvalidState {
                    operation: "publish",
                    state: state.as_str(),
                });
            };
            let previous = std::mem::replace(publisher, Publisher::None).into_connection();
            core.generation += 1;
            core.pending_candidates.take(PeerType::PublisherUnspecified);
            (core.generation, previous, core.video_layers.clone())
        };

        if let Some(previous) = previous {
            info!(session_id = %self.session_id(), "Replacing existing publisher");
            release_publisher(&previous).await;
        }

        info!(session_id = %self.session_id(), "Setting up publisher");
        let publisher = self
            .inner
            .factory
            .create(&self.inner.rtc_config, PeerType::PublisherUnspecified)
            .await?;

        let installed = {
            let mut core = self.inner.core.lock();
            let current = core.generation == generation;
            match &mut core.phase {
                Phase::Joined { publisher: slot, .. } if current => {
                    *slot = Publisher::Negotiating(Arc::clone(&publisher));
                    true
                }
                _ => false,
            }
        };
        if !installed {
            debug!("Publish preempted before the publisher was installed");
            close_quietly(&publisher).await;
            return Ok(());
        }

        match self
            .negotiate_publisher(&publisher, audio_stream, video_stream, &planned_layers)
            .await
        {
            Ok(()) => {
                self.complete_publish(generation, &publisher).await;
                Ok(())
            }
            Err(e) => {
                let current = {
                    let mut core = self.inner.core.lock();
                    let current = core.generation == generation;
                    if let Phase::Joined { publisher: slot, .. } = &mut core.phase {
                        if current {
                            *slot = Publisher::None;
                        }
                    }
                    current
                };
                if !current {
                    debug!(error = %e, "Publish failed after being superseded, ignoring");
                    return Ok(());
                }
                release_publisher(&publisher).await;
                warn!(session_id = %self.session_id(), error = %e, "Publish failed");
                Err(e)
            }
        }
    }

    async fn negotiate_publisher(
        &self,
        publisher: &Arc<dyn PeerConnection>,
        audio_stream: Option<&MediaStream>,
        video_stream: Option<&MediaStream>,
        planned_layers: &[EncodingLayer],
    ) -> Result<()> {
        self.watch_local_candidates(publisher, PeerType::PublisherUnspecified);

        if let Some(stream) = video_stream {
            if let Some(track) = stream.video_tracks().into_iter().next() {
                let encodings = if planned_layers.is_empty() {
                    codecs::default_video_publish_encodings()
                } else {
                    planned_layers.iter().map(EncodingLayer::to_encoding).collect()
                };
                let transceiver = publisher
                    .add_transceiver(
                        track,
                        TransceiverInit::send_only(vec![stream.id().to_string()], encodings),
                    )
                    .await?;

                if transceiver.supports_codec_preferences() {
                    let preferred = codecs::preferred_codecs(
                        &self.inner.factory.sender_codecs(MediaKind::Video),
                        codecs::PREFERRED_VIDEO_CODEC,
                    );
                    if !preferred.is_empty() {
                        debug!(codec = codecs::PREFERRED_VIDEO_CODEC, "Applying codec preferences");
                        if let Err(e) = transceiver.set_codec_preferences(&preferred) {
                            warn!(error = %e, "Failed to apply codec preferences");
                        }
                    }
                }
            }
        }

        if let Some(stream) = audio_stream {
            if let Some(track) = stream.audio_tracks().into_iter().next() {
                publisher
                    .add_transceiver(
                        track,
                        TransceiverInit::send_only(
                            vec![stream.id().to_string()],
                            codecs::default_audio_encodings(),
                        ),
                    )
                    .await?;
            }
        }

        if publisher.senders().is_empty() {
            debug!("No local tracks to publish, skipping negotiation");
            return Ok(());
        }

        let offer = publisher.create_offer().await?;
        if !offer.has_body() {
            return Err(Error::Protocol("Publisher offer has no SDP".to_string()));
        }
        publisher.set_local_description(offer.clone()).await?;

        let response = self.client().set_publisher(offer.sdp).await?;
        if response.sdp.trim().is_empty() {
            return Err(Error::Protocol("SetPublisher response has no SDP answer".to_string()));
        }
        publisher
            .set_remote_description(SessionDescription::answer(response.sdp))
            .await
    }

    async fn complete_publish(&self, generation: u64, publisher: &Arc<dyn PeerConnection>) {
        let pending = {
            let mut core = self.inner.core.lock();
            let current = core.generation == generation;
            match &mut core.phase {
                Phase::Joined { publisher: slot, .. } if current => {
                    *slot = Publisher::Published(Arc::clone(publisher));
                    Some(core.pending_candidates.take(PeerType::PublisherUnspecified))
                }
                _ => None,
            }
        };

        match pending {
            Some(pending) => {
                handlers::apply_candidates(publisher, pending).await;
                info!(session_id = %self.session_id(), "Publishing");
            }
            None => debug!("Publish completed after being superseded, ignoring"),
        }
    }

    /// Tear the session down.
    ///
    /// Silences every event handler before any connection is closed, so no
    /// handler runs once this returns. Operations still in flight finish as
    /// no-ops.
    pub async fn leave(&self) {
        let previous = {
            let mut core = self.inner.core.lock();
            if matches!(core.phase.state(), SessionState::Leaving | SessionState::Left) {
                debug!("Session already left");
                return;
            }
            core.generation += 1;
            core.events = None;
            core.pending_candidates.clear();
            std::mem::replace(&mut core.phase, Phase::Leaving)
        };

        self.inner.dispatcher.off_all(None);
        info!(session_id = %self.session_id(), "Leaving call");

        let (subscriber, publisher) = previous.into_connections();
        futures::join!(
            async {
                if let Some(publisher) = &publisher {
                    release_publisher(publisher).await;
                }
            },
            async {
                if let Some(subscriber) = &subscriber {
                    close_quietly(subscriber).await;
                }
            },
        );

        self.inner.core.lock().phase = Phase::Left;
    }

    /// Switch the capture device feeding an existing sender.
    ///
    /// Returns the newly acquired stream, or `None` when there is nothing to
    /// switch. Without a publisher no device is acquired.
    pub async fn change_input_device(
        &self,
        kind: DeviceKind,
        device_id: &str,
    ) -> Result<Option<MediaStream>> {
        let Some((publisher, generation)) = self.publisher_connection() else {
            warn!(device_id, "Can't change input device without a publish connection");
            return Ok(None);
        };

        let media_kind = kind.media_kind();
        let stream = self
            .inner
            .devices
            .get_user_media(MediaConstraints::for_device(kind, device_id))
            .await?;

        let Some(new_track) = stream.tracks_of(media_kind).into_iter().next() else {
            stream.stop_all();
            return Err(DeviceError::NotFound(device_id.to_string()).into());
        };

        if !self.is_current(generation) {
            debug!(device_id, "Publisher replaced while acquiring device, releasing it");
            stream.stop_all();
            return Ok(None);
        }

        let replaced = publisher.senders().into_iter().find_map(|sender| {
            let track = sender.track().filter(|track| track.kind() == media_kind)?;
            Some((sender, track))
        });
        let Some((sender, old_track)) = replaced else {
            warn!(kind = %media_kind, "No sender publishes this kind of track");
            stream.stop_all();
            return Ok(None);
        };

        old_track.stop();
        if let Err(e) = sender.replace_track(Some(new_track)).await {
            stream.stop_all();
            return Err(e);
        }

        info!(kind = %media_kind, device_id, "Input device changed");
        Ok(Some(stream))
    }

    /// Enable exactly the simulcast layers named in `enabled_rids`.
    ///
    /// Parameters are written back only when a layer actually changes.
    /// Returns whether anything was applied.
    pub async fn update_publish_quality(&self, enabled_rids: &[String]) -> Result<bool> {
        let Some((publisher, _)) = self.publisher_connection() else {
            debug!("No publisher, ignoring publish quality change");
            return Ok(false);
        };

        let Some(sender) = publisher
            .senders()
            .into_iter()
            .find(|sender| sender.track().is_some_and(|t| t.kind() == MediaKind::Video))
        else {
            debug!("No video sender, ignoring publish quality change");
            return Ok(false);
        };

        let mut parameters = sender.get_parameters().await?;
        let mut changed = false;
        for encoding in &mut parameters.encodings {
            let enable = encoding
                .rid
                .as_deref()
                .is_some_and(|rid| enabled_rids.iter().any(|enabled| enabled == rid));
            if encoding.active != enable {
                debug!(rid = ?encoding.rid, active = enable, "Toggling encoding");
                encoding.active = enable;
                changed = true;
            }
        }

        if !changed {
            debug!(?enabled_rids, "Publish quality already up to date");
            return Ok(false);
        }

        sender.set_parameters(parameters).await?;
        info!(?enabled_rids, "Publish quality updated");
        Ok(true)
    }

    /// Capture device currently feeding the published track of `kind`
    #[must_use]
    pub fn active_input_device_id(&self, kind: MediaKind) -> Option<String> {
        let (publisher, _) = self.publisher_connection()?;
        publisher
            .senders()
            .into_iter()
            .filter_map(|sender| sender.track())
            .find(|track| track.kind() == kind)
            .and_then(|track| track.settings().device_id)
    }

    /// Record a local mute change and announce it to the SFU
    pub async fn update_mute_state(&self, kind: MediaKind, muted: bool) -> Result<()> {
        {
            let mut core = self.inner.core.lock();
            let state = core.phase.state();
            if state != SessionState::Joined {
                return Err(Error::InvalidState {
                    operation: "update mute state",
                    state: state.as_str(),
                });
            }
            match kind {
                MediaKind::Audio => core.mute.audio_muted = muted,
                MediaKind::Video => core.mute.video_muted = muted,
            }
        }

        let change = match kind {
            MediaKind::Audio => MuteStateChange::AudioMuteChanged(MuteChanged { muted }),
            MediaKind::Video => MuteStateChange::VideoMuteChanged(MuteChanged { muted }),
        };
        self.client().update_mute_state(change).await
    }

    pub async fn update_subscriptions(&self, subscriptions: SubscriptionMap) -> Result<()> {
        self.ensure_joined("update subscriptions")?;
        self.client().update_subscriptions(subscriptions).await
    }

    pub async fn request_video_quality(&self, qualities: Vec<UserVideoQuality>) -> Result<()> {
        self.ensure_joined("request video quality")?;
        self.client().request_video_quality(qualities).await
    }

    /// Stats of one transport, `None` when that transport does not exist
    pub async fn get_stats(&self, peer_type: PeerType) -> Result<Option<StatsReport>> {
        let connection = match peer_type {
            PeerType::Subscriber => self.subscriber_connection(),
            PeerType::PublisherUnspecified => self.publisher_connection().map(|(pc, _)| pc),
        };
        let Some(connection) = connection else {
            warn!(?peer_type, "Can't retrieve RTC stats without that transport");
            return Ok(None);
        };
        connection.stats().await.map(Some)
    }

    /// Report the stats of both transports to the SFU
    pub async fn send_stats(&self) -> Result<()> {
        self.ensure_joined("send stats")?;
        let subscriber_stats = encode_stats(self.subscriber_connection()).await?;
        let publisher_stats =
            encode_stats(self.publisher_connection().map(|(pc, _)| pc)).await?;
        self.client()
            .send_stats(subscriber_stats, publisher_stats)
            .await
    }
}
