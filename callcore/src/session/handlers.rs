//! Signaling event handling for a call session
//!
//! Dispatcher handlers only enqueue. One worker task per session drains the
//! queue so asynchronous reactions run one at a time in arrival order. The
//! worker stops as soon as its queue is dropped, discarding whatever is
//! still queued.

use callcore_proto::events::{IceTrickle, SubscriberOffer};
use callcore_proto::models::PeerType;
use callcore_proto::{EventKind, SignalingMessage};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, trace, warn};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

use super::{CallSession, Phase, Publisher, SessionInner};
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::media::{MessageHandler, PeerConnection, SessionDescription};

pub(super) fn register_event_handlers(dispatcher: &Dispatcher, session: &Weak<SessionInner>) {
    for kind in EventKind::ALL {
        let session = Weak::clone(session);
        dispatcher.on(kind, move |message| {
            session
                .upgrade()
                .map_or(Ok(()), |inner| inner.enqueue(message))
        });
    }
}

/// Sending half of a session's event worker; dropping it stops the worker
pub(super) struct EventQueue {
    tx: mpsc::UnboundedSender<SignalingMessage>,
    _stop: DropGuard,
}

pub(super) fn spawn_event_worker(session: Weak<SessionInner>) -> EventQueue {
    let (tx, mut rx) = mpsc::unbounded_channel::<SignalingMessage>();
    let stop = CancellationToken::new();
    let stopped = stop.clone();

    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                biased;
                () = stopped.cancelled() => break,
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            let Some(inner) = session.upgrade() else {
                break;
            };

            let call = CallSession { inner };
            if !call.is_active() {
                trace!(event = %message.kind(), "Session inactive, dropping queued event");
                continue;
            }
            tokio::select! {
                biased;
                () = stopped.cancelled() => break,
                () = call.handle_event(message) => {}
            }
        }
        debug!("Session event worker stopped");
    });

    EventQueue {
        tx,
        _stop: stop.drop_guard(),
    }
}

pub(super) async fn apply_candidates(
    connection: &Arc<dyn PeerConnection>,
    candidates: Vec<RTCIceCandidateInit>,
) {
    if !candidates.is_empty() {
        debug!(count = candidates.len(), "Applying buffered ICE candidates");
    }
    for candidate in candidates {
        if let Err(e) = connection.add_ice_candidate(candidate).await {
            warn!(error = %e, "Failed to add remote ICE candidate");
        }
    }
}

impl SessionInner {
    fn enqueue(&self, message: &SignalingMessage) -> anyhow::Result<()> {
        let core = self.core.lock();
        let Some(events) = &core.events else {
            trace!(event = %message.kind(), "Session not joined, dropping event");
            return Ok(());
        };
        events
            .tx
            .send(message.clone())
            .map_err(|_| anyhow::anyhow!("Session event queue closed"))
    }
}

enum CandidateRoute {
    Apply(Arc<dyn PeerConnection>),
    Buffer,
    Drop,
}

impl CallSession {
    fn is_active(&self) -> bool {
        matches!(
            self.inner.core.lock().phase,
            Phase::Joining { .. } | Phase::Joined { .. }
        )
    }

    /// Decode data channel messages and dispatch them
    pub(super) fn signaling_message_handler(&self) -> MessageHandler {
        let dispatcher = self.inner.dispatcher.clone();
        Box::new(move |data: Vec<u8>| {
            match serde_json::from_slice::<SignalingMessage>(&data) {
                Ok(message) => {
                    trace!(event = %message.kind(), "Signaling event received");
                    dispatcher.dispatch(&message);
                }
                Err(e) => warn!(error = %e, "Dropping undecodable signaling event"),
            }
        })
    }

    /// Forward locally gathered candidates of `connection` to the SFU
    pub(super) fn watch_local_candidates(
        &self,
        connection: &Arc<dyn PeerConnection>,
        peer_type: PeerType,
    ) {
        let client = self.client();
        let publisher = peer_type == PeerType::PublisherUnspecified;

        connection.on_ice_candidate(Box::new(move |candidate| {
            let Some(candidate) = candidate else {
                debug!(?peer_type, "ICE gathering complete");
                return;
            };
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                warn!(?peer_type, "No runtime available to send ICE candidate");
                return;
            };

            let client = client.clone();
            runtime.spawn(async move {
                if let Err(e) = client.send_ice_candidate(publisher, &candidate).await {
                    warn!(?peer_type, error = %e, "Failed to send ICE candidate");
                }
            });
        }));
    }

    async fn handle_event(&self, message: SignalingMessage) {
        match message {
            SignalingMessage::ChangePublishQuality(change) => {
                for sender in change.video_senders {
                    let rids = sender.active_rids();
                    info!(?rids, "SFU requested publish quality change");
                    if let Err(e) = self.update_publish_quality(&rids).await {
                        warn!(error = %e, "Failed to apply publish quality");
                    }
                }
            }
            SignalingMessage::SubscriberOffer(offer) => {
                if let Err(e) = self.renegotiate_subscriber(offer).await {
                    warn!(error = %e, "Subscriber renegotiation failed");
                }
            }
            SignalingMessage::IceTrickle(trickle) => {
                if let Err(e) = self.add_remote_candidate(trickle).await {
                    warn!(error = %e, "Failed to handle remote ICE candidate");
                }
            }
            SignalingMessage::Error(event) => {
                let Some(sfu_error) = event.error else {
                    warn!("SFU reported an error without details");
                    return;
                };
                error!(
                    code = %sfu_error.code,
                    reason = %sfu_error.message,
                    should_retry = sfu_error.should_retry,
                    "SFU reported an error"
                );
                let mut core = self.inner.core.lock();
                if matches!(core.phase, Phase::Joining { .. } | Phase::Joined { .. }) {
                    core.last_error = Some(sfu_error);
                }
            }
        }
    }

    async fn renegotiate_subscriber(&self, offer: SubscriberOffer) -> Result<()> {
        let Some(subscriber) = self.subscriber_connection() else {
            debug!("Not joined, ignoring subscriber offer");
            return Ok(());
        };

        debug!(ice_restart = offer.ice_restart, "Renegotiating subscriber");
        subscriber
            .set_remote_description(SessionDescription::offer(offer.sdp))
            .await?;
        let answer = subscriber.create_answer().await?;
        if !answer.has_body() {
            return Err(Error::Protocol("Subscriber answer has no SDP".to_string()));
        }
        subscriber.set_local_description(answer.clone()).await?;
        self.client()
            .send_answer(PeerType::Subscriber, answer.sdp)
            .await
    }

    async fn add_remote_candidate(&self, trickle: IceTrickle) -> Result<()> {
        let candidate: RTCIceCandidateInit = serde_json::from_str(&trickle.ice_candidate)?;
        let peer_type = trickle.peer_type;

        let route = {
            let mut core = self.inner.core.lock();
            let route = match (&core.phase, peer_type) {
                (Phase::Joined { subscriber, .. }, PeerType::Subscriber) => {
                    CandidateRoute::Apply(Arc::clone(subscriber))
                }
                (
                    Phase::Joined {
                        publisher: Publisher::Published(publisher),
                        ..
                    },
                    PeerType::PublisherUnspecified,
                ) => CandidateRoute::Apply(Arc::clone(publisher)),
                (Phase::Joining { .. } | Phase::Joined { .. }, _) => CandidateRoute::Buffer,
                _ => CandidateRoute::Drop,
            };
            if matches!(route, CandidateRoute::Buffer) {
                core.pending_candidates.push(peer_type, candidate.clone());
            }
            route
        };

        match route {
            CandidateRoute::Apply(connection) => connection.add_ice_candidate(candidate).await,
            CandidateRoute::Buffer => {
                debug!(?peer_type, "Buffering remote ICE candidate");
                Ok(())
            }
            CandidateRoute::Drop => {
                debug!(?peer_type, "Session inactive, dropping remote ICE candidate");
                Ok(())
            }
        }
    }

    #[cfg(test)]
    pub(super) fn pending_candidate_count(&self, peer_type: PeerType) -> usize {
        self.inner.core.lock().pending_candidates.len(peer_type)
    }
}
