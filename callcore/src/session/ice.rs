use callcore_proto::models::PeerType;
use std::collections::VecDeque;
use tracing::warn;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

/// Remote candidates kept per transport until its remote description is set
const MAX_PENDING_CANDIDATES: usize = 64;

/// Holds remote ICE candidates that arrived before their transport could
/// accept them
#[derive(Debug, Default)]
pub(crate) struct IceTrickleBuffer {
    subscriber: VecDeque<RTCIceCandidateInit>,
    publisher: VecDeque<RTCIceCandidateInit>,
}

impl IceTrickleBuffer {
    fn queue(&mut self, peer_type: PeerType) -> &mut VecDeque<RTCIceCandidateInit> {
        match peer_type {
            PeerType::Subscriber => &mut self.subscriber,
            PeerType::PublisherUnspecified => &mut self.publisher,
        }
    }

    pub(crate) fn push(&mut self, peer_type: PeerType, candidate: RTCIceCandidateInit) {
        let queue = self.queue(peer_type);
        if queue.len() >= MAX_PENDING_CANDIDATES {
            warn!(?peer_type, "Too many pending ICE candidates, dropping oldest");
            queue.pop_front();
        }
        queue.push_back(candidate);
    }

    /// Drain the candidates buffered for `peer_type` in arrival order
    pub(crate) fn take(&mut self, peer_type: PeerType) -> Vec<RTCIceCandidateInit> {
        self.queue(peer_type).drain(..).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self, peer_type: PeerType) -> usize {
        match peer_type {
            PeerType::Subscriber => self.subscriber.len(),
            PeerType::PublisherUnspecified => self.publisher.len(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.subscriber.clear();
        self.publisher.clear();
    }
}
