//! Signaling data model shared between the call session core and the SFU.
//!
//! All types serialize to the protobuf-JSON shape the SFU signaling server
//! accepts: lowerCamel field names, enums as their SCREAMING_SNAKE names and
//! oneof payloads as externally tagged objects.

pub mod events;
pub mod models;
pub mod signal;
mod types;

pub use events::{EventKind, SignalingMessage};
pub use types::{SessionId, UserId};
