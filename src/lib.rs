//! Signalling relay for peer-to-peer (WebRTC-style) sessions.
//!
//! Clients join named rooms scoped by an application identifier, discover
//! existing members, exchange opaque signalling payloads (SDP/ICE) and
//! broadcasts, and carry lightweight presence metadata. Each server
//! instance owns a fully in-memory, disjoint view of its rooms.

pub mod identity;
pub mod logger;
pub mod names;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod state;

pub use server::{router, run_server};
pub use state::{AppState, RelayConfig};
