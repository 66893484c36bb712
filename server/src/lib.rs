//! # Presence Server Library
//!
//! This library provides the authoritative server for a shared virtual
//! space: who is present, where they are, whether their mic and speaker are
//! live, and which voice address their peers should call. All participant
//! state decisions are made here; clients receive complete roster snapshots
//! and conform to them.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Presence
//! The session registry is the single writer for all participant records.
//! A participant may only mutate its own record (the server resolves the
//! sender's identity from the connection table), and every mutation is
//! immediately followed by a broadcast of the complete roster.
//!
//! ### Full-Snapshot Broadcasting
//! On every state-affecting event — login, logout, disconnect, or a field
//! update — the server emits the entire roster, never a delta. A client that
//! missed an intermediate update is automatically corrected by the next
//! snapshot, so no sequence numbers or merge logic exist anywhere in the
//! protocol.
//!
//! ### Liveness
//! Each connection is probed on a fixed interval and swept by an independent
//! miss-check timer. A connection that fails to ack across one full sweep is
//! removed exactly as if it had logged out. The sweep is intentionally
//! coarse: a false positive costs the client a reconnect, nothing more.
//!
//! ### Ephemeral Relays
//! Chat, head-stamps, and pen strokes pass through as stateless relays. The
//! server keeps no record of them beyond the capped admin log rings; a lost
//! relay is a cosmetic miss, never a consistency violation.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Event Loop
//! One `tokio::select!` loop processes every inbound event in sequence and
//! owns all mutable state. Auxiliary tasks — the socket receiver, the
//! outbound sender, the two liveness timers, and the admin HTTP listener —
//! communicate with it exclusively over channels, so registry mutation plus
//! broadcast is atomic with respect to other events.
//!
//! ### UDP-Based Communication
//! Clients talk to the server over UDP with bincode-serialized packets. The
//! full-snapshot protocol makes datagram loss harmless for presence state;
//! chat and ephemeral relays are best-effort by design.
//!
//! ## Module Organization
//!
//! - [`registry`] — the session registry: login with unique-display-name
//!   enforcement, own-record field updates, removal, snapshot publication.
//! - [`liveness`] — probe/ack bookkeeping behind the two-timer design.
//! - [`network`] — the UDP transport, the event loop, relay fan-out, and the
//!   connection table.
//! - [`admin`] — the authenticated HTTP kick/stats surface and log rings.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod liveness;
pub mod network;
pub mod registry;
