//! # Presence Client Library
//!
//! Client-side engine for the shared virtual space: mirrors the server's
//! roster into local shadow entities, smooths their motion between network
//! updates, keeps the peer-to-peer voice mesh converged on the current
//! presence set, and displays chat and the two self-expiring broadcast
//! effects (head-stamps and pen strokes).
//!
//! ## Core Responsibilities
//!
//! ### Presence Reconciliation
//! Every roster snapshot is diffed against the locally-held shadow entities:
//! new participants get a renderable proxy from the scene collaborator,
//! known ones get fresh network targets and flags, departed ones are
//! destroyed. Applying the same snapshot twice changes nothing, so lost or
//! duplicated datagrams are harmless.
//!
//! ### Motion Smoothing
//! Rendered poses converge toward network targets by a fixed fraction per
//! render tick, with yaw taking the shortest angular path. The local pose is
//! computed from input every tick, never interpolated, and pushed outward at
//! a fixed 10 Hz through a monotonic-clock gate.
//!
//! ### Voice-Mesh Orchestration
//! After every snapshot the voice manager reconciles live audio links
//! against the set of known remote voice addresses: exactly one link per
//! present peer, none for the departed. Negotiation failures leave the peer
//! absent for the next pass. Mic mute disables the capture track only;
//! speaker mute and gain apply to playback sinks.
//!
//! ### Ephemeral Effects
//! Stamps and strokes live on self-expiring boards keyed by owner and by
//! emitter timestamp respectively; expiry is driven purely by this client's
//! clock, with no cancellation protocol.
//!
//! ## Module Organization
//!
//! - [`presence`] — shadow entities and snapshot reconciliation.
//! - [`interp`] — exponential smoothing and the position push gate.
//! - [`voice`] — the per-peer link state machine over [`voice::VoiceTransport`].
//! - [`ephemeral`] — the generic expiring map plus stamp/stroke boards.
//! - [`chat`] — capped chat history and mention extraction.
//! - [`scene`] — traits for the rendering/input/chat-display collaborators.
//! - [`network`] — the client event loop tying everything to the wire.

pub mod chat;
pub mod ephemeral;
pub mod interp;
pub mod network;
pub mod presence;
pub mod scene;
pub mod voice;
