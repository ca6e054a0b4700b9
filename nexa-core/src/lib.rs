//! Core library for the Nexa playback delivery subsystem.
//!
//! Owns the domain models, persistence repositories, and the services that
//! turn a client's request to play a library item into a live stream plan:
//! capability negotiation, stream planning, playlist cursors, and the
//! playback session state machine. Segment production lives in
//! `nexa-transcode`; the HTTP surface lives in `nexa-api`.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod service;

pub use error::{Error, Result};
