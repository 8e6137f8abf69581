//! Common functionality for the ad rotation service.
//!
//! This crate holds the platform-free core: the rotation engine, campaign
//! retrieval and staging, the background worker and the hand-off to the
//! host's presentation surfaces.
//!
//! # Modules
//!
//! - [`backoff`]: Error breaker for campaign retrieval
//! - [`bridge`]: Stack of presentation surfaces and their event queues
//! - [`constants`]: Application-wide constants and default values
//! - [`controller`]: Surface-side controller driving a slide renderer
//! - [`coordinator`]: The campaign service and its background worker
//! - [`error`]: Error types and error handling utilities
//! - [`logging`]: Log dispatcher setup
//! - [`models`]: Slots, transitions and campaign descriptors
//! - [`package`]: Campaign payload classification and decoding
//! - [`parser`]: Campaign descriptor parsing
//! - [`refresh`]: Campaign refresh scheduling
//! - [`rotation`]: Slot rotation state machine
//! - [`settings`]: Configuration management and validation
//! - [`staging`]: On-disk staging of unpacked campaigns
//! - [`test_support`]: Testing utilities and fakes
//! - [`tracking`]: Fire-and-forget tap tracking
//! - [`transport`]: Request contract and HTTP transport

pub mod backoff;
pub mod bridge;
pub mod constants;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod models;
pub mod package;
pub mod parser;
pub mod refresh;
pub mod rotation;
pub mod settings;
pub mod staging;
pub mod test_support;
pub mod tracking;
pub mod transport;
