//! Clicktrack device: listens to a hub and plays tracks in lockstep with every
//! other device, or acts as an operator issuing play/stop/seek.
//!
//! ## Listening
//! 1. **Preload**: every catalog track is fetched, decoded with Symphonia and
//!    resampled with Rubato to the output rate, so starts are instant.
//! 2. **Sync**: each connection begins with a clock sync burst, then a resync.
//! 3. **Follow**: hub broadcasts feed [`machine::PlaybackMachine`], which arms a
//!    single deferred start in local time and drives the CPAL engine.

pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod machine;
pub mod net;
pub mod operator;
pub mod runtime;
pub mod timeline;
pub mod timer;
