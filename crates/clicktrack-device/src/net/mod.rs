//! Hub transport helpers.

pub mod http;
pub mod requests;
pub mod ws;
