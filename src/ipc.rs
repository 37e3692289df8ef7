//! Typed catalog of the messages exchanged with the host, grouped by route.

pub mod agent;
pub mod host;
pub mod webview;
