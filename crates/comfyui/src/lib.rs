//! ComfyUI WebSocket and REST client library.
//!
//! Provides typed message parsing, WebSocket session setup, HTTP API
//! wrappers, bounded retry ladders for cold-starting servers, and
//! prompt completion tracking.

pub mod api;
pub mod client;
pub mod connector;
pub mod history;
pub mod messages;
pub mod monitor;
