//! Authoritative 3v3 arcade hockey: fixed-step simulation, WebSocket rooms,
//! and the client-side prediction/interpolation library.
//!
//! The binary in `main.rs` runs the server; the `client` module is pure and
//! I/O-free so native clients and headless harnesses can link against it.

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod room;
pub mod util;
pub mod ws;
