//! runrelay run controller
//!
//! Drives Runs to completion against an external job system that can only
//! be triggered and polled. Runs enter through the HTTP API; the controller
//! reconciles each one on its own actor until it is terminal.

pub mod actors;
pub mod api;
pub mod config;
pub mod controller;
pub mod events;
pub mod http_client;
pub mod requeue;
pub mod state;
pub mod store;
