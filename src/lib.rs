//! fanethub: a real-time tracking backend for FANET devices.
//!
//! Low-power radio gateways publish raw FANET frames to an MQTT broker;
//! this crate ingests them, decodes the FANET protocol, filters
//! implausible observations, stores live state in a geospatial
//! key-value layer, persists history to MySQL, and fans out differential
//! updates to interactive map clients over a binary WebSocket protocol
//! and a REST snapshot API.

pub mod auth;
pub mod batch_writer;
pub mod boundary;
pub mod broadcaster;
pub mod config;
pub mod db;
pub mod error;
pub mod fanet;
pub mod filters;
pub mod geo;
pub mod ingest;
pub mod live_store;
pub mod log_format;
pub mod metrics;
pub mod model;
pub mod snapshot;
pub mod subscription;
pub mod validator;
pub mod web;
pub mod ws;

pub mod proto {
    include!(concat!(env!("OUT_DIR"), "/fanethub.snapshot.rs"));
}

pub use config::Config;
pub use error::{HttpError, HttpResult};
