//! # Ampster - electricity price publisher
//!
//! Fetches a per-country JSON document of electricity prices every hour,
//! republishes each top-level field as an entity, and optionally uploads a
//! selection of entity states to a remote endpoint on a timer.
//!
//! ## Architecture
//!
//! - `fetcher`: single HTTP GET of the price document
//! - `scheduler`: hourly and interval timers
//! - `coordinator`: single-flight refresh, snapshot ownership, listeners
//! - `price` / `sensor`: projection of snapshot keys into entities
//! - `entity`: registry answering state queries
//! - `uploader`: periodic POST of selected entity states
//! - `buttons` / `automation`: manual triggers and the price threshold hook
//! - `integration`: per-entry setup, unload and reload
//! - `config`, `logging`, `error`: ambient plumbing
//! - `web`: HTTP API

pub mod automation;
pub mod buttons;
pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod fetcher;
pub mod integration;
pub mod logging;
pub mod price;
pub mod scheduler;
pub mod sensor;
pub mod uploader;
pub mod web;

pub use config::Config;
pub use error::{AmpsterError, Result};
pub use integration::Ampster;
