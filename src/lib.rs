//! Image captioning front end for a BLIP captioning backend.
//!
//! Images are validated locally, previewed, sent to the backend's
//! `/api/caption` endpoint, and every successful caption is kept in a small
//! persistent history.

pub mod app;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod history;
pub mod intake;
pub mod server;

pub use app::App;
pub use client::{CaptionClient, CaptionJob, CaptionResult, HealthStatus, ModelInfo};
pub use config::Config;
pub use controller::{Controller, Effect, Event, HistoryItemView, Key, Phase, View};
pub use error::{CaptionError, ConfigError, ErrorKind, IntakeError, StoreError};
pub use history::{CaptionRecord, FileStore, HistoryStore, KeyValueStore, MemoryStore};
pub use intake::{CandidateFile, IntakeSource, SelectedImage};
