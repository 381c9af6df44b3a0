//! # duett-observability
//!
//! Structured Logging via tracing-subscriber (Text oder JSON), gesteuert
//! ueber Konfigurationsdatei und Umgebungsvariablen.

pub mod logging;

pub use logging::{logging_initialisieren, LogFormat, LoggingError, LoggingConfig};
