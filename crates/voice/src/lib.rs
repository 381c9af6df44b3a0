//! duett-voice – Medien-Engine
//!
//! Streamt Audio-Frames zwischen zwei Peers ueber UDP.
//!
//! ## Module
//! - [`jitter_buffer`] – Begrenzter, thread-sicherer FIFO mit Drop-Oldest
//! - [`udp`] – Capture-, Sende-, Empfangs- und Wiedergabe-Loop
//! - [`error`] – Fehlertypen

pub mod error;
pub mod jitter_buffer;
pub mod udp;

pub use error::{VoiceError, VoiceResult};
pub use jitter_buffer::{JitterBuffer, JitterBufferStatistik, STANDARD_KAPAZITAET};
pub use udp::{MedienSitzung, TransportConfig, TransportStatistik};
