//! duett-protocol – Wire-Formate
//!
//! - [`control`] – Handshake-Token auf der TCP-Signalisierungsverbindung
//! - [`voice`] – Audio-Frames und das UDP-Datagrammformat

pub mod control;
pub mod voice;

pub use control::{SignalToken, ANSWER, CALL};
pub use voice::{AudioFrame, MedienFormat, MedienPaket, MAX_FRAME_BYTES, STANDARD_FRAME_BYTES};
