//! duett-session – Sitzungssteuerung
//!
//! Der [`SessionController`] ist die einzige Schnittstelle fuer die
//! Oberflaeche: `start_call`, `answer_call`, `hang_up`. Er besitzt den
//! Sitzungszustand, startet den Handshake als tokio-Task und danach die
//! Medien-Loops aus `duett-voice`.
//!
//! ```text
//! start_call / answer_call
//!     |
//!     v
//! Signal-Task (duett-signaling) --Peer-IP--> MedienSitzung (duett-voice)
//!     |                                          |
//!     +-- Fehler --> SessionEvent::Fehler        +-- Capture / Senden
//!                                                +-- Empfang / Wiedergabe
//! ```
//!
//! Jeder Controller haelt seinen Zustand selbst, es gibt keine globalen
//! Variablen.

pub mod config;
pub mod controller;
pub mod error;

pub use config::SessionConfig;
pub use controller::SessionController;
pub use error::{SessionError, SessionResult};
