//! duett-core – Gemeinsame Typen, Ereignisse und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die von allen anderen
//! Duett-Crates gemeinsam genutzt werden: Sitzungszustand, Rollen im
//! Handshake, Sitzungsereignisse und der zentrale Fehler-Enum.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{DuettError, Result};
pub use event::SessionEvent;
pub use types::{Rolle, SessionId, SessionState};
