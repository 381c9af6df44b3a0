//! Sitzungszustand und Handshake-Rollen
//!
//! ## Lebenszyklus einer Sitzung
//! ```text
//! Idle --start_call--> Signaling(Anrufer)     --Handshake ok--> Connected
//! Idle --answer_call-> Signaling(Angerufener) --Handshake ok--> Connected
//!                          |                                       |
//!                          +--Fehler-----------> Idle              |
//! (jeder Zustand) --hang_up--> Terminating --alle Threads beendet--> Idle
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rolle eines Peers im Handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rolle {
    /// Baut die Signalisierungsverbindung auf und sendet `CALL`
    Anrufer,
    /// Lauscht auf dem Signalisierungs-Port und antwortet mit `ANSWER`
    Angerufener,
}

impl std::fmt::Display for Rolle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anrufer => write!(f, "anrufer"),
            Self::Angerufener => write!(f, "angerufener"),
        }
    }
}

/// Zustand eines `SessionController`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// Keine Sitzung aktiv
    #[default]
    Idle,
    /// Handshake laeuft in der angegebenen Rolle
    Signaling(Rolle),
    /// Handshake erfolgreich, Audio laeuft in beide Richtungen
    Connected,
    /// `hang_up` wartet auf das Ende aller Threads
    Terminating,
}

impl SessionState {
    /// Statustext fuer die Oberflaeche
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::Idle => "Bereit",
            Self::Signaling(Rolle::Anrufer) => "Waehlt...",
            Self::Signaling(Rolle::Angerufener) => "Wartet auf Anruf...",
            Self::Connected => "Im Gespraech",
            Self::Terminating => "Legt auf...",
        }
    }

    /// Gibt true zurueck wenn ein neuer Anruf begonnen werden darf
    pub fn ist_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Signaling(rolle) => write!(f, "signaling({rolle})"),
            Self::Connected => write!(f, "connected"),
            Self::Terminating => write!(f, "terminating"),
        }
    }
}

/// Eindeutige Kennung eines Anrufversuchs (nur fuer Logs)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Erstellt eine neue zufaellige SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sitzung:{}", self.0)
    }
}
