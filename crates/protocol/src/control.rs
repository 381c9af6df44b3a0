//! Signalisierungs-Protokoll (TCP)
//!
//! Der Handshake besteht aus genau zwei festen Token ohne Laengenpraefix,
//! Version oder Authentifizierung:
//!
//! ```text
//! Anrufer                    Angerufener
//!    | ---- "CALL"   (4 B) ---> |
//!    | <--- "ANSWER" (6 B) ---- |
//! ```
//!
//! Danach wird die Verbindung geschlossen.

use duett_core::{DuettError, Result};

/// Token des Anrufers
pub const CALL: &[u8; 4] = b"CALL";

/// Antwort-Token des Angerufenen
pub const ANSWER: &[u8; 6] = b"ANSWER";

/// Die beiden Handshake-Token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalToken {
    Call,
    Answer,
}

impl SignalToken {
    /// Bytes auf der Leitung
    pub fn bytes(&self) -> &'static [u8] {
        match self {
            Self::Call => CALL,
            Self::Answer => ANSWER,
        }
    }

    /// Laenge des Tokens auf der Leitung
    pub fn laenge(&self) -> usize {
        self.bytes().len()
    }

    /// Prueft ob `empfangen` exakt dem erwarteten Token entspricht
    ///
    /// # Fehler
    /// `UngueltigeNachricht` wenn die Bytes abweichen (Protokoll-Mismatch).
    pub fn erwarten(self, empfangen: &[u8]) -> Result<Self> {
        if empfangen == self.bytes() {
            Ok(self)
        } else {
            Err(DuettError::ungueltig(format!(
                "erwartet {:?}, erhalten {:?}",
                String::from_utf8_lossy(self.bytes()),
                String::from_utf8_lossy(empfangen)
            )))
        }
    }
}

impl std::fmt::Display for SignalToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Call => "CALL",
            Self::Answer => "ANSWER",
        })
    }
}
