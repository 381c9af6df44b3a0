//! Fehlertypen fuer Duett
//!
//! Zentraler Fehler-Enum fuer Fehler, die nicht an ein einzelnes Subsystem
//! gebunden sind (Konfiguration, Protokoll-Kodierung). Die Subsystem-Crates
//! definieren eigene Fehler und konvertieren diesen via `#[from]`.

use thiserror::Error;

/// Globaler Result-Alias fuer Duett
pub type Result<T> = std::result::Result<T, DuettError>;

/// Subsystem-uebergreifende Fehler
#[derive(Debug, Error)]
pub enum DuettError {
    // --- Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    #[error("Frame zu gross: {laenge} Bytes (maximal {maximum})")]
    FrameZuGross { laenge: usize, maximum: usize },

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

impl DuettError {
    /// Erstellt einen Konfigurationsfehler aus einer beliebigen Nachricht
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }

    /// Erstellt einen Protokollfehler aus einer beliebigen Nachricht
    pub fn ungueltig(msg: impl Into<String>) -> Self {
        Self::UngueltigeNachricht(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = DuettError::konfiguration("Jitter-Kapazitaet 0");
        assert_eq!(e.to_string(), "Konfigurationsfehler: Jitter-Kapazitaet 0");
    }

    #[test]
    fn frame_zu_gross_anzeige() {
        let e = DuettError::FrameZuGross {
            laenge: 4096,
            maximum: 2048,
        };
        assert!(e.to_string().contains("4096"));
        assert!(e.to_string().contains("2048"));
    }
}
