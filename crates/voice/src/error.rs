//! Fehlertypen fuer die Medien-Engine

use thiserror::Error;

/// Fehlertyp fuer die Medien-Engine
#[derive(Debug, Error)]
pub enum VoiceError {
    /// IO-Fehler (UDP-Socket, Thread-Start)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Ungueltige Konfiguration (z.B. Jitter-Kapazitaet 0)
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    /// Ein Loop-Thread ist mit Panic beendet worden
    #[error("Thread '{0}' abgestuerzt")]
    ThreadAbgestuerzt(&'static str),
}

/// Result-Typ fuer die Medien-Engine
pub type VoiceResult<T> = Result<T, VoiceError>;
