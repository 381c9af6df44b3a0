//! Fehlertypen fuer die Sitzungssteuerung

use duett_core::{DuettError, SessionState};
use duett_signaling::SignalingError;
use duett_voice::VoiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation im aktuellen Zustand nicht erlaubt
    #[error("Nicht erlaubt im Zustand '{0}'")]
    UngueltigerZustand(SessionState),

    /// Der Controller wurde ausserhalb einer tokio-Laufzeit erstellt
    #[error("Keine tokio-Laufzeit verfuegbar")]
    KeineLaufzeit,

    #[error("Medien: {0}")]
    Voice(#[from] VoiceError),

    #[error("Signalisierung: {0}")]
    Signaling(#[from] SignalingError),

    #[error(transparent)]
    Kern(#[from] DuettError),
}

pub type SessionResult<T> = Result<T, SessionError>;
