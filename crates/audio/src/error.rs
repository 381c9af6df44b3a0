//! Fehlertypen fuer die Audio-Geraete

use duett_core::DuettError;
use thiserror::Error;

/// Alle moeglichen Fehler eines Audio-Geraets
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio-Geraet nicht gefunden: {0}")]
    GeraetNichtGefunden(String),

    #[error("Kein Standard-Eingabegeraet verfuegbar")]
    KeinStandardEingabegeraet,

    #[error("Kein Standard-Ausgabegeraet verfuegbar")]
    KeinStandardAusgabegeraet,

    #[error("Stream-Fehler: {0}")]
    StreamFehler(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    /// In dieser Frame-Periode lag kein vollstaendiger Frame vor (nicht fatal)
    #[error("Kein Frame in dieser Periode verfuegbar")]
    KeinFrame,

    #[error(transparent)]
    Frame(#[from] DuettError),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

impl AudioError {
    /// Gibt true zurueck wenn der Loop mit dem naechsten Frame weitermachen kann
    pub fn ist_voruebergehend(&self) -> bool {
        matches!(self, Self::KeinFrame)
    }
}

pub type AudioResult<T> = Result<T, AudioError>;
