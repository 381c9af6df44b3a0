//! Fehlertypen fuer den Handshake

use thiserror::Error;

/// Fehlertyp fuer den Signaling-Handshake
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Verbindung zum Peer konnte nicht aufgebaut werden
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    /// Falsches, unvollstaendiges oder fehlendes Token
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Ein Handshake-Schritt hat das Zeitlimit ueberschritten
    #[error("Timeout beim {0}")]
    Timeout(&'static str),

    /// Durch Auflegen abgebrochen
    #[error("Handshake abgebrochen")]
    Abgebrochen,

    /// Hostname konnte nicht aufgeloest werden
    #[error("Adresse '{0}' nicht aufloesbar")]
    Aufloesung(String),
}

impl SignalingError {
    /// Gibt true zurueck wenn der Handshake absichtlich abgebrochen wurde
    pub fn ist_abbruch(&self) -> bool {
        matches!(self, Self::Abgebrochen)
    }
}

/// Result-Typ fuer den Handshake
pub type SignalingResult<T> = Result<T, SignalingError>;
