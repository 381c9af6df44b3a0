//! Sitzungsereignisse
//!
//! Der `SessionController` arbeitet asynchron: `start_call` und
//! `answer_call` kehren sofort zurueck. Zustandswechsel und Fehler werden
//! deshalb als Ereignis ueber einen Broadcast-Kanal gemeldet.

use crate::types::SessionState;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Ereignisse einer Sitzung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Der Sitzungszustand hat sich geaendert
    ZustandGeaendert(SessionState),
    /// Handshake erfolgreich, Medien-Loops laufen zum angegebenen Peer
    MedienBereit { peer: SocketAddr },
    /// Handshake oder Audio-Geraet fehlgeschlagen (Text fuer die Oberflaeche)
    Fehler(String),
}
