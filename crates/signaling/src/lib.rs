//! duett-signaling – Verbindungsaufbau ueber TCP
//!
//! Ein Anruf wird mit genau einem Token-Austausch aufgebaut, danach wird
//! die TCP-Verbindung wieder geschlossen. Ab dann laeuft nur noch UDP.
//!
//! ## Zustaende
//!
//! ```text
//!          anrufen()            ANSWER erhalten
//! Idle ---------------> Dialing -----------------> Connected
//!   |                      |                           |
//!   |  annehmen()          | Fehler / Timeout / Abbruch | schliessen()
//!   +---------------> Listening ---------------------> Closed
//!                          |  CALL erhalten, ANSWER gesendet
//!                          +-----------------------> Connected
//! ```
//!
//! Jeder Schritt ist zeitlich begrenzt (ausser dem Warten auf einen
//! Anrufer) und wird gegen das Shutdown-Signal der Sitzung geraced.

pub mod error;
pub mod handshake;

// Bequeme Re-Exporte
pub use error::{SignalingError, SignalingResult};
pub use handshake::{
    lauschen, HandshakeConfig, HandshakeZustand, SignalKanal, STANDARD_ANTWORT_TIMEOUT,
    STANDARD_VERBINDUNGS_TIMEOUT,
};
