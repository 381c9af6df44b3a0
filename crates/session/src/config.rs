//! Sitzungskonfiguration

use duett_core::{DuettError, Result};
use duett_protocol::MedienFormat;
use duett_signaling::HandshakeConfig;
use duett_voice::STANDARD_KAPAZITAET;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Standard-Port fuer den TCP-Handshake
pub const STANDARD_SIGNAL_PORT: u16 = 6000;
/// Standard-Port fuer die UDP-Medien
pub const STANDARD_MEDIEN_PORT: u16 = 6002;

/// Konfiguration eines `SessionController`
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Lokaler TCP-Port auf dem der Angerufene lauscht
    pub signal_port: u16,
    /// Lokaler UDP-Port fuer empfangene Medien
    pub medien_port: u16,
    /// Signal-Port des Peers (Standard: `signal_port`)
    pub peer_signal_port: Option<u16>,
    /// Medien-Port des Peers (Standard: `medien_port`)
    pub peer_medien_port: Option<u16>,
    /// Lokale Bind-Adresse fuer beide Ports
    pub bind_adresse: IpAddr,
    pub jitter_kapazitaet: usize,
    pub format: MedienFormat,
    /// Laenge der Queue zwischen Capture und Senden
    pub sende_queue: usize,
    pub handshake: HandshakeConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signal_port: STANDARD_SIGNAL_PORT,
            medien_port: STANDARD_MEDIEN_PORT,
            peer_signal_port: None,
            peer_medien_port: None,
            bind_adresse: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            jitter_kapazitaet: STANDARD_KAPAZITAET,
            format: MedienFormat::default(),
            sende_queue: 8,
            handshake: HandshakeConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Prueft die Konfiguration auf offensichtliche Fehler
    pub fn validieren(&self) -> Result<()> {
        if self.signal_port == 0 || self.medien_port == 0 {
            return Err(DuettError::konfiguration(
                "signal_port und medien_port duerfen nicht 0 sein",
            ));
        }
        if self.peer_signal_port == Some(0) || self.peer_medien_port == Some(0) {
            return Err(DuettError::konfiguration("Peer-Ports duerfen nicht 0 sein"));
        }
        if self.jitter_kapazitaet == 0 {
            return Err(DuettError::konfiguration(
                "jitter_kapazitaet muss mindestens 1 sein",
            ));
        }
        if self.sende_queue == 0 {
            return Err(DuettError::konfiguration("sende_queue muss mindestens 1 sein"));
        }
        if self.handshake.verbindungs_timeout.is_zero() || self.handshake.antwort_timeout.is_zero() {
            return Err(DuettError::konfiguration(
                "Handshake-Timeouts muessen groesser als 0 sein",
            ));
        }
        Ok(())
    }

    /// TCP-Port, den der Anrufer beim Peer anspricht
    pub fn ziel_signal_port(&self) -> u16 {
        self.peer_signal_port.unwrap_or(self.signal_port)
    }

    /// UDP-Port, an den Medien gesendet werden
    pub fn ziel_medien_port(&self) -> u16 {
        self.peer_medien_port.unwrap_or(self.medien_port)
    }

    pub fn signal_adresse(&self) -> SocketAddr {
        SocketAddr::new(self.bind_adresse, self.signal_port)
    }

    pub fn medien_adresse(&self) -> SocketAddr {
        SocketAddr::new(self.bind_adresse, self.medien_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn standardwerte() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.signal_port, 6000);
        assert_eq!(cfg.medien_port, 6002);
        assert_eq!(cfg.jitter_kapazitaet, 50);
        assert_eq!(cfg.format, MedienFormat::Roh);
        assert!(cfg.validieren().is_ok());
    }

    #[test]
    fn peer_ports_fallen_auf_lokale_ports_zurueck() {
        let mut cfg = SessionConfig::default();
        assert_eq!(cfg.ziel_signal_port(), 6000);
        assert_eq!(cfg.ziel_medien_port(), 6002);

        cfg.peer_signal_port = Some(7000);
        cfg.peer_medien_port = Some(7002);
        assert_eq!(cfg.ziel_signal_port(), 7000);
        assert_eq!(cfg.ziel_medien_port(), 7002);
    }

    #[test]
    fn ungueltige_werte_abgelehnt() {
        let mut cfg = SessionConfig::default();
        cfg.jitter_kapazitaet = 0;
        assert!(matches!(cfg.validieren(), Err(DuettError::Konfiguration(_))));

        let mut cfg = SessionConfig::default();
        cfg.medien_port = 0;
        assert!(cfg.validieren().is_err());

        let mut cfg = SessionConfig::default();
        cfg.peer_signal_port = Some(0);
        assert!(cfg.validieren().is_err());

        let mut cfg = SessionConfig::default();
        cfg.handshake.antwort_timeout = Duration::ZERO;
        assert!(cfg.validieren().is_err());
    }
}
