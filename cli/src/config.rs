//! Anwendungs-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass `duett` ohne Konfigurationsdatei
//! lauffaehig ist.

use anyhow::Context;
use duett_observability::LoggingConfig;
use duett_protocol::{MedienFormat, STANDARD_FRAME_BYTES};
use duett_session::config::{STANDARD_MEDIEN_PORT, STANDARD_SIGNAL_PORT};
use duett_session::SessionConfig;
use duett_signaling::HandshakeConfig;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Vollstaendige Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub netzwerk: NetzwerkEinstellungen,
    pub audio: AudioEinstellungen,
    pub signalisierung: SignalisierungsEinstellungen,
    pub medien: MedienEinstellungen,
    pub logging: LoggingConfig,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Lokale Bind-Adresse fuer Signal- und Medien-Port
    pub bind_adresse: String,
    /// TCP-Port fuer den Handshake
    pub signal_port: u16,
    /// UDP-Port fuer Audio
    pub medien_port: u16,
    /// Abweichender Signal-Port des Peers (z.B. zwei Instanzen auf einem Host)
    pub peer_signal_port: Option<u16>,
    /// Abweichender Medien-Port des Peers
    pub peer_medien_port: Option<u16>,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            signal_port: STANDARD_SIGNAL_PORT,
            medien_port: STANDARD_MEDIEN_PORT,
            peer_signal_port: None,
            peer_medien_port: None,
        }
    }
}

/// Welches Audio-Geraet verwendet wird
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeraetArt {
    /// Testton, abgespielte Frames werden verworfen
    #[default]
    Synthetisch,
    /// Soundkarte via cpal (Feature `hardware`)
    Hardware,
}

/// Audio-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    pub geraet: GeraetArt,
    /// Kapazitaet des Jitter Buffers in Frames
    pub jitter_kapazitaet: usize,
    /// Bytes pro Frame (16-bit Mono: 2 Bytes pro Sample)
    pub frame_bytes: usize,
    /// Abtastrate in Hz
    pub sample_rate: u32,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            geraet: GeraetArt::Synthetisch,
            jitter_kapazitaet: SessionConfig::default().jitter_kapazitaet,
            frame_bytes: STANDARD_FRAME_BYTES,
            sample_rate: 16_000,
        }
    }
}

impl AudioEinstellungen {
    /// Dauer eines Frames bei 16-bit Mono
    pub fn frame_dauer(&self) -> Duration {
        let samples = (self.frame_bytes / 2) as u64;
        Duration::from_micros(samples * 1_000_000 / self.sample_rate.max(1) as u64)
    }
}

/// Zeitlimits des Handshakes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalisierungsEinstellungen {
    pub verbindungs_timeout_ms: u64,
    pub antwort_timeout_ms: u64,
}

impl Default for SignalisierungsEinstellungen {
    fn default() -> Self {
        let standard = HandshakeConfig::default();
        Self {
            verbindungs_timeout_ms: standard.verbindungs_timeout.as_millis() as u64,
            antwort_timeout_ms: standard.antwort_timeout.as_millis() as u64,
        }
    }
}

/// Medien-Einstellungen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MedienEinstellungen {
    /// "roh" oder "sequenziert" (beide Seiten muessen gleich sein)
    pub format: MedienFormat,
}

impl AppConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei
    ///
    /// `None` wenn die Datei nicht existiert. Der Aufrufer entscheidet dann
    /// ueber Standardwerte und meldet das, sobald das Logging steht.
    pub fn laden(pfad: &str) -> anyhow::Result<Option<Self>> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(Some(config))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Baut die Konfiguration des SessionControllers
    pub fn session_config(&self) -> anyhow::Result<SessionConfig> {
        let bind_adresse: IpAddr = self
            .netzwerk
            .bind_adresse
            .parse()
            .with_context(|| format!("Ungueltige bind_adresse '{}'", self.netzwerk.bind_adresse))?;

        let config = SessionConfig {
            signal_port: self.netzwerk.signal_port,
            medien_port: self.netzwerk.medien_port,
            peer_signal_port: self.netzwerk.peer_signal_port,
            peer_medien_port: self.netzwerk.peer_medien_port,
            bind_adresse,
            jitter_kapazitaet: self.audio.jitter_kapazitaet,
            format: self.medien.format,
            handshake: HandshakeConfig {
                verbindungs_timeout: Duration::from_millis(self.signalisierung.verbindungs_timeout_ms),
                antwort_timeout: Duration::from_millis(self.signalisierung.antwort_timeout_ms),
            },
            ..Default::default()
        };
        config.validieren()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duett_observability::LogFormat;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.netzwerk.signal_port, 6000);
        assert_eq!(cfg.netzwerk.medien_port, 6002);
        assert_eq!(cfg.audio.geraet, GeraetArt::Synthetisch);
        assert_eq!(cfg.audio.jitter_kapazitaet, 50);
        assert_eq!(cfg.signalisierung.verbindungs_timeout_ms, 5_000);
        assert_eq!(cfg.signalisierung.antwort_timeout_ms, 30_000);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.session_config().is_ok());
    }

    #[test]
    fn frame_dauer_standard() {
        // 1024 Bytes = 512 Samples bei 16 kHz
        assert_eq!(
            AudioEinstellungen::default().frame_dauer(),
            Duration::from_millis(32)
        );
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [netzwerk]
            bind_adresse = "127.0.0.1"
            peer_signal_port = 7000

            [medien]
            format = "sequenziert"

            [signalisierung]
            antwort_timeout_ms = 1500

            [logging]
            format = "json"
        "#;
        let cfg: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.netzwerk.peer_signal_port, Some(7000));
        assert_eq!(cfg.medien.format, MedienFormat::Sequenziert);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.signal_port, 6000);

        let session = cfg.session_config().unwrap();
        assert_eq!(session.ziel_signal_port(), 7000);
        assert_eq!(session.ziel_medien_port(), 6002);
        assert_eq!(session.handshake.antwort_timeout, Duration::from_millis(1500));
        assert_eq!(session.bind_adresse, "127.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn ungueltige_werte_abgelehnt() {
        let mut cfg = AppConfig::default();
        cfg.netzwerk.bind_adresse = "kein-ip".into();
        assert!(cfg.session_config().is_err());

        let mut cfg = AppConfig::default();
        cfg.audio.jitter_kapazitaet = 0;
        assert!(cfg.session_config().is_err());

        assert!(toml::from_str::<AppConfig>("[medien]\nformat = \"opus\"").is_err());
    }

    #[test]
    fn fehlende_datei_ist_kein_fehler() {
        assert!(AppConfig::laden("/nicht/vorhanden/duett.toml")
            .unwrap()
            .is_none());
    }

    #[test]
    fn datei_wird_gelesen() {
        let pfad = std::env::temp_dir().join(format!("duett-test-{}.toml", std::process::id()));
        std::fs::write(&pfad, "[netzwerk]\nsignal_port = 7100\n").unwrap();
        let cfg = AppConfig::laden(pfad.to_str().unwrap()).unwrap().unwrap();
        std::fs::remove_file(&pfad).unwrap();
        assert_eq!(cfg.netzwerk.signal_port, 7100);
        assert_eq!(cfg.netzwerk.medien_port, 6002);
    }
}
