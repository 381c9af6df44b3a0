//! duett – Bibliotheks-Root der Kommandozeile
//!
//! Oeffnet das Audio-Geraet, erstellt den `SessionController` und fuehrt
//! einen Anruf bis zum Auflegen (Ctrl-C) oder bis zum Fehler.

pub mod config;

use anyhow::Result;
use config::{AppConfig, AudioEinstellungen, GeraetArt};
use duett_audio::{AudioDevice, SynthConfig, SynthetischesGeraet};
use duett_core::SessionEvent;
use duett_session::SessionController;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Was die Sitzung tun soll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modus {
    /// `host` anrufen
    Anrufen { host: String },
    /// Auf einen Anruf warten
    Annehmen,
}

/// Oeffnet das konfigurierte Audio-Geraet
pub fn geraet_oeffnen(audio: &AudioEinstellungen) -> Result<Arc<dyn AudioDevice>> {
    match audio.geraet {
        GeraetArt::Synthetisch => {
            let (geraet, _abgespielt) = SynthetischesGeraet::neu(SynthConfig {
                frame_bytes: audio.frame_bytes,
                frame_dauer: audio.frame_dauer(),
                max_frames: None,
            })?;
            tracing::info!(frame_bytes = audio.frame_bytes, "Synthetisches Audio-Geraet");
            Ok(Arc::new(geraet))
        }
        #[cfg(feature = "hardware")]
        GeraetArt::Hardware => {
            let geraet = duett_audio::CpalGeraet::oeffnen(duett_audio::HardwareConfig {
                sample_rate: audio.sample_rate,
                frame_samples: audio.frame_bytes / 2,
                ..Default::default()
            })?;
            tracing::info!(sample_rate = audio.sample_rate, "Audio-Hardware geoeffnet");
            Ok(Arc::new(geraet))
        }
        #[cfg(not(feature = "hardware"))]
        GeraetArt::Hardware => Err(anyhow::anyhow!(
            "geraet = \"hardware\" benoetigt das Feature 'hardware'"
        )),
    }
}

/// Fuehrt einen Anruf aus und kehrt nach dem Auflegen zurueck
///
/// Gibt jeden Zustandswechsel als Statustext auf stdout aus. Ein
/// gescheiterter Verbindungsaufbau ist ein Fehler.
pub async fn ausfuehren(config: AppConfig, modus: Modus) -> Result<()> {
    let session_config = config.session_config()?;
    let geraet = geraet_oeffnen(&config.audio)?;

    let controller = SessionController::neu(session_config, geraet)?;
    let mut events = controller.abonnieren();
    println!("{}", controller.status_text());

    match &modus {
        Modus::Anrufen { host } => controller.start_call(host.as_str())?,
        Modus::Annehmen => controller.answer_call()?,
    }

    let strg_c = tokio::signal::ctrl_c();
    tokio::pin!(strg_c);

    let ergebnis = loop {
        tokio::select! {
            _ = &mut strg_c => {
                tracing::info!("Ctrl-C empfangen, lege auf");
                break Ok(());
            }
            event = events.recv() => match event {
                Ok(SessionEvent::ZustandGeaendert(zustand)) => {
                    println!("{}", zustand.status_text());
                }
                Ok(SessionEvent::MedienBereit { peer }) => {
                    tracing::info!(peer = %peer, "Audio laeuft");
                }
                Ok(SessionEvent::Fehler(nachricht)) => {
                    eprintln!("Fehler: {nachricht}");
                    if controller.zustand().ist_idle() {
                        break Err(anyhow::anyhow!(nachricht));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(verpasst = n, "Events verpasst");
                }
                Err(broadcast::error::RecvError::Closed) => break Ok(()),
            }
        }
    };

    controller.hang_up().await?;
    println!("{}", controller.status_text());
    ergebnis
}
