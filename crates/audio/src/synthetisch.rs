//! Synthetisches Audio-Geraet
//!
//! Erzeugt nummerierte Sinus-Frames im Takt der Frame-Periode und leitet
//! abgespielte Frames in einen Kanal weiter. Wird fuer Tests und fuer den
//! Betrieb ohne Soundkarte verwendet.
//!
//! Aufbau eines erzeugten Frames:
//! ```text
//! [ Frame-Nummer u32 big-endian ][ 440-Hz-Sinus, i16 little-endian ... ]
//! ```

use bytes::{BufMut, BytesMut};
use crossbeam_channel::{Receiver, Sender};
use duett_protocol::{AudioFrame, MAX_FRAME_BYTES, STANDARD_FRAME_BYTES};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::device::AudioDevice;
use crate::error::{AudioError, AudioResult};

/// Abtastrate des erzeugten Tons
const SYNTH_SAMPLE_RATE: f32 = 16_000.0;
/// Frequenz des erzeugten Tons
const SYNTH_FREQUENZ: f32 = 440.0;

/// Konfiguration fuer das synthetische Geraet
#[derive(Debug, Clone)]
pub struct SynthConfig {
    /// Bytes pro Frame (mindestens 4 fuer die Frame-Nummer)
    pub frame_bytes: usize,
    /// Dauer einer Frame-Periode (Takt von `capture` und `play`)
    pub frame_dauer: Duration,
    /// Nach so vielen Frames liefert `capture` nur noch `KeinFrame`
    pub max_frames: Option<u64>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            frame_bytes: STANDARD_FRAME_BYTES,
            frame_dauer: Duration::from_millis(32),
            max_frames: None,
        }
    }
}

/// Audio-Geraet ohne Hardware
pub struct SynthetischesGeraet {
    config: SynthConfig,
    aufgenommen: AtomicU64,
    abgespielt_tx: Sender<AudioFrame>,
}

impl SynthetischesGeraet {
    /// Erstellt das Geraet und den Empfaenger fuer abgespielte Frames
    ///
    /// # Fehler
    /// `Konfiguration` wenn `frame_bytes` kleiner als 4 oder groesser als
    /// `MAX_FRAME_BYTES` ist.
    pub fn neu(config: SynthConfig) -> AudioResult<(Self, Receiver<AudioFrame>)> {
        if config.frame_bytes < 4 || config.frame_bytes > MAX_FRAME_BYTES {
            return Err(AudioError::Konfiguration(format!(
                "frame_bytes muss zwischen 4 und {} liegen, ist {}",
                MAX_FRAME_BYTES, config.frame_bytes
            )));
        }
        let (abgespielt_tx, abgespielt_rx) = crossbeam_channel::unbounded();
        Ok((
            Self {
                config,
                aufgenommen: AtomicU64::new(0),
                abgespielt_tx,
            },
            abgespielt_rx,
        ))
    }

    /// Anzahl bisher aufgenommener Frames
    pub fn aufgenommen(&self) -> u64 {
        self.aufgenommen.load(Ordering::Relaxed)
    }

    /// Liest die Frame-Nummer aus einem synthetisch erzeugten Frame
    pub fn frame_nummer(frame: &AudioFrame) -> Option<u32> {
        let d = frame.daten();
        (d.len() >= 4).then(|| u32::from_be_bytes([d[0], d[1], d[2], d[3]]))
    }

    fn frame_erzeugen(&self, nummer: u64) -> AudioResult<AudioFrame> {
        let mut buf = BytesMut::with_capacity(self.config.frame_bytes);
        buf.put_u32(nummer as u32);

        let samples_pro_frame = (self.config.frame_bytes / 2) as u64;
        let mut i = 0u64;
        while buf.len() + 2 <= self.config.frame_bytes {
            let t = (nummer * samples_pro_frame + i) as f32 / SYNTH_SAMPLE_RATE;
            let wert = (t * SYNTH_FREQUENZ * std::f32::consts::TAU).sin() * 0.25;
            buf.put_i16_le((wert * i16::MAX as f32) as i16);
            i += 1;
        }
        // Ungerade Frame-Groesse auffuellen
        buf.resize(self.config.frame_bytes, 0);

        Ok(AudioFrame::neu(buf.freeze())?)
    }
}

impl AudioDevice for SynthetischesGeraet {
    fn capture(&self) -> AudioResult<AudioFrame> {
        std::thread::sleep(self.config.frame_dauer);

        let nummer = self.aufgenommen.load(Ordering::Relaxed);
        if let Some(max) = self.config.max_frames {
            if nummer >= max {
                return Err(AudioError::KeinFrame);
            }
        }
        self.aufgenommen.fetch_add(1, Ordering::Relaxed);
        self.frame_erzeugen(nummer)
    }

    fn play(&self, frame: AudioFrame) -> AudioResult<()> {
        tracing::trace!(bytes = frame.len(), "Synthetischer Frame abgespielt");
        // Empfaenger weg = niemand hoert zu, das ist kein Fehler
        let _ = self.abgespielt_tx.send(frame);
        Ok(())
    }

    fn frame_bytes(&self) -> usize {
        self.config.frame_bytes
    }
}
