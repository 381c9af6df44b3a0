//! Audio-Geraete-Schnittstelle
//!
//! Die Sitzung kennt das Geraet nur ueber [`AudioDevice`]: `capture()`
//! liefert einen Frame und blockiert dabei eine Frame-Periode lang,
//! `play()` blockiert bis das Ausgabegeraet den Frame angenommen hat.
//! Abtastrate, Kanalzahl und Puffergroesse sind Sache der Implementierung.
//!
//! Mit dem Feature `hardware` werden hier ausserdem die cpal-Geraete
//! per Namen gesucht.

use duett_protocol::AudioFrame;

use crate::error::AudioResult;

/// Capture/Playback-Faehigkeit, die von der Sitzung verwendet wird
///
/// Beide Methoden blockieren und werden deshalb nur aus dedizierten
/// std-Threads aufgerufen, nie aus einem tokio-Task.
pub trait AudioDevice: Send + Sync + 'static {
    /// Nimmt einen Frame auf (blockiert ca. eine Frame-Periode)
    ///
    /// `AudioError::KeinFrame` bedeutet: in dieser Periode nichts Neues,
    /// der Aufrufer versucht es einfach erneut.
    fn capture(&self) -> AudioResult<AudioFrame>;

    /// Spielt einen Frame ab (blockiert bis er angenommen wurde)
    fn play(&self, frame: AudioFrame) -> AudioResult<()>;

    /// Groesse eines aufgenommenen Frames in Bytes
    fn frame_bytes(&self) -> usize;
}

#[cfg(feature = "hardware")]
pub(crate) use cpal_geraete::{ausgabegeraet_laden, eingabegeraet_laden};

#[cfg(feature = "hardware")]
mod cpal_geraete {
    use cpal::traits::{DeviceTrait, HostTrait};
    use cpal::Device;

    use crate::error::{AudioError, AudioResult};

    fn passt(device: &Device, teil: &str) -> bool {
        device.name().map(|n| n.contains(teil)).unwrap_or(false)
    }

    /// Eingabegeraet, dessen Name `name` enthaelt (sonst das Standardgeraet)
    pub(crate) fn eingabegeraet_laden(name: Option<&str>) -> AudioResult<Device> {
        let host = cpal::default_host();
        let Some(teil) = name else {
            return host
                .default_input_device()
                .ok_or(AudioError::KeinStandardEingabegeraet);
        };
        host.input_devices()
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?
            .find(|d| passt(d, teil))
            .ok_or_else(|| AudioError::GeraetNichtGefunden(teil.to_string()))
    }

    /// Ausgabegeraet, dessen Name `name` enthaelt (sonst das Standardgeraet)
    pub(crate) fn ausgabegeraet_laden(name: Option<&str>) -> AudioResult<Device> {
        let host = cpal::default_host();
        let Some(teil) = name else {
            return host
                .default_output_device()
                .ok_or(AudioError::KeinStandardAusgabegeraet);
        };
        host.output_devices()
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?
            .find(|d| passt(d, teil))
            .ok_or_else(|| AudioError::GeraetNichtGefunden(teil.to_string()))
    }
}
