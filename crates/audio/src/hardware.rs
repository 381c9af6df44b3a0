//! Audio-Hardware via cpal
//!
//! `cpal::Stream` ist `!Send`. Die Streams leben deshalb in einem eigenen
//! std-Thread ("duett-audio"), der nur die Streams am Leben haelt. Die
//! Ring-Buffer-Enden (lock-free, `ringbuf`) werden an das Geraet
//! uebergeben, das so `Send + Sync` bleibt.
//!
//! ```text
//! cpal Input-Callback --f32--> Capture-Ring --capture()--> AudioFrame (i16 LE)
//! AudioFrame (i16 LE) --play()--> Playback-Ring --f32--> cpal Output-Callback
//! ```

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use duett_protocol::AudioFrame;
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::device::{ausgabegeraet_laden, eingabegeraet_laden, AudioDevice};
use crate::error::{AudioError, AudioResult};

/// Konfiguration fuer das Hardware-Geraet
#[derive(Debug, Clone)]
pub struct HardwareConfig {
    /// Abtastrate in Hz
    pub sample_rate: u32,
    /// Samples pro Frame (Mono)
    pub frame_samples: usize,
    /// Name des Eingabegeraets (None = Standard)
    pub eingabe: Option<String>,
    /// Name des Ausgabegeraets (None = Standard)
    pub ausgabe: Option<String>,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_samples: 512,
            eingabe: None,
            ausgabe: None,
        }
    }
}

impl HardwareConfig {
    /// Dauer einer Frame-Periode
    pub fn frame_dauer(&self) -> Duration {
        Duration::from_micros(self.frame_samples as u64 * 1_000_000 / self.sample_rate as u64)
    }
}

/// Audio-Geraet auf Basis von cpal
pub struct CpalGeraet {
    config: HardwareConfig,
    capture_rx: Mutex<HeapCons<f32>>,
    playback_tx: Mutex<HeapProd<f32>>,
    stopp: Arc<AtomicBool>,
    stream_thread: Option<std::thread::JoinHandle<()>>,
}

impl CpalGeraet {
    /// Oeffnet Capture- und Playback-Stream
    pub fn oeffnen(config: HardwareConfig) -> AudioResult<Self> {
        if config.frame_samples == 0 || config.sample_rate == 0 {
            return Err(AudioError::Konfiguration(
                "frame_samples und sample_rate muessen > 0 sein".into(),
            ));
        }

        let stopp = Arc::new(AtomicBool::new(false));
        let (ring_tx, ring_rx) = std::sync::mpsc::sync_channel::<AudioResult<(HeapCons<f32>, HeapProd<f32>)>>(1);

        let thread_config = config.clone();
        let thread_stopp = Arc::clone(&stopp);
        let stream_thread = std::thread::Builder::new()
            .name("duett-audio".to_string())
            .spawn(move || {
                let streams = streams_oeffnen(&thread_config);
                let (_capture, _playback, ringe) = match streams {
                    Ok((c, p, cons, prod)) => (c, p, (cons, prod)),
                    Err(e) => {
                        let _ = ring_tx.send(Err(e));
                        return;
                    }
                };
                if ring_tx.send(Ok(ringe)).is_err() {
                    return;
                }
                // Streams bleiben bis zum Stopp-Signal im Scope
                while !thread_stopp.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(50));
                }
                debug!("Audio-Thread beendet, cpal-Streams werden gedroppt");
            })?;

        let (capture_rx, playback_tx) = ring_rx
            .recv()
            .map_err(|_| AudioError::StreamFehler("Audio-Thread vorzeitig beendet".into()))??;

        Ok(Self {
            config,
            capture_rx: Mutex::new(capture_rx),
            playback_tx: Mutex::new(playback_tx),
            stopp,
            stream_thread: Some(stream_thread),
        })
    }
}

impl AudioDevice for CpalGeraet {
    fn capture(&self) -> AudioResult<AudioFrame> {
        let frist = Instant::now() + self.config.frame_dauer() * 2;
        let mut ring = self.capture_rx.lock();

        while ring.occupied_len() < self.config.frame_samples {
            if Instant::now() >= frist {
                return Err(AudioError::KeinFrame);
            }
            std::thread::sleep(Duration::from_millis(2));
        }

        let mut samples = vec![0.0f32; self.config.frame_samples];
        let gelesen = ring.pop_slice(&mut samples);
        drop(ring);

        let mut bytes = Vec::with_capacity(gelesen * 2);
        for s in &samples[..gelesen] {
            let wert = (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            bytes.extend_from_slice(&wert.to_le_bytes());
        }
        Ok(AudioFrame::neu(bytes)?)
    }

    fn play(&self, frame: AudioFrame) -> AudioResult<()> {
        let samples: Vec<f32> = frame
            .daten()
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
            .collect();

        let frist = Instant::now() + self.config.frame_dauer() * 2;
        let mut ring = self.playback_tx.lock();
        while ring.vacant_len() < samples.len() && Instant::now() < frist {
            std::thread::sleep(Duration::from_millis(2));
        }

        let geschrieben = ring.push_slice(&samples);
        if geschrieben < samples.len() {
            warn!(
                verworfen = samples.len() - geschrieben,
                "Playback Ring-Buffer voll"
            );
        }
        Ok(())
    }

    fn frame_bytes(&self) -> usize {
        self.config.frame_samples * 2
    }
}

impl Drop for CpalGeraet {
    fn drop(&mut self) {
        self.stopp.store(true, Ordering::Relaxed);
        if let Some(handle) = self.stream_thread.take() {
            let _ = handle.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Streams (laufen im Audio-Thread)
// ---------------------------------------------------------------------------

type StreamsUndRinge = (Stream, Stream, HeapCons<f32>, HeapProd<f32>);

fn streams_oeffnen(config: &HardwareConfig) -> AudioResult<StreamsUndRinge> {
    let eingabe = eingabegeraet_laden(config.eingabe.as_deref())?;
    let ausgabe = ausgabegeraet_laden(config.ausgabe.as_deref())?;

    // Puffer fuer 1 Sekunde Audio in jede Richtung
    let kapazitaet = config.sample_rate as usize;

    let (capture_prod, capture_cons) = HeapRb::<f32>::new(kapazitaet).split();
    let (playback_prod, playback_cons) = HeapRb::<f32>::new(kapazitaet).split();

    let capture = capture_stream(&eingabe, config.sample_rate, capture_prod)?;
    let playback = playback_stream(&ausgabe, config.sample_rate, playback_cons)?;

    debug!(sample_rate = config.sample_rate, "Audio-Streams geoeffnet (Capture + Playback)");
    Ok((capture, playback, capture_cons, playback_prod))
}

fn mono_config(sample_rate: u32) -> StreamConfig {
    StreamConfig {
        channels: 1,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

fn capture_stream(
    device: &Device,
    sample_rate: u32,
    mut producer: HeapProd<f32>,
) -> AudioResult<Stream> {
    let format = device
        .supported_input_configs()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?
        .find(|c| c.min_sample_rate().0 <= sample_rate && c.max_sample_rate().0 >= sample_rate)
        .map(|c| c.sample_format())
        .unwrap_or(SampleFormat::F32);

    let err_fn = |err| error!("Capture-Fehler: {}", err);
    let config = mono_config(sample_rate);

    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _| {
                // Voller Ring: neueste Samples verwerfen, der Leser holt auf
                let _ = producer.push_slice(data);
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _| {
                for &s in data {
                    let _ = producer.try_push(s as f32 / i16::MAX as f32);
                }
            },
            err_fn,
            None,
        ),
        andere => {
            return Err(AudioError::StreamFehler(format!(
                "Nicht unterstuetztes Sample-Format: {:?}",
                andere
            )))
        }
    }
    .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
    Ok(stream)
}

fn playback_stream(
    device: &Device,
    sample_rate: u32,
    mut consumer: HeapCons<f32>,
) -> AudioResult<Stream> {
    let format = device
        .supported_output_configs()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?
        .find(|c| c.min_sample_rate().0 <= sample_rate && c.max_sample_rate().0 >= sample_rate)
        .map(|c| c.sample_format())
        .unwrap_or(SampleFormat::F32);

    let err_fn = |err| error!("Playback-Fehler: {}", err);
    let config = mono_config(sample_rate);

    let stream = match format {
        SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _| {
                let gelesen = consumer.pop_slice(data);
                // Stille fuer fehlende Samples
                data[gelesen..].fill(0.0);
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _| {
                for out in data.iter_mut() {
                    let s = consumer.try_pop().unwrap_or(0.0);
                    *out = (s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                }
            },
            err_fn,
            None,
        ),
        andere => {
            return Err(AudioError::StreamFehler(format!(
                "Nicht unterstuetztes Sample-Format: {:?}",
                andere
            )))
        }
    }
    .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_dauer_standard() {
        let cfg = HardwareConfig::default();
        assert_eq!(cfg.frame_dauer(), Duration::from_millis(32));
    }

    #[test]
    #[ignore = "Benoetigt Audio-Hardware"]
    fn geraet_oeffnen_und_aufnehmen() {
        let geraet = CpalGeraet::oeffnen(HardwareConfig::default()).expect("Geraet oeffnen");
        match geraet.capture() {
            Ok(f) => assert_eq!(f.len(), geraet.frame_bytes()),
            Err(e) => assert!(e.ist_voruebergehend()),
        }
    }
}
