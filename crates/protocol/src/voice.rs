//! Medien-Protokoll (UDP)
//!
//! Ein Datagramm transportiert genau einen Audio-Frame. Zwei Formate:
//!
//! ```text
//! Roh:          [ Samples (N Bytes) ]
//! Sequenziert:  [ Sequenz u32 big-endian (4 B) ][ Samples (N Bytes) ]
//! ```
//!
//! `Roh` ist das Standardformat (kein Header, keine Sequenznummer, kein
//! Zeitstempel). `Sequenziert` erlaubt dem Empfaenger, veraltete und doppelte
//! Frames am Jitter Buffer zu verwerfen. Beide Peers muessen dasselbe Format
//! verwenden; ausgehandelt wird nichts.

use bytes::{BufMut, Bytes, BytesMut};
use duett_core::{DuettError, Result};
use serde::{Deserialize, Serialize};

/// Maximale Frame-Groesse in Bytes (Groesse des Empfangspuffers)
pub const MAX_FRAME_BYTES: usize = 2048;

/// Standard-Frame: 512 Samples, Mono, i16 little-endian, 16 kHz (32 ms)
pub const STANDARD_FRAME_BYTES: usize = 512 * 2;

/// Groesse des Sequenz-Headers im Format `Sequenziert`
pub const SEQUENZ_HEADER_BYTES: usize = 4;

// ---------------------------------------------------------------------------
// AudioFrame
// ---------------------------------------------------------------------------

/// Ein Audio-Frame: rohe Sample-Bytes fester Dauer
///
/// Unveraenderlich nach der Aufnahme. Das Klonen ist billig (`Bytes` ist
/// referenzgezaehlt), die Stufen der Pipeline geben Frames aber per Move weiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    daten: Bytes,
}

impl AudioFrame {
    /// Erstellt einen Frame aus rohen Bytes
    ///
    /// # Fehler
    /// `FrameZuGross` wenn `daten` mehr als `MAX_FRAME_BYTES` Bytes hat.
    pub fn neu(daten: impl Into<Bytes>) -> Result<Self> {
        let daten = daten.into();
        if daten.len() > MAX_FRAME_BYTES {
            return Err(DuettError::FrameZuGross {
                laenge: daten.len(),
                maximum: MAX_FRAME_BYTES,
            });
        }
        Ok(Self { daten })
    }

    /// Laenge in Bytes
    pub fn len(&self) -> usize {
        self.daten.len()
    }

    pub fn is_empty(&self) -> bool {
        self.daten.is_empty()
    }

    /// Sample-Bytes
    pub fn daten(&self) -> &[u8] {
        &self.daten
    }
}

// ---------------------------------------------------------------------------
// MedienFormat
// ---------------------------------------------------------------------------

/// Datagrammformat der Medienverbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MedienFormat {
    /// Nur Samples, Reihenfolge = Ankunftsreihenfolge
    #[default]
    Roh,
    /// 4-Byte-Sequenznummer vor den Samples
    Sequenziert,
}

// ---------------------------------------------------------------------------
// MedienPaket
// ---------------------------------------------------------------------------

/// Ein dekodiertes Medien-Datagramm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedienPaket {
    /// Sequenznummer (nur im Format `Sequenziert`)
    pub sequenz: Option<u32>,
    pub frame: AudioFrame,
}

impl MedienPaket {
    /// Serialisiert einen Frame als Datagramm im gegebenen Format
    pub fn kodieren(format: MedienFormat, sequenz: u32, frame: &AudioFrame) -> Bytes {
        match format {
            MedienFormat::Roh => frame.daten.clone(),
            MedienFormat::Sequenziert => {
                let mut buf = BytesMut::with_capacity(SEQUENZ_HEADER_BYTES + frame.len());
                buf.put_u32(sequenz);
                buf.put_slice(frame.daten());
                buf.freeze()
            }
        }
    }

    /// Deserialisiert ein empfangenes Datagramm
    ///
    /// # Fehler
    /// - `UngueltigeNachricht` bei leerem Datagramm oder fehlendem Sequenz-Header
    /// - `FrameZuGross` wenn die Nutzdaten `MAX_FRAME_BYTES` ueberschreiten
    pub fn dekodieren(format: MedienFormat, datagramm: &[u8]) -> Result<Self> {
        match format {
            MedienFormat::Roh => {
                if datagramm.is_empty() {
                    return Err(DuettError::ungueltig("leeres Datagramm"));
                }
                Ok(Self {
                    sequenz: None,
                    frame: AudioFrame::neu(Bytes::copy_from_slice(datagramm))?,
                })
            }
            MedienFormat::Sequenziert => {
                if datagramm.len() <= SEQUENZ_HEADER_BYTES {
                    return Err(DuettError::ungueltig(format!(
                        "Datagramm zu kurz: {} Bytes (Header {})",
                        datagramm.len(),
                        SEQUENZ_HEADER_BYTES
                    )));
                }
                let sequenz =
                    u32::from_be_bytes([datagramm[0], datagramm[1], datagramm[2], datagramm[3]]);
                Ok(Self {
                    sequenz: Some(sequenz),
                    frame: AudioFrame::neu(Bytes::copy_from_slice(
                        &datagramm[SEQUENZ_HEADER_BYTES..],
                    ))?,
                })
            }
        }
    }
}

/// Prueft ob `neu` nach `alt` kommt (Wraparound-sicher, RFC 1982 Stil)
pub fn sequenz_ist_neuer(neu: u32, alt: u32) -> bool {
    neu != alt && neu.wrapping_sub(alt) < u32::MAX / 2
}
