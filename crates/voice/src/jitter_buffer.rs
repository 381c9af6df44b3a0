//! Jitter Buffer fuer empfangene Audio-Frames
//!
//! Begrenzter FIFO zwischen Netzwerk-Empfang (Producer) und Wiedergabe
//! (Consumer). Gleicht schwankende Ankunftszeiten aus.
//!
//! ## Ueberlauf-Strategie: Drop-Oldest
//! Ist der Buffer voll, wird beim naechsten `push` der aelteste Frame
//! verworfen. Ein veralteter Frame verzoegert alles dahinter, Aktualitaet
//! geht bei Live-Audio vor Vollstaendigkeit.
//!
//! ## Synchronisation
//! - Ein Mutex schuetzt Queue und Zaehler (atomares Pruefen-und-Aendern)
//! - Eine Condvar wird bei jedem `push` signalisiert
//! - `push` blockiert nie, `pop` wartet solange der Buffer leer ist
//! - `schliessen` weckt wartende Consumer auf, `pop` liefert dann `None`

use duett_protocol::voice::sequenz_ist_neuer;
use duett_protocol::AudioFrame;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::{VoiceError, VoiceResult};

/// Standard-Kapazitaet in Frames
pub const STANDARD_KAPAZITAET: usize = 50;

// ---------------------------------------------------------------------------
// Statistiken
// ---------------------------------------------------------------------------

/// Statistiken des Jitter Buffers (Snapshot)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JitterBufferStatistik {
    /// Anzahl eingefuegter Frames gesamt
    pub empfangen: u64,
    /// Anzahl per `pop` entnommener Frames
    pub abgespielt: u64,
    /// Wegen Ueberlauf verworfene Frames (Drop-Oldest)
    pub verworfen_ueberlauf: u64,
    /// Wegen veralteter oder doppelter Sequenznummer verworfene Frames
    pub verworfen_veraltet: u64,
    /// Aktueller Fuellstand in Frames
    pub fuellstand: usize,
}

// ---------------------------------------------------------------------------
// JitterBuffer
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Puffer {
    frames: VecDeque<AudioFrame>,
    geschlossen: bool,
    /// Hoechste akzeptierte Sequenznummer (nur `push_sequenziert`)
    hoechste_sequenz: Option<u32>,
    statistik: JitterBufferStatistik,
}

/// Begrenzter, thread-sicherer FIFO fuer Audio-Frames
pub struct JitterBuffer {
    kapazitaet: usize,
    inner: Mutex<Puffer>,
    signal: Condvar,
}

impl JitterBuffer {
    /// Erstellt einen leeren Buffer mit fester Kapazitaet
    ///
    /// # Fehler
    /// `Konfiguration` bei Kapazitaet 0.
    pub fn neu(kapazitaet: usize) -> VoiceResult<Self> {
        if kapazitaet == 0 {
            return Err(VoiceError::Konfiguration(
                "Jitter-Buffer-Kapazitaet muss mindestens 1 sein".into(),
            ));
        }
        Ok(Self::mit_kapazitaet(kapazitaet))
    }

    /// Buffer mit `STANDARD_KAPAZITAET`
    pub fn standard() -> Self {
        Self::mit_kapazitaet(STANDARD_KAPAZITAET)
    }

    /// `kapazitaet` ist bereits geprueft (mindestens 1)
    fn mit_kapazitaet(kapazitaet: usize) -> Self {
        Self {
            kapazitaet,
            inner: Mutex::new(Puffer {
                frames: VecDeque::with_capacity(kapazitaet),
                ..Default::default()
            }),
            signal: Condvar::new(),
        }
    }

    /// Fuegt einen Frame am Ende ein; verwirft bei vollem Buffer den aeltesten
    ///
    /// Blockiert nie und schlaegt nie fehl. Nach `schliessen` wird der Frame
    /// still verworfen.
    pub fn push(&self, frame: AudioFrame) {
        let mut puffer = self.inner.lock();
        if puffer.geschlossen {
            return;
        }
        self.einfuegen(&mut puffer, frame);
        drop(puffer);
        self.signal.notify_one();
    }

    /// Wie `push`, verwirft aber Frames die nicht neuer als der neueste
    /// akzeptierte Frame sind (veraltet oder doppelt)
    ///
    /// Gibt `true` zurueck wenn der Frame eingefuegt wurde.
    pub fn push_sequenziert(&self, sequenz: u32, frame: AudioFrame) -> bool {
        let mut puffer = self.inner.lock();
        if puffer.geschlossen {
            return false;
        }
        if let Some(hoechste) = puffer.hoechste_sequenz {
            if !sequenz_ist_neuer(sequenz, hoechste) {
                puffer.statistik.verworfen_veraltet += 1;
                tracing::trace!(sequenz, hoechste, "Veralteter Frame verworfen");
                return false;
            }
        }
        puffer.hoechste_sequenz = Some(sequenz);
        self.einfuegen(&mut puffer, frame);
        drop(puffer);
        self.signal.notify_one();
        true
    }

    fn einfuegen(&self, puffer: &mut Puffer, frame: AudioFrame) {
        puffer.statistik.empfangen += 1;
        if puffer.frames.len() >= self.kapazitaet {
            puffer.frames.pop_front();
            puffer.statistik.verworfen_ueberlauf += 1;
            tracing::trace!(
                kapazitaet = self.kapazitaet,
                "Buffer-Ueberlauf: aeltester Frame verworfen"
            );
        }
        puffer.frames.push_back(frame);
        puffer.statistik.fuellstand = puffer.frames.len();
    }

    /// Entnimmt den aeltesten Frame; wartet solange der Buffer leer ist
    ///
    /// Gibt `None` zurueck sobald der Buffer geschlossen ist.
    pub fn pop(&self) -> Option<AudioFrame> {
        let mut puffer = self.inner.lock();
        loop {
            if puffer.geschlossen {
                return None;
            }
            if let Some(frame) = Self::entnehmen(&mut puffer) {
                return Some(frame);
            }
            self.signal.wait(&mut puffer);
        }
    }

    /// Wie `pop`, wartet aber hoechstens `timeout`
    pub fn pop_timeout(&self, timeout: Duration) -> Option<AudioFrame> {
        let frist = Instant::now() + timeout;
        let mut puffer = self.inner.lock();
        loop {
            if puffer.geschlossen {
                return None;
            }
            if let Some(frame) = Self::entnehmen(&mut puffer) {
                return Some(frame);
            }
            if self.signal.wait_until(&mut puffer, frist).timed_out() {
                return Self::entnehmen(&mut puffer).filter(|_| !puffer.geschlossen);
            }
        }
    }

    /// Entnimmt den aeltesten Frame ohne zu warten
    pub fn try_pop(&self) -> Option<AudioFrame> {
        let mut puffer = self.inner.lock();
        if puffer.geschlossen {
            return None;
        }
        Self::entnehmen(&mut puffer)
    }

    fn entnehmen(puffer: &mut Puffer) -> Option<AudioFrame> {
        let frame = puffer.frames.pop_front()?;
        puffer.statistik.abgespielt += 1;
        puffer.statistik.fuellstand = puffer.frames.len();
        Some(frame)
    }

    /// Schliesst den Buffer: verwirft alle Frames und weckt wartende Consumer
    pub fn schliessen(&self) {
        let mut puffer = self.inner.lock();
        puffer.geschlossen = true;
        puffer.frames.clear();
        puffer.statistik.fuellstand = 0;
        drop(puffer);
        self.signal.notify_all();
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.inner.lock().geschlossen
    }

    /// Aktueller Fuellstand
    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }

    pub fn kapazitaet(&self) -> usize {
        self.kapazitaet
    }

    /// Gibt einen Snapshot der Statistiken zurueck
    pub fn statistik(&self) -> JitterBufferStatistik {
        self.inner.lock().statistik.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
