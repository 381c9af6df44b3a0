//! duett-audio – Audio-Geraete
//!
//! - [`device`] – die `AudioDevice`-Schnittstelle (blockierendes Capture/Play)
//! - [`synthetisch`] – Geraet ohne Hardware (Tests, Betrieb ohne Soundkarte)
//! - `hardware` – cpal-Geraet (Feature `hardware`)

pub mod device;
pub mod error;
#[cfg(feature = "hardware")]
pub mod hardware;
pub mod synthetisch;

// Bequeme Re-Exporte der wichtigsten Typen
pub use device::AudioDevice;
pub use error::{AudioError, AudioResult};
#[cfg(feature = "hardware")]
pub use hardware::{CpalGeraet, HardwareConfig};
pub use synthetisch::{SynthConfig, SynthetischesGeraet};
