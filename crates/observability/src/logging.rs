//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (hat Vorrang vor der Datei):
//! - `DUETT_LOG_LEVEL`: Filter (`trace`/`debug`/`info`/`warn`/`error` oder
//!   EnvFilter-Direktiven wie `duett_voice=trace,info`), Standard: info
//! - `DUETT_LOG_FORMAT`: Format (`text`/`json`), Standard: text
//!
//! Die Sitzungs-ID wird als Span-Feld propagiert, Thread-Namen
//! (`duett-capture`, `duett-wiedergabe`) erscheinen in jeder Zeile.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// Umgebungsvariable fuer den Log-Filter
pub const ENV_LOG_LEVEL: &str = "DUETT_LOG_LEVEL";
/// Umgebungsvariable fuer das Log-Format
pub const ENV_LOG_FORMAT: &str = "DUETT_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Ungueltiges Log-Format '{0}' (erlaubt: text, json)")]
    Format(String),

    #[error("Ungueltiger Log-Filter '{filter}': {grund}")]
    Filter { filter: String, grund: String },

    #[error("Logging bereits initialisiert")]
    BereitsInitialisiert,
}

/// Ausgabeformat der Logzeilen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            andere => Err(LoggingError::Format(andere.to_string())),
        }
    }
}

/// Logging-Abschnitt der Konfiguration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    /// Wendet `DUETT_LOG_LEVEL` / `DUETT_LOG_FORMAT` auf die Dateiwerte an
    pub fn mit_umgebung(self) -> Result<Self, LoggingError> {
        self.ueberschreiben(
            std::env::var(ENV_LOG_LEVEL).ok(),
            std::env::var(ENV_LOG_FORMAT).ok(),
        )
    }

    fn ueberschreiben(
        mut self,
        level: Option<String>,
        format: Option<String>,
    ) -> Result<Self, LoggingError> {
        if let Some(level) = level.filter(|l| !l.is_empty()) {
            self.level = level;
        }
        if let Some(format) = format.filter(|f| !f.is_empty()) {
            self.format = format.parse()?;
        }
        Ok(self)
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        EnvFilter::try_new(&self.level).map_err(|e| LoggingError::Filter {
            filter: self.level.clone(),
            grund: e.to_string(),
        })
    }
}

/// Initialisiert das Logging-System
///
/// Umgebungsvariablen haben Vorrang vor `config`. Darf pro Prozess nur
/// einmal aufgerufen werden.
pub fn logging_initialisieren(config: &LoggingConfig) -> Result<(), LoggingError> {
    let config = config.clone().mit_umgebung()?;
    let filter = config.filter()?;

    let ergebnis = match config.format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_names(true)
            .try_init(),
    };
    ergebnis.map_err(|_| LoggingError::BereitsInitialisiert)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsen() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(LoggingError::Format(_))
        ));
        assert!("JSON".parse::<LogFormat>().is_err());
    }

    #[test]
    fn umgebung_ueberschreibt_datei() {
        let cfg = LoggingConfig::default()
            .ueberschreiben(Some("debug".into()), Some("json".into()))
            .unwrap();
        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.format, LogFormat::Json);
    }

    #[test]
    fn leere_umgebung_behaelt_datei() {
        let datei = LoggingConfig {
            level: "warn".into(),
            format: LogFormat::Json,
        };
        let cfg = datei
            .clone()
            .ueberschreiben(None, Some(String::new()))
            .unwrap();
        assert_eq!(cfg, datei);
    }

    #[test]
    fn ungueltiges_format_aus_umgebung() {
        assert!(LoggingConfig::default()
            .ueberschreiben(None, Some("yaml".into()))
            .is_err());
    }

    #[test]
    fn filter_direktiven_erlaubt() {
        let cfg = LoggingConfig {
            level: "duett_voice=trace,info".into(),
            format: LogFormat::Text,
        };
        assert!(cfg.filter().is_ok());

        let kaputt = LoggingConfig {
            level: "duett_voice=lautlos".into(),
            format: LogFormat::Text,
        };
        assert!(matches!(kaputt.filter(), Err(LoggingError::Filter { .. })));
    }

    #[test]
    fn logging_config_aus_toml() {
        let cfg: LoggingConfig = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.level, "info");
    }
}
