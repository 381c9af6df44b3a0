//! Duett – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Anruf.

use anyhow::Result;
use clap::{Parser, Subcommand};
use duett::{config::AppConfig, Modus};
use duett_observability::logging_initialisieren;

/// Sprachverbindung zwischen zwei Rechnern
#[derive(Debug, Parser)]
#[command(name = "duett", version, about)]
struct Cli {
    /// Pfad zur Konfigurationsdatei
    #[arg(short, long, env = "DUETT_CONFIG", default_value = "duett.toml")]
    config: String,

    #[command(subcommand)]
    befehl: Befehl,
}

#[derive(Debug, Subcommand)]
enum Befehl {
    /// Ruft einen Peer an
    Anrufen {
        /// Hostname oder IP-Adresse des Peers
        host: String,
    },
    /// Wartet auf einen Anruf
    Annehmen,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let geladen = AppConfig::laden(&cli.config)?;
    let datei_fehlt = geladen.is_none();
    let config = geladen.unwrap_or_default();

    logging_initialisieren(&config.logging)?;

    if datei_fehlt {
        tracing::warn!(
            pfad = %cli.config,
            "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
        );
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config,
        "Duett wird gestartet"
    );

    let modus = match cli.befehl {
        Befehl::Anrufen { host } => Modus::Anrufen { host },
        Befehl::Annehmen => Modus::Annehmen,
    };
    duett::ausfuehren(config, modus).await
}
