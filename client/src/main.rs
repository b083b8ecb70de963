//! avatalk – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und spricht die
//! uebergebenen Dateien (`[emotion:]pfad`) nacheinander. `--geraete`
//! listet die Ausgabegeraete auf.

use anyhow::Result;
use avatalk_audio::list_output_devices;
use avatalk_client::{config::ClientConfig, geraete_zeilen, Client};
use avatalk_observability::logging_initialisieren;

#[tokio::main]
async fn main() -> Result<()> {
    // `--geraete`: nur Ausgabegeraete auflisten (Werte fuer `audio.ausgabegeraet`)
    if std::env::args().nth(1).as_deref() == Some("--geraete") {
        for zeile in geraete_zeilen(&list_output_devices()?) {
            println!("{zeile}");
        }
        return Ok(());
    }

    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("AVATALK_CONFIG").unwrap_or_else(|_| "avatalk.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ClientConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format)?;

    let eingaben: Vec<String> = std::env::args().skip(1).collect();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        dateien = eingaben.len(),
        "avatalk wird initialisiert"
    );

    Client::neu(config).starten(eingaben).await
}
