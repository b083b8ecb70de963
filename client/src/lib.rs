//! avatalk-client – Bibliotheks-Root
//!
//! Verdrahtet Audio-Ausgabe, Avatar-Modell und Warteschlange und stellt
//! den Einstiegspunkt fuer Integrationstests bereit.

pub mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use avatalk_audio::{
    list_output_devices, AudioDevice, AudioPlaybackController, CpalOutput, HeadlessOutput,
    OutputBackend,
};
use avatalk_avatar::{
    bootstrap, locate_model, ActorSlot, AvatarModel, ExpressionRenderer, LogRenderer,
};
use avatalk_core::{AudioPayload, Emotion, SpeechEvent, Utterance};
use avatalk_speech::UtteranceQueue;
use config::{AusgabeBackend, ClientConfig};
use tokio::sync::broadcast::error::RecvError;

/// Versuche fuer das Laden des Modells (Zeitlimit ist wiederholbar)
const LADE_VERSUCHE: u32 = 2;

/// Haelt den laufenden Client-Zustand zusammen
pub struct Client {
    pub config: ClientConfig,
}

impl Client {
    /// Erstellt einen neuen Client aus der gegebenen Konfiguration
    pub fn neu(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Spricht alle `eingaben` nacheinander und wartet, bis der Avatar
    /// wieder im Leerlauf ist. Ctrl-C bricht alles ab.
    ///
    /// Reihenfolge:
    /// 1. Audio-Ausgabe oeffnen
    /// 2. Avatar-Modell laden (mit Zeitlimit)
    /// 3. Warteschlange aufbauen und Dateien einreihen
    /// 4. Auf Leerlauf oder Ctrl-C warten
    pub async fn starten(self, eingaben: Vec<String>) -> Result<()> {
        let backend: Arc<dyn OutputBackend> = match self.config.audio.backend {
            AusgabeBackend::Cpal => Arc::new(CpalOutput::new(self.config.audio.ausgabegeraet.clone())),
            AusgabeBackend::Headless => Arc::new(HeadlessOutput::new()),
        };
        tracing::info!(backend = backend.name(), "Audio-Ausgabe wird geoeffnet");

        let controller = match AudioPlaybackController::new(backend, self.config.playback_config()) {
            Ok(c) => Arc::new(c),
            Err(e) => {
                if self.config.audio.backend == AusgabeBackend::Cpal {
                    verfuegbare_geraete_loggen();
                }
                return Err(e).context("Audio-Ausgabe konnte nicht geoeffnet werden");
            }
        };

        let slot = ActorSlot::new();
        let queue = UtteranceQueue::new(slot.clone(), self.config.queue_config());
        tokio::spawn(ereignisse_loggen(queue.clone()));

        let model = self.modell_laden(Arc::clone(&controller)).await?;
        slot.set(model);

        for eingabe in &eingaben {
            match utterance_laden(eingabe, self.config.audio.pcm_abtastrate).await {
                Ok(u) => {
                    queue.enqueue(u);
                }
                Err(e) => tracing::warn!(eingabe = %eingabe, "Uebersprungen: {:#}", e),
            }
        }

        tokio::select! {
            _ = warte_auf_leerlauf(&queue) => {
                // Ruhepause abwarten, damit der Avatar neutral endet
                tokio::time::sleep(self.config.queue_config().idle_delay).await;
                tracing::info!("Alle Utterances gesprochen");
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("Abbruch angefordert");
                queue.clear_queue().await;
            }
        }

        Ok(())
    }

    async fn modell_laden(&self, controller: Arc<AudioPlaybackController>) -> Result<Arc<AvatarModel>> {
        let cfg = self.config.bootstrap_config();
        let pfad = PathBuf::from(&self.config.avatar.modell_pfad);

        let mut versuch = 1;
        loop {
            let loader = renderer_laden(cfg.profile, &pfad);
            match bootstrap(&cfg, Arc::clone(&controller), loader).await {
                Ok(model) => return Ok(model),
                Err(e) if e.is_retryable() && versuch < LADE_VERSUCHE => {
                    tracing::warn!(versuch, "Modell-Laden wird wiederholt: {}", e);
                    versuch += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Modell '{}' nicht ladbar", pfad.display()))
                }
            }
        }
    }
}

/// Eine Zeile pro Ausgabegeraet, fuer `avatalk --geraete`
pub fn geraete_zeilen(geraete: &[AudioDevice]) -> Vec<String> {
    if geraete.is_empty() {
        return vec!["Keine Ausgabegeraete gefunden".into()];
    }
    geraete
        .iter()
        .enumerate()
        .map(|(i, g)| format!("{:>2}. {}", i + 1, g))
        .collect()
}

fn verfuegbare_geraete_loggen() {
    match list_output_devices() {
        Ok(geraete) => {
            for zeile in geraete_zeilen(&geraete) {
                tracing::info!("Ausgabegeraet: {}", zeile);
            }
        }
        Err(e) => tracing::warn!("Ausgabegeraete nicht abfragbar: {}", e),
    }
}

/// Prueft die Modelldatei und liefert den Renderer dafuer
async fn renderer_laden(
    profile: avatalk_avatar::RigProfile,
    pfad: &Path,
) -> avatalk_avatar::AvatarResult<Arc<dyn ExpressionRenderer>> {
    let pfad = locate_model(profile, pfad).await?;
    let name = pfad
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Arc::new(LogRenderer::new(name)))
}

/// Zerlegt eine Eingabe der Form `[emotion:]pfad`.
///
/// Das Praefix zaehlt nur, wenn es eine bekannte Emotion ist; so bleiben
/// Pfade wie `C:\ton.wav` unangetastet.
pub fn eingabe_zerlegen(eingabe: &str) -> (Emotion, PathBuf) {
    if let Some((praefix, rest)) = eingabe.split_once(':') {
        if let Ok(emotion) = praefix.parse::<Emotion>() {
            return (emotion, PathBuf::from(rest));
        }
    }
    (Emotion::Neutral, PathBuf::from(eingabe))
}

/// Liest eine Eingabedatei als Utterance: `.wav` wird dekodiert, alles
/// andere gilt als rohes PCM16 mit `pcm_abtastrate`
pub async fn utterance_laden(eingabe: &str, pcm_abtastrate: u32) -> Result<Utterance> {
    let (emotion, pfad) = eingabe_zerlegen(eingabe);
    let daten = tokio::fs::read(&pfad)
        .await
        .with_context(|| format!("'{}' nicht lesbar", pfad.display()))?;

    let ist_wav = pfad
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
    let audio = if ist_wav {
        AudioPayload::encoded(daten)
    } else {
        AudioPayload::pcm16(daten, pcm_abtastrate)
    };

    Ok(Utterance::new(audio, emotion))
}

async fn warte_auf_leerlauf(queue: &UtteranceQueue) {
    while queue.has_active_tasks() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Schreibt alle Ereignisse der Warteschlange ins Log
async fn ereignisse_loggen(queue: UtteranceQueue) {
    let mut events = queue.subscribe();
    loop {
        match events.recv().await {
            Ok(SpeechEvent::Fehlgeschlagen { id, grund }) => {
                tracing::warn!(%id, grund = %grund, "Utterance fehlgeschlagen")
            }
            Ok(SpeechEvent::StopErschoepft { versuche }) => {
                tracing::warn!(versuche, "Stoppen nicht verifiziert")
            }
            Ok(event) => tracing::info!(?event, "Sprach-Ereignis"),
            Err(RecvError::Lagged(n)) => tracing::debug!(verpasst = n, "Ereignisse verpasst"),
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eingabe_mit_emotion() {
        let (e, p) = eingabe_zerlegen("happy:hallo.wav");
        assert_eq!(e, Emotion::Happy);
        assert_eq!(p, PathBuf::from("hallo.wav"));
    }

    #[test]
    fn eingabe_ohne_emotion() {
        let (e, p) = eingabe_zerlegen("C:\\ton.pcm");
        assert_eq!(e, Emotion::Neutral);
        assert_eq!(p, PathBuf::from("C:\\ton.pcm"));
    }

    #[test]
    fn geraete_nummeriert() {
        let geraete = vec![
            AudioDevice {
                name: "Lautsprecher".into(),
                sample_rates: vec![48_000],
                channels: 2,
                is_default: true,
            },
            AudioDevice {
                name: "Headset".into(),
                sample_rates: vec![],
                channels: 1,
                is_default: false,
            },
        ];
        assert_eq!(
            geraete_zeilen(&geraete),
            vec![
                " 1. Lautsprecher (2 Kanaele, 48000 Hz) [Standard]",
                " 2. Headset (1 Kanaele)",
            ]
        );
        assert_eq!(geraete_zeilen(&[]), vec!["Keine Ausgabegeraete gefunden"]);
    }

    #[tokio::test]
    async fn pcm_datei_laden() {
        let pfad = std::env::temp_dir().join(format!("avatalk-{}.pcm", std::process::id()));
        tokio::fs::write(&pfad, [0u8, 0, 255, 127]).await.unwrap();

        let eingabe = format!("sad:{}", pfad.display());
        let u = utterance_laden(&eingabe, 16_000).await.unwrap();
        assert_eq!(u.emotion, Emotion::Sad);
        assert!(!u.audio.needs_decode);
        assert_eq!(u.audio.sample_rate, Some(16_000));
        assert_eq!(u.audio.data.len(), 4);

        let _ = tokio::fs::remove_file(&pfad).await;
    }

    #[tokio::test]
    async fn fehlende_datei_ist_fehler() {
        assert!(utterance_laden("/gibt/es/nicht.wav", 24_000).await.is_err());
    }
}
