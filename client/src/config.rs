//! Client-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Client ohne Konfigurationsdatei
//! lauffaehig ist.

use std::time::Duration;

use avatalk_audio::PlaybackConfig;
use avatalk_avatar::{BootstrapConfig, RigProfile};
use avatalk_core::{RetryPolicy, DEFAULT_PCM_SAMPLE_RATE};
use avatalk_observability::logging::{log_format_gueltig, log_level_gueltig};
use avatalk_speech::QueueConfig;
use serde::{Deserialize, Serialize};

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Avatar-Modell
    pub avatar: AvatarEinstellungen,
    /// Audio-Ausgabe
    pub audio: AudioEinstellungen,
    /// Warteschlange
    pub warteschlange: WarteschlangenEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Avatar-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarEinstellungen {
    /// Modelltyp: "live2d" oder "vrm"
    pub modell_typ: RigProfile,
    /// Pfad zur Modelldatei (`.model3.json` bzw. `.vrm`)
    pub modell_pfad: String,
    /// Zeitlimit fuer das Laden in Millisekunden
    pub lade_timeout_ms: u64,
}

impl Default for AvatarEinstellungen {
    fn default() -> Self {
        Self {
            modell_typ: RigProfile::Live2d,
            modell_pfad: "modelle/avatar.model3.json".into(),
            lade_timeout_ms: 10_000,
        }
    }
}

/// Ausgabe-Backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AusgabeBackend {
    /// Soundkarte via cpal
    #[default]
    Cpal,
    /// Ohne Geraet (CI, Server)
    Headless,
}

/// Audio-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    pub backend: AusgabeBackend,
    /// Name (oder Teil davon) des Ausgabegeraets; leer = Standard
    pub ausgabegeraet: Option<String>,
    /// Abtastrate fuer rohe PCM16-Dateien
    pub pcm_abtastrate: u32,
    /// Abtastintervall der Mundbewegung in Millisekunden
    pub analyse_intervall_ms: u64,
    /// Versuche beim Stoppen der Wiedergabe
    pub stop_versuche: u32,
    /// Wartezeit zwischen Stop-Versuchen in Millisekunden
    pub stop_wartezeit_ms: u64,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            backend: AusgabeBackend::Cpal,
            ausgabegeraet: None,
            pcm_abtastrate: DEFAULT_PCM_SAMPLE_RATE,
            analyse_intervall_ms: 33,
            stop_versuche: 3,
            stop_wartezeit_ms: 50,
        }
    }
}

/// Warteschlangen-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarteschlangenEinstellungen {
    /// Ruhepause bis zur neutralen Mimik in Millisekunden
    pub leerlauf_verzoegerung_ms: u64,
    /// Wartezeit am Ende eines Abbruchs in Millisekunden
    pub abbruch_settle_ms: u64,
    /// Versuche beim Abriss des Avatars
    pub abbruch_versuche: u32,
    /// Wartezeit nach erfolgreichem Abriss-Versuch in Millisekunden
    pub abbruch_wartezeit_ms: u64,
    /// Wartezeit nach fehlgeschlagenem Abriss-Versuch in Millisekunden
    pub abbruch_fehler_wartezeit_ms: u64,
}

impl Default for WarteschlangenEinstellungen {
    fn default() -> Self {
        Self {
            leerlauf_verzoegerung_ms: 1500,
            abbruch_settle_ms: 300,
            abbruch_versuche: 5,
            abbruch_wartezeit_ms: 100,
            abbruch_fehler_wartezeit_ms: 200,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ClientConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str::<Self>(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.validieren()?;
        Ok(config)
    }

    /// Prueft Werte, die serde allein nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if self.audio.pcm_abtastrate == 0 {
            anyhow::bail!("audio.pcm_abtastrate darf nicht 0 sein");
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!("Unbekanntes Log-Format: '{}'", self.logging.format);
        }
        // Filter-Ausdruecke wie "info,avatalk_speech=debug" sind erlaubt
        let basis = self.logging.level.split(',').next().unwrap_or_default();
        if !basis.contains('=') && !log_level_gueltig(basis) {
            anyhow::bail!("Unbekanntes Log-Level: '{}'", self.logging.level);
        }
        Ok(())
    }

    pub fn playback_config(&self) -> PlaybackConfig {
        let warte = Duration::from_millis(self.audio.stop_wartezeit_ms);
        PlaybackConfig {
            default_sample_rate: self.audio.pcm_abtastrate,
            stop_policy: RetryPolicy::new(self.audio.stop_versuche, warte, warte),
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        let w = &self.warteschlange;
        QueueConfig {
            idle_delay: Duration::from_millis(w.leerlauf_verzoegerung_ms),
            settle_delay: Duration::from_millis(w.abbruch_settle_ms),
            clear_policy: RetryPolicy::new(
                w.abbruch_versuche,
                Duration::from_millis(w.abbruch_wartezeit_ms),
                Duration::from_millis(w.abbruch_fehler_wartezeit_ms),
            ),
        }
    }

    pub fn bootstrap_config(&self) -> BootstrapConfig {
        BootstrapConfig {
            profile: self.avatar.modell_typ,
            load_timeout: Duration::from_millis(self.avatar.lade_timeout_ms),
            tick: Duration::from_millis(self.audio.analyse_intervall_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ClientConfig::default();
        assert!(cfg.validieren().is_ok());
        assert_eq!(cfg.avatar.modell_typ, RigProfile::Live2d);
        assert_eq!(cfg.audio.backend, AusgabeBackend::Cpal);
        assert_eq!(cfg.audio.pcm_abtastrate, 24_000);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn standardwerte_entsprechen_den_crates() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.playback_config().stop_policy, RetryPolicy::audio_stop());
        let q = cfg.queue_config();
        assert_eq!(q.clear_policy, RetryPolicy::queue_clear());
        assert_eq!(q.idle_delay, Duration::from_millis(1500));
        assert_eq!(cfg.bootstrap_config().load_timeout, Duration::from_secs(10));
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [avatar]
            modell_typ = "vrm"
            modell_pfad = "avatar.vrm"

            [audio]
            backend = "headless"

            [warteschlange]
            leerlauf_verzoegerung_ms = 800
        "#;
        let cfg: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.avatar.modell_typ, RigProfile::Vrm);
        assert_eq!(cfg.audio.backend, AusgabeBackend::Headless);
        assert_eq!(cfg.warteschlange.leerlauf_verzoegerung_ms, 800);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.avatar.lade_timeout_ms, 10_000);
        assert_eq!(cfg.warteschlange.abbruch_versuche, 5);
    }

    #[test]
    fn ungueltige_werte_werden_abgelehnt() {
        let mut cfg = ClientConfig::default();
        cfg.audio.pcm_abtastrate = 0;
        assert!(cfg.validieren().is_err());

        let mut cfg = ClientConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = ClientConfig::default();
        cfg.logging.level = "info,avatalk_speech=trace".into();
        assert!(cfg.validieren().is_ok());
    }

    #[test]
    fn fehlende_datei_ergibt_standard() {
        let cfg = ClientConfig::laden("/gibt/es/nicht/avatalk.toml").unwrap();
        assert_eq!(cfg.audio.stop_versuche, 3);
    }
}
