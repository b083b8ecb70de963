//! AudioPlaybackController – genau eine Wiedergabe-Sitzung zur Zeit
//!
//! Jeder `play`-Aufruf reisst die vorherige Sitzung vollstaendig ab, bevor
//! eine neue aufgebaut wird. Der Abriss ist unzuverlaessig (Plattform-Audio
//! hinterlaesst gelegentlich Zustand) und wird deshalb mit Verifikation
//! wiederholt; als letzte Massnahme wird der Endpunkt ersetzt.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use avatalk_core::{AudioPayload, RetryOutcome, RetryPolicy, DEFAULT_PCM_SAMPLE_RATE};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::analyzer::{AmplitudeAnalyzer, AnalysisTap};
use crate::decode::prepare;
use crate::error::{AudioError, AudioResult};
use crate::output::{OutputBackend, OutputEndpoint};
use crate::source::{OnEnded, SourceNode};

/// Konfiguration des Controllers
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Abtastrate fuer PCM16-Payloads ohne eigene Angabe
    pub default_sample_rate: u32,
    /// Wiederholungen beim Abriss einer Sitzung
    pub stop_policy: RetryPolicy,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_sample_rate: DEFAULT_PCM_SAMPLE_RATE,
            stop_policy: RetryPolicy::audio_stop(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sitzung
// ---------------------------------------------------------------------------

struct PlaybackSession {
    endpoint: Option<Box<dyn OutputEndpoint>>,
    source: Option<Arc<SourceNode>>,
    /// Alle Knoten dieser Sitzung; werden beim Abriss einzeln getrennt
    nodes: Vec<Arc<SourceNode>>,
}

/// Steuert Wiedergabe und Analyse-Tap
pub struct AudioPlaybackController {
    backend: Arc<dyn OutputBackend>,
    session: Mutex<PlaybackSession>,
    active: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    tap: Arc<AnalysisTap>,
    config: PlaybackConfig,
}

impl AudioPlaybackController {
    /// Oeffnet den ersten Endpunkt des Backends
    pub fn new(backend: Arc<dyn OutputBackend>, config: PlaybackConfig) -> AudioResult<Self> {
        let endpoint = backend.open()?;
        info!(backend = backend.name(), "Audio-Controller bereit");
        Ok(Self {
            backend,
            session: Mutex::new(PlaybackSession {
                endpoint: Some(endpoint),
                source: None,
                nodes: Vec::new(),
            }),
            active: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            tap: Arc::new(AnalysisTap::new()),
            config,
        })
    }

    /// Ob gerade eine Quelle abgespielt wird
    pub fn is_playing(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Analyzer auf den Tap dieses Controllers
    pub fn analyzer(&self) -> AmplitudeAnalyzer {
        AmplitudeAnalyzer::new(Arc::clone(&self.tap), Arc::clone(&self.active))
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Spielt einen Payload ab; Fehler werden nur geloggt.
    ///
    /// `on_ended` wird genau einmal aufgerufen: am natuerlichen Ende, beim
    /// Stoppen oder sofort, wenn der Payload nicht abspielbar ist.
    pub async fn play(&self, payload: &AudioPayload, on_ended: Option<OnEnded>) {
        if let Err(e) = self.try_play(payload, on_ended).await {
            warn!("Audio nicht abspielbar: {}", e);
        }
    }

    /// Wie `play`, meldet aber den Grund, falls nichts abgespielt wird.
    /// Auch im Fehlerfall wurde `on_ended` bereits aufgerufen.
    pub async fn try_play(&self, payload: &AudioPayload, on_ended: Option<OnEnded>) -> AudioResult<()> {
        let mut session = self.session.lock().await;
        self.stop_locked(&mut session).await;

        let on_ended: OnEnded = on_ended.unwrap_or_else(|| Box::new(|| {}));

        let decoded = match prepare(payload, self.config.default_sample_rate).await {
            Ok(d) => d,
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                on_ended();
                return Err(e);
            }
        };

        let target_rate = session
            .endpoint
            .as_ref()
            .and_then(|e| e.preferred_sample_rate())
            .unwrap_or(decoded.sample_rate);
        let decoded = decoded.resampled(target_rate);

        // Ein verspaetetes Ende einer alten Quelle darf `active` nicht loeschen
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let active = Arc::clone(&self.active);
        let current = Arc::clone(&self.generation);
        let ended: OnEnded = Box::new(move || {
            if current.load(Ordering::SeqCst) == generation {
                active.store(false, Ordering::SeqCst);
            }
            on_ended();
        });

        let duration = decoded.duration();
        let source = SourceNode::new(decoded, Arc::clone(&self.tap), ended);
        session.nodes.push(Arc::clone(&source));
        session.source = Some(Arc::clone(&source));

        self.active.store(true, Ordering::SeqCst);
        self.tap.connect();

        let result = match session.endpoint.as_mut() {
            Some(endpoint) => endpoint.connect(Arc::clone(&source)),
            None => Err(AudioError::KeinEndpunkt),
        };

        if let Err(e) = result {
            source.stop();
            session.source = None;
            self.tap.disconnect();
            return Err(e);
        }

        debug!(dauer_ms = duration.as_millis() as u64, "Wiedergabe gestartet");
        Ok(())
    }

    /// Stoppt die laufende Wiedergabe. Idempotent, liefert nie einen Fehler.
    pub async fn stop(&self) {
        let mut session = self.session.lock().await;
        self.stop_locked(&mut session).await;
    }

    async fn stop_locked(&self, session: &mut PlaybackSession) {
        // op und Pruefung teilen sich die Sitzung; keiner haelt sie ueber ein await
        let geteilt = parking_lot::Mutex::new(&mut *session);

        let outcome = self
            .config
            .stop_policy
            .run(
                "Audio-Abriss",
                |_| {
                    self.force_stop(&mut geteilt.lock());
                    std::future::ready(Ok::<(), Infallible>(()))
                },
                || self.is_torn_down(&geteilt.lock()),
            )
            .await;

        if let RetryOutcome::Erschoepft { versuche, .. } = outcome {
            warn!(versuche, "Audio-Abriss nicht verifiziert, letzter erzwungener Durchlauf");
            self.force_stop(&mut geteilt.lock());
        }
    }

    fn is_torn_down(&self, session: &PlaybackSession) -> bool {
        !self.is_playing()
            && session.source.is_none()
            && session.endpoint.as_ref().is_some_and(|e| e.is_running())
    }

    /// Erzwungener Abriss; Fehler einzelner Schritte werden verschluckt
    fn force_stop(&self, session: &mut PlaybackSession) {
        self.active.store(false, Ordering::SeqCst);

        for node in session.nodes.drain(..) {
            node.disconnect();
        }

        if let Some(source) = session.source.take() {
            source.stop();
        }

        if let Some(mut endpoint) = session.endpoint.take() {
            if let Err(e) = endpoint.disconnect() {
                debug!("Endpunkt trennen fehlgeschlagen: {}", e);
            }
            self.tap.disconnect();
            if let Err(e) = endpoint.close() {
                debug!("Endpunkt schliessen fehlgeschlagen: {}", e);
            }
        } else {
            self.tap.disconnect();
        }

        match self.backend.open() {
            Ok(endpoint) => session.endpoint = Some(endpoint),
            Err(e) => warn!(backend = self.backend.name(), "Neuer Endpunkt fehlgeschlagen: {}", e),
        }
    }
}

impl std::fmt::Debug for AudioPlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioPlaybackController")
            .field("backend", &self.backend.name())
            .field("active", &self.is_playing())
            .field("config", &self.config)
            .finish()
    }
}
