//! UtteranceQueue – Zustandsmaschine der Sprachwiedergabe
//!
//! Zustaende: `Leerlauf` (leer, nichts in Arbeit), `Abarbeitung` (genau
//! eine Utterance wird gesprochen) und `Abbruch` (Force-Stop laeuft).
//! Waehrend eines Abbruchs werden neue Utterances verworfen; die Sperre
//! faellt erst nach Abriss und Settle-Zeit.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use avatalk_avatar::{ActorSlot, AvatarActor, AvatarError};
use avatalk_core::{Emotion, RetryOutcome, RetryPolicy, SpeechEvent, SpeechStatus, Utterance};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Ruhepause nach dem Leerlaufen, bevor der Avatar neutral wird
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_millis(1500);

/// Wartezeit am Ende eines Abbruchs, bevor wieder angenommen wird
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);

const EVENT_CAPACITY: usize = 64;

/// Konfiguration der Warteschlange
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub idle_delay: Duration,
    pub settle_delay: Duration,
    /// Wiederholungen beim Abriss des Avatars in `clear_queue`
    pub clear_policy: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            idle_delay: DEFAULT_IDLE_DELAY,
            settle_delay: DEFAULT_SETTLE_DELAY,
            clear_policy: RetryPolicy::queue_clear(),
        }
    }
}

// ---------------------------------------------------------------------------
// Interner Zustand
// ---------------------------------------------------------------------------

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Utterance>,
    processing: bool,
    /// Anzahl laufender `clear_queue`-Aufrufe; Force-Stop gilt, solange > 0
    clears_active: u32,
    /// Wird bei jeder Annahme und jedem Abbruch erhoeht; eine geplante
    /// Leerlauf-Rueckstellung gilt nur fuer die Epoche, in der sie geplant wurde
    idle_epoch: u64,
    drain: Option<JoinHandle<()>>,
}

impl QueueState {
    fn force_stopping(&self) -> bool {
        self.clears_active > 0
    }
}

struct Inner {
    state: Mutex<QueueState>,
    actors: ActorSlot,
    config: QueueConfig,
    status: watch::Sender<SpeechStatus>,
    events: broadcast::Sender<SpeechEvent>,
    abort: watch::Sender<bool>,
}

impl Inner {
    fn publish(&self, event: SpeechEvent) {
        // Ohne Abonnenten ist das kein Fehler
        let _ = self.events.send(event);
    }

    fn update_status(&self, f: impl FnOnce(&mut SpeechStatus)) {
        self.status.send_modify(f);
    }

    fn is_force_stopping(&self) -> bool {
        self.state.lock().force_stopping()
    }
}

/// Einzige Sequenzierungs-Instanz fuer Sprache im Prozess.
///
/// Guenstig zu klonen; alle Klone teilen sich denselben Zustand.
#[derive(Clone)]
pub struct UtteranceQueue {
    inner: Arc<Inner>,
}

impl UtteranceQueue {
    pub fn new(actors: ActorSlot, config: QueueConfig) -> Self {
        let (status, _) = watch::channel(SpeechStatus::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (abort, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                actors,
                config,
                status,
                events,
                abort,
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    pub fn actors(&self) -> &ActorSlot {
        &self.inner.actors
    }

    /// Nimmt eine Utterance an und startet bei Bedarf die Abarbeitung.
    ///
    /// Gibt `false` zurueck, wenn gerade ein Abbruch laeuft; die Utterance
    /// wird dann verworfen. Muss innerhalb einer tokio-Runtime laufen.
    pub fn enqueue(&self, utterance: Utterance) -> bool {
        let id = utterance.id;
        let mut state = self.inner.state.lock();

        if state.force_stopping() {
            drop(state);
            debug!(%id, "Abbruch aktiv, Utterance verworfen");
            self.inner.publish(SpeechEvent::Verworfen { id });
            return false;
        }

        state.pending.push_back(utterance);
        state.idle_epoch += 1;
        let wartend = state.pending.len();

        if !state.processing {
            state.processing = true;
            state.drain = Some(tokio::spawn(drain(Arc::clone(&self.inner))));
        }
        drop(state);

        debug!(%id, wartend, "Utterance eingereiht");
        self.inner.update_status(|s| s.pending = wartend);
        self.inner.publish(SpeechEvent::Eingereiht { id, wartend });
        true
    }

    /// Bricht alles ab: leert die Warteschlange, stoppt die laufende
    /// Wiedergabe und setzt den Avatar zurueck.
    ///
    /// Ueberlappende Aufrufe sind erlaubt: die Sperre faellt erst, wenn
    /// der letzte laufende Abbruch fertig ist.
    pub async fn clear_queue(&self) {
        let inner = &self.inner;

        let (verworfen, drain) = {
            let mut state = inner.state.lock();
            state.clears_active += 1;
            let verworfen = state.pending.len();
            state.pending.clear();
            state.idle_epoch += 1;
            (verworfen, state.drain.take())
        };

        inner.abort.send_replace(true);
        info!(verworfen, "Warteschlange wird geleert");
        inner.publish(SpeechEvent::Geleert { verworfen });
        inner.update_status(|s| {
            s.stop_speech = true;
            s.pending = 0;
        });

        if let Some(actor) = inner.actors.get() {
            let outcome = teardown(&inner.config.clear_policy, &actor).await;
            if let RetryOutcome::Erschoepft {
                versuche,
                letzter_fehler,
            } = outcome
            {
                warn!(
                    versuche,
                    fehler = letzter_fehler.as_deref().unwrap_or("-"),
                    "Avatar liess sich nicht stoppen, Zustand wird trotzdem zurueckgesetzt"
                );
                inner.publish(SpeechEvent::StopErschoepft { versuche });
            }

            // Letzter Versuch, unabhaengig vom Ergebnis
            if let Err(e) = actor.stop_speaking().await {
                debug!("stop_speaking fehlgeschlagen: {}", e);
            }
            if let Err(e) = actor.stop_audio().await {
                debug!("stop_audio fehlgeschlagen: {}", e);
            }
        }

        if let Some(handle) = drain {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    warn!("Abarbeitungs-Task ist abgestuerzt: {}", e);
                    // Der Task konnte sein Flag nicht mehr zuruecksetzen
                    inner.state.lock().processing = false;
                }
            }
        }

        tokio::time::sleep(inner.config.settle_delay).await;

        let letzter = {
            let mut state = inner.state.lock();
            state.clears_active = state.clears_active.saturating_sub(1);
            let letzter = state.clears_active == 0;
            if letzter {
                // Unter der Sperre, damit kein enqueue den alten Abbruch sieht
                inner.abort.send_replace(false);
            }
            letzter
        };

        if !letzter {
            debug!("Weiterer Abbruch laeuft noch, Sperre bleibt bestehen");
            return;
        }

        inner.update_status(|s| {
            s.stop_speech = false;
            s.speaking = false;
            s.pending = 0;
        });
        info!("Warteschlange geleert");
    }

    /// Warteschlange nicht leer oder Utterance in Arbeit
    pub fn has_active_tasks(&self) -> bool {
        let state = self.inner.state.lock();
        !state.pending.is_empty() || state.processing
    }

    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_processing(&self) -> bool {
        self.inner.state.lock().processing
    }

    pub fn is_force_stopping(&self) -> bool {
        self.inner.is_force_stopping()
    }

    /// Statusflags fuer die Praesentationsschicht
    pub fn status(&self) -> watch::Receiver<SpeechStatus> {
        self.inner.status.subscribe()
    }

    /// Abonniert alle zukuenftigen Ereignisse
    pub fn subscribe(&self) -> broadcast::Receiver<SpeechEvent> {
        self.inner.events.subscribe()
    }
}

impl std::fmt::Debug for UtteranceQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("UtteranceQueue")
            .field("pending", &state.pending.len())
            .field("processing", &state.processing)
            .field("clears_active", &state.clears_active)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Abarbeitung
// ---------------------------------------------------------------------------

/// Arbeitet die Warteschlange strikt sequentiell ab
async fn drain(inner: Arc<Inner>) {
    debug!("Abarbeitung gestartet");

    loop {
        let next = {
            let mut state = inner.state.lock();
            if state.force_stopping() {
                state.pending.clear();
                state.processing = false;
                None
            } else {
                let next = state.pending.pop_front();
                if next.is_none() {
                    state.processing = false;
                    // Leerlauf-Rueckstellung fuer genau diese Epoche planen
                    tokio::spawn(idle_reset(Arc::clone(&inner), state.idle_epoch));
                }
                next.map(|u| (u, state.pending.len()))
            }
        };

        let Some((mut utterance, wartend)) = next else {
            break;
        };

        let id = utterance.id;
        let completion = utterance.take_completion();
        inner.update_status(|s| {
            s.speaking = true;
            s.pending = wartend;
        });
        inner.publish(SpeechEvent::Gestartet { id });

        // Akteur einmal pro Utterance aufloesen
        let result = match inner.actors.get() {
            Some(actor) => tokio::select! {
                r = actor.speak(&utterance) => Some(r),
                _ = aborted(inner.abort.subscribe()) => None,
            },
            None => Some(Err(AvatarError::KeinAvatar)),
        };

        match result {
            Some(Ok(())) => inner.publish(SpeechEvent::Beendet { id }),
            Some(Err(e)) => {
                warn!(%id, "Wiedergabe fehlgeschlagen: {}", e);
                inner.publish(SpeechEvent::Fehlgeschlagen {
                    id,
                    grund: e.to_string(),
                });
            }
            None => debug!(%id, "Wiedergabe abgebrochen"),
        }
        inner.update_status(|s| s.speaking = false);

        if !inner.is_force_stopping() {
            if let Some(cb) = completion {
                cb();
            }
        }
    }

    debug!("Abarbeitung beendet");
}

/// Wird fertig, sobald ein Abbruch signalisiert ist
async fn aborted(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|a| *a).await.is_err() {
        // Sender existiert nicht mehr: nie abbrechen
        std::future::pending::<()>().await;
    }
}

/// Setzt den Avatar nach der Ruhepause auf neutral, falls seit der Planung
/// nichts mehr angenommen wurde
async fn idle_reset(inner: Arc<Inner>, epoch: u64) {
    let initial = inner.state.lock().pending.len();
    tokio::time::sleep(inner.config.idle_delay).await;

    let ruhig = {
        let state = inner.state.lock();
        initial == 0
            && state.pending.is_empty()
            && !state.processing
            && !state.force_stopping()
            && state.idle_epoch == epoch
    };
    if !ruhig {
        debug!("Leerlauf-Rueckstellung entfaellt");
        return;
    }

    if let Some(actor) = inner.actors.get() {
        if let Err(e) = actor.play_emotion(Emotion::Neutral).await {
            warn!("Leerlauf-Rueckstellung fehlgeschlagen: {}", e);
        }
    }
    debug!("Avatar im Leerlauf");
    inner.publish(SpeechEvent::Leerlauf);
}

/// Abriss des Avatars mit Verifikation ueber `is_playing`
async fn teardown(policy: &RetryPolicy, actor: &Arc<dyn AvatarActor>) -> RetryOutcome {
    policy
        .run(
            "Warteschlange leeren",
            |_| {
                let actor = Arc::clone(actor);
                async move {
                    actor.stop_speaking().await?;
                    actor.play_emotion(Emotion::Neutral).await?;
                    actor.stop_audio().await?;
                    actor.stop_speaking().await
                }
            },
            || !actor.is_playing(),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_konfiguration() {
        let c = QueueConfig::default();
        assert_eq!(c.idle_delay, Duration::from_millis(1500));
        assert_eq!(c.settle_delay, Duration::from_millis(300));
        assert_eq!(c.clear_policy.attempts(), 5);
    }

    #[tokio::test]
    async fn ohne_avatar_wird_weitergearbeitet() {
        let queue = UtteranceQueue::new(ActorSlot::new(), QueueConfig::default());
        let mut events = queue.subscribe();

        let u = Utterance::new(
            avatalk_core::AudioPayload::pcm16(vec![0u8, 0], 24_000),
            Emotion::Neutral,
        );
        let id = u.id;
        assert!(queue.enqueue(u));

        loop {
            match events.recv().await.unwrap() {
                SpeechEvent::Fehlgeschlagen { id: fid, grund } => {
                    assert_eq!(fid, id);
                    assert!(grund.contains("Kein Avatar"));
                    break;
                }
                _ => continue,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn leeren_ohne_arbeit_ist_harmlos() {
        let queue = UtteranceQueue::new(ActorSlot::new(), QueueConfig::default());
        queue.clear_queue().await;
        assert!(!queue.has_active_tasks());
        assert!(!queue.is_force_stopping());
        assert!(!queue.status().borrow().stop_speech);
    }
}
