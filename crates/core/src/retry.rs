//! Begrenzte Wiederholung fuer unzuverlaessige Teardown-Operationen
//!
//! Das Trennen/Schliessen laufender Audio-Graphen schlaegt gelegentlich
//! nicht-deterministisch fehl. Die Policy beschreibt nur Versuche und
//! Wartezeiten; die eigentliche Operation bleibt austauschbar.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry-Policy: maximale Versuche plus Wartezeiten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximale Anzahl Versuche (mindestens 1)
    pub max_attempts: u32,
    /// Wartezeit nach einem erfolgreichen Versuch, bevor die Nachbedingung geprueft wird
    pub settle_delay: Duration,
    /// Wartezeit nach einem fehlgeschlagenen Versuch
    pub failure_backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, settle_delay: Duration, failure_backoff: Duration) -> Self {
        Self {
            max_attempts,
            settle_delay,
            failure_backoff,
        }
    }

    /// Policy fuer `AudioPlaybackController::stop` (3 Versuche, 50ms)
    pub const fn audio_stop() -> Self {
        Self::new(3, Duration::from_millis(50), Duration::from_millis(50))
    }

    /// Policy fuer das Leeren der Warteschlange (5 Versuche, 100ms / 200ms)
    pub const fn queue_clear() -> Self {
        Self::new(5, Duration::from_millis(100), Duration::from_millis(200))
    }

    /// Effektive Anzahl Versuche
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Ob `attempt` (1-basiert) der letzte erlaubte Versuch ist
    pub fn is_last(&self, attempt: u32) -> bool {
        attempt >= self.attempts()
    }

    /// Wartezeit nach einem Versuch
    pub fn delay_after(&self, failed: bool) -> Duration {
        if failed {
            self.failure_backoff
        } else {
            self.settle_delay
        }
    }

    /// Fuehrt `op` aus, bis `verify` nach der Settle-Zeit true liefert
    /// oder alle Versuche verbraucht sind.
    ///
    /// Fehler von `op` werden geloggt und nie weitergereicht.
    pub async fn run<F, Fut, E, V>(&self, label: &str, mut op: F, mut verify: V) -> RetryOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
        V: FnMut() -> bool,
    {
        let mut last_error = None;

        for attempt in 1..=self.attempts() {
            match op(attempt).await {
                Ok(()) => {
                    tokio::time::sleep(self.delay_after(false)).await;
                    if verify() {
                        debug!(label, attempt, "Nachbedingung erfuellt");
                        return RetryOutcome::Erfolgreich { versuche: attempt };
                    }
                    debug!(label, attempt, "Nachbedingung noch nicht erfuellt");
                }
                Err(e) => {
                    warn!(label, attempt, fehler = %e, "Versuch fehlgeschlagen");
                    last_error = Some(e.to_string());
                    if !self.is_last(attempt) {
                        tokio::time::sleep(self.delay_after(true)).await;
                    }
                }
            }
        }

        RetryOutcome::Erschoepft {
            versuche: self.attempts(),
            letzter_fehler: last_error,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::audio_stop()
    }
}

/// Ergebnis eines `RetryPolicy::run`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Erfolgreich { versuche: u32 },
    Erschoepft {
        versuche: u32,
        letzter_fehler: Option<String>,
    },
}

impl RetryOutcome {
    pub fn ist_erfolgreich(&self) -> bool {
        matches!(self, Self::Erfolgreich { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn standard_policies() {
        let stop = RetryPolicy::audio_stop();
        assert_eq!(stop.attempts(), 3);
        let clear = RetryPolicy::queue_clear();
        assert_eq!(clear.attempts(), 5);
        assert_eq!(clear.delay_after(false), Duration::from_millis(100));
        assert_eq!(clear.delay_after(true), Duration::from_millis(200));
    }

    #[test]
    fn null_versuche_bedeutet_einen() {
        let p = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(p.attempts(), 1);
        assert!(p.is_last(1));
    }

    #[tokio::test(start_paused = true)]
    async fn erfolg_beim_zweiten_versuch() {
        let checks = Cell::new(0);
        let outcome = RetryPolicy::queue_clear()
            .run(
                "test",
                |_| async { Ok::<(), String>(()) },
                || {
                    checks.set(checks.get() + 1);
                    checks.get() >= 2
                },
            )
            .await;
        assert_eq!(outcome, RetryOutcome::Erfolgreich { versuche: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn fehler_werden_geschluckt_und_erschoepft() {
        let start = tokio::time::Instant::now();
        let outcome = RetryPolicy::queue_clear()
            .run(
                "test",
                |attempt| async move { Err::<(), _>(format!("kaputt {attempt}")) },
                || true,
            )
            .await;
        assert_eq!(
            outcome,
            RetryOutcome::Erschoepft {
                versuche: 5,
                letzter_fehler: Some("kaputt 5".into()),
            }
        );
        // 4 Backoffs a 200ms, nach dem letzten Versuch wird nicht mehr gewartet
        assert_eq!(start.elapsed(), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn fehler_dann_erfolg() {
        let outcome = RetryPolicy::audio_stop()
            .run(
                "test",
                |attempt| async move {
                    if attempt == 1 {
                        Err("erster Versuch".to_string())
                    } else {
                        Ok(())
                    }
                },
                || true,
            )
            .await;
        assert!(outcome.ist_erfolgreich());
    }
}
