//! Ausgabe-Endpunkte
//!
//! Abstraktion ueber das Audio-Subsystem der Plattform. Ein Endpunkt kann
//! geschlossen und durch einen frischen ersetzt werden; manche Backends
//! hinterlassen nach Fehlern Zustand, der sich nur so zuverlaessig
//! zuruecksetzen laesst.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{AudioError, AudioResult};
use crate::source::SourceNode;

/// Ein geoeffneter Ausgabe-Endpunkt (z.B. ein cpal-Stream)
pub trait OutputEndpoint: Send {
    /// Verbindet eine Quelle mit der hoerbaren Ausgabe und startet sie
    fn connect(&mut self, source: Arc<SourceNode>) -> AudioResult<()>;

    /// Trennt alle Quellen vom Endpunkt
    fn disconnect(&mut self) -> AudioResult<()>;

    /// Schliesst den Endpunkt endgueltig
    fn close(&mut self) -> AudioResult<()>;

    /// Ob der Endpunkt offen und bereit ist
    fn is_running(&self) -> bool;

    /// Bevorzugte Abtastrate des Geraets (None = jede Rate)
    fn preferred_sample_rate(&self) -> Option<u32> {
        None
    }
}

/// Fabrik fuer Ausgabe-Endpunkte
pub trait OutputBackend: Send + Sync {
    /// Anzeigename fuer Logs
    fn name(&self) -> &str;

    /// Oeffnet einen frischen Endpunkt
    fn open(&self) -> AudioResult<Box<dyn OutputEndpoint>>;
}

// ---------------------------------------------------------------------------
// HeadlessOutput
// ---------------------------------------------------------------------------

/// Standard-Quantum fuer die geraetelose Ausgabe
const HEADLESS_QUANTUM: Duration = Duration::from_millis(20);

/// Geraetelose Ausgabe: konsumiert Samples in Echtzeit auf der tokio-Uhr.
///
/// Fuer CI, Server ohne Soundkarte und Tests (mit pausierter Uhr).
#[derive(Debug, Clone)]
pub struct HeadlessOutput {
    quantum: Duration,
}

impl HeadlessOutput {
    pub fn new() -> Self {
        Self {
            quantum: HEADLESS_QUANTUM,
        }
    }

    pub fn with_quantum(quantum: Duration) -> Self {
        Self {
            quantum: quantum.max(Duration::from_millis(1)),
        }
    }
}

impl Default for HeadlessOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBackend for HeadlessOutput {
    fn name(&self) -> &str {
        "headless"
    }

    fn open(&self) -> AudioResult<Box<dyn OutputEndpoint>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| AudioError::StreamFehler(format!("Keine tokio-Runtime: {e}")))?;
        trace!("Headless-Endpunkt geoeffnet");
        Ok(Box::new(HeadlessEndpoint {
            runtime,
            quantum: self.quantum,
            task: None,
            open: true,
        }))
    }
}

struct HeadlessEndpoint {
    runtime: tokio::runtime::Handle,
    quantum: Duration,
    task: Option<JoinHandle<()>>,
    open: bool,
}

impl HeadlessEndpoint {
    fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl OutputEndpoint for HeadlessEndpoint {
    fn connect(&mut self, source: Arc<SourceNode>) -> AudioResult<()> {
        if !self.open {
            return Err(AudioError::EndpunktGeschlossen);
        }
        self.abort_task();

        let quantum = self.quantum;
        let chunk = ((source.sample_rate() as u128 * quantum.as_micros()) / 1_000_000).max(1) as usize;

        self.task = Some(self.runtime.spawn(async move {
            let mut interval = tokio::time::interval(quantum);
            let mut scratch = vec![0.0f32; chunk];
            while !source.is_finished() {
                interval.tick().await;
                source.render(&mut scratch);
            }
            debug!("Headless-Wiedergabe beendet");
        }));
        Ok(())
    }

    fn disconnect(&mut self) -> AudioResult<()> {
        self.abort_task();
        Ok(())
    }

    fn close(&mut self) -> AudioResult<()> {
        self.abort_task();
        self.open = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.open
    }
}

impl Drop for HeadlessEndpoint {
    fn drop(&mut self) {
        self.abort_task();
    }
}
