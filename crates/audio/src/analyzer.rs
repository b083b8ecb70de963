//! Amplituden-Analyse fuer die Mundbewegung
//!
//! Der Analyse-Tap haelt das letzte Fenster der abgespielten Samples,
//! ohne die hoerbare Ausgabe zu beeinflussen. Der Analyzer reduziert
//! dieses Fenster auf einen Wert "Mundoeffnung" in [0, 1].

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Laenge des Analysefensters in Samples
pub const TIME_DOMAIN_DATA_LENGTH: usize = 2048;

/// Werte unterhalb dieser Schwelle gelten als Rauschen (kein Mundzucken im Leerlauf)
const NOISE_FLOOR: f32 = 0.1;

/// Normalisierte Mundoeffnung in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct AmplitudeSample(f32);

impl AmplitudeSample {
    pub const SILENT: Self = Self(0.0);

    pub fn value(&self) -> f32 {
        self.0
    }

    pub fn is_silent(&self) -> bool {
        self.0 == 0.0
    }
}

/// Logistische Quetschung des Spitzenpegels: `1 / (1 + e^(-45v + 5))`,
/// alles unter 0.1 wird exakt 0.
pub fn mouth_openness(peak: f32) -> f32 {
    let v = 1.0 / (1.0 + (-45.0 * peak + 5.0).exp());
    if v < NOISE_FLOOR {
        0.0
    } else {
        v
    }
}

// ---------------------------------------------------------------------------
// AnalysisTap
// ---------------------------------------------------------------------------

struct TapWindow {
    data: Box<[f32]>,
    write: usize,
}

/// Abgriff im Audio-Graphen: speichert die zuletzt gerenderten Samples
pub struct AnalysisTap {
    window: Mutex<TapWindow>,
    connected: AtomicBool,
}

impl AnalysisTap {
    pub fn new() -> Self {
        Self {
            window: Mutex::new(TapWindow {
                data: vec![0.0; TIME_DOMAIN_DATA_LENGTH].into_boxed_slice(),
                write: 0,
            }),
            connected: AtomicBool::new(false),
        }
    }

    /// Verbindet den Tap mit einer neuen Quelle
    pub fn connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Trennt den Tap und verwirft das Fenster
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let mut w = self.window.lock();
        w.data.fill(0.0);
        w.write = 0;
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Schreibt gerenderte Samples (wird im Audio-Callback aufgerufen)
    pub fn write(&self, samples: &[f32]) {
        if !self.is_connected() {
            return;
        }
        let mut w = self.window.lock();
        let len = w.data.len();
        // Nur die letzten `len` Samples sind relevant
        let tail = &samples[samples.len().saturating_sub(len)..];
        for &s in tail {
            let idx = w.write;
            w.data[idx] = s;
            w.write = (idx + 1) % len;
        }
    }

    /// Spitzenpegel (max |x|) ueber das aktuelle Fenster
    pub fn peak(&self) -> f32 {
        self.window
            .lock()
            .data
            .iter()
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}

impl Default for AnalysisTap {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// AmplitudeAnalyzer
// ---------------------------------------------------------------------------

/// Liest den Tap und liefert die aktuelle Mundoeffnung.
///
/// Guenstig zu klonen; gedacht fuer einen Aufruf pro Render-Frame.
#[derive(Clone)]
pub struct AmplitudeAnalyzer {
    tap: Arc<AnalysisTap>,
    active: Arc<AtomicBool>,
}

impl AmplitudeAnalyzer {
    pub fn new(tap: Arc<AnalysisTap>, active: Arc<AtomicBool>) -> Self {
        Self { tap, active }
    }

    /// Aktueller Wert; 0 wenn nichts abgespielt wird
    pub fn sample(&self) -> AmplitudeSample {
        if !self.active.load(Ordering::SeqCst) {
            return AmplitudeSample::SILENT;
        }
        AmplitudeSample(mouth_openness(self.tap.peak()))
    }
}
