//! Quell-Knoten: ein dekodierter Puffer, der genau einmal abgespielt wird
//!
//! Der Ausgabe-Endpunkt ruft `render` aus seinem Callback auf. Jedes
//! gerenderte Sample geht gleichzeitig an die Ausgabe und an den
//! Analyse-Tap. Das Ende (natuerlich oder per `stop`) wird genau einmal
//! gemeldet.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::analyzer::AnalysisTap;
use crate::pcm::DecodedAudio;

/// Callback fuer das Ende einer Wiedergabe
pub type OnEnded = Box<dyn FnOnce() + Send + 'static>;

pub struct SourceNode {
    buffer: DecodedAudio,
    position: AtomicUsize,
    connected: AtomicBool,
    finished: AtomicBool,
    tap: Arc<AnalysisTap>,
    on_ended: Mutex<Option<OnEnded>>,
}

impl SourceNode {
    pub fn new(buffer: DecodedAudio, tap: Arc<AnalysisTap>, on_ended: OnEnded) -> Arc<Self> {
        Arc::new(Self {
            buffer,
            position: AtomicUsize::new(0),
            connected: AtomicBool::new(true),
            finished: AtomicBool::new(false),
            tap,
            on_ended: Mutex::new(Some(on_ended)),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.buffer.sample_rate
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Bereits gerenderte Samples
    pub fn position(&self) -> usize {
        self.position.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Fuellt `out` mit den naechsten Samples, Rest mit Stille.
    ///
    /// Gibt die Anzahl echter Samples zurueck. Am Pufferende wird das
    /// Ende gemeldet.
    pub fn render(&self, out: &mut [f32]) -> usize {
        if self.is_finished() || !self.connected.load(Ordering::SeqCst) {
            out.fill(0.0);
            return 0;
        }

        let samples = &self.buffer.samples;
        let start = self.position.load(Ordering::SeqCst).min(samples.len());
        let n = out.len().min(samples.len() - start);

        out[..n].copy_from_slice(&samples[start..start + n]);
        out[n..].fill(0.0);
        self.position.store(start + n, Ordering::SeqCst);
        self.tap.write(&out[..n]);

        if start + n >= samples.len() {
            self.finish();
        }
        n
    }

    /// Stoppt die Quelle sofort; meldet das Ende falls noch nicht geschehen
    pub fn stop(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.finish();
    }

    /// Trennt die Quelle von Ausgabe und Tap (rendert danach nur Stille)
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
        let callback = self.on_ended.lock().take();
        if let Some(cb) = callback {
            cb();
        }
    }
}

impl std::fmt::Debug for SourceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceNode")
            .field("len", &self.len())
            .field("sample_rate", &self.sample_rate())
            .field("position", &self.position())
            .field("finished", &self.is_finished())
            .finish()
    }
}
