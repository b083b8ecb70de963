//! avatalk-core – Gemeinsame Typen, Ereignisse und Retry-Policies
//!
//! Dieses Crate stellt die Bausteine bereit, die von Audio-, Avatar- und
//! Sprach-Crate gemeinsam genutzt werden.

pub mod event;
pub mod retry;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use event::{SpeechEvent, SpeechStatus};
pub use retry::{RetryOutcome, RetryPolicy};
pub use types::{
    AudioPayload, CompletionFn, Emotion, SegmentTiming, Utterance, UtteranceId,
    DEFAULT_PCM_SAMPLE_RATE,
};
