//! avatalk-audio – Wiedergabe und Amplituden-Analyse
//!
//! - PCM16-Konvertierung und Container-Dekodierung (WAV via hound)
//! - Quell-Knoten mit Analyse-Tap
//! - Ausgabe-Endpunkte: cpal und geraetelos (headless)
//! - AudioPlaybackController mit verifiziertem Abriss

pub mod analyzer;
pub mod controller;
pub mod decode;
pub mod device;
pub mod error;
pub mod output;
pub mod pcm;
pub mod playback;
pub mod source;

// Bequeme Re-Exporte der wichtigsten Typen
pub use analyzer::{mouth_openness, AmplitudeAnalyzer, AmplitudeSample, AnalysisTap};
pub use controller::{AudioPlaybackController, PlaybackConfig};
pub use decode::{decode_container, prepare};
pub use device::{default_output, list_output_devices, AudioDevice};
pub use error::{AudioError, AudioResult};
pub use output::{HeadlessOutput, OutputBackend, OutputEndpoint};
pub use pcm::{pcm16_to_f32, DecodedAudio};
pub use playback::CpalOutput;
pub use source::{OnEnded, SourceNode};
