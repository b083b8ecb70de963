//! Gemeinsame Datentypen fuer Avatalk
//!
//! Eine `Utterance` ist die kleinste Einheit synthetisierter Sprache, die
//! atomar (ohne Ueberlappung mit anderen) abgespielt wird.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Standard-Abtastrate fuer rohe PCM16-Daten aus der TTS
pub const DEFAULT_PCM_SAMPLE_RATE: u32 = 24_000;

/// Eindeutige Utterance-ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtteranceId(pub Uuid);

impl UtteranceId {
    /// Erstellt eine neue zufaellige UtteranceId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for UtteranceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "utterance:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Emotion
// ---------------------------------------------------------------------------

/// Emotions-Tag einer Utterance
///
/// Das Sprachmodell markiert Antworten mit Tags wie `[happy]`; unbekannte
/// Tags werden als `Neutral` behandelt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Angry,
    Sad,
    Relaxed,
    Surprised,
}

impl Emotion {
    /// Alle bekannten Emotionen
    pub const ALLE: [Emotion; 6] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Angry,
        Emotion::Sad,
        Emotion::Relaxed,
        Emotion::Surprised,
    ];

    /// Kanonischer Name (kleingeschrieben)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Angry => "angry",
            Self::Sad => "sad",
            Self::Relaxed => "relaxed",
            Self::Surprised => "surprised",
        }
    }

    /// Parst einen Tag wie `[happy]`, `Happy` oder `happy`.
    /// Unbekannte Tags ergeben `Neutral`.
    pub fn from_tag(tag: &str) -> Self {
        tag.parse().unwrap_or_default()
    }
}

impl FromStr for Emotion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches('[').trim_end_matches(']').trim();
        Self::ALLE
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| format!("Unbekannte Emotion: {s}"))
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zeitpunkt innerhalb einer Utterance, ab dem eine andere Emotion gilt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentTiming {
    /// Offset ab Beginn der Utterance
    pub start: Duration,
    /// Emotion ab diesem Offset
    pub emotion: Emotion,
}

// ---------------------------------------------------------------------------
// Audio-Payload
// ---------------------------------------------------------------------------

/// Rohe Audiodaten einer Utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload {
    /// Bytes: PCM16 little-endian oder ein Container (WAV)
    pub data: Bytes,
    /// true = Container, muss dekodiert werden
    pub needs_decode: bool,
    /// Abtastrate fuer PCM16 (None = Standard)
    pub sample_rate: Option<u32>,
}

impl AudioPayload {
    /// Rohe PCM16-Samples (little-endian, mono)
    pub fn pcm16(data: impl Into<Bytes>, sample_rate: u32) -> Self {
        Self {
            data: data.into(),
            needs_decode: false,
            sample_rate: Some(sample_rate),
        }
    }

    /// Kodierter Container (z.B. WAV), wird vor dem Abspielen dekodiert
    pub fn encoded(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            needs_decode: true,
            sample_rate: None,
        }
    }

    /// Erzeugt PCM16-Payload aus i16-Samples
    pub fn from_samples(samples: &[i16], sample_rate: u32) -> Self {
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::pcm16(data, sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Utterance
// ---------------------------------------------------------------------------

/// Callback nach Abschluss einer Utterance
pub type CompletionFn = Box<dyn FnOnce() + Send + Sync + 'static>;

/// Eine Einheit synthetisierter Sprache plus Metadaten
pub struct Utterance {
    pub id: UtteranceId,
    pub audio: AudioPayload,
    pub emotion: Emotion,
    /// Optionale Zeitmarken pro Satz/Phrase
    pub segments: Vec<SegmentTiming>,
    on_complete: Option<CompletionFn>,
}

impl Utterance {
    pub fn new(audio: AudioPayload, emotion: Emotion) -> Self {
        Self {
            id: UtteranceId::new(),
            audio,
            emotion,
            segments: Vec::new(),
            on_complete: None,
        }
    }

    /// Fuegt Zeitmarken hinzu (werden nach Offset sortiert)
    pub fn with_segments(mut self, mut segments: Vec<SegmentTiming>) -> Self {
        segments.sort_by_key(|s| s.start);
        self.segments = segments;
        self
    }

    /// Setzt den Abschluss-Callback
    pub fn on_complete(mut self, f: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Entnimmt den Abschluss-Callback (hoechstens einmal vorhanden)
    pub fn take_completion(&mut self) -> Option<CompletionFn> {
        self.on_complete.take()
    }

    /// Emotion, die `elapsed` nach Beginn gilt
    pub fn emotion_at(&self, elapsed: Duration) -> Emotion {
        self.segments
            .iter()
            .rev()
            .find(|s| s.start <= elapsed)
            .map(|s| s.emotion)
            .unwrap_or(self.emotion)
    }
}

impl fmt::Debug for Utterance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Utterance")
            .field("id", &self.id)
            .field("bytes", &self.audio.data.len())
            .field("needs_decode", &self.audio.needs_decode)
            .field("emotion", &self.emotion)
            .field("segments", &self.segments.len())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}
