//! PCM-Konvertierung und Resampling
//!
//! PCM16 wird asymmetrisch normalisiert: negative Werte durch 32768,
//! nicht-negative durch 32767, damit beide Enden exakt auf -1.0 / ~1.0 liegen.

use std::sync::Arc;

use crate::error::{AudioError, AudioResult};

/// Dekodierter, abspielbarer Mono-Puffer
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Abspieldauer
    pub fn duration(&self) -> std::time::Duration {
        if self.sample_rate == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Rechnet den Puffer auf eine andere Abtastrate um
    pub fn resampled(&self, target_rate: u32) -> Self {
        if target_rate == self.sample_rate {
            return self.clone();
        }
        Self::new(
            resample_linear(&self.samples, self.sample_rate, target_rate),
            target_rate,
        )
    }
}

/// Einzelnes PCM16-Sample nach f32
#[inline]
pub fn pcm16_sample_to_f32(sample: i16) -> f32 {
    if sample < 0 {
        sample as f32 / 32768.0
    } else {
        sample as f32 / 32767.0
    }
}

/// Konvertiert PCM16 little-endian Bytes in normalisierte f32-Samples.
///
/// Leere Daten und eine ungerade Byte-Anzahl sind Formatfehler.
pub fn pcm16_to_f32(bytes: &[u8]) -> AudioResult<Vec<f32>> {
    if bytes.is_empty() {
        return Err(AudioError::LeererPuffer);
    }
    if bytes.len() % 2 != 0 {
        return Err(AudioError::UngueltigesFormat(format!(
            "PCM16 erwartet eine gerade Byte-Anzahl, war {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|b| pcm16_sample_to_f32(i16::from_le_bytes([b[0], b[1]])))
        .collect())
}

/// Lineares Resampling (reicht fuer Sprache)
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == 0 || to_rate == 0 || from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).round().max(1.0) as usize;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = (pos.floor() as usize).min(last);
            let next = (idx + 1).min(last);
            let frac = (pos - idx as f64) as f32;
            samples[idx] + (samples[next] - samples[idx]) * frac
        })
        .collect()
}
