//! Vorbereitung von Audio-Payloads zu abspielbaren Puffern
//!
//! PCM16 wird direkt konvertiert, Container (WAV) werden via hound
//! dekodiert und auf Mono heruntergemischt.

use std::io::Cursor;

use avatalk_core::AudioPayload;
use bytes::Bytes;
use hound::{SampleFormat, WavReader};
use tracing::debug;

use crate::error::{AudioError, AudioResult};
use crate::pcm::{pcm16_to_f32, DecodedAudio};

/// Dekodiert einen WAV-Container (int 8/16/24/32 oder float) zu Mono-f32
pub fn decode_container(data: &[u8]) -> AudioResult<DecodedAudio> {
    if data.is_empty() {
        return Err(AudioError::LeererPuffer);
    }

    let reader =
        WavReader::new(Cursor::new(data)).map_err(|e| AudioError::Dekodierung(e.to_string()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| AudioError::Dekodierung(e.to_string()))?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(AudioError::UngueltigesFormat(format!(
                    "{} Bit pro Sample nicht unterstuetzt",
                    spec.bits_per_sample
                )));
            }
            let scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| AudioError::Dekodierung(e.to_string()))?
        }
    };

    let mono: Vec<f32> = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    if mono.is_empty() {
        return Err(AudioError::LeererPuffer);
    }

    debug!(
        samples = mono.len(),
        sample_rate = spec.sample_rate,
        kanaele = channels,
        "Container dekodiert"
    );

    Ok(DecodedAudio::new(mono, spec.sample_rate))
}

/// Bereitet einen Payload zum Abspielen vor.
///
/// Die Dekodierung laeuft auf einem Blocking-Thread, damit die
/// Event-Loop frei bleibt.
pub async fn prepare(payload: &AudioPayload, default_sample_rate: u32) -> AudioResult<DecodedAudio> {
    if payload.is_empty() {
        return Err(AudioError::LeererPuffer);
    }

    if !payload.needs_decode {
        let rate = payload.sample_rate.unwrap_or(default_sample_rate);
        if rate == 0 {
            return Err(AudioError::UngueltigesFormat("Abtastrate 0".into()));
        }
        return Ok(DecodedAudio::new(pcm16_to_f32(&payload.data)?, rate));
    }

    let data: Bytes = payload.data.clone();
    tokio::task::spawn_blocking(move || decode_container(&data))
        .await
        .map_err(|e| AudioError::Dekodierung(format!("Dekodier-Task abgebrochen: {e}")))?
}
