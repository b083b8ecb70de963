//! Audio-Ausgabe via cpal
//!
//! `cpal::Stream` ist nicht auf allen Plattformen `Send`. Der Stream lebt
//! deshalb in einem dedizierten Thread; der Endpunkt steuert ihn ueber
//! einen crossbeam-Kanal.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::device::load_cpal_output_device;
use crate::error::{AudioError, AudioResult};
use crate::output::{OutputBackend, OutputEndpoint};
use crate::source::SourceNode;

/// Ausgabe ueber ein cpal-Geraet
#[derive(Debug, Clone, Default)]
pub struct CpalOutput {
    /// Name (oder Teilname) des Geraets, None = Standard
    device_name: Option<String>,
}

impl CpalOutput {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }
}

impl OutputBackend for CpalOutput {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open(&self) -> AudioResult<Box<dyn OutputEndpoint>> {
        let (cmd_tx, cmd_rx) = bounded::<OutputCommand>(16);
        let (ready_tx, ready_rx) = bounded::<AudioResult<DeviceFormat>>(1);
        let device_name = self.device_name.clone();

        let thread = std::thread::Builder::new()
            .name("avatalk-audio-output".to_string())
            .spawn(move || {
                let device = match load_cpal_output_device(device_name.as_deref()) {
                    Ok(d) => d,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let format = match device_format(&device) {
                    Ok(f) => f,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                if ready_tx.send(Ok(format)).is_err() {
                    return;
                }
                output_thread(device, format, cmd_rx);
            })
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

        let format = ready_rx
            .recv()
            .map_err(|_| AudioError::StreamFehler("Ausgabe-Thread beendet".into()))??;

        info!(
            sample_rate = format.sample_rate,
            kanaele = format.channels,
            "cpal-Endpunkt geoeffnet"
        );

        Ok(Box::new(CpalEndpoint {
            cmd_tx,
            format,
            thread: Some(thread),
            closed: false,
        }))
    }
}

#[derive(Debug, Clone, Copy)]
struct DeviceFormat {
    sample_rate: u32,
    channels: u16,
    sample_format: SampleFormat,
}

/// Kommandos an den Ausgabe-Thread
enum OutputCommand {
    Connect(Arc<SourceNode>, Sender<AudioResult<()>>),
    Disconnect,
    Close,
}

struct CpalEndpoint {
    cmd_tx: Sender<OutputCommand>,
    format: DeviceFormat,
    thread: Option<std::thread::JoinHandle<()>>,
    closed: bool,
}

impl CpalEndpoint {
    fn send_cmd(&self, cmd: OutputCommand) -> AudioResult<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|e| AudioError::StreamFehler(e.to_string()))
    }
}

impl OutputEndpoint for CpalEndpoint {
    fn connect(&mut self, source: Arc<SourceNode>) -> AudioResult<()> {
        if self.closed {
            return Err(AudioError::EndpunktGeschlossen);
        }
        let (reply_tx, reply_rx) = bounded(1);
        self.send_cmd(OutputCommand::Connect(source, reply_tx))?;
        reply_rx
            .recv()
            .map_err(|_| AudioError::StreamFehler("Keine Antwort vom Ausgabe-Thread".into()))?
    }

    fn disconnect(&mut self) -> AudioResult<()> {
        if self.closed {
            return Ok(());
        }
        self.send_cmd(OutputCommand::Disconnect)
    }

    fn close(&mut self) -> AudioResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.send_cmd(OutputCommand::Close)
    }

    fn is_running(&self) -> bool {
        !self.closed && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn preferred_sample_rate(&self) -> Option<u32> {
        Some(self.format.sample_rate)
    }
}

impl Drop for CpalEndpoint {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(OutputCommand::Close);
        debug!("cpal-Endpunkt freigegeben");
    }
}

fn device_format(device: &Device) -> AudioResult<DeviceFormat> {
    let config = device
        .default_output_config()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
    Ok(DeviceFormat {
        sample_rate: config.sample_rate().0,
        channels: config.channels(),
        sample_format: config.sample_format(),
    })
}

/// Ausgabe-Thread: haelt den aktuellen Stream am Leben
fn output_thread(device: Device, format: DeviceFormat, cmd_rx: Receiver<OutputCommand>) {
    let mut stream: Option<Stream> = None;

    debug!("Ausgabe-Thread gestartet");

    for cmd in cmd_rx.iter() {
        match cmd {
            OutputCommand::Connect(source, reply) => {
                stream = None;
                let result = build_stream(&device, format, source).map(|s| {
                    stream = Some(s);
                });
                let _ = reply.send(result);
            }
            OutputCommand::Disconnect => {
                stream = None;
            }
            OutputCommand::Close => {
                break;
            }
        }
    }

    drop(stream);
    debug!("Ausgabe-Thread beendet");
}

fn build_stream(device: &Device, format: DeviceFormat, source: Arc<SourceNode>) -> AudioResult<Stream> {
    let channels = format.channels.max(1) as usize;
    let stream_config = StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    if source.sample_rate() != format.sample_rate {
        warn!(
            quelle = source.sample_rate(),
            geraet = format.sample_rate,
            "Abtastrate der Quelle weicht vom Geraet ab"
        );
    }

    let err_fn = |err| error!("Playback-Fehler: {}", err);
    let mut mono = Vec::<f32>::new();

    let stream = match format.sample_format {
        SampleFormat::F32 => device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _| {
                    mono.resize(data.len() / channels, 0.0);
                    source.render(&mut mono);
                    for (frame, s) in data.chunks_mut(channels).zip(mono.iter()) {
                        frame.fill(*s);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        SampleFormat::I16 => device
            .build_output_stream(
                &stream_config,
                move |data: &mut [i16], _| {
                    mono.resize(data.len() / channels, 0.0);
                    source.render(&mut mono);
                    for (frame, s) in data.chunks_mut(channels).zip(mono.iter()) {
                        let v = (*s * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                        frame.fill(v);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string()))?,
        other => {
            return Err(AudioError::StreamFehler(format!(
                "Nicht unterstuetztes Sample-Format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    debug!(
        "Playback-Stream geoeffnet: {}Hz {}ch",
        format.sample_rate, format.channels
    );

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalysisTap;
    use crate::pcm::DecodedAudio;

    #[test]
    #[ignore = "Benoetigt Audio-Hardware"]
    fn cpal_endpunkt_oeffnen_und_schliessen() {
        let mut endpoint = CpalOutput::default()
            .open()
            .expect("Endpunkt sollte oeffenbar sein");
        assert!(endpoint.is_running());
        assert!(endpoint.preferred_sample_rate().is_some());

        let source = SourceNode::new(
            DecodedAudio::new(vec![0.0; 480], 48000),
            Arc::new(AnalysisTap::new()),
            Box::new(|| {}),
        );
        assert!(endpoint.connect(source).is_ok());
        assert!(endpoint.disconnect().is_ok());
        assert!(endpoint.close().is_ok());
        assert!(!endpoint.is_running());
    }

    #[test]
    fn cpal_backend_name() {
        assert_eq!(CpalOutput::new(Some("USB".into())).name(), "cpal");
    }
}
