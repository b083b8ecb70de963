//! Ausdruckssteuerung: Mundoeffnung und Emotion pro Render-Frame
//!
//! Der `ExpressionDriver` tastet waehrend der Wiedergabe den Analyzer ab und
//! uebersetzt Amplitude plus aktuelle Emotion ueber das Rig-Profil in
//! Parameter des Modells.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use avatalk_audio::{AmplitudeSample, AudioPlaybackController};
use avatalk_core::{Emotion, Utterance};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::error::AvatarResult;

/// Standard-Abtastintervall (~30 Frames pro Sekunde)
pub const DEFAULT_TICK: Duration = Duration::from_millis(33);

// ---------------------------------------------------------------------------
// RigProfile
// ---------------------------------------------------------------------------

/// Art des Avatar-Rigs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RigProfile {
    /// 2D-Modell (Live2D Cubism)
    #[default]
    Live2d,
    /// 3D-Modell (VRM)
    Vrm,
}

impl RigProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live2d => "live2d",
            Self::Vrm => "vrm",
        }
    }

    /// Name des Parameters fuer die Mundoeffnung
    pub fn mouth_parameter(&self) -> &'static str {
        match self {
            Self::Live2d => "ParamMouthOpenY",
            Self::Vrm => "aa",
        }
    }

    /// Ausdrucksname im Modell fuer eine Emotion
    pub fn expression_name(&self, emotion: Emotion) -> &'static str {
        match self {
            // VRM-1.0-Presets heissen wie die Emotionen
            Self::Vrm => emotion.as_str(),
            Self::Live2d => match emotion {
                Emotion::Neutral => "exp_neutral",
                Emotion::Happy => "exp_happy",
                Emotion::Angry => "exp_angry",
                Emotion::Sad => "exp_sad",
                Emotion::Relaxed => "exp_relaxed",
                Emotion::Surprised => "exp_surprised",
            },
        }
    }

    /// Frame fuer Emotion und Mundoeffnung
    pub fn frame(&self, emotion: Emotion, mouth: AmplitudeSample) -> ExpressionFrame {
        ExpressionFrame {
            profile: *self,
            emotion,
            expression: self.expression_name(emotion),
            mouth_parameter: self.mouth_parameter(),
            mouth_open: mouth.value().clamp(0.0, 1.0),
        }
    }

    /// Ruhezustand: neutral, Mund geschlossen
    pub fn neutral(&self) -> ExpressionFrame {
        self.frame(Emotion::Neutral, AmplitudeSample::SILENT)
    }
}

impl FromStr for RigProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live2d" | "2d" => Ok(Self::Live2d),
            "vrm" | "3d" => Ok(Self::Vrm),
            other => Err(format!("Unbekannter Modelltyp: {other}")),
        }
    }
}

impl fmt::Display for RigProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter-Satz fuer einen Render-Frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpressionFrame {
    pub profile: RigProfile,
    pub emotion: Emotion,
    /// Ausdrucks-/Preset-Name im Modell
    pub expression: &'static str,
    /// Parameter fuer die Mundoeffnung
    pub mouth_parameter: &'static str,
    /// Mundoeffnung in [0, 1]
    pub mouth_open: f32,
}

impl ExpressionFrame {
    pub fn is_neutral(&self) -> bool {
        self.emotion == Emotion::Neutral && self.mouth_open == 0.0
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Ziel der Frames: das gerenderte Modell
pub trait ExpressionRenderer: Send + Sync {
    /// Wendet einen Frame auf das Modell an
    fn apply(&self, frame: &ExpressionFrame) -> AvatarResult<()>;
}

/// Renderer ohne Grafik: schreibt Ausdruckswechsel ins Log
#[derive(Debug)]
pub struct LogRenderer {
    model: String,
    last: Mutex<Option<&'static str>>,
}

impl LogRenderer {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            last: Mutex::new(None),
        }
    }
}

impl ExpressionRenderer for LogRenderer {
    fn apply(&self, frame: &ExpressionFrame) -> AvatarResult<()> {
        let mut last = self.last.lock();
        if *last != Some(frame.expression) {
            debug!(
                modell = %self.model,
                ausdruck = frame.expression,
                "Ausdruck gewechselt"
            );
            *last = Some(frame.expression);
        }
        trace!(
            modell = %self.model,
            parameter = frame.mouth_parameter,
            wert = frame.mouth_open,
            "Frame"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ExpressionDriver
// ---------------------------------------------------------------------------

pub struct ExpressionDriver {
    renderer: Arc<dyn ExpressionRenderer>,
    profile: RigProfile,
    tick: Duration,
}

impl ExpressionDriver {
    pub fn new(renderer: Arc<dyn ExpressionRenderer>, profile: RigProfile) -> Self {
        Self {
            renderer,
            profile,
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    pub fn profile(&self) -> RigProfile {
        self.profile
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Setzt eine Emotion bei geschlossenem Mund
    pub fn apply_emotion(&self, emotion: Emotion) -> AvatarResult<()> {
        self.renderer
            .apply(&self.profile.frame(emotion, AmplitudeSample::SILENT))
    }

    /// Zurueck in den Ruhezustand; Fehler werden nur geloggt
    pub fn reset(&self) {
        if let Err(e) = self.renderer.apply(&self.profile.neutral()) {
            warn!("Zuruecksetzen auf neutral fehlgeschlagen: {}", e);
        }
    }

    /// Steuert das Modell, solange `controller` abspielt.
    ///
    /// Endet bei natuerlichem Ende, Stopp oder Renderer-Fehler und setzt
    /// danach genau einmal auf neutral zurueck. Ein Renderer-Fehler wird
    /// zurueckgegeben; die Wiedergabe selbst bleibt unberuehrt.
    pub async fn drive(
        &self,
        utterance: &Utterance,
        controller: &AudioPlaybackController,
    ) -> AvatarResult<()> {
        let analyzer = controller.analyzer();
        let start = Instant::now();
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frames = 0u64;
        let mut fehler = None;

        loop {
            interval.tick().await;
            if !controller.is_playing() {
                break;
            }
            let emotion = utterance.emotion_at(start.elapsed());
            let frame = self.profile.frame(emotion, analyzer.sample());
            if let Err(e) = self.renderer.apply(&frame) {
                warn!(id = %utterance.id, "Renderer-Fehler, Ausdruckssteuerung beendet: {}", e);
                fehler = Some(e);
                break;
            }
            frames += 1;
        }

        self.reset();
        debug!(id = %utterance.id, frames, "Ausdruckssteuerung beendet");
        fehler.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for ExpressionDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionDriver")
            .field("profile", &self.profile)
            .field("tick", &self.tick)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AvatarError;
    use avatalk_audio::{HeadlessOutput, PlaybackConfig};
    use avatalk_core::{AudioPayload, SegmentTiming};

    #[derive(Default)]
    struct Aufnahme {
        frames: Mutex<Vec<ExpressionFrame>>,
        fehler_ab: Option<usize>,
    }

    impl ExpressionRenderer for Aufnahme {
        fn apply(&self, frame: &ExpressionFrame) -> AvatarResult<()> {
            let mut frames = self.frames.lock();
            if self.fehler_ab.is_some_and(|n| frames.len() >= n) {
                return Err(AvatarError::Rendering("Kontext verloren".into()));
            }
            frames.push(*frame);
            Ok(())
        }
    }

    fn controller() -> AudioPlaybackController {
        AudioPlaybackController::new(Arc::new(HeadlessOutput::new()), PlaybackConfig::default())
            .unwrap()
    }

    // 300ms Vollaussteuerung bei 8kHz
    fn laut() -> AudioPayload {
        AudioPayload::from_samples(&[i16::MAX; 2400], 8000)
    }

    #[test]
    fn profile_parameter() {
        let f = RigProfile::Live2d.frame(Emotion::Happy, AmplitudeSample::SILENT);
        assert_eq!(f.mouth_parameter, "ParamMouthOpenY");
        assert_eq!(f.expression, "exp_happy");

        let f = RigProfile::Vrm.frame(Emotion::Sad, AmplitudeSample::SILENT);
        assert_eq!(f.mouth_parameter, "aa");
        assert_eq!(f.expression, "sad");
        assert!(RigProfile::Vrm.neutral().is_neutral());
    }

    #[test]
    fn profil_parsen() {
        assert_eq!("VRM".parse::<RigProfile>().unwrap(), RigProfile::Vrm);
        assert_eq!("2d".parse::<RigProfile>().unwrap(), RigProfile::Live2d);
        assert!("gltf".parse::<RigProfile>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn treibt_mund_und_setzt_einmal_zurueck() {
        let aufnahme = Arc::new(Aufnahme::default());
        let driver = ExpressionDriver::new(aufnahme.clone(), RigProfile::Live2d);
        let ctrl = controller();
        let utterance = Utterance::new(laut(), Emotion::Happy);

        ctrl.play(&utterance.audio, None).await;
        driver.drive(&utterance, &ctrl).await.unwrap();

        let frames = aufnahme.frames.lock();
        assert!(frames.len() > 2);
        assert!(frames.iter().any(|f| f.mouth_open > 0.9));
        assert!(frames[..frames.len() - 1]
            .iter()
            .all(|f| f.emotion == Emotion::Happy));
        let neutral = frames.iter().filter(|f| f.is_neutral()).count();
        assert_eq!(neutral, 1);
        assert!(frames.last().unwrap().is_neutral());
    }

    #[tokio::test(start_paused = true)]
    async fn zeitmarken_wechseln_emotion() {
        let aufnahme = Arc::new(Aufnahme::default());
        let driver = ExpressionDriver::new(aufnahme.clone(), RigProfile::Vrm);
        let ctrl = controller();
        let utterance = Utterance::new(laut(), Emotion::Happy).with_segments(vec![SegmentTiming {
            start: Duration::from_millis(150),
            emotion: Emotion::Sad,
        }]);

        ctrl.play(&utterance.audio, None).await;
        driver.drive(&utterance, &ctrl).await.unwrap();

        let frames = aufnahme.frames.lock();
        assert_eq!(frames.first().unwrap().emotion, Emotion::Happy);
        assert!(frames.iter().any(|f| f.emotion == Emotion::Sad));
    }

    #[tokio::test(start_paused = true)]
    async fn renderer_fehler_beendet_steuerung() {
        let aufnahme = Arc::new(Aufnahme {
            fehler_ab: Some(2),
            ..Default::default()
        });
        let driver = ExpressionDriver::new(aufnahme.clone(), RigProfile::Live2d);
        let ctrl = controller();
        let utterance = Utterance::new(laut(), Emotion::Neutral);

        ctrl.play(&utterance.audio, None).await;
        let result = driver.drive(&utterance, &ctrl).await;

        // Steuerung endet vor der Wiedergabe
        assert!(matches!(result, Err(AvatarError::Rendering(_))));
        assert!(ctrl.is_playing());
        assert_eq!(aufnahme.frames.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn ohne_wiedergabe_nur_zuruecksetzen() {
        let aufnahme = Arc::new(Aufnahme::default());
        let driver = ExpressionDriver::new(aufnahme.clone(), RigProfile::Live2d);
        let ctrl = controller();
        let utterance = Utterance::new(laut(), Emotion::Angry);

        driver.drive(&utterance, &ctrl).await.unwrap();

        let frames = aufnahme.frames.lock();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_neutral());
    }
}
