//! Avatar-Akteur: die Faehigkeiten, die die Warteschlange benoetigt

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use avatalk_audio::AudioPlaybackController;
use avatalk_core::{Emotion, Utterance};
use parking_lot::RwLock;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::error::{AvatarError, AvatarResult};
use crate::expression::{ExpressionDriver, RigProfile};

/// Ein sprechfaehiger Avatar (2D oder 3D)
#[async_trait]
pub trait AvatarActor: Send + Sync {
    /// Spricht eine Utterance; kehrt nach Ende oder Abbruch der Wiedergabe zurueck
    async fn speak(&self, utterance: &Utterance) -> AvatarResult<()>;

    /// Beendet die Mundbewegung und setzt den Ausdruck zurueck
    async fn stop_speaking(&self) -> AvatarResult<()>;

    /// Stoppt die Audio-Wiedergabe
    async fn stop_audio(&self) -> AvatarResult<()>;

    /// Zeigt eine Emotion
    async fn play_emotion(&self, emotion: Emotion) -> AvatarResult<()>;

    /// Ob gerade Audio abgespielt wird
    fn is_playing(&self) -> bool;
}

// ---------------------------------------------------------------------------
// AvatarModel
// ---------------------------------------------------------------------------

/// Geladenes Modell: Audio-Controller plus Ausdruckssteuerung
pub struct AvatarModel {
    profile: RigProfile,
    controller: Arc<AudioPlaybackController>,
    driver: ExpressionDriver,
    speaking: AtomicBool,
}

impl AvatarModel {
    pub fn new(controller: Arc<AudioPlaybackController>, driver: ExpressionDriver) -> Self {
        Self {
            profile: driver.profile(),
            controller,
            driver,
            speaking: AtomicBool::new(false),
        }
    }

    pub fn profile(&self) -> RigProfile {
        self.profile
    }

    pub fn controller(&self) -> &Arc<AudioPlaybackController> {
        &self.controller
    }

    /// Ob gerade eine Utterance gesprochen wird
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AvatarActor for AvatarModel {
    async fn speak(&self, utterance: &Utterance) -> AvatarResult<()> {
        self.speaking.store(true, Ordering::SeqCst);
        debug!(id = %utterance.id, emotion = %utterance.emotion, "Spreche");

        if let Err(e) = self.driver.apply_emotion(utterance.emotion) {
            self.speaking.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let (tx, rx) = oneshot::channel::<()>();
        let played = self
            .controller
            .try_play(
                &utterance.audio,
                Some(Box::new(move || {
                    let _ = tx.send(());
                })),
            )
            .await;

        let mut result = played.map_err(AvatarError::from);
        if result.is_ok() {
            if let Err(e) = self.driver.drive(utterance, &self.controller).await {
                // Ohne Ausdruckssteuerung gilt die Utterance als beendet
                self.controller.stop().await;
                result = Err(e);
            }
        } else {
            self.driver.reset();
        }

        // Das Ende wird immer gemeldet, auch nach einem Stopp
        let _ = rx.await;
        self.speaking.store(false, Ordering::SeqCst);
        result
    }

    async fn stop_speaking(&self) -> AvatarResult<()> {
        self.speaking.store(false, Ordering::SeqCst);
        self.driver.reset();
        Ok(())
    }

    async fn stop_audio(&self) -> AvatarResult<()> {
        self.controller.stop().await;
        Ok(())
    }

    async fn play_emotion(&self, emotion: Emotion) -> AvatarResult<()> {
        self.driver.apply_emotion(emotion)
    }

    fn is_playing(&self) -> bool {
        self.controller.is_playing()
    }
}

impl fmt::Debug for AvatarModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvatarModel")
            .field("profile", &self.profile)
            .field("speaking", &self.is_speaking())
            .field("controller", &self.controller)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ActorSlot
// ---------------------------------------------------------------------------

/// Platz fuer den aktiven Avatar; leer, bis ein Modell geladen ist
#[derive(Clone, Default)]
pub struct ActorSlot {
    inner: Arc<RwLock<Option<Arc<dyn AvatarActor>>>>,
}

impl ActorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot, der bereits einen Akteur enthaelt
    pub fn with_actor(actor: Arc<dyn AvatarActor>) -> Self {
        let slot = Self::new();
        slot.set(actor);
        slot
    }

    /// Setzt (oder ersetzt) den aktiven Akteur
    pub fn set(&self, actor: Arc<dyn AvatarActor>) {
        *self.inner.write() = Some(actor);
        info!("Avatar aktiv");
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    /// Aktueller Akteur (None solange kein Modell geladen ist)
    pub fn get(&self) -> Option<Arc<dyn AvatarActor>> {
        self.inner.read().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.read().is_some()
    }
}

impl fmt::Debug for ActorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSlot")
            .field("ready", &self.is_ready())
            .finish()
    }
}
