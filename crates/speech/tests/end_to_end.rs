//! Ende-zu-Ende: Warteschlange, Avatar-Modell und Audio-Controller auf
//! der geraetelosen Ausgabe

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use avatalk_audio::{AudioPlaybackController, HeadlessOutput, PlaybackConfig};
use avatalk_avatar::{
    ActorSlot, AvatarActor, AvatarModel, AvatarResult, ExpressionDriver, ExpressionFrame,
    ExpressionRenderer, RigProfile,
};
use avatalk_core::{AudioPayload, Emotion, SpeechEvent, Utterance, UtteranceId};
use avatalk_speech::{QueueConfig, UtteranceQueue};
use parking_lot::Mutex;
use tokio::sync::broadcast;

#[derive(Default)]
struct Bild {
    frames: Mutex<Vec<ExpressionFrame>>,
}

impl ExpressionRenderer for Bild {
    fn apply(&self, frame: &ExpressionFrame) -> AvatarResult<()> {
        self.frames.lock().push(*frame);
        Ok(())
    }
}

struct Aufbau {
    queue: UtteranceQueue,
    model: Arc<AvatarModel>,
    bild: Arc<Bild>,
}

fn aufbau() -> Aufbau {
    let controller = AudioPlaybackController::new(
        Arc::new(HeadlessOutput::new()),
        PlaybackConfig::default(),
    )
    .unwrap();
    let bild = Arc::new(Bild::default());
    let driver = ExpressionDriver::new(bild.clone(), RigProfile::Live2d);
    let model = Arc::new(AvatarModel::new(Arc::new(controller), driver));
    let queue = UtteranceQueue::new(
        ActorSlot::with_actor(model.clone() as Arc<dyn AvatarActor>),
        QueueConfig::default(),
    );
    Aufbau { queue, model, bild }
}

/// Kurzer Ton mit `ms` Millisekunden bei 8kHz
fn ton(ms: usize) -> AudioPayload {
    AudioPayload::from_samples(&vec![12_000i16; ms * 8], 8000)
}

async fn warte_bis_leer(queue: &UtteranceQueue) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while queue.has_active_tasks() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Warteschlange wurde nicht leer");
}

fn alle(events: &mut broadcast::Receiver<SpeechEvent>) -> Vec<SpeechEvent> {
    let mut out = Vec::new();
    while let Ok(e) = events.try_recv() {
        out.push(e);
    }
    out
}

fn position(events: &[SpeechEvent], gesucht: &SpeechEvent) -> usize {
    events
        .iter()
        .position(|e| e == gesucht)
        .unwrap_or_else(|| panic!("{gesucht:?} fehlt"))
}

#[tokio::test(start_paused = true)]
async fn a_dann_b_dann_leerlauf() {
    let Aufbau { queue, model, bild } = aufbau();
    let mut events = queue.subscribe();

    let a = Utterance::new(ton(200), Emotion::Happy);
    let b = Utterance::new(ton(200), Emotion::Sad);
    let (a_id, b_id): (UtteranceId, UtteranceId) = (a.id, b.id);
    queue.enqueue(a);
    queue.enqueue(b);

    warte_bis_leer(&queue).await;
    assert!(!model.is_playing());

    let ev = alle(&mut events);
    let a_start = position(&ev, &SpeechEvent::Gestartet { id: a_id });
    let a_ende = position(&ev, &SpeechEvent::Beendet { id: a_id });
    let b_start = position(&ev, &SpeechEvent::Gestartet { id: b_id });
    let b_ende = position(&ev, &SpeechEvent::Beendet { id: b_id });
    assert!(a_start < a_ende && a_ende < b_start && b_start < b_ende);

    // Beide Utterances haben den Mund bewegt
    {
        let frames = bild.frames.lock();
        assert!(frames.iter().any(|f| f.emotion == Emotion::Happy && f.mouth_open > 0.5));
        assert!(frames.iter().any(|f| f.emotion == Emotion::Sad && f.mouth_open > 0.5));
    }

    tokio::time::sleep(Duration::from_millis(1600)).await;
    let leerlauf = alle(&mut events)
        .into_iter()
        .filter(|e| *e == SpeechEvent::Leerlauf)
        .count();
    assert_eq!(leerlauf, 1);
    assert!(bild.frames.lock().last().unwrap().is_neutral());
}

#[tokio::test(start_paused = true)]
async fn defekter_puffer_dann_gueltiger() {
    let Aufbau { queue, .. } = aufbau();
    let mut events = queue.subscribe();
    let fertig = Arc::new(AtomicBool::new(false));

    let f = Arc::clone(&fertig);
    let kaputt = Utterance::new(AudioPayload::pcm16(vec![1u8, 2, 3], 8000), Emotion::Neutral)
        .on_complete(move || f.store(true, Ordering::SeqCst));
    let kaputt_id = kaputt.id;
    let gut = Utterance::new(ton(100), Emotion::Relaxed);
    let gut_id = gut.id;

    assert!(queue.enqueue(kaputt));
    assert!(queue.enqueue(gut));
    warte_bis_leer(&queue).await;

    assert!(fertig.load(Ordering::SeqCst));
    let ev = alle(&mut events);
    assert!(ev
        .iter()
        .any(|e| matches!(e, SpeechEvent::Fehlgeschlagen { id, .. } if *id == kaputt_id)));
    assert!(ev.contains(&SpeechEvent::Beendet { id: gut_id }));
}

#[tokio::test(start_paused = true)]
async fn leeren_stoppt_echte_wiedergabe() {
    let Aufbau { queue, model, bild } = aufbau();

    queue.enqueue(Utterance::new(ton(5000), Emotion::Angry));
    queue.enqueue(Utterance::new(ton(5000), Emotion::Angry));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(model.is_playing());

    queue.clear_queue().await;

    assert!(!model.is_playing());
    assert!(!queue.has_active_tasks());
    assert!(bild.frames.lock().last().unwrap().is_neutral());
}
