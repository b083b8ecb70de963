//! Ereignisse und Statusflags der Sprachwiedergabe
//!
//! `SpeechEvent` fliesst ueber einen tokio-broadcast-Kanal zu allen
//! Interessenten (Logs, UI). `SpeechStatus` ist der lesbare Snapshot fuer
//! die Praesentationsschicht.

use crate::types::UtteranceId;
use serde::{Deserialize, Serialize};

/// Alle Ereignisse der Sprachwiedergabe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeechEvent {
    /// Utterance wurde in die Warteschlange aufgenommen
    Eingereiht { id: UtteranceId, wartend: usize },
    /// Utterance wurde verworfen (Force-Stop aktiv)
    Verworfen { id: UtteranceId },
    /// Wiedergabe einer Utterance beginnt
    Gestartet { id: UtteranceId },
    /// Wiedergabe einer Utterance ist beendet
    Beendet { id: UtteranceId },
    /// Wiedergabe ist fehlgeschlagen (wird wie beendet behandelt)
    Fehlgeschlagen { id: UtteranceId, grund: String },
    /// Warteschlange wurde per Force-Stop geleert
    Geleert { verworfen: usize },
    /// Alle Stop-Versuche sind fehlgeschlagen, Zustand wurde trotzdem zurueckgesetzt
    StopErschoepft { versuche: u32 },
    /// Avatar wurde nach der Ruhepause in den neutralen Zustand versetzt
    Leerlauf,
}

/// Prozessweite Statusflags (nur lesend fuer die UI)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechStatus {
    /// Avatar spricht gerade
    pub speaking: bool,
    /// Anzahl wartender Utterances
    pub pending: usize,
    /// Stop wurde angefordert und laeuft noch
    pub stop_speech: bool,
}
