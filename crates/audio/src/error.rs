//! Fehlertypen fuer die Audio-Wiedergabe

use thiserror::Error;

/// Alle moeglichen Fehler der Audio-Wiedergabe
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio-Geraet nicht gefunden: {0}")]
    GeraetNichtGefunden(String),

    #[error("Kein Standard-Ausgabegeraet verfuegbar")]
    KeinStandardAusgabegeraet,

    #[error("Stream-Fehler: {0}")]
    StreamFehler(String),

    #[error("Audio-Puffer ist leer")]
    LeererPuffer,

    #[error("Ungueltiges Audio-Format: {0}")]
    UngueltigesFormat(String),

    #[error("Audio konnte nicht dekodiert werden: {0}")]
    Dekodierung(String),

    #[error("Kein Ausgabe-Endpunkt verfuegbar")]
    KeinEndpunkt,

    #[error("Ausgabe-Endpunkt ist geschlossen")]
    EndpunktGeschlossen,

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;
