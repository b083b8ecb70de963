//! Fehlertypen fuer Avatar-Modelle

use std::time::Duration;

use avatalk_audio::AudioError;
use thiserror::Error;

/// Fehler beim Laden oder Ansteuern eines Avatars
#[derive(Debug, Error)]
pub enum AvatarError {
    #[error("Modell nicht innerhalb von {0:?} geladen")]
    LadeZeitlimit(Duration),

    #[error("Modell nicht gefunden: {0}")]
    ModellNichtGefunden(String),

    #[error("Modell konnte nicht geladen werden: {0}")]
    Laden(String),

    #[error("Kein Avatar geladen")]
    KeinAvatar,

    #[error("Rendering-Fehler: {0}")]
    Rendering(String),

    #[error("Audio-Fehler: {0}")]
    Audio(#[from] AudioError),
}

impl AvatarError {
    /// Ob ein erneuter Versuch sinnvoll ist
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LadeZeitlimit(_) | Self::Laden(_))
    }
}

pub type AvatarResult<T> = Result<T, AvatarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = AvatarError::LadeZeitlimit(Duration::from_secs(10));
        assert_eq!(e.to_string(), "Modell nicht innerhalb von 10s geladen");
        assert!(e.is_retryable());
        assert!(!AvatarError::KeinAvatar.is_retryable());
    }

    #[test]
    fn audio_fehler_konvertierung() {
        let e: AvatarError = AudioError::LeererPuffer.into();
        assert!(matches!(e, AvatarError::Audio(_)));
    }
}
