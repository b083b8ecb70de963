//! Laden eines Avatar-Modells unter Zeitlimit

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use avatalk_audio::AudioPlaybackController;
use tracing::{error, info};

use crate::actor::AvatarModel;
use crate::error::{AvatarError, AvatarResult};
use crate::expression::{ExpressionDriver, ExpressionRenderer, RigProfile, DEFAULT_TICK};

/// Standard-Zeitlimit fuer das Laden eines Modells
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Parameter fuer das Laden
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub profile: RigProfile,
    pub load_timeout: Duration,
    /// Abtastintervall der Ausdruckssteuerung
    pub tick: Duration,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            profile: RigProfile::default(),
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            tick: DEFAULT_TICK,
        }
    }
}

/// Wartet auf `loader` (liefert den Renderer des Modells) und baut daraus
/// das `AvatarModel`. Ueberschreitet das Laden das Zeitlimit, ergibt das
/// `AvatarError::LadeZeitlimit`.
pub async fn bootstrap<Fut>(
    config: &BootstrapConfig,
    controller: Arc<AudioPlaybackController>,
    loader: Fut,
) -> AvatarResult<Arc<AvatarModel>>
where
    Fut: Future<Output = AvatarResult<Arc<dyn ExpressionRenderer>>>,
{
    info!(rig = %config.profile, "Lade Avatar-Modell");

    let renderer = match tokio::time::timeout(config.load_timeout, loader).await {
        Ok(result) => result?,
        Err(_) => {
            error!(
                zeitlimit_ms = config.load_timeout.as_millis() as u64,
                "Modell-Laden abgebrochen"
            );
            return Err(AvatarError::LadeZeitlimit(config.load_timeout));
        }
    };

    let driver = ExpressionDriver::new(renderer, config.profile).with_tick(config.tick);
    driver.reset();

    info!(rig = %config.profile, "Avatar-Modell geladen");
    Ok(Arc::new(AvatarModel::new(controller, driver)))
}

/// Prueft eine Modelldatei auf Existenz und passende Endung
pub async fn locate_model(profile: RigProfile, path: &Path) -> AvatarResult<PathBuf> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|_| AvatarError::ModellNichtGefunden(path.display().to_string()))?;
    if !meta.is_file() {
        return Err(AvatarError::ModellNichtGefunden(path.display().to_string()));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let passt = match profile {
        RigProfile::Live2d => name.ends_with(".model3.json"),
        RigProfile::Vrm => name.ends_with(".vrm"),
    };
    if !passt {
        return Err(AvatarError::Laden(format!(
            "{} ist kein {}-Modell",
            path.display(),
            profile
        )));
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::AvatarActor;
    use crate::expression::LogRenderer;
    use avatalk_audio::{HeadlessOutput, PlaybackConfig};

    fn controller() -> Arc<AudioPlaybackController> {
        Arc::new(
            AudioPlaybackController::new(Arc::new(HeadlessOutput::new()), PlaybackConfig::default())
                .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn laden_innerhalb_des_limits() {
        let config = BootstrapConfig {
            profile: RigProfile::Vrm,
            ..Default::default()
        };
        let model = bootstrap(&config, controller(), async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(Arc::new(LogRenderer::new("avatar.vrm")) as Arc<dyn ExpressionRenderer>)
        })
        .await
        .unwrap();

        assert_eq!(model.profile(), RigProfile::Vrm);
        assert!(!model.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn zeitlimit_ueberschritten() {
        let config = BootstrapConfig::default();
        let result = bootstrap(&config, controller(), async {
            tokio::time::sleep(Duration::from_secs(11)).await;
            Ok(Arc::new(LogRenderer::new("haengt")) as Arc<dyn ExpressionRenderer>)
        })
        .await;

        match result {
            Err(e @ AvatarError::LadeZeitlimit(_)) => assert!(e.is_retryable()),
            other => panic!("Zeitlimit erwartet, war {other:?}"),
        }
    }

    #[tokio::test]
    async fn ladefehler_wird_weitergereicht() {
        let result = bootstrap(&BootstrapConfig::default(), controller(), async {
            Err(AvatarError::ModellNichtGefunden("weg.model3.json".into()))
        })
        .await;
        assert!(matches!(result, Err(AvatarError::ModellNichtGefunden(_))));
    }

    #[tokio::test]
    async fn modelldatei_pruefen() {
        let dir = std::env::temp_dir().join(format!("avatalk-test-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let vrm = dir.join("avatar.vrm");
        tokio::fs::write(&vrm, b"glTF").await.unwrap();

        assert!(locate_model(RigProfile::Vrm, &vrm).await.is_ok());
        assert!(matches!(
            locate_model(RigProfile::Live2d, &vrm).await,
            Err(AvatarError::Laden(_))
        ));
        assert!(matches!(
            locate_model(RigProfile::Vrm, &dir.join("fehlt.vrm")).await,
            Err(AvatarError::ModellNichtGefunden(_))
        ));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
