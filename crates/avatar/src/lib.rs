//! avatalk-avatar – Avatar-Akteur und Ausdruckssteuerung
//!
//! - `AvatarActor`: Faehigkeiten, die die Warteschlange nutzt
//! - `AvatarModel`: Implementierung fuer 2D- (Live2D) und 3D-Rigs (VRM)
//! - `ExpressionDriver`: Mundoeffnung und Emotion pro Frame
//! - `bootstrap`: Modell laden unter Zeitlimit

pub mod actor;
pub mod bootstrap;
pub mod error;
pub mod expression;

pub use actor::{ActorSlot, AvatarActor, AvatarModel};
pub use bootstrap::{bootstrap, locate_model, BootstrapConfig, DEFAULT_LOAD_TIMEOUT};
pub use error::{AvatarError, AvatarResult};
pub use expression::{
    ExpressionDriver, ExpressionFrame, ExpressionRenderer, LogRenderer, RigProfile, DEFAULT_TICK,
};
