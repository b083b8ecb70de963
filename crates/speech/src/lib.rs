//! avatalk-speech – Sequentielle Sprachwiedergabe
//!
//! Die `UtteranceQueue` ist die einzige Instanz, die Sprache abspielen
//! laesst: strikt nacheinander, ohne Ueberlappung, mit hartem Abbruch.

pub mod queue;

pub use queue::{QueueConfig, UtteranceQueue, DEFAULT_IDLE_DELAY, DEFAULT_SETTLE_DELAY};
