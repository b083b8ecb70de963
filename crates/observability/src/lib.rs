//! # avatalk-observability
//!
//! Structured Logging (Text oder JSON) via tracing-subscriber.

pub mod logging;

pub use logging::{logging_initialisieren, LogFormat};
