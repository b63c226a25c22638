//! Preload engine: injects application data into a device OS image by
//! driving a runner container over the container runtime, with application
//! and release metadata resolved through the remote API.
//!
//! The engine is consumed through the [`PreloadEngine`] trait, a strict
//! three-phase contract (prepare, preload, cleanup) whose caller owns the
//! lifecycle ordering. Progress telemetry flows out through [`EventSink`].

mod engine;
mod error;
mod events;

pub use engine::{PreloadConfig, PreloadEngine, Preloader, RUNNER_IMAGE};
pub use error::{EngineError, Result};
pub use events::{Event, EventSink, NullSink, SpinnerAction};
