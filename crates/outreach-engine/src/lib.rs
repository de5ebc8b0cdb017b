//! Enrollment engines: the classic fixed-step sequence and the AI-qualified
//! smart pipeline, plus the connection-acceptance scan shared by both
//!. The scheduler crate owns tick cadence; this
//! crate owns what happens inside one tick's work.

pub mod classic;
pub mod connections;
pub mod context;
pub mod error;
pub mod pipeline;

pub use error::{EngineError, Result};
