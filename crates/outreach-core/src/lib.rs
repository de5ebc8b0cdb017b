//! `outreach-core` — shared configuration, error, and identifier types for the
//! outreach scheduler and pipeline state engine.
//!
//! Every other crate in this workspace depends on this one for its
//! `OutreachConfig`, the `CoreError` taxonomy, and the newtype ids that flow
//! through the data model described in `outreach-db`.

pub mod config;
pub mod error;
pub mod ids;
pub mod logging;
pub mod time;

pub use config::OutreachConfig;
pub use error::{CoreError, Result};
