//! Rudder Engine - chart rendering with MiniJinja
//!
//! Turns a chart directory plus a values tree into a map of
//! `template file -> rendered manifest`. Helper templates (files whose name
//! starts with `_`) are loaded for `include`/`import` but never emitted.

pub mod engine;
pub mod error;
pub mod filters;

pub use engine::{Engine, EngineBuilder, NOTES_FILE};
pub use error::{EngineError, Result, TemplateError};
