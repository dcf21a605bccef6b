//! Rudder Core - shared types for the release manager
//!
//! This crate provides the foundational types used throughout Rudder:
//! - `Chart`: The package definition loaded from a chart directory
//! - `Values`: Configuration values with deep merge support
//! - `ReleaseInfo`: Release data exposed to templates
//! - `TemplateContext`: Everything a template can see while rendering

pub mod chart;
pub mod context;
pub mod error;
pub mod release;
pub mod values;

pub use chart::{ChartMetadata, LoadedChart};
pub use context::TemplateContext;
pub use error::{CoreError, Result};
pub use release::ReleaseInfo;
pub use values::{Values, parse_set_values};
