//! Exit codes for CLI operations
//!
//! These follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// The release is not in a state that allows the operation
pub const STATE_ERROR: i32 = 2;

/// Template rendering or manifest parsing failed
pub const TEMPLATE_ERROR: i32 = 3;

/// Invalid chart structure or Chart.yaml
pub const CHART_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Release or version does not exist
pub const NOT_FOUND: i32 = 6;

/// A transition ran and failed; the release is now marked failed
pub const OPERATION_FAILED: i32 = 7;

/// Usage or configuration error (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
