//! Utility functions for string formatting and manipulation.

pub mod format;

pub use format::{
    contains_ignore_case, digits_only, format_duration, format_timestamp_ms, slugify,
    truncate_string,
};
