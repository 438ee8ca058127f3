//! Utility modules: developer log sink, JSON helpers, bson value helpers.
pub mod devlog;
pub mod json;
pub mod num;
