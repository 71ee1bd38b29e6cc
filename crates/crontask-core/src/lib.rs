//! `crontask-core`: configuration and error types shared by every crontask crate.

pub mod config;
pub mod error;

pub use config::CrontaskConfig;
pub use error::{CrontaskError, Result};
