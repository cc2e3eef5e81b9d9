//! `richmenu-core` — configuration, shared constants and error types used by
//! every other crate in the workspace.

pub mod config;
pub mod error;
pub mod truncate;

pub use config::RichMenuConfig;
pub use error::{CoreError, Result};
