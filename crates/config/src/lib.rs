//! Layered configuration for quill.

pub mod error;
mod load;
mod models;

pub use crate::load::{Loader, user_config_dir};
pub use crate::models::{Background, Config, ImportConfig, ManifestConfig};
