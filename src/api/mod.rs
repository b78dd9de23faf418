pub mod client;
pub mod models;

pub use client::{content_id_from_location, ApiClient, ApiError, Result};
pub use models::{ApiConfig, CredentialProfile, ManifestResponse};
