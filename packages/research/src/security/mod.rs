//! Credential handling and SSRF protection for outbound fetches.

mod credentials;
mod url_validator;

pub use credentials::{mask_secret, SecretString};
pub use url_validator::UrlValidator;
