//! Credential injection for the live ETA endpoint. The token always comes
//! from configuration.

mod api_key;
mod url_param;

pub use api_key::ApiKey;
pub use url_param::{UrlParam, UrlParamError};
