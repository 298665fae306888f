use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UrlParamError {
    #[error("Query parameter name is empty")]
    EmptyName,
    #[error("Query parameter '{0}' has an empty value")]
    EmptyValue(String),
}

/// An [`HttpClient`] wrapper that sends the live ETA token as a URL query
/// parameter, for providers that do not accept a header.
///
/// Any pair already carrying the parameter name is replaced, so the token
/// appears exactly once.
pub struct UrlParam<C> {
    inner: C,
    param_name: String,
    key: String,
}

impl<C> UrlParam<C> {
    pub fn new(inner: C, param_name: &str, key: &str) -> Result<Self, UrlParamError> {
        let param_name = param_name.trim();
        if param_name.is_empty() {
            return Err(UrlParamError::EmptyName);
        }
        if key.trim().is_empty() {
            return Err(UrlParamError::EmptyValue(param_name.to_string()));
        }
        Ok(Self {
            inner,
            param_name: param_name.to_string(),
            key: key.to_string(),
        })
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let kept: Vec<(String, String)> = req
            .url()
            .query_pairs()
            .filter(|(name, _)| name != self.param_name.as_str())
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();

        req.url_mut()
            .query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(&self.param_name, &self.key);
        self.inner.execute(req).await
    }
}
