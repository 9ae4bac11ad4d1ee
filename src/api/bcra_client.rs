use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};
use url::Url;

use super::{normalize, SeriesProvider};
use crate::config::ApiConfig;
use crate::error::FetchError;
use crate::models::{Endpoint, FetchWindow, Observation, SeriesRecord};

/// Client for the estadisticasbcra.com series API
pub struct BcraClient {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl BcraClient {
    /// Create a new client
    pub fn new(config: &ApiConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("bcra-etl/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            token: SecretString::from(config.token.expose_secret().to_string()),
        })
    }

    fn endpoint_url(&self, path: &str) -> Result<Url, FetchError> {
        Ok(Url::parse(&format!("{}{}", self.base_url, path))?)
    }
}

#[async_trait::async_trait]
impl SeriesProvider for BcraClient {
    async fn fetch_series(
        &self,
        endpoint: &Endpoint,
        window: &FetchWindow,
    ) -> Result<Vec<SeriesRecord>, FetchError> {
        let url = self.endpoint_url(endpoint.path)?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(
                "Failed to fetch data from {}. Status code: {}",
                endpoint.path,
                status.as_u16()
            );
            return Err(FetchError::Http(status.as_u16()));
        }
        info!("Status code: {} ({})", status.as_u16(), endpoint.path);

        let body = response.bytes().await?;
        let observations: Vec<Observation> = serde_json::from_slice(&body)?;
        let received = observations.len();

        let records = normalize(observations, endpoint.concept, window)?;
        debug!(
            "{}: kept {} of {} observations in {}",
            endpoint.path,
            records.len(),
            received,
            window
        );

        Ok(records)
    }
}
