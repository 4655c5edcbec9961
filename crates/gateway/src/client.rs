use reqwest::Client;
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

use crate::error::GatewayError;

/// JSON-over-HTTP client bound to one peer endpoint
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base: Url,
}

impl HttpClient {
    /// Create a client for `endpoint`
    ///
    /// The endpoint is treated as a directory so relative routes append to
    /// it instead of replacing its last segment.
    pub fn new(client: Client, endpoint: &str) -> Result<Self, GatewayError> {
        let mut base = Url::parse(endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub async fn get<T: DeserializeOwned>(&self, route: &str) -> Result<T, GatewayError> {
        let url = self.base.join(route)?;
        let resp = self.client.get(url).send().await?;
        Self::handle_response(resp).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<T, GatewayError> {
        let url = self.base.join(route)?;
        let resp = self.client.post(url).json(body).send().await?;
        Self::handle_response(resp).await
    }

    /// POST where only the status matters; any body is discarded
    pub async fn post_ack<B: Serialize + ?Sized>(
        &self,
        route: &str,
        body: &B,
    ) -> Result<String, GatewayError> {
        let url = self.base.join(route)?;
        let resp = self.client.post(url).json(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    async fn handle_response<T: DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| GatewayError::Decode(format!("{}: {}", e, text)))
    }
}
