use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::{Auth, Config};
use crate::error::{HttpError, Result};

pub struct HttpClient {
    client: Client,
    config: Config,
}

impl HttpClient {
    pub fn new(config: Config) -> Result<Self> {
        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs));

        if !config.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| HttpError::Config(format!("Failed to build client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth {
            Auth::None => request,
            Auth::Bearer(token) => request.bearer_auth(token),
            Auth::Basic { user, password } => request.basic_auth(user, Some(password)),
        }
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        self.authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| HttpError::Http(format!("GET request failed: {}", e)))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = check_status(self.get(url).await?).await?;
        response
            .json()
            .await
            .map_err(|e| HttpError::Decode(format!("JSON parse failed: {}", e)))
    }

    pub async fn post<T: Serialize>(&self, url: &str, body: &T) -> Result<Response> {
        self.authorize(self.client.post(url))
            .json(body)
            .send()
            .await
            .map_err(|e| HttpError::Http(format!("POST request failed: {}", e)))
    }

    pub async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<R> {
        let response = check_status(self.post(url, body).await?).await?;
        response
            .json()
            .await
            .map_err(|e| HttpError::Decode(format!("JSON parse failed: {}", e)))
    }

    /// POST where only the status matters; the response body is discarded.
    pub async fn post_ok<T: Serialize>(&self, url: &str, body: &T) -> Result<()> {
        check_status(self.post(url, body).await?).await?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HttpError::Status {
        status: status.as_u16(),
        body,
    })
}
