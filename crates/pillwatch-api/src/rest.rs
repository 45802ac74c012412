// Home Assistant REST API client
//
// Wraps `reqwest::Client` with bearer-token injection and the small set of
// endpoints the panel needs: a full state dump and service invocation.
// Responses are returned as wire types; domain conversion lives in core.

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::StateObject;
use crate::transport::TransportConfig;

/// HTTP client for the Home Assistant REST API.
///
/// Every request carries the long-lived access token as a bearer header.
/// The client is cheap to clone (`reqwest::Client` is internally
/// reference-counted).
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    token: SecretString,
}

impl RestClient {
    /// Create a new REST client from a `TransportConfig`.
    ///
    /// `base_url` is the instance root (e.g. `http://homeassistant.local:8123`).
    pub fn new(base_url: Url, token: SecretString, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url, token })
    }

    /// Create a REST client with a pre-built `reqwest::Client`.
    ///
    /// Used by tests that point at a mock server.
    pub fn from_reqwest(
        base_url: &str,
        token: SecretString,
        http: reqwest::Client,
    ) -> Result<Self, Error> {
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            token,
        })
    }

    /// The instance base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build a full URL for an API path: `{base}/api/{path}`.
    pub(crate) fn api_url(&self, path: &str) -> Url {
        let base = self.base_url.as_str().trim_end_matches('/');
        let full = format!("{base}/api/{path}");
        Url::parse(&full).expect("invalid API URL")
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// Fetch the complete state dump: every entity the instance exposes.
    pub async fn get_states(&self) -> Result<Vec<StateObject>, Error> {
        self.get(self.api_url("states")).await
    }

    /// Invoke a service: `POST /api/services/{domain}/{service}`.
    ///
    /// The response body (a list of states the call touched) is ignored --
    /// callers observe effects through the state stream, not the response.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: &serde_json::Value,
    ) -> Result<(), Error> {
        let url = self.api_url(&format!("services/{domain}/{service}"));
        debug!(%url, "POST service call");

        let resp = self
            .http
            .post(url)
            .bearer_auth(self.token.expose_secret())
            .json(data)
            .send()
            .await
            .map_err(Error::Transport)?;

        Self::check_status(&resp)?;
        Ok(())
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and deserialize the JSON body.
    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!(%url, "GET");

        let resp = self
            .http
            .get(url)
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(Error::Transport)?;

        Self::check_status(&resp)?;

        let body = resp.text().await.map_err(Error::Transport)?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    /// Map non-success HTTP statuses to errors.
    fn check_status(resp: &reqwest::Response) -> Result<(), Error> {
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: "access token rejected".into(),
            });
        }
        if !status.is_success() {
            return Err(Error::Api {
                message: status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .into(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
