// iZone controller HTTP client
//
// Wraps `reqwest::Client` with controller URL construction and the two
// request shapes the firmware understands: GET of a named resource, and
// POST of a command whose body is `{ "<Command>": <payload> }`.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Resource holding the controller's system settings.
pub const SYSTEM_SETTINGS: &str = "SystemSettings";

/// Number of zones returned by a single zone-group resource.
pub const ZONE_GROUP_SIZE: usize = 4;

/// Resource name for the zone group starting at `first_index` (0-based).
///
/// Groups are aligned to multiples of [`ZONE_GROUP_SIZE`]:
/// `0 -> Zones1_4`, `4 -> Zones5_8`, `8 -> Zones9_12`.
pub fn zone_group_resource(first_index: usize) -> String {
    let first = first_index - first_index % ZONE_GROUP_SIZE;
    format!("Zones{}_{}", first + 1, first + ZONE_GROUP_SIZE)
}

/// Raw HTTP client for one controller's local API.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct IZoneClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
}

impl IZoneClient {
    /// Create a new client from a `TransportConfig`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            base_url,
            timeout: transport.timeout,
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    ///
    /// `timeout` should match the one the client was built with; it is
    /// only used to report [`Error::Timeout`].
    pub fn with_client(http: reqwest::Client, base_url: Url, timeout: Duration) -> Self {
        Self {
            http,
            base_url,
            timeout,
        }
    }

    /// Client for the controller at `host` (an IP address or hostname).
    pub fn for_host(
        http: reqwest::Client,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let base_url = Url::parse(&format!("http://{host}:{port}/"))?;
        Ok(Self::with_client(http, base_url, timeout))
    }

    /// The controller base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// GET `/<resource>` and decode the JSON body.
    pub async fn get_resource<T: DeserializeOwned>(&self, resource: &str) -> Result<T, Error> {
        let url = self.base_url.join(resource)?;
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let resp = check_status(resp, resource)?;
        self.parse_json(resp).await
    }

    /// POST `/<command>` with body `{ "<command>": payload }`.
    ///
    /// Success is any 2xx status; the response body is ignored.
    pub async fn send_command(&self, command: &str, payload: Value) -> Result<(), Error> {
        let resp = self.post(command, payload).await?;
        check_status(resp, command)?;
        Ok(())
    }

    /// POST `/<command>` like [`send_command`](Self::send_command), decoding
    /// the JSON response body.
    pub async fn request<T: DeserializeOwned>(
        &self,
        command: &str,
        payload: Value,
    ) -> Result<T, Error> {
        let resp = self.post(command, payload).await?;
        let resp = check_status(resp, command)?;
        self.parse_json(resp).await
    }

    // ── Helpers ──────────────────────────────────────────────────────

    async fn post(&self, command: &str, payload: Value) -> Result<reqwest::Response, Error> {
        let url = self.base_url.join(command)?;
        let mut body = serde_json::Map::new();
        body.insert(command.to_owned(), payload);
        debug!("POST {}", url);
        let logged = Value::Object(body.clone());
        trace!(body = %logged, "command body");

        self.http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))
    }

    async fn parse_json<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T, Error> {
        let body = resp.text().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_str(&body).map_err(|e| {
            let preview = preview(&body);
            Error::Deserialization {
                message: format!("{e} (body preview: {preview:?})"),
                body,
            }
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            Error::Transport(err)
        }
    }
}

/// The first 200 characters of a response body.
fn preview(body: &str) -> &str {
    body.char_indices()
        .nth(200)
        .map_or(body, |(end, _)| &body[..end])
}

fn check_status(resp: reqwest::Response, path: &str) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(Error::Status {
            status: status.as_u16(),
            path: format!("/{path}"),
        })
    }
}
