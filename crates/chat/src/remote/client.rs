//! HTTP client for the chat gateway
//!
//! Speaks JSON to a gateway that fronts the account's message API.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use serde::de::DeserializeOwned;
use url::Url;

use super::api::{ApiError, ListThreadsResponse, MessagePageResponse, RemoteMessage, RemoteThread};
use super::{RemoteError, RemoteErrorKind, RemoteSource};
use crate::config::SessionCookies;
use crate::models::{Location, ThreadId};

/// Fixed user agent; a stable value avoids "unusual login" alerts
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_10_2) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/86.0.4240.75 Safari/537.36";

/// Remote source backed by the HTTP gateway
pub struct HttpSource {
    base_url: Url,
    cookie_header: String,
}

impl HttpSource {
    /// Create a client for `base_url`, authenticating with session cookies
    pub fn new(base_url: &str, cookies: &SessionCookies) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("Invalid gateway URL {:?}: {}", base_url, e))?;
        anyhow::ensure!(
            !base_url.cannot_be_a_base(),
            "Gateway URL {} cannot be used as a base",
            base_url
        );

        Ok(Self {
            base_url,
            cookie_header: cookies.to_header(),
        })
    }

    /// Build `{base}/{segments...}` with the given query pairs
    fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, RemoteError> {
        let response = ureq::get(url.as_str())
            .header("Cookie", &self.cookie_header)
            .header("User-Agent", USER_AGENT)
            .call();

        match response {
            Ok(mut resp) => resp.body_mut().read_json().map_err(|e| {
                RemoteError::new(
                    RemoteErrorKind::Decode,
                    format!("Failed to parse response from {}: {}", url.path(), e),
                )
            }),
            Err(ureq::Error::StatusCode(status)) => Err(RemoteError::new(
                RemoteErrorKind::Http(status),
                format!("{} returned HTTP {}", url.path(), status),
            )),
            Err(e) => Err(RemoteError::new(
                RemoteErrorKind::Transport,
                format!("Failed to send request to {}: {}", url.path(), e),
            )),
        }
    }
}

/// Turn an error payload into an API error, otherwise hand back the data
fn into_result<T>(data: Option<T>, error: Option<ApiError>) -> Result<T, RemoteError> {
    match (data, error) {
        (_, Some(error)) => Err(RemoteError::api(error.message)),
        (Some(data), None) => Ok(data),
        (None, None) => Err(RemoteError::new(
            RemoteErrorKind::Decode,
            "Response carried neither data nor error",
        )),
    }
}

impl RemoteSource for HttpSource {
    fn list_threads(&self, location: Location) -> Result<Vec<RemoteThread>, RemoteError> {
        let url = self.endpoint(&["threads"], &[("location", location.as_str().to_string())]);
        let response: ListThreadsResponse = self.get_json(&url)?;
        into_result(response.threads, response.error)
    }

    fn fetch_messages_before(
        &self,
        thread_id: &ThreadId,
        before: i64,
        limit: usize,
    ) -> Result<Vec<RemoteMessage>, RemoteError> {
        let url = self.endpoint(
            &["threads", thread_id.as_str(), "messages"],
            &[("before", before.to_string()), ("limit", limit.to_string())],
        );
        let response: MessagePageResponse = self.get_json(&url)?;
        into_result(response.messages, response.error)
    }
}
