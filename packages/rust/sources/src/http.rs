//! HTTP plumbing shared by the adapters.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use convoreplay_shared::{ReplayError, Result, SourceOptions};

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// User-Agent string for every request (the hosting API rejects anonymous agents).
pub const USER_AGENT: &str = concat!("convoreplay/", env!("CARGO_PKG_VERSION"));

/// Build a reqwest client with the adapters' settings.
pub fn build_client(opts: &SourceOptions) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(opts.timeout_secs))
        .build()
        .map_err(|e| ReplayError::Network(format!("failed to build HTTP client: {e}")))
}

/// GET a URL and return its body as text.
///
/// `resource` names what is being fetched for the not-found message.
pub(crate) async fn fetch_text(client: &Client, url: &str, resource: &str) -> Result<String> {
    debug!(%url, "GET");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ReplayError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ReplayError::from_status(url, status.as_u16(), resource));
    }

    response
        .text()
        .await
        .map_err(|e| ReplayError::Network(format!("{url}: failed to read body: {e}")))
}

/// GET a hosting-API URL and decode the JSON body as `T`.
///
/// A body that is not JSON is a parse error; JSON of the wrong shape is a
/// malformed response.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    client: &Client,
    url: &str,
    resource: &str,
) -> Result<T> {
    let body = fetch_text(client, url, resource).await?;
    let value: Value = serde_json::from_str(&body)
        .map_err(|e| ReplayError::parse(format!("{url}: {e}")))?;
    T::deserialize(value).map_err(|e| ReplayError::malformed(format!("{url}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> Client {
        build_client(&SourceOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn status_codes_map_to_error_kinds() {
        let server = MockServer::start().await;
        for (route, status) in [("/missing", 404), ("/limited", 403), ("/broken", 500)] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
        }

        let client = client();
        let url = format!("{}/missing", server.uri());
        let err = fetch_text(&client, &url, "Gist").await.unwrap_err();
        assert!(matches!(err, ReplayError::NotFound { .. }));
        assert_eq!(err.to_string(), "Gist is private or does not exist");

        let url = format!("{}/limited", server.uri());
        let err = fetch_text(&client, &url, "Gist").await.unwrap_err();
        assert!(matches!(err, ReplayError::RateLimited { .. }));

        let url = format!("{}/broken", server.uri());
        let err = fetch_text(&client, &url, "Gist").await.unwrap_err();
        assert!(matches!(err, ReplayError::RequestFailed { status: 500, .. }));
    }

    #[tokio::test]
    async fn json_errors_are_split_by_kind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/object"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"a":1}"#))
            .mount(&server)
            .await;

        let client = client();
        let url = format!("{}/html", server.uri());
        let err = fetch_json::<Vec<Value>>(&client, &url, "x").await.unwrap_err();
        assert!(matches!(err, ReplayError::Parse { .. }));

        let url = format!("{}/object", server.uri());
        let err = fetch_json::<Vec<Value>>(&client, &url, "x").await.unwrap_err();
        assert!(matches!(err, ReplayError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", USER_AGENT))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let body = fetch_text(&client(), &server.uri(), "x").await.unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn transport_failure_is_network_error() {
        // Nothing listens on port 9 of the loopback.
        let err = fetch_text(&client(), "http://127.0.0.1:9/", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, ReplayError::Network(_)));
    }
}
