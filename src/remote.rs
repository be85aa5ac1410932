//! HTTP/JSON adapter for the remote service.
//!
//! The core only sees `fetch_remote` closures and the [`DocumentRemote`]
//! trait; paths, headers and the bearer token stay here.

use color_eyre::{eyre::eyre, Result};
use futures::future::{BoxFuture, FutureExt};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::editor::DocumentRemote;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest error body echoed back in a failure message
const ERROR_BODY_CHARS: usize = 200;

/// Remote API client wrapper
#[derive(Clone)]
pub struct RemoteClient {
  http: reqwest::Client,
  base_url: Url,
  token: Option<String>,
}

#[derive(Serialize)]
struct DocumentBody<'a> {
  content: &'a str,
}

#[derive(Deserialize)]
struct SavedDocument {
  id: String,
}

#[derive(Serialize)]
struct SuggestionRequest<'a> {
  text: &'a str,
}

#[derive(Deserialize)]
struct SuggestionResponse {
  #[serde(default)]
  suggestions: Vec<String>,
}

impl RemoteClient {
  pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
    let mut base_url =
      Url::parse(base_url).map_err(|e| eyre!("Invalid remote base URL {}: {}", base_url, e))?;
    // Url::join drops the last segment unless the path ends in '/'
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    let http = reqwest::Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      token,
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  /// Resolve a resource path against the base URL.
  pub fn url(&self, path: &str) -> Result<Url> {
    self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| eyre!("Invalid resource path {}: {}", path, e))
  }

  /// GET a JSON resource
  pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let url = self.url(path)?;
    self.execute(self.http.get(url.clone()), &url).await
  }

  /// Send a JSON body and parse the JSON reply
  pub async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let url = self.url(path)?;
    let payload =
      serde_json::to_string(body).map_err(|e| eyre!("Failed to encode request body: {}", e))?;
    let request = self
      .http
      .request(method, url.clone())
      .header(reqwest::header::CONTENT_TYPE, "application/json")
      .body(payload);
    self.execute(request, &url).await
  }

  /// A `fetch_remote` closure for [`crate::cache::CacheAsideLoader::load`].
  pub fn fetcher<T>(&self, path: &str) -> impl FnOnce() -> BoxFuture<'static, Result<T>> + Send + 'static
  where
    T: DeserializeOwned + Send + 'static,
  {
    let client = self.clone();
    let path = path.to_string();
    move || async move { client.get_json::<T>(&path).await }.boxed()
  }

  async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder, url: &Url) -> Result<T> {
    let request = match &self.token {
      Some(token) => request.bearer_auth(token),
      None => request,
    };

    debug!(%url, "remote request");
    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach {}: {}", url, e))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| eyre!("Failed to read response from {}: {}", url, e))?;

    if !status.is_success() {
      let snippet: String = body.chars().take(ERROR_BODY_CHARS).collect();
      return Err(eyre!("{} returned {}: {}", url, status, snippet));
    }

    serde_json::from_str(&body).map_err(|e| eyre!("Failed to parse response from {}: {}", url, e))
  }
}

impl DocumentRemote for RemoteClient {
  fn save(&self, id: Option<String>, content: String) -> impl Future<Output = Result<String>> + Send {
    let client = self.clone();
    async move {
      let body = DocumentBody { content: &content };
      let saved: SavedDocument = match id {
        Some(id) => {
          client
            .send_json(Method::PUT, &format!("documents/{}", id), &body)
            .await?
        }
        None => client.send_json(Method::POST, "documents", &body).await?,
      };
      Ok(saved.id)
    }
  }

  fn suggest(&self, content: String) -> impl Future<Output = Result<Vec<String>>> + Send {
    let client = self.clone();
    async move {
      let reply: SuggestionResponse = client
        .send_json(Method::POST, "suggestions", &SuggestionRequest { text: &content })
        .await?;
      Ok(reply.suggestions)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_base_url_gets_trailing_slash() {
    let client = RemoteClient::new("https://api.example.com/v1", None).unwrap();
    assert_eq!(client.base_url().as_str(), "https://api.example.com/v1/");
    assert_eq!(
      client.url("/devices").unwrap().as_str(),
      "https://api.example.com/v1/devices"
    );
    assert_eq!(
      client.url("scenes?home=1").unwrap().as_str(),
      "https://api.example.com/v1/scenes?home=1"
    );
  }

  #[test]
  fn test_invalid_base_url() {
    assert!(RemoteClient::new("not a url", None).is_err());
  }

  #[tokio::test]
  async fn test_unreachable_host_is_error() {
    // Port 9 (discard) is closed on any sane test host
    let client = RemoteClient::new("http://127.0.0.1:9/", Some("t".to_string())).unwrap();
    let fetch = client.fetcher::<serde_json::Value>("devices");
    let err = fetch().await.unwrap_err();
    assert!(format!("{}", err).contains("127.0.0.1"));
  }
}
