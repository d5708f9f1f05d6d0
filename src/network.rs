//! Network access for the passthrough path and for seeding.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use tracing::debug;
use url::Url;

use crate::error::{Result, WorkerError};
use crate::http::{Request, Response};

/// Something that can answer a request the way the real network would.
///
/// Non-2xx responses are still `Ok`; only transport failures are errors.
pub trait Network: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// HTTP client rooted at the site's origin.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Url,
}

impl HttpNetwork {
  pub fn new(origin: Url, timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| WorkerError::Network {
        url: origin.to_string(),
        reason: format!("Failed to create HTTP client: {}", e),
      })?;

    Ok(Self { client, origin })
  }

  /// Resolve a site path (e.g. `/static/manifest.json`) against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    resolve(&self.origin, path)
  }
}

/// Resolve `path` against `origin`.
pub fn resolve(origin: &Url, path: &str) -> Result<Url> {
  origin.join(path).map_err(|e| WorkerError::InvalidUrl {
    url: path.to_string(),
    reason: e.to_string(),
  })
}

impl Network for HttpNetwork {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
    let client = self.client.clone();
    let request = request.clone();

    async move {
      let url = request.url.to_string();
      let network_error = |reason: String| WorkerError::Network {
        url: url.clone(),
        reason,
      };

      let method = Method::from_bytes(request.method.as_bytes())
        .map_err(|e| network_error(format!("invalid method: {}", e)))?;

      let mut headers = HeaderMap::new();
      for (name, value) in &request.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
          .map_err(|e| network_error(format!("invalid header name: {}", e)))?;
        let value = HeaderValue::from_str(value)
          .map_err(|e| network_error(format!("invalid header value: {}", e)))?;
        headers.append(name, value);
      }

      let response = client
        .request(method, request.url.clone())
        .headers(headers)
        .body(request.body)
        .send()
        .await
        .map_err(|e| network_error(e.to_string()))?;

      let status = response.status();
      let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| match std::str::from_utf8(value.as_bytes()) {
          Ok(v) => Some((name.as_str().to_string(), v.to_string())),
          Err(_) => {
            debug!(
              url = %url,
              header = name.as_str(),
              "Dropping response header that is not UTF-8"
            );
            None
          }
        })
        .collect();

      let body = response
        .bytes()
        .await
        .map_err(|e| network_error(e.to_string()))?;

      Ok(Response {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        body: body.to_vec(),
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::io::{AsyncReadExt, AsyncWriteExt};
  use tokio::net::TcpListener;

  /// Serve one connection with `reply` verbatim and return the origin to reach it.
  async fn serve_once(reply: Vec<u8>) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
      let (mut socket, _) = listener.accept().await.unwrap();
      let mut request = Vec::new();
      let mut buf = [0u8; 1024];
      while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
          break;
        }
        request.extend_from_slice(&buf[..n]);
      }
      socket.write_all(&reply).await.unwrap();
      socket.shutdown().await.unwrap();
    });

    Url::parse(&format!("http://{}", addr)).unwrap()
  }

  fn client(origin: &Url) -> HttpNetwork {
    // Keep loopback traffic away from any proxy set in the environment
    let client = reqwest::Client::builder()
      .no_proxy()
      .timeout(Duration::from_secs(5))
      .build()
      .unwrap();
    HttpNetwork {
      client,
      origin: origin.clone(),
    }
  }

  #[tokio::test]
  async fn test_error_status_is_returned_as_response() {
    let origin = serve_once(
      b"HTTP/1.1 404 Not Found\r\n\
        Content-Type: text/html\r\n\
        Content-Length: 9\r\n\
        Connection: close\r\n\
        \r\n\
        not found"
        .to_vec(),
    )
    .await;
    let network = client(&origin);

    let request = Request::get(network.resolve("/recipe/404").unwrap());
    let response = network.fetch(&request).await.unwrap();

    assert_eq!(response.status, 404);
    assert_eq!(response.status_text, "Not Found");
    assert!(!response.is_success());
    assert_eq!(response.header("content-type"), Some("text/html"));
    assert_eq!(response.body, b"not found");
  }

  #[tokio::test]
  async fn test_non_utf8_header_is_dropped_and_others_kept() {
    let mut reply = b"HTTP/1.1 200 OK\r\nX-Chef: Jos".to_vec();
    reply.push(0xe9);
    reply.extend_from_slice(
      "\r\nX-Dish: Crème brûlée\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok".as_bytes(),
    );
    let origin = serve_once(reply).await;
    let network = client(&origin);

    let response = network
      .fetch(&Request::get(network.resolve("/").unwrap()))
      .await
      .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.header("x-chef"), None);
    assert_eq!(response.header("x-dish"), Some("Crème brûlée"));
    assert_eq!(response.body, b"ok");
  }

  #[tokio::test]
  async fn test_refused_connection_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let origin = Url::parse(&format!("http://{}", addr)).unwrap();
    let network = client(&origin);
    let result = network
      .fetch(&Request::get(network.resolve("/").unwrap()))
      .await;

    assert!(matches!(result, Err(WorkerError::Network { ref url, .. }) if url.ends_with('/')));
  }

  #[test]
  fn test_resolve_against_origin() {
    let origin = Url::parse("http://127.0.0.1:5000").unwrap();
    assert_eq!(
      resolve(&origin, "/static/manifest.json").unwrap().as_str(),
      "http://127.0.0.1:5000/static/manifest.json"
    );
    assert_eq!(resolve(&origin, "/").unwrap().as_str(), "http://127.0.0.1:5000/");
  }

  #[test]
  fn test_resolve_keeps_absolute_urls() {
    let origin = Url::parse("http://127.0.0.1:5000").unwrap();
    assert_eq!(
      resolve(&origin, "https://cdn.example.com/app.css")
        .unwrap()
        .as_str(),
      "https://cdn.example.com/app.css"
    );
  }
}
