use futures::future::{BoxFuture, FutureExt};
use image::DynamicImage;
use serde::Deserialize;
use std::io::Cursor;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::config::Config;
use crate::error::Result;

/// Looks up a cover image for a book by its name.
pub trait CoverService: Send + Sync {
    fn resolve_cover<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<DynamicImage>>>;
}

/// Reports whether the network is reachable right now.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> BoxFuture<'_, bool>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    cover_i: Option<i64>,
}

pub struct OpenLibraryCovers {
    client: reqwest::Client,
    search_url: String,
    cover_url: String,
}

impl OpenLibraryCovers {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            search_url: config.search_url.trim_end_matches('/').to_string(),
            cover_url: config.cover_url.trim_end_matches('/').to_string(),
        })
    }

    fn search_query(&self, name: &str) -> String {
        format!(
            "{}?title={}&limit=1&fields=cover_i",
            self.search_url,
            urlencoding::encode(name)
        )
    }

    async fn fetch(&self, name: &str) -> Result<Option<DynamicImage>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }

        let response: SearchResponse = self
            .client
            .get(self.search_query(name))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let Some(cover_id) = response.docs.into_iter().find_map(|d| d.cover_i) else {
            log::debug!("no cover found for {:?}", name);
            return Ok(None);
        };

        let url = format!("{}/{}-L.jpg", self.cover_url, cover_id);
        let bytes = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let image = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .decode()?;
        Ok(Some(image))
    }
}

impl CoverService for OpenLibraryCovers {
    fn resolve_cover<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<DynamicImage>>> {
        self.fetch(name).boxed()
    }
}

fn build_client() -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("bookshelf-tui/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(15))
        .build()?;
    Ok(client)
}

/// Treats the network as up when a TCP connection to `addr` opens in time.
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.connectivity_probe.clone(), config.probe_timeout())
    }
}

impl Connectivity for TcpProbe {
    fn is_online(&self) -> BoxFuture<'_, bool> {
        async move {
            matches!(
                tokio::time::timeout(self.timeout, TcpStream::connect(self.addr.as_str())).await,
                Ok(Ok(_))
            )
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn search_query_is_encoded() {
        let covers = OpenLibraryCovers::new(&Config {
            search_url: "https://example.test/search.json/".to_string(),
            ..Config::default()
        })
        .unwrap();

        assert_eq!(
            covers.search_query("War & Peace"),
            "https://example.test/search.json?title=War%20%26%20Peace&limit=1&fields=cover_i"
        );
    }

    #[test]
    fn search_response_without_covers() {
        let response: SearchResponse =
            serde_json::from_str(r#"{ "numFound": 1, "docs": [ { "title": "x" } ] }"#).unwrap();
        assert!(response.docs.into_iter().find_map(|d| d.cover_i).is_none());
    }

    #[tokio::test]
    async fn blank_name_skips_network() {
        let covers = OpenLibraryCovers::new(&Config {
            search_url: "http://127.0.0.1:9/search.json".to_string(),
            ..Config::default()
        })
        .unwrap();
        assert!(covers.resolve_cover("   ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn probe_sees_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let probe = TcpProbe::new(addr.to_string(), Duration::from_secs(1));
        assert!(probe.is_online().await);

        drop(listener);
        let probe = TcpProbe::new(addr.to_string(), Duration::from_millis(200));
        assert!(!probe.is_online().await);
    }
}
