//! Release resolution and asset matching
//!
//! Talks to the GitHub release index for the configured engine repository.
//! Every `resolve` call performs a fresh query; "latest" is mutable upstream
//! state, so release metadata is never cached between calls.

use crate::error::{LodeError, LodeResult};
use crate::platform::AssetPattern;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use ureq::Agent;

/// Default release index
const DEFAULT_INDEX_URL: &str = "https://api.github.com";

/// Per-request timeout covering connect, send, and body read
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// User-agent identifying this client to the release index
const USER_AGENT: &str = concat!("lode/", env!("CARGO_PKG_VERSION"));

/// The repository publishing engine builds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRepo {
    pub owner: String,
    pub name: String,
}

impl Default for EngineRepo {
    fn default() -> Self {
        Self {
            owner: "ggml-org".to_string(),
            name: "llama.cpp".to_string(),
        }
    }
}

/// An individual downloadable file attached to a release
#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
}

/// A tagged release and its published assets, in published order.
/// Read-only after creation.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseInfo {
    #[serde(rename = "tag_name")]
    pub tag: String,
    pub assets: Vec<Asset>,
}

/// Client for the remote release index
#[derive(Clone)]
pub struct ReleaseClient {
    agent: Agent,
    base_url: String,
    repo: EngineRepo,
}

impl ReleaseClient {
    /// Create a client against the default index
    pub fn new(repo: EngineRepo) -> Self {
        Self::with_base_url(repo, DEFAULT_INDEX_URL)
    }

    /// Create a client against a custom index base URL (mirrors, tests)
    pub fn with_base_url(repo: EngineRepo, base_url: impl Into<String>) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .user_agent(USER_AGENT)
            .build()
            .into();

        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            repo,
        }
    }

    /// The HTTP agent, shared with the fetch engine so downloads reuse the
    /// same timeout and user-agent configuration
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Resolve release metadata for a tag, or the most recent published
    /// release when `tag` is `None`.
    pub async fn resolve(&self, tag: Option<&str>) -> LodeResult<ReleaseInfo> {
        let url = self.release_url(tag);
        let tag_label = tag.unwrap_or("latest").to_string();
        let agent = self.agent.clone();

        debug!("Resolving release {} via {}", tag_label, url);

        tokio::task::spawn_blocking(move || resolve_blocking(&agent, &url, &tag_label))
            .await
            .map_err(|e| LodeError::Internal(format!("resolver task panicked: {}", e)))?
    }

    fn release_url(&self, tag: Option<&str>) -> String {
        match tag {
            Some(tag) => format!(
                "{}/repos/{}/{}/releases/tags/{}",
                self.base_url, self.repo.owner, self.repo.name, tag
            ),
            None => format!(
                "{}/repos/{}/{}/releases/latest",
                self.base_url, self.repo.owner, self.repo.name
            ),
        }
    }
}

fn resolve_blocking(agent: &Agent, url: &str, tag_label: &str) -> LodeResult<ReleaseInfo> {
    let context = format!("resolving release {}", tag_label);

    let mut response = agent
        .get(url)
        .header("accept", "application/vnd.github+json")
        .call()
        .map_err(|e| map_request_error(e, tag_label, &context))?;

    let release: ReleaseInfo = response
        .body_mut()
        .read_json()
        .map_err(|e| LodeError::network(context, e.to_string()))?;

    debug!(
        "Resolved release {} with {} assets",
        release.tag,
        release.assets.len()
    );
    Ok(release)
}

/// Map a transport error to the taxonomy, preserving the attempted tag and
/// upstream status for the caller's retry decision
fn map_request_error(err: ureq::Error, tag_label: &str, context: &str) -> LodeError {
    match err {
        ureq::Error::StatusCode(404) => LodeError::ReleaseNotFound {
            tag: tag_label.to_string(),
        },
        ureq::Error::StatusCode(status) => LodeError::HttpStatus {
            status,
            context: context.to_string(),
        },
        ureq::Error::Timeout(_) => LodeError::Timeout {
            context: context.to_string(),
        },
        other => LodeError::network(context, other.to_string()),
    }
}

/// Select the single best asset for a pattern.
///
/// When multiple assets match (releases ship more than one compatible
/// artifact per OS/arch, e.g. different toolchains), the first match in the
/// release's published asset order wins. This keeps selection deterministic
/// across runs.
pub fn select_asset<'r>(release: &'r ReleaseInfo, pattern: &AssetPattern) -> LodeResult<&'r Asset> {
    let asset = release
        .assets
        .iter()
        .find(|a| pattern.matches(&a.name))
        .ok_or_else(|| LodeError::NoMatchingAsset {
            tag: release.tag.clone(),
            pattern: pattern.to_string(),
        })?;

    debug!("Matched asset {} for pattern {}", asset.name, pattern);
    Ok(asset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Arch, Os, PlatformTarget};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn release_body(tag: &str, names: &[&str]) -> serde_json::Value {
        json!({
            "tag_name": tag,
            "assets": names.iter().map(|n| json!({
                "name": n,
                "browser_download_url": format!("https://example.invalid/{}", n),
            })).collect::<Vec<_>>(),
        })
    }

    #[tokio::test]
    async fn resolve_latest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/ggml-org/llama.cpp/releases/latest"))
            .and(header("user-agent", USER_AGENT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(release_body("b6108", &["llama-b6108-bin-ubuntu-x64.zip"])),
            )
            .mount(&server)
            .await;

        let client = ReleaseClient::with_base_url(EngineRepo::default(), server.uri());
        let release = client.resolve(None).await.unwrap();

        assert_eq!(release.tag, "b6108");
        assert_eq!(release.assets.len(), 1);
        assert_eq!(release.assets[0].name, "llama-b6108-bin-ubuntu-x64.zip");
    }

    #[tokio::test]
    async fn resolve_specific_tag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/engine/releases/tags/b42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(release_body("b42", &[])))
            .mount(&server)
            .await;

        let repo = EngineRepo {
            owner: "acme".to_string(),
            name: "engine".to_string(),
        };
        let client = ReleaseClient::with_base_url(repo, server.uri());
        let release = client.resolve(Some("b42")).await.unwrap();
        assert_eq!(release.tag, "b42");
    }

    #[tokio::test]
    async fn resolve_unknown_tag_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = ReleaseClient::with_base_url(EngineRepo::default(), server.uri());
        let err = client.resolve(Some("v1")).await.unwrap_err();

        match err {
            LodeError::ReleaseNotFound { tag } => assert_eq!(tag, "v1"),
            other => panic!("expected ReleaseNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn resolve_server_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = ReleaseClient::with_base_url(EngineRepo::default(), server.uri());
        let err = client.resolve(None).await.unwrap_err();

        match err {
            LodeError::HttpStatus { status, ref context } => {
                assert_eq!(status, 503);
                assert!(context.contains("latest"));
            }
            other => panic!("expected HttpStatus, got {:?}", other),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn resolve_unreachable_index_is_network_error() {
        // A port that nothing listens on
        let client =
            ReleaseClient::with_base_url(EngineRepo::default(), "http://127.0.0.1:9");
        let err = client.resolve(None).await.unwrap_err();
        assert!(matches!(err, LodeError::Network { .. } | LodeError::Timeout { .. }));
    }

    #[test]
    fn select_first_match_wins() {
        let release: ReleaseInfo = serde_json::from_value(release_body(
            "b100",
            &[
                "llama-b100-bin-win-cuda-12.4-x64.zip",
                "cudart-llama-bin-win-cuda-12.4-x64.zip",
            ],
        ))
        .unwrap();

        let pattern = PlatformTarget::new(Os::Windows, Arch::X64, Some(crate::platform::GpuVariant::Cuda))
            .asset_pattern();
        let asset = select_asset(&release, &pattern).unwrap();
        assert_eq!(asset.name, "llama-b100-bin-win-cuda-12.4-x64.zip");
    }

    #[test]
    fn select_no_match_names_pattern() {
        let release: ReleaseInfo = serde_json::from_value(release_body(
            "b100",
            &[
                "llama-b100-bin-macos-arm64.zip",
                "llama-b100-bin-win-cpu-x64.zip",
            ],
        ))
        .unwrap();

        let pattern = PlatformTarget::new(Os::Linux, Arch::Arm64, None).asset_pattern();
        let err = select_asset(&release, &pattern).unwrap_err();

        match err {
            LodeError::NoMatchingAsset { tag, pattern } => {
                assert_eq!(tag, "b100");
                assert!(pattern.contains("ubuntu+arm64"));
            }
            other => panic!("expected NoMatchingAsset, got {:?}", other),
        }
    }

    #[test]
    fn select_skips_accelerator_builds_for_cpu_target() {
        let release: ReleaseInfo = serde_json::from_value(release_body(
            "b100",
            &[
                "llama-b100-bin-ubuntu-vulkan-x64.zip",
                "llama-b100-bin-ubuntu-x64.zip",
            ],
        ))
        .unwrap();

        let pattern = PlatformTarget::new(Os::Linux, Arch::X64, None).asset_pattern();
        let asset = select_asset(&release, &pattern).unwrap();
        assert_eq!(asset.name, "llama-b100-bin-ubuntu-x64.zip");
    }
}
