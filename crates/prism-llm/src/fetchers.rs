//! Per-provider model fetchers.
//!
//! Remote providers list models over HTTP. The local provider can also be
//! listed by invoking its CLI, under a strict execution contract: the
//! executable is resolved to an absolute path via PATH lookup, must be a
//! regular file with the executable bit set and no group/other write
//! permission, the argument list is fixed, no user input reaches the
//! argv, and no shell is ever involved. Any validation failure or
//! non-zero exit surfaces as an error, which the registry converts into a
//! cached-snapshot fallback.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use prism_core::error::{ErrorCode, ProviderError, classify_status};
use prism_core::model::{Capability, ModelInfo, Provenance};

use crate::provider::{ProviderResult, provider_error_from_reqwest};
use crate::registry::ModelFetcher;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP fetchers
// ─────────────────────────────────────────────────────────────────────────────

/// `GET {base}/models` for `OpenAI`-compatible providers.
pub struct OpenAiCompatFetcher {
    provider: &'static str,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatFetcher {
    /// Build a fetcher for one provider endpoint.
    pub fn new(
        provider: &'static str,
        base_url: impl Into<String>,
        api_key: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            provider,
            base_url: base_url.into(),
            api_key,
            client,
        }
    }
}

#[derive(Deserialize)]
struct OpenAiModelList {
    data: Vec<OpenAiModelEntry>,
}

#[derive(Deserialize)]
struct OpenAiModelEntry {
    id: String,
}

#[async_trait]
impl ModelFetcher for OpenAiCompatFetcher {
    async fn fetch(&self) -> ProviderResult<Vec<ModelInfo>> {
        let url = format!("{}/models", self.base_url.trim_end_matches('/'));
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| provider_error_from_reqwest(self.provider, "list_models", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(
                classify_status(status.as_u16()),
                format!("HTTP {status}: {body}"),
            )
            .with_provider(self.provider)
            .with_operation("list_models"));
        }

        let list: OpenAiModelList = response
            .json()
            .await
            .map_err(|e| provider_error_from_reqwest(self.provider, "list_models", e))?;

        Ok(list
            .data
            .into_iter()
            .map(|entry| {
                let mut info = ModelInfo::new(entry.id);
                let _ = info.capabilities.insert(Capability::Chat);
                info.provenance = Provenance {
                    fetched_via: "http".into(),
                    source: url.clone(),
                };
                info
            })
            .collect())
    }
}

/// `GET {base}/models?key=...` for Gemini.
pub struct GeminiFetcher {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl GeminiFetcher {
    /// Build a fetcher against the Gemini API base URL.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            client,
        }
    }
}

#[derive(Deserialize)]
struct GeminiModelList {
    #[serde(default)]
    models: Vec<GeminiModelEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiModelEntry {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    input_token_limit: Option<u64>,
}

#[async_trait]
impl ModelFetcher for GeminiFetcher {
    async fn fetch(&self) -> ProviderResult<Vec<ModelInfo>> {
        let url = format!("{}/models", self.base_url.trim_end_matches('/'));
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| provider_error_from_reqwest("gemini", "list_models", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(
                classify_status(status.as_u16()),
                format!("HTTP {status}: {body}"),
            )
            .with_provider("gemini")
            .with_operation("list_models"));
        }

        let list: GeminiModelList = response
            .json()
            .await
            .map_err(|e| provider_error_from_reqwest("gemini", "list_models", e))?;

        Ok(list
            .models
            .into_iter()
            .map(|entry| {
                // API names come prefixed: "models/gemini-2.0-flash".
                let id = entry
                    .name
                    .strip_prefix("models/")
                    .unwrap_or(&entry.name)
                    .to_owned();
                let mut info = ModelInfo::new(id);
                info.name = entry.display_name;
                info.context_length = entry.input_token_limit;
                let _ = info.capabilities.insert(Capability::Chat);
                info.provenance = Provenance {
                    fetched_via: "http".into(),
                    source: url.clone(),
                };
                info
            })
            .collect())
    }
}

/// `GET {host}/api/tags` for a local Ollama daemon.
pub struct OllamaHttpFetcher {
    host: String,
    client: reqwest::Client,
}

impl OllamaHttpFetcher {
    /// Build a fetcher against the local daemon host.
    pub fn new(host: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            host: host.into(),
            client,
        }
    }
}

#[derive(Deserialize)]
struct OllamaTagList {
    #[serde(default)]
    models: Vec<OllamaTagEntry>,
}

#[derive(Deserialize)]
struct OllamaTagEntry {
    name: String,
}

#[async_trait]
impl ModelFetcher for OllamaHttpFetcher {
    async fn fetch(&self) -> ProviderResult<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.host.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| provider_error_from_reqwest("ollama", "list_models", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::new(
                classify_status(status.as_u16()),
                format!("HTTP {status} from local daemon"),
            )
            .with_provider("ollama")
            .with_operation("list_models"));
        }

        let list: OllamaTagList = response
            .json()
            .await
            .map_err(|e| provider_error_from_reqwest("ollama", "list_models", e))?;

        Ok(list
            .models
            .into_iter()
            .map(|entry| {
                let mut info = ModelInfo::new(entry.name);
                let _ = info.capabilities.insert(Capability::Chat);
                let _ = info.capabilities.insert(Capability::Streaming);
                info.provenance = Provenance {
                    fetched_via: "http".into(),
                    source: url.clone(),
                };
                info
            })
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Local process fetcher
// ─────────────────────────────────────────────────────────────────────────────

/// Fetcher that invokes a local executable with a fixed argument list.
pub struct LocalProcessFetcher {
    provider: &'static str,
    program: &'static str,
    args: &'static [&'static str],
    parse: fn(&str) -> Vec<ModelInfo>,
}

impl LocalProcessFetcher {
    /// The standard `ollama list` fetcher.
    pub fn ollama() -> Self {
        Self {
            provider: "ollama",
            program: "ollama",
            args: &["list"],
            parse: parse_ollama_list,
        }
    }

    /// Resolve and validate the executable.
    ///
    /// Must be an absolute path from a PATH lookup, a regular file,
    /// executable, and not writable by group or other.
    fn resolve_executable(&self) -> ProviderResult<PathBuf> {
        let path = which::which(self.program).map_err(|e| {
            ProviderError::new(
                ErrorCode::NotFound,
                format!("executable '{}' not found on PATH: {e}", self.program),
            )
            .with_provider(self.provider)
            .with_operation("list_models")
        })?;

        validate_executable(self.provider, &path)?;
        Ok(path)
    }
}

fn validate_executable(provider: &str, path: &Path) -> ProviderResult<()> {
    let err = |message: String| {
        ProviderError::new(ErrorCode::Unsupported, message)
            .with_provider(provider)
            .with_operation("list_models")
    };

    if !path.is_absolute() {
        return Err(err(format!("resolved path {} is not absolute", path.display())));
    }

    let metadata = std::fs::metadata(path)
        .map_err(|e| err(format!("cannot stat {}: {e}", path.display())))?;
    if !metadata.is_file() {
        return Err(err(format!("{} is not a regular file", path.display())));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        if mode & 0o111 == 0 {
            return Err(err(format!("{} is not executable", path.display())));
        }
        if mode & 0o022 != 0 {
            return Err(err(format!(
                "{} is writable by group or other (mode {mode:o})",
                path.display()
            )));
        }
    }

    Ok(())
}

/// Parse `ollama list` tabular output: one model per line, name first,
/// header line skipped.
fn parse_ollama_list(stdout: &str) -> Vec<ModelInfo> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .filter(|name| !name.is_empty())
        .map(|name| {
            let mut info = ModelInfo::new(name);
            let _ = info.capabilities.insert(Capability::Chat);
            let _ = info.capabilities.insert(Capability::Streaming);
            info.provenance = Provenance {
                fetched_via: "local_process".into(),
                source: "ollama list".into(),
            };
            info
        })
        .collect()
}

#[async_trait]
impl ModelFetcher for LocalProcessFetcher {
    async fn fetch(&self) -> ProviderResult<Vec<ModelInfo>> {
        let executable = self.resolve_executable()?;
        debug!(
            provider = self.provider,
            executable = %executable.display(),
            "invoking local model listing"
        );

        // Fixed argv, direct exec, no shell interpretation.
        let output = tokio::process::Command::new(&executable)
            .args(self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ProviderError::new(ErrorCode::Transient, format!("failed to run {}: {e}", executable.display()))
                    .with_provider(self.provider)
                    .with_operation("list_models")
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::new(
                ErrorCode::Provider,
                format!("{} exited with {}: {stderr}", executable.display(), output.status),
            )
            .with_provider(self.provider)
            .with_operation("list_models"));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok((self.parse)(&stdout))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
