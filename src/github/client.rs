//! GitHub REST implementation of [`RepositoryHost`]

use super::host::{HostError, RepositoryHost};
use super::types::{
    CommitRef, ConcurrencyToken, FileRef, PutFile, PutOutcome, RemoteFile, RepoCoordinates,
    TreeEntry,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::{header, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("featuremap/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct EncodedContent {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    content: PutContent,
    commit: PutCommit,
}

#[derive(Debug, Deserialize)]
struct PutContent {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PutCommit {
    sha: String,
    #[serde(default)]
    html_url: Option<String>,
}

/// Talks to the GitHub REST API (or a compatible server at `api_base`)
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: Url,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(
        api_base: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, HostError> {
        let api_base = Url::parse(api_base).map_err(|e| HostError::Rejected {
            status: 0,
            message: format!("invalid API base URL '{}': {}", api_base, e),
        })?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| HostError::Unavailable {
                message: format!("failed to build HTTP client: {}", e),
                status: None,
            })?;

        Ok(Self {
            http,
            api_base,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        url
    }

    fn repo_url<'a>(
        &self,
        coords_owner: &'a str,
        coords_repo: &'a str,
        rest: impl IntoIterator<Item = &'a str>,
    ) -> Url {
        self.url(
            ["repos", coords_owner, coords_repo]
                .into_iter()
                .chain(rest),
        )
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, HostError> {
        builder.send().await.map_err(|e| HostError::Unavailable {
            message: e.to_string(),
            status: None,
        })
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, HostError> {
        response
            .json::<T>()
            .await
            .map_err(|e| HostError::InvalidResponse {
                message: e.to_string(),
            })
    }

    /// Maps a non-success response onto a [`HostError`]
    async fn classify(response: Response, what: &str) -> HostError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = extract_message(&body).unwrap_or_else(|| status.to_string());
        classify_status(status, what, message)
    }
}

fn extract_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
}

fn classify_status(status: StatusCode, what: &str, message: String) -> HostError {
    let lower = message.to_lowercase();
    match status {
        StatusCode::UNAUTHORIZED => HostError::Auth { message },
        StatusCode::FORBIDDEN if lower.contains("rate limit") => HostError::Unavailable {
            message,
            status: Some(status.as_u16()),
        },
        StatusCode::FORBIDDEN => HostError::Auth { message },
        StatusCode::NOT_FOUND => HostError::NotFound {
            what: what.to_string(),
        },
        StatusCode::CONFLICT => HostError::Conflict {
            path: what.to_string(),
            message,
        },
        StatusCode::UNPROCESSABLE_ENTITY if lower.contains("sha") => HostError::Conflict {
            path: what.to_string(),
            message,
        },
        StatusCode::TOO_MANY_REQUESTS => HostError::Unavailable {
            message,
            status: Some(status.as_u16()),
        },
        s if s.is_server_error() => HostError::Unavailable {
            message,
            status: Some(s.as_u16()),
        },
        s => HostError::Rejected {
            status: s.as_u16(),
            message,
        },
    }
}

fn decode_base64(encoded: &str, encoding: &str) -> Result<Vec<u8>, HostError> {
    if !encoding.is_empty() && encoding != "base64" {
        return Err(HostError::InvalidResponse {
            message: format!("unsupported content encoding '{}'", encoding),
        });
    }
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| HostError::InvalidResponse {
            message: format!("invalid base64 content: {}", e),
        })
}

#[async_trait]
impl RepositoryHost for GitHubClient {
    async fn default_branch(&self, coords: &RepoCoordinates) -> Result<String, HostError> {
        let url = self.repo_url(&coords.owner, &coords.repo, []);
        let response = self.send(self.request(Method::GET, url)).await?;
        if !response.status().is_success() {
            return Err(Self::classify(response, &coords.full_name()).await);
        }
        let info: RepoInfo = Self::read_json(response).await?;
        Ok(info.default_branch)
    }

    async fn list_files(
        &self,
        coords: &RepoCoordinates,
        branch: &str,
    ) -> Result<Vec<TreeEntry>, HostError> {
        let mut url = self.repo_url(&coords.owner, &coords.repo, ["git", "trees", branch]);
        url.query_pairs_mut().append_pair("recursive", "1");

        let response = self.send(self.request(Method::GET, url)).await?;
        if !response.status().is_success() {
            return Err(Self::classify(response, &format!("{}@{}", coords.full_name(), branch)).await);
        }

        let tree: TreeResponse = Self::read_json(response).await?;
        if tree.truncated {
            warn!(
                repo = %coords,
                "Tree listing was truncated by the host; some files will be missing"
            );
        }

        Ok(tree
            .tree
            .into_iter()
            .filter(|item| item.kind == "blob")
            .map(|item| TreeEntry {
                path: item.path,
                token: ConcurrencyToken::new(item.sha),
                size: item.size,
            })
            .collect())
    }

    async fn read_blob(
        &self,
        coords: &RepoCoordinates,
        entry: &TreeEntry,
    ) -> Result<Vec<u8>, HostError> {
        let url = self.repo_url(
            &coords.owner,
            &coords.repo,
            ["git", "blobs", entry.token.as_str()],
        );
        let response = self.send(self.request(Method::GET, url)).await?;
        if !response.status().is_success() {
            return Err(Self::classify(response, &entry.path).await);
        }
        let blob: EncodedContent = Self::read_json(response).await?;
        decode_base64(&blob.content, &blob.encoding)
    }

    async fn get_file(&self, file: &FileRef) -> Result<Option<RemoteFile>, HostError> {
        let mut url = self.repo_url(
            &file.owner,
            &file.repo,
            std::iter::once("contents").chain(file.path.split('/')),
        );
        url.query_pairs_mut().append_pair("ref", &file.branch);

        let response = self.send(self.request(Method::GET, url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(file = %file, "No remote file at path");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::classify(response, &file.path).await);
        }

        let body: serde_json::Value = Self::read_json(response).await?;
        if body.is_array() {
            return Err(HostError::Rejected {
                status: 200,
                message: format!("'{}' is a directory", file.path),
            });
        }
        let contents: ContentsResponse =
            serde_json::from_value(body).map_err(|e| HostError::InvalidResponse {
                message: e.to_string(),
            })?;
        if !contents.kind.is_empty() && contents.kind != "file" {
            return Err(HostError::Rejected {
                status: 200,
                message: format!("'{}' is a {}, not a file", file.path, contents.kind),
            });
        }

        Ok(Some(RemoteFile {
            path: file.path.clone(),
            content: decode_base64(&contents.content, &contents.encoding)?,
            token: ConcurrencyToken::new(contents.sha),
        }))
    }

    async fn put_file(&self, file: &FileRef, put: PutFile) -> Result<PutOutcome, HostError> {
        let url = self.repo_url(
            &file.owner,
            &file.repo,
            std::iter::once("contents").chain(file.path.split('/')),
        );
        let body = PutRequest {
            message: &put.message,
            content: STANDARD.encode(put.content.as_bytes()),
            branch: &file.branch,
            sha: put.token.as_ref().map(ConcurrencyToken::as_str),
        };

        let response = self
            .send(self.request(Method::PUT, url).json(&body))
            .await?;
        if !response.status().is_success() {
            return Err(Self::classify(response, &file.path).await);
        }

        let outcome: PutResponse = Self::read_json(response).await?;
        Ok(PutOutcome {
            commit: CommitRef {
                sha: outcome.commit.sha,
                url: outcome.commit.html_url,
            },
            new_token: ConcurrencyToken::new(outcome.content.sha),
        })
    }

    fn name(&self) -> &str {
        "GitHub"
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_base", &self.api_base.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building_encodes_segments() {
        let client =
            GitHubClient::new("https://api.github.com", None, Duration::from_secs(5)).unwrap();
        let url = client.repo_url(
            "octo",
            "hello",
            std::iter::once("contents").chain("docs/read me.md".split('/')),
        );
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octo/hello/contents/docs/read%20me.md"
        );
    }

    #[test]
    fn test_url_building_with_base_path() {
        let client = GitHubClient::new(
            "https://ghe.example.com/api/v3/",
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let url = client.repo_url("o", "r", []);
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/repos/o/r");
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "x", "Bad credentials".into()),
            HostError::Auth { .. }
        ));
        assert!(matches!(
            classify_status(
                StatusCode::FORBIDDEN,
                "x",
                "API rate limit exceeded".into()
            ),
            HostError::Unavailable {
                status: Some(403),
                ..
            }
        ));
        assert!(matches!(
            classify_status(StatusCode::CONFLICT, "a.txt", "a.txt does not match".into()),
            HostError::Conflict { .. }
        ));
        assert!(matches!(
            classify_status(
                StatusCode::UNPROCESSABLE_ENTITY,
                "a.txt",
                "\"sha\" wasn't supplied".into()
            ),
            HostError::Conflict { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, "a.txt", "Invalid path".into()),
            HostError::Rejected { status: 422, .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "x", "".into()),
            HostError::Unavailable { .. }
        ));
    }

    #[test]
    fn test_decode_base64_with_line_breaks() {
        let encoded = "aGVsbG8g\nd29ybGQ=\n";
        assert_eq!(decode_base64(encoded, "base64").unwrap(), b"hello world");
        assert!(decode_base64("abc", "utf-8").is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = GitHubClient::new(
            DEFAULT_GITHUB_API_BASE,
            Some("ghp_secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("ghp_secret"));
    }
}
