// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Resource-definition discovery: source classification and visitors.
//!
//! A [`SourceConfig`] describes where resource definitions come from
//! (an inline command pair, filenames, URLs, stdin). [`resolve`] turns it
//! into an ordered list of [`Visitor`]s, accumulating every input error
//! instead of failing at the first one.

pub mod decode;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;
use walkdir::WalkDir;

use crate::constants::{DEFAULT_HTTP_ATTEMPTS, FILE_EXTENSIONS};
use crate::error::{MeshctlError, Result};
use crate::resource::ResourceDocument;
use decode::decode_stream;

/// An inline (kind, name) pair supplied on the command line.
///
/// `name` may be empty; list semantics are deferred to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSource {
    pub kind: String,
    pub name: String,
}

/// Immutable description of where resource definitions are read from.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub command: Option<CommandSource>,
    /// Filenames in order; `-` means stdin, `http(s)://...` means URL,
    /// anything else is a filesystem path.
    pub filenames: Vec<String>,
    pub recursive: bool,
    /// Attempt budget for fetching URL sources
    pub http_attempts: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            command: None,
            filenames: Vec::new(),
            recursive: false,
            http_attempts: DEFAULT_HTTP_ATTEMPTS,
        }
    }
}

/// A single source of decoded resource documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Visitor {
    /// The process standard input; consumable at most once per process
    Stdin,
    /// One local file (already expanded from a path argument)
    File(PathBuf),
    /// A remote document, fetched with a bounded retry budget
    Url { url: Url, attempts: u32 },
    /// A synthesized document from an inline (kind, name) pair
    Command { kind: String, name: String },
}

impl Visitor {
    /// Produce the decoded documents for this source.
    ///
    /// File and URL visitors are restartable by re-reading; the stdin
    /// visitor drains the process stream and cannot be replayed.
    pub async fn documents(&self) -> Result<Vec<ResourceDocument>> {
        match self {
            Visitor::Stdin => {
                let mut input = String::new();
                tokio::io::stdin().read_to_string(&mut input).await?;
                decode_stream(&input, "stdin")
            }
            Visitor::File(path) => {
                let input = tokio::fs::read_to_string(path).await?;
                decode_stream(&input, &path.display().to_string())
            }
            Visitor::Url { url, attempts } => {
                let body = fetch_with_retry(url, *attempts).await?;
                decode_stream(&body, url.as_str())
            }
            Visitor::Command { kind, name } => Ok(vec![ResourceDocument {
                kind: kind.clone(),
                name: name.clone(),
                namespace: None,
                body: serde_yaml::Value::Null,
            }]),
        }
    }
}

const RETRY_DELAY: Duration = Duration::from_millis(100);

/// One shared HTTP client so retried and successive fetches reuse the
/// connection pool.
fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(reqwest::Client::new)
}

/// Classified outcome of one failed fetch attempt.
enum FetchFailure {
    Transient(MeshctlError),
    Terminal(MeshctlError),
}

/// Fetch a URL body, retrying transient failures up to `attempts` times.
///
/// Connection errors and 5xx responses are transient; any other HTTP error
/// status is terminal.
async fn fetch_with_retry(url: &Url, attempts: u32) -> Result<String> {
    let client = http_client();
    fetch_with_budget(url, attempts, || async {
        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchFailure::Transient(e.into()))?;
        let status = response.status();
        if status.is_success() {
            return response
                .text()
                .await
                .map_err(|e| FetchFailure::Transient(e.into()));
        }
        let err = MeshctlError::Api {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        };
        if status.is_server_error() {
            Err(FetchFailure::Transient(err))
        } else {
            Err(FetchFailure::Terminal(err))
        }
    })
    .await
}

/// Drive a fetch attempt through the retry budget: transient failures are
/// retried after a short delay, terminal failures surface immediately, and
/// an exhausted budget reports the last transient failure.
async fn fetch_with_budget<F, Fut>(url: &Url, attempts: u32, mut fetch: F) -> Result<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<String, FetchFailure>>,
{
    let mut last_error: Option<MeshctlError> = None;

    for attempt in 1..=attempts.max(1) {
        if attempt > 1 {
            sleep(RETRY_DELAY).await;
        }
        match fetch().await {
            Ok(body) => return Ok(body),
            Err(FetchFailure::Terminal(e)) => return Err(e),
            Err(FetchFailure::Transient(e)) => {
                warn!("fetching {} failed (attempt {}): {}", url, attempt, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| MeshctlError::Api {
        status: 0,
        message: format!("no attempts made fetching {}", url),
    }))
}

/// The outcome of resolving a [`SourceConfig`]: visitors in source order
/// plus every accumulated input error.
#[derive(Debug, Default)]
pub struct Resolution {
    pub visitors: Vec<Visitor>,
    pub errors: Vec<String>,
    /// True when a single literal file was named without `recursive`;
    /// affects downstream error-message singularity only.
    pub single_item_implied: bool,
}

impl Resolution {
    /// Finalize: the visitor list if no input error accumulated, otherwise
    /// all errors jointly as one value.
    pub fn into_visitors(self) -> Result<Vec<Visitor>> {
        if self.errors.is_empty() {
            Ok(self.visitors)
        } else {
            Err(MeshctlError::InvalidSources(self.errors))
        }
    }
}

/// Resolve a source configuration into an ordered visitor list.
///
/// The command source comes first, then filenames in argument order. Input
/// errors accumulate and never short-circuit the remaining arguments.
pub fn resolve(config: &SourceConfig) -> Resolution {
    let mut resolution = Resolution::default();
    let mut stdin_in_use = false;
    let mut fs_paths: Vec<&str> = Vec::new();
    let mut fs_visitor_count = 0usize;

    if let Some(command) = &config.command {
        resolution.visitors.push(Visitor::Command {
            kind: command.kind.clone(),
            name: command.name.clone(),
        });
    }

    for filename in &config.filenames {
        match filename.as_str() {
            "-" => {
                if stdin_in_use {
                    resolution
                        .errors
                        .push("stdin already in use".to_string());
                } else {
                    stdin_in_use = true;
                    resolution.visitors.push(Visitor::Stdin);
                }
            }
            s if s.starts_with("http://") || s.starts_with("https://") => {
                match Url::parse(s) {
                    Ok(url) => resolution.visitors.push(Visitor::Url {
                        url,
                        attempts: config.http_attempts,
                    }),
                    Err(e) => resolution
                        .errors
                        .push(format!("the URL passed to filename {:?} is not valid: {}", s, e)),
                }
            }
            path => {
                fs_paths.push(path);
                if !config.recursive {
                    resolution.single_item_implied = true;
                }
                fs_visitor_count +=
                    expand_path(Path::new(path), config.recursive, &mut resolution);
            }
        }
    }

    if !fs_paths.is_empty() && fs_visitor_count == 0 {
        resolution.errors.push(format!(
            "error reading {:?}: recognized file extensions are {:?}",
            fs_paths, FILE_EXTENSIONS
        ));
    }

    debug!(
        "resolved {} visitors, {} errors",
        resolution.visitors.len(),
        resolution.errors.len()
    );
    resolution
}

/// Expand one filesystem path into file visitors, returning how many were
/// added. Missing or unreadable paths are accumulated errors.
fn expand_path(path: &Path, recursive: bool, resolution: &mut Resolution) -> usize {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            resolution
                .errors
                .push(format!("the path {:?} does not exist", path));
            return 0;
        }
        Err(e) => {
            resolution
                .errors
                .push(format!("the path {:?} cannot be accessed: {}", path, e));
            return 0;
        }
    };

    if metadata.is_file() {
        if has_recognized_extension(path) {
            resolution.visitors.push(Visitor::File(path.to_path_buf()));
            return 1;
        }
        return 0;
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut added = 0;
    for entry in WalkDir::new(path)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
    {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && has_recognized_extension(entry.path()) {
                    resolution
                        .visitors
                        .push(Visitor::File(entry.path().to_path_buf()));
                    added += 1;
                }
            }
            Err(e) => resolution
                .errors
                .push(format!("error reading {:?}: {}", path, e)),
        }
    }
    added
}

fn has_recognized_extension(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| FILE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn config_with_files(filenames: Vec<String>) -> SourceConfig {
        SourceConfig {
            filenames,
            ..Default::default()
        }
    }

    #[test]
    fn test_url_routing_requires_scheme_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("htt.yaml");
        fs::write(&file, "kind: Tenant\nname: t\n").unwrap();

        let config = config_with_files(vec![
            "https://example.com/mesh.yaml".to_string(),
            "http://example.com/mesh.json".to_string(),
            file.display().to_string(),
        ]);
        let resolution = resolve(&config);

        assert!(resolution.errors.is_empty());
        assert!(matches!(resolution.visitors[0], Visitor::Url { .. }));
        assert!(matches!(resolution.visitors[1], Visitor::Url { .. }));
        assert!(matches!(resolution.visitors[2], Visitor::File(_)));
    }

    #[test]
    fn test_second_stdin_is_error_not_two_visitors() {
        let config = config_with_files(vec!["-".to_string(), "-".to_string()]);
        let resolution = resolve(&config);

        let stdin_count = resolution
            .visitors
            .iter()
            .filter(|v| matches!(v, Visitor::Stdin))
            .count();
        assert_eq!(stdin_count, 1);
        assert_eq!(resolution.errors, vec!["stdin already in use".to_string()]);
    }

    #[test]
    fn test_missing_paths_accumulate_one_error_each() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("ok.yaml");
        fs::write(&existing, "kind: Tenant\nname: t\n").unwrap();

        let config = config_with_files(vec![
            "/definitely/not/there.yaml".to_string(),
            existing.display().to_string(),
            "/also/not/there.yaml".to_string(),
        ]);
        let resolution = resolve(&config);

        assert_eq!(resolution.errors.len(), 2);
        assert!(resolution.errors[0].contains("/definitely/not/there.yaml"));
        assert!(resolution.errors[1].contains("/also/not/there.yaml"));
        // The existing path still produced its visitor.
        assert_eq!(
            resolution.visitors,
            vec![Visitor::File(existing)]
        );
    }

    #[test]
    fn test_malformed_url_continues_with_remaining_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("ok.yaml");
        fs::write(&existing, "kind: Tenant\nname: t\n").unwrap();

        let config = config_with_files(vec![
            "http://".to_string(),
            existing.display().to_string(),
        ]);
        let resolution = resolve(&config);

        assert_eq!(resolution.errors.len(), 1);
        assert!(resolution.errors[0].contains("not valid"));
        assert_eq!(resolution.visitors.len(), 1);
    }

    #[test]
    fn test_unrecognized_extension_reports_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        fs::write(&file, "irrelevant").unwrap();

        let config = config_with_files(vec![file.display().to_string()]);
        let err = resolve(&config).into_visitors().unwrap_err();

        assert!(err.to_string().contains("recognized file extensions"));
        // Extensions are reported in their dotted form.
        assert!(err.to_string().contains(".yaml"));
    }

    #[tokio::test]
    async fn test_fetch_budget_retries_transient_then_succeeds() {
        let url = Url::parse("http://example.com/mesh.yaml").unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let body = fetch_with_budget(&url, 3, move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(FetchFailure::Transient(MeshctlError::Api {
                        status: 503,
                        message: "busy".to_string(),
                    }))
                } else {
                    Ok("kind: Tenant\nname: t\n".to_string())
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(body.contains("Tenant"));
    }

    #[tokio::test]
    async fn test_fetch_budget_terminal_failure_stops_on_first_attempt() {
        let url = Url::parse("http://example.com/mesh.yaml").unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = fetch_with_budget(&url, 3, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(FetchFailure::Terminal(MeshctlError::Api {
                    status: 404,
                    message: "gone".to_string(),
                }))
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_fetch_budget_exhausted_reports_last_transient_failure() {
        let url = Url::parse("http://example.com/mesh.yaml").unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = fetch_with_budget(&url, 2, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(FetchFailure::Transient(MeshctlError::Api {
                    status: 503,
                    message: "still busy".to_string(),
                }))
            }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(err.to_string().contains("still busy"));
    }

    #[test]
    fn test_recursive_directory_expansion() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.yaml"), "kind: Tenant\nname: a\n").unwrap();
        fs::write(dir.path().join("skip.txt"), "nope").unwrap();
        fs::write(dir.path().join("sub/b.json"), "{}").unwrap();

        let config = SourceConfig {
            filenames: vec![dir.path().display().to_string()],
            recursive: true,
            ..Default::default()
        };
        let resolution = resolve(&config);

        assert!(resolution.errors.is_empty());
        assert_eq!(resolution.visitors.len(), 2);
    }

    #[test]
    fn test_non_recursive_skips_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.yaml"), "kind: Tenant\nname: a\n").unwrap();
        fs::write(dir.path().join("sub/b.yaml"), "kind: Tenant\nname: b\n").unwrap();

        let config = SourceConfig {
            filenames: vec![dir.path().display().to_string()],
            recursive: false,
            ..Default::default()
        };
        let resolution = resolve(&config);

        assert_eq!(resolution.visitors.len(), 1);
    }

    #[test]
    fn test_command_source_comes_first() {
        let config = SourceConfig {
            command: Some(CommandSource {
                kind: "Tenant".to_string(),
                name: "payments".to_string(),
            }),
            filenames: vec!["-".to_string()],
            ..Default::default()
        };
        let visitors = resolve(&config).into_visitors().unwrap();

        assert_eq!(
            visitors[0],
            Visitor::Command {
                kind: "Tenant".to_string(),
                name: "payments".to_string(),
            }
        );
        assert_eq!(visitors[1], Visitor::Stdin);
    }

    #[test]
    fn test_mixed_scenario_three_visitors_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.yaml");
        fs::write(&a, "kind: Tenant\nname: a\n").unwrap();

        let config = config_with_files(vec![
            a.display().to_string(),
            "-".to_string(),
            "http://x/y.json".to_string(),
        ]);
        let visitors = resolve(&config).into_visitors().unwrap();

        assert_eq!(visitors.len(), 3);
        assert!(matches!(visitors[0], Visitor::File(_)));
        assert!(matches!(visitors[1], Visitor::Stdin));
        assert!(matches!(visitors[2], Visitor::Url { .. }));
    }

    #[tokio::test]
    async fn test_file_visitor_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("tenant.yaml");
        fs::write(
            &file,
            "kind: Tenant\nname: payments\nnamespace: mesh-system\ndescription: demo\n",
        )
        .unwrap();

        let visitor = Visitor::File(file);
        let docs = visitor.documents().await.unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].kind, "Tenant");
        assert_eq!(docs[0].name, "payments");
        assert_eq!(docs[0].namespace.as_deref(), Some("mesh-system"));
        assert_eq!(
            docs[0].body.get("description").and_then(|v| v.as_str()),
            Some("demo")
        );
    }

    #[tokio::test]
    async fn test_command_visitor_synthesizes_document() {
        let visitor = Visitor::Command {
            kind: "Service".to_string(),
            name: String::new(),
        };
        let docs = visitor.documents().await.unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].kind, "Service");
        assert!(docs[0].name.is_empty());
        assert!(docs[0].body.is_null());
    }

    #[test]
    fn test_single_item_implied_for_literal_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("one.yaml");
        fs::write(&file, "kind: Tenant\nname: one\n").unwrap();

        let resolution = resolve(&config_with_files(vec![file.display().to_string()]));
        assert!(resolution.single_item_implied);

        let recursive = SourceConfig {
            filenames: vec![dir.path().display().to_string()],
            recursive: true,
            ..Default::default()
        };
        assert!(!resolve(&recursive).single_item_implied);
    }
}
