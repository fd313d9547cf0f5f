//! Remote sandbox provider — HTTP client for the sandbox service REST API.
//!
//! The service hosts ephemeral containers addressed by sandbox id. Command
//! execution streams an NDJSON event feed; file transfer uses the `/files`
//! endpoints. The service reclaims idle containers, so the resolver pairs
//! this backend with a keep-alive lease in the shared key-value store.
//!
//! Remote processes cannot be forcibly terminated through the API:
//! `can_terminate_commands` is false and `stop` degrades to awaiting natural
//! completion.

use super::{BackendKind, Capabilities, FileEntry, SandboxBackend};
use crate::config::SandboxConfig;
use crate::error::SandboxError;
use crate::exec::{CommandResult, ExecRequest, OutputChunk};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};

/// Default base URL for the sandbox service.
pub const DEFAULT_API_BASE: &str = "https://api.buildbox.dev";

/// Slack added on top of the per-command timeout when bounding the HTTP
/// request that carries the command's event stream.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(30);

/// Connection settings for the sandbox service.
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub api_key: String,
    pub api_base: String,
}

impl RemoteSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

/// Container-backed sandbox client.
pub struct RemoteBackend {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    sandbox_id: String,
    workspace: String,
}

impl RemoteBackend {
    /// Create a container (or re-attach to one by id) and return a client
    /// bound to it.
    pub async fn create(
        settings: &RemoteSettings,
        config: &SandboxConfig,
    ) -> Result<Self, SandboxError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| SandboxError::Http(format!("failed to build HTTP client: {e}")))?;

        let url = format!("{}/v1/sandboxes", settings.api_base);
        let body = serde_json::json!({
            "sandbox_id": config.sandbox_id,
            "runtime": config.runtime,
            "vcpus": config.vcpus,
            "ports": config.ports,
            "timeout": config.timeout.as_secs(),
            "auto_stop_delay": config.auto_stop_delay.as_secs(),
        });

        let resp = http
            .post(&url)
            .bearer_auth(&settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SandboxError::Http(format!("create sandbox request failed: {e}")))?;

        let status = resp.status();
        let body_text = resp
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable>".to_string());

        if !status.is_success() {
            return Err(SandboxError::Http(format!(
                "sandbox API returned {status}: {body_text}"
            )));
        }

        let parsed: serde_json::Value = serde_json::from_str(&body_text).map_err(|e| {
            SandboxError::Http(format!("failed to parse create response: {e}\nBody: {body_text}"))
        })?;

        let sandbox_id = parsed["sandbox_id"]
            .as_str()
            .or_else(|| parsed["sandboxID"].as_str())
            .unwrap_or("")
            .to_string();

        if sandbox_id.is_empty() {
            return Err(SandboxError::Http(format!(
                "sandbox API returned no sandbox_id. Response: {body_text}"
            )));
        }

        let workspace = config
            .workspace_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| crate::config::DEFAULT_REMOTE_WORKSPACE.to_string());

        Ok(Self {
            http,
            api_key: settings.api_key.clone(),
            api_base: settings.api_base.clone(),
            sandbox_id,
            workspace,
        })
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}/v1/sandboxes/{}{suffix}", self.api_base, self.sandbox_id)
    }

    /// Run a command without streaming, for internal plumbing like `exists`.
    async fn shell(&self, command: &str) -> CommandResult {
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel();
        let (_kill_tx, kill_rx) = oneshot::channel();
        let request = ExecRequest::new(command).with_timeout(Duration::from_secs(30));
        let mut result = self.execute(request, chunk_tx, kill_rx).await;

        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Ok(chunk) = chunk_rx.try_recv() {
            match chunk {
                OutputChunk::Stdout(text) => {
                    if !stdout.is_empty() {
                        stdout.push('\n');
                    }
                    stdout.push_str(&text);
                }
                OutputChunk::Stderr(text) => {
                    if !stderr.is_empty() {
                        stderr.push('\n');
                    }
                    stderr.push_str(&text);
                }
                OutputChunk::Started { .. } => {}
            }
        }
        result.stdout = stdout;
        result.stderr = stderr;
        result
    }
}

/// One NDJSON line of a command event stream.
#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Start { pid: Option<u32> },
    Stdout { text: String },
    Stderr { text: String },
    Exit { exit_code: i64 },
}

#[async_trait]
impl SandboxBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            can_terminate_commands: false,
            has_public_hosts: true,
        }
    }

    fn sandbox_id(&self) -> String {
        self.sandbox_id.clone()
    }

    fn workspace(&self) -> String {
        self.workspace.clone()
    }

    async fn execute(
        &self,
        request: ExecRequest,
        chunks: mpsc::UnboundedSender<OutputChunk>,
        _kill: oneshot::Receiver<()>,
    ) -> CommandResult {
        let started = Instant::now();
        let timeout = request.timeout.unwrap_or(Duration::from_secs(300));
        let body = serde_json::json!({
            "cmd": request.command,
            "workdir": request.cwd.clone().unwrap_or_else(|| self.workspace()),
            "env": request.env,
            "timeout": timeout.as_secs(),
        });

        let resp = match self
            .http
            .post(self.url("/commands"))
            .bearer_auth(&self.api_key)
            .timeout(timeout + REQUEST_TIMEOUT_MARGIN)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return CommandResult::failure(format!("command request failed: {e}")),
        };

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            return CommandResult::failure(format!("sandbox API returned {status}: {body_text}"));
        }

        let mut stream = resp.bytes_stream();
        let mut buffer = Vec::new();
        let mut exit_code: Option<i64> = None;
        let mut error = None;

        'read: loop {
            let bytes = match stream.next().await {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    error = Some(format!("event stream failed: {e}"));
                    break 'read;
                }
                None => break 'read,
            };
            buffer.extend_from_slice(&bytes);

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<WireEvent>(line) {
                    Ok(WireEvent::Start { pid }) => {
                        let _ = chunks.send(OutputChunk::Started { pid });
                    }
                    Ok(WireEvent::Stdout { text }) => {
                        let _ = chunks.send(OutputChunk::Stdout(text));
                    }
                    Ok(WireEvent::Stderr { text }) => {
                        let _ = chunks.send(OutputChunk::Stderr(text));
                    }
                    Ok(WireEvent::Exit { exit_code: code }) => {
                        exit_code = Some(code);
                    }
                    Err(e) => {
                        tracing::debug!(line, error = %e, "skipping malformed event line");
                    }
                }
            }
        }

        let exit_code = match exit_code {
            Some(code) => code,
            None => {
                if error.is_none() {
                    error = Some("event stream ended without an exit event".to_string());
                }
                -1
            }
        };

        CommandResult {
            exit_code,
            error,
            duration_ms: Some(started.elapsed().as_millis() as u64),
            ..CommandResult::default()
        }
    }

    async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        let url = format!(
            "{}?path={encoded}",
            self.url("/files"),
            encoded = urlencoding::encode(path)
        );

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| SandboxError::Http(format!("read_file request failed: {e}")))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SandboxError::FileNotFound {
                path: path.to_string(),
            });
        }

        let body_text = resp
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable>".to_string());

        if !status.is_success() {
            return Err(SandboxError::Http(format!(
                "sandbox API returned {status}: {body_text}"
            )));
        }

        Ok(body_text)
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();

        let form = reqwest::multipart::Form::new()
            .text("path", path.to_string())
            .part(
                "file",
                reqwest::multipart::Part::bytes(content.as_bytes().to_vec())
                    .file_name(file_name)
                    .mime_str("text/plain")
                    .map_err(|e| SandboxError::Http(format!("mime type error: {e}")))?,
            );

        let resp = self
            .http
            .post(self.url("/files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SandboxError::Http(format!("write_file request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            return Err(SandboxError::Http(format!(
                "sandbox API returned {status}: {body_text}"
            )));
        }

        Ok(())
    }

    async fn list_files(&self, path: &str) -> Result<Vec<FileEntry>, SandboxError> {
        let url = format!(
            "{}?path={encoded}",
            self.url("/files"),
            encoded = urlencoding::encode(path)
        );

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| SandboxError::Http(format!("list_files request failed: {e}")))?;

        let status = resp.status();
        let body_text = resp
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable>".to_string());

        if !status.is_success() {
            return Err(SandboxError::Http(format!(
                "sandbox API returned {status}: {body_text}"
            )));
        }

        let parsed: serde_json::Value =
            serde_json::from_str(&body_text).unwrap_or(serde_json::json!([]));

        let mut entries = Vec::new();
        if let Some(items) = parsed.as_array() {
            for item in items {
                let name = item["name"].as_str().unwrap_or("<unnamed>").to_string();
                let entry_type = item["type"].as_str().unwrap_or("file");
                entries.push(FileEntry {
                    name,
                    is_dir: entry_type == "dir" || entry_type == "directory",
                });
            }
        }
        Ok(entries)
    }

    async fn exists(&self, path: &str) -> Result<bool, SandboxError> {
        let out = self
            .shell(&format!("test -e {}", shell_quote(path)))
            .await;
        match out.error {
            None => Ok(out.exit_code == 0),
            Some(e) => Err(SandboxError::Http(e)),
        }
    }

    async fn remove(&self, path: &str) -> Result<(), SandboxError> {
        let out = self
            .shell(&format!("rm -rf -- {}", shell_quote(path)))
            .await;
        if out.success() {
            Ok(())
        } else {
            Err(SandboxError::Backend(format!(
                "remove {path} failed: {}",
                out.error.unwrap_or(out.stderr)
            )))
        }
    }

    async fn mkdirp(&self, path: &str) -> Result<(), SandboxError> {
        let out = self
            .shell(&format!("mkdir -p -- {}", shell_quote(path)))
            .await;
        if out.success() {
            Ok(())
        } else {
            Err(SandboxError::Backend(format!(
                "mkdir {path} failed: {}",
                out.error.unwrap_or(out.stderr)
            )))
        }
    }

    async fn host(&self, port: u16) -> Option<String> {
        let resp = self
            .http
            .get(self.url(&format!("/hosts/{port}")))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .ok()?;

        if !resp.status().is_success() {
            return None;
        }
        let body_text = resp.text().await.ok()?;

        let host = if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&body_text) {
            parsed["url"]
                .as_str()
                .or_else(|| parsed["host"].as_str())
                .map(str::to_string)
                .unwrap_or_else(|| body_text.trim().trim_matches('"').to_string())
        } else {
            body_text.trim().trim_matches('"').to_string()
        };

        if host.is_empty() {
            None
        } else if host.starts_with("http") {
            Some(host)
        } else {
            Some(format!("https://{host}"))
        }
    }

    async fn terminate(&self) -> Result<(), SandboxError> {
        let resp = self
            .http
            .delete(self.url(""))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| SandboxError::Http(format!("terminate request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            let body_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable>".to_string());
            Err(SandboxError::Http(format!(
                "sandbox API returned {status}: {body_text}"
            )))
        }
    }
}

/// Single-quote a string for `sh -c`.
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn wire_events_parse_from_ndjson_lines() {
        let event: WireEvent = serde_json::from_str(r#"{"type":"stdout","text":"hi"}"#).unwrap();
        assert!(matches!(event, WireEvent::Stdout { text } if text == "hi"));

        let event: WireEvent = serde_json::from_str(r#"{"type":"exit","exit_code":3}"#).unwrap();
        assert!(matches!(event, WireEvent::Exit { exit_code: 3 }));

        let event: WireEvent = serde_json::from_str(r#"{"type":"start","pid":77}"#).unwrap();
        assert!(matches!(event, WireEvent::Start { pid: Some(77) }));
    }

    #[test]
    fn settings_builder_overrides_base() {
        let settings = RemoteSettings::new("key").with_api_base("http://localhost:9");
        assert_eq!(settings.api_base, "http://localhost:9");
        assert_eq!(RemoteSettings::new("key").api_base, DEFAULT_API_BASE);
    }
}
