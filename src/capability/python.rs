use log::{debug, error, info, warn};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};

use super::{CapabilityCall, CapabilityError, ImageCapability, StructuredResult};
use crate::common::{
    CAPABILITY_DEADLINE_SECS, MAX_CAPABILITY_DIAGNOSTIC_BYTES, MAX_CAPABILITY_OUTPUT_BYTES,
};

pub const CAPABILITY_SCRIPTS: &'static [&'static str] =
    &["encryption.py", "steganography.py", "metrics.py"];

// ────────────────────────────────────────────────────────────────
// Runtime Check
// ────────────────────────────────────────────────────────────────

/// Check that the scripting runtime and the capability scripts are reachable.
pub fn check_python_runtime(python_bin: &str, scripts_dir: &Path) {
    match std::process::Command::new(python_bin).arg("--version").output() {
        Ok(output) if output.status.success() => {
            let version_info = String::from_utf8_lossy(&output.stdout);
            let version_number = version_info
                .split_whitespace()
                .nth(1)
                .unwrap_or("Unknown");
            info!("{} version: {}", python_bin, version_number);
        }
        Ok(_) => {
            error!(
                "`{}` command was found, but it returned an error. Please ensure it's correctly installed.",
                python_bin
            );
        }
        Err(_) => {
            error!(
                "`{}` is not installed or not available in PATH. Please install it before running the application.",
                python_bin
            );
        }
    }

    for script in CAPABILITY_SCRIPTS {
        let script_path = scripts_dir.join(script);
        if !script_path.is_file() {
            warn!(
                "Capability script {:?} not found; requests that need it will fail",
                script_path
            );
        }
    }
}

// ────────────────────────────────────────────────────────────────
// Subprocess Adapter
// ────────────────────────────────────────────────────────────────

/// Production capability backend: one scripting-runtime process per call,
/// JSON result on stdout, diagnostics on stderr.
pub struct PythonCapability {
    python_bin: String,
    scripts_dir: PathBuf,
}

impl PythonCapability {
    pub fn new(python_bin: impl Into<String>, scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            python_bin: python_bin.into(),
            scripts_dir: scripts_dir.into(),
        }
    }
}

fn script_and_args(call: &CapabilityCall) -> (&'static str, Vec<OsString>) {
    match call {
        CapabilityCall::Encrypt { image, key, map } => (
            "encryption.py",
            vec![
                OsString::from("encrypt"),
                image.clone().into_os_string(),
                OsString::from(key),
                OsString::from(map.as_str()),
            ],
        ),
        CapabilityCall::Decrypt { input, key } => (
            "encryption.py",
            vec![
                OsString::from("decrypt"),
                input.clone().into_os_string(),
                OsString::from(key),
            ],
        ),
        CapabilityCall::StegoEncrypt {
            secret,
            cover,
            key,
            map,
        } => (
            "steganography.py",
            vec![
                OsString::from("encrypt"),
                secret.clone().into_os_string(),
                cover.clone().into_os_string(),
                OsString::from(key),
                OsString::from(map.as_str()),
            ],
        ),
        CapabilityCall::StegoDecrypt { input, key } => (
            "steganography.py",
            vec![
                OsString::from("decrypt"),
                input.clone().into_os_string(),
                OsString::from(key),
            ],
        ),
        CapabilityCall::Metrics {
            category,
            original,
            produced,
        } => (
            "metrics.py",
            vec![
                OsString::from(category.as_str()),
                original.clone().into_os_string(),
                produced.clone().into_os_string(),
            ],
        ),
    }
}

#[rocket::async_trait]
impl ImageCapability for PythonCapability {
    async fn invoke(&self, call: CapabilityCall) -> Result<StructuredResult, CapabilityError> {
        let name = call.name();
        let (script, args) = script_and_args(&call);
        let script_path = self.scripts_dir.join(script);

        debug!("Invoking capability '{}' via {:?}", name, script_path);

        let mut child = Command::new(&self.python_bin)
            .arg(&script_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| CapabilityError::Execution {
                call: name,
                detail: format!("failed to spawn '{}': {}", self.python_bin, err),
                diagnostics: String::new(),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| internal(name, "stdout pipe unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| internal(name, "stderr pipe unavailable".to_string()))?;

        // Both pipes are drained concurrently so a chatty child can never
        // block on a full pipe buffer while we wait for it to exit.
        let mut stdout_task = tokio::spawn(drain_pipe(stdout, MAX_CAPABILITY_OUTPUT_BYTES, false));
        let stderr_task = tokio::spawn(drain_pipe(stderr, MAX_CAPABILITY_DIAGNOSTIC_BYTES, true));

        let limit = Duration::from_secs(CAPABILITY_DEADLINE_SECS);
        let deadline = Instant::now() + limit;

        let (payload, overflowed) = match timeout_at(deadline, &mut stdout_task).await {
            Ok(joined) => joined
                .map_err(|err| internal(name, format!("output reader failed: {err}")))?
                .map_err(|err| internal(name, format!("failed to read the output channel: {err}")))?,
            Err(_) => {
                kill_child(&mut child, name).await;
                return Err(CapabilityError::Timeout { call: name, limit });
            }
        };

        if overflowed {
            kill_child(&mut child, name).await;
            return Err(CapabilityError::Overflow {
                call: name,
                limit: MAX_CAPABILITY_OUTPUT_BYTES,
            });
        }

        let status = match timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                return Err(internal(name, format!("failed to reap the process: {err}")));
            }
            Err(_) => {
                kill_child(&mut child, name).await;
                return Err(CapabilityError::Timeout { call: name, limit });
            }
        };

        let diagnostics = collect_diagnostics(stderr_task).await;

        if !status.success() {
            return Err(CapabilityError::Execution {
                call: name,
                detail: format!("exited with {}", status),
                diagnostics,
            });
        }

        parse_document(name, &payload, diagnostics)
    }
}

fn internal(call: &'static str, detail: String) -> CapabilityError {
    CapabilityError::Execution {
        call,
        detail,
        diagnostics: String::new(),
    }
}

async fn kill_child(child: &mut Child, name: &'static str) {
    if let Err(err) = child.kill().await {
        warn!("Failed to kill capability '{}' process: {}", name, err);
    }
}

/// Read a pipe up to `cap` bytes. With `drain_after_cap` the remainder is
/// discarded until EOF (the writer must not stall on a full pipe); without
/// it the reader returns immediately so the caller can kill the writer.
async fn drain_pipe<R: AsyncRead + Unpin>(
    mut reader: R,
    cap: usize,
    drain_after_cap: bool,
) -> std::io::Result<(Vec<u8>, bool)> {
    let mut data = Vec::new();
    let mut chunk = [0u8; 16 * 1024];
    let mut truncated = false;
    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            return Ok((data, truncated));
        }
        if !truncated {
            let available = cap.saturating_sub(data.len());
            if read > available {
                data.extend_from_slice(&chunk[..available]);
                truncated = true;
                if !drain_after_cap {
                    return Ok((data, true));
                }
            } else {
                data.extend_from_slice(&chunk[..read]);
            }
        }
    }
}

async fn collect_diagnostics(task: JoinHandle<std::io::Result<(Vec<u8>, bool)>>) -> String {
    match timeout(Duration::from_secs(2), task).await {
        Ok(Ok(Ok((data, truncated)))) => {
            let mut text = String::from_utf8_lossy(&data).into_owned();
            if truncated {
                text.push_str("\n[diagnostics truncated]");
            }
            text
        }
        _ => String::new(),
    }
}

fn parse_document(
    call: &'static str,
    payload: &[u8],
    diagnostics: String,
) -> Result<StructuredResult, CapabilityError> {
    if payload.iter().all(|byte| byte.is_ascii_whitespace()) {
        return Err(CapabilityError::Protocol {
            call,
            detail: "the output channel was empty".to_string(),
            diagnostics,
        });
    }

    let document: serde_json::Value = match serde_json::from_slice(payload) {
        Ok(document) => document,
        Err(err) => {
            return Err(CapabilityError::Protocol {
                call,
                detail: format!("the output channel is not one structured document: {err}"),
                diagnostics,
            });
        }
    };

    let success = match document.get("success").and_then(serde_json::Value::as_bool) {
        Some(success) => success,
        None => {
            return Err(CapabilityError::Protocol {
                call,
                detail: "the document lacks a boolean 'success' field".to_string(),
                diagnostics,
            });
        }
    };

    Ok(StructuredResult { success, document })
}
