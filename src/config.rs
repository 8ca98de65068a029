use crate::app::runner::SharedSandbox;
use crate::error::SandboxError;
use crate::judge::judge_python::{DEFAULT_TIMEOUT_MS, LocalPython};
use crate::judge::judge_remote::{DEFAULT_ENDPOINT, RemoteSandbox};
use crate::progress::backend::FileBackend;
use crate::progress::{DEFAULT_DEBOUNCE, DEFAULT_MAX_WAIT, ProgressStore};
use log::warn;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxKind {
    /// Python del sistema; solo para desarrollo.
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub sandbox: SandboxKind,
    pub sandbox_endpoint: String,
    /// Dirección del servidor de sandbox de desarrollo.
    pub sandbox_bind: String,
    pub python_timeout_ms: u64,
    pub progress_path: PathBuf,
    pub progress_debounce: Duration,
    pub progress_max_wait: Duration,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxKind::Local,
            sandbox_endpoint: DEFAULT_ENDPOINT.to_string(),
            sandbox_bind: "127.0.0.1:8788".into(),
            python_timeout_ms: DEFAULT_TIMEOUT_MS,
            progress_path: PathBuf::from("lesson_progress.json"),
            progress_debounce: DEFAULT_DEBOUNCE,
            progress_max_wait: DEFAULT_MAX_WAIT,
            log_level: "info".into(),
            log_file: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let sandbox = match var("LESSON_SANDBOX").map(|v| v.to_lowercase()).as_deref() {
            None | Some("local") => SandboxKind::Local,
            Some("remote") => SandboxKind::Remote,
            Some(other) => {
                warn!("LESSON_SANDBOX={other:?} desconocido; se usa local");
                SandboxKind::Local
            }
        };

        let millis = |name: &str, default: Duration| {
            Duration::from_millis(number(name, var(name), default.as_millis() as u64))
        };

        Self {
            sandbox,
            sandbox_endpoint: var("LESSON_SANDBOX_ENDPOINT").unwrap_or(defaults.sandbox_endpoint),
            sandbox_bind: var("LESSON_SANDBOX_BIND").unwrap_or(defaults.sandbox_bind),
            python_timeout_ms: number(
                "LESSON_PYTHON_TIMEOUT_MS",
                var("LESSON_PYTHON_TIMEOUT_MS"),
                defaults.python_timeout_ms,
            ),
            progress_path: var("LESSON_PROGRESS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.progress_path),
            progress_debounce: millis("LESSON_PROGRESS_DEBOUNCE_MS", defaults.progress_debounce),
            progress_max_wait: millis("LESSON_PROGRESS_MAX_WAIT_MS", defaults.progress_max_wait),
            log_level: var("LESSON_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_file: var("LESSON_LOG_FILE").map(PathBuf::from),
        }
    }

    pub fn build_sandbox(&self) -> Result<SharedSandbox, SandboxError> {
        let sandbox: SharedSandbox = match self.sandbox {
            SandboxKind::Local => {
                Arc::new(LocalPython::detect()?.with_timeout_ms(self.python_timeout_ms))
            }
            SandboxKind::Remote => Arc::new(RemoteSandbox::new(self.sandbox_endpoint.clone())),
        };
        Ok(sandbox)
    }

    pub fn progress_store(&self) -> ProgressStore<FileBackend> {
        ProgressStore::new(FileBackend::new(self.progress_path.clone()))
            .with_timing(self.progress_debounce, self.progress_max_wait)
    }
}

fn number<T: FromStr + Copy + std::fmt::Display>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{name}={raw:?} no es un número válido; se usa {default}");
            default
        }),
    }
}
