use crate::error::SandboxError;
use crate::judge::sandbox::{Sandbox, SandboxOutput};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const RUN_PATH: &str = "/api/sandbox/run";
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8788/api/sandbox/run";

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize, Deserialize)]
pub struct RunRequest {
    pub program: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct RunResponse {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

impl From<RunResponse> for SandboxOutput {
    fn from(resp: RunResponse) -> Self {
        SandboxOutput {
            stdout: resp.stdout,
            stderr: resp.stderr,
        }
    }
}

impl From<SandboxOutput> for RunResponse {
    fn from(output: SandboxOutput) -> Self {
        RunResponse {
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteSandbox {
    endpoint: String,
    timeout: Duration,
}

impl RemoteSandbox {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn timeout_error(&self) -> SandboxError {
        SandboxError::Timeout {
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }
}

/// URL a la que se envían los programas. Un origen sin ruta apunta a [`RUN_PATH`].
fn resolve_endpoint(raw: &str) -> Result<String, SandboxError> {
    let endpoint = raw.trim().trim_end_matches('/');
    let host_and_path = endpoint
        .strip_prefix("http://")
        .or_else(|| endpoint.strip_prefix("https://"))
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| SandboxError::Unavailable(format!("endpoint de sandbox inválido: {raw:?}")))?;

    if host_and_path.contains('/') {
        Ok(endpoint.to_string())
    } else {
        Ok(format!("{endpoint}{RUN_PATH}"))
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Sandbox for RemoteSandbox {
    fn run(&self, program: &str) -> Result<SandboxOutput, SandboxError> {
        let url = resolve_endpoint(&self.endpoint)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|err| SandboxError::Unavailable(format!("cliente HTTP: {err}")))?;

        let payload = RunRequest {
            program: program.to_string(),
        };
        let response = client.post(&url).json(&payload).send().map_err(|err| {
            if err.is_timeout() {
                self.timeout_error()
            } else {
                SandboxError::Unavailable(format!("Error conectando con el sandbox: {err}"))
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::GATEWAY_TIMEOUT {
            return Err(self.timeout_error());
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SandboxError::Transport(format!(
                "El sandbox devolvió HTTP {status} en {url}: {}",
                body.trim()
            )));
        }

        response
            .json::<RunResponse>()
            .map(SandboxOutput::from)
            .map_err(|err| SandboxError::Transport(format!("Respuesta JSON inválida del sandbox: {err}")))
    }
}

#[cfg(target_arch = "wasm32")]
impl Sandbox for RemoteSandbox {
    fn run(&self, _program: &str) -> Result<SandboxOutput, SandboxError> {
        Err(SandboxError::Unavailable(
            "El cliente HTTP bloqueante no está disponible en WASM.".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_origins_point_at_the_run_path() {
        assert_eq!(
            resolve_endpoint("http://127.0.0.1:8788/").expect("url"),
            "http://127.0.0.1:8788/api/sandbox/run"
        );
        assert_eq!(
            resolve_endpoint(" https://runner.example.org/v2/exec ").expect("url"),
            "https://runner.example.org/v2/exec"
        );
    }

    #[test]
    fn endpoints_need_an_http_scheme() {
        for bad in ["/api/sandbox/run", "", "ftp://host/run", "http://"] {
            assert!(
                matches!(resolve_endpoint(bad), Err(SandboxError::Unavailable(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn response_without_stderr_still_parses() {
        let resp: RunResponse = serde_json::from_str(r#"{"stdout": "ok\n"}"#).expect("json");
        let output = SandboxOutput::from(resp);
        assert_eq!(output.stdout, "ok\n");
        assert!(output.stderr.is_empty());
    }
}
