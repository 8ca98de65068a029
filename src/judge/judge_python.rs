#[cfg(target_arch = "wasm32")]
use crate::error::SandboxError;
#[cfg(target_arch = "wasm32")]
use crate::judge::sandbox::{Sandbox, SandboxOutput};

pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

#[cfg(not(target_arch = "wasm32"))]
mod native_python {
    use super::DEFAULT_TIMEOUT_MS;
    use crate::error::SandboxError;
    use crate::judge::sandbox::{Sandbox, SandboxOutput};
    use log::debug;
    use std::io::{Read, Write};
    use std::path::{Path, PathBuf};
    use std::process::{Child, Command, Stdio};
    use std::thread::{self, JoinHandle};
    use std::time::{Duration, Instant};

    const POLL_MS: u64 = 10;

    /// Intérprete de referencia local: ejecuta el probe con el Python del sistema.
    ///
    /// No es un sandbox; sirve para desarrollo, pruebas y el servidor de ejemplo.
    #[derive(Debug, Clone)]
    pub struct LocalPython {
        python: PathBuf,
        timeout_ms: u64,
    }

    impl LocalPython {
        /// Busca `python3` o `python` en el PATH.
        pub fn detect() -> Result<Self, SandboxError> {
            Ok(Self::with_interpreter(detect_python()?))
        }

        pub fn with_interpreter(python: impl Into<PathBuf>) -> Self {
            Self {
                python: python.into(),
                timeout_ms: DEFAULT_TIMEOUT_MS,
            }
        }

        pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
            self.timeout_ms = timeout_ms;
            self
        }

        pub fn interpreter(&self) -> &Path {
            &self.python
        }
    }

    impl Sandbox for LocalPython {
        fn run(&self, program: &str) -> Result<SandboxOutput, SandboxError> {
            let mut child = Command::new(&self.python)
                .arg("-")
                .env("PYTHONIOENCODING", "utf-8")
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|err| {
                    SandboxError::Unavailable(format!("no se pudo ejecutar Python: {err}"))
                })?;

            // Lectores en paralelo para que una salida grande no bloquee al hijo.
            let stdout = spawn_reader(child.stdout.take());
            let stderr = spawn_reader(child.stderr.take());

            if let Some(mut stdin) = child.stdin.take() {
                if let Err(err) = stdin.write_all(program.as_bytes()) {
                    kill(&mut child);
                    return Err(SandboxError::Transport(format!(
                        "no se pudo enviar el programa a Python: {err}"
                    )));
                }
            }

            wait_with_timeout(&mut child, self.timeout_ms)?;

            let output = SandboxOutput {
                stdout: join_reader(stdout),
                stderr: join_reader(stderr),
            };
            debug!(
                "python terminó: {} bytes stdout, {} bytes stderr",
                output.stdout.len(),
                output.stderr.len()
            );
            Ok(output)
        }
    }

    fn detect_python() -> Result<PathBuf, SandboxError> {
        for candidate in ["python3", "python"] {
            if let Ok(status) = Command::new(candidate)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
            {
                if status.success() {
                    return Ok(PathBuf::from(candidate));
                }
            }
        }

        Err(SandboxError::Unavailable(
            "No se encontró 'python3' ni 'python' en PATH.".into(),
        ))
    }

    fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
        pipe.map(|mut pipe| {
            thread::spawn(move || {
                let mut bytes = Vec::new();
                let _ = pipe.read_to_end(&mut bytes);
                String::from_utf8_lossy(&bytes).into_owned()
            })
        })
    }

    fn join_reader(handle: Option<JoinHandle<String>>) -> String {
        handle
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }

    fn wait_with_timeout(child: &mut Child, timeout_ms: u64) -> Result<(), SandboxError> {
        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(_)) => return Ok(()),
                Ok(None) => {
                    if start.elapsed() > Duration::from_millis(timeout_ms) {
                        kill(child);
                        return Err(SandboxError::Timeout { timeout_ms });
                    }
                    thread::sleep(Duration::from_millis(POLL_MS));
                }
                Err(err) => {
                    kill(child);
                    return Err(SandboxError::Transport(format!(
                        "Error esperando al script Python: {err}"
                    )));
                }
            }
        }
    }

    fn kill(child: &mut Child) {
        let _ = child.kill();
        let _ = child.wait();
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn captures_stdout_of_a_program() {
            let Ok(python) = LocalPython::detect() else {
                return;
            };
            let output = python.run("print('hola')\n").expect("run");
            assert_eq!(output.stdout.trim_end(), "hola");
        }

        #[test]
        fn handles_output_larger_than_a_pipe_buffer() {
            let Ok(python) = LocalPython::detect() else {
                return;
            };
            let output = python
                .run("import sys\nsys.stdout.write('x' * 200000)\n")
                .expect("run");
            assert_eq!(output.stdout.len(), 200_000);
        }

        #[test]
        fn kills_programs_that_run_too_long() {
            let Ok(python) = LocalPython::detect() else {
                return;
            };
            let python = python.with_timeout_ms(200);
            let result = python.run("while True:\n    pass\n");
            assert_eq!(result, Err(SandboxError::Timeout { timeout_ms: 200 }));
        }

        #[test]
        fn missing_interpreter_is_unavailable() {
            let python = LocalPython::with_interpreter("/nonexistent/python-for-tests");
            assert!(matches!(
                python.run("print(1)"),
                Err(SandboxError::Unavailable(_))
            ));
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native_python::LocalPython;

/// En WASM no hay procesos: el intérprete local nunca está disponible.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Clone)]
pub struct LocalPython;

#[cfg(target_arch = "wasm32")]
impl LocalPython {
    pub fn detect() -> Result<Self, SandboxError> {
        Err(SandboxError::Unavailable(
            "El intérprete Python local no está disponible en WASM.".into(),
        ))
    }

    pub fn with_timeout_ms(self, _timeout_ms: u64) -> Self {
        self
    }

    pub fn interpreter(&self) -> &std::path::Path {
        std::path::Path::new("")
    }
}

#[cfg(target_arch = "wasm32")]
impl Sandbox for LocalPython {
    fn run(&self, _program: &str) -> Result<SandboxOutput, SandboxError> {
        Err(SandboxError::Unavailable(
            "El intérprete Python local no está disponible en WASM.".into(),
        ))
    }
}
