use crate::error::SandboxError;

/// Lo que devuelve el intérprete externo para un programa.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxOutput {
    pub stdout: String,
    pub stderr: String,
}

impl SandboxOutput {
    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// Servicio que ejecuta un programa no confiable y devuelve su salida.
///
/// El motor no aísla nada por sí mismo: confía en la implementación.
pub trait Sandbox {
    fn run(&self, program: &str) -> Result<SandboxOutput, SandboxError>;
}

impl<S: Sandbox + ?Sized> Sandbox for std::sync::Arc<S> {
    fn run(&self, program: &str) -> Result<SandboxOutput, SandboxError> {
        (**self).run(program)
    }
}

impl<S: Sandbox + ?Sized> Sandbox for Box<S> {
    fn run(&self, program: &str) -> Result<SandboxOutput, SandboxError> {
        (**self).run(program)
    }
}

/// Sandbox respaldado por una clausura; útil para pruebas y para integrar
/// runtimes que ya exponen una función `programa -> salida`.
pub struct FnSandbox<F>(pub F);

impl<F> Sandbox for FnSandbox<F>
where
    F: Fn(&str) -> Result<SandboxOutput, SandboxError>,
{
    fn run(&self, program: &str) -> Result<SandboxOutput, SandboxError> {
        (self.0)(program)
    }
}
