use crate::coverage::CoverageProbe;
use crate::error::GenerationError;
use crate::judge::grading::{GradeOutcome, format_grade_message, run_probe};
use crate::judge::harness::{HarnessMode, generate};
use crate::judge::sandbox::Sandbox;
use crate::model::{CodeSection, TestCase, TestResult};
use crate::progress::backend::ProgressBackend;
use crate::progress::{ProgressStore, SectionTracker, WriteOutcome};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

pub type SharedSandbox = Arc<dyn Sandbox + Send + Sync>;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CodeExerciseState {
    pub source: String,
    pub last_results: Vec<TestResult>,
    pub passed: bool,
}

impl CodeExerciseState {
    /// Estado tras una ejecución. Los errores de configuración o internos no
    /// dicen nada del código del alumno y no se guardan.
    pub fn from_outcome(source: &str, outcome: &GradeOutcome) -> Option<Self> {
        match outcome {
            GradeOutcome::Graded { results } => Some(Self {
                source: source.to_string(),
                last_results: results.clone(),
                passed: outcome.all_passed(),
            }),
            GradeOutcome::HarnessFailure { .. } => Some(Self {
                source: source.to_string(),
                last_results: Vec::new(),
                passed: false,
            }),
            GradeOutcome::ConfigurationError { .. } | GradeOutcome::InternalError { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSubmission {
    pub section_id: String,
    pub source: String,
}

/// Ejecución de una tabla de cobertura con los argumentos que tenía cada
/// fila al lanzarla.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageRun {
    pub section_id: String,
    pub probe: CoverageProbe,
}

type Delivery<T> = (u64, T, GradeOutcome);

#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRun<T> {
    pub generation: u64,
    pub submission: T,
    pub outcome: GradeOutcome,
}

/// Evalúa en un hilo aparte. Cada lanzamiento recibe un número de
/// generación; un resultado tardío de una generación anterior se descarta.
pub struct GradingRunner<T> {
    sandbox: SharedSandbox,
    generation: u64,
    running: Option<u64>,
    tx: Sender<Delivery<T>>,
    rx: Receiver<Delivery<T>>,
    pub message: String,
}

pub type CodeExerciseController = GradingRunner<CodeSubmission>;
pub type CoverageController = GradingRunner<CoverageRun>;

impl<T: Send + 'static> GradingRunner<T> {
    pub fn new(sandbox: SharedSandbox) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            sandbox,
            generation: 0,
            running: None,
            tx,
            rx,
            message: String::new(),
        }
    }

    /// Mientras sea `true` la UI debe desactivar el botón de ejecutar.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// El probe se genera aquí mismo, así que un objetivo inválido falla
    /// antes de tocar el sandbox.
    pub fn launch(
        &mut self,
        source: &str,
        target: &str,
        cases: &[TestCase],
        submission: T,
    ) -> Result<u64, GenerationError> {
        let probe = match generate(source, target, cases) {
            Ok(probe) => probe,
            Err(err) => {
                self.message = format_grade_message(&GradeOutcome::ConfigurationError {
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        self.generation += 1;
        let generation = self.generation;
        self.running = Some(generation);
        self.message = "⏳ Ejecutando...".into();

        let sandbox = Arc::clone(&self.sandbox);
        let tx = self.tx.clone();
        let mode = HarnessMode::for_target(target);
        let cases = cases.to_vec();
        thread::spawn(move || {
            let outcome = run_probe(&*sandbox, &probe, mode, &cases);
            // Si el controlador ya no existe, nadie espera este resultado.
            let _ = tx.send((generation, submission, outcome));
        });
        Ok(generation)
    }

    pub fn poll(&mut self) -> Option<FinishedRun<T>> {
        let mut latest = None;
        while let Ok(delivery) = self.rx.try_recv() {
            if let Some(run) = self.accept(delivery) {
                latest = Some(run);
            }
        }
        latest
    }

    pub fn wait(&mut self, timeout: Duration) -> Option<FinishedRun<T>> {
        let deadline = Instant::now() + timeout;
        while self.running.is_some() {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(left) {
                Ok(delivery) => {
                    if let Some(run) = self.accept(delivery) {
                        return Some(run);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None;
                }
            }
        }
        None
    }

    fn accept(&mut self, (generation, submission, outcome): Delivery<T>) -> Option<FinishedRun<T>> {
        if self.running != Some(generation) {
            debug!(
                "resultado obsoleto descartado (generación {generation}, vigente {})",
                self.generation
            );
            return None;
        }
        self.running = None;
        self.message = format_grade_message(&outcome);
        Some(FinishedRun {
            generation,
            submission,
            outcome,
        })
    }
}

impl GradingRunner<CodeSubmission> {
    pub fn submit(&mut self, section: &CodeSection, source: &str) -> Result<u64, GenerationError> {
        let submission = CodeSubmission {
            section_id: section.id.clone(),
            source: source.to_string(),
        };
        let generation = self.launch(source, &section.target, &section.tests, submission)?;
        self.message = "⏳ Evaluando tu código...".into();
        Ok(generation)
    }

    /// Guarda el resultado en el progreso; devuelve `None` si no era guardable.
    pub fn record<B: ProgressBackend>(
        run: &FinishedRun<CodeSubmission>,
        tracker: &SectionTracker<CodeExerciseState>,
        store: &mut ProgressStore<B>,
        now: Instant,
    ) -> Option<WriteOutcome> {
        let state = CodeExerciseState::from_outcome(&run.submission.source, &run.outcome)?;
        Some(tracker.write(store, &state, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::code_tracker;
    use crate::error::SandboxError;
    use crate::judge::protocol::wrap;
    use crate::judge::sandbox::{FnSandbox, SandboxOutput};
    use crate::model::{SectionKey, TestCase};
    use crate::progress::backend::MemoryBackend;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WAIT: Duration = Duration::from_secs(5);

    fn section() -> CodeSection {
        CodeSection {
            id: "c1".into(),
            title: String::new(),
            prompt: String::new(),
            starter: String::new(),
            target: "add".into(),
            tests: vec![TestCase::new(json!([2, 3]), json!(5), "2 + 3")],
        }
    }

    fn report(actual: &str) -> String {
        wrap(&format!(
            r#"[{{"input":"[2, 3]","expected":"5","actual":"{actual}","passed":true,"description":"2 + 3"}}]"#
        ))
    }

    /// Los envíos marcados con `# slow` tardan y devuelven una respuesta incorrecta.
    fn racing_sandbox() -> SharedSandbox {
        Arc::new(FnSandbox(|program: &str| -> Result<SandboxOutput, SandboxError> {
            if program.contains("# slow") {
                thread::sleep(Duration::from_millis(300));
                Ok(SandboxOutput::from_stdout(report("4")))
            } else {
                Ok(SandboxOutput::from_stdout(report("5")))
            }
        }))
    }

    #[test]
    fn stale_results_are_discarded() {
        let mut ctl = CodeExerciseController::new(racing_sandbox());
        let first = ctl
            .submit(&section(), "def add(a, b):\n    return a + b - 1  # slow\n")
            .expect("first");
        let second = ctl
            .submit(&section(), "def add(a, b):\n    return a + b\n")
            .expect("second");
        assert!(second > first);
        assert!(ctl.is_running());

        let run = ctl.wait(WAIT).expect("latest result");
        assert_eq!(run.generation, second);
        assert!(run.outcome.all_passed());
        assert!(!ctl.is_running());

        // El resultado lento llega después y se ignora.
        thread::sleep(Duration::from_millis(500));
        assert_eq!(ctl.poll(), None);
        assert!(ctl.message.contains("Correcto"));
    }

    #[test]
    fn invalid_target_fails_before_the_sandbox() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let sandbox: SharedSandbox = Arc::new(FnSandbox(
            move |_: &str| -> Result<SandboxOutput, SandboxError> {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(SandboxOutput::default())
            },
        ));
        let mut ctl = CodeExerciseController::new(sandbox);
        let mut bad = section();
        bad.target = "add()".into();

        assert!(matches!(
            ctl.submit(&bad, "def add(a, b): return a + b"),
            Err(GenerationError::InvalidTarget(_))
        ));
        assert!(!ctl.is_running());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(ctl.message.contains("mal configurado"));
    }

    #[test]
    fn finished_runs_are_recorded_in_progress() {
        let mut ctl = CodeExerciseController::new(racing_sandbox());
        let tracker = code_tracker(SectionKey::new("u", "l", "c1"));
        let mut store = ProgressStore::new(MemoryBackend::new());

        ctl.submit(&section(), "def add(a, b):\n    return a + b\n")
            .expect("submit");
        let run = ctl.wait(WAIT).expect("run");
        assert_eq!(run.submission.section_id, "c1");
        let written = CodeExerciseController::record(&run, &tracker, &mut store, Instant::now())
            .expect("recorded");
        assert!(written.completed);

        let state = tracker.read(&mut store);
        assert!(state.passed);
        assert_eq!(state.last_results.len(), 1);
        assert!(state.source.contains("return a + b"));
    }

    #[test]
    fn internal_errors_are_not_recorded() {
        let outcome = GradeOutcome::InternalError {
            message: "could not find results block".into(),
        };
        assert_eq!(CodeExerciseState::from_outcome("x", &outcome), None);
        let failure = GradeOutcome::HarnessFailure {
            message: "Function 'add' was not found in your code.".into(),
        };
        let state = CodeExerciseState::from_outcome("x", &failure).expect("state");
        assert!(!state.passed);
    }
}
