use crate::error::ParseError;
use crate::judge::comparator::{compare, compare_text};
use crate::judge::harness::{HarnessMode, generate};
use crate::judge::judge_utils::{excerpt, line_diff};
use crate::judge::protocol::parse;
use crate::judge::sandbox::Sandbox;
use crate::model::{ExecutionReport, TestCase, TestResult, Value};
use log::{debug, error, warn};

const LOG_EXCERPT_CHARS: usize = 400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradeOutcome {
    Graded { results: Vec<TestResult> },
    HarnessFailure { message: String },
    ConfigurationError { message: String },
    InternalError { message: String },
}

impl GradeOutcome {
    pub fn results(&self) -> Option<&[TestResult]> {
        match self {
            GradeOutcome::Graded { results } => Some(results),
            _ => None,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.results()
            .is_some_and(|r| !r.is_empty() && r.iter().all(|t| t.passed))
    }

    pub fn passed_count(&self) -> usize {
        self.results()
            .map(|r| r.iter().filter(|t| t.passed).count())
            .unwrap_or(0)
    }
}

pub fn grade<S: Sandbox + ?Sized>(
    sandbox: &S,
    submission: &str,
    target: &str,
    cases: &[TestCase],
) -> GradeOutcome {
    let probe = match generate(submission, target, cases) {
        Ok(probe) => probe,
        Err(err) => {
            warn!("no se pudo generar el probe para {target:?}: {err}");
            return GradeOutcome::ConfigurationError {
                message: err.to_string(),
            };
        }
    };
    run_probe(sandbox, &probe, HarnessMode::for_target(target), cases)
}

/// Ejecuta un probe ya generado y reduce su salida a un veredicto.
pub fn run_probe<S: Sandbox + ?Sized>(
    sandbox: &S,
    probe: &str,
    mode: HarnessMode,
    cases: &[TestCase],
) -> GradeOutcome {
    let output = match sandbox.run(probe) {
        Ok(output) => output,
        Err(err) => {
            error!("fallo del sandbox: {err}");
            return GradeOutcome::InternalError {
                message: err.to_string(),
            };
        }
    };

    if !output.stderr.trim().is_empty() {
        debug!(
            "stderr del sandbox: {}",
            excerpt(&output.stderr, LOG_EXCERPT_CHARS)
        );
    }

    match evaluate_output(&output.stdout, mode, cases) {
        Ok(ExecutionReport::Results(results)) => GradeOutcome::Graded { results },
        Ok(ExecutionReport::HarnessFailure { test_error }) => {
            GradeOutcome::HarnessFailure {
                message: test_error,
            }
        }
        Err(err) => {
            error!(
                "protocolo roto: {err}; salida: {}",
                excerpt(&output.stdout, LOG_EXCERPT_CHARS)
            );
            GradeOutcome::InternalError {
                message: err.to_string(),
            }
        }
    }
}

/// Parsea la salida y recalcula `passed` con el comparador de Rust.
pub fn evaluate_output(
    raw_output: &str,
    mode: HarnessMode,
    cases: &[TestCase],
) -> Result<ExecutionReport, ParseError> {
    match parse(raw_output)? {
        ExecutionReport::Results(mut results) => {
            let expected = match mode {
                HarnessMode::WholeProgram => 1,
                HarnessMode::Function => cases.len(),
            };
            if results.len() != expected {
                return Err(ParseError::CountMismatch {
                    expected,
                    actual: results.len(),
                });
            }
            reconcile(&mut results, mode, cases);
            Ok(ExecutionReport::Results(results))
        }
        failure => Ok(failure),
    }
}

fn reconcile(results: &mut [TestResult], mode: HarnessMode, cases: &[TestCase]) {
    for (idx, result) in results.iter_mut().enumerate() {
        if result.error {
            result.passed = false;
            continue;
        }

        let verdict = match mode {
            HarnessMode::WholeProgram => Some(compare_text(&result.actual, &result.expected)),
            // Valores no representables en JSON (sets, objetos) conservan el veredicto del probe.
            HarnessMode::Function => serde_json::from_str::<Value>(&result.actual)
                .ok()
                .zip(cases.get(idx))
                .map(|(actual, case)| compare(&actual, &case.expected)),
        };

        if let Some(verdict) = verdict {
            if verdict != result.passed {
                warn!(
                    "el comparador discrepa del probe en el caso #{} ({:?}); se usa {verdict}",
                    idx + 1,
                    result.description
                );
                result.passed = verdict;
            }
        }
    }
}

pub fn format_grade_message(outcome: &GradeOutcome) -> String {
    match outcome {
        GradeOutcome::Graded { results } => {
            let total = results.len();
            let passed = outcome.passed_count();
            let Some((idx, failed)) = results.iter().enumerate().find(|(_, r)| !r.passed) else {
                return format!("✅ ¡Correcto! Pasaron los {total} casos.");
            };
            let case = idx + 1;
            let label = if failed.description.is_empty() {
                String::new()
            } else {
                format!(" ({})", failed.description)
            };
            if failed.error {
                format!(
                    "❌ Pasaron {passed} de {total} casos.\n\nError en caso #{case}{label}.\n\nInput:\n{}\n\nTraza:\n{}",
                    failed.input,
                    failed.actual.trim_end()
                )
            } else {
                format!(
                    "❌ Pasaron {passed} de {total} casos.\n\nCaso #{case}{label}.\n\nInput:\n{}\n\nEsperado:\n{}\n\nRecibido:\n{}\n\nDiff:\n{}",
                    failed.input,
                    failed.expected,
                    failed.actual,
                    line_diff(&failed.expected, &failed.actual)
                )
            }
        }
        GradeOutcome::HarnessFailure { message } => {
            format!("⚠ No se pudieron ejecutar tus tests.\n\n{message}")
        }
        GradeOutcome::ConfigurationError { message } => {
            format!("⚠ El ejercicio está mal configurado: {message}")
        }
        GradeOutcome::InternalError { message } => {
            format!("⚠ Error interno al evaluar tu código: {message}")
        }
    }
}
