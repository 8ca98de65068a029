use super::*;
use super::runner::CoverageRun;
use crate::completion::coverage_completed;
use crate::coverage::{CoverageState, parse_arguments, probe_cases};
use crate::error::RunError;
use crate::judge::grading::{GradeOutcome, format_grade_message};
use crate::matching::{DropTarget, MatchingState};
use crate::quiz::{QuizAttemptState, QuizMachine, QuizPhase};
use chrono::{DateTime, Utc};

impl<B: ProgressBackend> LessonApp<B> {
    // --- Cuestionarios ---

    pub fn quiz_state(&mut self, section_id: &str) -> QuizAttemptState {
        quiz_tracker(self.lesson.key_for(section_id)).read(&mut self.store)
    }

    pub fn select_quiz_option(&mut self, section_id: &str, index: usize) {
        let Some(section) = quiz_section(&self.lesson, section_id) else {
            return;
        };
        let tracker = quiz_tracker(self.lesson.key_for(section_id));
        let mut state = tracker.read(&mut self.store);
        QuizMachine::new(section).select_option(&mut state, index);
        tracker.write(&mut self.store, &state, Instant::now());
    }

    /// Envía la selección. `None` si no había nada que enviar.
    pub fn submit_quiz(&mut self, section_id: &str, now: DateTime<Utc>) -> Option<bool> {
        let section = quiz_section(&self.lesson, section_id)?;
        let tracker = quiz_tracker(self.lesson.key_for(section_id));
        let mut state = tracker.read(&mut self.store);

        let Some(correct) = QuizMachine::new(section).submit(&mut state, now) else {
            self.message = "⚠ Elige una opción antes de enviar.".into();
            return None;
        };
        tracker.write(&mut self.store, &state, Instant::now());

        self.message = if correct {
            match &section.explanation {
                Some(explanation) => format!("✅ ¡Correcto!\n\n{explanation}"),
                None => "✅ ¡Correcto!".into(),
            }
        } else {
            "❌ Incorrecto. Podrás reintentarlo en unos segundos.".into()
        };
        Some(correct)
    }

    pub fn retry_quiz(&mut self, section_id: &str, now: DateTime<Utc>) -> bool {
        let Some(section) = quiz_section(&self.lesson, section_id) else {
            return false;
        };
        let tracker = quiz_tracker(self.lesson.key_for(section_id));
        let mut state = tracker.read(&mut self.store);
        let machine = QuizMachine::new(section);

        if !machine.try_again(&mut state, now) {
            if machine.phase(&state, now) == QuizPhase::Penalized {
                self.message = format!(
                    "⏳ Espera {} s para volver a intentarlo.",
                    machine.remaining_penalty_secs(&state, now)
                );
            }
            return false;
        }
        tracker.write(&mut self.store, &state, Instant::now());
        self.message.clear();
        true
    }

    // --- Emparejamientos ---

    pub fn matching_state(&mut self, section_id: &str) -> Option<MatchingState> {
        let section = matching_section(&self.lesson, section_id)?;
        Some(matching_tracker(self.lesson.key_for(section_id), section).read(&mut self.store))
    }

    /// Suelta `option_id` sobre el hueco `prompt_id`. Devuelve si la sección quedó completa.
    pub fn move_match(&mut self, section_id: &str, option_id: &str, prompt_id: &str) -> bool {
        self.drop_option(section_id, option_id, DropTarget::Slot(prompt_id.to_string()))
    }

    pub fn unmatch(&mut self, section_id: &str, option_id: &str) -> bool {
        self.drop_option(section_id, option_id, DropTarget::Pool)
    }

    fn drop_option(&mut self, section_id: &str, option_id: &str, target: DropTarget) -> bool {
        let Some(section) = matching_section(&self.lesson, section_id) else {
            return false;
        };
        let tracker = matching_tracker(self.lesson.key_for(section_id), section);
        let next = tracker.read(&mut self.store).move_option(option_id, &target);
        tracker.write(&mut self.store, &next, Instant::now()).completed
    }

    // --- Cobertura ---

    pub fn coverage_state(&mut self, section_id: &str) -> Option<CoverageState> {
        let section = coverage_section(&self.lesson, section_id)?;
        Some(coverage_tracker(self.lesson.key_for(section_id), section).read(&mut self.store))
    }

    pub fn set_coverage_arguments(&mut self, section_id: &str, row_id: &str, text: &str) {
        let Some(section) = coverage_section(&self.lesson, section_id) else {
            return;
        };
        let tracker = coverage_tracker(self.lesson.key_for(section_id), section);
        let mut state = tracker.read(&mut self.store);
        state.set_arguments(row_id, parse_arguments(text));
        tracker.write(&mut self.store, &state, Instant::now());
    }

    /// Lanza la función de referencia con los argumentos de cada fila; el
    /// resultado llega por [`poll_coverage`](Self::poll_coverage).
    pub fn run_coverage(&mut self, section_id: &str) -> Result<u64, RunError> {
        let section = coverage_section(&self.lesson, section_id)
            .ok_or_else(|| wrong_section(section_id, "coverage"))?;
        let state = coverage_tracker(self.lesson.key_for(section_id), section).read(&mut self.store);
        let probe = probe_cases(section, &state);
        if probe.cases.is_empty() {
            self.message = "⚠ Escribe argumentos en al menos una fila.".into();
            return Err(RunError::NothingToRun);
        }

        let cases = probe.cases.clone();
        let run = CoverageRun {
            section_id: section_id.to_string(),
            probe,
        };
        let generation =
            self.coverage_runner
                .launch(&section.function_source, &section.target, &cases, run);
        self.message = self.coverage_runner.message.clone();
        Ok(generation?)
    }

    pub fn poll_coverage(&mut self, now: Instant) -> Option<GradeOutcome> {
        let run = self.coverage_runner.poll()?;
        let CoverageRun { section_id, probe } = &run.submission;
        let Some(section) = coverage_section(&self.lesson, section_id) else {
            return Some(run.outcome);
        };

        match &run.outcome {
            GradeOutcome::Graded { results } => {
                let tracker = coverage_tracker(self.lesson.key_for(section_id), section);
                let mut state = tracker.read(&mut self.store);
                state.record_outputs(probe, results);
                tracker.write(&mut self.store, &state, now);
                self.message = if coverage_completed(section, &state) {
                    "✅ ¡Todas las filas cubiertas!".into()
                } else {
                    "Algunas filas aún no producen la salida esperada.".into()
                };
            }
            other => self.message = format_grade_message(other),
        }
        Some(run.outcome)
    }

    pub fn is_coverage_running(&self) -> bool {
        self.coverage_runner.is_running()
    }

    // --- Código ---

    /// Lanza la evaluación del código en segundo plano.
    pub fn run_code(&mut self, section_id: &str, source: &str) -> Result<u64, RunError> {
        let section =
            code_section(&self.lesson, section_id).ok_or_else(|| wrong_section(section_id, "code"))?;
        let generation = self.runner.submit(section, source);
        self.message = self.runner.message.clone();
        Ok(generation?)
    }

    pub fn poll_code(&mut self, now: Instant) -> Option<GradeOutcome> {
        let run = self.runner.poll()?;
        self.message = self.runner.message.clone();
        let tracker = code_tracker(self.lesson.key_for(&run.submission.section_id));
        CodeExerciseController::record(&run, &tracker, &mut self.store, now);
        Some(run.outcome)
    }

    pub fn is_code_running(&self) -> bool {
        self.runner.is_running()
    }
}

fn wrong_section(section_id: &str, expected: &'static str) -> RunError {
    RunError::WrongSection {
        section: section_id.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::super::LessonApp;
    use super::super::runner::SharedSandbox;
    use super::super::tests::{app_with, offline_sandbox};
    use crate::error::{RunError, SandboxError};
    use crate::judge::GradeOutcome;
    use crate::judge::protocol::wrap;
    use crate::judge::sandbox::{FnSandbox, SandboxOutput};
    use crate::model::SectionKey;
    use crate::progress::backend::MemoryBackend;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    fn key(section: &str) -> SectionKey {
        SectionKey::new("u1", "funciones", section)
    }

    /// Responde a cada ejecución con el siguiente informe de la lista.
    fn scripted(reports: &[&str]) -> SharedSandbox {
        let reports: VecDeque<String> = reports.iter().map(|r| wrap(r)).collect();
        let reports = Mutex::new(reports);
        Arc::new(FnSandbox(move |_: &str| -> Result<SandboxOutput, SandboxError> {
            let next = reports.lock().expect("lock").pop_front();
            next.map(SandboxOutput::from_stdout)
                .ok_or_else(|| SandboxError::Unavailable("sin más respuestas".into()))
        }))
    }

    fn row(id: &str, args: &str, actual: &str) -> String {
        format!(
            r#"{{"input":"{args}","expected":"\"{actual}\"","actual":"\"{actual}\"","passed":false,"description":"{id}"}}"#
        )
    }

    fn settle_coverage(app: &mut LessonApp<MemoryBackend>) -> GradeOutcome {
        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        loop {
            if let Some(outcome) = app.poll_coverage(Instant::now()) {
                return outcome;
            }
            assert!(Instant::now() < deadline, "sin resultado de cobertura");
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
    }

    #[test]
    fn quiz_flow_with_penalty() {
        let mut app = app_with(offline_sandbox());
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).single().expect("fecha");

        assert_eq!(app.submit_quiz("q1", t0), None);
        app.select_quiz_option("q1", 0);
        assert_eq!(app.submit_quiz("q1", t0), Some(false));
        assert!(!app.store.is_completed(&key("q1")));

        assert!(!app.retry_quiz("q1", t0 + Duration::seconds(3)));
        assert!(app.message.contains("12 s"));

        assert!(app.retry_quiz("q1", t0 + Duration::seconds(15)));
        app.select_quiz_option("q1", 1);
        assert_eq!(app.submit_quiz("q1", t0 + Duration::seconds(20)), Some(true));
        assert!(app.store.is_completed(&key("q1")));
        assert_eq!(app.quiz_state("q1").failed_attempts, 1);
    }

    #[test]
    fn matching_moves_are_persisted() {
        let mut app = app_with(offline_sandbox());
        assert!(!app.move_match("m1", "o1", "p1"));
        assert!(app.move_match("m1", "o2", "p2"));
        assert!(app.store.is_completed(&key("m1")));

        assert!(!app.move_match("m1", "o1", "p2"));
        let state = app.matching_state("m1").expect("state");
        assert_eq!(state.user_matches["p1"], None);
        assert!(!app.store.is_completed(&key("m1")));
    }

    #[test]
    fn unmatch_returns_the_option_to_the_pool() {
        let mut app = app_with(offline_sandbox());
        app.move_match("m1", "o1", "p1");
        assert!(app.move_match("m1", "o2", "p2"));

        assert!(!app.unmatch("m1", "o1"));
        let state = app.matching_state("m1").expect("state");
        assert_eq!(state.user_matches["p1"], None);
        assert_eq!(state.user_matches["p2"].as_deref(), Some("o2"));
        assert!(!app.store.is_completed(&key("m1")));
    }

    #[test]
    fn wrong_section_kind_is_ignored() {
        let mut app = app_with(offline_sandbox());
        assert!(!app.move_match("q1", "o1", "p1"));
        assert_eq!(app.matching_state("q1"), None);
        assert_eq!(
            app.run_code("q1", "print(1)"),
            Err(RunError::WrongSection {
                section: "q1".into(),
                expected: "code",
            })
        );
        assert!(matches!(
            app.run_coverage("c1"),
            Err(RunError::WrongSection { .. })
        ));
    }

    #[test]
    fn coverage_fills_row_by_row() {
        let first = format!("[{}]", row("r1", "3", "pos"));
        let second = format!("[{},{}]", row("r1", "3", "pos"), row("r2", "-2", "neg"));
        let mut app = app_with(scripted(&[first.as_str(), second.as_str()]));

        assert_eq!(app.run_coverage("s1"), Err(RunError::NothingToRun));

        app.set_coverage_arguments("s1", "r1", "3");
        app.run_coverage("s1").expect("first run");
        assert!(app.is_coverage_running());
        assert!(settle_coverage(&mut app).results().is_some());
        assert!(!app.is_coverage_running());
        let state = app.coverage_state("s1").expect("state");
        assert_eq!(state.actual_output("r1"), Some("pos"));
        assert!(!app.store.is_completed(&key("s1")));

        app.set_coverage_arguments("s1", "r2", "-2");
        app.run_coverage("s1").expect("second run");
        settle_coverage(&mut app);
        assert!(app.store.is_completed(&key("s1")));
        assert!(app.message.contains("cubiertas"));
    }

    #[test]
    fn editing_arguments_clears_the_row_output() {
        let report = format!("[{},{}]", row("r1", "3", "pos"), row("r2", "-2", "neg"));
        let mut app = app_with(scripted(&[report.as_str()]));
        app.set_coverage_arguments("s1", "r1", "3");
        app.set_coverage_arguments("s1", "r2", "-2");
        app.run_coverage("s1").expect("run");
        settle_coverage(&mut app);
        assert!(app.store.is_completed(&key("s1")));

        app.set_coverage_arguments("s1", "r2", "5");
        let state = app.coverage_state("s1").expect("state");
        assert_eq!(state.actual_output("r2"), None);
        assert_eq!(state.actual_output("r1"), Some("pos"));
        assert!(!app.store.is_completed(&key("s1")));
    }

    #[test]
    fn edits_during_a_coverage_run_are_not_overwritten() {
        let report = format!("[{}]", row("r1", "3", "pos"));
        let mut app = app_with(scripted(&[report.as_str()]));
        app.set_coverage_arguments("s1", "r1", "3");
        app.run_coverage("s1").expect("run");
        // Llega antes que el resultado.
        app.set_coverage_arguments("s1", "r1", "-3");
        settle_coverage(&mut app);
        let state = app.coverage_state("s1").expect("state");
        assert_eq!(state.actual_output("r1"), None);
    }

    #[test]
    fn coverage_sandbox_failures_leave_progress_untouched() {
        let mut app = app_with(offline_sandbox());
        app.set_coverage_arguments("s1", "r1", "3");
        let before = app.coverage_state("s1").expect("state");
        app.run_coverage("s1").expect("run");
        let outcome = settle_coverage(&mut app);
        assert!(matches!(outcome, GradeOutcome::InternalError { .. }));
        assert_eq!(app.coverage_state("s1"), Some(before));
        assert!(!app.store.is_completed(&key("s1")));
        assert!(app.message.contains("sandbox"));
    }

    #[test]
    fn code_results_land_in_progress() {
        let sandbox = Arc::new(FnSandbox(|_: &str| -> Result<SandboxOutput, SandboxError> {
            Ok(SandboxOutput::from_stdout(wrap(
                r#"[{"input":"[2, 3]","expected":"5","actual":"5","passed":true,"description":"2 + 3"}]"#,
            )))
        }));
        let mut app = app_with(sandbox);
        app.run_code("c1", "def add(a, b):\n    return a + b\n")
            .expect("submit");
        assert!(app.is_code_running());

        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        let outcome = loop {
            if let Some(outcome) = app.poll_code(Instant::now()) {
                break outcome;
            }
            assert!(Instant::now() < deadline, "sin resultado");
            std::thread::sleep(std::time::Duration::from_millis(10));
        };
        assert!(outcome.all_passed());
        assert!(app.store.is_completed(&key("c1")));
        assert!(app.message.contains("Correcto"));
    }

    #[test]
    fn sandbox_failures_are_reported_not_recorded() {
        let mut app = app_with(offline_sandbox());
        app.run_code("c1", "def add(a, b):\n    return a + b\n")
            .expect("submit");
        let outcome = app.runner.wait(std::time::Duration::from_secs(5)).expect("run");
        assert!(matches!(outcome.outcome, GradeOutcome::InternalError { .. }));
        assert!(!app.store.is_completed(&key("c1")));
    }
}
