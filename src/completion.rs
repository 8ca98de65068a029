use crate::app::runner::CodeExerciseState;
use crate::coverage::CoverageState;
use crate::judge::comparator::compare_text;
use crate::matching::MatchingState;
use crate::model::{CoverageSection, Lesson, MatchingSection, Section, SectionKey};
use crate::progress::SectionTracker;
use crate::quiz::QuizAttemptState;

/// Solo un envío correcto completa un cuestionario.
pub fn quiz_completed(state: &QuizAttemptState) -> bool {
    state.is_submitted && state.is_correct == Some(true)
}

/// Todos los huecos llenos y todos iguales a la solución.
pub fn matching_completed(section: &MatchingSection, state: &MatchingState) -> bool {
    section.prompts.iter().all(|prompt| {
        match state.user_matches.get(&prompt.id).and_then(Option::as_deref) {
            Some(option) => section.solution.get(&prompt.id).map(String::as_str) == Some(option),
            None => false,
        }
    })
}

pub fn coverage_completed(section: &CoverageSection, state: &CoverageState) -> bool {
    section.rows.iter().all(|row| {
        state
            .actual_output(&row.id)
            .is_some_and(|actual| compare_text(actual, &row.expected_output))
    })
}

pub fn code_completed(state: &CodeExerciseState) -> bool {
    state.passed
}

pub fn quiz_tracker(key: SectionKey) -> SectionTracker<QuizAttemptState> {
    SectionTracker::new(key, QuizAttemptState::default(), quiz_completed)
}

pub fn matching_tracker(key: SectionKey, section: &MatchingSection) -> SectionTracker<MatchingState> {
    let default = MatchingState::empty(section);
    let section = section.clone();
    SectionTracker::new(key, default, move |state: &MatchingState| {
        matching_completed(&section, state)
    })
}

pub fn coverage_tracker(key: SectionKey, section: &CoverageSection) -> SectionTracker<CoverageState> {
    let section = section.clone();
    SectionTracker::new(key, CoverageState::default(), move |state: &CoverageState| {
        coverage_completed(&section, state)
    })
}

pub fn code_tracker(key: SectionKey) -> SectionTracker<CodeExerciseState> {
    SectionTracker::new(key, CodeExerciseState::default(), code_completed)
}

/// Tracker adecuado al tipo de sección; las de texto no tienen estado.
pub enum AnyTracker {
    Quiz(SectionTracker<QuizAttemptState>),
    Matching(SectionTracker<MatchingState>),
    Coverage(SectionTracker<CoverageState>),
    Code(SectionTracker<CodeExerciseState>),
}

impl AnyTracker {
    pub fn for_section(lesson: &Lesson, section: &Section) -> Option<Self> {
        let key = lesson.key_for(section.id());
        match section {
            Section::Text(_) => None,
            Section::Quiz(_) => Some(AnyTracker::Quiz(quiz_tracker(key))),
            Section::Matching(s) => Some(AnyTracker::Matching(matching_tracker(key, s))),
            Section::Coverage(s) => Some(AnyTracker::Coverage(coverage_tracker(key, s))),
            Section::Code(_) => Some(AnyTracker::Code(code_tracker(key))),
        }
    }

    pub fn key(&self) -> &SectionKey {
        match self {
            AnyTracker::Quiz(t) => t.key(),
            AnyTracker::Matching(t) => t.key(),
            AnyTracker::Coverage(t) => t.key(),
            AnyTracker::Code(t) => t.key(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::DropTarget;
    use crate::model::{MatchItem, TestResult};
    use serde_json::json;
    use crate::progress::ProgressStore;
    use crate::progress::backend::MemoryBackend;
    use crate::quiz::QuizMachine;
    use chrono::{Duration, Utc};
    use std::time::Instant;

    fn matching_section() -> MatchingSection {
        let item = |id: &str| MatchItem {
            id: id.into(),
            text: id.to_uppercase(),
        };
        MatchingSection {
            id: "m1".into(),
            title: String::new(),
            prompts: vec![item("p1"), item("p2")],
            options: vec![item("o1"), item("o2")],
            solution: [("p1", "o1"), ("p2", "o2")]
                .into_iter()
                .map(|(p, o)| (p.to_string(), o.to_string()))
                .collect(),
        }
    }

    fn slot(id: &str) -> DropTarget {
        DropTarget::Slot(id.into())
    }

    #[test]
    fn matching_completes_only_with_every_slot_right() {
        let section = matching_section();
        let partial = MatchingState::empty(&section).move_option("o1", &slot("p1"));
        assert!(!matching_completed(&section, &partial));

        let full = partial.move_option("o2", &slot("p2"));
        assert!(matching_completed(&section, &full));

        // Mover una pareja correcta a otro hueco deja como mucho uno bien.
        let moved = full.move_option("o1", &slot("p2"));
        let right = section
            .prompts
            .iter()
            .filter(|p| {
                moved.user_matches[&p.id].as_deref()
                    == section.solution.get(&p.id).map(String::as_str)
            })
            .count();
        assert!(right <= 1);
        assert!(!matching_completed(&section, &moved));
    }

    #[test]
    fn matching_tracker_reports_completion_through_the_store() {
        let section = matching_section();
        let tracker = matching_tracker(SectionKey::new("u", "l", "m1"), &section);
        let mut store = ProgressStore::new(MemoryBackend::new());
        let now = Instant::now();

        let state = tracker
            .read(&mut store)
            .move_option("o1", &slot("p1"))
            .move_option("o2", &slot("p2"));
        assert!(tracker.write(&mut store, &state, now).completed);
        assert!(tracker.is_completed(&mut store));

        let broken = state.move_option("o2", &DropTarget::Pool);
        assert!(!tracker.write(&mut store, &broken, now).completed);
        assert!(!tracker.is_completed(&mut store));
    }

    #[test]
    fn penalized_quiz_attempts_never_complete() {
        let section = crate::model::QuizSection {
            id: "q".into(),
            title: String::new(),
            prompt: "2 + 2".into(),
            options: vec!["3".into(), "4".into()],
            correct: vec![1],
            multiple: false,
            explanation: None,
        };
        let quiz = QuizMachine::new(&section);
        let tracker = quiz_tracker(SectionKey::new("u", "l", "q"));
        let mut store = ProgressStore::new(MemoryBackend::new());
        let now = Utc::now();
        let mut state = tracker.read(&mut store);

        quiz.select_option(&mut state, 0);
        quiz.submit(&mut state, now);
        assert!(!tracker.write(&mut store, &state, Instant::now()).completed);

        quiz.try_again(&mut state, now + Duration::seconds(15));
        quiz.select_option(&mut state, 1);
        quiz.submit(&mut state, now + Duration::seconds(16));
        assert!(tracker.write(&mut store, &state, Instant::now()).completed);
        assert_eq!(tracker.read(&mut store).failed_attempts, 1);
    }

    fn run(section: &CoverageSection, state: &mut CoverageState, outputs: &[(&str, &str)]) {
        let probe = crate::coverage::probe_cases(section, state);
        let results: Vec<TestResult> = probe
            .row_ids
            .iter()
            .map(|row| TestResult {
                input: String::new(),
                expected: String::new(),
                actual: outputs
                    .iter()
                    .find(|(id, _)| *id == row.as_str())
                    .map(|(_, out)| out.to_string())
                    .unwrap_or_default(),
                passed: false,
                description: row.clone(),
                error: false,
            })
            .collect();
        state.record_outputs(&probe, &results);
    }

    #[test]
    fn coverage_needs_every_row() {
        let section = crate::coverage::tests::section();
        let mut state = CoverageState::default();
        state.set_arguments("r1", json!(1));
        state.set_arguments("r2", json!(-1));
        run(&section, &mut state, &[("r1", "\"pos\""), ("r2", "\"neg\"")]);
        assert!(!coverage_completed(&section, &state));

        state.set_arguments("r3", json!(5));
        run(
            &section,
            &mut state,
            &[("r1", "\"pos\""), ("r2", "\"neg\""), ("r3", "\"pos\"")],
        );
        assert!(!coverage_completed(&section, &state));

        state.set_arguments("r3", json!(0));
        run(
            &section,
            &mut state,
            &[("r1", "\"pos\""), ("r2", "\"neg\""), ("r3", "\"zero\"")],
        );
        assert!(coverage_completed(&section, &state));
    }

    #[test]
    fn code_completion_follows_last_run() {
        let state = CodeExerciseState {
            passed: true,
            ..CodeExerciseState::default()
        };
        assert!(code_completed(&state));
        assert!(!code_completed(&CodeExerciseState::default()));
    }
}
