use super::*;
use crate::completion::AnyTracker;

impl<B: ProgressBackend> LessonApp<B> {
    /// Vuelve una sección a su estado inicial. El registro se sobrescribe, no se borra.
    pub fn reset_section(&mut self, section_id: &str) -> bool {
        let Some(section) = self.lesson.section(section_id) else {
            return false;
        };
        let now = Instant::now();
        match AnyTracker::for_section(&self.lesson, section) {
            Some(AnyTracker::Quiz(t)) => t.reset(&mut self.store, now),
            Some(AnyTracker::Matching(t)) => t.reset(&mut self.store, now),
            Some(AnyTracker::Coverage(t)) => t.reset(&mut self.store, now),
            Some(AnyTracker::Code(t)) => t.reset(&mut self.store, now),
            None => return false,
        };
        true
    }

    pub fn reset_lesson(&mut self) -> usize {
        let ids: Vec<String> = self
            .lesson
            .sections
            .iter()
            .filter(|s| s.is_interactive())
            .map(|s| s.id().to_string())
            .collect();
        let reset = ids.iter().filter(|id| self.reset_section(id)).count();
        self.current = self.lesson.sections.first().map(|s| s.id().to_string());
        self.message = "Progreso de la lección reiniciado.".into();
        reset
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{app_with, offline_sandbox};
    use crate::model::SectionKey;

    #[test]
    fn reset_overwrites_completed_sections() {
        let mut app = app_with(offline_sandbox());
        app.move_match("m1", "o1", "p1");
        app.move_match("m1", "o2", "p2");
        let key = SectionKey::new("u1", "funciones", "m1");
        assert!(app.store.is_completed(&key));

        assert!(app.reset_section("m1"));
        assert!(!app.store.is_completed(&key));
        assert!(app.store.record(&key).is_some());
        let state = app.matching_state("m1").expect("state");
        assert!(state.user_matches.values().all(Option::is_none));
    }

    #[test]
    fn reset_lesson_touches_interactive_sections_only() {
        let mut app = app_with(offline_sandbox());
        app.select_section("c1");
        assert_eq!(app.reset_lesson(), 4);
        assert_eq!(app.current.as_deref(), Some("intro"));
        assert!(!app.reset_section("intro"));
        assert!(!app.reset_section("nope"));
    }
}
