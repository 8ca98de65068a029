use crate::completion::{code_tracker, coverage_tracker, matching_tracker, quiz_tracker};
use crate::error::PersistenceError;
use crate::model::{CodeSection, CoverageSection, Lesson, MatchingSection, QuizSection, Section};
use crate::progress::ProgressStore;
use crate::progress::backend::ProgressBackend;
use log::{error, warn};
use std::time::Instant;

// Submódulos
pub mod actions;
pub mod runner;
pub mod navigation;
pub mod resets;

use runner::{CodeExerciseController, CoverageController, SharedSandbox};

/// Sesión de una lección abierta: contenido, progreso y ejecuciones en curso.
pub struct LessonApp<B: ProgressBackend> {
    pub lesson: Lesson,
    pub store: ProgressStore<B>,
    pub runner: CodeExerciseController,
    pub coverage_runner: CoverageController,
    pub current: Option<String>,
    pub message: String,
}

impl<B: ProgressBackend> LessonApp<B> {
    pub fn new(lesson: Lesson, store: ProgressStore<B>, sandbox: SharedSandbox) -> Self {
        let current = lesson.sections.first().map(|s| s.id().to_string());
        Self {
            lesson,
            store,
            runner: CodeExerciseController::new(sandbox.clone()),
            coverage_runner: CoverageController::new(sandbox),
            current,
            message: String::new(),
        }
    }

    /// Recoge ejecuciones terminadas y escribe el progreso cuyo plazo venció.
    /// Llamar una vez por frame.
    pub fn tick(&mut self, now: Instant) {
        self.poll_code(now);
        self.poll_coverage(now);
        if let Err(err) = self.store.tick(now) {
            warn!("no se pudo guardar el progreso: {err}");
        }
    }

    pub fn shutdown(&mut self) -> Result<usize, PersistenceError> {
        self.store.flush_all().inspect_err(|err| {
            error!("progreso sin guardar al cerrar: {err}");
        })
    }
}

fn quiz_section<'a>(lesson: &'a Lesson, id: &str) -> Option<&'a QuizSection> {
    match lesson.section(id) {
        Some(Section::Quiz(s)) => Some(s),
        _ => {
            warn!("{id:?} no es un cuestionario de {}", lesson.lesson_id);
            None
        }
    }
}

fn matching_section<'a>(lesson: &'a Lesson, id: &str) -> Option<&'a MatchingSection> {
    match lesson.section(id) {
        Some(Section::Matching(s)) => Some(s),
        _ => {
            warn!("{id:?} no es un emparejamiento de {}", lesson.lesson_id);
            None
        }
    }
}

fn coverage_section<'a>(lesson: &'a Lesson, id: &str) -> Option<&'a CoverageSection> {
    match lesson.section(id) {
        Some(Section::Coverage(s)) => Some(s),
        _ => {
            warn!("{id:?} no es una tabla de cobertura de {}", lesson.lesson_id);
            None
        }
    }
}

fn code_section<'a>(lesson: &'a Lesson, id: &str) -> Option<&'a CodeSection> {
    match lesson.section(id) {
        Some(Section::Code(s)) => Some(s),
        _ => {
            warn!("{id:?} no es un ejercicio de código de {}", lesson.lesson_id);
            None
        }
    }
}
