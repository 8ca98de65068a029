// src/data.rs

use crate::error::LessonError;
use crate::judge::harness::WHOLE_PROGRAM_TARGET;
use crate::judge::judge_utils::is_valid_identifier;
use crate::model::{Lesson, Section};
use std::collections::HashSet;
use std::path::Path;

pub const SAMPLE_LESSON: &str = include_str!("../lessons/funciones.yaml");

pub fn load_lesson(yaml: &str) -> Result<Lesson, LessonError> {
    let lesson: Lesson = serde_yaml::from_str(yaml)?;
    validate(&lesson)?;
    Ok(lesson)
}

pub fn read_lesson_file(path: &Path) -> Result<Lesson, LessonError> {
    let content = std::fs::read_to_string(path)?;
    load_lesson(&content)
}

fn invalid(section: &str, reason: impl Into<String>) -> LessonError {
    LessonError::Invalid {
        section: section.to_string(),
        reason: reason.into(),
    }
}

fn validate(lesson: &Lesson) -> Result<(), LessonError> {
    let mut seen = HashSet::new();
    for section in &lesson.sections {
        let id = section.id();
        if !seen.insert(id) {
            return Err(invalid(id, "duplicated section id"));
        }
        match section {
            Section::Text(_) => {}
            Section::Quiz(quiz) => {
                if quiz.correct.is_empty() {
                    return Err(invalid(id, "quiz without a correct option"));
                }
                if let Some(bad) = quiz.correct.iter().find(|&&i| i >= quiz.options.len()) {
                    return Err(invalid(id, format!("correct index {bad} out of range")));
                }
                if !quiz.multiple && quiz.correct.len() > 1 {
                    return Err(invalid(id, "single-choice quiz with several correct options"));
                }
            }
            Section::Matching(matching) => {
                if matching.prompts.is_empty() {
                    return Err(invalid(id, "matching without prompts"));
                }
                let prompts: HashSet<&str> = matching.prompts.iter().map(|p| p.id.as_str()).collect();
                let options: HashSet<&str> = matching.options.iter().map(|o| o.id.as_str()).collect();
                for prompt in &prompts {
                    if !matching.solution.contains_key(*prompt) {
                        return Err(invalid(id, format!("prompt {prompt:?} has no solution")));
                    }
                }
                let mut used = HashSet::new();
                for (prompt, option) in &matching.solution {
                    // Cada hueco admite una sola opción.
                    if !used.insert(option.as_str()) {
                        return Err(invalid(id, format!("option {option:?} solves several prompts")));
                    }
                    if !prompts.contains(prompt.as_str()) {
                        return Err(invalid(id, format!("unknown prompt {prompt:?} in solution")));
                    }
                    if !options.contains(option.as_str()) {
                        return Err(invalid(id, format!("unknown option {option:?} in solution")));
                    }
                }
            }
            Section::Coverage(coverage) => {
                if coverage.rows.is_empty() {
                    return Err(invalid(id, "coverage table without rows"));
                }
                if !is_valid_identifier(&coverage.target) {
                    return Err(invalid(id, format!("invalid target {:?}", coverage.target)));
                }
            }
            Section::Code(code) => {
                let whole_program = code.target == WHOLE_PROGRAM_TARGET;
                if !whole_program && !is_valid_identifier(&code.target) {
                    return Err(invalid(id, format!("invalid target {:?}", code.target)));
                }
                if whole_program && code.tests.is_empty() {
                    return Err(invalid(id, "whole-program exercise without test cases"));
                }
            }
        }
    }
    Ok(())
}
