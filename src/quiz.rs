use crate::model::QuizSection;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const PENALTY_WINDOW_SECS: i64 = 15;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct QuizAttemptState {
    pub selected_indices: Vec<usize>,
    pub is_submitted: bool,
    pub is_correct: Option<bool>,
    pub penalty_until: Option<DateTime<Utc>>,
    /// Intentos fallidos acumulados; no afectan a la completitud.
    pub failed_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizPhase {
    Unanswered,
    Correct,
    Penalized,
    Retryable,
}

pub fn is_expired(now: DateTime<Utc>, deadline: Option<DateTime<Utc>>) -> bool {
    deadline.is_none_or(|d| now >= d)
}

pub struct QuizMachine {
    multiple: bool,
    option_count: usize,
    correct: BTreeSet<usize>,
}

impl QuizMachine {
    pub fn new(section: &QuizSection) -> Self {
        Self {
            multiple: section.multiple,
            option_count: section.options.len(),
            correct: section.correct.iter().copied().collect(),
        }
    }

    /// Marca (o desmarca, en selección múltiple) una opción. Tras enviar, nada cambia.
    pub fn select_option(&self, state: &mut QuizAttemptState, index: usize) {
        if state.is_submitted || index >= self.option_count {
            return;
        }
        if self.multiple {
            if let Some(pos) = state.selected_indices.iter().position(|&i| i == index) {
                state.selected_indices.remove(pos);
            } else {
                state.selected_indices.push(index);
                state.selected_indices.sort_unstable();
            }
        } else {
            state.selected_indices = vec![index];
        }
    }

    /// Corrige la selección actual. Devuelve `Some(correcto)` si hubo envío.
    pub fn submit(&self, state: &mut QuizAttemptState, now: DateTime<Utc>) -> Option<bool> {
        if state.is_submitted || state.selected_indices.is_empty() {
            return None;
        }
        let chosen: BTreeSet<usize> = state.selected_indices.iter().copied().collect();
        let correct = chosen == self.correct;

        state.is_submitted = true;
        state.is_correct = Some(correct);
        if correct {
            state.penalty_until = None;
        } else {
            state.penalty_until = Some(now + Duration::seconds(PENALTY_WINDOW_SECS));
            state.failed_attempts += 1;
        }
        Some(correct)
    }

    /// Reinicia el intento si el último envío falló y la penalización venció.
    pub fn try_again(&self, state: &mut QuizAttemptState, now: DateTime<Utc>) -> bool {
        if self.phase(state, now) != QuizPhase::Retryable {
            return false;
        }
        state.selected_indices.clear();
        state.is_submitted = false;
        state.is_correct = None;
        state.penalty_until = None;
        true
    }

    pub fn phase(&self, state: &QuizAttemptState, now: DateTime<Utc>) -> QuizPhase {
        match (state.is_submitted, state.is_correct) {
            (true, Some(true)) => QuizPhase::Correct,
            (true, _) if is_expired(now, state.penalty_until) => QuizPhase::Retryable,
            (true, _) => QuizPhase::Penalized,
            (false, _) => QuizPhase::Unanswered,
        }
    }

    pub fn remaining_penalty(&self, state: &QuizAttemptState, now: DateTime<Utc>) -> Option<Duration> {
        let deadline = state.penalty_until?;
        (deadline > now).then(|| deadline - now)
    }

    pub fn remaining_penalty_secs(&self, state: &QuizAttemptState, now: DateTime<Utc>) -> u64 {
        self.remaining_penalty(state, now)
            .map(|d| (d.num_milliseconds().max(0) as u64).div_ceil(1000))
            .unwrap_or(0)
    }
}
