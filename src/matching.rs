use crate::model::MatchingSection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct MatchingState {
    /// prompt_id -> option_id colocado (o vacío).
    pub user_matches: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    Slot(String),
    Pool,
}

impl MatchingState {
    pub fn empty(section: &MatchingSection) -> Self {
        Self {
            user_matches: section
                .prompts
                .iter()
                .map(|p| (p.id.clone(), None))
                .collect(),
        }
    }

    /// Mueve `option_id` a `target`, sacándolo antes del hueco que ocupara.
    /// Lo que hubiera en el hueco de destino vuelve a la bandeja.
    pub fn move_option(&self, option_id: &str, target: &DropTarget) -> MatchingState {
        if let DropTarget::Slot(prompt) = target {
            if !self.user_matches.contains_key(prompt) {
                return self.clone();
            }
        }

        let mut next = self.clone();
        for slot in next.user_matches.values_mut() {
            if slot.as_deref() == Some(option_id) {
                *slot = None;
            }
        }
        if let DropTarget::Slot(prompt) = target {
            next.user_matches
                .insert(prompt.clone(), Some(option_id.to_string()));
        }
        next
    }

    pub fn slot_of(&self, option_id: &str) -> Option<&str> {
        self.user_matches
            .iter()
            .find(|(_, v)| v.as_deref() == Some(option_id))
            .map(|(k, _)| k.as_str())
    }

    pub fn pool<'a>(&self, section: &'a MatchingSection) -> Vec<&'a str> {
        section
            .options
            .iter()
            .map(|o| o.id.as_str())
            .filter(|id| self.slot_of(id).is_none())
            .collect()
    }
}
