use super::*;
use crate::model::SectionKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarEntry {
    pub section_id: String,
    pub title: String,
    pub done: bool,
    pub current: bool,
}

fn section_done<B: ProgressBackend>(store: &mut ProgressStore<B>, key: &SectionKey, section: &Section) -> bool {
    // Las secciones de texto cuentan como leídas.
    !section.is_interactive() || store.is_completed(key)
}

impl<B: ProgressBackend> LessonApp<B> {
    pub fn sidebar(&mut self) -> Vec<SidebarEntry> {
        let mut entries = Vec::with_capacity(self.lesson.sections.len());
        for section in &self.lesson.sections {
            let key = self.lesson.key_for(section.id());
            entries.push(SidebarEntry {
                section_id: section.id().to_string(),
                title: section.title().to_string(),
                done: section_done(&mut self.store, &key, section),
                current: self.current.as_deref() == Some(section.id()),
            });
        }
        entries
    }

    pub fn lesson_completed(&mut self) -> bool {
        self.lesson.sections.iter().all(|section| {
            let key = self.lesson.key_for(section.id());
            section_done(&mut self.store, &key, section)
        })
    }

    /// Primera sección sin terminar después de la actual, dando la vuelta al final.
    pub fn next_unfinished(&mut self) -> Option<String> {
        let sections = &self.lesson.sections;
        let start = self
            .current
            .as_deref()
            .and_then(|id| sections.iter().position(|s| s.id() == id))
            .map(|idx| idx + 1)
            .unwrap_or(0);

        (0..sections.len())
            .map(|offset| &sections[(start + offset) % sections.len()])
            .find(|section| {
                let key = self.lesson.key_for(section.id());
                !section_done(&mut self.store, &key, section)
            })
            .map(|section| section.id().to_string())
    }

    pub fn select_section(&mut self, section_id: &str) -> bool {
        if self.lesson.section(section_id).is_none() {
            return false;
        }
        self.current = Some(section_id.to_string());
        self.message.clear();
        true
    }

    pub fn advance(&mut self) -> bool {
        match self.next_unfinished() {
            Some(id) => self.select_section(&id),
            None => {
                self.message = format!("🎉 ¡Lección \"{}\" completada!", self.lesson.title);
                false
            }
        }
    }
}
