use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Value = serde_json::Value;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TestCase {
    #[serde(default)]
    pub input: Value,
    pub expected: Value,
    pub description: String,
}

impl TestCase {
    pub fn new(input: Value, expected: Value, description: impl Into<String>) -> Self {
        Self {
            input,
            expected,
            description: description.into(),
        }
    }
}

/// Resultado de un caso tal como lo reporta el probe. Los campos de valor
/// son texto porque cruzan la frontera del sandbox serializados.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub input: String,
    pub expected: String,
    pub actual: String,
    pub passed: bool,
    pub description: String,
    /// `actual` contiene una traza y no un valor devuelto.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ExecutionReport {
    Results(Vec<TestResult>),
    HarnessFailure { test_error: String },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionKey {
    pub unit_id: String,
    pub lesson_id: String,
    pub section_id: String,
}

impl SectionKey {
    pub fn new(
        unit_id: impl Into<String>,
        lesson_id: impl Into<String>,
        section_id: impl Into<String>,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            lesson_id: lesson_id.into(),
            section_id: section_id.into(),
        }
    }

    /// Clave del registro duradero. Cada segmento se escapa para que un `/`
    /// dentro de un id no pueda desplazar los límites entre segmentos.
    pub fn storage_key(&self) -> String {
        format!(
            "lesson_progress/{}/{}/{}",
            escape_segment(&self.unit_id),
            escape_segment(&self.lesson_id),
            escape_segment(&self.section_id)
        )
    }
}

fn escape_segment(segment: &str) -> String {
    segment.replace('%', "%25").replace('/', "%2F")
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Lesson {
    pub unit_id: String,
    pub lesson_id: String,
    #[serde(default)]
    pub title: String,
    pub sections: Vec<Section>,
}

impl Lesson {
    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id() == id)
    }

    pub fn key_for(&self, section_id: &str) -> SectionKey {
        SectionKey::new(&self.unit_id, &self.lesson_id, section_id)
    }
}

/// Una sección de lección; `kind` decide qué widget la representa.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Section {
    Text(TextSection),
    Quiz(QuizSection),
    Matching(MatchingSection),
    Coverage(CoverageSection),
    Code(CodeSection),
}

impl Section {
    pub fn id(&self) -> &str {
        match self {
            Section::Text(s) => &s.id,
            Section::Quiz(s) => &s.id,
            Section::Matching(s) => &s.id,
            Section::Coverage(s) => &s.id,
            Section::Code(s) => &s.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Section::Text(s) => &s.title,
            Section::Quiz(s) => &s.title,
            Section::Matching(s) => &s.title,
            Section::Coverage(s) => &s.title,
            Section::Code(s) => &s.title,
        }
    }

    /// Las secciones de texto no guardan estado y cuentan siempre como hechas.
    pub fn is_interactive(&self) -> bool {
        !matches!(self, Section::Text(_))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TextSection {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QuizSection {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub prompt: String,
    pub options: Vec<String>,
    /// Índices de las opciones correctas.
    pub correct: Vec<usize>,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MatchItem {
    pub id: String,
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MatchingSection {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub prompts: Vec<MatchItem>,
    pub options: Vec<MatchItem>,
    pub solution: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CoverageRow {
    pub id: String,
    pub expected_output: String,
    #[serde(default)]
    pub hint: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CoverageSection {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Función de referencia que el alumno debe "cubrir" eligiendo entradas.
    pub function_source: String,
    pub target: String,
    pub rows: Vec<CoverageRow>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CodeSection {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub starter: String,
    /// Nombre de la función a probar, o `__main__` para programa completo.
    pub target: String,
    pub tests: Vec<TestCase>,
}
