use crate::model::{CoverageSection, TestCase, TestResult, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CoverageEntry {
    pub arguments: Value,
    /// Salida capturada en la última ejecución con estos argumentos.
    pub actual_output: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct CoverageState {
    pub rows: BTreeMap<String, CoverageEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageProbe {
    pub row_ids: Vec<String>,
    pub cases: Vec<TestCase>,
}

impl CoverageState {
    /// Cambiar los argumentos invalida la salida anterior de esa fila.
    pub fn set_arguments(&mut self, row_id: &str, arguments: Value) {
        let entry = self.rows.entry(row_id.to_string()).or_default();
        if entry.arguments != arguments {
            entry.actual_output = None;
        }
        entry.arguments = arguments;
    }

    pub fn actual_output(&self, row_id: &str) -> Option<&str> {
        self.rows.get(row_id)?.actual_output.as_deref()
    }

    /// Guarda las salidas de una ejecución hecha con `probe`. Las filas cuyos
    /// argumentos cambiaron desde que se lanzó la ejecución no se tocan.
    pub fn record_outputs(&mut self, probe: &CoverageProbe, results: &[TestResult]) {
        let runs = probe.row_ids.iter().zip(&probe.cases).zip(results);
        for ((row_id, case), result) in runs {
            let Some(entry) = self.rows.get_mut(row_id) else {
                continue;
            };
            if entry.arguments != case.input {
                continue;
            }
            entry.actual_output = Some(if result.error {
                last_line(&result.actual)
            } else {
                display_value(&result.actual)
            });
        }
    }
}

/// Un caso por fila con argumentos; `expected` lleva el texto de la fila.
pub fn probe_cases(section: &CoverageSection, state: &CoverageState) -> CoverageProbe {
    let mut row_ids = Vec::new();
    let mut cases = Vec::new();
    for row in &section.rows {
        let Some(entry) = state.rows.get(&row.id) else {
            continue;
        };
        row_ids.push(row.id.clone());
        cases.push(TestCase::new(
            entry.arguments.clone(),
            Value::String(row.expected_output.clone()),
            row.id.clone(),
        ));
    }
    CoverageProbe { row_ids, cases }
}

pub fn parse_arguments(text: &str) -> Value {
    serde_json::from_str(text.trim()).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Representación de `actual` para comparar con la columna esperada: una
/// cadena JSON se muestra por su contenido, lo demás tal cual.
pub fn display_value(actual: &str) -> String {
    match serde_json::from_str::<Value>(actual) {
        Ok(Value::String(text)) => text,
        _ => actual.to_string(),
    }
}

// Del traceback solo interesa la línea con la excepción.
fn last_line(trace: &str) -> String {
    trace
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .to_string()
}
