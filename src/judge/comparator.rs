// Misma semántica que `_compare` en harness.rs; cambiar ambos a la vez.

use crate::model::Value;

/// Tolerancia relativa y absoluta para números.
pub const TOLERANCE: f64 = 1e-5;

/// `true` si `actual` se considera igual a `expected`.
///
/// - Dos cadenas: se normalizan los saltos de línea y se quita el espacio final.
/// - Dos números: tolerancia combinada relativa+absoluta.
/// - Cualquier otro caso: igualdad estructural estricta.
pub fn compare(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => normalize_text(a) == normalize_text(b),
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => numbers_close(a, b),
            _ => a == b,
        },
        _ => strict_equal(actual, expected),
    }
}

pub fn compare_text(actual: &str, expected: &str) -> bool {
    normalize_text(actual) == normalize_text(expected)
}

fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n").trim_end().to_string()
}

fn numbers_close(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    if !a.is_finite() || !b.is_finite() {
        return false;
    }
    let scale = a.abs().max(b.abs());
    (a - b).abs() <= (TOLERANCE * scale).max(TOLERANCE)
}

// Los números anidados se comparan por valor exacto (1 == 1.0), sin tolerancia.
fn strict_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| strict_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| strict_equal(v, other)))
        }
        _ => false,
    }
}
