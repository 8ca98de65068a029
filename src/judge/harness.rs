use crate::error::GenerationError;
use crate::judge::comparator::TOLERANCE;
use crate::judge::judge_utils::{is_valid_identifier, python_string_literal};
use crate::judge::protocol::{RESULTS_END, RESULTS_START};
use crate::model::TestCase;

/// Nombre reservado que activa el modo programa completo.
pub const WHOLE_PROGRAM_TARGET: &str = "__main__";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HarnessMode {
    WholeProgram,
    Function,
}

impl HarnessMode {
    pub fn for_target(target: &str) -> Self {
        if target == WHOLE_PROGRAM_TARGET {
            HarnessMode::WholeProgram
        } else {
            HarnessMode::Function
        }
    }
}

const PRELUDE: &str = r#"import contextlib
import copy
import io
import json
import math
import sys
import traceback

_START = {{START}}
_END = {{END}}
_TOL = {{TOLERANCE}}


def _normalize_text(text):
    return text.replace("\r\n", "\n").rstrip()


def _is_number(value):
    return isinstance(value, (int, float)) and not isinstance(value, bool)


def _strict_equal(a, b):
    if isinstance(a, bool) or isinstance(b, bool):
        return isinstance(a, bool) and isinstance(b, bool) and a == b
    if _is_number(a) and _is_number(b):
        return a == b
    if isinstance(a, (list, tuple)) and isinstance(b, (list, tuple)):
        return len(a) == len(b) and all(_strict_equal(x, y) for x, y in zip(a, b))
    if isinstance(a, dict) and isinstance(b, dict):
        return set(a.keys()) == set(b.keys()) and all(_strict_equal(a[k], b[k]) for k in a)
    if a is None or b is None:
        return a is None and b is None
    if isinstance(a, str) and isinstance(b, str):
        return a == b
    return False


def _compare(actual, expected):
    try:
        if isinstance(actual, str) and isinstance(expected, str):
            return _normalize_text(actual) == _normalize_text(expected)
        if _is_number(actual) and _is_number(expected):
            return math.isclose(actual, expected, rel_tol=_TOL, abs_tol=_TOL)
        return _strict_equal(actual, expected)
    except Exception:
        return False


def _show(value):
    try:
        return json.dumps(value)
    except (TypeError, ValueError):
        return repr(value)


def _emit(payload):
    out = sys.__stdout__
    out.write("\n" + _START + "\n")
    out.write(json.dumps(payload) + "\n")
    out.write(_END + "\n")
    out.flush()

"#;

const WHOLE_PROGRAM_BODY: &str = r#"
_SOURCE = {{SOURCE}}
_CASE = json.loads({{CASES}})


def _run():
    stdin = _CASE.get("input")
    expected = _CASE.get("expected")
    expected_text = expected if isinstance(expected, str) else _show(expected)
    record = {
        "input": _show(stdin),
        "expected": expected_text,
        "description": _CASE.get("description", ""),
    }
    sink = io.StringIO()
    saved_stdin = sys.stdin
    if isinstance(stdin, str):
        sys.stdin = io.StringIO(stdin)
    trace = None
    try:
        with contextlib.redirect_stdout(sink):
            exec(compile(_SOURCE, "<submission>", "exec"), {"__name__": "__main__"})
    except SystemExit as exc:
        if exc.code not in (None, 0):
            trace = traceback.format_exc()
    except BaseException:
        trace = traceback.format_exc()
    finally:
        sys.stdin = saved_stdin
    if trace is not None:
        record.update(actual=trace, passed=False, error=True)
    else:
        output = sink.getvalue()
        record.update(actual=output, passed=_compare(output, expected_text), error=False)
    return [record]


_emit(_run())
"#;

const FUNCTION_BODY: &str = r#"
_SOURCE = {{SOURCE}}
_CASES = json.loads({{CASES}})
_TARGET = {{TARGET}}


def _call(func, arguments):
    if arguments is None:
        return func()
    if isinstance(arguments, list):
        return func(*arguments)
    return func(arguments)


def _base_record(case):
    return {
        "input": _show(case.get("input")),
        "expected": _show(case.get("expected")),
        "description": case.get("description", ""),
    }


def _run():
    namespace = {"__name__": "__submission__"}
    sink = io.StringIO()
    try:
        with contextlib.redirect_stdout(sink):
            exec(compile(_SOURCE, "<submission>", "exec"), namespace)
    except BaseException:
        trace = traceback.format_exc()
        results = []
        for case in _CASES:
            record = _base_record(case)
            record.update(actual=trace, passed=False, error=True)
            results.append(record)
        return results

    if _TARGET not in namespace:
        return {"test_error": "Function '%s' was not found in your code." % _TARGET}
    func = namespace[_TARGET]
    if not callable(func):
        return {"test_error": "'%s' is defined but is not callable." % _TARGET}

    results = []
    for case in _CASES:
        record = _base_record(case)
        try:
            with contextlib.redirect_stdout(sink):
                actual = _call(func, copy.deepcopy(case.get("input")))
        except BaseException:
            record.update(actual=traceback.format_exc(), passed=False, error=True)
        else:
            passed = _compare(actual, case.get("expected"))
            record.update(actual=_show(actual), passed=bool(passed), error=False)
        results.append(record)
    return results


_emit(_run())
"#;

/// Construye el programa que se entrega al sandbox.
///
/// Falla con [`GenerationError::InvalidTarget`] si `target` no es un
/// identificador, antes de que ningún texto del alumno llegue al probe.
pub fn generate(
    submission: &str,
    target: &str,
    cases: &[TestCase],
) -> Result<String, GenerationError> {
    let mode = HarnessMode::for_target(target);
    if mode == HarnessMode::Function && !is_valid_identifier(target) {
        return Err(GenerationError::InvalidTarget(target.to_string()));
    }

    let cases_json = match mode {
        HarnessMode::WholeProgram => {
            // Solo se consulta el primer caso.
            let first = cases.first().ok_or(GenerationError::MissingCase)?;
            serde_json::to_string(first)
        }
        HarnessMode::Function => serde_json::to_string(cases),
    }
    .map_err(|e| GenerationError::Serialize(e.to_string()))?;

    let body = match mode {
        HarnessMode::WholeProgram => WHOLE_PROGRAM_BODY,
        HarnessMode::Function => FUNCTION_BODY,
    };

    let tolerance = format!("{TOLERANCE:e}");
    let values = [
        ("START", python_string_literal(RESULTS_START)),
        ("END", python_string_literal(RESULTS_END)),
        ("TOLERANCE", tolerance),
        ("SOURCE", python_string_literal(submission)),
        ("CASES", python_string_literal(&cases_json)),
        ("TARGET", python_string_literal(target)),
    ];

    let mut probe = render(PRELUDE, &values);
    probe.push_str(&render(body, &values));
    Ok(probe)
}

/// Sustituye `{{CLAVE}}` en una sola pasada; el texto insertado nunca se
/// vuelve a examinar, así que una entrega que contenga `{{CASES}}` queda intacta.
fn render(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let replaced = after.find("}}").and_then(|end| {
            let key = &after[..end];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (v, end))
        });
        match replaced {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_case() -> TestCase {
        TestCase::new(json!([2, 3]), json!(5), "2 + 3")
    }

    #[test]
    fn rejects_targets_that_are_not_identifiers() {
        for bad in ["", "1add", "add; import os", "add()", "a b", "x\"y"] {
            assert_eq!(
                generate("def add(a, b): return a + b", bad, &[add_case()]),
                Err(GenerationError::InvalidTarget(bad.to_string()))
            );
        }
    }

    #[test]
    fn main_target_selects_whole_program_mode() {
        let probe = generate("print('hi')", "__main__", &[TestCase::new(
            json!(null),
            json!("hi\n"),
            "saluda",
        )])
        .expect("probe");
        assert!(probe.contains("_CASE = json.loads("));
        assert!(!probe.contains("_TARGET ="));
    }

    #[test]
    fn whole_program_mode_needs_a_case() {
        assert_eq!(
            generate("print(1)", "__main__", &[]),
            Err(GenerationError::MissingCase)
        );
    }

    #[test]
    fn function_mode_embeds_target_and_cases() {
        let probe = generate("def add(a, b): return a + b", "add", &[add_case()]).expect("probe");
        assert!(probe.contains("_TARGET = \"add\""));
        assert!(probe.contains("_TOL = 1e-5"));
        assert!(probe.contains(RESULTS_START));
        assert!(probe.contains(RESULTS_END));
    }

    #[test]
    fn submission_cannot_escape_its_literal() {
        let hostile = "x = \"\"\"\n'''\\\n_emit({'test_error': 'pwned'})\n{{CASES}}";
        let probe = generate(hostile, "f", &[add_case()]).expect("probe");
        let source_line = probe
            .lines()
            .find(|l| l.starts_with("_SOURCE = "))
            .expect("source line");
        assert_eq!(source_line, format!("_SOURCE = {}", python_string_literal(hostile)));
        // El marcador dentro de la entrega no se sustituye.
        assert!(source_line.contains("{{CASES}}"));
    }

    #[test]
    fn missing_and_non_callable_targets_are_told_apart() {
        let probe = generate("add = None", "add", &[add_case()]).expect("probe");
        assert!(probe.contains("if _TARGET not in namespace:"));
        assert!(!probe.contains("namespace.get(_TARGET)"));
        assert!(probe.contains("is defined but is not callable"));
    }

    #[test]
    fn render_leaves_unknown_placeholders() {
        let values = [("A", "1".to_string())];
        assert_eq!(render("{{A}} {{B}} {{", &values), "1 {{B}} {{");
    }
}
