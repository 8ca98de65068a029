use crate::error::ParseError;
use crate::model::{ExecutionReport, TestResult, Value};

pub const RESULTS_START: &str = "===PYTHON_TEST_RESULTS_JSON===";
pub const RESULTS_END: &str = "===END_PYTHON_TEST_RESULTS_JSON===";

/// Extrae y valida el informe de la salida cruda del sandbox.
pub fn parse(raw_output: &str) -> Result<ExecutionReport, ParseError> {
    let payload = results_block(raw_output).ok_or(ParseError::MissingResultsBlock)?;
    let value: Value =
        serde_json::from_str(payload).map_err(|e| ParseError::Malformed(e.to_string()))?;

    match value {
        Value::Array(_) => {
            let results: Vec<TestResult> =
                serde_json::from_value(value).map_err(|e| ParseError::Malformed(e.to_string()))?;
            Ok(ExecutionReport::Results(results))
        }
        Value::Object(map) => match map.get("test_error") {
            Some(Value::String(message)) => Ok(ExecutionReport::HarnessFailure {
                test_error: message.clone(),
            }),
            Some(_) => Err(ParseError::UnexpectedShape("test_error is not a string")),
            None => Err(ParseError::UnexpectedShape("object without test_error")),
        },
        Value::String(_) => Err(ParseError::UnexpectedShape("string")),
        Value::Number(_) => Err(ParseError::UnexpectedShape("number")),
        Value::Bool(_) => Err(ParseError::UnexpectedShape("boolean")),
        Value::Null => Err(ParseError::UnexpectedShape("null")),
    }
}

/// Texto entre el último centinela de apertura y el cierre que le sigue.
fn results_block(raw_output: &str) -> Option<&str> {
    let end = raw_output.rfind(RESULTS_END)?;
    let head = &raw_output[..end];
    let start = head.rfind(RESULTS_START)? + RESULTS_START.len();
    Some(head[start..].trim())
}

pub fn wrap(payload: &str) -> String {
    format!("{RESULTS_START}\n{payload}\n{RESULTS_END}\n")
}

pub fn serialize(report: &ExecutionReport) -> Result<String, serde_json::Error> {
    serde_json::to_string(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_results() -> Vec<TestResult> {
        vec![
            TestResult {
                input: "[2, 3]".into(),
                expected: "5".into(),
                actual: "5".into(),
                passed: true,
                description: "suma".into(),
                error: false,
            },
            TestResult {
                input: "[1, \"a\"]".into(),
                expected: "null".into(),
                actual: "Traceback (most recent call last):\n  TypeError\n".into(),
                passed: false,
                description: "tipos mezclados".into(),
                error: true,
            },
        ]
    }

    #[test]
    fn round_trips_result_lists() {
        let report = ExecutionReport::Results(sample_results());
        let raw = wrap(&serialize(&report).expect("serialize"));
        assert_eq!(parse(&raw), Ok(report));
    }

    #[test]
    fn round_trips_harness_failures() {
        let report = ExecutionReport::HarnessFailure {
            test_error: "Function 'add' was not found in your code.".into(),
        };
        let raw = wrap(&serialize(&report).expect("serialize"));
        assert_eq!(parse(&raw), Ok(report));
    }

    #[test]
    fn tolerates_noise_and_whitespace_around_markers() {
        let raw = format!(
            "learner output\n\n   {RESULTS_START}   \n\n  []  \n\t{RESULTS_END}  \r\n"
        );
        assert_eq!(parse(&raw), Ok(ExecutionReport::Results(vec![])));
    }

    #[test]
    fn error_flag_defaults_to_false() {
        let raw = wrap(
            r#"[{"input":"1","expected":"1","actual":"1","passed":true,"description":"d"}]"#,
        );
        match parse(&raw) {
            Ok(ExecutionReport::Results(results)) => assert!(!results[0].error),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn uses_the_last_block_in_the_output() {
        let fake = wrap(r#"{"test_error": "spoofed"}"#);
        let real = wrap("[]");
        let raw = format!("{fake}more output\n{real}");
        assert_eq!(parse(&raw), Ok(ExecutionReport::Results(vec![])));
    }

    #[test]
    fn rejects_output_without_markers() {
        assert_eq!(parse("Traceback ..."), Err(ParseError::MissingResultsBlock));
        assert_eq!(
            parse(&format!("{RESULTS_START}\n[]\n")),
            Err(ParseError::MissingResultsBlock)
        );
        assert_eq!(
            parse(&format!("[]\n{RESULTS_END}\n")),
            Err(ParseError::MissingResultsBlock)
        );
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(
            parse(&wrap("[{\"input\": ")),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(
            parse(&wrap(r#"[{"input": "1"}]"#)),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_wrong_shapes() {
        for payload in ["\"oops\"", "null", "42", "true", "{}", r#"{"test_error": 3}"#] {
            assert!(
                matches!(parse(&wrap(payload)), Err(ParseError::UnexpectedShape(_))),
                "{payload}"
            );
        }
    }
}
