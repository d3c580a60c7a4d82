//! Test assertions for QA results and run outcomes.

use crate::core::QaStatus;
use crate::pipeline::RunOutcome;
use crate::qa::QaResult;

/// Asserts that the result has the expected overall status.
pub fn assert_status(result: &QaResult, expected: QaStatus) {
    assert_eq!(
        result.status, expected,
        "Expected {} to be {expected}, got {}. Metrics: {:?}",
        result.name, result.status, result.metrics
    );
}

/// Asserts that the result carries a metric with the expected value.
pub fn assert_metric(result: &QaResult, key: &str, expected: &serde_json::Value) {
    let actual = result.metric(key);
    assert_eq!(
        actual,
        Some(expected),
        "Expected {key} = {expected} in {}, got {actual:?}",
        result.name
    );
}

/// Asserts that the named check ran and returns its result.
pub fn assert_check_ran<'a>(outcome: &'a RunOutcome, check: &str) -> &'a QaResult {
    match outcome.qa_result(check) {
        Some(result) => result,
        None => panic!(
            "Expected check {check} to have run. Ran: {:?}",
            outcome.qa_results().map(|r| r.name.as_str()).collect::<Vec<_>>()
        ),
    }
}

/// Asserts that the schema has exactly these steps, in order.
pub fn assert_steps(outcome: &RunOutcome, expected: &[&str]) {
    let actual: Vec<&str> = outcome.schema.steps().iter().map(|s| s.step.as_str()).collect();
    assert_eq!(actual, expected, "Unexpected PIPELINE_STEPS");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_status_and_metric() {
        let mut result = QaResult::new("Check_HDUs").with_metric("CHECKHDUS", 3);
        result.set_status("CHECKHDUS_STATUS", QaStatus::Normal);

        assert_status(&result, QaStatus::Normal);
        assert_metric(&result, "CHECKHDUS", &serde_json::json!(3));
    }

    #[test]
    #[should_panic(expected = "Expected Check_HDUs to be ALARM")]
    fn test_assert_status_panics_on_mismatch() {
        assert_status(&QaResult::new("Check_HDUs"), QaStatus::Alarm);
    }
}
