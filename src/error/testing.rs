#[cfg(test)]
/// # Panics
/// Panics if the result is `Ok` (operation succeeded when error was expected).
pub fn assert_error_sqlstate<T>(
    result: crate::DistResult<T>,
    expected_sqlstate: &str,
) {
    match result {
        Err(e) => {
            assert_eq!(
                e.sqlstate(),
                expected_sqlstate,
                "Expected SQLSTATE {expected_sqlstate}, got {}: {e}",
                e.sqlstate()
            );
        }
        Ok(_) => {
            panic!("Expected error with SQLSTATE {expected_sqlstate}, but operation succeeded");
        }
    }
}

#[cfg(test)]
/// # Panics
/// Panics if the result is `Ok` (operation succeeded when error was expected).
pub fn assert_error_contains<T>(
    result: crate::DistResult<T>,
    expected_substring: &str,
) {
    match result {
        Err(e) => {
            let message = e.to_string();
            assert!(
                message.contains(expected_substring),
                "Error message '{message}' does not contain '{expected_substring}'"
            );
        }
        Ok(_) => {
            panic!("Expected error containing '{expected_substring}', but operation succeeded");
        }
    }
}

#[cfg(test)]
/// Assert that a propagation failed on `expected_node` with the given remote SQLSTATE
///
/// # Panics
/// Panics unless the result is a `RemoteExecutionFailed` for that node.
pub fn assert_remote_failure_on<T: std::fmt::Debug>(
    result: crate::DistResult<T>,
    expected_node: &str,
    expected_sqlstate: Option<&str>,
) {
    match result {
        Err(crate::DistError::RemoteExecutionFailed { node, sqlstate, .. }) => {
            assert_eq!(node, expected_node, "failure reported for the wrong node");
            assert_eq!(sqlstate.as_deref(), expected_sqlstate);
        }
        other => panic!("Expected a remote failure on {expected_node}, got {other:?}"),
    }
}

#[cfg(test)]
/// Assert that an error is reported as a WARNING, not an ERROR
///
/// # Panics
/// Panics if `error` is not a warning or its SQLSTATE is outside class 01.
pub fn assert_warning(error: &crate::DistError) {
    assert!(error.is_warning(), "Expected a warning, got {error}");
    assert!(
        error.sqlstate().starts_with("01"),
        "Warning {error} carries non-warning SQLSTATE {}",
        error.sqlstate()
    );
}
