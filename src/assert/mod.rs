//! Assertions used by test bodies
//!
//! Every assertion returns `Result<()>` so bodies can use `?`; a failure is
//! an [`Error::Assertion`] that fails the current case only.

pub mod snapshot;

use std::fmt::Debug;
use std::future::Future;

use regex::Regex;

use crate::common::{Error, Result};

pub use snapshot::SnapshotStore;

/// Fail unless `actual == expected`; the message shows both values
pub fn assert_equal<A, E>(actual: A, expected: E) -> Result<()>
where
    A: PartialEq<E> + Debug,
    E: Debug,
{
    if actual == expected {
        Ok(())
    } else {
        Err(Error::mismatch(expected, actual))
    }
}

/// Fail unless `condition` holds
pub fn assert_that(condition: bool, message: impl Into<String>) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::Assertion(message.into()))
    }
}

/// Await an operation that must fail with an error matching `pattern`
///
/// `pattern` is a regular expression searched in the error's display text,
/// so a plain substring such as `"out of bounds"` works as well. Returns
/// the error so callers can inspect it further.
pub async fn assert_throws<T, F>(operation: F, pattern: &str) -> Result<Error>
where
    T: Debug,
    F: Future<Output = Result<T>>,
{
    let matcher = Regex::new(pattern)
        .map_err(|e| Error::InvalidInput(format!("Invalid error pattern '{}': {}", pattern, e)))?;

    match operation.await {
        Ok(value) => Err(Error::Assertion(format!(
            "expected failure but succeeded with {:?}",
            value
        ))),
        Err(error) => {
            let message = error.to_string();
            if matcher.is_match(&message) {
                Ok(error)
            } else {
                Err(Error::Assertion(format!(
                    "expected error matching /{}/, actual: {}",
                    pattern, message
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assert_equal() {
        assert!(assert_equal(3u64, 3u64).is_ok());
        let err = assert_equal("1000", "999").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Assertion failed: expected: \"999\", actual: \"1000\""
        );
    }

    #[tokio::test]
    async fn test_assert_throws_matches_message() {
        let failing = async { Err::<(), _>(Error::rpc(-32601, "Method not found")) };
        let err = assert_throws(failing, "Method not found").await.unwrap();
        assert!(matches!(err, Error::Rpc { code: -32601, .. }));
    }

    #[tokio::test]
    async fn test_assert_throws_regex() {
        let failing = async {
            Err::<(), _>(Error::rpc(-32603, "out of bounds index 1"))
        };
        assert!(assert_throws(failing, r"out of bounds .*\b1\b").await.is_ok());
    }

    #[tokio::test]
    async fn test_assert_throws_on_success() {
        let err = assert_throws(async { Ok::<_, Error>(5) }, "anything")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expected failure but succeeded"));
    }

    #[tokio::test]
    async fn test_assert_throws_wrong_message() {
        let failing = async { Err::<(), _>(Error::Transport("connection refused".into())) };
        let err = assert_throws(failing, "Method not found").await.unwrap_err();
        assert!(matches!(err, Error::Assertion(ref m) if m.contains("connection refused")));
    }

    #[tokio::test]
    async fn test_assert_throws_bad_pattern() {
        let failing = async { Err::<(), _>(Error::Internal("x".into())) };
        assert!(matches!(
            assert_throws(failing, "(").await,
            Err(Error::InvalidInput(_))
        ));
    }
}
