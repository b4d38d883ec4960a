//! Suites, test cases and hooks

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::chain::{ChainContext, SuiteMeta};
use crate::common::config::Foundation;
use crate::common::{Error, Result};

/// Async body shared by test cases and hooks
pub type Body = Arc<dyn Fn(TestEnv) -> BoxFuture<'static, Result<()>> + Send + Sync>;

fn boxed<F, Fut>(f: F) -> Body
where
    F: Fn(TestEnv) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |env| Box::pin(f(env)))
}

/// What a test body or hook receives
///
/// Derefs to the suite's [`ChainContext`].
#[derive(Clone, Debug)]
pub struct TestEnv {
    context: Arc<ChainContext>,
    suite_id: Arc<str>,
    case_id: Option<Arc<str>>,
}

impl TestEnv {
    pub(crate) fn new(context: Arc<ChainContext>, suite_id: &str, case_id: Option<&str>) -> Self {
        Self {
            context,
            suite_id: suite_id.into(),
            case_id: case_id.map(Into::into),
        }
    }

    pub fn context(&self) -> &Arc<ChainContext> {
        &self.context
    }

    pub fn suite_id(&self) -> &str {
        &self.suite_id
    }

    /// Full id of the running case (`D0101T01`); `None` inside suite hooks
    pub fn case_id(&self) -> Option<&str> {
        self.case_id.as_deref()
    }

    /// Error that ends the current case as skipped
    pub fn skip(reason: impl Into<String>) -> Error {
        Error::Skipped(reason.into())
    }
}

impl Deref for TestEnv {
    type Target = ChainContext;

    fn deref(&self) -> &ChainContext {
        &self.context
    }
}

/// One test case of a suite
#[derive(Clone)]
pub struct TestCase {
    pub id: String,
    pub title: String,
    /// Overrides the suite timeout
    pub timeout: Option<Duration>,
    pub(crate) body: Body,
}

impl TestCase {
    pub fn new<F, Fut>(id: impl Into<String>, title: impl Into<String>, body: F) -> Self
    where
        F: Fn(TestEnv) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            id: id.into(),
            title: title.into(),
            timeout: None,
            body: boxed(body),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Hook lists, each run in declaration order
#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) before_all: Vec<Body>,
    pub(crate) before_each: Vec<Body>,
    pub(crate) after_each: Vec<Body>,
    pub(crate) after_all: Vec<Body>,
}

/// A registered suite; immutable once built
#[derive(Clone)]
pub struct Suite {
    id: String,
    title: String,
    foundation: Foundation,
    network: Option<String>,
    timeout: Option<Duration>,
    pub(crate) hooks: Hooks,
    pub(crate) cases: Vec<TestCase>,
}

impl std::fmt::Debug for Suite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suite")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("foundation", &self.foundation)
            .field("cases", &self.cases)
            .finish()
    }
}

impl Suite {
    pub fn builder(id: impl Into<String>, title: impl Into<String>) -> SuiteBuilder {
        SuiteBuilder {
            id: id.into(),
            title: title.into(),
            foundation: Foundation::Dev,
            network: None,
            timeout: None,
            hooks: Hooks::default(),
            cases: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn foundation(&self) -> Foundation {
        self.foundation
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Full id of one of this suite's cases
    pub fn full_case_id(&self, case: &TestCase) -> String {
        format!("{}{}", self.id, case.id)
    }

    pub fn meta(&self) -> SuiteMeta {
        SuiteMeta {
            id: self.id.clone(),
            foundation: self.foundation,
            network: self.network.clone(),
        }
    }

    /// Keep only the cases whose full id starts with `prefix`
    pub(crate) fn retain_cases(&mut self, prefix: &str) {
        let id = self.id.clone();
        self.cases
            .retain(|case| format!("{}{}", id, case.id).starts_with(prefix));
    }
}

/// Builder for [`Suite`]
pub struct SuiteBuilder {
    id: String,
    title: String,
    foundation: Foundation,
    network: Option<String>,
    timeout: Option<Duration>,
    hooks: Hooks,
    cases: Vec<TestCase>,
}

impl SuiteBuilder {
    pub fn foundation(mut self, foundation: Foundation) -> Self {
        self.foundation = foundation;
        self
    }

    /// Run on this network instead of the run's default
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Default timeout for every case of the suite
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn before_all<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(TestEnv) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hooks.before_all.push(boxed(hook));
        self
    }

    pub fn before_each<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(TestEnv) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hooks.before_each.push(boxed(hook));
        self
    }

    pub fn after_each<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(TestEnv) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hooks.after_each.push(boxed(hook));
        self
    }

    pub fn after_all<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(TestEnv) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.hooks.after_all.push(boxed(hook));
        self
    }

    pub fn case(mut self, case: TestCase) -> Self {
        self.cases.push(case);
        self
    }

    /// Shorthand for `case(TestCase::new(..))`
    pub fn test<F, Fut>(self, id: impl Into<String>, title: impl Into<String>, body: F) -> Self
    where
        F: Fn(TestEnv) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.case(TestCase::new(id, title, body))
    }

    pub fn build(self) -> Result<Suite> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidInput("Suite id must not be empty".to_string()));
        }
        for (i, case) in self.cases.iter().enumerate() {
            if case.id.trim().is_empty() {
                return Err(Error::InvalidInput(format!(
                    "Suite {}: test case #{} has an empty id",
                    self.id,
                    i + 1
                )));
            }
            if self.cases[..i].iter().any(|other| other.id == case.id) {
                return Err(Error::InvalidInput(format!(
                    "Suite {}: duplicate test case id {}",
                    self.id, case.id
                )));
            }
        }

        Ok(Suite {
            id: self.id,
            title: self.title,
            foundation: self.foundation,
            network: self.network,
            timeout: self.timeout,
            hooks: self.hooks,
            cases: self.cases,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_cases_in_order() {
        let suite = Suite::builder("D0101", "Balance")
            .foundation(Foundation::ReadOnly)
            .timeout(Duration::from_secs(5))
            .test("T01", "first", |_| async { Ok(()) })
            .case(TestCase::new("T02", "second", |_| async { Ok(()) }).timeout(Duration::from_secs(1)))
            .build()
            .unwrap();

        assert_eq!(suite.id(), "D0101");
        assert_eq!(suite.foundation(), Foundation::ReadOnly);
        let ids: Vec<_> = suite.cases().iter().map(|c| suite.full_case_id(c)).collect();
        assert_eq!(ids, vec!["D0101T01", "D0101T02"]);
        assert_eq!(suite.cases()[1].timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_builder_rejects_duplicate_case_ids() {
        let err = Suite::builder("D01", "dup")
            .test("T01", "a", |_| async { Ok(()) })
            .test("T01", "b", |_| async { Ok(()) })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_builder_rejects_empty_id() {
        assert!(Suite::builder("  ", "nameless").build().is_err());
    }

    #[test]
    fn test_retain_cases_by_prefix() {
        let mut suite = Suite::builder("D01", "filter")
            .test("T01", "a", |_| async { Ok(()) })
            .test("T02", "b", |_| async { Ok(()) })
            .build()
            .unwrap();
        suite.retain_cases("D01T02");
        assert_eq!(suite.cases().len(), 1);
        assert_eq!(suite.cases()[0].id, "T02");
    }

    #[test]
    fn test_skip_error() {
        assert!(matches!(TestEnv::skip("no relay"), Error::Skipped(r) if r == "no relay"));
    }
}
