//! Test case registry
//!
//! Suites are registered once, optionally filtered by id prefix, and run
//! concurrently up to a job limit. Cases inside one suite run strictly in
//! declaration order.

pub mod runner;
pub mod suite;

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};

use crate::chain::ContextProvider;
use crate::common::{Error, Result};

pub use runner::{CaseReport, CaseStatus, RunReport, RunSettings, SuiteReport, SuiteState};
pub use suite::{Suite, SuiteBuilder, TestCase, TestEnv};

/// Registered suites of one run
#[derive(Debug, Default)]
pub struct Registry {
    suites: Vec<Suite>,
    settings: RunSettings,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: RunSettings) -> Self {
        Self {
            suites: Vec::new(),
            settings,
        }
    }

    /// Register a suite; ids must be unique
    pub fn register(&mut self, suite: Suite) -> Result<()> {
        if self.suites.iter().any(|s| s.id() == suite.id()) {
            return Err(Error::InvalidInput(format!(
                "Suite {} is already registered",
                suite.id()
            )));
        }
        tracing::debug!(suite = %suite.id(), cases = suite.cases().len(), "Registered suite");
        self.suites.push(suite);
        Ok(())
    }

    pub fn suites(&self) -> &[Suite] {
        &self.suites
    }

    /// Keep suites and cases whose id starts with `pattern`
    ///
    /// `D01` keeps the whole suite `D01`; `D01T02` keeps only that case.
    pub fn filter(&mut self, pattern: &str) {
        self.suites.retain_mut(|suite| {
            if suite.id().starts_with(pattern) {
                true
            } else if pattern.starts_with(suite.id()) {
                suite.retain_cases(pattern);
                !suite.cases().is_empty()
            } else {
                false
            }
        });
    }

    /// Run every registered suite, at most `jobs` at a time
    ///
    /// Suite reports come back in registration order.
    pub async fn run(&self, provider: Arc<dyn ContextProvider>, jobs: usize) -> RunReport {
        let jobs = jobs.max(1);
        tracing::info!(suites = self.suites.len(), jobs, "Starting run");

        let settings = &self.settings;
        let suites = stream::iter(self.suites.iter())
            .map(|suite| {
                let provider = Arc::clone(&provider);
                async move { runner::run_suite(suite, provider.as_ref(), settings).await }
            })
            .buffered(jobs)
            .collect::<Vec<_>>()
            .await;

        RunReport { suites }
    }
}
