//! Suite runner
//!
//! Moves each suite through `Registered -> Running -> Completed`: the
//! context is acquired, before_all hooks run, then every case runs with its
//! before_each/after_each hooks, then after_all hooks run and the context
//! is released. Cases inside a suite never overlap.

use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;

use crate::chain::{ChainContext, ContextProvider};
use crate::common::config::Foundation;
use crate::common::Error;

use super::suite::{Body, Suite, TestCase, TestEnv};

/// Where a suite is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteState {
    Registered,
    Running,
    Completed,
}

/// Final status of one test case
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseStatus {
    Passed,
    Failed(String),
    Skipped(String),
    /// Body exceeded its timeout (seconds) and was aborted
    TimedOut(u64),
}

impl CaseStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, CaseStatus::Failed(_) | CaseStatus::TimedOut(_))
    }
}

/// Result of one test case
#[derive(Debug, Clone)]
pub struct CaseReport {
    /// Full id, e.g. `D0101T01`
    pub id: String,
    pub title: String,
    pub status: CaseStatus,
    pub duration: Duration,
}

/// Result of one suite
#[derive(Debug, Clone)]
pub struct SuiteReport {
    pub id: String,
    pub title: String,
    pub foundation: Foundation,
    pub state: SuiteState,
    pub cases: Vec<CaseReport>,
    /// Failures of hooks that are not attributed to one case
    pub hook_failures: Vec<String>,
    pub duration: Duration,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.hook_failures.is_empty() && !self.cases.iter().any(|c| c.status.is_failure())
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub suites: Vec<SuiteReport>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.suites.iter().all(SuiteReport::passed)
    }

    /// (passed, failed, skipped) case counts
    pub fn counts(&self) -> (usize, usize, usize) {
        let cases = self.suites.iter().flat_map(|s| s.cases.iter());
        let mut counts = (0, 0, 0);
        for case in cases {
            match case.status {
                CaseStatus::Passed => counts.0 += 1,
                CaseStatus::Failed(_) | CaseStatus::TimedOut(_) => counts.1 += 1,
                CaseStatus::Skipped(_) => counts.2 += 1,
            }
        }
        counts
    }

    /// Failures with suite, case and message
    pub fn failures(&self) -> Vec<(&SuiteReport, Option<&CaseReport>, String)> {
        let mut failures = Vec::new();
        for suite in &self.suites {
            for hook in &suite.hook_failures {
                failures.push((suite, None, hook.clone()));
            }
            for case in &suite.cases {
                match &case.status {
                    CaseStatus::Failed(message) => failures.push((suite, Some(case), message.clone())),
                    CaseStatus::TimedOut(secs) => failures.push((
                        suite,
                        Some(case),
                        Error::Timeout(*secs).to_string(),
                    )),
                    _ => {}
                }
            }
        }
        failures
    }

    pub fn print_summary(&self) {
        let (passed, failed, skipped) = self.counts();

        let failures = self.failures();
        if !failures.is_empty() {
            println!("\n{}", "Failures:".red().bold());
            for (suite, case, message) in failures {
                match case {
                    Some(case) => println!(
                        "  {} {} {}\n      {}",
                        "✗".red(),
                        case.id.bold(),
                        case.title,
                        message.red()
                    ),
                    None => println!(
                        "  {} {} {}\n      {}",
                        "✗".red(),
                        suite.id.bold(),
                        "(hook)".dimmed(),
                        message.red()
                    ),
                }
            }
        }

        let summary = format!(
            "{} passed, {} failed, {} skipped ({} suites)",
            passed,
            failed,
            skipped,
            self.suites.len()
        );
        if self.passed() {
            println!("\n{} {}\n", "✓".green().bold(), summary.green().bold());
        } else {
            println!("\n{} {}\n", "✗".red().bold(), summary.red().bold());
        }
    }
}

/// Settings shared by every suite of a run
#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    /// Case timeout when neither the case nor the suite sets one
    pub default_timeout: Duration,
    /// Print a line per case as it finishes
    pub print: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(120),
            print: true,
        }
    }
}

enum BodyOutcome {
    Ok,
    Err(Error),
    Panicked(String),
    TimedOut,
}

/// Run a body in its own task, aborting it when the timeout elapses
async fn run_bounded(body: &Body, env: TestEnv, timeout: Duration) -> BodyOutcome {
    let mut handle = tokio::spawn(body(env));
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(Ok(()))) => BodyOutcome::Ok,
        Ok(Ok(Err(e))) => BodyOutcome::Err(e),
        Ok(Err(join)) => BodyOutcome::Panicked(panic_message(join)),
        Err(_) => {
            handle.abort();
            BodyOutcome::TimedOut
        }
    }
}

/// The message a task panicked with, when it is a string
fn panic_message(join: tokio::task::JoinError) -> String {
    if !join.is_panic() {
        return join.to_string();
    }
    let payload = join.into_panic();
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Why a hook list stopped early
#[derive(Debug)]
enum HookStop {
    /// A hook asked for the affected cases to be skipped
    Skipped(String),
    Failed(String),
}

/// Run a list of hooks in order, stopping at the first failure or skip
async fn run_hooks(
    hooks: &[Body],
    env: &TestEnv,
    timeout: Duration,
    kind: &str,
) -> Result<(), HookStop> {
    for (i, hook) in hooks.iter().enumerate() {
        let failure = match run_bounded(hook, env.clone(), timeout).await {
            BodyOutcome::Ok => continue,
            BodyOutcome::Err(Error::Skipped(reason)) => return Err(HookStop::Skipped(reason)),
            BodyOutcome::Err(e) => e.to_string(),
            BodyOutcome::Panicked(p) => format!("panicked: {}", p),
            BodyOutcome::TimedOut => Error::Timeout(timeout.as_secs()).to_string(),
        };
        return Err(HookStop::Failed(format!(
            "{} hook #{} failed: {}",
            kind,
            i + 1,
            failure
        )));
    }
    Ok(())
}

fn print_case(report: &CaseReport) {
    let elapsed = format!("({:.2}s)", report.duration.as_secs_f64()).dimmed();
    match &report.status {
        CaseStatus::Passed => println!(
            "  {} {} {} {}",
            "✓".green(),
            report.id,
            report.title,
            elapsed
        ),
        CaseStatus::Skipped(reason) => println!(
            "  {} {} {} {}",
            "-".yellow(),
            report.id,
            report.title,
            format!("skipped: {}", reason).yellow()
        ),
        CaseStatus::Failed(message) => println!(
            "  {} {} {} {}\n      {}",
            "✗".red(),
            report.id,
            report.title,
            elapsed,
            message.red()
        ),
        CaseStatus::TimedOut(secs) => println!(
            "  {} {} {} {}",
            "✗".red(),
            report.id,
            report.title,
            format!("timed out after {}s", secs).red()
        ),
    }
}

async fn run_case(
    suite: &Suite,
    case: &TestCase,
    context: &Arc<ChainContext>,
    settings: &RunSettings,
) -> CaseReport {
    let started = Instant::now();
    let id = suite.full_case_id(case);
    let env = TestEnv::new(Arc::clone(context), suite.id(), Some(&id));
    let timeout = case
        .timeout
        .or(suite.timeout())
        .unwrap_or(settings.default_timeout);

    tracing::debug!(case = %id, timeout_secs = timeout.as_secs(), "Running test case");

    let mut status = match run_hooks(&suite.hooks.before_each, &env, timeout, "before_each").await {
        Err(HookStop::Skipped(reason)) => CaseStatus::Skipped(reason),
        Err(HookStop::Failed(message)) => CaseStatus::Failed(message),
        Ok(()) => match run_bounded(&case.body, env.clone(), timeout).await {
            BodyOutcome::Ok => CaseStatus::Passed,
            BodyOutcome::Err(Error::Skipped(reason)) => CaseStatus::Skipped(reason),
            BodyOutcome::Err(e) => CaseStatus::Failed(e.to_string()),
            BodyOutcome::Panicked(p) => CaseStatus::Failed(format!("panicked: {}", p)),
            BodyOutcome::TimedOut => CaseStatus::TimedOut(timeout.as_secs()),
        },
    };

    match run_hooks(&suite.hooks.after_each, &env, timeout, "after_each").await {
        Ok(()) => {}
        Err(HookStop::Skipped(reason)) => {
            tracing::debug!(case = %id, %reason, "after_each skipped");
        }
        Err(HookStop::Failed(message)) if !status.is_failure() => {
            status = CaseStatus::Failed(message);
        }
        Err(HookStop::Failed(message)) => {
            tracing::warn!(case = %id, %message, "after_each failed after a failing case");
        }
    }

    let report = CaseReport {
        id,
        title: case.title.clone(),
        status,
        duration: started.elapsed(),
    };
    tracing::debug!(case = %report.id, status = ?report.status, "Test case finished");
    report
}

/// Run one suite to completion
pub async fn run_suite(
    suite: &Suite,
    provider: &dyn ContextProvider,
    settings: &RunSettings,
) -> SuiteReport {
    let started = Instant::now();
    let mut report = SuiteReport {
        id: suite.id().to_string(),
        title: suite.title().to_string(),
        foundation: suite.foundation(),
        state: SuiteState::Registered,
        cases: Vec::new(),
        hook_failures: Vec::new(),
        duration: Duration::ZERO,
    };

    if settings.print {
        println!(
            "\n{} {} {} {}",
            "Running Suite:".blue().bold(),
            suite.id().white().bold(),
            suite.title(),
            format!("[{}]", suite.foundation()).dimmed()
        );
    }

    report.state = SuiteState::Running;
    tracing::info!(suite = %suite.id(), foundation = %suite.foundation(), "Suite started");

    let settle_all = |report: &mut SuiteReport, status: CaseStatus| {
        for case in suite.cases() {
            let case_report = CaseReport {
                id: suite.full_case_id(case),
                title: case.title.clone(),
                status: status.clone(),
                duration: Duration::ZERO,
            };
            if settings.print {
                print_case(&case_report);
            }
            report.cases.push(case_report);
        }
    };

    let context = match provider.acquire(&suite.meta()).await {
        Ok(context) => context,
        Err(e) => {
            let message = format!("Chain context unavailable: {}", e);
            tracing::error!(suite = %suite.id(), error = %e, "Could not acquire chain context");
            settle_all(&mut report, CaseStatus::Failed(message));
            report.state = SuiteState::Completed;
            report.duration = started.elapsed();
            return report;
        }
    };

    let hook_timeout = suite.timeout().unwrap_or(settings.default_timeout);
    let suite_env = TestEnv::new(Arc::clone(&context), suite.id(), None);

    match run_hooks(&suite.hooks.before_all, &suite_env, hook_timeout, "before_all").await {
        Err(HookStop::Skipped(reason)) => settle_all(&mut report, CaseStatus::Skipped(reason)),
        Err(HookStop::Failed(message)) => settle_all(&mut report, CaseStatus::Failed(message)),
        Ok(()) => {
            for case in suite.cases() {
                let case_report = run_case(suite, case, &context, settings).await;
                if settings.print {
                    print_case(&case_report);
                }
                report.cases.push(case_report);
            }
        }
    }

    match run_hooks(&suite.hooks.after_all, &suite_env, hook_timeout, "after_all").await {
        Ok(()) => {}
        Err(HookStop::Skipped(reason)) => {
            tracing::debug!(suite = %suite.id(), %reason, "after_all skipped");
        }
        Err(HookStop::Failed(message)) => {
            if settings.print {
                println!("  {} {}", "✗".red(), message.red());
            }
            report.hook_failures.push(message);
        }
    }

    drop(suite_env);
    provider.release(context).await;

    report.state = SuiteState::Completed;
    report.duration = started.elapsed();
    tracing::info!(
        suite = %suite.id(),
        passed = report.passed(),
        elapsed_ms = report.duration.as_millis() as u64,
        "Suite completed"
    );
    report
}
