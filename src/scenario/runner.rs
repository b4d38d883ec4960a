//! Turns scenario files into registry suites

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{json, Value};

use crate::assert::{assert_equal, assert_that, assert_throws, SnapshotStore};
use crate::chain::{BlockRef, BlockResult, CreateBlockOptions, StorageKeyArg};
use crate::common::{format_quantity, Error, Result};
use crate::registry::{Suite, TestCase, TestEnv};

use super::config::{parse_at, QueryExpectation, RpcExpectation, ScenarioFile, Step};

/// State shared by every step of one suite
#[derive(Debug)]
struct SuiteState {
    snapshots: SnapshotStore,
    last_block: Mutex<Option<BlockResult>>,
}

impl SuiteState {
    fn last_block(&self) -> Option<BlockResult> {
        self.last_block
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_last_block(&self, block: BlockResult) {
        *self.last_block.lock().unwrap_or_else(PoisonError::into_inner) = Some(block);
    }
}

/// Load and validate a scenario file
pub fn load_scenario(path: &Path) -> Result<ScenarioFile> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    ScenarioFile::from_yaml(&content).map_err(|e| match e {
        Error::Config(message) | Error::InvalidInput(message) => {
            Error::InvalidInput(format!("{}: {}", path.display(), message))
        }
        other => other,
    })
}

/// Build a registry suite from a scenario
pub fn into_suite(file: ScenarioFile, snapshots: SnapshotStore) -> Result<Suite> {
    let state = Arc::new(SuiteState {
        snapshots,
        last_block: Mutex::new(None),
    });

    let mut builder = Suite::builder(file.id.clone(), file.title.clone()).foundation(file.foundation);
    if let Some(network) = &file.network {
        builder = builder.network(network.clone());
    }
    if let Some(secs) = file.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    if !file.before_all.is_empty() {
        builder = builder.before_all(steps_body(file.before_all, &state));
    }
    if !file.before_each.is_empty() {
        builder = builder.before_each(steps_body(file.before_each, &state));
    }
    if !file.after_each.is_empty() {
        builder = builder.after_each(steps_body(file.after_each, &state));
    }
    if !file.after_all.is_empty() {
        builder = builder.after_all(steps_body(file.after_all, &state));
    }

    for test in file.tests {
        let mut steps = test.steps;
        if let Some(reason) = test.skip {
            steps = vec![Step::Skip { reason }];
        }
        let mut case = TestCase::new(test.id, test.title, steps_body(steps, &state));
        if let Some(secs) = test.timeout_secs {
            case = case.timeout(Duration::from_secs(secs));
        }
        builder = builder.case(case);
    }

    builder.build()
}

fn steps_body(
    steps: Vec<Step>,
    state: &Arc<SuiteState>,
) -> impl Fn(TestEnv) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static {
    let steps: Arc<[Step]> = steps.into();
    let state = Arc::clone(state);
    move |env: TestEnv| -> BoxFuture<'static, Result<()>> {
        let steps = Arc::clone(&steps);
        let state = Arc::clone(&state);
        Box::pin(async move {
            for (i, step) in steps.iter().enumerate() {
                tracing::debug!(
                    suite = %env.suite_id(),
                    case = env.case_id().unwrap_or("-"),
                    step = i + 1,
                    "Executing step"
                );
                execute_step(&env, step, &state)
                    .await
                    .map_err(|e| match e {
                        Error::Skipped(_) => e,
                        other => annotate(other, i + 1),
                    })?;
            }
            Ok(())
        })
    }
}

/// Prefix the step number to assertion messages
fn annotate(error: Error, step: usize) -> Error {
    match error {
        Error::Assertion(message) => Error::Assertion(format!("step {}: {}", step, message)),
        other => other,
    }
}

/// Replace `{last_block_hash}` / `{last_block_number}` params
fn substitute(params: &[Value], last: Option<&BlockResult>) -> Result<Vec<Value>> {
    params
        .iter()
        .map(|param| match param.as_str() {
            Some("{last_block_hash}") => last
                .map(|b| json!(b.hash))
                .ok_or_else(no_block_yet),
            Some("{last_block_number}") => last
                .map(|b| json!(format_quantity(u128::from(b.number))))
                .ok_or_else(no_block_yet),
            _ => Ok(param.clone()),
        })
        .collect()
}

fn no_block_yet() -> Error {
    Error::InvalidInput("No block has been created in this suite yet".to_string())
}

async fn execute_step(env: &TestEnv, step: &Step, state: &SuiteState) -> Result<()> {
    match step {
        Step::Rpc {
            method,
            params,
            endpoint,
            expect,
        } => {
            let rpc = match endpoint {
                Some(name) => env.rpc(name)?,
                None => env.default_rpc(),
            };
            let params = substitute(params, state.last_block().as_ref())?;
            let result = rpc.request(method, params).await;
            check_rpc(env, result, expect.as_ref(), state).await
        }

        Step::CreateBlock {
            extrinsics,
            allow_failures,
            expect_events,
            expect_failures,
        } => {
            let options = CreateBlockOptions {
                signer: None,
                allow_failures: *allow_failures || expect_failures.is_some(),
                expect_events: expect_events.clone(),
            };
            let block = env.create_block(extrinsics.clone(), options).await?;
            if let Some(expected) = expect_failures {
                let failed = block.extrinsics.iter().filter(|e| !e.success).count();
                assert_equal(failed, *expected)?;
            }
            state.set_last_block(block);
            Ok(())
        }

        Step::Query {
            pallet,
            item,
            keys,
            at,
            expect,
        } => {
            let keys = keys
                .iter()
                .map(|k| StorageKeyArg::parse(k))
                .collect::<Result<Vec<_>>>()?;
            let at = match at.as_deref() {
                None => None,
                Some(at) => match parse_at(at)? {
                    Some(block) => Some(block),
                    None => Some(
                        state
                            .last_block()
                            .map(|b| BlockRef::Hash(b.hash))
                            .ok_or_else(no_block_yet)?,
                    ),
                },
            };
            let value = env.query(pallet, item, &keys, at).await?;
            check_query(value.map(|v| v.as_hex()), expect.as_ref())
        }

        Step::Skip { reason } => Err(TestEnv::skip(reason.clone())),
    }
}

async fn check_rpc(
    env: &TestEnv,
    result: Result<Value>,
    expect: Option<&RpcExpectation>,
    state: &SuiteState,
) -> Result<()> {
    let Some(expect) = expect else {
        return result.map(|_| ());
    };

    if let Some(pattern) = expect.error_pattern() {
        return assert_throws(async { result }, &pattern).await.map(|_| ());
    }

    let value = result?;
    if let Some(expected) = &expect.result {
        assert_equal(&value, expected)?;
    }
    if let Some(name) = &expect.snapshot {
        // Names are only unique within one test
        let key = format!("{}_{}", env.case_id().unwrap_or(env.suite_id()), name);
        state.snapshots.assert_matches_snapshot(&value, &key)?;
    }
    Ok(())
}

fn check_query(actual: Option<String>, expect: Option<&QueryExpectation>) -> Result<()> {
    let Some(expect) = expect else {
        return Ok(());
    };
    if expect.none {
        assert_that(
            actual.is_none(),
            format!("expected no value, actual: {:?}", actual),
        )?;
    }
    if let Some(expected) = &expect.value {
        assert_equal(actual, Some(expected.to_lowercase()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainContext, StaticProvider};
    use crate::common::config::Config;
    use crate::mock;
    use crate::registry::{CaseStatus, Registry, RunSettings};
    use tempfile::TempDir;

    async fn registry_for(yaml: &str, snapshots: &Path) -> (Registry, StaticProvider) {
        registry_for_all(&[yaml], snapshots).await
    }

    async fn registry_for_all(yamls: &[&str], snapshots: &Path) -> (Registry, StaticProvider) {
        let (addr, _server) = mock::spawn_local().await.unwrap();
        let config = Config::from_toml_str(&format!(
            "[networks.scn]\nendpoints = {{ para = \"http://{}\" }}\n",
            addr
        ))
        .unwrap();
        let context = ChainContext::connect(&config.network("scn").unwrap())
            .await
            .unwrap();

        let mut registry = Registry::with_settings(RunSettings {
            default_timeout: Duration::from_secs(10),
            print: false,
        });
        for yaml in yamls {
            let file = ScenarioFile::from_yaml(yaml).unwrap();
            let suite = into_suite(file, SnapshotStore::new(snapshots, false)).unwrap();
            registry.register(suite).unwrap();
        }
        (registry, StaticProvider::new(Arc::new(context)))
    }

    fn yaml_with(steps: &str) -> String {
        format!(
            "id: S01\ntitle: scenario\ntests:\n  - id: T01\n    title: case\n    steps:\n{}",
            steps
        )
    }

    #[tokio::test]
    async fn test_transaction_index_scenario() {
        let transfer = mock::tx::transfer(mock::DEV_ACCOUNTS[0], mock::DEV_ACCOUNTS[1], 0).encode();
        let yaml = yaml_with(&format!(
            r#"      - action: create_block
        extrinsics:
          - ethereum: "{}"
        expect_events: [ethereum.Executed, system.ExtrinsicSuccess]
      - action: rpc
        method: eth_getTransactionByBlockNumberAndIndex
        params: ["{{last_block_number}}", "0x0"]
      - action: rpc
        method: eth_getTransactionByBlockNumberAndIndex
        params: ["{{last_block_number}}", "0x1"]
        expect:
          error_matches: "1 is out of bounds"
      - action: rpc
        method: eth_compileSolidity
        params: ["contract Test {{}}"]
        expect:
          error_contains: Method not found
"#,
            transfer
        ));
        let dir = TempDir::new().unwrap();
        let (registry, provider) = registry_for(&yaml, dir.path()).await;
        let report = registry.run(Arc::new(provider), 1).await;
        assert!(report.passed(), "{:?}", report.suites[0].cases);
    }

    #[tokio::test]
    async fn test_wrong_result_reports_step_and_values() {
        let yaml = yaml_with(
            r#"      - action: rpc
        method: eth_blockNumber
        expect:
          result: "0x5"
"#,
        );
        let dir = TempDir::new().unwrap();
        let (registry, provider) = registry_for(&yaml, dir.path()).await;
        let report = registry.run(Arc::new(provider), 1).await;
        let CaseStatus::Failed(message) = &report.suites[0].cases[0].status else {
            panic!("expected failure, got {:?}", report.suites[0].cases[0].status);
        };
        assert!(message.contains("step 1"), "{message}");
        assert!(message.contains("0x5") && message.contains("0x0"), "{message}");
    }

    #[tokio::test]
    async fn test_query_at_last_block_and_snapshot() {
        let set = mock::tx::set_storage("Harness", "Flag", "0x01").encode();
        let yaml = yaml_with(&format!(
            r#"      - action: create_block
        extrinsics:
          - substrate: "{}"
      - action: query
        pallet: Harness
        item: Flag
        at: last
        expect:
          value: "0x01"
      - action: query
        pallet: Harness
        item: Missing
        expect:
          none: true
      - action: rpc
        method: system_health
        expect:
          snapshot: health
"#,
            set
        ));
        let dir = TempDir::new().unwrap();
        let (registry, provider) = registry_for(&yaml, dir.path()).await;
        let report = registry.run(Arc::new(provider), 1).await;
        assert!(report.passed(), "{:?}", report.suites[0].cases);
        assert!(dir.path().join("S01T01_health.json").exists());
    }

    #[tokio::test]
    async fn test_snapshot_names_are_scoped_per_test() {
        let suite = |id: &str, method: &str| {
            format!(
                "id: {}\ntitle: t\ntests:\n  - id: T01\n    title: c\n    steps:\n      - action: rpc\n        method: {}\n        expect:\n          snapshot: value\n",
                id, method
            )
        };
        let (a, b) = (suite("A01", "eth_chainId"), suite("B01", "system_name"));
        let dir = TempDir::new().unwrap();

        // First run records, second run compares
        for _ in 0..2 {
            let (registry, provider) = registry_for_all(&[&a, &b], dir.path()).await;
            let report = registry.run(Arc::new(provider), 1).await;
            for suite in &report.suites {
                assert!(suite.passed(), "{}: {:?}", suite.id, suite.cases);
            }
        }

        let read = |name: &str| std::fs::read_to_string(dir.path().join(name)).unwrap();
        assert!(read("A01T01_value.json").contains("0x501"));
        assert!(read("B01T01_value.json").contains("mock-node"));
    }

    #[tokio::test]
    async fn test_skip_and_expected_failures() {
        let failing = mock::tx::failing(mock::DEV_ACCOUNTS[0]).encode();
        let yaml = format!(
            r#"id: S02
title: skips
tests:
  - id: T01
    title: skipped by flag
    skip: relay chain not available
  - id: T02
    title: failing extrinsic is reported
    steps:
      - action: create_block
        extrinsics:
          - ethereum: "{}"
        expect_failures: 1
"#,
            failing
        );
        let dir = TempDir::new().unwrap();
        let (registry, provider) = registry_for(&yaml, dir.path()).await;
        let report = registry.run(Arc::new(provider), 1).await;
        let cases = &report.suites[0].cases;
        assert_eq!(
            cases[0].status,
            CaseStatus::Skipped("relay chain not available".to_string())
        );
        assert_eq!(cases[1].status, CaseStatus::Passed);
    }

    #[test]
    fn test_substitute_without_block() {
        let err = substitute(&[json!("{last_block_hash}")], None).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(substitute(&[json!(1)], None).unwrap(), vec![json!(1)]);
    }
}
