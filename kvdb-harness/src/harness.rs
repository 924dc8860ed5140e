// Copyright (c) The kvdb-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Environment setup, sequential test execution, and teardown.
//!
//! The harness drives an external kvdb engine CLI and a list of precompiled
//! test executables. Everything runs strictly one after another in a single
//! thread; each step's combined stdout and stderr goes to its own log file in
//! the working directory (`setup.out`, `<test>.out`, `teardown.out`, truncated
//! at the start of each run).

use crate::{
    errors::HarnessError,
    parse::parse_output,
    store::RunSnapshot,
};
use camino::{Utf8Path, Utf8PathBuf};
use duct::cmd;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    process::ExitStatus,
};
use tracing::{debug, info, warn};

/// Environment variable through which test executables receive the kvdb home
/// directory.
pub const KVDB_HOME_ENV: &str = "KVDB_UT_HOME";

/// The storage-engine unit tests run when no explicit list is configured.
pub const DEFAULT_TESTS: &[&str] = &[
    "storage_kvdb_engine_test",
    "storage_kvdb_index_test",
    "storage_kvdb_record_store_test",
    "storage_kvdb_test",
];

const SETUP_LOG: &str = "setup.out";
const TEARDOWN_LOG: &str = "teardown.out";

/// Per-test failure sets, keyed by test name.
pub type TestResults = BTreeMap<String, BTreeSet<String>>;

/// Immutable configuration for a harness run.
///
/// Built once at startup and passed explicitly to every operation; nothing in
/// the harness holds process-wide state.
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    /// Build identifier the results snapshot is keyed by.
    pub build_number: String,

    /// Path to the kvdb engine CLI.
    pub engine_path: Utf8PathBuf,

    /// Home directory of the kvdb instance under test.
    pub kvdb_home: Utf8PathBuf,

    /// Directory holding the test executables, their logs, and the snapshot.
    pub working_dir: Utf8PathBuf,

    /// Test executables to run, in order.
    pub test_names: Vec<String>,
}

impl HarnessConfig {
    /// Creates a new configuration. An empty `test_names` list selects
    /// [`DEFAULT_TESTS`].
    pub fn new(
        build_number: String,
        engine_path: Utf8PathBuf,
        kvdb_home: Utf8PathBuf,
        working_dir: Utf8PathBuf,
        test_names: Vec<String>,
    ) -> Self {
        let test_names = if test_names.is_empty() {
            DEFAULT_TESTS.iter().map(|name| (*name).to_owned()).collect()
        } else {
            test_names
        };
        Self {
            build_number,
            engine_path,
            kvdb_home,
            working_dir,
            test_names,
        }
    }
}

/// Outcome of a full harness run.
#[derive(Clone, Debug)]
pub struct SuiteOutcome {
    /// Sum of the per-test exit codes. Zero only when every test passed.
    pub exit_status: i32,

    /// Per-test failing sub-test identifiers.
    pub results: TestResults,

    /// Where the results snapshot was written.
    pub snapshot_path: Utf8PathBuf,
}

impl SuiteOutcome {
    /// Whether the environment should be torn down. A failed environment is
    /// left in place for inspection.
    pub fn should_teardown(&self) -> bool {
        self.exit_status == 0
    }
}

/// Returns the log file a test's combined output is written to.
pub fn test_output_path(working_dir: &Utf8Path, test_name: &str) -> Utf8PathBuf {
    working_dir.join(format!("{test_name}.out"))
}

/// Verifies that every configured test executable exists as a file under the
/// working directory, collecting all missing names before failing.
///
/// This is the fail-fast gate: nothing has side effects until it passes.
pub fn check_for_tests(config: &HarnessConfig) -> Result<(), HarnessError> {
    let missing: Vec<String> = config
        .test_names
        .iter()
        .filter(|name| !config.working_dir.join(name).is_file())
        .cloned()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(HarnessError::MissingTests { missing })
    }
}

/// Prepares the kvdb environment, logging to `setup.out`.
///
/// Drops any leftover instance and recreates its home directory on a best
/// effort basis, then creates a fresh instance. Only the create step's exit
/// code matters: it is the return value, and non-zero means the run must not
/// proceed.
pub fn setup(config: &HarnessConfig) -> Result<i32, HarnessError> {
    let log = create_log(&config.working_dir.join(SETUP_LOG))?;

    // Both of these are expected to fail on a first-ever run.
    match engine_cmd(config, "drop", &log)?.run() {
        Ok(output) => debug!("drop exited with {}", exit_code(output.status)),
        Err(error) => debug!("ignoring failed drop of previous instance: {error}"),
    }
    if let Err(error) = fs_err::create_dir_all(&config.kvdb_home) {
        debug!("ignoring failed mkdir of {}: {error}", config.kvdb_home);
    }

    let output = engine_cmd(config, "create", &log)?
        .run()
        .map_err(|error| HarnessError::EngineExec {
            command: engine_command_line(config, "create"),
            error,
        })?;
    Ok(exit_code(output.status))
}

/// Runs a single test executable, logging its combined output to
/// `<test_name>.out`, and returns its exit code.
///
/// The kvdb home is passed through [`KVDB_HOME_ENV`]. A non-zero exit code is
/// not an error here; the caller accumulates codes across tests.
pub fn run_test(config: &HarnessConfig, test_name: &str) -> Result<i32, HarnessError> {
    let log = create_log(&test_output_path(&config.working_dir, test_name))?;
    let exe = config.working_dir.join(test_name);

    let output = cmd(exe.as_str(), std::iter::empty::<&str>())
        .env(KVDB_HOME_ENV, config.kvdb_home.as_str())
        .stderr_to_stdout()
        .stdout_file(log)
        .unchecked()
        .run()
        .map_err(|error| HarnessError::TestExec {
            test_name: test_name.to_owned(),
            error,
        })?;
    Ok(exit_code(output.status))
}

/// Drops the kvdb instance, logging to `teardown.out`. Entirely best effort:
/// nothing here can fail the run.
pub fn teardown(config: &HarnessConfig) {
    let log = match File::create(config.working_dir.join(TEARDOWN_LOG)) {
        Ok(log) => log,
        Err(error) => {
            warn!("could not create teardown log: {error}");
            return;
        }
    };

    let command = cmd(
        config.engine_path.as_str(),
        ["kvdb", "drop", config.kvdb_home.as_str()],
    )
    .stderr_to_stdout()
    .stdout_file(log)
    .unchecked();

    match command.run() {
        Ok(output) => debug!("teardown drop exited with {}", exit_code(output.status)),
        Err(error) => warn!("teardown drop failed: {error}"),
    }
}

/// Runs the whole suite: preflight check, setup, every test in configured
/// order, and the snapshot write.
///
/// A non-zero setup returns [`HarnessError::SetupFailed`] before any test
/// runs. Per-test exit codes are summed, never short-circuited; parse errors
/// abort the run. Teardown is left to the caller, gated on
/// [`SuiteOutcome::should_teardown`].
pub fn run_suite(config: &HarnessConfig) -> Result<SuiteOutcome, HarnessError> {
    check_for_tests(config)?;

    let setup_code = setup(config)?;
    if setup_code != 0 {
        return Err(HarnessError::SetupFailed {
            exit_code: setup_code,
        });
    }

    let mut exit_status = 0;
    let mut results = TestResults::new();
    for test_name in &config.test_names {
        info!("running {test_name}");
        let code = run_test(config, test_name)?;
        if code != 0 {
            info!("{test_name} exited with code {code}");
        }
        exit_status += code;

        let parsed = parse_output(&config.working_dir, test_name)?;
        if !parsed.section_found {
            debug!("{test_name} printed no failure section");
        }
        info!("failures for {test_name}: {:?}", parsed.failures);
        results.insert(test_name.clone(), parsed.failures);
    }

    let snapshot = RunSnapshot::new(config.build_number.clone(), results);
    let snapshot_path = snapshot.write(&config.working_dir)?;
    let RunSnapshot { results, .. } = snapshot;

    Ok(SuiteOutcome {
        exit_status,
        results,
        snapshot_path,
    })
}

fn create_log(path: &Utf8Path) -> Result<File, HarnessError> {
    File::create(path).map_err(|error| HarnessError::LogCreate {
        path: path.to_owned(),
        error,
    })
}

// One expression per engine invocation; the log file handle is duplicated so
// successive steps append to the same file.
fn engine_cmd(
    config: &HarnessConfig,
    verb: &str,
    log: &File,
) -> Result<duct::Expression, HarnessError> {
    let log = log.try_clone().map_err(|error| HarnessError::LogCreate {
        path: config.working_dir.join(SETUP_LOG),
        error,
    })?;
    Ok(cmd(
        config.engine_path.as_str(),
        ["kvdb", verb, config.kvdb_home.as_str()],
    )
    .stderr_to_stdout()
    .stdout_file(log)
    .unchecked())
}

fn engine_command_line(config: &HarnessConfig, verb: &str) -> String {
    format!("{} kvdb {verb} {}", config.engine_path, config.kvdb_home)
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    // Signal death maps to 128 + signo, matching shell conventions.
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_config(working_dir: &Utf8Path, test_names: &[&str]) -> HarnessConfig {
        HarnessConfig::new(
            "1234".to_owned(),
            "/usr/bin/kvdb-engine".into(),
            "/var/tmp/kvdb-home".into(),
            working_dir.to_owned(),
            test_names.iter().map(|name| (*name).to_owned()).collect(),
        )
    }

    #[test]
    fn empty_test_list_selects_defaults() {
        let config = test_config(Utf8Path::new("/work"), &[]);
        assert_eq!(config.test_names, DEFAULT_TESTS);
    }

    #[test]
    fn check_for_tests_passes_when_all_present() {
        let dir = camino_tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("a_test"), "").unwrap();
        fs_err::write(dir.path().join("b_test"), "").unwrap();

        let config = test_config(dir.path(), &["a_test", "b_test"]);
        check_for_tests(&config).unwrap();
    }

    #[test]
    fn check_for_tests_collects_all_missing_names() {
        let dir = camino_tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("b_test"), "").unwrap();

        let config = test_config(dir.path(), &["a_test", "b_test", "c_test"]);
        let error = check_for_tests(&config).unwrap_err();
        match error {
            HarnessError::MissingTests { missing } => {
                assert_eq!(missing, vec!["a_test".to_owned(), "c_test".to_owned()]);
            }
            other => panic!("expected MissingTests, got {other:?}"),
        }
    }

    #[test]
    fn check_for_tests_requires_a_file() {
        let dir = camino_tempfile::tempdir().unwrap();
        fs_err::create_dir(dir.path().join("a_test")).unwrap();

        let config = test_config(dir.path(), &["a_test"]);
        let error = check_for_tests(&config).unwrap_err();
        assert!(matches!(error, HarnessError::MissingTests { .. }));
    }

    #[test]
    fn output_path_naming() {
        assert_eq!(
            test_output_path(Utf8Path::new("/work"), "storage_kvdb_test"),
            Utf8PathBuf::from("/work/storage_kvdb_test.out")
        );
    }
}
