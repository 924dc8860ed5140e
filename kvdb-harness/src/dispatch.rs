// Copyright (c) The kvdb-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::ExpectedError,
    harness::{self, HarnessConfig, SuiteOutcome},
    output::{OutputContext, OutputOpts, OutputWriter},
};
use camino::Utf8PathBuf;
use clap::Parser;
use std::io::{self, Write};
use tracing::info;

/// Sequential test harness for kvdb storage-engine unit tests.
///
/// Sets up a fresh kvdb instance, runs the unit-test executables found in the
/// current directory one after another, scrapes their output for failing
/// sub-tests, and records the results in `<BUILD_NUMBER>.db` for regression
/// comparison across builds. The instance is dropped again only if every test
/// passed.
#[derive(Debug, Parser)]
#[command(version, bin_name = "kvdb-harness")]
pub struct HarnessApp {
    /// Build identifier the results snapshot is keyed by
    build_number: String,

    /// Path to the kvdb engine CLI
    engine_path: Utf8PathBuf,

    /// Home directory for the kvdb instance under test
    kvdb_home: Utf8PathBuf,

    /// Run NAME instead of the built-in test list (repeatable)
    #[arg(long = "test", value_name = "NAME")]
    tests: Vec<String>,

    #[command(flatten)]
    output: OutputOpts,
}

impl HarnessApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the harness, returning the process exit code.
    pub fn exec(self, output_writer: &mut OutputWriter) -> Result<i32, ExpectedError> {
        // Test executables and output files resolve relative to the process
        // working directory, not a flag.
        let working_dir = std::env::current_dir()
            .map_err(|error| ExpectedError::CwdInvalid { error })
            .and_then(|dir| {
                Utf8PathBuf::try_from(dir).map_err(|error| ExpectedError::CwdInvalid {
                    error: error.into_io_error(),
                })
            })?;

        let config = HarnessConfig::new(
            self.build_number,
            self.engine_path,
            self.kvdb_home,
            working_dir,
            self.tests,
        );

        let outcome = harness::run_suite(&config)?;

        write_results(&config.build_number, &outcome, output_writer)
            .map_err(|error| ExpectedError::WriteReportFailed { error })?;

        if outcome.should_teardown() {
            harness::teardown(&config);
        } else {
            info!(
                "exit status {} is non-zero: leaving the environment at {} in place for inspection",
                outcome.exit_status, config.kvdb_home,
            );
        }

        Ok(outcome.exit_status)
    }
}

fn write_results(
    build_number: &str,
    outcome: &SuiteOutcome,
    output_writer: &mut OutputWriter,
) -> io::Result<()> {
    let mut writer = output_writer.stdout_writer();

    writeln!(writer, "results for build {build_number}:")?;
    for (test_name, failures) in &outcome.results {
        if failures.is_empty() {
            writeln!(writer, "  {test_name}: no failures")?;
        } else {
            writeln!(writer, "  {test_name}: {} failing", failures.len())?;
            for id in failures {
                writeln!(writer, "    {id}")?;
            }
        }
    }
    writeln!(writer, "snapshot written to {}", outcome.snapshot_path)?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use maplit::{btreemap, btreeset};
    use pretty_assertions::assert_eq;

    #[test]
    fn verify_cli() {
        HarnessApp::command().debug_assert();
    }

    #[test]
    fn three_positional_arguments_are_required() {
        let result = HarnessApp::try_parse_from(["kvdb-harness", "1234", "/usr/bin/engine"]);
        assert!(result.is_err(), "two positional arguments must not parse");

        HarnessApp::try_parse_from(["kvdb-harness", "1234", "/usr/bin/engine", "/tmp/home"])
            .expect("three positional arguments parse");
    }

    #[test]
    fn write_results_report() {
        let outcome = SuiteOutcome {
            exit_status: 1,
            results: btreemap! {
                "storage_kvdb_engine_test".to_owned() => btreeset! {
                    "EngineInsertDup".to_owned(),
                },
                "storage_kvdb_test".to_owned() => btreeset! {},
            },
            snapshot_path: "/work/1234.db".into(),
        };

        let mut output_writer = OutputWriter::Test { stdout: Vec::new() };
        write_results("1234", &outcome, &mut output_writer).unwrap();

        let report = String::from_utf8(output_writer.stdout().to_vec()).unwrap();
        assert_eq!(
            report,
            "results for build 1234:\n\
             \x20 storage_kvdb_engine_test: 1 failing\n\
             \x20   EngineInsertDup\n\
             \x20 storage_kvdb_test: no failures\n\
             snapshot written to /work/1234.db\n"
        );
    }
}
