// Copyright (c) The kvdb-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the harness.

use crate::{output::StderrStyles, parse::FAILING_ID_TOKEN};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

/// Documented exit codes for `kvdb-harness` failures.
///
/// On a run that gets as far as executing tests, the process exits with the
/// sum of the per-test exit codes (0 when every test passed). Failures before
/// or after that point use the constants below.
///
/// The raw summation is inherited from the snapshot format's previous
/// consumers and is kept for compatibility; note that it can alias (two tests
/// exiting 128 sum to 256, which wraps to 0 in an 8-bit exit-code
/// environment).
pub enum HarnessExitCode {}

impl HarnessExitCode {
    /// No errors occurred and the harness exited normally.
    pub const OK: i32 = 0;

    /// The command line could not be parsed.
    pub const USAGE_ERROR: i32 = 1;

    /// A user issue happened while setting up the harness invocation.
    pub const SETUP_ERROR: i32 = 96;

    /// A test's output could not be parsed.
    pub const OUTPUT_PARSE_FAILED: i32 = 102;

    /// Writing the results snapshot or the report produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}

/// Errors produced while scraping a test's output file.
///
/// `TruncatedRecord` is a deliberately preserved fragility of the output
/// format: a retained line with too few tokens aborts the whole run rather
/// than being silently skipped.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The output file could not be opened or read.
    #[error("failed to read output file `{path}`")]
    Read {
        /// The output file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A line in the failure section had fewer tokens than the identifier
    /// index requires.
    #[error(
        "line {line_number} of `{path}` has fewer than {} whitespace-separated tokens: `{line}`",
        FAILING_ID_TOKEN + 1
    )]
    TruncatedRecord {
        /// The output file.
        path: Utf8PathBuf,
        /// 1-based line number of the offending line.
        line_number: usize,
        /// The offending line.
        line: String,
    },
}

/// Errors produced while persisting or loading a results snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The results could not be serialized.
    #[error("failed to serialize results for build {build_number}")]
    Serialize {
        /// The build number the snapshot is keyed by.
        build_number: String,
        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// The snapshot file could not be written.
    #[error("failed to write snapshot to `{path}`")]
    Write {
        /// The snapshot file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The snapshot file could not be read.
    #[error("failed to read snapshot from `{path}`")]
    Read {
        /// The snapshot file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The snapshot file contents could not be deserialized.
    #[error("failed to deserialize snapshot at `{path}`")]
    Deserialize {
        /// The snapshot file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },
}

/// Errors produced while setting up the environment and running tests.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// One or more configured test executables are absent from the working
    /// directory. Reported before any side effect occurs, with every missing
    /// name collected.
    #[error("test executables not found: {}", missing.join(","))]
    MissingTests {
        /// The missing names, in configured order.
        missing: Vec<String>,
    },

    /// A log file could not be created.
    #[error("failed to create log file `{path}`")]
    LogCreate {
        /// The log file.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The engine CLI could not be executed.
    #[error("failed to execute `{command}`")]
    EngineExec {
        /// The command that failed to spawn.
        command: String,
        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The instance-create step returned non-zero. No tests run after this.
    #[error("kvdb instance creation exited with code {exit_code}")]
    SetupFailed {
        /// The exit code of the create step, which becomes the process exit
        /// code.
        exit_code: i32,
    },

    /// A test executable could not be spawned.
    ///
    /// Shell-based invocation would fold this into an exit code; structured
    /// invocation surfaces it as an explicit error instead.
    #[error("failed to execute test `{test_name}`")]
    TestExec {
        /// The test that failed to spawn.
        test_name: String,
        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A test's output could not be parsed. Fatal to the whole run, not
    /// isolated per test.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The results snapshot could not be written.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// An error that occurred in an external collaborator or in the environment,
/// not in the harness itself.
///
/// The `#[error()]` strings are placeholders; the expected way to print these
/// out is [`display_to_stderr`](Self::display_to_stderr), which colorizes.
#[derive(Debug, Error)]
pub enum ExpectedError {
    /// The working directory could not be determined.
    #[error("could not determine the working directory")]
    CwdInvalid {
        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// One or more test executables are missing.
    #[error("missing test executables")]
    MissingTests {
        /// The missing names.
        missing: Vec<String>,
    },

    /// Environment setup failed.
    #[error("environment setup failed")]
    SetupFailed {
        /// The exit code of the instance-create step.
        exit_code: i32,
    },

    /// A subprocess or log file could not be set up.
    #[error("execution failed")]
    ExecFailed {
        /// The underlying error.
        #[source]
        err: HarnessError,
    },

    /// Test output could not be parsed.
    #[error("output parse failed")]
    OutputParseFailed {
        /// The underlying error.
        #[source]
        err: ParseError,
    },

    /// The results snapshot could not be written.
    #[error("snapshot write failed")]
    SnapshotWriteFailed {
        /// The underlying error.
        #[source]
        err: SnapshotError,
    },

    /// The report could not be written to stdout.
    #[error("failed to write results report")]
    WriteReportFailed {
        /// The underlying error.
        #[source]
        error: std::io::Error,
    },
}

impl From<HarnessError> for ExpectedError {
    fn from(err: HarnessError) -> Self {
        match err {
            HarnessError::MissingTests { missing } => Self::MissingTests { missing },
            HarnessError::SetupFailed { exit_code } => Self::SetupFailed { exit_code },
            HarnessError::Parse(err) => Self::OutputParseFailed { err },
            HarnessError::Snapshot(err) => Self::SnapshotWriteFailed { err },
            err => Self::ExecFailed { err },
        }
    }
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CwdInvalid { .. } | Self::MissingTests { .. } | Self::ExecFailed { .. } => {
                HarnessExitCode::SETUP_ERROR
            }
            // The create step's exit code is passed through unchanged.
            Self::SetupFailed { exit_code } => *exit_code,
            Self::OutputParseFailed { .. } => HarnessExitCode::OUTPUT_PARSE_FAILED,
            Self::SnapshotWriteFailed { .. } | Self::WriteReportFailed { .. } => {
                HarnessExitCode::WRITE_OUTPUT_ERROR
            }
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match self {
            Self::CwdInvalid { error } => {
                error!("could not determine the working directory");
                Some(error as &dyn Error)
            }
            Self::MissingTests { missing } => {
                error!(
                    "test executables not found: {}",
                    missing.join(",").style(styles.bold)
                );
                None
            }
            Self::SetupFailed { exit_code } => {
                error!(
                    "kvdb instance creation exited with code {}",
                    exit_code.style(styles.bold)
                );
                None
            }
            Self::ExecFailed { err } => {
                error!("{err}");
                err.source()
            }
            Self::OutputParseFailed { err } => {
                error!("failed to parse test output");
                Some(err as &dyn Error)
            }
            Self::SnapshotWriteFailed { err } => {
                error!("failed to persist results snapshot");
                Some(err as &dyn Error)
            }
            Self::WriteReportFailed { error } => {
                error!("failed to write results report");
                Some(error as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!("  caused by: {err}");
            next_error = err.source();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_failed_passes_exit_code_through() {
        let err = ExpectedError::from(HarnessError::SetupFailed { exit_code: 7 });
        assert_eq!(err.process_exit_code(), 7);
    }

    #[test]
    fn exit_code_mapping() {
        let missing = ExpectedError::from(HarnessError::MissingTests {
            missing: vec!["a".to_owned(), "b".to_owned()],
        });
        assert_eq!(missing.process_exit_code(), HarnessExitCode::SETUP_ERROR);

        let parse = ExpectedError::from(HarnessError::Parse(ParseError::TruncatedRecord {
            path: "t.out".into(),
            line_number: 3,
            line: "too short".to_owned(),
        }));
        assert_eq!(
            parse.process_exit_code(),
            HarnessExitCode::OUTPUT_PARSE_FAILED
        );
    }

    #[test]
    fn missing_tests_message_is_comma_joined() {
        let err = HarnessError::MissingTests {
            missing: vec!["storage_kvdb_test".to_owned(), "other_test".to_owned()],
        };
        assert_eq!(
            err.to_string(),
            "test executables not found: storage_kvdb_test,other_test"
        );
    }
}
