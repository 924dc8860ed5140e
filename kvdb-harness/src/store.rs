// Copyright (c) The kvdb-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence of per-build results snapshots.
//!
//! Each run writes one snapshot, `<buildNumber>.db` in the working directory,
//! mapping every executed test to its set of failing sub-tests. Snapshots from
//! earlier builds are the baseline for spotting regressions; the diffing
//! itself happens elsewhere.

use crate::{errors::SnapshotError, harness::TestResults};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// A serialized run result, keyed by build number.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RunSnapshot {
    /// The build the results belong to.
    pub build_number: String,

    /// Per-test failing sub-test identifiers.
    pub results: TestResults,
}

impl RunSnapshot {
    /// Creates a new snapshot.
    pub fn new(build_number: String, results: TestResults) -> Self {
        Self {
            build_number,
            results,
        }
    }

    /// Returns the snapshot file path for a build.
    pub fn snapshot_path(working_dir: &Utf8Path, build_number: &str) -> Utf8PathBuf {
        working_dir.join(format!("{build_number}.db"))
    }

    /// Writes the snapshot to `<working_dir>/<build_number>.db`, replacing
    /// any snapshot a previous run left behind.
    pub fn write(&self, working_dir: &Utf8Path) -> Result<Utf8PathBuf, SnapshotError> {
        let path = Self::snapshot_path(working_dir, &self.build_number);

        let json =
            serde_json::to_string_pretty(self).map_err(|error| SnapshotError::Serialize {
                build_number: self.build_number.clone(),
                error,
            })?;

        atomicwrites::AtomicFile::new(&path, atomicwrites::AllowOverwrite)
            .write(|file| file.write_all(json.as_bytes()))
            .map_err(|error| match error {
                atomicwrites::Error::Internal(error) | atomicwrites::Error::User(error) => {
                    SnapshotError::Write {
                        path: path.clone(),
                        error,
                    }
                }
            })?;

        Ok(path)
    }

    /// Reads the snapshot for a build back from the working directory.
    pub fn read(working_dir: &Utf8Path, build_number: &str) -> Result<Self, SnapshotError> {
        let path = Self::snapshot_path(working_dir, build_number);
        let json = fs_err::read_to_string(&path).map_err(|error| SnapshotError::Read {
            path: path.clone(),
            error,
        })?;
        serde_json::from_str(&json).map_err(|error| SnapshotError::Deserialize { path, error })
    }
}
