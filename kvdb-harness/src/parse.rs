// Copyright (c) The kvdb-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scraping of unit-test output for failing sub-tests.
//!
//! The storage-engine unit tests report failures as plain text: a line
//! containing `Failing tests` opens the failure section, and each subsequent
//! line names one failing sub-test at whitespace-split token index 4. The
//! contract is positional and brittle, so all of it lives behind
//! [`parse_output`] where it can be unit-tested in isolation.

use crate::{errors::ParseError, harness::test_output_path};
use camino::Utf8Path;
use std::{
    collections::BTreeSet,
    io::{BufRead, BufReader},
};

/// Marker line that opens the failure section. Lines containing the marker are
/// never failure records themselves.
pub const FAILING_TESTS_MARKER: &str = "Failing tests";

/// Lines in the failure section containing this marker belong to a different
/// report format (a section footer) and are skipped.
pub const FAILURE_MARKER: &str = "FAILURE";

/// Whitespace-split token index (0-based) of the failing sub-test identifier
/// within a failure record.
pub const FAILING_ID_TOKEN: usize = 4;

/// Parsed failure report for a single test executable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParsedOutput {
    /// Failing sub-test identifiers. Duplicates collapse.
    pub failures: BTreeSet<String>,

    /// Whether the `Failing tests` marker was seen at all.
    ///
    /// An empty `failures` set with `section_found == false` means the test
    /// never printed a failure section. The harness treats that the same as
    /// "no failures" (the historical behavior); the flag lets callers tell
    /// the two apart.
    pub section_found: bool,
}

/// Reads `<test_name>.out` under `working_dir` and extracts the set of
/// failing sub-test identifiers.
///
/// The scan has two phases: every line is discarded until one containing
/// [`FAILING_TESTS_MARKER`] is seen, and every line after that is a failure
/// record unless it contains [`FAILURE_MARKER`]. A record with fewer than
/// [`FAILING_ID_TOKEN`] + 1 tokens is a [`ParseError::TruncatedRecord`], not
/// a silent skip.
pub fn parse_output(working_dir: &Utf8Path, test_name: &str) -> Result<ParsedOutput, ParseError> {
    let path = test_output_path(working_dir, test_name);
    let file = fs_err::File::open(&path).map_err(|error| ParseError::Read {
        path: path.to_owned(),
        error,
    })?;
    parse_reader(&path, BufReader::new(file))
}

fn parse_reader(path: &Utf8Path, reader: impl BufRead) -> Result<ParsedOutput, ParseError> {
    let mut failures = BTreeSet::new();
    let mut section_found = false;

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|error| ParseError::Read {
            path: path.to_owned(),
            error,
        })?;

        if line.contains(FAILING_TESTS_MARKER) {
            section_found = true;
            continue;
        }
        if !section_found {
            continue;
        }
        if line.contains(FAILURE_MARKER) {
            continue;
        }

        let id = line.split_whitespace().nth(FAILING_ID_TOKEN).ok_or_else(|| {
            ParseError::TruncatedRecord {
                path: path.to_owned(),
                line_number: idx + 1,
                line: line.clone(),
            }
        })?;
        failures.insert(id.to_owned());
    }

    Ok(ParsedOutput {
        failures,
        section_found,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;
    use indoc::indoc;
    use maplit::btreeset;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn parse_str(output: &str) -> Result<ParsedOutput, ParseError> {
        parse_reader(Utf8Path::new("test.out"), Cursor::new(output))
    }

    #[test]
    fn no_marker_means_no_failures() {
        let output = indoc! {"
            running 12 cases
            all 12 cases passed
        "};
        let parsed = parse_str(output).unwrap();
        assert_eq!(parsed.failures, btreeset! {});
        assert!(!parsed.section_found);
    }

    #[test]
    fn extracts_token_index_4() {
        let output = indoc! {"
            running 12 cases
            2 cases failed
            Failing tests
            2026-08-24 10:00:01 E STORAGE EngineInsertDup
            2026-08-24 10:00:02 E STORAGE EngineScanReverse
        "};
        let parsed = parse_str(output).unwrap();
        assert_eq!(
            parsed.failures,
            btreeset! {
                "EngineInsertDup".to_owned(),
                "EngineScanReverse".to_owned(),
            }
        );
        assert!(parsed.section_found);
    }

    #[test]
    fn duplicates_collapse() {
        let output = indoc! {"
            Failing tests
            2026-08-24 10:00:01 E STORAGE EngineInsertDup
            2026-08-24 10:00:02 E STORAGE EngineInsertDup
        "};
        let parsed = parse_str(output).unwrap();
        assert_eq!(parsed.failures, btreeset! {"EngineInsertDup".to_owned()});
    }

    #[test]
    fn failure_footer_lines_are_skipped() {
        let output = indoc! {"
            Failing tests
            2026-08-24 10:00:01 E STORAGE EngineInsertDup
            FAILURE: 1 of 12 cases failed
        "};
        let parsed = parse_str(output).unwrap();
        assert_eq!(parsed.failures, btreeset! {"EngineInsertDup".to_owned()});
    }

    #[test]
    fn marker_lines_are_skipped_inside_the_section() {
        // A second marker line must not be treated as a failure record.
        let output = indoc! {"
            Failing tests
            2026-08-24 10:00:01 E STORAGE EngineInsertDup
            Failing tests
            2026-08-24 10:00:02 E STORAGE EngineScanReverse
        "};
        let parsed = parse_str(output).unwrap();
        assert_eq!(
            parsed.failures,
            btreeset! {
                "EngineInsertDup".to_owned(),
                "EngineScanReverse".to_owned(),
            }
        );
    }

    #[test]
    fn lines_before_the_marker_are_ignored() {
        // Pre-marker lines never produce records, even short ones.
        let output = indoc! {"
            short line
            Failing tests
            2026-08-24 10:00:01 E STORAGE EngineInsertDup
        "};
        let parsed = parse_str(output).unwrap();
        assert_eq!(parsed.failures, btreeset! {"EngineInsertDup".to_owned()});
    }

    #[test]
    fn truncated_record_is_an_error() {
        let output = indoc! {"
            Failing tests
            2026-08-24 10:00:01 E STORAGE EngineInsertDup
            only four tokens here?
        "};
        let error = parse_str(output).unwrap_err();
        match error {
            ParseError::TruncatedRecord {
                line_number, line, ..
            } => {
                assert_eq!(line_number, 3);
                assert_eq!(line, "only four tokens here?");
            }
            other => panic!("expected TruncatedRecord, got {other:?}"),
        }
    }

    #[test]
    fn empty_line_in_section_is_an_error() {
        let output = "Failing tests\n\n";
        let error = parse_str(output).unwrap_err();
        assert!(matches!(error, ParseError::TruncatedRecord { .. }));
    }

    #[test]
    fn parse_output_is_idempotent() {
        let dir = camino_tempfile::tempdir().unwrap();
        fs_err::write(
            test_output_path(dir.path(), "storage_kvdb_test"),
            indoc! {"
                Failing tests
                2026-08-24 10:00:01 E STORAGE EngineInsertDup
            "},
        )
        .unwrap();

        let first = parse_output(dir.path(), "storage_kvdb_test").unwrap();
        let second = parse_output(dir.path(), "storage_kvdb_test").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_output_file_is_a_read_error() {
        let dir = camino_tempfile::tempdir().unwrap();
        let error = parse_output(dir.path(), "storage_kvdb_test").unwrap_err();
        assert!(matches!(error, ParseError::Read { .. }));
    }
}
