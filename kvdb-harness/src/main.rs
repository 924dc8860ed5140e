// Copyright (c) The kvdb-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use clap::{Parser, error::ErrorKind};
use color_eyre::Result;
use kvdb_harness::{HarnessApp, HarnessExitCode, OutputWriter};

fn main() -> Result<()> {
    color_eyre::install()?;

    let app = match HarnessApp::try_parse() {
        Ok(app) => app,
        Err(error) => {
            // --help and --version also land here; only real usage errors
            // exit with USAGE_ERROR.
            if matches!(
                error.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) {
                error.exit();
            }
            error.print()?;
            std::process::exit(HarnessExitCode::USAGE_ERROR);
        }
    };

    let output = app.init_output();

    match app.exec(&mut OutputWriter::default()) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            error.display_to_stderr(&output.stderr_styles());
            std::process::exit(error.process_exit_code());
        }
    }
}
