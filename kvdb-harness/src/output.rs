// Copyright (c) The kvdb-harness Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output configuration: verbosity, color, and writers.

use clap::{Args, ValueEnum};
use owo_colors::{Style, style};
use std::{
    io::{BufWriter, Stdout, Write},
    marker::PhantomData,
};
use tracing::level_filters::LevelFilter;

/// Output options shared by the whole CLI.
#[derive(Copy, Clone, Debug, Args)]
#[must_use]
pub struct OutputOpts {
    /// Verbose output
    #[arg(long, short, global = true, env = "KVDB_HARNESS_VERBOSE")]
    pub(crate) verbose: bool,

    /// Produce color output: auto, always, never
    #[arg(
        long,
        value_enum,
        default_value_t,
        hide_possible_values = true,
        global = true,
        value_name = "WHEN",
        env = "KVDB_HARNESS_COLOR"
    )]
    pub(crate) color: Color,
}

impl OutputOpts {
    /// Initializes the output context, installing the global tracing
    /// subscriber.
    pub fn init(self) -> OutputContext {
        let OutputOpts { verbose, color } = self;

        color.init();
        init_logger(verbose, color);

        OutputContext { verbose, color }
    }
}

/// The initialized output context.
#[derive(Copy, Clone, Debug)]
#[must_use]
pub struct OutputContext {
    pub(crate) verbose: bool,
    pub(crate) color: Color,
}

impl OutputContext {
    /// Returns general stderr styles for the current output context.
    pub fn stderr_styles(&self) -> StderrStyles {
        let mut styles = StderrStyles::default();

        if self.color.should_colorize(supports_color::Stream::Stderr) {
            styles.colorize();
        }

        styles
    }

    /// Whether verbose output was requested.
    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

/// When to produce color output.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
#[must_use]
pub enum Color {
    /// Colorize if the stream supports it.
    #[default]
    Auto,
    /// Always colorize.
    Always,
    /// Never colorize.
    Never,
}

impl Color {
    fn init(self) {
        match self {
            Color::Auto => {}
            Color::Always => owo_colors::set_override(true),
            Color::Never => owo_colors::set_override(false),
        }
    }

    fn should_colorize(self, stream: supports_color::Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

fn init_logger(verbose: bool, color: Color) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .with_ansi(color.should_colorize(supports_color::Stream::Stderr))
        .with_writer(std::io::stderr)
        .init();
}

/// Styles for stderr output.
#[derive(Clone, Debug, Default)]
pub struct StderrStyles {
    pub(crate) bold: Style,
}

impl StderrStyles {
    fn colorize(&mut self) {
        self.bold = style().bold();
    }
}

/// A helper for capturing stdout in tests.
///
/// The test pass is gated by `#[cfg(test)]` to allow a better optimization in
/// the binary.
pub enum OutputWriter {
    /// No capture.
    Normal,
    /// Output captured.
    #[cfg(test)]
    Test {
        /// stdout capture.
        stdout: Vec<u8>,
    },
}

impl Default for OutputWriter {
    fn default() -> Self {
        Self::Normal
    }
}

impl OutputWriter {
    pub(crate) fn stdout_writer(&mut self) -> StdoutWriter<'_> {
        match self {
            Self::Normal => StdoutWriter::Normal {
                buf: BufWriter::new(std::io::stdout()),
                _lifetime: PhantomData,
            },
            #[cfg(test)]
            Self::Test { stdout } => StdoutWriter::Test { buf: stdout },
        }
    }

    #[cfg(test)]
    pub(crate) fn stdout(&self) -> &[u8] {
        match self {
            Self::Normal => &[],
            Self::Test { stdout } => stdout,
        }
    }
}

pub(crate) enum StdoutWriter<'a> {
    Normal {
        buf: BufWriter<Stdout>,
        _lifetime: PhantomData<&'a ()>,
    },
    #[cfg(test)]
    Test { buf: &'a mut Vec<u8> },
}

impl Write for StdoutWriter<'_> {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Normal { buf, .. } => buf.write(data),
            #[cfg(test)]
            Self::Test { buf } => buf.write(data),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Normal { buf, .. } => buf.flush(),
            #[cfg(test)]
            Self::Test { .. } => Ok(()),
        }
    }
}
