//! Logger construction for the `targ` binary.

use color_eyre::Result;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Controls whether log output is colorized.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, clap::ValueEnum)]
pub enum WhenColor {
    Always,
    Never,
    #[default]
    Auto,
}

impl WhenColor {
    fn ansi(self) -> bool {
        match self {
            WhenColor::Always => true,
            WhenColor::Never => false,
            WhenColor::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
        }
    }
}

/// Build the process-wide tracing subscriber, reading its filter from
/// `TARG_LOG`.
pub fn make_logger(color: WhenColor) -> Result<impl tracing::Subscriber + Send + Sync> {
    let filter = EnvFilter::builder()
        .with_env_var("TARG_LOG")
        .with_default_directive(tracing::level_filters::LevelFilter::WARN.into())
        .from_env_lossy();

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(color.ansi());

    Ok(tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(filter)
        .with(fmt_layer))
}
