use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Default)]
pub enum VerbosityLevel {
    /// Default output level. Only shows volley events up to the [`WARN`](tracing::Level::WARN).
    #[default]
    Default,

    /// Enables verbose output. Emits volley events up to the [`INFO`](tracing::Level::INFO).
    /// Corresponds to `-v`.
    Verbose,

    /// Emits volley events up to [`DEBUG`](tracing::Level::DEBUG).
    /// Corresponds to `-vv`.
    ExtraVerbose,

    /// Enables all tracing events and uses a tree-like output format. Corresponds to `-vvv`.
    Trace,
}

impl VerbosityLevel {
    #[must_use]
    pub const fn level_filter(self) -> LevelFilter {
        match self {
            Self::Default => LevelFilter::WARN,
            Self::Verbose => LevelFilter::INFO,
            Self::ExtraVerbose => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }

    #[must_use]
    pub const fn is_trace(self) -> bool {
        matches!(self, Self::Trace)
    }
}

#[derive(Debug, Default, clap::Args)]
pub struct Verbosity {
    #[arg(
        long,
        short = 'v',
        help = "Use verbose output (or `-vv` and `-vvv` for more verbose output)",
        action = clap::ArgAction::Count,
        global = true
    )]
    verbose: u8,
}

impl Verbosity {
    pub(crate) const fn level(&self) -> VerbosityLevel {
        match self.verbose {
            0 => VerbosityLevel::Default,
            1 => VerbosityLevel::Verbose,
            2 => VerbosityLevel::ExtraVerbose,
            _ => VerbosityLevel::Trace,
        }
    }
}

/// Installs the global tracing subscriber.
///
/// `VOLLEY_LOG` overrides the verbosity-derived filter with explicit
/// directives.
pub(crate) fn setup_tracing(level: VerbosityLevel) {
    let filter = match std::env::var("VOLLEY_LOG") {
        Ok(directives) => tracing_subscriber::EnvFilter::new(directives),
        Err(_) => {
            tracing_subscriber::EnvFilter::default().add_directive(level.level_filter().into())
        }
    };

    let registry = tracing_subscriber::registry().with(filter);

    if level.is_trace() {
        registry
            .with(
                tracing_tree::HierarchicalLayer::default()
                    .with_indent_lines(true)
                    .with_bracketed_fields(true)
                    .with_targets(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_flag_count_to_levels() {
        assert_eq!(Verbosity { verbose: 0 }.level(), VerbosityLevel::Default);
        assert_eq!(Verbosity { verbose: 1 }.level(), VerbosityLevel::Verbose);
        assert_eq!(Verbosity { verbose: 2 }.level(), VerbosityLevel::ExtraVerbose);
        assert_eq!(Verbosity { verbose: 9 }.level(), VerbosityLevel::Trace);
    }
}
