use indicatif::MultiProgress;
use std::io::{self, Write};
use tracing_subscriber::{fmt::MakeWriter, EnvFilter};

/// Installs the global subscriber. `-v` enables INFO, `-vv` DEBUG; the
/// default is WARN. `RUST_LOG` takes precedence when set.
pub fn init(verbose: u8, multi: MultiProgress) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("xo_templates={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(ProgressWriter { multi })
        .init();
}

/// Writes log lines to stderr without tearing live progress bars.
#[derive(Clone)]
struct ProgressWriter {
    multi: MultiProgress,
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.multi.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for ProgressWriter {
    type Writer = ProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
