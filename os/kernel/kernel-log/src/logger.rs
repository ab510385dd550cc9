use core::fmt::{self, Write};
use kernel_sync::SyncOnceCell;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Where formatted log lines go.
pub type Sink = fn(fmt::Arguments);

pub struct KernelLogger {
    max_level: LevelFilter,
    sink: Sink,
}

static LOGGER: SyncOnceCell<KernelLogger> = SyncOnceCell::new();

impl KernelLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter, sink: Sink) -> Self {
        Self { max_level, sink }
    }

    /// Install as the global logger. Call once during early init.
    ///
    /// # Errors
    /// Fails if a logger was already installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        let max_level = self.max_level;
        let logger = LOGGER.get_or_init(|| self);
        log::set_logger(logger)?;
        log::set_max_level(max_level);
        Ok(())
    }
}

/// Render `record` as `[LEVEL] target: message\n`.
///
/// # Errors
/// Propagates errors from `w`.
pub fn write_record(w: &mut impl Write, record: &Record) -> fmt::Result {
    writeln!(w, "[{}] {}: {}", record.level(), record.target(), record.args())
}

/// Adapts a [`Sink`] to [`fmt::Write`] so [`write_record`] can drive it.
struct SinkWriter(Sink);

impl Write for SinkWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        (self.0)(format_args!("{s}"));
        Ok(())
    }

    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
        (self.0)(args);
        Ok(())
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        cfg!(feature = "enabled") && metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Best effort; a sink has nowhere to report its own failure.
        let _ = write_record(&mut SinkWriter(self.sink), record);
    }

    fn flush(&self) {}
}
