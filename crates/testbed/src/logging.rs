//! Forwarding log output to the running test
//!
//! Test frameworks capture output per test. [`TestOutput`] is that per-test
//! channel; the loggers here format lines into it. Two routes are provided:
//!
//! - [`LoggerFactory`] / [`Logger`], registered in every fixture container so
//!   services can take a logger as a dependency.
//! - [`output_subscriber`], a `tracing` subscriber whose writer targets the
//!   test output, for code that logs through `tracing` macros.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// Category used when a logger is created without one
pub const DEFAULT_CATEGORY: &str = "Tests";

/// Per-test diagnostic output channel
pub trait TestOutput: Send + Sync {
    fn write_line(&self, line: &str);
}

/// Output kept in memory so tests can assert on it
#[derive(Debug, Default)]
pub struct CapturedOutput {
    lines: Mutex<Vec<String>>,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Whether any captured line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(needle))
    }
}

impl TestOutput for CapturedOutput {
    fn write_line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl TestOutput for NullOutput {
    fn write_line(&self, _line: &str) {}
}

pub trait Logger: Send + Sync {
    fn is_enabled(&self, level: Level) -> bool;

    fn log(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message);
    }

    fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }
}

pub trait LoggerProvider: Send + Sync {
    fn create_logger(&self, category: &str) -> Arc<dyn Logger>;
}

/// Writes `{LEVEL} - Category: {category} : {message} :: {timestamp}` lines to a test output
pub struct OutputLogger {
    category: String,
    output: Arc<dyn TestOutput>,
}

impl OutputLogger {
    pub fn new(category: impl Into<String>, output: Arc<dyn TestOutput>) -> Self {
        Self {
            category: category.into(),
            output,
        }
    }

    /// Logger with the default `Tests` category
    pub fn for_tests(output: Arc<dyn TestOutput>) -> Self {
        Self::new(DEFAULT_CATEGORY, output)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    fn format_line(&self, level: Level, message: &str) -> String {
        format!(
            "{} - Category: {} : {} :: {}",
            level,
            self.category,
            message,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f")
        )
    }
}

impl Logger for OutputLogger {
    fn is_enabled(&self, _level: Level) -> bool {
        true
    }

    fn log(&self, level: Level, message: &str) {
        self.output.write_line(&self.format_line(level, message));
    }
}

pub struct OutputLoggerProvider {
    output: Arc<dyn TestOutput>,
}

impl OutputLoggerProvider {
    pub fn new(output: Arc<dyn TestOutput>) -> Self {
        Self { output }
    }
}

impl LoggerProvider for OutputLoggerProvider {
    fn create_logger(&self, category: &str) -> Arc<dyn Logger> {
        Arc::new(OutputLogger::new(category, self.output.clone()))
    }
}

/// Provider whose loggers are disabled and drop every message
#[derive(Debug, Default, Clone, Copy)]
pub struct NilLoggerProvider;

struct NilLogger;

impl Logger for NilLogger {
    fn is_enabled(&self, _level: Level) -> bool {
        false
    }

    fn log(&self, _level: Level, _message: &str) {}
}

impl LoggerProvider for NilLoggerProvider {
    fn create_logger(&self, _category: &str) -> Arc<dyn Logger> {
        Arc::new(NilLogger)
    }
}

/// Collects the providers a fixture's container logs to
#[derive(Default)]
pub struct LoggingBuilder {
    providers: Vec<Arc<dyn LoggerProvider>>,
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_provider(&mut self, provider: Arc<dyn LoggerProvider>) -> &mut Self {
        self.providers.push(provider);
        self
    }

    pub fn clear_providers(&mut self) -> &mut Self {
        self.providers.clear();
        self
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn build(self) -> LoggerFactory {
        LoggerFactory {
            providers: self.providers,
        }
    }
}

/// Creates loggers that fan out to every configured provider
pub struct LoggerFactory {
    providers: Vec<Arc<dyn LoggerProvider>>,
}

impl LoggerFactory {
    pub fn create_logger(&self, category: &str) -> Arc<dyn Logger> {
        Arc::new(FanOutLogger {
            loggers: self
                .providers
                .iter()
                .map(|provider| provider.create_logger(category))
                .collect(),
        })
    }

    /// Logger categorised by the type name of `T`
    pub fn logger_for<T: ?Sized + 'static>(&self) -> Arc<dyn Logger> {
        self.create_logger(std::any::type_name::<T>())
    }
}

struct FanOutLogger {
    loggers: Vec<Arc<dyn Logger>>,
}

impl Logger for FanOutLogger {
    fn is_enabled(&self, level: Level) -> bool {
        self.loggers.iter().any(|logger| logger.is_enabled(level))
    }

    fn log(&self, level: Level, message: &str) {
        for logger in self.loggers.iter().filter(|l| l.is_enabled(level)) {
            logger.log(level, message);
        }
    }
}

/// `MakeWriter` that sends each formatted `tracing` line to a test output
#[derive(Clone)]
pub struct OutputMakeWriter {
    output: Arc<dyn TestOutput>,
}

impl OutputMakeWriter {
    pub fn new(output: Arc<dyn TestOutput>) -> Self {
        Self { output }
    }
}

impl<'a> MakeWriter<'a> for OutputMakeWriter {
    type Writer = OutputWriter;

    fn make_writer(&'a self) -> Self::Writer {
        OutputWriter {
            output: self.output.clone(),
            buffer: Vec::new(),
        }
    }
}

/// Line-buffering writer; partial lines are emitted on drop
pub struct OutputWriter {
    output: Arc<dyn TestOutput>,
    buffer: Vec<u8>,
}

impl OutputWriter {
    fn emit_complete_lines(&mut self) {
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let text = String::from_utf8_lossy(&line[..newline]);
            self.output.write_line(text.trim_end_matches('\r'));
        }
    }
}

impl io::Write for OutputWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.emit_complete_lines();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.emit_complete_lines();
        Ok(())
    }
}

impl Drop for OutputWriter {
    fn drop(&mut self) {
        self.emit_complete_lines();
        if !self.buffer.is_empty() {
            let rest = String::from_utf8_lossy(&self.buffer).into_owned();
            self.output.write_line(&rest);
            self.buffer.clear();
        }
    }
}

/// A `tracing` subscriber that formats events at or above `level` into `output`
pub fn output_subscriber(
    output: Arc<dyn TestOutput>,
    level: Level,
) -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_target(true)
        .with_writer(OutputMakeWriter::new(output))
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_output_logger_line_format() {
        let output = Arc::new(CapturedOutput::new());
        let logger = OutputLogger::new("Calculator", output.clone());

        logger.info("adding 2 and 3");

        let lines = output.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("INFO - Category: Calculator : adding 2 and 3 :: "));
    }

    #[test]
    fn test_nil_provider_discards() {
        let factory = {
            let mut builder = LoggingBuilder::new();
            builder.add_provider(Arc::new(NilLoggerProvider));
            builder.build()
        };
        let logger = factory.create_logger("anything");

        assert!(!logger.is_enabled(Level::ERROR));
        logger.error("dropped");
    }

    #[test]
    fn test_factory_fans_out() {
        let first = Arc::new(CapturedOutput::new());
        let second = Arc::new(CapturedOutput::new());
        let mut builder = LoggingBuilder::new();
        builder
            .add_provider(Arc::new(OutputLoggerProvider::new(first.clone())))
            .add_provider(Arc::new(NilLoggerProvider))
            .add_provider(Arc::new(OutputLoggerProvider::new(second.clone())));

        builder.build().logger_for::<String>().warn("careful");

        assert!(first.contains("WARN - Category: alloc::string::String : careful"));
        assert!(second.contains("careful"));
    }

    #[test]
    fn test_writer_splits_lines() {
        let output = Arc::new(CapturedOutput::new());
        let make = OutputMakeWriter::new(output.clone());
        {
            let mut writer = make.make_writer();
            writer.write_all(b"first\nsec").unwrap();
            writer.write_all(b"ond\r\ntail").unwrap();
        }

        assert_eq!(output.lines(), vec!["first", "second", "tail"]);
    }

    #[test]
    fn test_subscriber_forwards_events() {
        let output = Arc::new(CapturedOutput::new());
        let subscriber = output_subscriber(output.clone(), Level::INFO);

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("visible event");
            tracing::debug!("filtered event");
        });

        assert!(output.contains("visible event"));
        assert!(!output.contains("filtered event"));
    }
}
