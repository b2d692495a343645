//! Logging to the kernel log buffer.
//!
//! Generators run before journald is around, so their diagnostics go to
//! `/dev/kmsg`. Each write there becomes one record and may not exceed
//! 1024 bytes; longer messages are split into several records that all carry
//! the `<priority>tag[pid]: ` prefix.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};

pub const KMSG_PATH: &str = "/dev/kmsg";

/// Largest single write `/dev/kmsg` accepts.
pub const KMSG_MAX_WRITE: usize = 1024;

/// Smallest body budget per record, enough for any UTF-8 character.
const MIN_BODY: usize = 4;

/// syslog priority for a log level.
pub fn syslog_priority(level: Level) -> u8 {
    match level {
        Level::Error => 3,
        Level::Warn => 4,
        Level::Info => 6,
        Level::Debug | Level::Trace => 7,
    }
}

/// Formats and writes kernel log records to any byte sink.
pub struct KmsgWriter<W: Write> {
    sink: W,
    tag: String,
    pid: u32,
    max_write: usize,
}

impl<W: Write> KmsgWriter<W> {
    pub fn new(sink: W, tag: impl Into<String>) -> Self {
        Self {
            sink,
            tag: tag.into(),
            pid: std::process::id(),
            max_write: KMSG_MAX_WRITE,
        }
    }

    pub fn with_max_write(mut self, max_write: usize) -> Self {
        self.max_write = max_write;
        self
    }

    pub fn prefix(&self, level: Level) -> String {
        format!("<{}>{}[{}]: ", syslog_priority(level), self.tag, self.pid)
    }

    /// Build the records for one message without writing them.
    pub fn records(&self, level: Level, message: &str) -> Vec<Vec<u8>> {
        let prefix = self.prefix(level);
        let budget = self.max_write.saturating_sub(prefix.len()).max(MIN_BODY);

        split_on_char_boundaries(message, budget)
            .into_iter()
            .map(|chunk| {
                let mut record = Vec::with_capacity(prefix.len() + chunk.len());
                record.extend_from_slice(prefix.as_bytes());
                record.extend_from_slice(chunk.as_bytes());
                record
            })
            .collect()
    }

    /// Write one message, one record per write call.
    pub fn emit(&mut self, level: Level, message: &str) -> io::Result<()> {
        for record in self.records(level, message) {
            self.sink.write_all(&record)?;
        }
        self.sink.flush()
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// Split into pieces of at most `budget` bytes without cutting a character.
/// An empty message still yields one empty piece.
fn split_on_char_boundaries(message: &str, budget: usize) -> Vec<&str> {
    if message.is_empty() {
        return vec![message];
    }

    let mut chunks = Vec::new();
    let mut rest = message;
    while !rest.is_empty() {
        let mut end = budget.min(rest.len());
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            // Budget smaller than the next character.
            end = rest
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
        }
        let (chunk, tail) = rest.split_at(end);
        chunks.push(chunk);
        rest = tail;
    }
    chunks
}

/// `log` backend writing to the kernel log.
pub struct KmsgLogger {
    writer: Mutex<KmsgWriter<Box<dyn Write + Send>>>,
    level: LevelFilter,
}

impl KmsgLogger {
    pub fn new(sink: Box<dyn Write + Send>, tag: &str, level: LevelFilter) -> Self {
        Self {
            writer: Mutex::new(KmsgWriter::new(sink, tag)),
            level,
        }
    }

    /// Open `/dev/kmsg` for appending.
    pub fn open(tag: &str, level: LevelFilter) -> io::Result<Self> {
        let file = OpenOptions::new().append(true).open(KMSG_PATH)?;
        Ok(Self::new(Box::new(file), tag, level))
    }

    /// Install as the global logger.
    pub fn init(self) -> Result<(), log::SetLoggerError> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for KmsgLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        if let Ok(mut writer) = self.writer.lock() {
            // Nowhere left to report a failure to.
            let _ = writer.emit(record.level(), &message);
        }
    }

    fn flush(&self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.sink.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Remembers every write call separately.
    #[derive(Default)]
    struct WriteLog(Vec<Vec<u8>>);

    impl Write for WriteLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.push(buf.to_vec());
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn writer() -> KmsgWriter<WriteLog> {
        KmsgWriter::new(WriteLog::default(), "esp-generator")
    }

    fn expected_prefix(priority: u8) -> Vec<u8> {
        format!("<{}>esp-generator[{}]: ", priority, std::process::id()).into_bytes()
    }

    #[test]
    fn test_priorities() {
        for (level, priority) in [
            (Level::Error, 3),
            (Level::Warn, 4),
            (Level::Info, 6),
            (Level::Debug, 7),
            (Level::Trace, 7),
        ] {
            let mut w = writer();
            w.emit(level, "msg").unwrap();
            let mut expected = expected_prefix(priority);
            expected.extend_from_slice(b"msg");
            assert_eq!(w.into_inner().0, vec![expected]);
        }
    }

    #[test]
    fn test_unicode_message() {
        let mut w = writer();
        w.emit(Level::Info, "\u{1F643}").unwrap();
        let mut expected = expected_prefix(6);
        expected.extend_from_slice("\u{1F643}".as_bytes());
        assert_eq!(w.into_inner().0, vec![expected]);
    }

    #[test]
    fn test_split_ascii() {
        let prefix = expected_prefix(6);
        let size = KMSG_MAX_WRITE - prefix.len();
        let message = "x".repeat(2000);

        let mut w = writer();
        w.emit(Level::Info, &message).unwrap();
        let writes = w.into_inner().0;

        assert_eq!(writes.len(), 3);
        let mut body_total = 0;
        for write in &writes {
            assert!(write.len() <= KMSG_MAX_WRITE);
            assert!(write.starts_with(&prefix));
            body_total += write.len() - prefix.len();
        }
        assert_eq!(body_total, 2000);
        assert_eq!(writes[0].len() - prefix.len(), size);
        assert_eq!(writes[2].len() - prefix.len(), 2000 - 2 * size);
    }

    #[test]
    fn test_split_keeps_multibyte_whole() {
        let prefix = expected_prefix(6);
        let size = KMSG_MAX_WRITE - prefix.len();
        let message = format!("{}\u{1F643}", "x".repeat(size - 1));

        let mut w = writer();
        w.emit(Level::Info, &message).unwrap();
        let writes = w.into_inner().0;

        let mut first = prefix.clone();
        first.extend(std::iter::repeat(b'x').take(size - 1));
        let mut second = prefix.clone();
        second.extend_from_slice("\u{1F643}".as_bytes());
        assert_eq!(writes, vec![first, second]);
    }

    #[test]
    fn test_empty_message() {
        let mut w = writer();
        w.emit(Level::Warn, "").unwrap();
        assert_eq!(w.into_inner().0, vec![expected_prefix(4)]);
    }

    #[test]
    fn test_tiny_budget_still_progresses() {
        let w = writer().with_max_write(1);
        let records = w.records(Level::Info, "ab\u{1F643}");
        let prefix_len = w.prefix(Level::Info).len();
        let bodies: Vec<&[u8]> = records.iter().map(|r| &r[prefix_len..]).collect();
        assert_eq!(bodies, vec!["ab".as_bytes(), "\u{1F643}".as_bytes()]);
    }

    #[test]
    fn test_logger_filters_level() {
        let logger = KmsgLogger::new(Box::new(io::sink()), "esp-generator", LevelFilter::Info);
        let debug = Metadata::builder().level(Level::Debug).build();
        let warn = Metadata::builder().level(Level::Warn).build();
        assert!(!logger.enabled(&debug));
        assert!(logger.enabled(&warn));
    }
}
