//! CSV measurement recorder
//!
//! Writes at most one row per interval into a timestamped file under the log
//! directory. Files are named `hp90epc_<YYYY-MM-DD_HH-MM-SS>.csv`.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Local;
use meter_protocol::Measurement;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::error::{MeterSrvError, Result};
use crate::sink::MeasurementSink;

pub const DEFAULT_LOG_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_TAIL_LINES: usize = 200;

const CSV_HEADER: [&str; 9] = [
    "value",
    "value_str",
    "unit",
    "mode",
    "auto",
    "hold",
    "rel",
    "low_batt",
    "raw",
];

/// Recorder state reported over the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecorderStatus {
    pub active: bool,
    /// Name of the current (or most recent) file, empty if none
    pub file: String,
    pub interval_ms: u64,
}

#[derive(Serialize)]
struct CsvRow<'a> {
    value: String,
    value_str: &'a str,
    unit: &'a str,
    mode: &'a str,
    auto: u8,
    hold: u8,
    rel: u8,
    low_batt: u8,
    raw: &'a str,
}

impl<'a> CsvRow<'a> {
    fn from_measurement(m: &'a Measurement) -> Self {
        Self {
            value: m.value.map(|v| v.to_string()).unwrap_or_default(),
            value_str: &m.value_str,
            unit: &m.unit,
            mode: m.mode.as_str(),
            auto: u8::from(m.auto),
            hold: u8::from(m.hold),
            rel: u8::from(m.rel),
            low_batt: u8::from(m.low_batt),
            raw: &m.raw_hex,
        }
    }
}

struct RecorderInner {
    writer: Option<csv::Writer<File>>,
    current_name: String,
    interval: Duration,
    last_write: Option<Instant>,
}

/// Throttled CSV sink
pub struct CsvRecorder {
    dir: PathBuf,
    inner: Mutex<RecorderInner>,
}

impl CsvRecorder {
    pub fn new(dir: impl Into<PathBuf>, interval_ms: u64) -> Self {
        Self {
            dir: dir.into(),
            inner: Mutex::new(RecorderInner {
                writer: None,
                current_name: String::new(),
                interval: interval_from_ms(interval_ms),
                last_write: None,
            }),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Open a new file and begin recording; no-op while already recording
    pub fn start(&self) -> Result<RecorderStatus> {
        let mut inner = self.inner.lock();
        if inner.writer.is_some() {
            return Ok(status_of(&inner));
        }

        fs::create_dir_all(&self.dir).map_err(|e| {
            MeterSrvError::recorder(format!(
                "Failed to create log directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let name = format!("hp90epc_{}.csv", Local::now().format("%Y-%m-%d_%H-%M-%S"));
        let path = self.dir.join(&name);
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .map_err(|e| {
                MeterSrvError::recorder(format!(
                    "Failed to create log file {}: {}",
                    path.display(),
                    e
                ))
            })?;
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;

        inner.writer = Some(writer);
        inner.current_name = name;
        inner.last_write = None;
        info!("Recording measurements to {}", path.display());
        Ok(status_of(&inner))
    }

    /// Flush and close the current file; no-op while idle
    pub fn stop(&self) -> Result<RecorderStatus> {
        let mut inner = self.inner.lock();
        if let Some(mut writer) = inner.writer.take() {
            writer.flush()?;
            info!("Stopped recording to {}", inner.current_name);
        }
        Ok(status_of(&inner))
    }

    /// Set the minimum spacing between rows; zero falls back to the default
    pub fn set_interval(&self, interval_ms: u64) -> RecorderStatus {
        let mut inner = self.inner.lock();
        inner.interval = interval_from_ms(interval_ms);
        status_of(&inner)
    }

    pub fn status(&self) -> RecorderStatus {
        status_of(&self.inner.lock())
    }

    /// Regular files in the log directory, sorted by name
    pub async fn list_files(&self) -> Result<Vec<String>> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        files.sort();
        Ok(files)
    }

    pub async fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        Ok(tokio::fs::read(path).await?)
    }

    /// Last `max_lines` lines of a log file; zero means the default of 200
    pub async fn tail(&self, name: &str, max_lines: usize) -> Result<Vec<String>> {
        let max_lines = if max_lines == 0 {
            DEFAULT_TAIL_LINES
        } else {
            max_lines
        };

        let file = tokio::fs::File::open(self.resolve(name)?).await?;
        let mut reader = BufReader::new(file).lines();
        let mut lines = VecDeque::with_capacity(max_lines);
        while let Some(line) = reader.next_line().await? {
            if lines.len() == max_lines {
                lines.pop_front();
            }
            lines.push_back(line);
        }
        Ok(lines.into())
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(MeterSrvError::validation(format!(
                "Invalid log file name: {name}"
            )));
        }
        Ok(self.dir.join(name))
    }
}

impl MeasurementSink for CsvRecorder {
    fn push(&self, measurement: &Measurement) {
        let mut inner = self.inner.lock();
        let interval = inner.interval;
        if let Some(last) = inner.last_write {
            if last.elapsed() < interval {
                return;
            }
        }
        let Some(writer) = inner.writer.as_mut() else {
            return;
        };

        let written = writer
            .serialize(CsvRow::from_measurement(measurement))
            .and_then(|()| writer.flush().map_err(csv::Error::from));

        match written {
            Ok(()) => inner.last_write = Some(Instant::now()),
            Err(e) => {
                warn!("CSV write to {} failed, recording stopped: {}", inner.current_name, e);
                inner.writer = None;
            },
        }
    }
}

impl Drop for CsvRecorder {
    fn drop(&mut self) {
        if let Some(mut writer) = self.inner.get_mut().writer.take() {
            let _ = writer.flush();
        }
    }
}

fn interval_from_ms(ms: u64) -> Duration {
    if ms == 0 {
        Duration::from_millis(DEFAULT_LOG_INTERVAL_MS)
    } else {
        Duration::from_millis(ms)
    }
}

fn status_of(inner: &RecorderInner) -> RecorderStatus {
    RecorderStatus {
        active: inner.writer.is_some(),
        file: inner.current_name.clone(),
        interval_ms: inner.interval.as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meter_protocol::testing::FrameBuilder;
    use meter_protocol::{decode_frame, BaseUnit, DecimalPoint, Mode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn volts() -> Measurement {
        decode_frame(
            &FrameBuilder::new()
                .digits([1, 2, 3, 4])
                .decimal(DecimalPoint::Tenths)
                .mode(Mode::Dc)
                .unit(BaseUnit::Volt)
                .hold()
                .build(),
        )
    }

    async fn only_file(recorder: &CsvRecorder) -> String {
        let files = recorder.list_files().await.unwrap();
        assert_eq!(files.len(), 1);
        files[0].clone()
    }

    #[tokio::test]
    async fn test_start_writes_header() {
        let dir = TempDir::new().unwrap();
        let recorder = CsvRecorder::new(dir.path().join("logs"), 1000);

        let status = recorder.start().unwrap();
        assert!(status.active);
        assert!(status.file.starts_with("hp90epc_"));
        assert!(status.file.ends_with(".csv"));

        let lines = recorder.tail(&status.file, 0).await.unwrap();
        assert_eq!(lines, vec!["value,value_str,unit,mode,auto,hold,rel,low_batt,raw"]);
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let recorder = CsvRecorder::new(dir.path(), 1000);

        let first = recorder.start().unwrap();
        let second = recorder.start().unwrap();
        assert_eq!(first.file, second.file);
        assert_eq!(recorder.list_files().await.unwrap().len(), 1);

        assert!(!recorder.stop().unwrap().active);
        let stopped = recorder.stop().unwrap();
        assert!(!stopped.active);
        assert_eq!(stopped.file, first.file);
    }

    #[tokio::test]
    async fn test_push_writes_row() {
        let dir = TempDir::new().unwrap();
        let recorder = CsvRecorder::new(dir.path(), 1000);
        recorder.start().unwrap();

        let m = volts();
        recorder.push(&m);

        let lines = recorder.tail(&only_file(&recorder).await, 0).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], format!("123.4,123.4,V,DC,0,1,0,0,{}", m.raw_hex));
    }

    #[tokio::test]
    async fn test_push_is_throttled() {
        let dir = TempDir::new().unwrap();
        let recorder = CsvRecorder::new(dir.path(), 60_000);
        recorder.start().unwrap();

        for _ in 0..5 {
            recorder.push(&volts());
        }
        assert_eq!(recorder.tail(&only_file(&recorder).await, 0).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_push_ignored_while_stopped() {
        let dir = TempDir::new().unwrap();
        let recorder = CsvRecorder::new(dir.path(), 1);
        recorder.push(&volts());
        assert!(recorder.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_numeric_value_is_empty() {
        let dir = TempDir::new().unwrap();
        let recorder = CsvRecorder::new(dir.path(), 1000);
        recorder.start().unwrap();

        let m = decode_frame(&FrameBuilder::new().raw_digit(0, 0x00).unit(BaseUnit::Ohm).build());
        assert_eq!(m.value, None);
        recorder.push(&m);

        let lines = recorder.tail(&only_file(&recorder).await, 0).await.unwrap();
        assert!(lines[1].starts_with(",????,"));
    }

    #[test]
    fn test_set_interval_defaults_zero() {
        let recorder = CsvRecorder::new("logs", 250);
        assert_eq!(recorder.status().interval_ms, 250);
        assert_eq!(recorder.set_interval(0).interval_ms, DEFAULT_LOG_INTERVAL_MS);
        assert_eq!(recorder.set_interval(5000).interval_ms, 5000);
    }

    #[tokio::test]
    async fn test_tail_keeps_last_lines() {
        let dir = TempDir::new().unwrap();
        let body: String = (1..=10).map(|i| format!("line{i}\n")).collect();
        fs::write(dir.path().join("manual.csv"), body).unwrap();

        let recorder = CsvRecorder::new(dir.path(), 1000);
        assert_eq!(
            recorder.tail("manual.csv", 3).await.unwrap(),
            vec!["line8", "line9", "line10"]
        );
        assert_eq!(recorder.tail("manual.csv", 0).await.unwrap().len(), 10);
        assert_eq!(recorder.read_file("manual.csv").await.unwrap().len(), 61);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_large_file_is_browsed_without_stalling_runtime() {
        let dir = TempDir::new().unwrap();
        let body: String = (0..200_000).map(|i| format!("{i},{i},V,DC,0,0,0,0,10\n")).collect();
        fs::write(dir.path().join("long.csv"), &body).unwrap();
        let recorder = CsvRecorder::new(dir.path(), 1000);

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = ticks.clone();
            tokio::spawn(async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            })
        };

        let tail = recorder.tail("long.csv", 2).await.unwrap();
        assert_eq!(
            tail,
            vec!["199998,199998,V,DC,0,0,0,0,10", "199999,199999,V,DC,0,0,0,0,10"]
        );
        assert_eq!(recorder.read_file("long.csv").await.unwrap().len(), body.len());
        assert!(ticks.load(Ordering::SeqCst) > 0);
        ticker.abort();
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let recorder = CsvRecorder::new(dir.path(), 1000);
        for name in ["../secret", "a/b.csv", "a\\b.csv", "..", ""] {
            let err = recorder.read_file(name).await.unwrap_err();
            assert!(err.is_client_error(), "{name} should be rejected");
            assert!(recorder.tail(name, 10).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_list_files_skips_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.csv"), "").unwrap();
        fs::write(dir.path().join("a.csv"), "").unwrap();

        let recorder = CsvRecorder::new(dir.path(), 1000);
        assert_eq!(recorder.list_files().await.unwrap(), vec!["a.csv", "b.csv"]);
    }
}
