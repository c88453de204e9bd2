/*!
 * Safety monitor drivers.
 *
 * A safety monitor boils some raw content down to a single safe/unsafe
 * verdict. The dummy variant reports a fixed verdict; the file and HTTP
 * variants read their content on every refresh and run it through a
 * [`SafetyMatchingRule`]. Any failure to read counts as unsafe and is only
 * logged: `refresh` on a safety monitor never fails.
 */
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use tracing::warn;

use crate::device::{zero_time, DeviceCategory, Driver, DriverInfo, Result};
use crate::rule::SafetyMatchingRule;
use crate::transport;

/// Maximum number of bytes of monitor content considered
pub const MONITOR_READ_LIMIT: usize = 1024;

/// Snapshot of a monitor's last observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorReading {
    /// Verdict
    pub safe: bool,
    /// Content the verdict was derived from
    pub raw_value: String,
    /// When the content was last read successfully
    pub timestamp: DateTime<Utc>,
}

impl Default for MonitorReading {
    fn default() -> Self {
        Self {
            safe: false,
            raw_value: String::new(),
            timestamp: zero_time(),
        }
    }
}

impl MonitorReading {
    fn observed(&mut self, rule: &SafetyMatchingRule, content: String) {
        self.safe = rule.evaluate(&content);
        self.raw_value = content;
        self.timestamp = Utc::now();
    }

    fn failed(&mut self) {
        self.safe = false;
        self.raw_value.clear();
    }
}

/// A monitor with a fixed verdict
#[derive(Debug)]
pub struct DummyMonitor {
    info: DriverInfo,
    safe: bool,
}

/// A monitor reading a local file
#[derive(Debug)]
pub struct FileMonitor {
    info: DriverInfo,
    path: PathBuf,
    rule: SafetyMatchingRule,
    reading: RwLock<MonitorReading>,
}

/// A monitor fetching a URL
#[derive(Debug)]
pub struct HttpMonitor {
    info: DriverInfo,
    url: String,
    rule: SafetyMatchingRule,
    client: Client,
    reading: RwLock<MonitorReading>,
}

/// A safety monitor driver
#[derive(Debug)]
pub enum SafetyMonitor {
    /// Fixed verdict
    Dummy(DummyMonitor),
    /// Local file
    File(FileMonitor),
    /// Remote URL
    Http(HttpMonitor),
}

impl SafetyMonitor {
    /// Create a monitor that always reports `safe`
    pub fn dummy(info: DriverInfo, safe: bool) -> Self {
        Self::Dummy(DummyMonitor { info, safe })
    }

    /// Create a file monitor and take a first reading
    pub async fn file(info: DriverInfo, path: impl AsRef<Path>, rule: SafetyMatchingRule) -> Self {
        let monitor = Self::File(FileMonitor {
            info,
            path: path.as_ref().to_path_buf(),
            rule,
            reading: RwLock::new(MonitorReading::default()),
        });
        monitor.poll().await;
        monitor
    }

    /// Create an HTTP monitor and take a first reading
    pub async fn http(info: DriverInfo, url: impl Into<String>, rule: SafetyMatchingRule) -> Result<Self> {
        let monitor = Self::Http(HttpMonitor {
            info,
            url: url.into(),
            rule,
            client: transport::client()?,
            reading: RwLock::new(MonitorReading::default()),
        });
        monitor.poll().await;
        Ok(monitor)
    }

    /// The current verdict
    pub async fn is_safe(&self) -> bool {
        match self {
            Self::Dummy(dummy) => dummy.safe,
            _ => self.reading().await.safe,
        }
    }

    /// The content the verdict was derived from
    pub async fn raw_value(&self) -> String {
        self.reading().await.raw_value
    }

    /// When the content was last read successfully
    pub async fn timestamp(&self) -> DateTime<Utc> {
        self.reading().await.timestamp
    }

    /// A consistent snapshot of verdict, content and timestamp
    pub async fn reading(&self) -> MonitorReading {
        match self {
            Self::Dummy(dummy) => MonitorReading {
                safe: dummy.safe,
                ..MonitorReading::default()
            },
            Self::File(file) => file.reading.read().await.clone(),
            Self::Http(http) => http.reading.read().await.clone(),
        }
    }

    async fn poll(&self) {
        match self {
            Self::Dummy(_) => {}
            Self::File(file) => file.refresh().await,
            Self::Http(http) => http.refresh().await,
        }
    }
}

impl FileMonitor {
    async fn read_content(&self) -> Result<String> {
        let file = tokio::fs::File::open(&self.path).await?;
        let mut buf = Vec::with_capacity(MONITOR_READ_LIMIT);
        file.take(MONITOR_READ_LIMIT as u64).read_to_end(&mut buf).await?;
        if buf.is_empty() {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    async fn refresh(&self) {
        let content = self.read_content().await;
        let mut reading = self.reading.write().await;
        match content {
            Ok(content) => reading.observed(&self.rule, content),
            Err(e) => {
                warn!(id = %self.info.id, path = %self.path.display(), "Safety monitor read failed: {}", e);
                reading.failed();
            }
        }
    }
}

impl HttpMonitor {
    async fn fetch_content(&self) -> Result<String> {
        let response = self.client.get(&self.url).send().await?;
        let body = transport::read_capped(response, MONITOR_READ_LIMIT).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn refresh(&self) {
        let content = self.fetch_content().await;
        let mut reading = self.reading.write().await;
        match content {
            Ok(content) => reading.observed(&self.rule, content),
            Err(e) => {
                warn!(id = %self.info.id, url = %self.url, "Safety monitor fetch failed: {}", e);
                reading.failed();
            }
        }
    }
}

#[async_trait]
impl Driver for SafetyMonitor {
    fn info(&self) -> &DriverInfo {
        match self {
            Self::Dummy(dummy) => &dummy.info,
            Self::File(file) => &file.info,
            Self::Http(http) => &http.info,
        }
    }

    fn category(&self) -> DeviceCategory {
        DeviceCategory::SafetyMonitor
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Dummy(_) => "dummy",
            Self::File(_) => "file",
            Self::Http(_) => "http",
        }
    }

    async fn refresh(&self) -> Result<()> {
        self.poll().await;
        Ok(())
    }

    async fn state_summary(&self) -> String {
        let reading = self.reading().await;
        format!("safe={} raw={:?}", reading.safe, reading.raw_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use axum::{routing::get, Router};
    use tempfile::NamedTempFile;

    use crate::transport::testing;

    fn info(id: &str) -> DriverInfo {
        DriverInfo::new(id, format!("{} monitor", id), "test monitor")
    }

    async fn serve_text(body: &'static str) -> String {
        let app = Router::new().route("/status", get(move || async move { body }));
        format!("http://{}/status", testing::serve(app).await)
    }

    #[tokio::test]
    async fn test_dummy_monitor_is_fixed() {
        let monitor = SafetyMonitor::dummy(info("always"), true);
        assert!(monitor.is_safe().await);
        assert_eq!(monitor.raw_value().await, "");
        assert_eq!(monitor.timestamp().await, zero_time());
        tokio_test::assert_ok!(monitor.refresh().await);
        assert!(monitor.is_safe().await);
        assert_eq!(monitor.kind(), "dummy");
    }

    #[test_log::test(tokio::test)]
    async fn test_file_monitor_evaluates_content() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "Roof: OPEN").unwrap();

        let rule = SafetyMatchingRule::new("open", false);
        let monitor = SafetyMonitor::file(info("roof"), file.path(), rule).await;

        assert!(monitor.is_safe().await);
        assert_eq!(monitor.raw_value().await, "Roof: OPEN");
        assert!(monitor.timestamp().await > zero_time());
    }

    #[tokio::test]
    async fn test_file_monitor_respects_invert() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "rain").unwrap();

        let monitor =
            SafetyMonitor::file(info("rain"), file.path(), SafetyMatchingRule::new("rain", true)).await;
        assert!(!monitor.is_safe().await);
    }

    #[tokio::test]
    async fn test_file_monitor_failure_is_unsafe() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "true").unwrap();
        let monitor = SafetyMonitor::file(info("flag"), file.path(), SafetyMatchingRule::default()).await;
        assert!(monitor.is_safe().await);
        let last_good = monitor.timestamp().await;

        std::fs::remove_file(file.path()).unwrap();
        tokio_test::assert_ok!(monitor.refresh().await);

        let reading = monitor.reading().await;
        assert!(!reading.safe);
        assert_eq!(reading.raw_value, "");
        assert_eq!(reading.timestamp, last_good);
    }

    #[tokio::test]
    async fn test_empty_file_is_unsafe() {
        let file = NamedTempFile::new().unwrap();
        let monitor = SafetyMonitor::file(info("empty"), file.path(), SafetyMatchingRule::default()).await;
        let reading = monitor.reading().await;
        assert!(!reading.safe);
        assert_eq!(reading.timestamp, zero_time());
    }

    #[tokio::test]
    async fn test_file_monitor_reads_at_most_limit() {
        let mut file = NamedTempFile::new().unwrap();
        let content = "x".repeat(MONITOR_READ_LIMIT) + "true";
        file.write_all(content.as_bytes()).unwrap();

        let monitor = SafetyMonitor::file(info("big"), file.path(), SafetyMatchingRule::default()).await;
        assert_eq!(monitor.raw_value().await.len(), MONITOR_READ_LIMIT);
        assert!(!monitor.is_safe().await);
    }

    #[tokio::test]
    async fn test_http_monitor_evaluates_body() {
        let url = serve_text("safe=1").await;
        let monitor = SafetyMonitor::http(info("web"), url, SafetyMatchingRule::default())
            .await
            .unwrap();
        assert!(monitor.is_safe().await);
        assert_eq!(monitor.raw_value().await, "safe=1");
        assert_eq!(monitor.kind(), "http");
    }

    #[tokio::test]
    async fn test_http_monitor_unreachable_is_unsafe() {
        let addr = testing::closed_addr();
        let monitor = SafetyMonitor::http(
            info("gone"),
            format!("http://{}/status", addr),
            SafetyMatchingRule::default(),
        )
        .await
        .unwrap();

        tokio_test::assert_ok!(monitor.refresh().await);
        assert!(!monitor.is_safe().await);
        assert_eq!(monitor.raw_value().await, "");
    }
}
