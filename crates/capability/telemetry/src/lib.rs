//! 结构化日志初始化与基础计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub readings_decoded: u64,
    pub decode_failures: u64,
    pub readings_relayed: u64,
    pub relay_rejected: u64,
    pub readings_dropped: u64,
}

/// 进程内基础指标。
pub struct TelemetryMetrics {
    messages_received: AtomicU64,
    readings_decoded: AtomicU64,
    decode_failures: AtomicU64,
    readings_relayed: AtomicU64,
    relay_rejected: AtomicU64,
    readings_dropped: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            readings_decoded: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            readings_relayed: AtomicU64::new(0),
            relay_rejected: AtomicU64::new(0),
            readings_dropped: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            readings_decoded: self.readings_decoded.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            readings_relayed: self.readings_relayed.load(Ordering::Relaxed),
            relay_rejected: self.relay_rejected.load(Ordering::Relaxed),
            readings_dropped: self.readings_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录收到一条入站消息（无论解码结果）。
pub fn record_message_received() {
    metrics().messages_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次解码成功。
pub fn record_reading_decoded() {
    metrics().readings_decoded.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次解码失败。
pub fn record_decode_failure() {
    metrics().decode_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次转发成功（InfluxDB 返回 204）。
pub fn record_reading_relayed() {
    metrics().readings_relayed.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次转发被拒（非 204 响应，读数被丢弃）。
pub fn record_relay_rejected() {
    metrics().relay_rejected.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次未转发丢弃（转发关闭时消费掉的读数）。
pub fn record_reading_dropped() {
    metrics().readings_dropped.fetch_add(1, Ordering::Relaxed);
}
