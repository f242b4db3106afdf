//! 数据流水线：有界队列对 + 单消费者出口循环。
//!
//! 两条互相独立的有界 FIFO 队列（读数队列、解码失败队列）把 broker 的
//! 投递上下文和出口循环解耦。队列满时 `send` 挂起，反压一路传导回
//! MQTT 事件循环：有界内存优先于无界缓冲，代价是 sink 变慢时所有
//! 传感器一起排队。队列内部保序，两条队列之间不保证先后。

use async_trait::async_trait;
use domain::{DecodeFailure, Reading};
use sparsnas_telemetry::{
    record_reading_dropped, record_reading_relayed, record_relay_rejected,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 流水线错误。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 投递根本没能发起（连接失败、请求体写入失败等）：
    /// 视为持续性故障，整条流水线就地终止。
    #[error("delivery transport failure: {0}")]
    Transport(String),
    /// 队列对端已关闭。
    #[error("{0} queue closed")]
    QueueClosed(&'static str),
}

/// 队列容量配置，进程启动时定死，之后不再调整。
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub reading_capacity: usize,
    pub failure_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reading_capacity: 10,
            failure_capacity: 5,
        }
    }
}

impl PipelineConfig {
    fn sanitized(mut self) -> Self {
        if self.reading_capacity == 0 {
            self.reading_capacity = 1;
        }
        if self.failure_capacity == 0 {
            self.failure_capacity = 1;
        }
        self
    }
}

/// 队列生产端（入口阶段持有）。
#[derive(Clone)]
pub struct PipelineSender {
    readings: mpsc::Sender<Reading>,
    failures: mpsc::Sender<DecodeFailure>,
}

impl PipelineSender {
    /// 入队一条读数。队列满时挂起直到出口侧腾出槽位。
    pub async fn send_reading(&self, reading: Reading) -> Result<(), PipelineError> {
        self.readings
            .send(reading)
            .await
            .map_err(|_| PipelineError::QueueClosed("reading"))
    }

    /// 入队一条解码失败记录。队列满时挂起。
    pub async fn send_failure(&self, failure: DecodeFailure) -> Result<(), PipelineError> {
        self.failures
            .send(failure)
            .await
            .map_err(|_| PipelineError::QueueClosed("failure"))
    }
}

/// 队列消费端（出口循环独占）。
pub struct PipelineReceiver {
    readings: mpsc::Receiver<Reading>,
    failures: mpsc::Receiver<DecodeFailure>,
}

impl PipelineReceiver {
    /// 取下一条读数；所有生产端释放后返回 `None`。
    pub async fn recv_reading(&mut self) -> Option<Reading> {
        self.readings.recv().await
    }

    /// 取下一条解码失败记录；所有生产端释放后返回 `None`。
    pub async fn recv_failure(&mut self) -> Option<DecodeFailure> {
        self.failures.recv().await
    }

    /// 非阻塞取读数，队列空时返回 `None`。
    pub fn try_recv_reading(&mut self) -> Option<Reading> {
        self.readings.try_recv().ok()
    }

    /// 非阻塞取解码失败记录，队列空时返回 `None`。
    pub fn try_recv_failure(&mut self) -> Option<DecodeFailure> {
        self.failures.try_recv().ok()
    }
}

/// 构造一对有界队列。
pub fn queue_pair(config: PipelineConfig) -> (PipelineSender, PipelineReceiver) {
    let config = config.sanitized();
    let (reading_tx, reading_rx) = mpsc::channel(config.reading_capacity);
    let (failure_tx, failure_rx) = mpsc::channel(config.failure_capacity);
    (
        PipelineSender {
            readings: reading_tx,
            failures: failure_tx,
        },
        PipelineReceiver {
            readings: reading_rx,
            failures: failure_rx,
        },
    )
}

/// 单次投递的结果。
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// Sink 接受（HTTP 204）。
    Accepted,
    /// Sink 拒绝：记录响应原因，读数丢弃，流水线继续。
    Rejected { status: u16, reason: String },
}

/// 读数投递端抽象。
///
/// `Err` 表示投递根本没能发起，出口循环据此终止整条流水线；
/// 被 sink 拒绝的情况走 [`DeliveryOutcome::Rejected`]，不致命。
#[async_trait]
pub trait ReadingSink: Send + Sync {
    async fn deliver(&self, reading: &Reading) -> Result<DeliveryOutcome, PipelineError>;
}

/// 出口循环：独占两条队列的消费端。
///
/// 每次从任一队列取一条（两队就绪时由 `select!` 公平仲裁，无固定
/// 优先级）：失败记录只记日志；读数在转发开启时交给 sink，关闭时
/// 直接丢弃。正常运行没有终止态，循环活到进程结束；仅当两个生产端
/// 都已释放时干净退出。
pub struct Egress {
    receiver: PipelineReceiver,
    sink: Option<Arc<dyn ReadingSink>>,
}

impl Egress {
    /// `sink` 为 `None` 表示转发关闭（读数消费后丢弃）。
    pub fn new(receiver: PipelineReceiver, sink: Option<Arc<dyn ReadingSink>>) -> Self {
        Self { receiver, sink }
    }

    pub async fn run(mut self) -> Result<(), PipelineError> {
        let mut readings_open = true;
        let mut failures_open = true;
        while readings_open || failures_open {
            tokio::select! {
                maybe_failure = self.receiver.failures.recv(), if failures_open => {
                    match maybe_failure {
                        Some(failure) => log_failure(failure),
                        None => failures_open = false,
                    }
                }
                maybe_reading = self.receiver.readings.recv(), if readings_open => {
                    match maybe_reading {
                        Some(reading) => handle_reading(self.sink.as_deref(), reading).await?,
                        None => readings_open = false,
                    }
                }
            }
        }
        Ok(())
    }
}

/// 解码失败只记日志，绝不致命。
fn log_failure(failure: DecodeFailure) {
    warn!(target: "sparsnas.egress", error = %failure, "decode failure");
}

async fn handle_reading(
    sink: Option<&dyn ReadingSink>,
    reading: Reading,
) -> Result<(), PipelineError> {
    let Some(sink) = sink else {
        // 转发关闭：读数照常出队，然后丢弃
        record_reading_dropped();
        debug!(
            target: "sparsnas.egress",
            sensor = reading.sensor,
            sequence = reading.sequence,
            "forwarding disabled, reading dropped"
        );
        return Ok(());
    };

    info!(
        target: "sparsnas.egress",
        sensor = reading.sensor,
        sequence = reading.sequence,
        "dispatching reading"
    );
    match sink.deliver(&reading).await? {
        DeliveryOutcome::Accepted => {
            record_reading_relayed();
            info!(
                target: "sparsnas.egress",
                sensor = reading.sensor,
                sequence = reading.sequence,
                "reading relayed"
            );
        }
        DeliveryOutcome::Rejected { status, reason } => {
            // 被拒的读数丢弃不重投，流水线继续
            record_relay_rejected();
            warn!(
                target: "sparsnas.egress",
                sensor = reading.sensor,
                sequence = reading.sequence,
                status,
                reason = %reason,
                "sink rejected reading, dropped"
            );
        }
    }
    Ok(())
}
