//! MQTT 采集源。
//!
//! 订阅 broker 上的读数主题，把每条入站发布交给 [`MessageHandler`]。
//! 处理器在 broker 的投递上下文里执行：它的挂起（如下游队列满）
//! 会直接反压到 MQTT 事件循环，这是系统有界内存的来源。
//!
//! 连接错误不终止采集：事件循环在下一次 poll 时自动重连，这里只
//! 等待一个固定间隔再继续轮询，并在每次（重）连接成功后重新下发
//! 订阅。

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 连接错误后的重试轮询间隔。
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// 采集错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("handler error: {0}")]
    Handler(String),
    #[error("source error: {0}")]
    Source(String),
}

/// 入站原始消息：主题 + 原始报文字节。
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at_ms: i64,
}

/// 入站消息处理器：每条 MQTT 发布调用一次。
///
/// 实现方不得向投递上下文抛出致命错误；解码/入队问题要转成
/// 队列里的错误记录或日志行。返回 Err 仅表示该条消息处理失败，
/// 采集循环记日志后继续。
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: RawMessage) -> Result<(), IngestError>;
}

/// 采集源抽象。
#[async_trait]
pub trait Source: Send + Sync {
    async fn run(&self, handler: Arc<dyn MessageHandler>) -> Result<(), IngestError>;
}

/// MQTT 采集源配置。
#[derive(Debug, Clone)]
pub struct MqttSourceConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// 订阅的主题过滤器（默认全量 `#`）
    pub topic: String,
}

/// MQTT 采集源。
#[derive(Debug, Clone)]
pub struct MqttSource {
    config: MqttSourceConfig,
}

impl MqttSource {
    pub fn new(config: MqttSourceConfig) -> Self {
        Self { config }
    }
}

/// 单次事件循环轮询对应的动作。
#[derive(Debug)]
enum PollAction {
    /// （重）连接成功：需要重新下发订阅
    Resubscribe,
    /// 收到一条发布：交给处理器
    Dispatch(RawMessage),
    /// 其他协议包：忽略
    Ignore,
    /// 连接错误：等待后重试轮询（事件循环自身会重连）
    Backoff(String),
}

fn classify(event: Result<rumqttc::Event, rumqttc::ConnectionError>) -> PollAction {
    match event {
        Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => PollAction::Resubscribe,
        Ok(rumqttc::Event::Incoming(rumqttc::Packet::Publish(publish))) => {
            PollAction::Dispatch(RawMessage {
                topic: publish.topic.clone(),
                payload: publish.payload.to_vec(),
                received_at_ms: now_epoch_ms(),
            })
        }
        Ok(_) => PollAction::Ignore,
        Err(err) => PollAction::Backoff(err.to_string()),
    }
}

#[async_trait]
impl Source for MqttSource {
    async fn run(&self, handler: Arc<dyn MessageHandler>) -> Result<(), IngestError> {
        let client_id = format!("sparsnas-consumer-{}", now_epoch_ms());
        let mut options =
            rumqttc::MqttOptions::new(client_id, self.config.host.clone(), self.config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) =
            (self.config.username.as_ref(), self.config.password.as_ref())
        {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = rumqttc::AsyncClient::new(options, 10);

        loop {
            match classify(eventloop.poll().await) {
                PollAction::Resubscribe => {
                    info!(target: "sparsnas.ingest", "mqtt connected");
                    // 重连后订阅不保留，每个 ConnAck 都重新下发
                    // 读数发布端用 QoS 0，订阅端保持一致
                    client
                        .subscribe(self.config.topic.clone(), rumqttc::QoS::AtMostOnce)
                        .await
                        .map_err(|err| IngestError::Source(err.to_string()))?;
                }
                PollAction::Dispatch(message) => {
                    // 在投递上下文里等待处理器：队列满时在这里反压
                    if let Err(err) = handler.handle(message).await {
                        warn!(target: "sparsnas.ingest", error = %err, "message handler failed");
                    }
                }
                PollAction::Ignore => {}
                PollAction::Backoff(reason) => {
                    warn!(
                        target: "sparsnas.ingest",
                        error = %reason,
                        "mqtt connection lost, retrying"
                    );
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }
}

fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_backs_off_instead_of_terminating() {
        use std::io;

        let err = rumqttc::ConnectionError::Io(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        ));
        assert!(matches!(classify(Err(err)), PollAction::Backoff(_)));
    }

    #[test]
    fn connack_triggers_resubscribe() {
        let ack = rumqttc::ConnAck {
            session_present: false,
            code: rumqttc::ConnectReturnCode::Success,
        };
        let event = rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(ack));
        assert!(matches!(classify(Ok(event)), PollAction::Resubscribe));
    }

    #[test]
    fn publish_is_dispatched_with_topic_and_payload() {
        let publish = rumqttc::Publish::new("sparsnas/671150", rumqttc::QoS::AtMostOnce, &b"{}"[..]);
        let event = rumqttc::Event::Incoming(rumqttc::Packet::Publish(publish));
        match classify(Ok(event)) {
            PollAction::Dispatch(message) => {
                assert_eq!(message.topic, "sparsnas/671150");
                assert_eq!(message.payload, b"{}");
                assert!(message.received_at_ms > 0);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn pings_are_ignored() {
        let event = rumqttc::Event::Incoming(rumqttc::Packet::PingResp);
        assert!(matches!(classify(Ok(event)), PollAction::Ignore));
    }
}
