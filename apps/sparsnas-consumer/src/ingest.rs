//! 入口阶段：每条入站消息解码一次并入队。
//!
//! 运行在 MQTT 的投递上下文里：任何解码或入队问题都转成队列记录
//! 或日志行，绝不向投递上下文抛出致命错误。队列满时 `send` 挂起，
//! 反压由此传导回 broker 的事件循环。

use async_trait::async_trait;
use domain::{DecodeFailure, Reading};
use sparsnas_ingest::{IngestError, MessageHandler, RawMessage};
use sparsnas_pipeline::PipelineSender;
use sparsnas_telemetry::{
    record_decode_failure, record_message_received, record_reading_decoded,
};
use tracing::info;

/// 解码入队处理器：入口阶段的实现。
pub struct DecodingHandler {
    sender: PipelineSender,
}

impl DecodingHandler {
    pub fn new(sender: PipelineSender) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl MessageHandler for DecodingHandler {
    async fn handle(&self, message: RawMessage) -> Result<(), IngestError> {
        record_message_received();
        // 每条消息记一行诊断日志，与解码结果无关
        info!(
            target: "sparsnas.ingest",
            topic = %message.topic,
            payload = %String::from_utf8_lossy(&message.payload),
            received_at_ms = message.received_at_ms,
            "received message"
        );

        match Reading::decode(&message.payload) {
            Ok(reading) => {
                record_reading_decoded();
                self.sender.send_reading(reading).await
            }
            Err(source) => {
                record_decode_failure();
                self.sender
                    .send_failure(DecodeFailure {
                        topic: message.topic,
                        payload: message.payload,
                        source,
                    })
                    .await
            }
        }
        // 队列对端消失意味着进程已在退出路径上；这里只把它当普通
        // 处理失败上报，由采集循环记日志
        .map_err(|err| IngestError::Handler(err.to_string()))
    }
}
