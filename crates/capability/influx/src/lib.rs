//! InfluxDB v1 对接：行协议编码、HTTP 写入与启动探活。
//!
//! 写入端点 `POST {addr}/write?db={database}`，请求体为单行行协议，
//! 204 视为接受，其余状态码读取响应体作为拒绝原因。请求本身发不
//! 出去（连接错误等）映射为流水线的致命传输错误。

use async_trait::async_trait;
use domain::Reading;
use sparsnas_pipeline::{DeliveryOutcome, PipelineError, ReadingSink};
use std::sync::Arc;
use tracing::debug;

/// InfluxDB 访问错误。
#[derive(Debug, thiserror::Error)]
pub enum InfluxError {
    /// HTTP 请求没能发出（连接失败等）。
    #[error("influxdb transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// 探活返回了非预期状态码。
    #[error("influxdb unexpected status: expected 204 but got {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

/// 把读数编码为一行 InfluxDB 行协议。
///
/// 恒定格式：measurement `reading`，单个 tag `sensor`，六个 field 按
/// Sequence、Watt、kWh、battery、FreqErr、Effect 的顺序排列。浮点
/// 字段固定六位小数（与既有数据库中的历史点位保持一致），整数字段
/// 不带小数部分。全函数，对已解码的读数永不失败。
pub fn line_protocol(reading: &Reading) -> String {
    format!(
        "reading,sensor={} sequence={},watt={:.6},kwh={:.6},battery={:.6},freqerr={:.6},effect={}",
        reading.sensor,
        reading.sequence,
        reading.watt,
        reading.kwh,
        reading.battery,
        reading.freq_err,
        reading.effect,
    )
}

/// InfluxDB 连接配置。
#[derive(Debug, Clone)]
pub struct InfluxConfig {
    /// 服务地址，如 `http://localhost:8086`
    pub addr: String,
    /// 数据库名
    pub database: String,
}

/// InfluxDB v1 HTTP 客户端。
#[derive(Debug, Clone)]
pub struct InfluxClient {
    http: reqwest::Client,
    config: InfluxConfig,
}

impl InfluxClient {
    pub fn new(config: InfluxConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// 启动探活：`GET {addr}/ping`，预期 204。
    ///
    /// 仅供启动时参考，调用方对失败只记日志，不阻止流水线启动。
    pub async fn ping(&self) -> Result<(), InfluxError> {
        let url = format!("{}/ping", self.config.addr);
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(());
        }
        let body = read_body(response).await;
        Err(InfluxError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        })
    }

    /// 写入一行行协议数据。
    ///
    /// 204 为接受；其余状态码读取响应体作为拒绝原因返回给出口循环；
    /// 请求发不出去时返回 `Err`。
    pub async fn write(&self, line: &str) -> Result<DeliveryOutcome, InfluxError> {
        let url = format!("{}/write?db={}", self.config.addr, self.config.database);
        debug!(target: "sparsnas.influx", line, "writing line");
        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(line.to_string())
            .send()
            .await?;
        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(DeliveryOutcome::Accepted);
        }
        let reason = read_body(response).await;
        Ok(DeliveryOutcome::Rejected {
            status: status.as_u16(),
            reason,
        })
    }
}

async fn read_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|err| format!("could not read response body: {err}"))
}

/// 把 [`InfluxClient`] 接到流水线的投递端接缝上：先编码，再写入。
pub struct InfluxReadingSink {
    client: Arc<InfluxClient>,
}

impl InfluxReadingSink {
    pub fn new(client: Arc<InfluxClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReadingSink for InfluxReadingSink {
    async fn deliver(&self, reading: &Reading) -> Result<DeliveryOutcome, PipelineError> {
        let line = line_protocol(reading);
        self.client
            .write(&line)
            .await
            .map_err(|err| PipelineError::Transport(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_protocol_matches_reference() {
        let payload = br#"{"Sequence": 26960, "Watt": 4656.00, "kWh": 1849.536, "battery": 100, "FreqErr": -0.13, "Effect": 194, "Data4": 2, "Sensor": 671150}"#;
        let reading = Reading::decode(payload).expect("decode");
        assert_eq!(
            line_protocol(&reading),
            "reading,sensor=671150 sequence=26960,watt=4656.000000,kwh=1849.536000,battery=100.000000,freqerr=-0.130000,effect=194"
        );
    }

    #[test]
    fn line_protocol_renders_zero_defaults() {
        let reading = Reading::decode(b"{}").expect("decode");
        assert_eq!(
            line_protocol(&reading),
            "reading,sensor=0 sequence=0,watt=0.000000,kwh=0.000000,battery=0.000000,freqerr=0.000000,effect=0"
        );
    }

    #[test]
    fn line_protocol_round_trips_decoded_fields() {
        let payload = br#"{"Sequence": 1, "Watt": -12.5, "kWh": 0.001, "battery": 87.5, "FreqErr": 0.02, "Effect": 7, "Sensor": 42}"#;
        let reading = Reading::decode(payload).expect("decode");
        assert_eq!(
            line_protocol(&reading),
            "reading,sensor=42 sequence=1,watt=-12.500000,kwh=0.001000,battery=87.500000,freqerr=0.020000,effect=7"
        );
    }
}
