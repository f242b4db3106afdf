use serde::{Deserialize, Serialize};

/// 解码错误：报文不是合法 JSON，或顶层不是 JSON 对象。
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// 解码失败记录：保留来源主题、原始报文与底层解析错误，
/// 仅用于出口侧记日志。
#[derive(Debug, thiserror::Error)]
#[error("unmarshal json payload {text} on topic {topic} failed: {source}", text = String::from_utf8_lossy(.payload))]
pub struct DecodeFailure {
    /// 报文来源主题
    pub topic: String,
    /// 原始报文字节（可能不是合法 UTF-8，展示时按 lossy 处理）
    pub payload: Vec<u8>,
    /// 底层解码错误
    pub source: DecodeError,
}

/// Sparsnäs 电表读数。
///
/// 解码后不可变，不携带合成 ID。示例报文：
/// `{"Sequence": 26960, "Watt": 4656.00, "kWh": 1849.536, "battery": 100,
/// "FreqErr": -0.13, "Effect": 194, "Data4": 2, "Sensor": 671150}`
///
/// 所有字段从解析角度都是可选的：缺失的数值字段取零值（沿用原始
/// 协议的宽松解码语义，不做 schema 校验）；未识别的键忽略。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// 传感器内单调递增的序号（跨传感器无全局顺序）
    #[serde(rename = "Sequence", default)]
    pub sequence: u64,
    /// 瞬时功率（W）
    #[serde(rename = "Watt", default)]
    pub watt: f64,
    /// 累计电量（kWh），按传感器单调不减，本系统不做校验
    #[serde(rename = "kWh", default)]
    pub kwh: f64,
    /// 电池电量百分比（0-100，不做区间校验）
    #[serde(rename = "battery", default)]
    pub battery: f64,
    /// 频率偏差（带符号）
    #[serde(rename = "FreqErr", default)]
    pub freq_err: f64,
    /// 占空/效果值
    #[serde(rename = "Effect", default)]
    pub effect: i64,
    /// 保留字段，含义对本系统不透明
    #[serde(rename = "Data4", default)]
    pub data4: i64,
    /// 传感器标识，所有按传感器语义的分区键
    #[serde(rename = "Sensor", default)]
    pub sensor: i64,
}

impl Reading {
    /// 从原始报文解码读数。
    ///
    /// 合法 JSON 对象一定成功；非对象顶层（数组、标量）或非法
    /// JSON 返回 [`DecodeError`]。纯函数，无副作用。
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = br#"{"Sequence": 26960, "Watt": 4656.00, "kWh": 1849.536, "battery": 100, "FreqErr": -0.13, "Effect": 194, "Data4": 2, "Sensor": 671150}"#;

    #[test]
    fn decode_full_payload() {
        let reading = Reading::decode(SAMPLE).expect("decode");
        assert_eq!(reading.sequence, 26960);
        assert_eq!(reading.watt, 4656.0);
        assert_eq!(reading.kwh, 1849.536);
        assert_eq!(reading.battery, 100.0);
        assert_eq!(reading.freq_err, -0.13);
        assert_eq!(reading.effect, 194);
        assert_eq!(reading.data4, 2);
        assert_eq!(reading.sensor, 671150);
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let reading = Reading::decode(br#"{"Sensor": 671150}"#).expect("decode");
        assert_eq!(reading.sensor, 671150);
        assert_eq!(reading.sequence, 0);
        assert_eq!(reading.watt, 0.0);
        assert_eq!(reading.kwh, 0.0);
        assert_eq!(reading.battery, 0.0);
        assert_eq!(reading.freq_err, 0.0);
        assert_eq!(reading.effect, 0);
        assert_eq!(reading.data4, 0);
    }

    #[test]
    fn empty_object_is_all_zero() {
        let reading = Reading::decode(b"{}").expect("decode");
        assert_eq!(reading.sensor, 0);
        assert_eq!(reading.watt, 0.0);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let reading =
            Reading::decode(br#"{"Watt": 42.5, "Firmware": "1.2.3", "rssi": -71}"#).expect("decode");
        assert_eq!(reading.watt, 42.5);
    }

    #[test]
    fn invalid_json_fails() {
        assert!(Reading::decode(b"not json").is_err());
        assert!(Reading::decode(b"").is_err());
        assert!(Reading::decode(br#"{"Watt": "#).is_err());
    }

    #[test]
    fn non_object_top_level_fails() {
        assert!(Reading::decode(b"[1, 2, 3]").is_err());
        assert!(Reading::decode(b"42").is_err());
        assert!(Reading::decode(br#""reading""#).is_err());
        assert!(Reading::decode(b"null").is_err());
    }

    #[test]
    fn decode_failure_mentions_topic_and_payload() {
        let payload = b"not json".to_vec();
        let source = Reading::decode(&payload).expect_err("must fail");
        let failure = DecodeFailure {
            topic: "sparsnas/671150".to_string(),
            payload,
            source,
        };
        let message = failure.to_string();
        assert!(message.contains("not json"), "message: {message}");
        assert!(message.contains("sparsnas/671150"), "message: {message}");
    }
}
