//! 应用运行配置加载。
//!
//! 配置来源两个可互换的适配器：环境变量（`SPARSNAS_*`）与命令行参数。
//! 优先级：命令行 > 环境变量 > 默认值。加载完成后配置不可变，
//! 以值/引用传入各阶段，核心内不存在进程级可变状态。

use clap::Parser;
use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_topic: String,
    pub influx_addr: String,
    pub influx_database: String,
    pub influx_forward: bool,
}

impl Default for AppConfig {
    /// 默认值与原始部署一致：本机 broker、全量订阅、不转发。
    fn default() -> Self {
        Self {
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_username: None,
            mqtt_password: None,
            mqtt_topic: "#".to_string(),
            influx_addr: "http://localhost:8086".to_string(),
            influx_database: "sparsnas".to_string(),
            influx_forward: false,
        }
    }
}

impl AppConfig {
    /// 从环境变量读取配置，缺失项取默认值。
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            mqtt_host: read_with_default("SPARSNAS_MQTT_HOST", defaults.mqtt_host),
            mqtt_port: read_u16_with_default("SPARSNAS_MQTT_PORT", defaults.mqtt_port)?,
            mqtt_username: read_optional("SPARSNAS_MQTT_USERNAME"),
            mqtt_password: read_optional("SPARSNAS_MQTT_PASSWORD"),
            mqtt_topic: read_with_default("SPARSNAS_MQTT_TOPIC", defaults.mqtt_topic),
            influx_addr: read_with_default("SPARSNAS_INFLUX_ADDR", defaults.influx_addr),
            influx_database: read_with_default("SPARSNAS_INFLUX_DATABASE", defaults.influx_database),
            influx_forward: read_bool_with_default("SPARSNAS_INFLUX_FORWARD", defaults.influx_forward),
        })
    }

    /// 先读环境变量，再套命令行覆盖。
    pub fn load(overrides: &CliOverrides) -> Result<Self, ConfigError> {
        let mut config = Self::from_env()?;
        overrides.apply(&mut config);
        Ok(config)
    }
}

/// 命令行参数：每项都可选，仅覆盖对应配置。
#[derive(Debug, Default, Parser)]
#[command(name = "sparsnas-consumer", version, about = "Sparsnäs MQTT consumer / InfluxDB relay")]
pub struct CliOverrides {
    /// MQTT broker 的 IP 或主机名
    #[arg(long)]
    pub mqtt_host: Option<String>,
    /// MQTT broker 端口
    #[arg(long)]
    pub mqtt_port: Option<u16>,
    /// MQTT broker 用户名
    #[arg(long)]
    pub mqtt_username: Option<String>,
    /// MQTT broker 密码
    #[arg(long)]
    pub mqtt_password: Option<String>,
    /// 订阅的主题过滤器
    #[arg(long)]
    pub mqtt_topic: Option<String>,
    /// InfluxDB 写入地址
    #[arg(long)]
    pub influx_addr: Option<String>,
    /// InfluxDB 数据库名
    #[arg(long)]
    pub influx_database: Option<String>,
    /// 开启后将解码成功的读数转发到 InfluxDB
    #[arg(long)]
    pub influx_forward: bool,
}

impl CliOverrides {
    /// 把显式给出的命令行项覆盖到配置上。
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.mqtt_host {
            config.mqtt_host = host.clone();
        }
        if let Some(port) = self.mqtt_port {
            config.mqtt_port = port;
        }
        if let Some(username) = &self.mqtt_username {
            config.mqtt_username = Some(username.clone());
        }
        if let Some(password) = &self.mqtt_password {
            config.mqtt_password = Some(password.clone());
        }
        if let Some(topic) = &self.mqtt_topic {
            config.mqtt_topic = topic.clone();
        }
        if let Some(addr) = &self.influx_addr {
            config.influx_addr = addr.clone();
        }
        if let Some(database) = &self.influx_database {
            config.influx_database = database.clone();
        }
        if self.influx_forward {
            config.influx_forward = true;
        }
    }
}

fn read_with_default(key: &str, default: String) -> String {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default,
    }
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
