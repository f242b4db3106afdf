//! Sparsnäs 读数消费服务：订阅 MQTT 主题，可选转发到 InfluxDB。

mod ingest;

use clap::Parser;
use sparsnas_config::{AppConfig, CliOverrides};
use sparsnas_influx::{InfluxClient, InfluxConfig, InfluxReadingSink};
use sparsnas_ingest::{MqttSource, MqttSourceConfig, Source};
use sparsnas_pipeline::{Egress, PipelineConfig, ReadingSink, queue_pair};
use sparsnas_telemetry::init_tracing;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 配置优先级：命令行 > 环境变量 > 默认值
    let overrides = CliOverrides::parse();
    let config = AppConfig::load(&overrides)?;
    // 初始化结构化日志
    init_tracing();

    let sink = build_sink(&config).await;

    // 有界队列把 MQTT 投递上下文和出口循环解耦（读数 10 / 失败 5）
    let (sender, receiver) = queue_pair(PipelineConfig::default());
    let handler = Arc::new(ingest::DecodingHandler::new(sender));

    let source = MqttSource::new(MqttSourceConfig {
        host: config.mqtt_host.clone(),
        port: config.mqtt_port,
        username: config.mqtt_username.clone(),
        password: config.mqtt_password.clone(),
        topic: config.mqtt_topic.clone(),
    });
    // 任务结束时生产端随 handler 一起释放，出口循环随之退出
    let ingest_task = tokio::spawn(async move { source.run(handler).await });

    // 出口循环占据主任务；致命传输错误在这里冒出并结束进程
    Egress::new(receiver, sink).run().await?;

    // 出口循环只在采集侧终止后才干净退出；把采集侧的错误带出去，
    // 保证进程不会以成功状态静默结束
    match ingest_task.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            error!(target: "sparsnas.ingest", error = %err, "mqtt source terminated");
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

/// 转发开启时构造 InfluxDB 投递端并做一次探活（仅记日志）。
async fn build_sink(config: &AppConfig) -> Option<Arc<dyn ReadingSink>> {
    if !config.influx_forward {
        info!("forwarding to influxdb is not enabled, no measurements will be dispatched");
        return None;
    }

    let client = Arc::new(InfluxClient::new(InfluxConfig {
        addr: config.influx_addr.clone(),
        database: config.influx_database.clone(),
    }));
    // 探活失败不阻止启动：坏结果留给写入路径自己暴露
    match client.ping().await {
        Ok(()) => {
            info!(target: "sparsnas.influx", addr = %config.influx_addr, "influxdb reachable");
        }
        Err(err) => {
            warn!(target: "sparsnas.influx", error = %err, "influxdb ping failed");
        }
    }
    Some(Arc::new(InfluxReadingSink::new(client)))
}
