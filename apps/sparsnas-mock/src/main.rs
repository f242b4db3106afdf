//! 模拟发布器：向 broker 周期发布伪造的 Sparsnäs 读数。
//!
//! 用于没有硬件时联调消费端：值域与真实电表的抓包一致，
//! 主题形如 `sparsnas/<sensor>`，QoS 0。

use clap::Parser;
use domain::Reading;
use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "sparsnas-mock", version, about = "Fake Sparsnäs reading publisher")]
struct Args {
    /// MQTT broker 的 IP 或主机名
    #[arg(long, default_value = "localhost")]
    broker: String,
    /// MQTT broker 端口
    #[arg(long, default_value_t = 1883)]
    port: u16,
    /// 发布间隔（秒）
    #[arg(long, default_value_t = 5)]
    interval_seconds: u64,
}

/// 生成一条伪造读数；`kwh` 为外部维护的累计计数。
fn fake_reading(kwh: f64) -> Reading {
    let mut rng = rand::rng();
    Reading {
        sequence: unix_seconds(),
        watt: rng.random_range(3000.0..4000.0),
        kwh,
        battery: 100.0,
        freq_err: rng.random::<f64>(),
        effect: rng.random_range(100..200),
        data4: 2,
        sensor: 123456,
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    sparsnas_telemetry::init_tracing();

    let mut options =
        rumqttc::MqttOptions::new("sparsnas-mock-publisher", args.broker.clone(), args.port);
    options.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = rumqttc::AsyncClient::new(options, 10);

    // 单独任务驱动 MQTT 事件循环
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                    info!(target: "sparsnas.mock", "mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(target: "sparsnas.mock", error = %err, "mqtt connection lost");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    // 累计电量从一个随机起点开始，只增不减
    let mut kwh = rand::rng().random_range(1000.0..2000.0);
    loop {
        kwh += rand::rng().random::<f64>();
        let reading = fake_reading(kwh);
        let topic = format!("sparsnas/{}", reading.sensor);
        let payload = serde_json::to_vec(&reading)?;
        info!(
            target: "sparsnas.mock",
            topic = %topic,
            payload = %String::from_utf8_lossy(&payload),
            "publishing reading"
        );
        client
            .publish(topic, rumqttc::QoS::AtMostOnce, false, payload)
            .await?;
        tokio::time::sleep(Duration::from_secs(args.interval_seconds)).await;
    }
}
