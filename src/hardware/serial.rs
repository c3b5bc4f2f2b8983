// src/hardware/serial.rs - Serial hardware link
//
// A background reader task splits the byte stream into line frames and
// feeds an unbounded channel; `receive` is a plain `try_recv`, so the
// worker loop never blocks on feedback.

use super::{HardwareError, HardwareLink};
use crate::config::LinkConfig;
use async_trait::async_trait;
use serial2_tokio::SerialPort;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct SerialLink {
    port: Arc<SerialPort>,
    rx: mpsc::UnboundedReceiver<String>,
    write_timeout: Duration,
}

impl SerialLink {
    pub fn open(config: &LinkConfig) -> Result<Self, HardwareError> {
        tracing::info!(
            "Connecting to marionette hardware on {} at {} baud",
            config.serial,
            config.baud
        );
        let port = Arc::new(SerialPort::open(&config.serial, config.baud)?);
        let (tx, rx) = mpsc::unbounded_channel();

        let reader = port.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let mut pending = String::new();
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => {
                        tracing::info!("Serial connection closed by remote");
                        break;
                    }
                    Ok(n) => {
                        pending.push_str(&String::from_utf8_lossy(&buf[..n]));
                        while let Some(pos) = pending.find('\n') {
                            let line = pending[..pos].trim().to_string();
                            pending.drain(..=pos);
                            if !line.is_empty() {
                                tracing::trace!("Serial RX: {}", line);
                                if tx.send(line).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        if e.kind() == std::io::ErrorKind::TimedOut {
                            continue;
                        }
                        tracing::error!("Serial read error: {}", e);
                        break;
                    }
                }
            }
        });

        tracing::info!("Connected to marionette hardware");
        Ok(Self {
            port,
            rx,
            write_timeout: Duration::from_millis(config.write_timeout_ms),
        })
    }

    async fn send(&self, line: &str) -> Result<(), HardwareError> {
        tracing::debug!("Serial TX: {}", line);
        let framed = format!("{}\n", line);
        let write = async {
            let data = framed.as_bytes();
            let mut written = 0;
            while written < data.len() {
                written += self.port.write(&data[written..]).await?;
            }
            Ok::<(), std::io::Error>(())
        };
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::error!("Serial write timed out after {:?}", self.write_timeout);
                Err(HardwareError::Timeout)
            }
        }
    }
}

#[async_trait]
impl HardwareLink for SerialLink {
    async fn rotate_head(&mut self, angle: f64, speed: f64) -> Result<(), HardwareError> {
        self.send(&format!("h,{:.2},{:.0}", angle, speed)).await
    }

    async fn rotate_shoulder(&mut self, angle: f64, speed: f64) -> Result<(), HardwareError> {
        self.send(&format!("s,{:.2},{:.0}", angle, speed)).await
    }

    async fn rotate_motor(
        &mut self,
        channel_id: u8,
        angle: f64,
        speed: f64,
    ) -> Result<(), HardwareError> {
        self.send(&format!("m,{},{:.2},{:.0}", channel_id, angle, speed))
            .await
    }

    async fn rotate_eyes(
        &mut self,
        angle_x: f64,
        angle_y: f64,
        speed_x: f64,
        speed_y: f64,
    ) -> Result<(), HardwareError> {
        self.send(&format!(
            "e,{:.2},{:.2},{:.0},{:.0}",
            angle_x, angle_y, speed_x, speed_y
        ))
        .await
    }

    async fn engage_imu(&mut self) -> Result<(), HardwareError> {
        self.send("imu,1").await
    }

    async fn disengage_imu(&mut self) -> Result<(), HardwareError> {
        self.send("imu,0").await
    }

    async fn request_head_data(&mut self) -> Result<(), HardwareError> {
        self.send("hd").await
    }

    fn receive(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}
