use std::time::Duration;
use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, TlsConfiguration};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::config::{AwsConfig, MqttConfig};
use super::{Qos, Transport};

/// Capacity of the client's request queue; publishes beyond it fail fast.
const REQUEST_CAPACITY: usize = 64;

/// Pause before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

impl From<Qos> for QoS {
    fn from(qos: Qos) -> Self {
        match qos {
            Qos::AtMostOnce => QoS::AtMostOnce,
            Qos::AtLeastOnce => QoS::AtLeastOnce,
        }
    }
}

pub struct MqttTransport {
    client: AsyncClient,
}

impl Transport for MqttTransport {
    fn publish(&self, topic: &str, payload: &str, qos: Qos) -> Result<()> {
        self.client
            .try_publish(topic, qos.into(), false, payload.as_bytes().to_vec())
            .with_context(|| format!("Failed to queue publish to {}", topic))
    }
}

/// Plain MQTT with optional username/password.
pub fn mqtt_options(config: &MqttConfig, client_id: &str) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, config.host.as_str(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    if let Some(username) = &config.username {
        options.set_credentials(username.as_str(), config.password.clone().unwrap_or_default());
    }
    options
}

/// MQTT over mutual TLS with a client certificate, as AWS IoT expects.
pub fn aws_options(config: &AwsConfig, client_id: &str) -> Result<MqttOptions> {
    let read = |path: &std::path::Path| {
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
    };
    let ca = read(&config.root_ca)?;
    let cert = read(&config.cert)?;
    let key = read(&config.private_key)?;

    let mut options = MqttOptions::new(client_id, config.endpoint.as_str(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    options.set_transport(rumqttc::Transport::tls_with_config(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth: Some((cert, key)),
    }));
    Ok(options)
}

/// Start the client. Payloads received on `command_topic` are forwarded to
/// `commands`; the subscription is renewed on every (re)connect.
pub fn spawn(
    options: MqttOptions,
    command_topic: String,
    subscribe_qos: Qos,
    commands: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> (MqttTransport, JoinHandle<()>) {
    let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
    let loop_client = client.clone();

    let handle = tokio::spawn(async move {
        run_event_loop(loop_client, eventloop, command_topic, subscribe_qos, commands, cancel).await;
    });

    (MqttTransport { client }, handle)
}

async fn run_event_loop(
    client: AsyncClient,
    mut eventloop: EventLoop,
    command_topic: String,
    subscribe_qos: Qos,
    commands: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    tracing::info!("Starting MQTT event loop for {}", command_topic);

    loop {
        tokio::select! {
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!("Connected, subscribing to {}", command_topic);
                        if let Err(e) = client.try_subscribe(command_topic.as_str(), subscribe_qos.into()) {
                            tracing::error!("Failed to subscribe to {}: {}", command_topic, e);
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if publish.topic != command_topic {
                            continue;
                        }
                        let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                        tracing::debug!("Received command payload: {}", payload);
                        if let Err(e) = commands.send(payload).await {
                            tracing::error!("Command handler is gone: {}", e);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("MQTT connection error: {}", e);
                        tokio::select! {
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                            _ = cancel.cancelled() => break,
                        }
                    }
                }
            }

            _ = cancel.cancelled() => {
                tracing::info!("MQTT event loop shutting down");
                if let Err(e) = client.try_disconnect() {
                    tracing::debug!("Disconnect request failed: {}", e);
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_mapping() {
        assert_eq!(QoS::from(Qos::AtMostOnce), QoS::AtMostOnce);
        assert_eq!(QoS::from(Qos::AtLeastOnce), QoS::AtLeastOnce);
    }

    #[test]
    fn test_plain_options() {
        let config = MqttConfig {
            host: "broker.local".to_string(),
            port: 1884,
            client_id: None,
            username: Some("adsb".to_string()),
            password: None,
            keep_alive_secs: 30,
        };
        let options = mqtt_options(&config, "pi-north");
        assert_eq!(options.client_id(), "pi-north");
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 1884));
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
    }

    #[test]
    fn test_aws_options_need_readable_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let config = AwsConfig {
            endpoint: "example-ats.iot.eu-west-1.amazonaws.com".to_string(),
            port: 8883,
            client_id: None,
            root_ca: dir.path().join("missing-root.pem"),
            cert: dir.path().join("cert.pem"),
            private_key: dir.path().join("key.pem"),
            keep_alive_secs: 60,
        };
        assert!(aws_options(&config, "pi-south").is_err());
    }
}
