use std::time::Duration;

use log::{debug, error, info};
use rumqttc::{MqttOptions, QoS};
use serde::Serialize;

use crate::beacon::ProximityLevel;
use crate::config;
use crate::presenter::{DisplaySink, Presentation};

#[derive(Debug, Clone)]
pub struct MqttClient {
    client: rumqttc::AsyncClient,
    publisher_id: String,
    topic_path: String,
}

#[derive(Debug, Serialize)]
struct AlertMqttMessage<'a> {
    proximity: &'a str,
    text: &'a str,
    color: String,
    retained: bool,
}

#[derive(Debug, Serialize)]
struct NotificationMqttMessage<'a> {
    body: &'a str,
    retained: bool,
}

impl MqttClient {
    pub fn new(config: &config::MqttConfig) -> (Self, rumqttc::EventLoop) {
        let publisher_id = config
            .publisher_id
            .as_ref()
            .unwrap_or(&"sharkwatch".to_string())
            .to_string();

        let mut mqttoptions = MqttOptions::new(
            publisher_id.clone(),
            config.host.clone(),
            config.port.unwrap_or(1883),
        );

        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive_seconds.unwrap_or(5)));

        if let (Some(username), Some(password)) =
            (config.username.as_ref(), config.password.as_ref())
        {
            mqttoptions.set_credentials(username.clone(), password.clone());
        }

        let (client, eventloop) = rumqttc::AsyncClient::new(mqttoptions, 10);

        (
            MqttClient {
                client,
                publisher_id,
                topic_path: config.topic_path.clone().unwrap_or("sharkwatch".to_string()),
            },
            eventloop,
        )
    }

    /// Keep the connection alive. rumqttc reconnects on the next poll after
    /// an error, so this only needs to pace itself.
    pub async fn drive(mut eventloop: rumqttc::EventLoop) {
        loop {
            match eventloop.poll().await {
                Ok(rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_))) => {
                    debug!("Connection acknowledged");
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Error polling MQTT event loop: {:?}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Publish the current warning state, retained so late subscribers see it.
    pub async fn announce_alert(
        &self,
        channel: &str,
        level: ProximityLevel,
        presentation: &Presentation,
    ) -> Result<(), rumqttc::ClientError> {
        info!("Announcing {} proximity alert on MQTT", level.as_str());
        let message = AlertMqttMessage {
            proximity: level.as_str(),
            text: presentation.text,
            color: presentation.color.to_string(),
            retained: true,
        };
        self.client
            .publish(
                format!("{}/{}/{}/alert", self.topic_path, self.publisher_id, channel),
                QoS::AtMostOnce,
                true,
                serde_json::to_string(&message).unwrap(),
            )
            .await
    }

    pub async fn announce_notification(
        &self,
        channel: &str,
        body: &str,
    ) -> Result<(), rumqttc::ClientError> {
        info!("Publishing notification: {body}");
        let message = NotificationMqttMessage {
            body,
            retained: false,
        };
        self.client
            .publish(
                format!(
                    "{}/{}/{}/notification",
                    self.topic_path, self.publisher_id, channel
                ),
                QoS::AtMostOnce,
                false,
                serde_json::to_string(&message).unwrap(),
            )
            .await
    }

    pub async fn disconnect(&self) -> Result<(), rumqttc::ClientError> {
        debug!("Disconnecting MQTT client");
        self.client.disconnect().await
    }
}

/// The warning surface: display updates go out as retained MQTT state.
pub struct MqttDisplay {
    client: MqttClient,
    channel: String,
}

impl MqttDisplay {
    pub fn new(client: MqttClient, region_name: &str) -> Self {
        MqttDisplay {
            client,
            channel: sanitize_name(region_name),
        }
    }
}

impl DisplaySink for MqttDisplay {
    async fn display(
        &mut self,
        level: ProximityLevel,
        presentation: &Presentation,
    ) -> anyhow::Result<()> {
        self.client
            .announce_alert(&self.channel, level, presentation)
            .await?;
        Ok(())
    }
}

pub fn sanitize_name(name: &str) -> String {
    // Remove any non-alphanumeric characters and replace spaces with underscores
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_sanitize_name() {
        let name = "Shark Retreat #1";
        let sanitized = super::sanitize_name(name);
        assert_eq!(sanitized, "shark_retreat__1");
    }
}
