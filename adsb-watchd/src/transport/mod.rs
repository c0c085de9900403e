pub mod mqtt;

use std::sync::Arc;
use anyhow::Result;
use shared::protocol::{
    ALERTS_SUBTOPIC, ALIVE_SUBTOPIC, NOVEL_ALERT_SUBTOPIC, TOPIC_PREFIX, TRACKING_SUBTOPIC,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
}

/// Outbound half of the pub/sub capability. Inbound commands arrive on the
/// channel handed to the concrete transport when it is started.
pub trait Transport: Send + Sync {
    fn publish(&self, topic: &str, payload: &str, qos: Qos) -> Result<()>;
}

/// Topic layout under `adsb/<client id>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    base: String,
}

impl Topics {
    pub fn new(client_id: &str) -> Self {
        Self {
            base: format!("{}/{}", TOPIC_PREFIX, client_id),
        }
    }

    /// Commands are received, and acknowledged, on the base topic
    pub fn command(&self) -> &str {
        &self.base
    }

    pub fn alive(&self) -> String {
        format!("{}/{}", self.base, ALIVE_SUBTOPIC)
    }

    pub fn tracking(&self) -> String {
        format!("{}/{}", self.base, TRACKING_SUBTOPIC)
    }

    pub fn alerts(&self) -> String {
        format!("{}/{}", self.base, ALERTS_SUBTOPIC)
    }

    pub fn novel_alert(&self) -> String {
        format!("{}/{}", self.base, NOVEL_ALERT_SUBTOPIC)
    }
}

/// A transport plus its topic layout. Publishing through it never fails
/// the caller: errors are logged and reported as `false`.
#[derive(Clone)]
pub struct Publisher {
    transport: Arc<dyn Transport>,
    topics: Topics,
}

impl Publisher {
    pub fn new(transport: Arc<dyn Transport>, topics: Topics) -> Self {
        Self { transport, topics }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn publish(&self, topic: &str, payload: &str, qos: Qos) -> bool {
        match self.transport.publish(topic, payload, qos) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Publish to {} failed: {:#}", topic, e);
                false
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;
    use anyhow::bail;
    use super::*;

    /// Records every publish; optionally fails them all.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub published: Mutex<Vec<(String, String, Qos)>>,
        pub fail: bool,
    }

    impl RecordingTransport {
        pub fn failing() -> Self {
            Self { fail: true, ..Default::default() }
        }

        pub fn on_topic(&self, topic: &str) -> Vec<String> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _, _)| t == topic)
                .map(|(_, p, _)| p.clone())
                .collect()
        }
    }

    impl Transport for RecordingTransport {
        fn publish(&self, topic: &str, payload: &str, qos: Qos) -> Result<()> {
            if self.fail {
                bail!("broker unreachable");
            }
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string(), qos));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingTransport;
    use super::*;

    #[test]
    fn test_topic_layout() {
        let topics = Topics::new("pi-north");
        assert_eq!(topics.command(), "adsb/pi-north");
        assert_eq!(topics.alive(), "adsb/pi-north/alive");
        assert_eq!(topics.tracking(), "adsb/pi-north/tracking");
        assert_eq!(topics.alerts(), "adsb/pi-north/alerts");
        assert_eq!(topics.novel_alert(), "adsb/pi-north/tracking/alert");
    }

    #[test]
    fn test_publisher_swallows_failures() {
        let publisher = Publisher::new(Arc::new(RecordingTransport::failing()), Topics::new("x"));
        assert!(!publisher.publish("adsb/x", "hello", Qos::AtMostOnce));
    }
}
