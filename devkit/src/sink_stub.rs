/*!
Stubs du sink InfluxDB et du heartbeat systemd

Permet de tester le reporter sans InfluxDB ni superviseur.
Enregistre toutes les mesures écrites et tous les signaux de vie émis.
*/

use async_trait::async_trait;
use nextcloud_influx::{Heartbeat, Measurement, MetricsSink, SinkError};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// Mock sink qui simule InfluxSink
#[derive(Clone, Default)]
pub struct MockSink {
    written: Arc<Mutex<Vec<Measurement>>>,
    rejected_hosts: Arc<Mutex<HashSet<String>>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Les écritures pour ce host échoueront (status 500)
    pub fn reject_host(&self, host: &str) {
        self.rejected_hosts.lock().insert(host.to_string());
    }

    /// Récupère toutes les mesures écrites (pour assertions de tests)
    pub fn get_written(&self) -> Vec<Measurement> {
        self.written.lock().clone()
    }

    /// Trouve les mesures écrites pour un host donné
    pub fn find_by_host(&self, host: &str) -> Vec<Measurement> {
        self.written
            .lock()
            .iter()
            .filter(|m| m.host() == Some(host))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MetricsSink for MockSink {
    async fn write(&self, measurement: &Measurement) -> Result<(), SinkError> {
        let host = measurement.host().unwrap_or_default();
        if self.rejected_hosts.lock().contains(host) {
            return Err(SinkError::Rejected {
                status: 500,
                body: format!("mock rejection for {host}"),
            });
        }

        self.written.lock().push(measurement.clone());
        tracing::info!("[MOCK] Wrote {} fields for {}", measurement.fields.len(), host);
        Ok(())
    }

    fn describe(&self) -> String {
        "mock-influx".to_string()
    }
}

/// Signal de vie enregistré
#[derive(Debug, Clone, PartialEq)]
pub enum Beat {
    Status(String),
    Ready,
}

/// Heartbeat qui garde la trace de chaque notification
#[derive(Clone, Default)]
pub struct RecordingHeartbeat {
    beats: Arc<Mutex<Vec<Beat>>>,
}

impl RecordingHeartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beats(&self) -> Vec<Beat> {
        self.beats.lock().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.beats
            .lock()
            .iter()
            .filter_map(|b| match b {
                Beat::Status(s) => Some(s.clone()),
                Beat::Ready => None,
            })
            .collect()
    }

    pub fn ready_count(&self) -> usize {
        self.beats.lock().iter().filter(|b| **b == Beat::Ready).count()
    }
}

impl Heartbeat for RecordingHeartbeat {
    fn notify(&self, status: &str) {
        self.beats.lock().push(Beat::Status(status.to_string()));
    }

    fn ready(&self) {
        self.beats.lock().push(Beat::Ready);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nextcloud_influx::FlatRecord;

    #[tokio::test]
    async fn test_mock_sink_records_and_rejects() {
        let sink = MockSink::new();
        sink.reject_host("bad");

        sink.write(&Measurement::for_instance("good", FlatRecord::new()))
            .await
            .unwrap();
        let err = sink
            .write(&Measurement::for_instance("bad", FlatRecord::new()))
            .await
            .unwrap_err();

        assert!(matches!(err, SinkError::Rejected { status: 500, .. }));
        assert_eq!(sink.get_written().len(), 1);
        assert_eq!(sink.find_by_host("good").len(), 1);
        assert!(sink.find_by_host("bad").is_empty());
    }

    #[test]
    fn test_recording_heartbeat() {
        let hb = RecordingHeartbeat::new();
        hb.notify("hello");
        hb.ready();

        assert_eq!(hb.beats(), vec![Beat::Status("hello".into()), Beat::Ready]);
        assert_eq!(hb.statuses(), vec!["hello".to_string()]);
        assert_eq!(hb.ready_count(), 1);
    }
}
