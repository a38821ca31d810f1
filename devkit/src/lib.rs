/*!
# nextcloud-influx DevKit - Stubs et Utilitaires pour les tests

Bibliothèque facilitant les tests du reporter avec:
- Sink InfluxDB et heartbeat mockés
- Faux serveurs HTTP Nextcloud / InfluxDB
- Payloads serverinfo de référence
*/

pub mod fixtures;
pub mod sink_stub;
pub mod test_utils;

pub use fixtures::{envelope, serverinfo_payload};
pub use sink_stub::{Beat, MockSink, RecordingHeartbeat};
pub use test_utils::{FakeInflux, FakeNextcloud, TestHarness};
