//! nextcloud-influx - Nextcloud serverinfo reporter for InfluxDB
//!
//! Periodically polls one or more Nextcloud `serverinfo` endpoints and writes
//! each response to InfluxDB:
//! - Fetch over HTTP with basic auth ([`instance`])
//! - Flatten the nested `ocs.data` payload into fields ([`flatten`])
//! - Write one point per instance, tagged `host=<name>` ([`sink`])
//! - Notify the supervisor after every cycle ([`heartbeat`])

pub mod config;
pub mod error;
pub mod flatten;
pub mod heartbeat;
pub mod instance;
pub mod reporter;
pub mod sink;

pub use config::{InfluxConfig, InstanceConfig, Settings};
pub use error::{ConfigError, PollError, SinkError, StructureError};
pub use flatten::{extract_payload, flatten, flatten_envelope, FlatRecord};
pub use heartbeat::{Heartbeat, NoopHeartbeat, SystemdNotifier};
pub use instance::NextcloudInstance;
pub use reporter::{CycleReport, Reporter};
pub use sink::{InfluxSink, Measurement, MetricsSink, MEASUREMENT};
