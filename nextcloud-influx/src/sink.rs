//! Measurements and the InfluxDB write path
//!
//! Points are encoded in InfluxDB line protocol and POSTed to the 1.x
//! `/write` endpoint. No timestamp is sent, the server stamps each point on
//! arrival.

use crate::config::InfluxConfig;
use crate::error::{truncate_body, SinkError};
use crate::flatten::FlatRecord;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Measurement name every instance reports under
pub const MEASUREMENT: &str = "nextcloud";

/// One point: a flat record tagged with the instance it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub fields: FlatRecord,
}

impl Measurement {
    pub fn for_instance(instance: &str, fields: FlatRecord) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("host".to_string(), instance.to_string());
        Self {
            name: MEASUREMENT.to_string(),
            tags,
            fields,
        }
    }

    /// Value of the `host` tag
    pub fn host(&self) -> Option<&str> {
        self.tags.get("host").map(String::as_str)
    }

    /// Encode as a single line-protocol line.
    ///
    /// `null` and empty strings are skipped; arrays are written as their JSON
    /// text. Returns `None` when no field survives.
    pub fn to_line_protocol(&self) -> Option<String> {
        let fields: Vec<String> = self
            .fields
            .iter()
            .filter_map(|(key, value)| {
                encode_field_value(value).map(|v| format!("{}={}", escape_key(key), v))
            })
            .collect();

        if fields.is_empty() {
            return None;
        }

        let mut line = escape_measurement(&self.name);
        for (key, value) in &self.tags {
            if value.is_empty() {
                continue;
            }
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }
        line.push(' ');
        line.push_str(&fields.join(","));
        Some(line)
    }
}

fn escape_measurement(name: &str) -> String {
    name.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_key(key: &str) -> String {
    key.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn encode_field_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(format!("{i}i"))
            } else if let Some(u) = n.as_u64() {
                // no `u` suffix: 1.x servers reject unsigned literals unless enabled
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| f.to_string())
            }
        }
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(quote(s)),
        Value::Array(_) | Value::Object(_) => Some(quote(&value.to_string())),
    }
}

/// Destination for measurements
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn write(&self, measurement: &Measurement) -> Result<(), SinkError>;

    /// Human readable target, for logs
    fn describe(&self) -> String;
}

/// InfluxDB 1.x HTTP writer
pub struct InfluxSink {
    client: reqwest::Client,
    write_url: String,
    database: String,
    credentials: Option<(String, Option<String>)>,
    host: String,
}

impl InfluxSink {
    pub fn new(config: &InfluxConfig, timeout: Duration) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(config.ssl && !config.verify_ssl)
            .build()?;

        Ok(Self {
            client,
            write_url: format!("{}/write", config.base_url()),
            database: config.database.clone(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
            host: config.host.clone(),
        })
    }
}

#[async_trait]
impl MetricsSink for InfluxSink {
    async fn write(&self, measurement: &Measurement) -> Result<(), SinkError> {
        let Some(line) = measurement.to_line_protocol() else {
            debug!("Measurement for {:?} has no writable fields", measurement.host());
            return Ok(());
        };

        let mut request = self
            .client
            .post(&self.write_url)
            .query(&[("db", self.database.as_str())])
            .body(line);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!("Wrote {} fields to InfluxDB", measurement.fields.len());
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body: truncate_body(&body, 512),
        })
    }

    fn describe(&self) -> String {
        self.host.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(pairs: &[(&str, Value)]) -> FlatRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_for_instance_tags_host() {
        let m = Measurement::for_instance("cloud", FlatRecord::new());
        assert_eq!(m.name, "nextcloud");
        assert_eq!(m.host(), Some("cloud"));
        assert_eq!(m.tags.len(), 1);
    }

    #[test]
    fn test_line_protocol_field_types() {
        let m = Measurement::for_instance(
            "cloud",
            record(&[
                ("a.int", json!(23)),
                ("b.float", json!(0.5)),
                ("c.bool", json!(true)),
                ("d.str", json!("nginx/1.18.0")),
                ("e.list", json!([0.1, 0.2])),
                ("f.big", json!(u64::MAX)),
            ]),
        );

        assert_eq!(
            m.to_line_protocol().unwrap(),
            "nextcloud,host=cloud a.int=23i,b.float=0.5,c.bool=true,\
             d.str=\"nginx/1.18.0\",e.list=\"[0.1,0.2]\",f.big=18446744073709551615"
        );
    }

    #[test]
    fn test_line_protocol_skips_null_and_empty() {
        let m = Measurement::for_instance(
            "cloud",
            record(&[("theme", json!("")), ("x", Value::Null), ("n", json!(1))]),
        );
        assert_eq!(m.to_line_protocol().unwrap(), "nextcloud,host=cloud n=1i");
    }

    #[test]
    fn test_line_protocol_without_fields() {
        let m = Measurement::for_instance("cloud", record(&[("theme", json!(""))]));
        assert!(m.to_line_protocol().is_none());
    }

    #[test]
    fn test_line_protocol_escaping() {
        let m = Measurement::for_instance(
            "my cloud,eu",
            record(&[
                ("memcache.local", json!("\\OC\\Memcache\\APCu")),
                ("odd key=1", json!("say \"hi\"")),
            ]),
        );

        assert_eq!(
            m.to_line_protocol().unwrap(),
            r#"nextcloud,host=my\ cloud\,eu memcache.local="\\OC\\Memcache\\APCu",odd\ key\=1="say \"hi\"""#
        );
    }

    #[test]
    fn test_line_protocol_escapes_trailing_backslash() {
        let m = Measurement::for_instance("share\\", record(&[("path\\", json!(1))]));
        assert_eq!(
            m.to_line_protocol().unwrap(),
            r#"nextcloud,host=share\\ path\\=1i"#
        );
    }

    #[test]
    fn test_influx_sink_describe() {
        let cfg = InfluxConfig {
            host: "influx.lan".into(),
            ..InfluxConfig::default()
        };
        let sink = InfluxSink::new(&cfg, Duration::from_secs(5)).unwrap();
        assert_eq!(sink.describe(), "influx.lan");
        assert_eq!(sink.write_url, "http://influx.lan:8086/write");
    }
}
