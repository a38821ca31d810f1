use nextcloud_influx::flatten_envelope;
use nextcloud_influx_devkit::fixtures::SERVERINFO_LEAF_COUNT;
use nextcloud_influx_devkit::serverinfo_payload;
use serde_json::json;

#[test]
fn test_format_serverinfo_payload() {
    let payload = serverinfo_payload();
    let formatted = flatten_envelope(&payload).unwrap();

    assert_eq!(formatted.len(), SERVERINFO_LEAF_COUNT);
    assert!(formatted.contains_key("nextcloud.system.version"));
    assert!(formatted["nextcloud.system.cpuload"].is_array());
    assert_eq!(formatted["nextcloud.system.cpuload"].as_array().unwrap().len(), 3);
    assert_eq!(formatted["nextcloud.system.apps.app_updates"], json!([]));
    assert_eq!(formatted["nextcloud.system.memcache.local"], json!("\\OC\\Memcache\\APCu"));
    assert_eq!(formatted["server.php.memory_limit"], json!(7516192768u64));
    assert_eq!(formatted["nextcloud.shares.permissions_3_17"], json!("1"));
    assert!(formatted.values().all(|v| !v.is_object()));
}

#[test]
fn test_payload_is_left_untouched() {
    let payload = serverinfo_payload();
    let before = payload.clone();
    let _ = flatten_envelope(&payload).unwrap();
    assert_eq!(payload, before);
}
