/*!
Payloads serverinfo de référence

Réponses OCS telles que renvoyées par `/ocs/v2.php/apps/serverinfo/api/v1/info?format=json`,
pour alimenter le faux serveur Nextcloud et les tests de flatten.
*/

use serde_json::{json, Value};

/// Chemin de l'API serverinfo sur une instance Nextcloud
pub const SERVERINFO_PATH: &str = "/ocs/v2.php/apps/serverinfo/api/v1/info";

/// Enveloppe OCS autour d'un payload `data`
pub fn envelope(data: Value) -> Value {
    json!({
        "ocs": {
            "meta": {
                "status": "ok",
                "statuscode": 200,
                "message": "OK"
            },
            "data": data
        }
    })
}

/// Réponse complète d'un Nextcloud 18
pub fn serverinfo_payload() -> Value {
    let system = json!({
        "version": "18.0.6.0",
        "theme": "",
        "enable_avatars": "yes",
        "enable_previews": "yes",
        "memcache.local": "\\OC\\Memcache\\APCu",
        "memcache.distributed": "none",
        "filelocking.enabled": "yes",
        "memcache.locking": "none",
        "debug": "no",
        "freespace": 735814049792u64,
        "cpuload": [0.6064453125, 0.62158203125, 0.5634765625],
        "mem_total": 8135448,
        "mem_free": 7589060,
        "swap_total": 4194300,
        "swap_free": 4149756,
        "apps": {
            "num_installed": 23,
            "num_updates_available": 0,
            "app_updates": []
        }
    });

    let shares = json!({
        "num_shares": 8,
        "num_shares_user": 0,
        "num_shares_groups": 0,
        "num_shares_link": 8,
        "num_shares_mail": 0,
        "num_shares_room": 0,
        "num_shares_link_no_password": 8,
        "num_fed_shares_sent": 0,
        "num_fed_shares_received": 0,
        "permissions_3_1": "7",
        "permissions_3_17": "1"
    });

    let server = json!({
        "webserver": "nginx/1.18.0",
        "php": {
            "version": "7.3.20",
            "memory_limit": 7516192768u64,
            "max_execution_time": 3600,
            "upload_max_filesize": 10737418240u64
        },
        "database": {
            "type": "mysql",
            "version": "10.4.13",
            "size": 78274560
        }
    });

    envelope(json!({
        "nextcloud": {
            "system": system,
            "storage": {
                "num_users": 2,
                "num_files": 145225,
                "num_storages": 3,
                "num_storages_local": 1,
                "num_storages_home": 2,
                "num_storages_other": 0
            },
            "shares": shares
        },
        "server": server,
        "activeUsers": {
            "last5minutes": 1,
            "last1hour": 1,
            "last24hours": 1
        }
    }))
}

/// Nombre de feuilles dans `serverinfo_payload()`
pub const SERVERINFO_LEAF_COUNT: usize = 46;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_flattens_to_expected_leaf_count() {
        let record = nextcloud_influx::flatten_envelope(&serverinfo_payload()).unwrap();
        assert_eq!(record.len(), SERVERINFO_LEAF_COUNT);
    }

    #[test]
    fn test_envelope_shape() {
        let env = envelope(json!({"k": 1}));
        assert_eq!(env["ocs"]["meta"]["statuscode"], 200);
        assert_eq!(env["ocs"]["data"]["k"], 1);
    }
}
