// src/engine/aggregator.rs
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::server::ServerRecord;

/// Dedups by address (later records win) and sorts by ping, unknown ping
/// last, then by case-insensitive name, then by address.
pub fn aggregate(records: Vec<ServerRecord>) -> Vec<ServerRecord> {
    let mut by_host = HashMap::with_capacity(records.len());
    for record in records {
        by_host.insert(record.host, record);
    }

    let mut servers: Vec<ServerRecord> = by_host.into_values().collect();
    servers.sort_by(compare);
    servers
}

fn compare(a: &ServerRecord, b: &ServerRecord) -> Ordering {
    let ping = match (a.ping, b.ping) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    ping.then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.host.cmp(&b.host))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(host: &str, name: &str, ping: Option<u32>) -> ServerRecord {
        ServerRecord {
            host: host.parse().unwrap(),
            password: false,
            player_count: 0,
            player_limit: 16,
            ping,
            country: "unknown".to_string(),
            name: name.to_string(),
            game_id: "q3".to_string(),
            game_mod: "baseq3".to_string(),
            game_type: "FFA".to_string(),
            terrain: "q3dm6".to_string(),
        }
    }

    fn hosts(servers: &[ServerRecord]) -> Vec<String> {
        servers.iter().map(|s| s.host.to_string()).collect()
    }

    #[test]
    fn test_sorted_by_ping_unknown_last() {
        let out = aggregate(vec![
            record("10.0.0.1:1", "a", None),
            record("10.0.0.2:1", "b", Some(90)),
            record("10.0.0.3:1", "c", Some(15)),
            record("10.0.0.4:1", "d", None),
            record("10.0.0.5:1", "e", Some(40)),
        ]);

        let pings: Vec<Option<u32>> = out.iter().map(|s| s.ping).collect();
        assert_eq!(pings, vec![Some(15), Some(40), Some(90), None, None]);
        assert_eq!(out[3].name, "a");
        assert_eq!(out[4].name, "d");
    }

    #[test]
    fn test_ties_break_on_name_then_address() {
        let out = aggregate(vec![
            record("10.0.0.9:2", "beta", Some(30)),
            record("10.0.0.1:2", "Alpha", Some(30)),
            record("10.0.0.3:2", "alpha", Some(30)),
        ]);
        assert_eq!(hosts(&out), vec!["10.0.0.1:2", "10.0.0.3:2", "10.0.0.9:2"]);
    }

    #[test]
    fn test_dedup_last_writer_wins() {
        let out = aggregate(vec![
            record("10.0.0.1:27960", "old", Some(10)),
            record("10.0.0.2:27960", "other", Some(20)),
            record("10.0.0.1:27960", "new", Some(50)),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "other");
        assert_eq!(out[1].name, "new");
    }

    #[test]
    fn test_deterministic_for_any_input_order() {
        let mut input = vec![
            record("10.0.0.4:1", "x", None),
            record("10.0.0.2:1", "y", Some(5)),
            record("10.0.0.3:1", "Y", Some(5)),
            record("10.0.0.1:1", "x", None),
        ];
        let first = aggregate(input.clone());
        input.reverse();
        let second = aggregate(input);
        assert_eq!(first, second);
        assert_eq!(hosts(&first), vec!["10.0.0.2:1", "10.0.0.3:1", "10.0.0.1:1", "10.0.0.4:1"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate(Vec::new()).is_empty());
    }
}
