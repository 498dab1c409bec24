//! In-memory subscriber-location registry and the routing policy.

use std::collections::HashMap;

use types::{AlrRecord, RouteGroup};

/// Subscriber-location registry keyed by MSISDN.
///
/// Seeded at process start; a production deployment would hydrate this
/// from the subscriber database instead.
#[derive(Debug, Default)]
pub struct AlrStore {
    records: HashMap<String, AlrRecord>,
}

impl AlrStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the demo subscriber population.
    pub fn seeded() -> Self {
        let mut store = Self::new();
        store.insert(
            "+14085551234",
            AlrRecord {
                imsi: "310150123456789".to_string(),
                serving_msc: "MSC_DALLAS_01".to_string(),
                serving_vlr: "VLR_DAL_01".to_string(),
                region: "US-SOUTH".to_string(),
            },
        );
        store.insert(
            "+12125550123",
            AlrRecord {
                imsi: "310150987654321".to_string(),
                serving_msc: "MSC_NYC_01".to_string(),
                serving_vlr: "VLR_NYC_01".to_string(),
                region: "US-EAST".to_string(),
            },
        );
        store.insert(
            "+442079460123",
            AlrRecord {
                imsi: "234150111222333".to_string(),
                serving_msc: "MSC_LON_01".to_string(),
                serving_vlr: "VLR_LON_01".to_string(),
                region: "UK".to_string(),
            },
        );
        store
    }

    pub fn insert(&mut self, msisdn: &str, record: AlrRecord) {
        self.records.insert(msisdn.to_string(), record);
    }

    pub fn lookup(&self, msisdn: &str) -> Option<&AlrRecord> {
        self.records.get(msisdn)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Select the downstream trunk set for a located subscriber.
///
/// Unknown regions fall through to the international group.
pub fn route_policy(record: &AlrRecord) -> RouteGroup {
    match record.region.as_str() {
        "US-EAST" => RouteGroup::East,
        "US-SOUTH" => RouteGroup::South,
        _ => RouteGroup::International,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_store_resolves_known_subscribers() {
        let store = AlrStore::seeded();
        assert_eq!(store.len(), 3);

        let record = store.lookup("+14085551234").unwrap();
        assert_eq!(record.imsi, "310150123456789");
        assert_eq!(record.serving_msc, "MSC_DALLAS_01");
        assert_eq!(record.region, "US-SOUTH");

        assert!(store.lookup("+19999999999").is_none());
        assert!(store.lookup("").is_none());
    }

    #[test]
    fn policy_branches_on_region() {
        let mut record = AlrStore::seeded().lookup("+12125550123").unwrap().clone();
        assert_eq!(route_policy(&record), RouteGroup::East);

        record.region = "US-SOUTH".to_string();
        assert_eq!(route_policy(&record), RouteGroup::South);

        record.region = "UK".to_string();
        assert_eq!(route_policy(&record), RouteGroup::International);

        record.region = "SOMEWHERE-ELSE".to_string();
        assert_eq!(route_policy(&record), RouteGroup::International);
    }
}
