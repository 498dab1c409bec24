//! Subscriber-location registry model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One subscriber-location registry entry: where a subscriber is currently
/// served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlrRecord {
    pub imsi: String,
    pub serving_msc: String,
    pub serving_vlr: String,
    /// Region tag the routing policy branches on, e.g. `US-EAST`.
    pub region: String,
}

/// Downstream trunk set selected for a subscriber.
///
/// Unknown regions map to [`RouteGroup::International`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteGroup {
    #[serde(rename = "ROUTE_GROUP_EAST")]
    East,
    #[serde(rename = "ROUTE_GROUP_SOUTH")]
    South,
    #[serde(rename = "ROUTE_GROUP_INTL")]
    International,
}

impl RouteGroup {
    pub const fn as_str(self) -> &'static str {
        match self {
            RouteGroup::East => "ROUTE_GROUP_EAST",
            RouteGroup::South => "ROUTE_GROUP_SOUTH",
            RouteGroup::International => "ROUTE_GROUP_INTL",
        }
    }
}

impl fmt::Display for RouteGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
