//! Route search history and per-user statistics.
//!
//! Searches are saved to the `searchHistory` collection of the session's
//! [`DocumentStore`], tagged with the signed-in user or marked anonymous.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::docstore::{DocumentQuery, DocumentStore};
use crate::error::Result;
use crate::identity::IdentityProvider;

/// Collection holding saved route searches.
pub const SEARCH_HISTORY_COLLECTION: &str = "searchHistory";

/// Precision of encoded polylines returned by the routing service.
pub const DEFAULT_POLYLINE_PRECISION: u8 = 5;

/// Most five-bit chunks one encoded value may use. Seven chunks hold 35 bits,
/// enough for any coordinate delta up to precision 7.
const MAX_POLYLINE_CHUNKS: u32 = 7;

/// Routing preference chosen for a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutePriority {
    /// Shortest travel time.
    #[default]
    Fastest,
    /// Shortest distance.
    Shortest,
    /// The routing service's recommendation.
    Recommended,
}

impl fmt::Display for RoutePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fastest => "fastest",
            Self::Shortest => "shortest",
            Self::Recommended => "recommended",
        })
    }
}

/// One route search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSearch {
    /// Start point as `[lat, lng]`.
    pub start: [f64; 2],
    /// End point as `[lat, lng]`.
    pub end: [f64; 2],
    /// Distance in kilometres.
    pub distance: f64,
    /// Travel time in minutes.
    pub time: f64,
    /// Routing preference.
    pub priority: RoutePriority,
}

impl RouteSearch {
    /// Build a search from a decoded route geometry.
    ///
    /// Returns `None` for an empty path.
    #[must_use]
    pub fn from_path(
        path: &[[f64; 2]],
        distance: f64,
        time: f64,
        priority: RoutePriority,
    ) -> Option<Self> {
        Some(Self {
            start: *path.first()?,
            end: *path.last()?,
            distance,
            time,
            priority,
        })
    }
}

/// Aggregates over a user's saved searches.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    /// Searches considered.
    pub count: usize,
    /// Sum of distances in kilometres.
    pub total_distance: f64,
    /// Sum of times in minutes.
    pub total_time: f64,
    /// Mean distance, 0 when there are no searches.
    pub avg_distance: f64,
    /// Mean time, 0 when there are no searches.
    pub avg_time: f64,
    /// The searches themselves, newest first.
    pub items: Vec<Value>,
}

/// Save a route search, tagged with the current identity.
///
/// Returns the id of the stored document.
///
/// # Errors
///
/// Returns an error if the document store rejects the write.
pub fn save_route_search(
    docs: &dyn DocumentStore,
    identity: &dyn IdentityProvider,
    search: &RouteSearch,
) -> Result<String> {
    let mut doc = serde_json::to_value(search)?;
    match identity.current() {
        Some(user) => {
            doc["uid"] = Value::String(user.uid);
            doc["email"] = user.email.map_or(Value::Null, Value::String);
        }
        None => doc["anon"] = Value::Bool(true),
    }
    let id = docs.save(SEARCH_HISTORY_COLLECTION, doc)?;
    info!(%id, priority = %search.priority, "Saved route search");
    Ok(id)
}

/// Statistics over the newest `limit` searches.
///
/// When someone is signed in only their searches count; otherwise every
/// stored search does.
///
/// # Errors
///
/// Returns an error if the document store cannot be read.
pub fn user_stats(
    docs: &dyn DocumentStore,
    identity: &dyn IdentityProvider,
    limit: usize,
) -> Result<UserStats> {
    let mut query = DocumentQuery::new().limit(limit);
    if let Some(user) = identity.current() {
        query = query.where_eq("uid", user.uid);
    }
    let items = docs.query(SEARCH_HISTORY_COLLECTION, &query)?;

    let total_distance: f64 = items.iter().map(|it| number_field(it, "distance")).sum();
    let total_time: f64 = items.iter().map(|it| number_field(it, "time")).sum();
    let (avg_distance, avg_time) = if items.is_empty() {
        (0.0, 0.0)
    } else {
        #[allow(clippy::cast_precision_loss)]
        let count = items.len() as f64;
        (total_distance / count, total_time / count)
    };

    Ok(UserStats {
        count: items.len(),
        total_distance,
        total_time,
        avg_distance,
        avg_time,
        items,
    })
}

/// A numeric field that may be stored as a number or a numeric string.
fn number_field(doc: &Value, field: &str) -> f64 {
    match doc.get(field) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Decode an encoded polyline into `[lat, lng]` points.
///
/// Decoding stops at the first incomplete or malformed point, including one
/// whose value is too wide for a coordinate.
#[must_use]
pub fn decode_polyline(encoded: &str, precision: u8) -> Vec<[f64; 2]> {
    let factor = 10f64.powi(i32::from(precision));
    let bytes = encoded.as_bytes();
    let mut index = 0;
    let (mut lat, mut lng) = (0i64, 0i64);
    let mut points = Vec::new();

    while index < bytes.len() {
        let Some(d_lat) = next_value(bytes, &mut index) else {
            break;
        };
        let Some(d_lng) = next_value(bytes, &mut index) else {
            break;
        };
        let (Some(next_lat), Some(next_lng)) = (lat.checked_add(d_lat), lng.checked_add(d_lng))
        else {
            break;
        };
        lat = next_lat;
        lng = next_lng;
        #[allow(clippy::cast_precision_loss)]
        let point = [lat as f64 / factor, lng as f64 / factor];
        points.push(point);
    }
    points
}

fn next_value(bytes: &[u8], index: &mut usize) -> Option<i64> {
    let mut result = 0i64;
    let mut shift = 0u32;
    loop {
        let chunk = i64::from(*bytes.get(*index)?) - 63;
        *index += 1;
        if !(0..64).contains(&chunk) || shift >= MAX_POLYLINE_CHUNKS * 5 {
            return None;
        }
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }
    Some(if result & 1 == 1 {
        !(result >> 1)
    } else {
        result >> 1
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::LocalDocumentStore;
    use crate::identity::{ConfigIdentity, Identity};
    use crate::config::IdentityConfig;
    use crate::storage::LocalStore;

    fn signed_in(uid: &str) -> ConfigIdentity {
        ConfigIdentity::new(&IdentityConfig {
            uid: Some(uid.to_string()),
            email: Some(format!("{uid}@example.com")),
        })
    }

    fn search(distance: f64, time: f64) -> RouteSearch {
        RouteSearch {
            start: [40.4, 49.8],
            end: [40.38, 49.9],
            distance,
            time,
            priority: RoutePriority::Fastest,
        }
    }

    #[test]
    fn test_save_tags_identity() {
        let docs = LocalDocumentStore::new(LocalStore::open_in_memory().unwrap());
        save_route_search(&docs, &signed_in("u1"), &search(5.0, 12.0)).unwrap();

        let stored = docs
            .query(SEARCH_HISTORY_COLLECTION, &DocumentQuery::new())
            .unwrap();
        assert_eq!(stored[0]["uid"], "u1");
        assert_eq!(stored[0]["email"], "u1@example.com");
        assert_eq!(stored[0]["priority"], "fastest");
        assert!(stored[0].get("anon").is_none());
    }

    #[test]
    fn test_save_anonymous() {
        let docs = LocalDocumentStore::new(LocalStore::open_in_memory().unwrap());
        save_route_search(&docs, &ConfigIdentity::anonymous(), &search(5.0, 12.0)).unwrap();

        let stored = docs
            .query(SEARCH_HISTORY_COLLECTION, &DocumentQuery::new())
            .unwrap();
        assert_eq!(stored[0]["anon"], true);
        assert!(stored[0].get("uid").is_none());
    }

    #[test]
    fn test_stats_filtered_by_user() {
        let docs = LocalDocumentStore::new(LocalStore::open_in_memory().unwrap());
        save_route_search(&docs, &signed_in("u1"), &search(4.0, 10.0)).unwrap();
        save_route_search(&docs, &signed_in("u1"), &search(6.0, 20.0)).unwrap();
        save_route_search(&docs, &signed_in("u2"), &search(100.0, 100.0)).unwrap();

        let stats = user_stats(&docs, &signed_in("u1"), 100).unwrap();
        assert_eq!(stats.count, 2);
        assert!((stats.total_distance - 10.0).abs() < 1e-9);
        assert!((stats.avg_distance - 5.0).abs() < 1e-9);
        assert!((stats.avg_time - 15.0).abs() < 1e-9);

        let everyone = user_stats(&docs, &ConfigIdentity::anonymous(), 100).unwrap();
        assert_eq!(everyone.count, 3);
    }

    #[test]
    fn test_stats_limit_and_empty() {
        let docs = LocalDocumentStore::new(LocalStore::open_in_memory().unwrap());
        let empty = user_stats(&docs, &ConfigIdentity::anonymous(), 10).unwrap();
        assert_eq!(empty.count, 0);
        assert!(empty.avg_time.abs() < f64::EPSILON);

        for _ in 0..3 {
            save_route_search(&docs, &ConfigIdentity::anonymous(), &search(1.0, 1.0)).unwrap();
        }
        assert_eq!(
            user_stats(&docs, &ConfigIdentity::anonymous(), 2)
                .unwrap()
                .count,
            2
        );
    }

    #[test]
    fn test_number_field_lenient() {
        let doc = serde_json::json!({"distance": "2.5", "time": "x"});
        assert!((number_field(&doc, "distance") - 2.5).abs() < f64::EPSILON);
        assert!(number_field(&doc, "time").abs() < f64::EPSILON);
        assert!(number_field(&doc, "missing").abs() < f64::EPSILON);
    }

    #[test]
    fn test_decode_polyline() {
        let points = decode_polyline("_p~iF~ps|U_ulLnnqC_mqNvxq`@", DEFAULT_POLYLINE_PRECISION);
        let expected = [[38.5, -120.2], [40.7, -120.95], [43.252, -126.453]];
        assert_eq!(points.len(), expected.len());
        for (got, want) in points.iter().zip(expected) {
            assert!((got[0] - want[0]).abs() < 1e-9);
            assert!((got[1] - want[1]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_decode_truncated_polyline() {
        assert!(decode_polyline("", 5).is_empty());
        // One complete point followed by half of another.
        assert_eq!(decode_polyline("_p~iF~ps|U_ulL", 5).len(), 1);
    }

    #[test]
    fn test_decode_oversized_values_stop_decoding() {
        // Every value runs to twelve chunks, far wider than a coordinate.
        assert!(decode_polyline(&"}~~~~~~~~~~^".repeat(34), 5).is_empty());

        // A good point survives when the next one is oversized.
        let encoded = format!("_p~iF~ps|U{}", "}~~~~~~~~~~^".repeat(4));
        let points = decode_polyline(&encoded, 5);
        assert_eq!(points.len(), 1);
        assert!((points[0][0] - 38.5).abs() < 1e-9);
    }

    #[test]
    fn test_decode_widest_values_do_not_overflow() {
        // Seven-chunk values, the widest accepted, summed many times over.
        let points = decode_polyline(&"~~~~~~^".repeat(2000), 5);
        assert_eq!(points.len(), 1000);
        assert!(points.iter().all(|p| p[0].is_finite() && p[1].is_finite()));
    }

    #[test]
    fn test_route_from_path() {
        let path = decode_polyline("_p~iF~ps|U_ulLnnqC", 5);
        let route = RouteSearch::from_path(&path, 3.0, 7.0, RoutePriority::Shortest).unwrap();
        assert!((route.start[0] - 38.5).abs() < 1e-9);
        assert!((route.end[1] + 120.95).abs() < 1e-9);
        assert!(RouteSearch::from_path(&[], 1.0, 1.0, RoutePriority::Fastest).is_none());
    }

    #[test]
    fn test_identity_used_directly() {
        #[derive(Debug)]
        struct Fixed;
        impl IdentityProvider for Fixed {
            fn current(&self) -> Option<Identity> {
                Some(Identity {
                    uid: "fixed".to_string(),
                    email: None,
                })
            }
        }
        let docs = LocalDocumentStore::new(LocalStore::open_in_memory().unwrap());
        save_route_search(&docs, &Fixed, &search(1.0, 2.0)).unwrap();
        let stats = user_stats(&docs, &Fixed, 10).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.items[0]["email"], Value::Null);
    }
}
