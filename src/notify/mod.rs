//! Notification construction: the query-string encoder (§6) and the
//! concrete message handed from C8 to C7.

use std::collections::BTreeMap;

use crate::event::EventKind;

pub mod distributor;
pub mod notifier;
pub mod params;

/// The concrete message handed to a notifier: kind, id, encoded query string,
/// and the request sequence used to key the cancel-manager interleave (§4.6).
#[derive(Clone, Debug)]
pub struct Notification {
    pub kind: EventKind,
    pub id: String,
    pub parameters: String,
    pub req_seq: i64,
}

/// Encodes a parameter map into a query string. Used identically by the
/// service and node parameter builders so the whole system shares one
/// encoding policy (§6 "Query-string encoding").
pub fn encode_query_string(params: &BTreeMap<String, String>) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}
