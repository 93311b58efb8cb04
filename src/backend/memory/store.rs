use bytes::Bytes;
use indexmap::IndexMap;

/// One stored message. The id is the key under which the record sits in its
/// queue; both timestamps are absolute unix seconds.
#[derive(Clone, Debug)]
pub(crate) struct MessageRecord {
    pub body: Bytes,
    /// Instant the message becomes deletable.
    pub ttl_at: u64,
    /// Instant before which range scans skip the message. 0 = never hidden.
    pub hide_until: u64,
}

impl MessageRecord {
    pub fn expired(&self, now: u64) -> bool {
        self.ttl_at <= now
    }

    pub fn hidden(&self, now: u64) -> bool {
        self.hide_until > now
    }

    /// Remaining ttl in seconds at `now`.
    pub fn ttl_left(&self, now: u64) -> u32 {
        self.ttl_at.saturating_sub(now) as u32
    }

    /// Remaining hide in seconds at `now`; 0 once visible.
    pub fn hide_left(&self, now: u64) -> u32 {
        self.hide_until.saturating_sub(now) as u32
    }
}

/// Messages of one queue, keyed by id, in insertion order.
pub(crate) type Queue = IndexMap<String, MessageRecord>;

/// Queues of one account, keyed by name, in insertion order.
pub(crate) type Account = IndexMap<String, Queue>;

/// The whole store: accounts keyed by name, in insertion order.
pub(crate) type Accounts = IndexMap<String, Account>;

/// The contiguous window a range scan visits: keys starting at the marker
/// (or the head when the marker names no element), at most `limit` of them
/// (all when `limit` is `None`).
///
/// Returning keys rather than holding an iterator lets the caller delete
/// elements mid-scan without disturbing the window.
pub(crate) fn window_keys<V>(
    map: &IndexMap<String, V>,
    marker: Option<&str>,
    limit: Option<u32>,
) -> Vec<String> {
    let start = marker.and_then(|m| map.get_index_of(m)).unwrap_or(0);
    let take = limit.map_or(usize::MAX, |l| l as usize);
    map.keys().skip(start).take(take).cloned().collect()
}
