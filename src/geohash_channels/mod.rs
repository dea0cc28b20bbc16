//! Geohash location channel manager (spec §4.8): tracks the local position
//! at every precision 2..8, and the set of joined channels. Joining and
//! leaving return a pure `Filter`/`sub_id` decision — actually mirroring the
//! subscription across connected relays is the caller's (`Core`'s) job, the
//! same split used by `routing::decision` and `nostr::subscription`.

use crate::codec::geohash::{self, MAX_PRECISION, MIN_PRECISION};
use crate::error::CodecError;
use crate::nostr::event::kind;
use crate::nostr::relay::Filter;
use std::collections::HashMap;

const CHANNEL_FEED_LOOKBACK_SECS: u64 = 3600;

/// A location channel (spec §3: "Channel"), identified by
/// `<geohash>` or `<geohash>#<topic>`.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: String,
    pub geohash: String,
    pub topic: Option<String>,
    pub participant_count: u32,
    pub last_activity: u64,
    pub display_name: String,
}

fn parse_channel_id(channel_id: &str) -> (String, Option<String>) {
    match channel_id.split_once('#') {
        Some((geohash, topic)) => (geohash.to_string(), Some(topic.to_string())),
        None => (channel_id.to_string(), None),
    }
}

/// Request for the caller to subscribe on Nostr: a filter on kind-30079
/// custom-location-channel events tagged `#g` with the channel's geohash,
/// looking back one hour.
pub struct JoinRequest {
    pub filter: Filter,
}

#[derive(Default)]
pub struct ChannelManager {
    location: Option<(f64, f64)>,
    current_geohashes: HashMap<usize, String>,
    joined: HashMap<String, Channel>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the current position and recomputes the geohash at every
    /// precision level 2..8.
    pub fn set_location(&mut self, lat: f64, lon: f64) -> Result<(), CodecError> {
        let mut next = HashMap::with_capacity(MAX_PRECISION - MIN_PRECISION + 1);
        for precision in MIN_PRECISION..=MAX_PRECISION {
            next.insert(precision, geohash::encode(lat, lon, precision)?);
        }
        self.location = Some((lat, lon));
        self.current_geohashes = next;
        Ok(())
    }

    pub fn current_geohash(&self, precision: usize) -> Option<&str> {
        self.current_geohashes.get(&precision).map(String::as_str)
    }

    /// The channel id for the current position at `precision`, with no topic.
    pub fn current_channel_id(&self, precision: usize) -> Option<&str> {
        self.current_geohash(precision)
    }

    /// Registers `channel_id` (`<geohash>[#<topic>]`) and returns the
    /// filter the caller should issue to every `Open` relay.
    pub fn join(&mut self, channel_id: &str, now: u64) -> JoinRequest {
        let (geohash, topic) = parse_channel_id(channel_id);
        self.joined.entry(channel_id.to_string()).or_insert_with(|| Channel {
            id: channel_id.to_string(),
            geohash: geohash.clone(),
            topic,
            participant_count: 0,
            last_activity: now,
            display_name: channel_id.to_string(),
        });
        JoinRequest {
            filter: Filter {
                kinds: vec![kind::CUSTOM_LOCATION_CHANNEL],
                since: Some(now.saturating_sub(CHANNEL_FEED_LOOKBACK_SECS)),
                tags: vec![("g".to_string(), vec![geohash])],
                ..Default::default()
            },
        }
    }

    /// Deregisters `channel_id`. The caller is still responsible for
    /// sending `CLOSE` to every relay holding this channel's subscription.
    pub fn leave(&mut self, channel_id: &str) -> bool {
        self.joined.remove(channel_id).is_some()
    }

    pub fn is_joined(&self, channel_id: &str) -> bool {
        self.joined.contains_key(channel_id)
    }

    pub fn channel(&self, channel_id: &str) -> Option<&Channel> {
        self.joined.get(channel_id)
    }

    /// Records fresh activity on a joined channel (e.g. an incoming
    /// kind-30079 event matched this channel's geohash).
    pub fn record_activity(&mut self, channel_id: &str, now: u64) {
        if let Some(channel) = self.joined.get_mut(channel_id) {
            channel.last_activity = now;
        }
    }

    pub fn set_participant_count(&mut self, channel_id: &str, count: u32) {
        if let Some(channel) = self.joined.get_mut(channel_id) {
            channel.participant_count = count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_location_populates_every_precision() {
        let mut manager = ChannelManager::new();
        manager.set_location(37.7749, -122.4194).unwrap();
        for precision in MIN_PRECISION..=MAX_PRECISION {
            assert_eq!(manager.current_geohash(precision).unwrap().len(), precision);
        }
    }

    #[test]
    fn join_registers_channel_and_builds_tag_filter() {
        let mut manager = ChannelManager::new();
        let request = manager.join("9q8yy#surf", 10_000);
        assert!(manager.is_joined("9q8yy#surf"));
        assert_eq!(manager.channel("9q8yy#surf").unwrap().geohash, "9q8yy");
        assert_eq!(manager.channel("9q8yy#surf").unwrap().topic.as_deref(), Some("surf"));
        assert_eq!(request.filter.kinds, vec![kind::CUSTOM_LOCATION_CHANNEL]);
        assert_eq!(request.filter.since, Some(10_000 - CHANNEL_FEED_LOOKBACK_SECS));
        assert_eq!(request.filter.tags, vec![("g".to_string(), vec!["9q8yy".to_string()])]);
    }

    #[test]
    fn join_without_topic_has_no_topic() {
        let mut manager = ChannelManager::new();
        manager.join("9q8yy", 0);
        assert_eq!(manager.channel("9q8yy").unwrap().topic, None);
    }

    #[test]
    fn leave_deregisters_channel() {
        let mut manager = ChannelManager::new();
        manager.join("9q8yy", 0);
        assert!(manager.leave("9q8yy"));
        assert!(!manager.is_joined("9q8yy"));
        assert!(!manager.leave("9q8yy"));
    }
}
