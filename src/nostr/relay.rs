//! Per-relay session state machine and framed wire messages (spec §4.7).

use super::event::NostrEvent;
use crate::error::NostrError;
use serde_json::{json, Value};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// A subscription filter (spec §4.7 "Subscription registry"). `tags` holds
/// arbitrary `#<tag>` filters, e.g. `#g -> ["u4pruy"]`.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub ids: Vec<String>,
    pub authors: Vec<String>,
    pub kinds: Vec<u32>,
    pub since: Option<u64>,
    pub until: Option<u64>,
    pub limit: Option<u32>,
    pub tags: Vec<(String, Vec<String>)>,
}

impl Filter {
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        if !self.ids.is_empty() {
            map.insert("ids".into(), json!(self.ids));
        }
        if !self.authors.is_empty() {
            map.insert("authors".into(), json!(self.authors));
        }
        if !self.kinds.is_empty() {
            map.insert("kinds".into(), json!(self.kinds));
        }
        if let Some(since) = self.since {
            map.insert("since".into(), json!(since));
        }
        if let Some(until) = self.until {
            map.insert("until".into(), json!(until));
        }
        if let Some(limit) = self.limit {
            map.insert("limit".into(), json!(limit));
        }
        for (tag, values) in &self.tags {
            map.insert(format!("#{tag}"), json!(values));
        }
        Value::Object(map)
    }
}

/// Outgoing frames the engine sends to a relay.
#[derive(Debug, Clone)]
pub enum ClientFrame {
    Event(NostrEvent),
    Req { sub_id: String, filter: Filter },
    Close { sub_id: String },
}

impl ClientFrame {
    pub fn to_wire(&self) -> String {
        let value = match self {
            ClientFrame::Event(event) => json!(["EVENT", event]),
            ClientFrame::Req { sub_id, filter } => json!(["REQ", sub_id, filter.to_value()]),
            ClientFrame::Close { sub_id } => json!(["CLOSE", sub_id]),
        };
        serde_json::to_string(&value).expect("frame values serialize infallibly")
    }
}

/// Incoming frames received from a relay.
#[derive(Debug, Clone)]
pub enum RelayFrame {
    Event { sub_id: String, event: NostrEvent },
    Ok { event_id: String, accepted: bool, message: String },
    Eose { sub_id: String },
    Notice(String),
    Auth(String),
}

/// Parses a relay's framed JSON array message.
pub fn parse_incoming(text: &str) -> Result<RelayFrame, NostrError> {
    let value: Value = serde_json::from_str(text).map_err(|_| NostrError::BadEvent("not valid json"))?;
    let array = value.as_array().ok_or(NostrError::BadEvent("frame is not a json array"))?;
    let tag = array.first().and_then(Value::as_str).ok_or(NostrError::BadEvent("missing frame tag"))?;

    match tag {
        "EVENT" => {
            let sub_id = array.get(1).and_then(Value::as_str).ok_or(NostrError::BadEvent("EVENT missing sub_id"))?.to_string();
            let event: NostrEvent = serde_json::from_value(array.get(2).cloned().ok_or(NostrError::BadEvent("EVENT missing body"))?)
                .map_err(|_| NostrError::BadEvent("EVENT body malformed"))?;
            Ok(RelayFrame::Event { sub_id, event })
        }
        "OK" => {
            let event_id = array.get(1).and_then(Value::as_str).ok_or(NostrError::BadEvent("OK missing event_id"))?.to_string();
            let accepted = array.get(2).and_then(Value::as_bool).ok_or(NostrError::BadEvent("OK missing bool"))?;
            let message = array.get(3).and_then(Value::as_str).unwrap_or("").to_string();
            Ok(RelayFrame::Ok { event_id, accepted, message })
        }
        "EOSE" => {
            let sub_id = array.get(1).and_then(Value::as_str).ok_or(NostrError::BadEvent("EOSE missing sub_id"))?.to_string();
            Ok(RelayFrame::Eose { sub_id })
        }
        "NOTICE" => {
            let message = array.get(1).and_then(Value::as_str).unwrap_or("").to_string();
            Ok(RelayFrame::Notice(message))
        }
        "AUTH" => {
            let challenge = array.get(1).and_then(Value::as_str).unwrap_or("").to_string();
            Ok(RelayFrame::Auth(challenge))
        }
        _ => Err(NostrError::BadEvent("unknown frame tag")),
    }
}

/// Rolling fixed-window limiter: at most `limit` sends per second per
/// relay; overflow queues with a hard cap of 1024, oldest dropped.
struct RateLimiter {
    window_start_ms: u64,
    count: u32,
    queue: VecDeque<ClientFrame>,
}

impl RateLimiter {
    fn new() -> Self {
        Self { window_start_ms: 0, count: 0, queue: VecDeque::new() }
    }

    fn roll_window(&mut self, now_ms: u64) {
        if now_ms.saturating_sub(self.window_start_ms) >= 1000 {
            self.window_start_ms = now_ms;
            self.count = 0;
        }
    }

    fn submit(&mut self, frame: ClientFrame, now_ms: u64, limit: u32) -> Option<ClientFrame> {
        self.roll_window(now_ms);
        if self.count < limit {
            self.count += 1;
            Some(frame)
        } else {
            if self.queue.len() >= 1024 {
                self.queue.pop_front();
            }
            self.queue.push_back(frame);
            None
        }
    }

    fn drain_ready(&mut self, now_ms: u64, limit: u32) -> Vec<ClientFrame> {
        self.roll_window(now_ms);
        let mut out = Vec::new();
        while self.count < limit {
            match self.queue.pop_front() {
                Some(frame) => {
                    self.count += 1;
                    out.push(frame);
                }
                None => break,
            }
        }
        out
    }
}

/// Per-relay session: connection state plus the outgoing rate limiter.
pub struct RelaySession {
    pub url: String,
    state: RelayState,
    rate_limiter: RateLimiter,
}

impl RelaySession {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), state: RelayState::Disconnected, rate_limiter: RateLimiter::new() }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == RelayState::Open
    }

    pub fn mark_connecting(&mut self) {
        self.state = RelayState::Connecting;
    }

    pub fn mark_open(&mut self) {
        self.state = RelayState::Open;
    }

    pub fn mark_closing(&mut self) {
        self.state = RelayState::Closing;
    }

    pub fn mark_closed(&mut self) {
        self.state = RelayState::Closed;
    }

    /// A transport-level error always transitions back to `Disconnected`.
    pub fn mark_error(&mut self) {
        self.state = RelayState::Disconnected;
    }

    /// Submits a frame for sending, respecting the per-relay rate limit.
    /// Returns `Some(frame)` if it should be sent immediately.
    pub fn submit(&mut self, frame: ClientFrame, now_ms: u64, limit: u32) -> Option<ClientFrame> {
        self.rate_limiter.submit(frame, now_ms, limit)
    }

    /// Pulls any queued frames that now fit within the rolling window.
    pub fn drain_ready(&mut self, now_ms: u64, limit: u32) -> Vec<ClientFrame> {
        self.rate_limiter.drain_ready(now_ms, limit)
    }
}
