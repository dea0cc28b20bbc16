//! Subscription registry: tracks active filters and mirrors them across
//! every connected relay (spec §4.7).

use super::relay::{ClientFrame, Filter};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: HashMap<String, Filter>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscription and returns its id. The caller is
    /// responsible for issuing the resulting `REQ` frame to every `Open`
    /// relay (see `reissue_frames`).
    pub fn subscribe(&mut self, filter: Filter) -> String {
        let sub_id = Uuid::new_v4().to_string();
        self.subscriptions.insert(sub_id.clone(), filter);
        sub_id
    }

    /// Removes a subscription. The caller still must send `CLOSE` to every
    /// relay that had it open.
    pub fn unsubscribe(&mut self, sub_id: &str) -> bool {
        self.subscriptions.remove(sub_id).is_some()
    }

    pub fn is_active(&self, sub_id: &str) -> bool {
        self.subscriptions.contains_key(sub_id)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// `REQ` frames for every active subscription, to be sent to a relay
    /// that has just reached `Open` (fresh connect or reconnect).
    pub fn reissue_frames(&self) -> Vec<ClientFrame> {
        self.subscriptions
            .iter()
            .map(|(sub_id, filter)| ClientFrame::Req { sub_id: sub_id.clone(), filter: filter.clone() })
            .collect()
    }
}
