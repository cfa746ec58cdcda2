use serde::{Deserialize, Serialize};

use super::{Location, Rule, SubscriberId};

/// A subscriber's binding of rules to a location.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Watch {
    pub id: String, // stable id, e.g. "tg:123456:yutsa"
    pub subscriber: SubscriberId,
    pub location: Location,
    pub rules: Vec<Rule>,
    pub active: bool,
}
