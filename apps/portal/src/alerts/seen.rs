use std::collections::HashSet;

use urbanshield_common::Hazard;

/// Decimal places kept when a hazard without an id is keyed by location.
const KEY_PRECISION: i32 = 4;

/// Identity of a hazard for deduplication: the server id when present,
/// otherwise rounded coordinates plus the hazard type.
pub fn identity_key(hazard: &Hazard) -> String {
    match hazard.id {
        Some(id) => format!("id:{id}"),
        None => {
            let at = hazard.coordinates().rounded(KEY_PRECISION);
            format!(
                "loc:{:.4}:{:.4}:{}",
                at.lat,
                at.lon,
                hazard.disaster_type.as_deref().unwrap_or("")
            )
        }
    }
}

/// Keys already notified during one engine run. Append-only.
#[derive(Debug, Default)]
pub struct SeenAlertSet {
    keys: HashSet<String>,
}

impl SeenAlertSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the key was not seen before.
    pub fn insert(&mut self, key: String) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
