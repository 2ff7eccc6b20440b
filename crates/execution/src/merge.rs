//! Merging fresh results into a prior result set.

use quillgrade_core::{CheckId, CheckItem, CheckRecord};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Merge `fresh` into `prior`.
///
/// Every `replaces` entry of the items that ran removes the prior record
/// with that key, and every prior record whose `subcategory_id` equals it.
/// Keys produced by this run are never removed. With `overwrite`, fresh
/// records replace same-key prior ones; otherwise prior records win.
pub fn merge(
    mut prior: BTreeMap<CheckId, CheckRecord>,
    fresh: BTreeMap<CheckId, CheckRecord>,
    ran: &[&CheckItem],
    overwrite: bool,
) -> BTreeMap<CheckId, CheckRecord> {
    for item in ran {
        for replaced in item.replaces() {
            let stale: Vec<CheckId> = prior
                .iter()
                .filter(|(key, record)| {
                    !fresh.contains_key(*key)
                        && (key.as_str() == replaced
                            || record.subcategory_id.as_deref() == Some(replaced.as_str()))
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in stale {
                info!("{} replaces prior result {}", item.id(), key);
                prior.remove(&key);
            }
        }
    }

    for (key, record) in fresh {
        if overwrite || !prior.contains_key(&key) {
            prior.insert(key, record);
        } else {
            debug!("Keeping prior result for {}", key);
        }
    }
    prior
}
