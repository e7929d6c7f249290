//! Best-tag selection

use crate::inventory::Inventory;
use crate::tag::TagRecord;

/// Pick the tag with the highest read count, breaking ties by RSSI.
///
/// Single pass in insertion order: a candidate only replaces the current best
/// when it is strictly better, so exact ties keep the tag seen first.
pub fn select(inventory: &Inventory) -> Option<&TagRecord> {
    let mut entries = inventory.iter();
    let mut best = entries.next()?;
    for candidate in entries {
        if candidate.read_count > best.read_count
            || (candidate.read_count == best.read_count && candidate.rssi > best.rssi)
        {
            best = candidate;
        }
    }
    Some(best)
}
