//! Deduplicated, capacity-bounded tag inventory

use log::debug;

use crate::tag::TagRecord;

/// What `Inventory::merge` did with a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First sighting, appended at the given index
    Inserted(usize),
    /// Repeat sighting of the entry at the given index
    Updated(usize),
    /// New EPC arrived while the inventory was full
    Dropped,
}

/// Tags seen during one scan, unique by EPC, in first-seen order.
#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    entries: Vec<TagRecord>,
    capacity: usize,
    dropped: usize,
}

impl Inventory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity.min(256)),
            capacity,
            dropped: 0,
        }
    }

    /// Fold one sighting into the inventory.
    ///
    /// A known EPC keeps its original bytes and position; its RSSI becomes the
    /// stronger of the two readings and its read count goes up by one. An
    /// unknown EPC is appended while there is room and dropped otherwise.
    pub fn merge(&mut self, tag: TagRecord) -> MergeOutcome {
        if let Some(index) = self.position(&tag.epc) {
            let entry = &mut self.entries[index];
            entry.rssi = entry.rssi.max(tag.rssi);
            entry.read_count = entry.read_count.saturating_add(1);
            return MergeOutcome::Updated(index);
        }

        if self.is_full() {
            self.dropped += 1;
            debug!(
                "Inventory full ({} tags), dropping {}",
                self.capacity,
                tag.epc_hex()
            );
            return MergeOutcome::Dropped;
        }

        self.entries.push(TagRecord { read_count: 1, ..tag });
        MergeOutcome::Inserted(self.entries.len() - 1)
    }

    pub fn find(&self, epc: &[u8]) -> Option<&TagRecord> {
        self.position(epc).map(|index| &self.entries[index])
    }

    fn position(&self, epc: &[u8]) -> Option<usize> {
        self.entries.iter().position(|entry| entry.epc == epc)
    }

    pub fn get(&self, index: usize) -> Option<&TagRecord> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TagRecord> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[TagRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Number of new EPCs turned away because the inventory was full
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// The best tag by read count, then RSSI
    pub fn best(&self) -> Option<&TagRecord> {
        crate::selector::select(self)
    }

    /// Forget all entries and the drop counter, keeping the capacity
    pub fn clear(&mut self) {
        self.entries.clear();
        self.dropped = 0;
    }

    pub fn into_records(self) -> Vec<TagRecord> {
        self.entries
    }
}

impl<'a> IntoIterator for &'a Inventory {
    type Item = &'a TagRecord;
    type IntoIter = std::slice::Iter<'a, TagRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(epc: &[u8], rssi: f32) -> TagRecord {
        TagRecord::new(epc, rssi).unwrap()
    }

    #[test]
    fn test_merge_same_tag_n_times() {
        let mut inventory = Inventory::with_capacity(1);
        let readings = [-70.0, -55.5, -62.0, -80.1, -56.0];
        for rssi in readings {
            inventory.merge(tag(&[0xE2, 0x00], rssi));
        }

        assert_eq!(inventory.len(), 1);
        let entry = inventory.get(0).unwrap();
        assert_eq!(entry.read_count, readings.len() as u32);
        assert_eq!(entry.rssi, -55.5);
        assert_eq!(inventory.dropped(), 0);
    }

    #[test]
    fn test_merge_outcomes() {
        let mut inventory = Inventory::with_capacity(2);
        assert_eq!(inventory.merge(tag(&[0x01, 0x00], -60.0)), MergeOutcome::Inserted(0));
        assert_eq!(inventory.merge(tag(&[0x02, 0x00], -60.0)), MergeOutcome::Inserted(1));
        assert_eq!(inventory.merge(tag(&[0x01, 0x00], -50.0)), MergeOutcome::Updated(0));
        assert_eq!(inventory.merge(tag(&[0x03, 0x00], -40.0)), MergeOutcome::Dropped);
    }

    #[test]
    fn test_capacity_keeps_first_seen() {
        let mut inventory = Inventory::with_capacity(3);
        for i in 1..=5u8 {
            inventory.merge(tag(&[i, i], -60.0 + i as f32));
        }

        assert_eq!(inventory.len(), 3);
        assert!(inventory.is_full());
        assert_eq!(inventory.dropped(), 2);
        let epcs: Vec<_> = inventory.iter().map(|t| t.epc.clone()).collect();
        assert_eq!(epcs, vec![vec![1, 1], vec![2, 2], vec![3, 3]]);
        for entry in &inventory {
            assert_eq!(entry.read_count, 1);
        }
        assert_eq!(inventory.get(0).unwrap().rssi, -59.0);
    }

    #[test]
    fn test_full_inventory_still_updates_known_tags() {
        let mut inventory = Inventory::with_capacity(1);
        inventory.merge(tag(&[0xAA, 0xBB], -70.0));
        assert_eq!(inventory.merge(tag(&[0xAA, 0xBB], -65.0)), MergeOutcome::Updated(0));
        assert_eq!(inventory.get(0).unwrap().read_count, 2);
        assert_eq!(inventory.dropped(), 0);
    }

    #[test]
    fn test_merge_resets_incoming_read_count() {
        let mut inventory = Inventory::with_capacity(4);
        let mut incoming = tag(&[0x10, 0x20], -60.0);
        incoming.read_count = 9;
        inventory.merge(incoming);
        assert_eq!(inventory.get(0).unwrap().read_count, 1);
    }

    #[test]
    fn test_epc_identity_is_byte_exact() {
        let mut inventory = Inventory::with_capacity(4);
        inventory.merge(tag(&[0x10, 0x20], -60.0));
        inventory.merge(tag(&[0x10, 0x20, 0x00, 0x00], -60.0));
        inventory.merge(tag(&[], -60.0));
        assert_eq!(inventory.len(), 3);
        assert!(inventory.find(&[0x10, 0x20]).is_some());
        assert!(inventory.find(&[0x10]).is_none());
    }

    #[test]
    fn test_zero_capacity_drops_everything() {
        let mut inventory = Inventory::with_capacity(0);
        assert!(inventory.is_full());
        assert_eq!(inventory.merge(tag(&[0x01, 0x02], -60.0)), MergeOutcome::Dropped);
        assert!(inventory.is_empty());
        assert_eq!(inventory.dropped(), 1);
    }

    #[test]
    fn test_clear() {
        let mut inventory = Inventory::with_capacity(1);
        inventory.merge(tag(&[0x01, 0x02], -60.0));
        inventory.merge(tag(&[0x03, 0x04], -60.0));
        inventory.clear();
        assert!(inventory.is_empty());
        assert_eq!(inventory.dropped(), 0);
        assert_eq!(inventory.capacity(), 1);
    }
}
