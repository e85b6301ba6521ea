//! Event-sourced synchronization between environment copies.
//!
//! Every mutation is representable as one canonical, serializable change
//! record: the structural event plus, for item add/update, a snapshot of
//! the item's state. The environment accumulates records as it mutates;
//! `Environment::pull_events` hands them out and `Environment::apply_events`
//! replays them against another instance, which is how two processes keep
//! independent copies consistent without sharing memory.

use serde::{Deserialize, Serialize};

use super::events::Event;
use crate::entities::item::ItemSnapshot;

/// One serialized change: the event, plus the item payload for item
/// add/update records (edge and remove records carry ids only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event: Event,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<ItemSnapshot>,
}

impl EventRecord {
    pub fn structural(event: Event) -> Self {
        Self { event, item: None }
    }

    pub fn with_item(event: Event, item: ItemSnapshot) -> Self {
        Self {
            event,
            item: Some(item),
        }
    }
}

/// Accumulates change records between pulls.
#[derive(Debug, Default)]
pub struct SyncQueue {
    records: Vec<EventRecord>,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: EventRecord) {
        self.records.push(record);
    }

    /// Take everything accumulated since the last drain.
    pub fn drain(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::environment::Environment;
    use crate::entities::attrs::AttrValue;
    use crate::entities::item::ItemId;
    use crate::entities::layer::Layer;
    use crate::entities::operator::OperatorNode;
    use crate::entities::transform::RigidTransform;
    use glam::DVec3;

    #[test]
    fn test_full_snapshot_reproduces_structure() {
        let mut a = Environment::new();
        let root = a.root_id().clone();
        let f = a
            .create_frame(RigidTransform::from_translation(DVec3::X))
            .unwrap();
        a.add_child_frame(&root, &f).unwrap();
        let map = a.create_map("grid").unwrap();
        a.set_frame_node(&map, &f).unwrap();
        let scan = a.create_layer("scan").unwrap();
        a.get_mut::<Layer>(&scan)
            .unwrap()
            .attrs
            .set("value", AttrValue::Float(3.5));
        a.item_modified(&scan).unwrap();
        let op = a.attach_item(OperatorNode::opaque("ext::Mesher")).unwrap();
        a.add_input(&op, &scan).unwrap();
        a.add_output(&op, &map).unwrap();
        a.add_child_layer(&scan, &map).unwrap();

        let records = a.pull_events(true).unwrap();
        let mut b = Environment::new();
        b.apply_events(&records).unwrap();

        assert_eq!(b.root_id(), a.root_id());
        assert_eq!(b.item_count(), a.item_count());
        assert_eq!(b.frame_parent(&f), Some(&root));
        assert_eq!(b.get_frame_node(&map), Some(&f));
        assert_eq!(b.generator_of(&map), Some(&op));
        assert_eq!(b.operator_inputs(&op), vec![scan.clone()]);
        assert_eq!(b.layer_parents(&map), vec![scan.clone()]);
        assert_eq!(b.get::<Layer>(&scan).unwrap().attrs.get_f64("value"), Some(3.5));

        let in_a = a.relative_transform(&f, &root).unwrap();
        let in_b = b.relative_transform(&f, &root).unwrap();
        assert!(in_a.approx_eq(&in_b, 1e-12));

        // snapshots cannot carry behavior
        assert!(!b.get::<OperatorNode>(&op).unwrap().has_model());
    }

    #[test]
    fn test_incremental_pull_apply() {
        let mut a = Environment::new();
        let mut b = Environment::new();
        let initial = a.pull_events(true).unwrap();
        b.apply_events(&initial).unwrap();

        let root = a.root_id().clone();
        let f = a.create_frame(RigidTransform::IDENTITY).unwrap();
        a.add_child_frame(&root, &f).unwrap();
        let map = a.create_map("grid").unwrap();
        a.set_frame_node(&map, &f).unwrap();

        let changes = a.pull_events(false).unwrap();
        b.apply_events(&changes).unwrap();
        assert!(b.contains(&f));
        assert_eq!(b.get_frame_node(&map), Some(&f));

        a.detach_item(&f).unwrap();
        let changes = a.pull_events(false).unwrap();
        b.apply_events(&changes).unwrap();
        assert!(!b.contains(&f));
        assert_eq!(b.get_frame_node(&map), None);
    }

    #[test]
    fn test_applied_records_do_not_echo() {
        let mut a = Environment::new();
        a.create_layer("scan").unwrap();
        let records = a.pull_events(true).unwrap();

        let mut b = Environment::new();
        b.apply_events(&records).unwrap();
        assert!(b.pull_events(false).unwrap().is_empty());
    }

    #[test]
    fn test_record_json_roundtrip() {
        let record = EventRecord::structural(Event::binding_added(
            ItemId::new("/item/3"),
            ItemId::new("/item/1"),
        ));
        let json = serde_json::to_string(&record).unwrap();
        let back: EventRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        // edge records stay lean on the wire
        assert!(!json.contains("item\":"));
    }

    #[test]
    fn test_drain_empties_queue() {
        let mut queue = SyncQueue::new();
        queue.push(EventRecord::structural(Event::item_added(ItemId::new(
            "/item/0",
        ))));
        assert_eq!(queue.len(), 1);
        let drained = queue.drain();
        assert_eq!(drained.len(), 1);
        assert!(queue.is_empty());
    }
}
