//! Compact per-direction relationship-id arrays. Each cached node keeps
//! one per relationship type. The loops segment is only allocated once a
//! self-loop shows up for that type, which keeps the common case at two
//! small arrays.

use smallvec::SmallVec;

use crate::model::{Direction, RelId};

type IdVec = SmallVec<[RelId; 4]>;

#[derive(Debug, Clone, Default)]
pub struct RelIdArray {
    outgoing: IdVec,
    incoming: IdVec,
    loops: Option<IdVec>,
}

impl RelIdArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variant that can hold self-loops from the start, used when a chain
    /// page already announced loops for this type.
    pub fn with_loops() -> Self {
        Self {
            loops: Some(IdVec::new()),
            ..Self::default()
        }
    }

    pub fn has_loops(&self) -> bool {
        self.loops.is_some()
    }

    pub fn add(&mut self, rel: RelId, direction: Direction) {
        match direction {
            Direction::Outgoing => self.outgoing.push(rel),
            Direction::Incoming => self.incoming.push(rel),
            Direction::Both => self.loops.get_or_insert_with(IdVec::new).push(rel),
        }
    }

    pub fn remove(&mut self, rel: RelId) -> bool {
        let mut removed = false;
        for segment in [&mut self.outgoing, &mut self.incoming]
            .into_iter()
            .chain(self.loops.as_mut())
        {
            if let Some(pos) = segment.iter().position(|&r| r == rel) {
                segment.remove(pos);
                removed = true;
            }
        }
        removed
    }

    pub fn contains(&self, rel: RelId) -> bool {
        self.iter(Direction::Both).any(|r| r == rel)
    }

    /// Ids visible when traversing in `wanted` direction. Loops are
    /// yielded once regardless of direction.
    pub fn iter(&self, wanted: Direction) -> impl Iterator<Item = RelId> + '_ {
        let outgoing = Direction::Outgoing
            .matches(wanted)
            .then_some(self.outgoing.iter())
            .into_iter()
            .flatten();
        let incoming = Direction::Incoming
            .matches(wanted)
            .then_some(self.incoming.iter())
            .into_iter()
            .flatten();
        let loops = self.loops.iter().flatten();
        outgoing.chain(incoming).chain(loops).copied()
    }

    pub fn len(&self) -> usize {
        self.outgoing.len()
            + self.incoming.len()
            + self.loops.as_ref().map_or(0, |l| l.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every id with the direction segment it occupies.
    pub fn tagged(&self) -> Vec<(RelId, Direction)> {
        let mut tagged: Vec<(RelId, Direction)> = Vec::with_capacity(self.len());
        tagged.extend(self.outgoing.iter().map(|&r| (r, Direction::Outgoing)));
        tagged.extend(self.incoming.iter().map(|&r| (r, Direction::Incoming)));
        if let Some(loops) = &self.loops {
            tagged.extend(loops.iter().map(|&r| (r, Direction::Both)));
        }
        tagged
    }

    /// Merges `other` in, upgrading to the loops-capable layout when the
    /// batch carries loops. Ids already present are skipped: a chain page
    /// and a commit-time materialization may race to deliver the same
    /// relationship.
    pub fn merge(&mut self, other: RelIdArray) {
        for id in other.outgoing {
            if !self.contains(id) {
                self.outgoing.push(id);
            }
        }
        for id in other.incoming {
            if !self.contains(id) {
                self.incoming.push(id);
            }
        }
        if let Some(incoming_loops) = other.loops {
            let loops = self.loops.get_or_insert_with(IdVec::new);
            for id in incoming_loops {
                if !loops.contains(&id) {
                    loops.push(id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_are_segmented() {
        let mut ids = RelIdArray::new();
        ids.add(1, Direction::Outgoing);
        ids.add(2, Direction::Incoming);
        ids.add(3, Direction::Outgoing);

        let out: Vec<_> = ids.iter(Direction::Outgoing).collect();
        assert_eq!(out, vec![1, 3]);
        let inc: Vec<_> = ids.iter(Direction::Incoming).collect();
        assert_eq!(inc, vec![2]);
        assert_eq!(ids.iter(Direction::Both).count(), 3);
    }

    #[test]
    fn loops_allocate_lazily_and_count_once() {
        let mut ids = RelIdArray::new();
        assert!(!ids.has_loops());
        ids.add(7, Direction::Both);
        assert!(ids.has_loops());

        assert_eq!(ids.iter(Direction::Outgoing).collect::<Vec<_>>(), vec![7]);
        assert_eq!(ids.iter(Direction::Incoming).collect::<Vec<_>>(), vec![7]);
        assert_eq!(ids.iter(Direction::Both).collect::<Vec<_>>(), vec![7]);
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn merge_upgrades_to_loop_layout() {
        let mut base = RelIdArray::new();
        base.add(1, Direction::Outgoing);
        let mut batch = RelIdArray::with_loops();
        batch.add(2, Direction::Both);
        batch.add(3, Direction::Incoming);
        base.merge(batch);
        assert!(base.has_loops());
        assert_eq!(base.len(), 3);
        assert!(base.contains(2));
    }

    #[test]
    fn remove_scans_all_segments() {
        let mut ids = RelIdArray::new();
        ids.add(1, Direction::Outgoing);
        ids.add(2, Direction::Both);
        assert!(ids.remove(2));
        assert!(!ids.remove(2));
        assert!(!ids.contains(2));
        assert_eq!(ids.len(), 1);
    }
}
