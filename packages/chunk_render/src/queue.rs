
use crate::cause::MeshingCause;
use section_data::SectionPos;
use std::{
    cmp::Ordering,
    collections::{
        hash_map::Entry,
        HashMap,
    },
};
use vek::*;


/// Pending (re)mesh work for one section.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct QueueItem {
    pub sc: SectionPos,
    pub cause: MeshingCause,
}

/// Total order over queue items: cause tier, then squared distance from the
/// section center to a mutable reference point, then key order so sorts are
/// deterministic.
///
/// Moving the reference does not touch queued items; order is recomputed
/// when a sorted selection is actually needed.
#[derive(Debug, Clone)]
pub struct QueueComparator {
    reference: Vec3<f64>,
}

impl QueueComparator {
    pub fn new(reference: Vec3<f64>) -> Self {
        QueueComparator { reference }
    }

    pub fn update_reference(&mut self, reference: Vec3<f64>) {
        self.reference = reference;
    }

    pub fn reference(&self) -> Vec3<f64> {
        self.reference
    }

    pub fn cmp(&self, a: &QueueItem, b: &QueueItem) -> Ordering {
        a.cause.tier().cmp(&b.cause.tier())
            .then_with(|| a.sc.dist_sq(self.reference)
                .total_cmp(&b.sc.dist_sq(self.reference)))
            .then_with(|| a.sc.cmp(&b.sc))
    }
}


/// Pending work for sections that are currently schedulable.
///
/// Backed by an unsorted vec plus an O(1) membership map; the vec is sorted
/// on demand when the best items are drained, so camera movement between
/// frames costs nothing here.
#[derive(Debug, Default)]
pub struct ActiveQueue {
    items: Vec<QueueItem>,
    index: HashMap<SectionPos, usize>,
}

impl ActiveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert pending work, or upgrade the cause of already pending work.
    /// Returns whether the section was newly inserted.
    pub fn queue(&mut self, sc: SectionPos, cause: MeshingCause) -> bool {
        if let Some(&i) = self.index.get(&sc) {
            if cause.upgrades(self.items[i].cause) {
                self.items[i].cause = cause;
            }
            false
        } else {
            self.index.insert(sc, self.items.len());
            self.items.push(QueueItem { sc, cause });
            true
        }
    }

    /// Remove the section's pending work, returning its cause.
    pub fn remove(&mut self, sc: SectionPos) -> Option<MeshingCause> {
        let i = self.index.remove(&sc)?;
        let item = self.items.swap_remove(i);
        if let Some(moved) = self.items.get(i) {
            self.index.insert(moved.sc, i);
        }
        Some(item.cause)
    }

    pub fn contains(&self, sc: SectionPos) -> bool {
        self.index.contains_key(&sc)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sort the pending items under the comparator's current reference and
    /// remove and return the `max` most urgent.
    pub fn drain_best(
        &mut self,
        max: usize,
        comparator: &QueueComparator,
    ) -> Vec<QueueItem> {
        if max == 0 || self.items.is_empty() {
            return Vec::new();
        }
        self.items.sort_unstable_by(|a, b| comparator.cmp(a, b));
        let n = max.min(self.items.len());
        let drained = self.items.drain(..n).collect();
        self.index.clear();
        for (i, item) in self.items.iter().enumerate() {
            self.index.insert(item.sc, i);
        }
        drained
    }

    /// Remove and return every item matching the predicate.
    pub fn drain_where(
        &mut self,
        mut pred: impl FnMut(&QueueItem) -> bool,
    ) -> Vec<QueueItem> {
        let mut drained = Vec::new();
        let mut i = 0;
        while i < self.items.len() {
            if pred(&self.items[i]) {
                let item = self.items.swap_remove(i);
                self.index.remove(&item.sc);
                if let Some(moved) = self.items.get(i) {
                    self.index.insert(moved.sc, i);
                }
                drained.push(item);
            } else {
                i += 1;
            }
        }
        drained
    }
}


/// Pending work for sections that cannot currently be scheduled: outside the
/// view volume, frustum-culled, or waiting on neighbor data.
///
/// Stored two-level, chunk column -> dirty section height -> pending cause,
/// with O(1) membership and removal per section. A column whose height map
/// empties is dropped from the outer map.
///
/// This structure is always mutated under the scheduler's queue lock. When
/// eligibility checks need world state (`ChunkRenderer::frame` passing a
/// predicate into `collect`), the caller already holds the coarser world
/// lock; the queue lock is only ever acquired inside the world lock, never
/// the reverse.
#[derive(Debug, Default)]
pub struct CulledQueue {
    columns: HashMap<Vec2<i64>, HashMap<i64, MeshingCause>>,
    len: usize,
}

impl CulledQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record pending work, or upgrade the cause of already pending work.
    pub fn queue(&mut self, sc: SectionPos, cause: MeshingCause) {
        match self.columns.entry(sc.cc).or_default().entry(sc.sy) {
            Entry::Occupied(mut occupied) => {
                if cause.upgrades(*occupied.get()) {
                    occupied.insert(cause);
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(cause);
                self.len += 1;
            }
        }
    }

    /// Remove the section's pending work, returning its stored cause.
    pub fn remove(&mut self, sc: SectionPos) -> Option<MeshingCause> {
        let heights = self.columns.get_mut(&sc.cc)?;
        let cause = heights.remove(&sc.sy)?;
        self.len -= 1;
        if heights.is_empty() {
            self.columns.remove(&sc.cc);
        }
        Some(cause)
    }

    pub fn contains(&self, sc: SectionPos) -> bool {
        self.columns
            .get(&sc.cc)
            .map(|heights| heights.contains_key(&sc.sy))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Move up to `max` sections the predicate accepts out of this queue,
    /// clearing their dirty-height entries and dropping emptied columns.
    ///
    /// A stored `ExplicitInvalidate` keeps its urgency across the
    /// promotion; every other stored cause comes back as `Culled`, the
    /// culled-but-dirty tier, so promoted backlogs cannot crowd out urgent
    /// in-view work.
    pub fn collect(
        &mut self,
        max: usize,
        mut eligible: impl FnMut(SectionPos) -> bool,
    ) -> Vec<QueueItem> {
        let mut promoted = Vec::new();
        if max == 0 {
            return promoted;
        }
        'columns: for (&cc, heights) in self.columns.iter_mut() {
            let ready = heights
                .keys()
                .copied()
                .filter(|&sy| eligible(SectionPos { cc, sy }))
                .collect::<Vec<_>>();
            for sy in ready {
                let stored = heights.remove(&sy).unwrap();
                self.len -= 1;
                let cause = match stored {
                    MeshingCause::ExplicitInvalidate => MeshingCause::ExplicitInvalidate,
                    _ => MeshingCause::Culled,
                };
                promoted.push(QueueItem { sc: SectionPos { cc, sy }, cause });
                if promoted.len() == max {
                    break 'columns;
                }
            }
        }
        self.columns.retain(|_, heights| !heights.is_empty());
        promoted
    }
}


#[cfg(test)]
use section_data::sp;

#[test]
fn test_distance_ordering() {
    let comparator = QueueComparator::new(Vec3::new(100.0, 200.0, 300.0));
    // reference lies in section (6, 12, 18); centers at (104, 200, 296) etc
    let item = |sc| QueueItem { sc, cause: MeshingCause::BlockChange };
    let mut queue = ActiveQueue::new();
    for sc in [sp(0, 0, 0), sp(6, 13, 18), sp(6, 12, 18), sp(5, 12, 18)] {
        queue.queue(sc, MeshingCause::BlockChange);
    }
    assert_eq!(
        queue.drain_best(4, &comparator),
        vec![
            item(sp(6, 12, 18)),   // dist_sq 32
            item(sp(5, 12, 18)),   // dist_sq 160
            item(sp(6, 13, 18)),   // dist_sq 288
            item(sp(0, 0, 0)),
        ],
    );
    assert!(queue.is_empty());
}

#[test]
fn test_reference_update_reorders() {
    let mut comparator = QueueComparator::new(Vec3::new(100.0, 200.0, 300.0));
    let near = QueueItem { sc: sp(6, 12, 18), cause: MeshingCause::Load };
    let far = QueueItem { sc: sp(0, 0, 0), cause: MeshingCause::Load };
    assert_eq!(comparator.cmp(&near, &far), Ordering::Less);
    // from the antipodal reference the extremes swap
    comparator.update_reference(Vec3::new(-100.0, -200.0, -300.0));
    assert_eq!(comparator.cmp(&near, &far), Ordering::Greater);
}

#[test]
fn test_tier_dominates_distance() {
    let comparator = QueueComparator::new(Vec3::zero());
    let lod_near = QueueItem { sc: sp(0, 0, 0), cause: MeshingCause::LodUpdate };
    let load_far = QueueItem { sc: sp(100, 0, 0), cause: MeshingCause::Load };
    let culled_near = QueueItem { sc: sp(0, 0, 0), cause: MeshingCause::Culled };
    assert_eq!(comparator.cmp(&load_far, &lod_near), Ordering::Less);
    assert_eq!(comparator.cmp(&lod_near, &culled_near), Ordering::Less);
}

#[test]
fn test_cmp_ties_break_by_key() {
    let comparator = QueueComparator::new(Vec3::zero());
    let a = QueueItem { sc: sp(1, 0, 0), cause: MeshingCause::Load };
    let b = QueueItem { sc: sp(0, 0, 1), cause: MeshingCause::Load };
    assert_eq!(comparator.cmp(&a, &b), Ordering::Greater);
    assert_eq!(comparator.cmp(&b, &a), Ordering::Less);
    assert_eq!(comparator.cmp(&a, &a), Ordering::Equal);
}

#[test]
fn test_active_queue_upgrades_never_downgrade() {
    let mut queue = ActiveQueue::new();
    assert!(queue.queue(sp(0, 0, 0), MeshingCause::LodUpdate));
    assert!(!queue.queue(sp(0, 0, 0), MeshingCause::BlockChange));
    assert!(!queue.queue(sp(0, 0, 0), MeshingCause::Culled));
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.remove(sp(0, 0, 0)), Some(MeshingCause::BlockChange));
    assert_eq!(queue.remove(sp(0, 0, 0)), None);
}

#[test]
fn test_active_queue_membership_survives_swaps() {
    let mut queue = ActiveQueue::new();
    for x in 0..5 {
        queue.queue(sp(x, 0, 0), MeshingCause::Load);
    }
    queue.remove(sp(0, 0, 0));
    queue.remove(sp(2, 0, 0));
    for x in [1, 3, 4] {
        assert!(queue.contains(sp(x, 0, 0)));
        assert!(queue.remove(sp(x, 0, 0)).is_some());
    }
    assert!(queue.is_empty());
}

#[test]
fn test_drain_where() {
    let mut queue = ActiveQueue::new();
    for x in 0..6 {
        queue.queue(sp(x, 0, 0), MeshingCause::Load);
    }
    let drained = queue.drain_where(|item| item.sc.cc.x % 2 == 0);
    assert_eq!(drained.len(), 3);
    assert_eq!(queue.len(), 3);
    for item in drained {
        assert!(!queue.contains(item.sc));
    }
    assert!(queue.contains(sp(3, 0, 0)));
}

#[test]
fn test_culled_queue_membership() {
    let mut culled = CulledQueue::new();
    culled.queue(sp(0, 0, 0), MeshingCause::BlockChange);
    culled.queue(sp(0, 3, 0), MeshingCause::BlockChange);
    culled.queue(sp(0, 3, 0), MeshingCause::Culled);
    assert_eq!(culled.len(), 2);
    assert!(culled.contains(sp(0, 3, 0)));
    assert_eq!(culled.remove(sp(0, 3, 0)), Some(MeshingCause::BlockChange));
    assert_eq!(culled.remove(sp(0, 3, 0)), None);
    assert_eq!(culled.len(), 1);
}

#[test]
fn test_collect_skips_ineligible_and_drops_empty_columns() {
    let mut culled = CulledQueue::new();
    culled.queue(sp(0, 0, 0), MeshingCause::BlockChange);
    culled.queue(sp(0, 1, 0), MeshingCause::BlockChange);
    culled.queue(sp(5, 2, 5), MeshingCause::BlockChange);

    let promoted = culled.collect(8, |sc| sc.cc == sp(0, 0, 0).cc && sc.sy == 0);
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].sc, sp(0, 0, 0));
    assert_eq!(promoted[0].cause, MeshingCause::Culled);
    assert_eq!(culled.len(), 2);
    assert!(!culled.contains(sp(0, 0, 0)));
    assert!(culled.contains(sp(0, 1, 0)));

    // the remaining height of the first column promotes later, emptying it
    let promoted = culled.collect(8, |_| true);
    assert_eq!(promoted.len(), 2);
    assert!(culled.is_empty());
    assert!(culled.columns.is_empty());
}

#[test]
fn test_collect_preserves_explicit_invalidate() {
    let mut culled = CulledQueue::new();
    culled.queue(sp(0, 0, 0), MeshingCause::ExplicitInvalidate);
    culled.queue(sp(1, 0, 0), MeshingCause::NeighborChange);
    let mut promoted = culled.collect(8, |_| true);
    promoted.sort_by_key(|item| item.sc);
    assert_eq!(promoted[0].cause, MeshingCause::ExplicitInvalidate);
    assert_eq!(promoted[1].cause, MeshingCause::Culled);
}

#[test]
fn test_collect_respects_max() {
    let mut culled = CulledQueue::new();
    for sy in 0..10 {
        culled.queue(sp(0, sy, 0), MeshingCause::BlockChange);
    }
    let promoted = culled.collect(3, |_| true);
    assert_eq!(promoted.len(), 3);
    assert_eq!(culled.len(), 7);
}
