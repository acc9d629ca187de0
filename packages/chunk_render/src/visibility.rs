
use section_data::SectionPos;
use vek::*;


/// Dense window of sections tracked around the camera.
///
/// A bitset indexed by 3D offset from a moving origin section, with a
/// horizontal radius for x/z and a vertical radius for y. Membership means
/// the engine reported the section loaded (see
/// `ChunkRenderer::section_loaded`) and it is inside the tracked window;
/// answering that is O(1). Out-of-range keys are simply not tracked: they
/// report false, and inserting them is silently ignored.
#[derive(Debug, Clone)]
pub struct VisibilitySet {
    origin: SectionPos,
    radius_h: i64,
    radius_v: i64,
    words: Vec<u64>,
    count: usize,
}

impl VisibilitySet {
    /// Construct empty, centered on the given origin section.
    pub fn new(origin: SectionPos, radius_h: i64, radius_v: i64) -> Self {
        assert!(radius_h >= 0 && radius_v >= 0, "negative visibility radius");
        let side_h = (2 * radius_h + 1) as usize;
        let side_v = (2 * radius_v + 1) as usize;
        let volume = side_h * side_h * side_v;
        VisibilitySet {
            origin,
            radius_h,
            radius_v,
            words: vec![0; volume.div_ceil(64)],
            count: 0,
        }
    }

    fn bit_index(&self, sc: SectionPos) -> Option<usize> {
        let diff = sc.to_vec3() - self.origin.to_vec3();
        if diff.x.abs() > self.radius_h
            || diff.z.abs() > self.radius_h
            || diff.y.abs() > self.radius_v
        {
            return None;
        }
        let side_h = (2 * self.radius_h + 1) as usize;
        let side_v = (2 * self.radius_v + 1) as usize;
        let x = (diff.x + self.radius_h) as usize;
        let y = (diff.y + self.radius_v) as usize;
        let z = (diff.z + self.radius_h) as usize;
        Some((x * side_v + y) * side_h + z)
    }

    fn decode(&self, idx: usize) -> SectionPos {
        let side_h = (2 * self.radius_h + 1) as usize;
        let side_v = (2 * self.radius_v + 1) as usize;
        let x = (idx / (side_h * side_v)) as i64 - self.radius_h;
        let y = ((idx / side_h) % side_v) as i64 - self.radius_v;
        let z = (idx % side_h) as i64 - self.radius_h;
        self.origin.offset(Vec3 { x, y, z })
    }

    /// Whether the section is tracked.
    pub fn contains(&self, sc: SectionPos) -> bool {
        self.bit_index(sc)
            .map(|idx| self.words[idx / 64] & (1 << (idx % 64)) != 0)
            .unwrap_or(false)
    }

    /// Track the section. Returns whether newly tracked; out-of-window keys
    /// are ignored and report false.
    pub fn insert(&mut self, sc: SectionPos) -> bool {
        let Some(idx) = self.bit_index(sc) else { return false };
        let mask = 1 << (idx % 64);
        let was = self.words[idx / 64] & mask != 0;
        self.words[idx / 64] |= mask;
        if !was {
            self.count += 1;
        }
        !was
    }

    /// Stop tracking the section. Returns whether it was tracked.
    pub fn remove(&mut self, sc: SectionPos) -> bool {
        let Some(idx) = self.bit_index(sc) else { return false };
        let mask = 1 << (idx % 64);
        let was = self.words[idx / 64] & mask != 0;
        self.words[idx / 64] &= !mask;
        if was {
            self.count -= 1;
        }
        was
    }

    /// Move the window to a new origin, preserving membership of sections
    /// still in range and dropping the rest. O(window volume); meant to be
    /// called every camera-moved tick.
    pub fn recenter(&mut self, new_origin: SectionPos) {
        if new_origin == self.origin {
            return;
        }
        let kept = self.iter().collect::<Vec<_>>();
        let mut next = VisibilitySet::new(new_origin, self.radius_h, self.radius_v);
        for sc in kept {
            next.insert(sc);
        }
        *self = next;
    }

    /// Iterate over all tracked sections.
    pub fn iter<'s>(&'s self) -> impl Iterator<Item=SectionPos> + 's {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(word_idx, &word)| {
                let mut word = word;
                std::iter::from_fn(move || {
                    if word == 0 {
                        return None;
                    }
                    let bit = word.trailing_zeros() as usize;
                    word &= word - 1;
                    Some(word_idx * 64 + bit)
                })
            })
            .map(|idx| self.decode(idx))
    }

    /// Whether the section is inside the tracked window at all.
    pub fn in_range(&self, sc: SectionPos) -> bool {
        self.bit_index(sc).is_some()
    }

    /// Number of tracked sections.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Current origin section.
    pub fn origin(&self) -> SectionPos {
        self.origin
    }
}


#[cfg(test)]
use section_data::sp;

#[test]
fn test_insert_contains_remove() {
    let mut set = VisibilitySet::new(sp(0, 0, 0), 2, 1);
    assert!(!set.contains(sp(1, 1, -2)));
    assert!(set.insert(sp(1, 1, -2)));
    assert!(!set.insert(sp(1, 1, -2)));
    assert!(set.contains(sp(1, 1, -2)));
    assert_eq!(set.len(), 1);
    assert!(set.remove(sp(1, 1, -2)));
    assert!(!set.remove(sp(1, 1, -2)));
    assert_eq!(set.len(), 0);
}

#[test]
fn test_out_of_range_is_silently_untracked() {
    let mut set = VisibilitySet::new(sp(0, 0, 0), 2, 1);
    assert!(!set.insert(sp(3, 0, 0)));
    assert!(!set.insert(sp(0, 2, 0)));
    assert!(!set.contains(sp(3, 0, 0)));
    assert!(!set.in_range(sp(3, 0, 0)));
    assert!(set.in_range(sp(2, -1, -2)));
    assert_eq!(set.len(), 0);
}

#[test]
fn test_recenter_preserves_in_range_members() {
    let mut set = VisibilitySet::new(sp(0, 0, 0), 2, 1);
    set.insert(sp(2, 0, 0));
    set.insert(sp(-2, 0, 0));
    set.insert(sp(0, 1, 1));
    set.recenter(sp(1, 0, 0));
    // (-2,0,0) fell out of the window, the others remain
    assert!(set.contains(sp(2, 0, 0)));
    assert!(set.contains(sp(0, 1, 1)));
    assert!(!set.contains(sp(-2, 0, 0)));
    assert_eq!(set.len(), 2);
    assert_eq!(set.origin(), sp(1, 0, 0));
    // and membership can be reintroduced relative to the new origin
    assert!(set.insert(sp(3, 0, 0)));
}

#[test]
fn test_iter_round_trips() {
    let mut set = VisibilitySet::new(sp(10, -3, 7), 3, 2);
    let members = [sp(10, -3, 7), sp(13, -1, 4), sp(7, -5, 10)];
    for sc in members {
        assert!(set.insert(sc));
    }
    let mut collected = set.iter().collect::<Vec<_>>();
    collected.sort();
    let mut expected = members.to_vec();
    expected.sort();
    assert_eq!(collected, expected);
}
