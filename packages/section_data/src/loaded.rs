
use crate::coord::{
    FACE_DIFFS,
    SectionPos,
};
use std::{
    collections::hash_map::{
        self as hmap,
        HashMap,
    },
    cell::Cell,
};
use slab::Slab;
use vek::*;


const NULL_IDX: u32 = !0;

const NUM_FACES: usize = 6;

// faces in FACE_DIFFS come in +/- pairs, so the reverse of a face index is
// its pair neighbor
fn fidx_rev(fidx: usize) -> usize {
    fidx ^ 1
}

fn diff_to_fidx(diff: Vec3<i64>) -> Option<usize> {
    FACE_DIFFS.iter().position(|&d| Vec3::from(d) == diff)
}


/// Set of loaded sections.
///
/// Serves 3 purposes:
///
/// - Tracks the set of sections currently loaded into the world.
/// - Assigns each loaded section a section index (si), which may be reused
///   if the section is unloaded. Guaranteed to assign indexes with precisely
///   the behavior of a `slab::Slab`.
/// - Provides lookup from section key to section index, with face-neighbor
///   links exploited for O(1) neighbor-completeness checks and for caching
///   in linear access patterns.
#[derive(Debug, Clone)]
pub struct LoadedSections {
    hmap: HashMap<SectionPos, u32>,
    slab: Slab<[u32; NUM_FACES]>,
}

impl LoadedSections {
    /// Construct a new empty set of loaded sections.
    pub fn new() -> Self {
        LoadedSections {
            hmap: HashMap::new(),
            slab: Slab::new(),
        }
    }

    /// Add a new section to the set, and get its assigned section index.
    ///
    /// Panics if already present.
    ///
    /// This should be followed by a corresponding add operation to all
    /// per-section world data.
    pub fn add(&mut self, sc: SectionPos) -> usize {
        // validate and anticipate idx
        let hmap_entry =
            match self.hmap.entry(sc) {
                hmap::Entry::Vacant(vacant) => vacant,
                hmap::Entry::Occupied(_) => panic!("section already loaded"),
            };

        assert!(
            self.slab.vacant_key() < NULL_IDX as usize,
            "too many loaded sections",
        );
        let idx = self.slab.vacant_key() as u32;

        // insert idx into hmap
        hmap_entry.insert(idx);

        // link face neighbors both ways
        let mut neighbors = [NULL_IDX; NUM_FACES];
        for fidx in 0..NUM_FACES {
            let diff = Vec3::from(FACE_DIFFS[fidx]);

            if let Some(idx2) = self.hmap.get(&sc.offset(diff)).copied() {
                neighbors[fidx] = idx2;
                self.slab[idx2 as usize][fidx_rev(fidx)] = idx;
            }
        }

        // insert neighbors into slab
        self.slab.insert(neighbors);

        idx as usize
    }

    /// Remove a section from the set. Its section index may be reused by
    /// following `add` transactions.
    ///
    /// Panics if not present.
    ///
    /// This should be followed by a corresponding remove operation to all
    /// per-section world data.
    pub fn remove(&mut self, sc: SectionPos) -> usize {
        let idx = self.hmap
            .remove(&sc)
            .expect("section not loaded");

        // remove neighbors from slab, nullify their links back to self
        let neighbors = self.slab.remove(idx as usize);
        for fidx in 0..NUM_FACES {
            let idx2 = neighbors[fidx];
            if idx2 != NULL_IDX {
                self.slab[idx2 as usize][fidx_rev(fidx)] = NULL_IDX;
            }
        }

        idx as usize
    }

    /// Whether the given section is loaded.
    pub fn contains(&self, sc: SectionPos) -> bool {
        self.hmap.contains_key(&sc)
    }

    /// Whether all 6 face neighbors of the given section are loaded, which
    /// meshing requires for seamless face culling at section borders.
    ///
    /// False if the section itself is not loaded.
    pub fn neighbors_complete(&self, sc: SectionPos) -> bool {
        self.hmap
            .get(&sc)
            .map(|&idx| self.slab[idx as usize]
                .iter()
                .all(|&idx2| idx2 != NULL_IDX))
            .unwrap_or(false)
    }

    /// Number of loaded sections.
    pub fn len(&self) -> usize {
        self.slab.len()
    }

    /// Iterate through the key and section index of all loaded sections.
    pub fn iter<'c>(&'c self) -> impl Iterator<Item=(SectionPos, usize)> + 'c {
        self.hmap
            .iter()
            .map(|(&sc, &idx)| (sc, idx as usize))
    }

    /// Produce a getter, for lookups, which does caching and link-traversal.
    ///
    /// Sequential accesses of the same section are cached, and sequential
    /// accesses of face-adjacent sections are done with link traversal
    /// rather than a full hashmap lookup.
    pub fn getter(&self) -> Getter {
        Getter {
            sections: self,
            cache: Default::default(),
        }
    }
}


/// See `LoadedSections::getter`.
#[derive(Debug, Clone)]
pub struct Getter<'a> {
    sections: &'a LoadedSections,
    cache: Cell<Option<(SectionPos, u32)>>,
}

impl<'a> Getter<'a> {
    /// Perform a key -> section index lookup.
    pub fn get(&self, sc: SectionPos) -> Option<usize> {
        if let Some((cache_sc, cache_idx)) = self.cache.get() {
            // case 1: is cached
            if cache_sc == sc {
                return Some(cache_idx as usize);
            }

            // case 2: face neighbor is cached, traverse link
            if let Some(fidx) = diff_to_fidx(sc.to_vec3() - cache_sc.to_vec3()) {
                let idx = self.sections.slab[cache_idx as usize][fidx];
                return
                    if idx == NULL_IDX { None }
                    else {
                        self.cache.set(Some((sc, idx)));
                        Some(idx as usize)
                    };
            }
        }

        // case 3: not cached, hashmap lookup
        let idx = self.sections.hmap
            .get(&sc)
            .copied();
        if let Some(idx) = idx {
            self.cache.set(Some((sc, idx)));
            Some(idx as usize)
        } else {
            None
        }
    }
}


#[cfg(test)]
use crate::coord::sp;

#[test]
fn test_add_remove_reuses_indices() {
    let mut sections = LoadedSections::new();
    assert_eq!(sections.add(sp(0, 0, 0)), 0);
    assert_eq!(sections.add(sp(1, 0, 0)), 1);
    assert_eq!(sections.remove(sp(0, 0, 0)), 0);
    assert!(!sections.contains(sp(0, 0, 0)));
    assert_eq!(sections.add(sp(2, 0, 0)), 0);
    assert_eq!(sections.len(), 2);
}

#[test]
fn test_getter_matches_plain_lookup() {
    let mut sections = LoadedSections::new();
    for x in 0..4 {
        for y in 0..2 {
            sections.add(sp(x, y, 0));
        }
    }
    let getter = sections.getter();
    // walk linearly so the getter exercises link traversal
    for x in 0..4 {
        for y in 0..2 {
            let sc = sp(x, y, 0);
            assert_eq!(
                getter.get(sc),
                sections.hmap.get(&sc).map(|&idx| idx as usize),
            );
        }
    }
    assert_eq!(getter.get(sp(9, 9, 9)), None);
}

#[test]
fn test_neighbors_complete_flips_with_sixth_neighbor() {
    let mut sections = LoadedSections::new();
    let sc = sp(0, 0, 0);
    sections.add(sc);
    assert!(!sections.neighbors_complete(sc));
    for neighbor in sc.face_neighbors() {
        sections.add(neighbor);
    }
    assert!(sections.neighbors_complete(sc));
    sections.remove(sp(1, 0, 0));
    assert!(!sections.neighbors_complete(sc));
    assert!(!sections.neighbors_complete(sp(9, 9, 9)));
}
