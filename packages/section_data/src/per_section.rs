
use crate::coord::SectionPos;
use slab::Slab;


/// Per-section storage.
///
/// Should be updated in synchrony with `LoadedSections`. Functionally, could
/// work solely on si, without containing the key. However, storing the key
/// and performing debug equality assertions on it helps detect cases of
/// accidentally failing to keep updated in synchrony with `LoadedSections`.
#[derive(Debug, Clone)]
pub struct PerSection<T>(pub Slab<(SectionPos, T)>);

impl<T> PerSection<T> {
    pub fn new() -> Self {
        PerSection(Slab::new())
    }

    /// Add a new value with the given key and si.
    ///
    /// Should follow calls to `LoadedSections::add`.
    pub fn add(&mut self, sc: SectionPos, si: usize, val: T) {
        let si2 = self.0.insert((sc, val));
        debug_assert_eq!(si, si2);
    }

    /// Remove a present value with the given key and si.
    ///
    /// Should follow calls to `LoadedSections::remove`.
    pub fn remove(&mut self, sc: SectionPos, si: usize) -> T {
        let (sc2, val) = self.0.remove(si);
        debug_assert_eq!(sc, sc2);
        val
    }

    /// Get by si, debug-assert the key is correct.
    pub fn get(&self, sc: SectionPos, si: usize) -> &T {
        let &(sc2, ref val) = &self.0[si];
        debug_assert_eq!(sc, sc2);
        val
    }

    /// Mutably get by si, debug-assert the key is correct.
    pub fn get_mut(&mut self, sc: SectionPos, si: usize) -> &mut T {
        let &mut (sc2, ref mut val) = &mut self.0[si];
        debug_assert_eq!(sc, sc2);
        val
    }
}


#[test]
fn test_per_section_follows_loaded_sections() {
    use crate::{
        loaded::LoadedSections,
        coord::sp,
    };

    let mut sections = LoadedSections::new();
    let mut meshed = PerSection::new();

    let a = sp(0, 0, 0);
    let b = sp(0, 1, 0);
    let si_a = sections.add(a);
    meshed.add(a, si_a, "a");
    let si_b = sections.add(b);
    meshed.add(b, si_b, "b");

    assert_eq!(*meshed.get(a, si_a), "a");
    *meshed.get_mut(b, si_b) = "b2";

    let si = sections.remove(b);
    assert_eq!(meshed.remove(b, si), "b2");
}
