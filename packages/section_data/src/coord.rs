
use std::cmp::Ordering;
use vek::*;


/// Edge length of a section, in blocks. Sections are cubes.
pub const SECTION_EXTENT: i64 = 16;

/// Face-adjacency offsets, in section lattice space.
pub const FACE_DIFFS: [[i64; 3]; 6] = [
    [ 1, 0, 0],
    [-1, 0, 0],
    [ 0, 1, 0],
    [ 0,-1, 0],
    [ 0, 0, 1],
    [ 0, 0,-1],
];


/// Key of a section, the cubic sub-volume of the world that is the unit of
/// mesh (re)generation.
///
/// Composed of the chunk column coordinate (block coordinates floor-divided
/// by `SECTION_EXTENT`) and the vertical section index within that column.
/// Equality and hashing consider exactly these three integers. A key never
/// owns or keeps alive the section's block data; holders re-resolve the key
/// against the world on each access.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SectionPos {
    /// Chunk column coordinate, x and z.
    pub cc: Vec2<i64>,
    /// Vertical section index.
    pub sy: i64,
}

/// Shorthand `SectionPos` constructor, axis order x, y, z.
pub fn sp(cx: i64, sy: i64, cz: i64) -> SectionPos {
    SectionPos {
        cc: Vec2 { x: cx, y: cz },
        sy,
    }
}

impl SectionPos {
    /// Key of the section containing the given global block coordinate.
    pub fn of_block<V: Into<Vec3<i64>>>(gbc: V) -> Self {
        let sc = gbc.into().map(|n| n.div_euclid(SECTION_EXTENT));
        sp(sc.x, sc.y, sc.z)
    }

    /// This key as a point in section lattice space, axis order x, y, z.
    pub fn to_vec3(self) -> Vec3<i64> {
        Vec3 {
            x: self.cc.x,
            y: self.sy,
            z: self.cc.y,
        }
    }

    /// Lowest block coordinate contained in the section.
    pub fn min_block(self) -> Vec3<i64> {
        self.to_vec3() * SECTION_EXTENT
    }

    /// Block-space center of the section.
    pub fn center(self) -> Vec3<f64> {
        (self.to_vec3().map(|n| n as f64) + 0.5) * SECTION_EXTENT as f64
    }

    /// Squared euclidean distance from the section center to the given
    /// block-space point.
    pub fn dist_sq(self, pos: Vec3<f64>) -> f64 {
        (self.center() - pos).magnitude_squared()
    }

    /// Key offset by the given number of sections along each axis.
    pub fn offset<V: Into<Vec3<i64>>>(self, diff: V) -> Self {
        let sc = self.to_vec3() + diff.into();
        sp(sc.x, sc.y, sc.z)
    }

    /// The six face-adjacent keys.
    pub fn face_neighbors(self) -> [SectionPos; 6] {
        FACE_DIFFS.map(|diff| self.offset(Vec3::from(diff)))
    }
}

impl Ord for SectionPos {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.cc.x, self.cc.y, self.sy)
            .cmp(&(other.cc.x, other.cc.y, other.sy))
    }
}

impl PartialOrd for SectionPos {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}


#[test]
fn test_of_block_floors_negatives() {
    assert_eq!(SectionPos::of_block([0, 0, 0]), sp(0, 0, 0));
    assert_eq!(SectionPos::of_block([15, 15, 15]), sp(0, 0, 0));
    assert_eq!(SectionPos::of_block([16, 16, 16]), sp(1, 1, 1));
    assert_eq!(SectionPos::of_block([-1, -16, -17]), sp(-1, -1, -2));
}

#[test]
fn test_center_and_dist() {
    let sc = sp(0, 0, 0);
    assert_eq!(sc.center(), Vec3::new(8.0, 8.0, 8.0));
    assert_eq!(sc.dist_sq(Vec3::new(8.0, 8.0, 8.0)), 0.0);
    assert_eq!(sc.dist_sq(Vec3::new(8.0, 8.0, 11.0)), 9.0);
    assert_eq!(sp(6, 12, 18).center(), Vec3::new(104.0, 200.0, 296.0));
}

#[test]
fn test_face_neighbors_are_adjacent() {
    let sc = sp(3, -2, 7);
    for neighbor in sc.face_neighbors() {
        let diff = neighbor.to_vec3() - sc.to_vec3();
        assert_eq!(diff.map(|n| n.abs()).sum(), 1);
    }
}
