
use crate::Vertex;
use vek::*;


pub const VERTICES_PER_QUAD: usize = 4;
pub const INDICES_PER_QUAD: usize = 6;

pub const QUAD_INDICES: [usize; INDICES_PER_QUAD] = [
    0, 1, 3,
    3, 1, 2,
];

// corner factors applied to (ext_1, ext_2), starting bottom-left and going
// clockwise, and the matching tex-space factors (tex v grows downward)
const CORNERS: [([f32; 2], [f32; 2]); VERTICES_PER_QUAD] = [
    ([0.0, 0.0], [0.0, 1.0]),
    ([1.0, 0.0], [0.0, 0.0]),
    ([1.0, 1.0], [1.0, 0.0]),
    ([0.0, 1.0], [1.0, 1.0]),
];


/// A rectangular face of section geometry.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Quad {
    /// Pos of bottom-left corner.
    pub pos_start: Vec3<f32>,
    /// Pos difference from bottom-left to top-left corner.
    pub pos_ext_1: Extent3<f32>,
    /// Pos difference from bottom-left to bottom-right corner.
    pub pos_ext_2: Extent3<f32>,

    /// Tex of top-left corner.
    pub tex_start: Vec2<f32>,
    /// Tex difference from top-left to bottom-right corner.
    pub tex_extent: Extent2<f32>,

    /// Colors of vertices, starting bottom-left and going clockwise.
    pub vert_colors: [Rgba<f32>; VERTICES_PER_QUAD],

    /// Texture index.
    pub tex_index: usize,
}

impl Quad {
    pub fn to_vertices(&self) -> [Vertex; VERTICES_PER_QUAD] {
        let mut corner = 0..VERTICES_PER_QUAD;
        [(); VERTICES_PER_QUAD].map(|()| {
            let i = corner.next().unwrap();
            let ([f1, f2], [tu, tv]) = CORNERS[i];
            Vertex {
                pos: self.pos_start + self.pos_ext_1 * f1 + self.pos_ext_2 * f2,
                tex: self.tex_start + Vec2 {
                    x: self.tex_extent.w * tu,
                    y: self.tex_extent.h * tv,
                },
                color: self.vert_colors[i],
                tex_index: self.tex_index,
            }
        })
    }
}


#[test]
fn test_quad_corners() {
    let quad = Quad {
        pos_start: Vec3::new(1.0, 2.0, 3.0),
        pos_ext_1: Extent3::new(0.0, 1.0, 0.0),
        pos_ext_2: Extent3::new(1.0, 0.0, 0.0),
        tex_start: Vec2::new(0.25, 0.5),
        tex_extent: Extent2::new(0.25, 0.25),
        vert_colors: [Rgba::white(); 4],
        tex_index: 7,
    };
    let [bl, tl, tr, br] = quad.to_vertices();
    assert_eq!(bl.pos, Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(tl.pos, Vec3::new(1.0, 3.0, 3.0));
    assert_eq!(tr.pos, Vec3::new(2.0, 3.0, 3.0));
    assert_eq!(br.pos, Vec3::new(2.0, 2.0, 3.0));
    assert_eq!(tl.tex, Vec2::new(0.25, 0.5));
    assert_eq!(br.tex, Vec2::new(0.5, 0.75));
    assert_eq!(tr.tex_index, 7);
}
