
mod quad;


use vek::*;

pub use crate::quad::{
    Quad,
    VERTICES_PER_QUAD,
    INDICES_PER_QUAD,
    QUAD_INDICES,
};


/// Vertex of section geometry, in block space relative to the section's
/// minimum corner.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Vertex {
    pub pos: Vec3<f32>,
    pub tex: Vec2<f32>,
    pub color: Rgba<f32>,
    pub tex_index: usize,
}

/// CPU-side mesh buffers for one section, the payload handed from mesh
/// workers to the render thread for upload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<usize>,
}

impl MeshData {
    pub fn new() -> Self {
        MeshData::default()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.indices.is_empty()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    /// Append a submesh, rebasing its indices onto this mesh's vertices.
    pub fn extend<V, I>(&mut self, submesh_vertices: V, submesh_indices: I)
    where
        V: IntoIterator<Item=Vertex>,
        I: IntoIterator<Item=usize>,
    {
        let start_num_vertices = self.vertices.len();
        self.vertices.extend(submesh_vertices);
        let indices = submesh_indices
            .into_iter()
            .map(|mut vert_idx| {
                vert_idx += start_num_vertices;
                debug_assert!(
                    vert_idx < self.vertices.len(),
                    "index extends beyond own submesh",
                );
                vert_idx
            });
        self.indices.extend(indices);
        debug_assert!(
            self.indices.len() % 3 == 0,
            "submesh contains non-multiple of 3 number of indices",
        );
    }

    pub fn add_quad(&mut self, quad: &Quad) {
        self.extend(quad.to_vertices(), QUAD_INDICES);
    }

    /// Translate all vertices by the given offset.
    pub fn translate(&mut self, by: Vec3<f32>) {
        for vertex in &mut self.vertices {
            vertex.pos += by;
        }
    }

    pub fn validate_indices(&self) {
        assert!(self.indices.len() % 3 == 0);
        for &index in &self.indices {
            assert!(index < self.vertices.len());
        }
    }

    pub fn triangles<'s>(&'s self) -> impl Iterator<Item=[usize; 3]> + 's {
        self.indices
            .chunks(3)
            .map(|chunk| [chunk[0], chunk[1], chunk[2]])
    }
}


#[cfg(test)]
fn test_vertex(x: f32) -> Vertex {
    Vertex {
        pos: Vec3::new(x, 0.0, 0.0),
        tex: Vec2::zero(),
        color: Rgba::white(),
        tex_index: 0,
    }
}

#[test]
fn test_extend_rebases_indices() {
    let mut mesh = MeshData::new();
    mesh.extend([test_vertex(0.0), test_vertex(1.0), test_vertex(2.0)], [0, 1, 2]);
    mesh.extend([test_vertex(3.0), test_vertex(4.0), test_vertex(5.0)], [2, 1, 0]);
    assert_eq!(mesh.indices, vec![0, 1, 2, 5, 4, 3]);
    mesh.validate_indices();
    assert_eq!(
        mesh.triangles().collect::<Vec<_>>(),
        vec![[0, 1, 2], [5, 4, 3]],
    );
}

#[test]
fn test_translate() {
    let mut mesh = MeshData::new();
    mesh.extend([test_vertex(1.0), test_vertex(2.0), test_vertex(3.0)], [0, 1, 2]);
    mesh.translate(Vec3::new(0.0, 16.0, 0.0));
    assert_eq!(mesh.vertices[2].pos, Vec3::new(3.0, 16.0, 0.0));
}
