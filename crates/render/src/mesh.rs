use bytemuck::{Pod, Zeroable};

/// Vertex layout shared by the quad and the solid-color shader.
///
/// | Attribute | Format    | Offset | Location |
/// |-----------|-----------|--------|----------|
/// | position  | Float32x3 | 0      | 0        |
/// | normal    | Float32x3 | 12     | 1        |
/// | uv        | Float32x2 | 24     | 2        |
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const fn at(position: [f32; 3]) -> Self {
        Self {
            position,
            normal: [0.0; 3],
            uv: [0.0; 2],
        }
    }
}

/// Counter-clockwise when viewed from +Z, which is the front face.
pub const QUAD_INDICES: [u32; 6] = [2, 1, 0, 0, 3, 2];

/// Unit quad in the XY plane, centred on the origin.
pub fn quad_vertices() -> [Vertex; 4] {
    [
        Vertex::at([-0.5, 0.5, 0.0]),
        Vertex::at([0.5, 0.5, 0.0]),
        Vertex::at([0.5, -0.5, 0.0]),
        Vertex::at([-0.5, -0.5, 0.0]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(std::mem::offset_of!(Vertex, normal), 12);
        assert_eq!(std::mem::offset_of!(Vertex, uv), 24);
    }

    #[test]
    fn quad_triangles_face_positive_z() {
        let verts = quad_vertices();
        for tri in QUAD_INDICES.chunks(3) {
            let a = Vec3::from(verts[tri[0] as usize].position);
            let b = Vec3::from(verts[tri[1] as usize].position);
            let c = Vec3::from(verts[tri[2] as usize].position);
            let normal = (b - a).cross(c - a);
            assert!(normal.z > 0.0, "triangle {tri:?} winds clockwise");
        }
    }

    #[test]
    fn quad_indices_reference_all_vertices() {
        let verts = quad_vertices();
        for i in 0..verts.len() as u32 {
            assert!(QUAD_INDICES.contains(&i));
        }
    }
}
