use glam::DVec3;

pub type MeshVertexId = u32;
pub const NULL_MESH_VERTEX_ID: MeshVertexId = MeshVertexId::MAX;

/// An indexed triangle mesh.
///
/// Triangle indices reference `vertices`; winding is outward-facing (the
/// cross product of the first two triangle edges points toward increasing
/// field values).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<DVec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }
}
