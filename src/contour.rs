use thiserror::Error;

use crate::eval::Evaluator;
use crate::mesh::{Mesh, MeshVertexId, NULL_MESH_VERTEX_ID};
use crate::octree::{Node, NodeId, Octree};
use crate::region::{Region, AXIS_X, AXIS_Y, AXIS_Z};
use crate::tables::{EDGE_ADJACENT_OCTANTS, FACE_ADJACENT_OCTANTS};

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The region has `lo > hi` on some axis.
    #[error("degenerate region: lo exceeds hi on some axis")]
    DegenerateRegion,
}

/// Mesh the zero set of `eval` over `region`.
///
/// The octree is built, walked, and dropped here; the caller owns the mesh.
pub fn render<E: Evaluator>(eval: &E, region: Region) -> Result<Mesh, Error> {
    if !region.is_valid() {
        return Err(Error::DegenerateRegion);
    }
    let octree = Octree::build(eval, region);
    Ok(octree.walk_dual())
}

impl Octree {
    /// Walk the dual of the octree, stitching leaf vertices into a mesh.
    ///
    /// Every surface-crossing leaf contributes exactly one vertex, emitted on
    /// first reference; every sign-changing minimal edge contributes one quad
    /// (two triangles) connecting the four finest cells around it.
    pub fn walk_dual(&self) -> Mesh {
        let mut walker = Walker {
            octree: self,
            verts: vec![NULL_MESH_VERTEX_ID; self.nodes().len()],
            mesh: Mesh::default(),
        };
        walker.cell(self.root());
        walker.mesh
    }
}

/// `q` such that `(axis, q, next_axis(q))` is a right-handed frame.
fn next_axis(axis: u8) -> u8 {
    match axis {
        AXIS_X => AXIS_Y,
        AXIS_Y => AXIS_Z,
        _ => AXIS_X,
    }
}

struct Walker<'a> {
    octree: &'a Octree,
    /// Mesh vertex per pool id, filled on first reference.
    verts: Vec<MeshVertexId>,
    mesh: Mesh,
}

impl Walker<'_> {
    /// Recurse into a branch, then seed the 12 interior face pairs and 6
    /// interior edge quartets between its children.
    fn cell(&mut self, c: NodeId) {
        let octree = self.octree;
        let Node::Branch { children } = octree.node(c) else {
            return;
        };
        let children = *children;

        for child in children {
            self.cell(child);
        }

        for (i, pairs) in FACE_ADJACENT_OCTANTS.iter().enumerate() {
            let axis = 1 << i;
            for &[lo, hi] in pairs {
                self.face(children[lo as usize], children[hi as usize], axis);
            }
        }

        for (i, quartets) in EDGE_ADJACENT_OCTANTS.iter().enumerate() {
            let axis = 1 << i;
            for &[e0, e1, e2, e3] in quartets {
                self.edge(
                    children[e0 as usize],
                    children[e1 as usize],
                    children[e2 as usize],
                    children[e3 as usize],
                    axis,
                );
            }
        }
    }

    /// Two cells adjacent along `axis`, `a` on the low side.
    ///
    /// Leaves stand in for their own children, so mixed depths recurse into
    /// the finer side until both cells are leaves.
    fn face(&mut self, a: NodeId, b: NodeId, axis: u8) {
        let octree = self.octree;
        let a_leaf = octree.leaf(a).is_some();
        let b_leaf = octree.leaf(b).is_some();
        if a_leaf && b_leaf {
            return;
        }

        let q = next_axis(axis);
        let r = next_axis(q);
        let sub = |parent: NodeId, i: u8| octree.child_or_self(parent, i);

        self.face(sub(a, axis), sub(b, 0), axis);
        self.face(sub(a, q | axis), sub(b, q), axis);
        self.face(sub(a, r | axis), sub(b, r), axis);
        self.face(sub(a, q | r | axis), sub(b, q | r), axis);

        self.edge(sub(a, axis), sub(a, r | axis), sub(b, 0), sub(b, r), q);
        self.edge(
            sub(a, q | axis),
            sub(a, q | r | axis),
            sub(b, q),
            sub(b, q | r),
            q,
        );

        self.edge(sub(a, axis), sub(b, 0), sub(a, axis | q), sub(b, q), r);
        self.edge(
            sub(a, r | axis),
            sub(b, r),
            sub(a, r | axis | q),
            sub(b, r | q),
            r,
        );
    }

    /// Four cells sharing an `axis`-parallel edge, in the quadrant order
    /// seeded by [`Self::cell`] and [`Self::face`].
    fn edge(&mut self, a: NodeId, b: NodeId, c: NodeId, d: NodeId, axis: u8) {
        let octree = self.octree;
        let q = next_axis(axis);
        let r = next_axis(q);

        if let (Node::Leaf(la), Node::Leaf(lb), Node::Leaf(lc), Node::Leaf(ld)) = (
            octree.node(a),
            octree.node(b),
            octree.node(c),
            octree.node(d),
        ) {
            // Each cell witnesses the shared edge through its own corner
            // pair; any disagreement means the minimal edge crosses.
            let sign_change = la.corner(q | r) != la.corner(q | r | axis)
                || lb.corner(r) != lb.corner(r | axis)
                || lc.corner(q) != lc.corner(q | axis)
                || ld.corner(0) != ld.corner(axis);
            if !sign_change {
                return;
            }
            // A uniform leaf has no vertex to contribute; skip the quad.
            if !(la.crossing && lb.crossing && lc.crossing && ld.crossing) {
                return;
            }
            if ld.corner(0) {
                self.quad(a, b, c, d);
            } else {
                self.quad(a, c, b, d);
            }
        } else {
            let sub = |parent: NodeId, i: u8| octree.child_or_self(parent, i);
            self.edge(sub(a, q | r), sub(b, r), sub(c, q), sub(d, 0), axis);
            self.edge(
                sub(a, q | r | axis),
                sub(b, r | axis),
                sub(c, q | axis),
                sub(d, axis),
                axis,
            );
        }
    }

    /// Emit the two triangles of a quad, materializing vertices on first
    /// touch. Triangles that collapsed onto a repeated vertex are dropped.
    fn quad(&mut self, a: NodeId, b: NodeId, c: NodeId, d: NodeId) {
        let [ia, ib, ic, id] = [a, b, c, d].map(|n| self.index(n));
        for tri in [[ia, ib, ic], [ic, ib, id]] {
            if tri[0] != tri[1] && tri[1] != tri[2] && tri[0] != tri[2] {
                self.mesh.triangles.push(tri);
            }
        }
    }

    fn index(&mut self, id: NodeId) -> MeshVertexId {
        if self.verts[id as usize] == NULL_MESH_VERTEX_ID {
            let leaf = self
                .octree
                .leaf(id)
                .expect("edge quartets contain only leaves");
            self.verts[id as usize] = self.mesh.vertices.len() as MeshVertexId;
            self.mesh.vertices.push(leaf.vertex);
        }
        self.verts[id as usize]
    }
}
