//! Dual contouring of implicit surfaces over an adaptive octree.
//!
//! Given a scalar field f (signed-distance-like: negative inside) and an
//! axis-aligned region, [`render`] produces a closed indexed triangle mesh
//! approximating the surface f = 0. The octree subdivides until each axis's
//! budget is spent, pruning subtrees whose interval sign is uniform; each
//! surface-crossing leaf places one vertex by minimizing a quadratic error
//! function over its edge-crossing samples, and the mutually recursive
//! cell/face/edge walk stitches those vertices into quads around every
//! sign-changing minimal edge, pairing cells of different depths across
//! T-junctions.
//!
//! # References
//!
//! - Tao Ju, Frank Losasso, Scott Schaefer, Joe Warren ["Dual Contouring of
//!   Hermite Data"](https://www.cs.rice.edu/~jwarren/papers/dualcontour.pdf)

mod contour;
mod eval;
mod mesh;
mod octree;
mod qef;
mod region;
mod tables;

pub use contour::{render, Error};
pub use eval::{central_gradient, DistanceField, Evaluator, IntervalClass};
pub use mesh::Mesh;
pub use octree::{Leaf, Node, NodeId, Octree};
pub use qef::{Qef, Solution};
pub use region::{Region, AXIS_X, AXIS_Y, AXIS_Z};
