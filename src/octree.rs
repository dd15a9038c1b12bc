use glam::DVec3;

use crate::eval::{Evaluator, IntervalClass};
use crate::qef::Qef;
use crate::region::Region;

pub type NodeId = u32;

/// The 12 cell edges as corner-index pairs, grouped X, Y, Z.
const CELL_EDGES: [[u8; 2]; 12] = [
    [0b000, 0b001],
    [0b010, 0b011],
    [0b100, 0b101],
    [0b110, 0b111],
    [0b000, 0b010],
    [0b001, 0b011],
    [0b100, 0b110],
    [0b101, 0b111],
    [0b000, 0b100],
    [0b001, 0b101],
    [0b010, 0b110],
    [0b011, 0b111],
];

/// One octree cell: either eight children or a terminal sample.
#[derive(Clone, Debug)]
pub enum Node {
    Branch { children: [NodeId; 8] },
    Leaf(Leaf),
}

#[derive(Clone, Debug)]
pub struct Leaf {
    /// Corner sign mask: bit `i` set when f < 0 (inside) at region corner `i`.
    pub corners: u8,
    /// Representative vertex, inside the leaf's bounding box.
    pub vertex: DVec3,
    /// Rank of the QEF that placed the vertex (0 flat .. 3 corner).
    pub rank: u8,
    /// True when the corner signs disagree, i.e. the surface passes through.
    pub crossing: bool,
}

impl Leaf {
    /// Sign at corner `i`: true means inside.
    pub fn corner(&self, i: u8) -> bool {
        self.corners & (1 << i) != 0
    }

    fn uniform(inside: bool, region: &Region) -> Self {
        Self {
            corners: if inside { 0xff } else { 0 },
            vertex: region.center(),
            rank: 0,
            crossing: false,
        }
    }
}

/// Adaptive octree over a scalar field, stored as a pool of nodes.
#[derive(Debug)]
pub struct Octree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Octree {
    /// Builds the octree top-down over `region`.
    ///
    /// Subtrees whose interval sign is uniform become single leaves at
    /// whatever depth that is established; surface leaves are only created
    /// once the region's subdivision budget is spent.
    pub fn build<E: Evaluator>(eval: &E, region: Region) -> Self {
        let mut builder = Builder {
            eval,
            nodes: Vec::new(),
            warned_non_finite: false,
        };
        let root = builder.node(&region);
        Self {
            nodes: builder.nodes,
            root,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    pub fn leaf(&self, id: NodeId) -> Option<&Leaf> {
        match self.node(id) {
            Node::Leaf(leaf) => Some(leaf),
            Node::Branch { .. } => None,
        }
    }

    /// Child `i` of a branch; a leaf stands in for all of its children.
    pub(crate) fn child_or_self(&self, id: NodeId, i: u8) -> NodeId {
        match self.node(id) {
            Node::Branch { children } => children[i as usize],
            Node::Leaf(_) => id,
        }
    }
}

struct Builder<'a, E> {
    eval: &'a E,
    nodes: Vec<Node>,
    warned_non_finite: bool,
}

impl<E: Evaluator> Builder<'_, E> {
    fn push(&mut self, node: Node) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(node);
        id
    }

    fn node(&mut self, region: &Region) -> NodeId {
        match self.eval.interval(region.lo(), region.hi()) {
            IntervalClass::Positive => {
                return self.push(Node::Leaf(Leaf::uniform(false, region)));
            }
            IntervalClass::Negative => {
                return self.push(Node::Leaf(Leaf::uniform(true, region)));
            }
            IntervalClass::Ambiguous => {}
        }

        if region.is_terminal() {
            let leaf = self.surface_leaf(region);
            return self.push(Node::Leaf(leaf));
        }

        let mut children = [0; 8];
        for (child, sub) in children.iter_mut().zip(region.split()) {
            *child = self.node(&sub);
        }
        self.push(Node::Branch { children })
    }

    /// Sample the region's corners and edge crossings and place a vertex.
    fn surface_leaf(&mut self, region: &Region) -> Leaf {
        let corners = region.corners();
        let mut values = [0.0f64; 8];
        let mut mask = 0u8;
        for (i, &corner) in corners.iter().enumerate() {
            let v = self.eval.value(corner);
            if !v.is_finite() {
                self.warn_non_finite();
            }
            values[i] = v;
            // A non-finite sample compares false here and lands outside.
            if v < 0.0 {
                mask |= 1 << i;
            }
        }

        if mask == 0 || mask == 0xff {
            // Interval said ambiguous, but no corner edge crosses.
            return Leaf::uniform(mask != 0, region);
        }

        let mut qef = Qef::new(3);
        for [e0, e1] in CELL_EDGES {
            let inside0 = mask & (1 << e0) != 0;
            let inside1 = mask & (1 << e1) != 0;
            if inside0 == inside1 {
                continue;
            }
            let (v0, v1) = (values[e0 as usize], values[e1 as usize]);
            if !v0.is_finite() || !v1.is_finite() {
                continue;
            }
            let t = v0 / (v0 - v1);
            let p = corners[e0 as usize].lerp(corners[e1 as usize], t);

            let (v, grad) = self.eval.derivs(p);
            if !v.is_finite() {
                self.warn_non_finite();
                continue;
            }
            let Some(normal) = grad.try_normalize() else {
                // Zero or non-finite gradient; nothing to constrain with.
                continue;
            };
            qef.insert(p, normal, v);
        }

        if qef.sample_count() == 0 {
            // Every crossing sample was rejected; fall back to the region
            // center so the leaf still has a usable vertex.
            return Leaf {
                crossing: true,
                corners: mask,
                ..Leaf::uniform(false, region)
            };
        }

        // Fix the value coordinate at its sampled mean and solve the spatial
        // problem, clamped into the leaf's box.
        let sol = qef
            .sub(0b0111)
            .solve_bounded(region.lo(), region.hi(), &values);
        Leaf {
            corners: mask,
            vertex: sol.position,
            rank: sol.rank as u8,
            crossing: true,
        }
    }

    fn warn_non_finite(&mut self) {
        if !self.warned_non_finite {
            self.warned_non_finite = true;
            log::warn!("evaluator produced a non-finite value; treating as outside");
        }
    }
}
