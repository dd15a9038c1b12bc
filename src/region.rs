use glam::{DVec3, UVec3};

/// Axis bit for corner indexing: bit set means the high side of X.
pub const AXIS_X: u8 = 1;
/// Axis bit for the high side of Y.
pub const AXIS_Y: u8 = 2;
/// Axis bit for the high side of Z.
pub const AXIS_Z: u8 = 4;

/// An axis-aligned box with a per-axis subdivision budget.
///
/// `levels` counts how many more times each axis may be halved. Splitting
/// decrements the level of every axis it halves; an axis whose level has
/// reached zero is inherited unchanged, so recursion degenerates to quadtree
/// or binary splitting on the remaining axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Region {
    lo: DVec3,
    hi: DVec3,
    levels: UVec3,
}

impl Region {
    pub fn new(lo: DVec3, hi: DVec3, levels: UVec3) -> Self {
        Self { lo, hi, levels }
    }

    /// A cubical budget: the same number of halvings on every axis.
    pub fn with_uniform_levels(lo: DVec3, hi: DVec3, levels: u32) -> Self {
        Self::new(lo, hi, UVec3::splat(levels))
    }

    pub fn lo(&self) -> DVec3 {
        self.lo
    }

    pub fn hi(&self) -> DVec3 {
        self.hi
    }

    pub fn center(&self) -> DVec3 {
        0.5 * (self.lo + self.hi)
    }

    /// False when `lo > hi` on some axis (including NaN bounds).
    pub fn is_valid(&self) -> bool {
        self.lo.cmple(self.hi).all()
    }

    /// All subdivision levels exhausted.
    pub fn is_terminal(&self) -> bool {
        self.levels == UVec3::ZERO
    }

    /// Corner `i` in canonical octant order: bit 0 selects the high side of
    /// X, bit 1 of Y, bit 2 of Z.
    pub fn corner(&self, i: u8) -> DVec3 {
        debug_assert!(i < 8);
        DVec3::new(
            if i & AXIS_X != 0 { self.hi.x } else { self.lo.x },
            if i & AXIS_Y != 0 { self.hi.y } else { self.lo.y },
            if i & AXIS_Z != 0 { self.hi.z } else { self.lo.z },
        )
    }

    pub fn corners(&self) -> [DVec3; 8] {
        [0, 1, 2, 3, 4, 5, 6, 7].map(|i| self.corner(i))
    }

    /// Boundary-inclusive containment.
    pub fn contains(&self, p: DVec3) -> bool {
        self.lo.cmple(p).all() && p.cmple(self.hi).all()
    }

    /// Split into eight children in canonical octant order.
    ///
    /// Child `i` occupies the octant whose corner `i` coincides with the
    /// parent's corner `i`. Axes with an exhausted level keep the parent's
    /// full range, so both "children" of that axis are identical and the
    /// recursion is effectively lower-dimensional there.
    pub fn split(&self) -> [Region; 8] {
        let mid = self.center();
        let child_levels = UVec3::new(
            self.levels.x.saturating_sub(1),
            self.levels.y.saturating_sub(1),
            self.levels.z.saturating_sub(1),
        );

        [0u8, 1, 2, 3, 4, 5, 6, 7].map(|i| {
            let pick = |axis_bit: u8, lo: f64, mid: f64, hi: f64, level: u32| -> (f64, f64) {
                if level == 0 {
                    // Exhausted axis: inherit the full range.
                    (lo, hi)
                } else if i & axis_bit != 0 {
                    (mid, hi)
                } else {
                    (lo, mid)
                }
            };
            let (xl, xh) = pick(AXIS_X, self.lo.x, mid.x, self.hi.x, self.levels.x);
            let (yl, yh) = pick(AXIS_Y, self.lo.y, mid.y, self.hi.y, self.levels.y);
            let (zl, zh) = pick(AXIS_Z, self.lo.z, mid.z, self.hi.z, self.levels.z);
            Region::new(
                DVec3::new(xl, yl, zl),
                DVec3::new(xh, yh, zh),
                child_levels,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_ordering_matches_axis_bits() {
        let r = Region::with_uniform_levels(DVec3::ZERO, DVec3::ONE, 1);
        assert_eq!(r.corner(0), DVec3::new(0.0, 0.0, 0.0));
        assert_eq!(r.corner(AXIS_X), DVec3::new(1.0, 0.0, 0.0));
        assert_eq!(r.corner(AXIS_Y), DVec3::new(0.0, 1.0, 0.0));
        assert_eq!(r.corner(AXIS_Z), DVec3::new(0.0, 0.0, 1.0));
        assert_eq!(
            r.corner(AXIS_X | AXIS_Y | AXIS_Z),
            DVec3::new(1.0, 1.0, 1.0)
        );
    }

    #[test]
    fn split_partitions_parent_exactly() {
        let r = Region::with_uniform_levels(DVec3::splat(-2.0), DVec3::splat(2.0), 3);
        let children = r.split();
        for (i, c) in children.iter().enumerate() {
            assert_eq!(c.corner(i as u8), r.corner(i as u8), "octant {i}");
            assert_eq!(c.levels, UVec3::splat(2));
        }
        assert_eq!(children[0].hi(), r.center());
        assert_eq!(children[7].lo(), r.center());
    }

    #[test]
    fn exhausted_axis_is_inherited() {
        let r = Region::new(
            DVec3::new(0.0, 0.0, -1.0),
            DVec3::new(4.0, 4.0, 1.0),
            UVec3::new(2, 2, 0),
        );
        let children = r.split();
        for c in &children {
            assert_eq!(c.lo().z, -1.0);
            assert_eq!(c.hi().z, 1.0);
        }
        // X and Y still halve.
        assert_eq!(children[0].hi().x, 2.0);
        assert_eq!(children[AXIS_X as usize].lo().x, 2.0);
    }

    #[test]
    fn terminal_after_all_levels_spent() {
        let r = Region::new(DVec3::ZERO, DVec3::ONE, UVec3::new(1, 0, 0));
        assert!(!r.is_terminal());
        assert!(r.split()[0].is_terminal());
    }

    #[test]
    fn degenerate_region_detected() {
        let r = Region::with_uniform_levels(DVec3::ONE, DVec3::ZERO, 1);
        assert!(!r.is_valid());
    }
}
