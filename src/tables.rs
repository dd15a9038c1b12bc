/// Pairs of octants (o0, o1) where o0 and o1 are face-adjacent, grouped by
/// the axis they straddle. o0 is on the low side.
pub const FACE_ADJACENT_OCTANTS: [[[u8; 2]; 4]; 3] = [
    [
        //  -X     +X
        [0b000, 0b001],
        [0b010, 0b011],
        [0b100, 0b101],
        [0b110, 0b111],
    ],
    [
        //  -Y     +Y
        [0b000, 0b010],
        [0b001, 0b011],
        [0b100, 0b110],
        [0b101, 0b111],
    ],
    [
        //  -Z     +Z
        [0b000, 0b100],
        [0b001, 0b101],
        [0b010, 0b110],
        [0b011, 0b111],
    ],
];

/// Quartets of octants sharing one of the two interior edges parallel to
/// each axis. Quartet order matches the edge procedure's quadrant
/// convention: (0, Q, R, Q|R) in the plane perpendicular to the axis.
pub const EDGE_ADJACENT_OCTANTS: [[[u8; 4]; 2]; 3] = [
    [
        // X-parallel, low-half then high-half edge along X
        [0b000, 0b010, 0b100, 0b110],
        [0b001, 0b011, 0b101, 0b111],
    ],
    [
        // Y-parallel
        [0b000, 0b100, 0b001, 0b101],
        [0b010, 0b110, 0b011, 0b111],
    ],
    [
        // Z-parallel
        [0b000, 0b001, 0b010, 0b011],
        [0b100, 0b101, 0b110, 0b111],
    ],
];
