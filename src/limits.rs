/// Facilities a single engine will hold.
pub const MAX_FACILITIES: usize = 1_024;

/// Spots in one facility layout.
pub const MAX_SPOTS_PER_FACILITY: usize = 100_000;

pub const MAX_NAME_LEN: usize = 256;

pub const MAX_LICENSE_PLATE_LEN: usize = 32;

/// Longest request line the protocol accepts (large layouts travel in one line).
pub const MAX_REQUEST_LINE_LEN: usize = 4 * 1024 * 1024;
