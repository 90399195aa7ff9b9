//! Binary byte-size units.

pub const KB: u64 = 1024;
pub const MB: u64 = 1024 * KB;
pub const GB: u64 = 1024 * MB;

/// Whole megabytes in `bytes`, truncating any remainder.
pub fn to_megabytes(bytes: u64) -> u64 {
    bytes / MB
}

/// Exact byte count of `megabytes`.
pub fn from_megabytes(megabytes: u64) -> u64 {
    megabytes * MB
}
