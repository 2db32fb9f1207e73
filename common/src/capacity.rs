//! Volume size rules shared by every back-end: sizes are multiples of the
//! 512-byte block, requests too small for one block get a 1 MiB floor, and
//! 1 TiB is the hard ceiling.

use thiserror::Error;

pub const BLOCK_SIZE: i64 = 512;
pub const MIN_VOLUME_SIZE: i64 = 1 << 20;
pub const MAX_VOLUME_SIZE: i64 = 1 << 40;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CapacityError {
    #[error("Requested capacity {0} is at or above the 1 TiB maximum")]
    OutOfRange(i64),
}

/// Round a requested byte count to the size actually allocated.
pub fn round_volume_size(required: i64) -> Result<i64, CapacityError> {
    if required >= MAX_VOLUME_SIZE {
        return Err(CapacityError::OutOfRange(required));
    }
    if required < BLOCK_SIZE {
        return Ok(MIN_VOLUME_SIZE);
    }
    Ok((required + BLOCK_SIZE - 1) / BLOCK_SIZE * BLOCK_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_block_multiples() {
        assert_eq!(round_volume_size(0).unwrap(), MIN_VOLUME_SIZE);
        assert_eq!(round_volume_size(1).unwrap(), MIN_VOLUME_SIZE);
        assert_eq!(round_volume_size(512).unwrap(), 512);
        assert_eq!(round_volume_size(513).unwrap(), 1024);
        assert_eq!(round_volume_size(4 << 20).unwrap(), 4 << 20);
    }

    #[test]
    fn one_tib_is_out_of_range() {
        assert_eq!(
            round_volume_size(MAX_VOLUME_SIZE),
            Err(CapacityError::OutOfRange(MAX_VOLUME_SIZE))
        );
        assert!(round_volume_size(MAX_VOLUME_SIZE + 1).is_err());
    }
}
