use crc::{Crc, CRC_64_XZ};

/// CRC-64 used as the ICC engine's integrity fallback whenever a session's key-life has
/// been exhausted (`spec.md` §4.2). This is a well-tested off-the-shelf implementation, not
/// a hand-rolled polynomial — the protocol doesn't specify its own CRC variant, so the
/// widely deployed CRC-64/XZ parameterization is used.
static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

#[must_use]
pub fn checksum(data: &[u8]) -> u64 {
	CRC64.checksum(data)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn checksum_is_deterministic() {
		let a = checksum(b"hello fsp");
		let b = checksum(b"hello fsp");
		assert_eq!(a, b);
	}

	#[test]
	fn checksum_detects_single_bit_flips() {
		let a = checksum(b"hello fsp");
		let b = checksum(b"hello fsq");
		assert_ne!(a, b);
	}
}
