//! Streaming compression (`spec.md` §4.6): an LZ4-style frame format with a 128 KiB segment
//! size, a 64 KiB sliding dictionary carried between segments, and a 4-octet little-endian
//! length prefix per compressed block. No header checksum — the outer ICC tag already
//! authenticates the ciphertext this sits inside.
//!
//! Grounded on `examples/original_source/src/FSP_DLL/Deflate.cpp` for the segment/dictionary
//! shape; `lz4_flex` supplies the actual block codec since nothing in the adopted stack
//! already wraps LZ4 and the source's own choice of algorithm is LZ4-family.

use lz4_flex::block::{compress_with_dict, decompress_with_dict, DecompressError};

pub const SEGMENT_SIZE: usize = 128 * 1024;
pub const DICT_SIZE: usize = 64 * 1024;
const LEN_PREFIX: usize = 4;

/// Per-connection compressor state, allocated lazily on first use of the COMPRESS send
/// option and released at end-of-transaction (`spec.md` §4.6).
#[derive(Default)]
pub struct Compressor {
	dict: Vec<u8>,
}

impl Compressor {
	/// Compresses one segment (up to `SEGMENT_SIZE` octets), using and then updating the
	/// sliding dictionary. Returns a frame: 4-octet LE length prefix followed by the
	/// compressed block.
	pub fn compress_segment(&mut self, segment: &[u8]) -> Vec<u8> {
		debug_assert!(segment.len() <= SEGMENT_SIZE);

		let block = compress_with_dict(segment, &self.dict);

		let mut frame = Vec::with_capacity(LEN_PREFIX + block.len());
		frame.extend_from_slice(&(block.len() as u32).to_le_bytes());
		frame.extend_from_slice(&block);

		self.slide_dict(segment);

		frame
	}

	fn slide_dict(&mut self, segment: &[u8]) {
		self.dict.extend_from_slice(segment);
		if self.dict.len() > DICT_SIZE {
			let drop = self.dict.len() - DICT_SIZE;
			self.dict.drain(..drop);
		}
	}

	/// Releases the dictionary state at end-of-transaction.
	pub fn reset(&mut self) {
		self.dict.clear();
	}
}

/// Per-connection decompressor state, symmetric to `Compressor`.
#[derive(Default)]
pub struct Decompressor {
	dict: Vec<u8>,
}

impl Decompressor {
	/// Consumes one length-prefixed frame from `input`, returning the decompressed segment
	/// and the number of input bytes consumed.
	pub fn decompress_frame(&mut self, input: &[u8]) -> Result<(Vec<u8>, usize), DecompressError> {
		if input.len() < LEN_PREFIX {
			return Err(DecompressError::UncompressedSizeDiffers { expected: LEN_PREFIX, actual: input.len() });
		}

		let len = u32::from_le_bytes(input[..LEN_PREFIX].try_into().unwrap()) as usize;
		let block = &input[LEN_PREFIX..LEN_PREFIX + len];

		let segment = decompress_with_dict(block, SEGMENT_SIZE, &self.dict)?;

		self.dict.extend_from_slice(&segment);
		if self.dict.len() > DICT_SIZE {
			let drop = self.dict.len() - DICT_SIZE;
			self.dict.drain(..drop);
		}

		Ok((segment, LEN_PREFIX + len))
	}

	pub fn reset(&mut self) {
		self.dict.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn compress_then_decompress_recovers_segment() {
		let mut compressor = Compressor::default();
		let mut decompressor = Decompressor::default();

		let segment = b"the quick brown fox jumps over the lazy dog".repeat(100);

		let frame = compressor.compress_segment(&segment);
		let (recovered, consumed) = decompressor.decompress_frame(&frame).unwrap();

		assert_eq!(consumed, frame.len());
		assert_eq!(recovered, segment);
	}

	#[test]
	fn dictionary_carries_across_segments() {
		let mut compressor = Compressor::default();
		let mut decompressor = Decompressor::default();

		let first = b"repeated-pattern-".repeat(1000);
		let second = b"repeated-pattern-".repeat(1000);

		let f1 = compressor.compress_segment(&first);
		let (r1, _) = decompressor.decompress_frame(&f1).unwrap();
		assert_eq!(r1, first);

		let f2 = compressor.compress_segment(&second);
		let (r2, _) = decompressor.decompress_frame(&f2).unwrap();
		assert_eq!(r2, second);
	}

	#[test]
	fn dictionary_is_capped_at_64_kib() {
		let mut compressor = Compressor::default();
		for _ in 0..10 {
			let segment = vec![0xABu8; SEGMENT_SIZE];
			compressor.compress_segment(&segment);
		}
		assert!(compressor.dict.len() <= DICT_SIZE);
	}
}
