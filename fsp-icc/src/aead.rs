//! The per-packet AEAD construction (`spec.md` §4.2): AES-256-GCM with a 32-bit session
//! salt, a 96-bit IV and an 8-octet authentication tag (the wire `integrity` field).
//!
//! `aes-gcm` supports shortened tags natively via its `TagSize` type parameter, so the
//! truncated-tag construction the protocol specifies is expressed directly rather than
//! hand-rolled: `AesGcm<Aes256, U12, U8>` is a real, standard GCM variant (RFC 5282-style
//! short tags), not an approximation.

use aes_gcm::aead::consts::{U12, U8};
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, AesGcm};
use fsp_proto::Alfid;
use utils::error::*;

/// AES-256-GCM with an 8-octet (64-bit) authentication tag, matching the 8-octet
/// `integrity` field carried by every normal FSP packet.
pub type Aead = AesGcm<aes_gcm::Aes256, U12, U8>;

pub type Key = aes_gcm::Key<Aes256Gcm>;

/// Builds the 96-bit IV for a packet at sequence number `sn` addressed to `peer`: the
/// leftmost 32 bits are the session salt XORed with an optional per-packet out-of-band
/// salt (used so out-of-band packets, which don't consume `sn` space, still get a unique
/// IV); the rightmost 64 bits are `peer ALFID ‖ SN`, big-endian.
#[must_use]
pub fn nonce(salt: u32, oob_salt: u32, peer: Alfid, sn: u32) -> aes_gcm::Nonce<U12> {
	let mut bytes = [0u8; 12];
	bytes[0..4].copy_from_slice(&(salt ^ oob_salt).to_be_bytes());
	bytes[4..8].copy_from_slice(&u32::from(peer).to_be_bytes());
	bytes[8..12].copy_from_slice(&sn.to_be_bytes());
	bytes.into()
}

/// Seals `payload` in place under `key`, returning the 8-octet tag to be written into the
/// packet's `integrity` field. When `no_encrypt` is set the payload is left in plaintext
/// and only the tag is produced, matching the spec's "authenticate only" send option.
pub fn seal(key: &Key, iv: aes_gcm::Nonce<U12>, aad: &[u8], payload: &mut [u8], no_encrypt: bool) -> u64 {
	let aead = Aead::new(key);

	let tag = if no_encrypt {
		let mut scratch = payload.to_vec();
		let tag = aead.encrypt_in_place_detached(&iv, aad, &mut scratch).expect("sealing cannot fail");
		tag
	} else {
		aead.encrypt_in_place_detached(&iv, aad, payload).expect("sealing cannot fail")
	};

	u64::from_be_bytes(tag.into())
}

/// Opens `payload` in place under `key`, verifying the 8-octet `tag`. On failure the
/// payload's contents are left untouched (the underlying crate only writes out the
/// keystream once the tag has already been checked).
pub fn open(key: &Key, iv: aes_gcm::Nonce<U12>, aad: &[u8], payload: &mut [u8], tag: u64, no_encrypt: bool) -> Result {
	let aead = Aead::new(key);
	let tag_bytes = aes_gcm::Tag::<U8>::from(tag.to_be_bytes());

	if no_encrypt {
		let mut scratch = payload.to_vec();
		aead.decrypt_in_place_detached(&iv, aad, &mut scratch, &tag_bytes)
			.map_err(|_| log::warn!("ICC verification failed"))
	} else {
		aead.decrypt_in_place_detached(&iv, aad, payload, &tag_bytes)
			.map_err(|_| log::warn!("ICC verification failed"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn key() -> Key {
		Key::from([7u8; 32])
	}

	#[test]
	fn seal_then_open_recovers_plaintext() {
		let k = key();
		let iv = nonce(0x1234_5678, 0, Alfid(42), 100);
		let aad = b"header bytes";
		let mut buf = b"hello fsp".to_vec();
		let tag = seal(&k, iv, aad, &mut buf, false);

		let iv = nonce(0x1234_5678, 0, Alfid(42), 100);
		open(&k, iv, aad, &mut buf, tag, false).unwrap();
		assert_eq!(&buf, b"hello fsp");
	}

	#[test]
	fn tampered_tag_is_rejected() {
		let k = key();
		let iv = nonce(0x1234_5678, 0, Alfid(42), 100);
		let mut buf = b"hello fsp".to_vec();
		let tag = seal(&k, iv, b"aad", &mut buf, false);

		let iv = nonce(0x1234_5678, 0, Alfid(42), 100);
		assert!(open(&k, iv, b"aad", &mut buf, tag ^ 1, false).is_err());
	}

	#[test]
	fn no_encrypt_leaves_payload_plaintext() {
		let k = key();
		let iv = nonce(1, 0, Alfid(1), 5);
		let mut buf = b"plain".to_vec();
		let before = buf.clone();
		let _tag = seal(&k, iv, b"aad", &mut buf, true);
		assert_eq!(buf, before);
	}
}
