//! The ICC (Integrity/Confidentiality) engine (`spec.md` §4.2): per-packet AES-GCM signing
//! and verification with a CRC-64 fallback, dual-context key rotation at
//! `FSP_REKEY_THRESHOLD`, ephemeral Curve25519 key agreement for connection bootstrap, and
//! scheduled master-key installation.

pub mod aead;
mod context;
pub mod kdf;

pub use context::{IccContext, SessionIcc, FSP_REKEY_THRESHOLD};
pub use kdf::EphemeralKeypair;

use fsp_proto::crc64;

/// Derives the CRC-64 fallback seed for a connection from its identifying check code, per
/// `spec.md` §4.2's "precomputed CRC-for-send" field. Computed once at connection setup and
/// carried unchanged for the connection's lifetime.
#[must_use]
pub fn crc_seed(init_check_code: u64, near_alfid: u32, peer_alfid: u32) -> u64 {
	let mut buf = [0u8; 16];
	buf[0..8].copy_from_slice(&init_check_code.to_be_bytes());
	buf[8..12].copy_from_slice(&near_alfid.to_be_bytes());
	buf[12..16].copy_from_slice(&peer_alfid.to_be_bytes());
	crc64::checksum(&buf)
}
