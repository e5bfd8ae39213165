//! Key derivation for connection bootstrap (`spec.md` §4.2).
//!
//! Two distinct key sources feed the ICC engine: an ephemeral Curve25519 agreement run
//! during `INIT_CONNECT`/`ACK_INIT_CONNECT`/`CONNECT_REQUEST`, and an externally-supplied
//! master key (typically CHAKA-derived) installed later via `InstallMasterKey`. Both reduce
//! to the same hash-based expansion into a 32-octet AEAD key.

use blake2::digest::{FixedOutput, Update};
use blake2::Blake2s256;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::aead::Key;

/// A fresh ephemeral key pair, generated locally at the start of a connection attempt.
pub struct EphemeralKeypair {
	secret: StaticSecret,
	pub public: PublicKey,
}

impl EphemeralKeypair {
	#[must_use]
	pub fn generate() -> Self {
		let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
		let public = PublicKey::from(&secret);
		Self { secret, public }
	}

	/// Runs Curve25519 scalar multiplication against the peer's public key, then expands
	/// the shared secret together with both sides' connect-time nonces into the initial
	/// AEAD key.
	#[must_use]
	pub fn derive_session_key(&self, peer_public: &PublicKey, initiator_nonce: u64, responder_nonce: u64) -> Key {
		let shared = self.secret.diffie_hellman(peer_public);
		expand(shared.as_bytes(), initiator_nonce, responder_nonce)
	}
}

fn expand(secret: &[u8; 32], initiator_nonce: u64, responder_nonce: u64) -> Key {
	let mut hasher = Blake2s256::default();
	Update::update(&mut hasher, secret);
	Update::update(&mut hasher, &initiator_nonce.to_be_bytes());
	Update::update(&mut hasher, &responder_nonce.to_be_bytes());
	let digest = hasher.finalize_fixed();
	Key::from(<[u8; 32]>::from(digest))
}

/// Derives the AEAD key a rekey event rotates into: a one-way function of the connection's
/// master key material and the sequence number at which the rotation takes effect, so
/// every rekey boundary produces an unpredictable, non-reusable key.
#[must_use]
pub fn derive_rekeyed(master: &[u8; 32], at_sn: u32) -> Key {
	let mut hasher = Blake2s256::default();
	Update::update(&mut hasher, master);
	Update::update(&mut hasher, b"fsp-rekey");
	Update::update(&mut hasher, &at_sn.to_be_bytes());
	let digest = hasher.finalize_fixed();
	Key::from(<[u8; 32]>::from(digest))
}
