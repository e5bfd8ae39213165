//! The per-connection ICC engine (`spec.md` §4.2, §9): dual-context key rotation mirroring
//! the teacher's `Tunnel { current, next }` rekey pattern, generalized from WireGuard's
//! time-and-counter rekey policy to FSP's key-life-remaining-octets policy, plus the
//! CRC-64 fallback path and scheduled master-key splice-in.

use fsp_proto::Alfid;
use utils::error::*;

use crate::aead::{self, Key};
use crate::kdf;

/// Packets after which the sending side must rotate to a freshly derived key
/// (`spec.md` §4.2, default value).
pub const FSP_REKEY_THRESHOLD: u32 = 0x2000_0000;

/// One directional key schedule slot: the AEAD key, the CRC-64 fallback seed derived from
/// the connection's identifiers, the session salt, and the remaining octet budget before
/// the CRC-64 fallback takes over (`spec.md` §4.2, §9 — the fallback's production-vs-interop
/// status is left unresolved per spec instruction, so it always activates at zero).
#[derive(Clone)]
pub struct IccContext {
	key: Key,
	crc_seed: u64,
	salt: u32,
	key_life_remaining: u64,
}

impl IccContext {
	#[must_use]
	pub fn new(key: Key, salt: u32, crc_seed: u64, key_life_octets: u64) -> Self {
		Self { key, crc_seed, salt, key_life_remaining: key_life_octets }
	}

	fn sign(&mut self, peer: Alfid, sn: u32, aad: &[u8], payload: &mut [u8], oob_salt: u32, no_encrypt: bool) -> u64 {
		if self.key_life_remaining == 0 {
			return crc_fallback(self.crc_seed, peer, sn);
		}

		self.key_life_remaining = self.key_life_remaining.saturating_sub(payload.len() as u64);
		let iv = aead::nonce(self.salt, oob_salt, peer, sn);
		aead::seal(&self.key, iv, aad, payload, no_encrypt)
	}

	fn verify(&self, peer: Alfid, sn: u32, aad: &[u8], payload: &mut [u8], oob_salt: u32, no_encrypt: bool, tag: u64) -> Result {
		if self.key_life_remaining == 0 {
			return (crc_fallback(self.crc_seed, peer, sn) == tag).then_some(()).ok_or_else(|| log::warn!("CRC-64 fallback mismatch"));
		}

		let iv = aead::nonce(self.salt, oob_salt, peer, sn);
		aead::open(&self.key, iv, aad, payload, tag, no_encrypt)
	}
}

/// CRC-64 over the packet identifiers, folded with the precomputed per-connection seed and
/// a sequence-derived salt (`spec.md` §4.2: "CRC-64 over (id pair XOR precomputed-CRC-for-
/// send XOR sequence-based salt)").
fn crc_fallback(seed: u64, peer: Alfid, sn: u32) -> u64 {
	let folded = seed ^ u64::from(u32::from(peer)) ^ u64::from(sn);
	fsp_proto::crc64::checksum(&folded.to_be_bytes())
}

/// The full bidirectional key schedule carried by a connection's ICC context (`spec.md`
/// §3's "ICC context" field group). `previous` is retained so in-flight packets locked
/// under the old key before a rekey remain verifiable/retransmittable; `next` is the
/// one-threshold-early preallocated context so the rotation itself never blocks on key
/// derivation (Open Question #2, resolved in `DESIGN.md`).
pub struct SessionIcc {
	current: IccContext,
	previous: Option<IccContext>,
	next: Option<IccContext>,
	sn_first_send_with_curr_key: u32,
	sn_first_recv_with_curr_key: u32,
	master_key: Option<[u8; 32]>,
	salt: u32,
	threshold: u32,
}

impl SessionIcc {
	#[must_use]
	pub fn new(initial: IccContext, salt: u32) -> Self {
		Self {
			current: initial,
			previous: None,
			next: None,
			sn_first_send_with_curr_key: 0,
			sn_first_recv_with_curr_key: 0,
			master_key: None,
			salt,
			threshold: FSP_REKEY_THRESHOLD,
		}
	}

	#[cfg(test)]
	fn set_threshold_for_test(&mut self, threshold: u32) {
		self.threshold = threshold;
	}

	/// Installs an externally-authenticated master key (`InstallMasterKey`, `spec.md`
	/// §4.2). The key itself doesn't replace `current` immediately — it becomes the
	/// source material the *next* rekey rotation derives from, so in-flight packets keep
	/// verifying under whatever key is already active.
	pub fn install_master_key(&mut self, key: [u8; 32]) {
		self.master_key = Some(key);
	}

	fn preallocate_next(&mut self, sn: u32) {
		if self.next.is_some() {
			return;
		}

		if sn + self.threshold < self.sn_first_send_with_curr_key + 2 * self.threshold {
			return;
		}

		let Some(master) = self.master_key else { return };
		let at_sn = self.sn_first_send_with_curr_key + self.threshold;
		let key = kdf::derive_rekeyed(&master, at_sn);
		self.next = Some(IccContext::new(key, self.salt, self.current.crc_seed, self.current.key_life_remaining));
	}

	fn rotate_if_due(&mut self, sn: u32) {
		if sn < self.sn_first_send_with_curr_key + self.threshold {
			return;
		}

		let Some(next) = self.next.take() else {
			log::warn!("rekey threshold reached with no preallocated context, reusing current key");
			return;
		};

		self.previous = Some(std::mem::replace(&mut self.current, next));
		self.sn_first_send_with_curr_key = sn;
		self.sn_first_recv_with_curr_key = sn;
	}

	/// Signs an outbound packet at sequence number `sn`, rotating keys first if this send
	/// crosses the rekey threshold.
	pub fn sign_outbound(&mut self, peer: Alfid, sn: u32, aad: &[u8], payload: &mut [u8], oob_salt: u32, no_encrypt: bool) -> u64 {
		self.preallocate_next(sn);
		self.rotate_if_due(sn);
		self.current.sign(peer, sn, aad, payload, oob_salt, no_encrypt)
	}

	/// Verifies an inbound packet at sequence number `sn`, retrying against the previous
	/// context when `sn` predates the current key's activation (`spec.md` §4.2). The same
	/// rekey-threshold check applies on the receive side as on the send side ("symmetric
	/// check applies before accepting an incoming packet").
	pub fn verify_inbound(&mut self, peer: Alfid, sn: u32, aad: &[u8], payload: &mut [u8], oob_salt: u32, no_encrypt: bool, tag: u64) -> Result {
		if sn < self.sn_first_recv_with_curr_key {
			let prev = self.previous.as_ref().ok_or_else(|| log::warn!("no previous ICC context to verify against"))?;
			return prev.verify(peer, sn, aad, payload, oob_salt, no_encrypt, tag);
		}

		self.preallocate_next(sn);
		self.rotate_if_due(sn);
		self.current.verify(peer, sn, aad, payload, oob_salt, no_encrypt, tag)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn session(key_life: u64) -> SessionIcc {
		let ctx = IccContext::new(Key::from([3u8; 32]), 0x1111_1111, 0, key_life);
		let mut s = SessionIcc::new(ctx, 0x1111_1111);
		s.install_master_key([9u8; 32]);
		s
	}

	#[test]
	fn sign_then_verify_round_trips() {
		let mut sender = session(u64::MAX);
		let mut receiver = session(u64::MAX);

		let aad = b"hdr";
		let mut buf = b"payload bytes".to_vec();
		let tag = sender.sign_outbound(Alfid(7), 1, aad, &mut buf, 0, false);

		receiver.verify_inbound(Alfid(7), 1, aad, &mut buf, 0, false, tag).unwrap();
		assert_eq!(&buf, b"payload bytes");
	}

	#[test]
	fn key_life_exhausted_falls_back_to_crc64() {
		let mut sender = session(0);
		let mut buf = b"x".to_vec();
		let tag = sender.sign_outbound(Alfid(1), 10, b"", &mut buf, 0, false);
		assert_eq!(buf, b"x");

		let expected = crc_fallback(crc_seed_for(&sender), Alfid(1), 10);
		assert_eq!(tag, expected);
	}

	fn crc_seed_for(s: &SessionIcc) -> u64 {
		s.current.crc_seed
	}

	#[test]
	fn rekey_rotates_at_threshold_and_old_sn_still_verifies_under_previous_key() {
		let mut sender = session(u64::MAX);
		let mut receiver = session(u64::MAX);
		sender.set_threshold_for_test(8);
		receiver.set_threshold_for_test(8);

		let mut tags = Vec::new();
		for sn in 0..16u32 {
			let mut buf = vec![0u8; 4];
			let tag = sender.sign_outbound(Alfid(5), sn, b"aad", &mut buf, 0, false);
			tags.push(tag);
		}

		for sn in 0..16u32 {
			let mut buf = vec![0u8; 4];
			receiver
				.verify_inbound(Alfid(5), sn, b"aad", &mut buf, 0, false, tags[sn as usize])
				.unwrap_or_else(|_| panic!("sn {sn} failed to verify"));
		}
	}
}
