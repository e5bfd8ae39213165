//! A Socket item (`spec.md` §3): SVC's per-connection state, keyed by the near-end ALFID.
//! Combines the FSM, the ICC session, pacing/RTT state, mobility bookkeeping, and the
//! compression state with a handle onto the connection's shared-memory Control Block.

use core::time::Duration;
use std::net::SocketAddr;

use collections::map::Key;
use fsp_icc::SessionIcc;
use fsp_ipc::SharedRegion;
use fsp_proto::alfid::{Alfid, AlfidPair};
use fsp_proto::control_block::ControlBlockIpv6;

use crate::compress::{Compressor, Decompressor};
use crate::fsm::ConnState;
use crate::mobility::{LocalInterfaces, PeerSubnets};
use crate::pacing::{Pacer, RttEstimator};

/// Out-of-band packets carry their own monotonic serial, separate from the in-band send/recv
/// windows, to defeat replay without consuming window space (`spec.md` §4.3).
#[derive(Default)]
pub struct OobSequence {
	next_send: u32,
	last_recv: u32,
}

impl OobSequence {
	pub fn next_to_send(&mut self) -> u32 {
		let sn = self.next_send;
		self.next_send = self.next_send.wrapping_add(1);
		sn
	}

	/// Accepts an incoming out-of-band serial if it's newer than the last one seen
	/// (`spec.md` §8: "A KEEP_ALIVE whose out-of-band serial number is ≤ lastOOBSN is
	/// rejected").
	pub fn accept(&mut self, sn: u32) -> bool {
		if sn <= self.last_recv && self.last_recv != 0 {
			return false;
		}
		self.last_recv = sn;
		true
	}
}

/// One live (or being-torn-down) connection.
pub struct SocketItem {
	pub alfids: AlfidPair,
	pub parent: Option<Alfid>,
	pub state: ConnState,
	pub cb: SharedRegion<ControlBlockIpv6>,
	pub icc: SessionIcc,
	pub oob: OobSequence,
	pub pacer: Pacer,
	pub rtt: RttEstimator,
	pub local_interfaces: LocalInterfaces,
	pub peer_subnets: PeerSubnets,
	pub compressor: Option<Compressor>,
	pub decompressor: Option<Decompressor>,
	/// Whether the last transaction this socket originated ended committed, consulted by
	/// the `shouldAppendCommit` resolution on a multiplied child's first `PERSIST`
	/// (`spec.md` §9).
	pub last_send_committed: bool,
	/// The transport-layer address packets for this socket are sent to. `None` until the
	/// handshake (or mobility's path selection) has picked one; updated on migration by
	/// `PeerSubnets::note_source`'s caller whenever a packet arrives from a new favorite path.
	pub peer_addr: Option<SocketAddr>,
}

impl SocketItem {
	pub fn new(alfids: AlfidPair, cb: SharedRegion<ControlBlockIpv6>, icc: SessionIcc, initial_rtt: Duration) -> Self {
		Self {
			alfids,
			parent: None,
			state: ConnState::NonExistent,
			cb,
			icc,
			oob: OobSequence::default(),
			pacer: Pacer::new(fsp_proto::control_block::MAX_BLOCK_SIZE_IPV6, initial_rtt),
			rtt: RttEstimator::default(),
			local_interfaces: LocalInterfaces::default(),
			peer_subnets: PeerSubnets::default(),
			compressor: None,
			decompressor: None,
			last_send_committed: false,
			peer_addr: None,
		}
	}

	/// Lazily allocates compression state on first use of the COMPRESS option
	/// (`spec.md` §4.6).
	pub fn compressor_mut(&mut self) -> &mut Compressor {
		self.compressor.get_or_insert_with(Compressor::default)
	}

	pub fn decompressor_mut(&mut self) -> &mut Decompressor {
		self.decompressor.get_or_insert_with(Decompressor::default)
	}

	/// Releases compression state at end-of-transaction (`spec.md` §4.6).
	pub fn release_compression_state(&mut self) {
		self.compressor = None;
		self.decompressor = None;
	}
}

impl Key for SocketItem {
	type Type = u32;

	fn key(&self) -> &Self::Type {
		&self.alfids.source.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn oob_sequence_rejects_non_increasing_serials() {
		let mut oob = OobSequence::default();
		let first = oob.next_to_send();
		assert!(oob.accept(first + 1));
		assert!(!oob.accept(first + 1));
		assert!(!oob.accept(first));
	}
}
