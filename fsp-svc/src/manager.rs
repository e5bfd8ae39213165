//! The socket manager: the ALFID-keyed table of live `SocketItem`s, plus the listener
//! backlog that new `CONNECT_REQUEST`s land in (`spec.md` §3 "Lifecycle", §4.3 "LISTENING").
//!
//! Grounded on `examples/dspeyrer-net/net/src/udp/mod.rs`'s `udp::Interface { map: Map<..> }`
//! pattern: a fixed-capacity `collections::map::Map` keyed by the thing peers address the
//! socket by, with ephemeral-id allocation for the side that doesn't pick its own id.

use collections::map::{self, Map};
use rand::Rng;

use fsp_proto::alfid::{Alfid, AlfidPair};
use fsp_proto::config::Config;
use fsp_proto::error::Error as ProtoError;

use crate::socket::SocketItem;

/// Capacity of the socket table: must be a power of two (`collections::map::Map`'s
/// backing `Index<N>` is only implemented for powers of two).
pub const CAPACITY: usize = 4096;

#[derive(Default)]
pub struct Listener {
	pub alfid: Alfid,
}

/// Owns every `SocketItem` live in this SVC process, keyed by near-end ALFID.
pub struct SocketManager {
	sockets: Map<SocketItem, CAPACITY>,
	listeners: Vec<Listener>,
	/// Lowest ALFID `allocate_alfid` may hand out, taken from `Config::first_ephemeral_alfid`
	/// so tests can pin ephemeral allocation into a small, deterministic range
	/// (`SPEC_FULL.md` §2 "Configuration").
	first_ephemeral: Alfid,
}

impl Default for SocketManager {
	fn default() -> Self {
		Self::with_config(&Config::default())
	}
}

impl SocketManager {
	#[must_use]
	pub fn with_config(config: &Config) -> Self {
		Self {
			sockets: Map::default(),
			listeners: Vec::new(),
			first_ephemeral: config.first_ephemeral_alfid,
		}
	}

	/// Allocates a fresh, non-well-known ALFID not already in use
	/// (`spec.md` glossary: "ALFID ... 32-bit local endpoint identifier").
	pub fn allocate_alfid(&mut self) -> Alfid {
		let mut rng = rand::thread_rng();

		loop {
			let candidate = Alfid(rng.gen_range(self.first_ephemeral.0..=u32::MAX));

			if self.sockets.find(&candidate.0).is_none() {
				return candidate;
			}
		}
	}

	pub fn insert(&mut self, item: SocketItem) -> Result<(), ProtoError> {
		match self.sockets.find_entry(&item.alfids.source.0) {
			map::Entry::Empty(entry) => {
				entry.insert(item);
				Ok(())
			}
			map::Entry::Filled(_) => Err(ProtoError::Exist),
		}
	}

	#[must_use]
	pub fn get(&self, alfid: Alfid) -> Option<&SocketItem> {
		self.sockets.find(&alfid.0)
	}

	pub fn get_mut(&mut self, alfid: Alfid) -> Option<&mut SocketItem> {
		match self.sockets.find_entry(&alfid.0) {
			map::Entry::Filled(mut f) => Some(&mut *f),
			map::Entry::Empty(_) => None,
		}
	}

	/// Removes a socket once it has reached `CLOSED` (or been reset) and its linger window
	/// has elapsed (`spec.md` §5 "Cancellation").
	pub fn remove(&mut self, alfid: Alfid) -> Option<SocketItem> {
		match self.sockets.find_entry(&alfid.0) {
			map::Entry::Filled(f) => Some(f.remove()),
			map::Entry::Empty(_) => None,
		}
	}

	pub fn register_listener(&mut self, alfid: Alfid) {
		self.listeners.push(Listener { alfid });
	}

	#[must_use]
	pub fn is_listening(&self, alfid: Alfid) -> bool {
		self.listeners.iter().any(|l| l.alfid == alfid)
	}

	/// Derives a child socket's ALFID pair for a `MULTIPLY` (`spec.md` §4.3 "Connection
	/// multiplication"): a fresh local ALFID paired against the same peer process, peer
	/// ALFID supplied by the `MULTIPLY` packet itself.
	#[must_use]
	pub fn derive_child_alfids(&mut self, peer: Alfid) -> AlfidPair {
		AlfidPair { source: self.allocate_alfid(), peer }
	}
}

#[cfg(test)]
mod tests {
	use core::time::Duration;

	use fsp_icc::aead::Key;
	use fsp_icc::{IccContext, SessionIcc};
	use fsp_ipc::SharedRegion;
	use fsp_proto::control_block::ControlBlockIpv6;

	use super::*;

	fn sample_item(near: u32) -> SocketItem {
		let shm_name = format!("fsp-svc-test-manager-{}-{}", std::process::id(), near);
		let cb = SharedRegion::<ControlBlockIpv6>::create(&shm_name).expect("create cb");
		let ctx = IccContext::new(Key::from([7u8; 32]), 0, 0, u64::MAX);
		let icc = SessionIcc::new(ctx, 0);
		SocketItem::new(AlfidPair { source: Alfid(near), peer: Alfid(near + 1) }, cb, icc, Duration::from_millis(100))
	}

	#[test]
	fn insert_then_find_round_trips() {
		let mut mgr = SocketManager::default();
		mgr.insert(sample_item(100)).unwrap();
		assert!(mgr.get(Alfid(100)).is_some());
		assert!(mgr.get(Alfid(101)).is_none());
	}

	#[test]
	fn duplicate_insert_is_rejected() {
		let mut mgr = SocketManager::default();
		mgr.insert(sample_item(200)).unwrap();
		assert!(mgr.insert(sample_item(200)).is_err());
	}

	#[test]
	fn allocated_alfids_never_collide_with_live_sockets() {
		let mut mgr = SocketManager::default();
		mgr.insert(sample_item(300)).unwrap();
		let fresh = mgr.allocate_alfid();
		assert_ne!(fresh, Alfid(300));
	}

	#[test]
	fn remove_frees_the_slot_for_reuse() {
		let mut mgr = SocketManager::default();
		mgr.insert(sample_item(400)).unwrap();
		assert!(mgr.remove(Alfid(400)).is_some());
		assert!(mgr.get(Alfid(400)).is_none());
	}

	#[test]
	fn allocation_honors_configured_first_ephemeral_alfid() {
		let config = Config { first_ephemeral_alfid: Alfid(500), ..Config::default() };
		let mut mgr = SocketManager::with_config(&config);
		let fresh = mgr.allocate_alfid();
		assert!(fresh.0 >= 500);
	}
}
