//! The shared-memory control block (`spec.md` §3): the single region mapped into both LIB
//! and SVC for one connection. Indexed entirely by ring-relative integer positions, never
//! by stored pointers (`spec.md` §9's "model them as `{region_base, offset, len}` views"),
//! so the same layout is valid regardless of where either process happens to map it.

pub mod backlog;
pub mod descriptor;
pub mod notice;
pub mod profiling;
pub mod window;

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::alfid::Alfid;
use crate::packet::{Subnets, MAX_PHY_INTERFACES};
use crate::state::State;
use backlog::BacklogRing;
use descriptor::BufferBlockDescriptor;
use notice::NoticeRing;
use profiling::ProfilingCounters;
use window::{RecvWindow, SendWindow};

/// Wire payload block size over native IPv6 transport (`spec.md` §3).
pub const MAX_BLOCK_SIZE_IPV6: usize = 1024;
/// Wire payload block size when tunneled in UDP/IPv4 (`spec.md` §3, §6).
pub const MAX_BLOCK_SIZE_UDP: usize = 512;

/// Current session state plus both sides' multi-homed address sets
/// (`spec.md` §3 "State cache").
pub struct StateCache {
	state: AtomicU8,
	pub near_subnets: UnsafeCell<Subnets>,
	pub peer_subnets: UnsafeCell<Subnets>,
	near_count: AtomicU8,
	peer_count: AtomicU8,
}

impl Default for StateCache {
	fn default() -> Self {
		Self {
			state: AtomicU8::new(State::NON_EXISTENT.0),
			near_subnets: UnsafeCell::new([0u64.into(); MAX_PHY_INTERFACES]),
			peer_subnets: UnsafeCell::new([0u64.into(); MAX_PHY_INTERFACES]),
			near_count: AtomicU8::new(0),
			peer_count: AtomicU8::new(0),
		}
	}
}

impl StateCache {
	#[must_use]
	pub fn state(&self) -> State {
		State(self.state.load(Ordering::Acquire))
	}

	pub fn set_state(&self, s: State) {
		self.state.store(s.0, Ordering::Release);
	}

	#[must_use]
	pub fn peer_subnet_count(&self) -> usize {
		self.peer_count.load(Ordering::Acquire) as usize
	}

	pub fn set_peer_subnet_count(&self, n: usize) {
		self.peer_count.store(n.min(MAX_PHY_INTERFACES) as u8, Ordering::Release);
	}

	#[must_use]
	pub fn near_subnet_count(&self) -> usize {
		self.near_count.load(Ordering::Acquire) as usize
	}

	pub fn set_near_subnet_count(&self, n: usize) {
		self.near_count.store(n.min(MAX_PHY_INTERFACES) as u8, Ordering::Release);
	}
}

// SAFETY: `near_subnets`/`peer_subnets` are only mutated by the mobility module while
// holding the socket's higher-level per-socket lock (`spec.md` §9); the counts gate
// visibility of their contents.
unsafe impl Sync for StateCache {}

/// Connect-time bootstrap parameters (`spec.md` §3 "Connect parameters"): retained for the
/// lifetime of the connection since a `RESET` or cookie-replay check may need to recompute
/// against them well after the handshake completes.
#[derive(Default)]
pub struct ConnectParams {
	pub init_check_code: AtomicU32,
	pub salt: AtomicU32,
	pub cookie: UnsafeCell<u64>,
	pub initiator_nonce: AtomicU32,
	pub responder_nonce: AtomicU32,
	pub initial_sn: AtomicU32,
	/// Index into the service's key-material table for the session's negotiated ICC
	/// context; the control block carries the slot, never the key itself.
	pub key_slot: AtomicU32,
}

// SAFETY: `cookie` is written once during the handshake, before the control block is ever
// shared past the handshake-owning thread, and read-only afterwards.
unsafe impl Sync for ConnectParams {}

impl ConnectParams {
	#[must_use]
	pub fn cookie(&self) -> u64 {
		unsafe { *self.cookie.get() }
	}

	pub fn set_cookie(&self, v: u64) {
		unsafe { *self.cookie.get() = v };
	}
}

/// One contiguous, power-of-two-capacity ring of payload blocks, indexed modulo its
/// capacity (`spec.md` §9). `N` is the ring capacity in blocks, `BLOCK` the octet size of
/// each block (`MAX_BLOCK_SIZE_IPV6` or `MAX_BLOCK_SIZE_UDP`).
pub struct BlockRing<const N: usize, const BLOCK: usize> {
	descriptors: [BufferBlockDescriptor; N],
	blocks: [UnsafeCell<[u8; BLOCK]>; N],
}

// SAFETY: concurrent access to a given slot's bytes is gated by that slot's descriptor
// `EXCLUSIVE_LOCK` bit; see `BufferBlockDescriptor::try_lock`.
unsafe impl<const N: usize, const BLOCK: usize> Sync for BlockRing<N, BLOCK> {}

impl<const N: usize, const BLOCK: usize> Default for BlockRing<N, BLOCK> {
	fn default() -> Self {
		assert!(N.is_power_of_two(), "ring capacity must be a power of two");
		Self {
			descriptors: core::array::from_fn(|_| BufferBlockDescriptor::default()),
			blocks: core::array::from_fn(|_| UnsafeCell::new([0u8; BLOCK])),
		}
	}
}

impl<const N: usize, const BLOCK: usize> BlockRing<N, BLOCK> {
	#[must_use]
	pub const fn capacity(&self) -> usize {
		N
	}

	#[must_use]
	pub fn descriptor(&self, pos: u32) -> &BufferBlockDescriptor {
		&self.descriptors[pos as usize & (N - 1)]
	}

	/// Gives mutable access to a slot's bytes. Callers must hold the slot's
	/// `EXCLUSIVE_LOCK` (or otherwise be the slot's sole writer per `spec.md` §5's
	/// ownership invariant) before calling this.
	#[must_use]
	pub fn block_mut(&self, pos: u32) -> &mut [u8; BLOCK] {
		// SAFETY: caller contract above.
		unsafe { &mut *self.blocks[pos as usize & (N - 1)].get() }
	}

	#[must_use]
	pub fn block(&self, pos: u32) -> &[u8; BLOCK] {
		// SAFETY: shared read; the descriptor's flags are the real synchronization point
		// and are accessed through their own atomics.
		unsafe { &*self.blocks[pos as usize & (N - 1)].get() }
	}
}

/// The full per-connection shared-memory control block (`spec.md` §3). One `ControlBlock`
/// is created per `Socket item` and mapped into both LIB and SVC.
pub struct ControlBlock<const N: usize, const BLOCK: usize> {
	pub state: StateCache,
	pub connect: ConnectParams,
	pub notices: NoticeRing,
	pub backlog: BacklogRing,
	pub send_window: SendWindow,
	pub recv_window: RecvWindow,
	pub send: BlockRing<N, BLOCK>,
	pub recv: BlockRing<N, BLOCK>,
	pub near_alfid: AtomicU32,
	pub peer_alfid: AtomicU32,
	pub profiling: ProfilingCounters,
}

impl<const N: usize, const BLOCK: usize> Default for ControlBlock<N, BLOCK> {
	fn default() -> Self {
		Self {
			state: StateCache::default(),
			connect: ConnectParams::default(),
			notices: NoticeRing::default(),
			backlog: BacklogRing::default(),
			send_window: SendWindow::default(),
			recv_window: RecvWindow::default(),
			send: BlockRing::default(),
			recv: BlockRing::default(),
			near_alfid: AtomicU32::new(0),
			peer_alfid: AtomicU32::new(0),
			profiling: ProfilingCounters::default(),
		}
	}
}

impl<const N: usize, const BLOCK: usize> ControlBlock<N, BLOCK> {
	#[must_use]
	pub fn near_alfid(&self) -> Alfid {
		Alfid(self.near_alfid.load(Ordering::Acquire))
	}

	#[must_use]
	pub fn peer_alfid(&self) -> Alfid {
		Alfid(self.peer_alfid.load(Ordering::Acquire))
	}

	pub fn set_alfids(&self, near: Alfid, peer: Alfid) {
		self.near_alfid.store(near.0, Ordering::Release);
		self.peer_alfid.store(peer.0, Ordering::Release);
	}
}

/// The ring capacity and block size used for the default IPv6 transport
/// (`spec.md` §2 implementation budget assumes mid-size windows; 64 blocks matches the
/// `SLOW_START_WINDOW_SIZE` scale used by the reliability engine's pacing formula).
pub type ControlBlockIpv6 = ControlBlock<64, MAX_BLOCK_SIZE_IPV6>;
pub type ControlBlockUdp = ControlBlock<64, MAX_BLOCK_SIZE_UDP>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_state_is_non_existent() {
		let cb = ControlBlockIpv6::default();
		assert_eq!(cb.state.state(), State::NON_EXISTENT);
	}

	#[test]
	fn block_ring_indices_wrap_modulo_capacity() {
		let ring: BlockRing<64, 16> = BlockRing::default();
		ring.block_mut(0)[0] = 42;
		assert_eq!(ring.block(64)[0], 42);
	}
}
