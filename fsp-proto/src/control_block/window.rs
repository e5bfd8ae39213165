//! Send/receive window descriptors (`spec.md` §3). Ring positions and sequence numbers are
//! plain per-field atomics rather than guarded by the control block's mutex: `spec.md` §5
//! assigns each field to exactly one writer (LIB advances `send_buffer_*`/`recv_window_head`/
//! `recv_window_first_sn`; SVC advances everything else), so the only thing atomics buy here
//! is a well-defined, UB-free read from the other process — not mutual exclusion.

use core::sync::atomic::{AtomicU32, Ordering};

#[derive(Default)]
pub struct SendWindow {
	pub first_sn: AtomicU32,
	pub next_sn: AtomicU32,
	pub buffer_next_sn: AtomicU32,
	pub head_pos: AtomicU32,
	pub next_pos: AtomicU32,
	pub buffer_next_pos: AtomicU32,
}

#[derive(Default)]
pub struct RecvWindow {
	pub first_sn: AtomicU32,
	pub next_sn: AtomicU32,
	pub expected_sn: AtomicU32,
	pub head_pos: AtomicU32,
	pub next_pos: AtomicU32,
}

/// Thin load/store helpers shared by both window kinds, at `Acquire`/`Release` since these
/// fields are the cross-process synchronization points the rest of the engine hangs off of.
pub trait WindowField {
	fn get(field: &AtomicU32) -> u32 {
		field.load(Ordering::Acquire)
	}

	fn set(field: &AtomicU32, v: u32) {
		field.store(v, Ordering::Release);
	}
}

impl WindowField for SendWindow {}
impl WindowField for RecvWindow {}

impl SendWindow {
	/// `spec.md` §3: "A packet is acknowledgeable only if its SN lies in
	/// `[sendWindowFirstSN, sendWindowNextSN)`."
	#[must_use]
	pub fn is_acknowledgeable(&self, sn: u32) -> bool {
		let first = self.first_sn.load(Ordering::Acquire);
		let next = self.next_sn.load(Ordering::Acquire);
		sn.wrapping_sub(first) < next.wrapping_sub(first)
	}

	/// `spec.md` §8: invariant `sendWindowFirstSN ≤ sendWindowNextSN ≤ sendBufferNextSN`.
	#[must_use]
	pub fn invariant_holds(&self) -> bool {
		let first = self.first_sn.load(Ordering::Acquire);
		let next = self.next_sn.load(Ordering::Acquire);
		let buf_next = self.buffer_next_sn.load(Ordering::Acquire);
		next.wrapping_sub(first) <= buf_next.wrapping_sub(first)
	}
}

impl RecvWindow {
	/// `spec.md` §3: "A received packet at SN *s* is accepted only if
	/// `recvWindowFirstSN ≤ s < recvWindowFirstSN + recvBufferBlockN`."
	#[must_use]
	pub fn accepts(&self, sn: u32, capacity: u32) -> bool {
		let first = self.first_sn.load(Ordering::Acquire);
		sn.wrapping_sub(first) < capacity
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn acknowledgeable_range_is_half_open() {
		let w = SendWindow::default();
		w.first_sn.store(10, Ordering::Relaxed);
		w.next_sn.store(15, Ordering::Relaxed);

		assert!(!w.is_acknowledgeable(9));
		assert!(w.is_acknowledgeable(10));
		assert!(w.is_acknowledgeable(14));
		assert!(!w.is_acknowledgeable(15));
	}

	#[test]
	fn recv_window_accepts_within_capacity() {
		let w = RecvWindow::default();
		w.first_sn.store(100, Ordering::Relaxed);
		assert!(!w.accepts(99, 8));
		assert!(w.accepts(100, 8));
		assert!(w.accepts(107, 8));
		assert!(!w.accepts(108, 8));
	}
}
