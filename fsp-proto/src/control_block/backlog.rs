//! The backlog ring (`spec.md` §3): pending remote connect/multiply requests queued on a
//! listening or multiplication-capable socket, each carrying the cookie and initial
//! sequence number the eventual `Accept1` needs to admit the child connection.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;

use crate::alfid::Alfid;
use crate::control_block::notice::ByteMutex;

const CAPACITY: usize = 8;

#[derive(Clone, Copy)]
pub struct BacklogEntry {
	pub peer_alfid: Alfid,
	pub salt: u32,
	pub cookie: u64,
	pub initial_sn: u32,
	/// Set when this backlog entry originated from a `MULTIPLY` rather than a
	/// `CONNECT_REQUEST`, so `Accept1` knows which parent socket to derive state from.
	pub is_multiply: bool,
}

/// Guarded entirely by `mutex` rather than per-field atomics: unlike the notice ring's
/// single `u8`, a backlog slot is several fields wide and is only ever touched by the
/// `Accept1`/backlog-push path, not the hot send/receive path, so coarse locking is the
/// simpler and sufficient choice (`spec.md` §5: "both sides hold the mutex only briefly").
pub struct BacklogRing {
	mutex: ByteMutex,
	head: UnsafeCell<u8>,
	tail: UnsafeCell<u8>,
	entries: [UnsafeCell<MaybeUninit<BacklogEntry>>; CAPACITY],
}

// SAFETY: all access to `head`/`tail`/`entries` is serialized by `mutex`.
unsafe impl Sync for BacklogRing {}

impl Default for BacklogRing {
	fn default() -> Self {
		Self {
			mutex: ByteMutex::default(),
			head: UnsafeCell::new(0),
			tail: UnsafeCell::new(0),
			entries: core::array::from_fn(|_| UnsafeCell::new(MaybeUninit::uninit())),
		}
	}
}

impl BacklogRing {
	/// Returns `false` if the backlog is saturated (`ENOENT`, `spec.md` §6).
	#[must_use]
	pub fn push(&self, entry: BacklogEntry) -> bool {
		let _guard = self.mutex.lock();

		// SAFETY: serialized by `mutex`.
		unsafe {
			let head = *self.head.get();
			let tail = *self.tail.get();
			let next = (head + 1) % CAPACITY as u8;

			if next == tail {
				return false;
			}

			(*self.entries[head as usize].get()).write(entry);
			*self.head.get() = next;
		}

		true
	}

	#[must_use]
	pub fn pop(&self) -> Option<BacklogEntry> {
		let _guard = self.mutex.lock();

		// SAFETY: serialized by `mutex`.
		unsafe {
			let head = *self.head.get();
			let tail = *self.tail.get();

			if head == tail {
				return None;
			}

			let entry = (*self.entries[tail as usize].get()).assume_init();
			*self.tail.get() = (tail + 1) % CAPACITY as u8;
			Some(entry)
		}
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		let _guard = self.mutex.lock();
		// SAFETY: serialized by `mutex`.
		unsafe { *self.head.get() == *self.tail.get() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry(sn: u32) -> BacklogEntry {
		BacklogEntry { peer_alfid: Alfid(1), salt: 0, cookie: 0, initial_sn: sn, is_multiply: false }
	}

	#[test]
	fn fifo_and_emptiness() {
		let ring = BacklogRing::default();
		assert!(ring.is_empty());

		ring.push(entry(1));
		ring.push(entry(2));
		assert!(!ring.is_empty());

		assert_eq!(ring.pop().unwrap().initial_sn, 1);
		assert_eq!(ring.pop().unwrap().initial_sn, 2);
		assert!(ring.is_empty());
	}

	#[test]
	fn push_fails_when_saturated() {
		let ring = BacklogRing::default();
		let mut ok = true;
		for i in 0..CAPACITY as u32 + 1 {
			ok &= ring.push(entry(i));
		}
		assert!(!ok);
	}
}
