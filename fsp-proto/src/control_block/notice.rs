//! The notice ring (`spec.md` §3, §4.8): a fixed-capacity queue of service codes SVC
//! delivers to LIB, guarded by a one-octet test-and-set mutex. Both halves hold the mutex
//! only long enough to push/pop a code; the actual event-handle signalling and callback
//! dispatch happen outside the lock (`spec.md` §4.8, §9 "re-entrant callbacks... forbidden").

use core::sync::atomic::{AtomicU8, Ordering};

/// Service codes delivered SVC→LIB through the notice ring (`spec.md` §4.8).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ServiceCode {
	ListeningReady = 1,
	Accepting = 2,
	Accepted = 3,
	DataReady = 4,
	SendBufferReady = 5,
	PeerCommitted = 6,
	Flushed = 7,
	ToFinish = 8,
	Recycled = 9,
	MemoryCorruption = 10,
	Reset = 11,
	Timeout = 12,
	NameResolutionFailed = 13,
}

impl ServiceCode {
	#[must_use]
	pub const fn from_u8(v: u8) -> Option<Self> {
		Some(match v {
			1 => Self::ListeningReady,
			2 => Self::Accepting,
			3 => Self::Accepted,
			4 => Self::DataReady,
			5 => Self::SendBufferReady,
			6 => Self::PeerCommitted,
			7 => Self::Flushed,
			8 => Self::ToFinish,
			9 => Self::Recycled,
			10 => Self::MemoryCorruption,
			11 => Self::Reset,
			12 => Self::Timeout,
			13 => Self::NameResolutionFailed,
			_ => return None,
		})
	}
}

const CAPACITY: usize = 16;

/// A one-octet test-and-set spinlock, shared by the notice ring and the backlog ring
/// (`spec.md` §3: "a one-byte mutex").
#[derive(Default)]
pub struct ByteMutex(AtomicU8);

pub struct ByteGuard<'a>(&'a AtomicU8);

impl ByteMutex {
	/// Spins briefly; both sides are only ever supposed to hold this for the duration of a
	/// ring push/pop, never across a blocking operation (`spec.md` §4.8).
	pub fn lock(&self) -> ByteGuard<'_> {
		while self.0.compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed).is_err() {
			core::hint::spin_loop();
		}
		ByteGuard(&self.0)
	}
}

impl Drop for ByteGuard<'_> {
	fn drop(&mut self) {
		self.0.store(0, Ordering::Release);
	}
}

pub struct NoticeRing {
	mutex: ByteMutex,
	head: AtomicU8,
	tail: AtomicU8,
	codes: [AtomicU8; CAPACITY],
}

impl Default for NoticeRing {
	fn default() -> Self {
		Self {
			mutex: ByteMutex::default(),
			head: AtomicU8::new(0),
			tail: AtomicU8::new(0),
			codes: core::array::from_fn(|_| AtomicU8::new(0)),
		}
	}
}

impl NoticeRing {
	/// Pushes a code, dropping the oldest entry if the ring is full (a slow LIB consumer
	/// shouldn't be able to wedge SVC's event-posting path).
	pub fn push(&self, code: ServiceCode) {
		let _guard = self.mutex.lock();

		let head = self.head.load(Ordering::Relaxed) as usize;
		let tail = self.tail.load(Ordering::Relaxed) as usize;
		let next = (head + 1) % CAPACITY;

		if next == tail {
			self.tail.store(((tail + 1) % CAPACITY) as u8, Ordering::Relaxed);
		}

		self.codes[head].store(code as u8, Ordering::Relaxed);
		self.head.store(next as u8, Ordering::Release);
	}

	#[must_use]
	pub fn pop(&self) -> Option<ServiceCode> {
		let _guard = self.mutex.lock();

		let head = self.head.load(Ordering::Relaxed) as usize;
		let tail = self.tail.load(Ordering::Relaxed) as usize;

		if head == tail {
			return None;
		}

		let code = self.codes[tail].load(Ordering::Relaxed);
		self.tail.store(((tail + 1) % CAPACITY) as u8, Ordering::Release);

		ServiceCode::from_u8(code)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fifo_order_preserved() {
		let ring = NoticeRing::default();
		ring.push(ServiceCode::DataReady);
		ring.push(ServiceCode::Flushed);

		assert_eq!(ring.pop(), Some(ServiceCode::DataReady));
		assert_eq!(ring.pop(), Some(ServiceCode::Flushed));
		assert_eq!(ring.pop(), None);
	}

	#[test]
	fn full_ring_drops_oldest() {
		let ring = NoticeRing::default();
		for _ in 0..CAPACITY + 2 {
			ring.push(ServiceCode::Timeout);
		}
		assert!(ring.pop().is_some());
	}
}
