//! The buffer-block descriptor (`spec.md` §3): one per ring slot, mutated by atomic bit
//! updates on `flags` rather than under the control block's mutex, since both LIB and SVC
//! touch descriptors on the hot send/receive path (`spec.md` §5).

use core::sync::atomic::{AtomicI32, AtomicU16, AtomicU8, Ordering};

use crate::opcode::OpCode;

pub mod flag {
	pub const EXCLUSIVE_LOCK: u16 = 1 << 0;
	pub const IS_ACKNOWLEDGED: u16 = 1 << 1;
	/// Send side: the slot's payload has been fully buffered by LIB and is ready for SVC
	/// to put on the wire.
	pub const IS_COMPLETED: u16 = 1 << 2;
	/// Recv side: the slot has been filled in by SVC and is ready for LIB to deliver.
	/// Shares a bit position with `IS_COMPLETED` since the two meanings are mutually
	/// exclusive per ring (`spec.md` §3).
	pub const IS_FULFILLED: u16 = 1 << 2;
	pub const IS_DELIVERED: u16 = 1 << 3;
	pub const IS_COMPRESSED: u16 = 1 << 4;
	/// Aka `TransactionEnded` on the wire; reused here to mark end-of-transaction on both
	/// the send and receive side's descriptor ring.
	pub const TO_BE_CONTINUED: u16 = 1 << 5;
}

/// `{len, flags, version, opCode}`, `spec.md` §3. `len` and `op_code` are written once
/// while the slot is held under `EXCLUSIVE_LOCK` and read afterwards without additional
/// synchronization, so `Relaxed` ordering on them is sufficient once the lock's
/// acquire/release pair has established happens-before; `flags` itself always uses
/// `AcqRel` since it is the synchronization point.
#[repr(C)]
pub struct BufferBlockDescriptor {
	len: AtomicI32,
	flags: AtomicU16,
	version: AtomicU8,
	op_code: AtomicU8,
}

impl Default for BufferBlockDescriptor {
	fn default() -> Self {
		Self {
			len: AtomicI32::new(0),
			flags: AtomicU16::new(0),
			version: AtomicU8::new(0),
			op_code: AtomicU8::new(0),
		}
	}
}

impl BufferBlockDescriptor {
	#[must_use]
	pub fn len(&self) -> i32 {
		self.len.load(Ordering::Acquire)
	}

	pub fn set_len(&self, len: i32) {
		self.len.store(len, Ordering::Release);
	}

	#[must_use]
	pub fn op_code(&self) -> OpCode {
		OpCode(self.op_code.load(Ordering::Acquire))
	}

	pub fn set_op_code(&self, op: OpCode) {
		self.op_code.store(op.0, Ordering::Release);
	}

	#[must_use]
	pub fn version(&self) -> u8 {
		self.version.load(Ordering::Acquire)
	}

	pub fn set_version(&self, v: u8) {
		self.version.store(v, Ordering::Release);
	}

	#[must_use]
	pub fn flag(&self, bit: u16) -> bool {
		self.flags.load(Ordering::Acquire) & bit != 0
	}

	pub fn set_flag(&self, bit: u16) {
		self.flags.fetch_or(bit, Ordering::AcqRel);
	}

	pub fn clear_flag(&self, bit: u16) {
		self.flags.fetch_and(!bit, Ordering::AcqRel);
	}

	/// Attempts to take `EXCLUSIVE_LOCK`, returning whether it was acquired.
	#[must_use]
	pub fn try_lock(&self) -> bool {
		self.flags.fetch_or(flag::EXCLUSIVE_LOCK, Ordering::Acquire) & flag::EXCLUSIVE_LOCK == 0
	}

	pub fn unlock(&self) {
		self.clear_flag(flag::EXCLUSIVE_LOCK);
	}

	/// Resets a descriptor back to its unused state, for reuse after the ring wraps.
	pub fn reset(&self) {
		self.len.store(0, Ordering::Relaxed);
		self.flags.store(0, Ordering::Release);
		self.version.store(0, Ordering::Relaxed);
		self.op_code.store(0, Ordering::Relaxed);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn flag_bits_are_independent() {
		let d = BufferBlockDescriptor::default();
		d.set_flag(flag::IS_ACKNOWLEDGED);
		d.set_flag(flag::IS_DELIVERED);
		assert!(d.flag(flag::IS_ACKNOWLEDGED));
		assert!(d.flag(flag::IS_DELIVERED));
		assert!(!d.flag(flag::TO_BE_CONTINUED));

		d.clear_flag(flag::IS_ACKNOWLEDGED);
		assert!(!d.flag(flag::IS_ACKNOWLEDGED));
		assert!(d.flag(flag::IS_DELIVERED));
	}

	#[test]
	fn exclusive_lock_is_mutually_exclusive() {
		let d = BufferBlockDescriptor::default();
		assert!(d.try_lock());
		assert!(!d.try_lock());
		d.unlock();
		assert!(d.try_lock());
	}
}
