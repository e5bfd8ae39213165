//! Send-side buffer exposure (`spec.md` §4.4 "Buffer exposure", §6): `GetSendBuffer` /
//! `TryGetSendBuffer`, `SendInline`, `WriteTo`, `Commit`, `Flush`, and the `Multiply*`
//! variants that originate a child connection's first payload.
//!
//! `spec.md` §5's ownership invariant: only LIB ever advances `sendBufferNextPos` /
//! `sendBufferNextSN`; SVC owns everything else in the send window. This module therefore
//! only ever touches those two fields plus the descriptor it just filled.

use core::time::Duration;

use fsp_ipc::CommandOpcode;
use fsp_proto::control_block::descriptor::flag;
use fsp_proto::control_block::notice::ServiceCode;
use fsp_proto::control_block::MAX_BLOCK_SIZE_IPV6;
use fsp_proto::error::Error;

use crate::session::Connection;

/// A handle onto one reserved send slot, acquired in-place so the caller writes directly
/// into shared memory with no intermediate copy (`spec.md` §4.4: "in-place mode guarantees
/// zero-copy from app → wire").
pub struct SendBuffer<'a> {
	connection: &'a Connection,
	pos: u32,
	capacity: usize,
}

impl<'a> SendBuffer<'a> {
	#[must_use]
	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Direct mutable access to the reserved slot's bytes.
	#[must_use]
	pub fn as_mut_slice(&mut self) -> &mut [u8] {
		&mut self.connection.control_block().send.block_mut(self.pos)[..self.capacity]
	}

	/// Commits `len` octets written into the slot, optionally marking end-of-transaction.
	/// `spec.md` §4.4: "marking each slot IS_COMPLETED when its payload is fully buffered."
	pub fn commit(self, len: usize, transaction_ended: bool) -> Result<(), Error> {
		if len > self.capacity {
			return Err(Error::TooBig);
		}

		let cb = self.connection.control_block();
		let descriptor = cb.send.descriptor(self.pos);
		descriptor.set_len(len as i32);

		if transaction_ended {
			descriptor.set_flag(flag::TO_BE_CONTINUED);
		}

		descriptor.set_flag(flag::IS_COMPLETED);
		descriptor.unlock();

		cb.send_window.buffer_next_sn.fetch_add(1, core::sync::atomic::Ordering::AcqRel);
		cb.send_window.buffer_next_pos.fetch_add(1, core::sync::atomic::Ordering::AcqRel);

		Ok(())
	}
}

/// `GetSendBuffer`: reserves the next send slot, blocking until one is free
/// (`spec.md` §6, §5 "Suspension points").
pub fn get_send_buffer(connection: &mut Connection, timeout: Duration) -> Result<SendBuffer<'_>, Error> {
	loop {
		if let Some(buf) = try_get_send_buffer(connection)? {
			return Ok(buf);
		}

		connection.wait_for(ServiceCode::SendBufferReady, timeout)?;
	}
}

/// `TryGetSendBuffer`: non-blocking variant; returns `Ok(None)` if no slot is free right now.
pub fn try_get_send_buffer(connection: &mut Connection) -> Result<Option<SendBuffer<'_>>, Error> {
	let cb = connection.control_block();
	let pos = cb.send_window.buffer_next_pos.load(core::sync::atomic::Ordering::Acquire);
	let descriptor = cb.send.descriptor(pos);

	if !descriptor.try_lock() {
		return Ok(None);
	}

	Ok(Some(SendBuffer { connection: &*connection, pos, capacity: MAX_BLOCK_SIZE_IPV6 }))
}

/// `SendInline`: streaming send of a caller-owned buffer, split across as many send slots as
/// needed and copied in (`spec.md` §4.4 "streaming (caller-owned buffer is copied/optionally
/// compressed into send slots)").
pub fn send_inline(connection: &mut Connection, mut data: &[u8], transaction_ended: bool, timeout: Duration) -> Result<(), Error> {
	if data.is_empty() && !transaction_ended {
		return Ok(());
	}

	loop {
		let mut buf = get_send_buffer(connection, timeout)?;
		let n = data.len().min(buf.capacity());
		buf.as_mut_slice()[..n].copy_from_slice(&data[..n]);
		data = &data[n..];

		let ends_here = transaction_ended && data.is_empty();
		buf.commit(n, ends_here)?;

		if ends_here || data.is_empty() {
			break;
		}
	}

	Ok(())
}

/// `WriteTo`: copies out of a caller-supplied closure instead of a flat buffer, for callers
/// that assemble the payload incrementally.
pub fn write_to(connection: &mut Connection, len: usize, transaction_ended: bool, timeout: Duration, fill: impl FnOnce(&mut [u8])) -> Result<(), Error> {
	let mut buf = get_send_buffer(connection, timeout)?;
	if len > buf.capacity() {
		return Err(Error::TooBig);
	}
	fill(&mut buf.as_mut_slice()[..len]);
	buf.commit(len, transaction_ended)
}

/// `Commit`: ends the current transmit transaction without necessarily supplying more data
/// (`spec.md` §4.3 "Transaction commit"). Equivalent to `SendInline` with an empty buffer and
/// `transaction_ended = true`.
pub fn commit(connection: &mut Connection, timeout: Duration) -> Result<(), Error> {
	send_inline(connection, &[], true, timeout)
}

/// `Flush`: blocks until the just-committed transaction is fully acknowledged
/// (`spec.md` §4.3: "COMMITTING → COMMITTED on receipt of ACK_FLUSH").
pub fn flush(connection: &mut Connection, timeout: Duration) -> Result<(), Error> {
	connection.wait_for(ServiceCode::Flushed, timeout)
}

/// `MultiplyAndWrite`: originates a child connection carrying an initial payload, authenticated
/// under a key derived from the parent's context (`spec.md` §8 scenario 6).
pub fn multiply_and_write(parent: &mut Connection, payload: &[u8], transaction_ended: bool, timeout: Duration) -> Result<(), Error> {
	parent.command(CommandOpcode::MULTIPLY, "")?;
	send_inline(parent, payload, transaction_ended, timeout)
}

/// `MultiplyAndGetSendBuffer`: same origination, but exposes the in-place buffer instead of
/// copying a caller payload.
pub fn multiply_and_get_send_buffer(parent: &mut Connection, timeout: Duration) -> Result<SendBuffer<'_>, Error> {
	parent.command(CommandOpcode::MULTIPLY, "")?;
	get_send_buffer(parent, timeout)
}
