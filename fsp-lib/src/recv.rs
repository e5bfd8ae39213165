//! Receive-side delivery (`spec.md` §4.5, §6): `RecvInline` / `TryRecvInline`, `ReadFrom`,
//! `HasReadEoT`.
//!
//! `spec.md` §5's ownership invariant: LIB advances `recvWindowHeadPos` / `recvWindowFirstSN`
//! once it has consumed a fulfilled descriptor; SVC owns everything else in the receive
//! window, including `recvWindowExpectedSN`.

use core::sync::atomic::Ordering;
use core::time::Duration;

use fsp_proto::control_block::descriptor::flag;
use fsp_proto::control_block::notice::ServiceCode;

use crate::session::Connection;
use fsp_proto::error::Error;

/// One fulfilled-but-undelivered descriptor exposed in place, symmetric to `send::SendBuffer`
/// (`spec.md` §4.5: "expose a contiguous run of fulfilled blocks via a peek callback; caller
/// releases them back by a marking call").
pub struct RecvBuffer<'a> {
	connection: &'a Connection,
	pos: u32,
	len: usize,
}

impl<'a> RecvBuffer<'a> {
	#[must_use]
	pub fn as_slice(&self) -> &[u8] {
		&self.connection.control_block().recv.block(self.pos)[..self.len]
	}

	#[must_use]
	pub fn transaction_ended(&self) -> bool {
		self.connection.control_block().recv.descriptor(self.pos).flag(flag::TO_BE_CONTINUED)
	}

	/// Releases the slot back to SVC once the caller has consumed it in place.
	pub fn release(self) {
		let cb = self.connection.control_block();
		let descriptor = cb.recv.descriptor(self.pos);
		descriptor.set_flag(flag::IS_DELIVERED);
		descriptor.reset();

		cb.recv_window.head_pos.fetch_add(1, Ordering::AcqRel);
		cb.recv_window.first_sn.fetch_add(1, Ordering::AcqRel);
	}
}

/// `TryRecvInline`: non-blocking peek at the next fulfilled-but-undelivered descriptor.
#[must_use]
pub fn try_recv_inline(connection: &Connection) -> Option<RecvBuffer<'_>> {
	let cb = connection.control_block();
	let pos = cb.recv_window.head_pos.load(Ordering::Acquire);
	let descriptor = cb.recv.descriptor(pos);

	if !descriptor.flag(flag::IS_FULFILLED) || descriptor.flag(flag::IS_DELIVERED) {
		return None;
	}

	let len = descriptor.len().max(0) as usize;
	Some(RecvBuffer { connection, pos, len })
}

/// `RecvInline`: blocks until a fulfilled descriptor is available.
pub fn recv_inline(connection: &mut Connection, timeout: Duration) -> Result<RecvBuffer<'_>, Error> {
	if try_recv_inline(connection).is_none() {
		connection.wait_for(ServiceCode::DataReady, timeout)?;
	}

	try_recv_inline(connection).ok_or(Error::Intr)
}

/// `ReadFrom`: streaming copy-out into a caller buffer, spanning as many descriptors as
/// needed to fill it or until a `TransactionEnded` marker is reached
/// (`spec.md` §4.5: "copy-out into caller buffer").
pub fn read_from(connection: &mut Connection, out: &mut [u8], timeout: Duration) -> Result<usize, Error> {
	let mut written = 0;

	while written < out.len() {
		let buf = recv_inline(connection, timeout)?;
		let chunk = buf.as_slice();
		let n = chunk.len().min(out.len() - written);
		out[written..written + n].copy_from_slice(&chunk[..n]);
		written += n;

		let ended = buf.transaction_ended();
		let fully_consumed = n == chunk.len();

		if fully_consumed {
			buf.release();
		}

		if ended && fully_consumed {
			break;
		}

		if !fully_consumed {
			break;
		}
	}

	Ok(written)
}

/// `HasReadEoT`: whether the most recently delivered descriptor ended a transmit transaction.
#[must_use]
pub fn has_read_eot(connection: &Connection) -> bool {
	let cb = connection.control_block();
	let pos = cb.recv_window.head_pos.load(Ordering::Acquire).wrapping_sub(1);
	cb.recv.descriptor(pos).flag(flag::TO_BE_CONTINUED)
}
