use core::fmt;

use macros::Cast;

/// Session state, as tracked in the shared control block's state cache.
#[derive(Clone, Copy, PartialEq, Eq, Cast)]
#[repr(C)]
pub struct State(pub u8);

impl State {
	pub const NON_EXISTENT: Self = Self(0);
	/// Passive listener waiting to fork a new connection handle.
	pub const LISTENING: Self = Self(1);
	/// Initiative side, after sending the initiator's check code, before getting the
	/// responder's cookie. Timeout retries or falls back to `NON_EXISTENT`.
	pub const CONNECT_BOOTSTRAP: Self = Self(2);
	/// After getting the responder's cookie and sending the formal `CONNECT_REQUEST`,
	/// before getting `ACK_CONNECT_REQ`. Timeout retries or falls back to `NON_EXISTENT`.
	pub const CONNECT_AFFIRMING: Self = Self(3);
	/// After getting a legal `CONNECT_REQUEST` and sending back `ACK_CONNECT_REQ`, before
	/// getting `ACK_START` or the first `PERSIST`. Timeout falls back to `NON_EXISTENT`.
	pub const CHALLENGING: Self = Self(4);
	/// Local context cloned; connection multiplying.
	pub const CLONING: Self = Self(5);
	/// After getting a non-EoT `PERSIST`.
	pub const ESTABLISHED: Self = Self(6);
	/// A.K.A. FLUSHING; after sending the EoT flag, before all in-flight packets are
	/// acknowledged.
	pub const COMMITTING: Self = Self(7);
	/// Unilaterally adjourned: after getting `ACK_FLUSH`, i.e. both the EoT flag and all
	/// in-flight packets have been acknowledged.
	pub const COMMITTED: Self = Self(8);
	/// After getting the peer's EoT flag.
	pub const PEER_COMMIT: Self = Self(9);
	/// After getting the peer's EoT flag and the near end has sent its own EoT, before
	/// getting `ACK_FLUSH`.
	pub const COMMITTING2: Self = Self(10);
	/// After getting the peer's EoT flag in `COMMITTED`, or `ACK_FLUSH` in `COMMITTING2`.
	pub const CLOSABLE: Self = Self(11);
	/// Passive close of connection.
	pub const SHUT_REQUESTED: Self = Self(12);
	/// Asymmetrically shut down.
	pub const PRE_CLOSED: Self = Self(13);
	/// A physical, resumable/reusable state, not a pseudo-state.
	pub const CLOSED: Self = Self(14);

	pub const LARGEST: Self = Self::CLOSED;

	#[must_use]
	pub const fn name(self) -> &'static str {
		match self.0 {
			0 => "NON_EXISTENT",
			1 => "LISTENING",
			2 => "CONNECT_BOOTSTRAP",
			3 => "CONNECT_AFFIRMING",
			4 => "CHALLENGING",
			5 => "CLONING",
			6 => "ESTABLISHED",
			7 => "COMMITTING",
			8 => "COMMITTED",
			9 => "PEER_COMMIT",
			10 => "COMMITTING2",
			11 => "CLOSABLE",
			12 => "SHUT_REQUESTED",
			13 => "PRE_CLOSED",
			14 => "CLOSED",
			_ => "UNKNOWN",
		}
	}

	/// States in which a transmit transaction may still be in flight, i.e. the near end has
	/// not yet seen its own EoT fully acknowledged.
	#[must_use]
	pub const fn is_transmitting(self) -> bool {
		matches!(self.0, 6 | 7 | 9 | 10)
	}

	/// Transient states that are bound by `TRANSIENT_STATE_TIMEOUT_ms` and fall back to
	/// `NON_EXISTENT` on timeout.
	#[must_use]
	pub const fn is_transient(self) -> bool {
		matches!(self.0, 2 | 3 | 4)
	}

	#[must_use]
	pub const fn is_closable(self) -> bool {
		matches!(self.0, 11 | 12 | 13 | 14)
	}
}

impl fmt::Debug for State {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}
