use core::fmt;

use macros::Cast;

/// Wire operation code, the first octet of every FSP packet's fixed header.
#[derive(Clone, Copy, PartialEq, Eq, Cast)]
#[repr(C)]
pub struct OpCode(pub u8);

impl OpCode {
	pub const INIT_CONNECT: Self = Self(1);
	pub const ACK_INIT_CONNECT: Self = Self(2);
	pub const CONNECT_REQUEST: Self = Self(3);
	/// May piggyback payload.
	pub const ACK_CONNECT_REQ: Self = Self(4);
	pub const RESET: Self = Self(5);
	/// Payloadless transmit transaction commitment.
	pub const NULCOMMIT: Self = Self(6);
	/// Without any optional header.
	pub const PURE_DATA: Self = Self(7);
	/// Starts a new transmit transaction; the EoT flag makes it transactional.
	pub const PERSIST: Self = Self(8);
	pub const ACK_FLUSH: Self = Self(9);
	pub const RELEASE: Self = Self(10);
	/// Clones a connection; may piggyback payload.
	pub const MULTIPLY: Self = Self(11);
	pub const KEEP_ALIVE: Self = Self(12);
	pub const RESERVED_CODE13: Self = Self(13);
	pub const RESERVED_CODE14: Self = Self(14);
	pub const RESERVED_CODE15: Self = Self(15);
	pub const PEER_SUBNETS: Self = Self(16);
	pub const SELECTIVE_NACK: Self = Self(17);

	/// In-band acknowledgement to CLONE or `ACK_CONNECT_REQUEST` when there's no data to
	/// send back. Shares a wire value with `NULCOMMIT` by design.
	pub const ACK_START: Self = Self::NULCOMMIT;

	pub const LARGEST: Self = Self::SELECTIVE_NACK;

	#[must_use]
	pub const fn name(self) -> &'static str {
		match self.0 {
			1 => "INIT_CONNECT",
			2 => "ACK_INIT_CONNECT",
			3 => "CONNECT_REQUEST",
			4 => "ACK_CONNECT_REQ",
			5 => "RESET",
			6 => "NULCOMMIT",
			7 => "PURE_DATA",
			8 => "PERSIST",
			9 => "ACK_FLUSH",
			10 => "RELEASE",
			11 => "MULTIPLY",
			12 => "KEEP_ALIVE",
			13 => "RESERVED_CODE13",
			14 => "RESERVED_CODE14",
			15 => "RESERVED_CODE15",
			16 => "PEER_SUBNETS",
			17 => "SELECTIVE_NACK",
			_ => "UNKNOWN",
		}
	}

	#[must_use]
	pub const fn is_valid(self) -> bool {
		self.0 >= 1 && self.0 <= Self::LARGEST.0
	}

	/// Extension headers (everything beyond the fixed packet header) are only ever
	/// `PEER_SUBNETS`/`SELECTIVE_NACK`-shaped, chained via their back-link `mark`.
	#[must_use]
	pub const fn is_extension_header(self) -> bool {
		self.0 == Self::PEER_SUBNETS.0 || self.0 == Self::SELECTIVE_NACK.0
	}
}

impl fmt::Debug for OpCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}
