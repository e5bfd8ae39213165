use macros::Cast;
use utils::bytes::cast;
use utils::endian::{i32be, u16be, u32be, u64be};

use crate::alfid::{Alfid, AlfidPair};
use crate::opcode::OpCode;

/// Maximum number of multihomed physical interfaces either side may advertise.
pub const MAX_PHY_INTERFACES: usize = 4;

pub type Subnets = [u64be; MAX_PHY_INTERFACES];

/// Fixed 4-octet prelude carried by every FSP packet: `opCode`, protocol `major` version,
/// and `offset` (the historical `hsp`, the byte offset of the start of the payload/first
/// extension header, measured from the start of this header).
#[derive(Clone, Copy, Cast)]
#[repr(C)]
pub struct PacketHeader {
	pub op_code: OpCode,
	pub major: u8,
	pub offset: u16be,
}

/// Header prefixing every chained extension header (`PEER_SUBNETS`, `SELECTIVE_NACK`, ...).
///
/// `mark` is a back-distance byte offset to the start of the previous extension header (or
/// to the fixed packet header, for the first extension), letting a receiver walk the chain
/// backwards without needing a forward length index.
#[derive(Clone, Copy, Cast)]
#[repr(C)]
pub struct OptionalHeader {
	pub op_code: OpCode,
	pub mark: u8,
	pub length: u16be,
}

/// Position of flag bits within the normal packet header's leading flag octet, counted from
/// the leftmost bit.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FlagPosition {
	/// Shares a flag with the buffer block descriptor's end-of-transaction bit.
	TransactionEnded = 7,
	/// Minimal-delay request, for interactive "milk"-like payload.
	MinimalDelay = 6,
	/// Payload carried by this packet is LZ4-compressed.
	Compressed = 5,
	/// Explicit congestion notification echoed back by the path.
	CongestionAlarm = 4,
}

impl FlagPosition {
	#[must_use]
	pub const fn mask(self) -> u8 {
		1 << (self as u8)
	}
}

/// `INIT_CONNECT`: the first word of the first packet of a connection is the header
/// signature. Optional payload (the remote peer's domain name) follows, up to
/// `512 - size_of::<InitiateRequest>()` octets.
#[derive(Clone, Copy, Cast)]
#[repr(C)]
pub struct InitiateRequest {
	pub hs: PacketHeader,
	pub salt: u32be,
	pub time_stamp: u64be,
	pub init_check_code: u64be,
}

/// Specifies the parent connection in an `ACK_CONNECT_INIT`, `CONNECT_REQUEST` or
/// `MULTIPLY` packet. Also stands alone as the canonical `PEER_SUBNETS` extension header.
#[derive(Clone, Copy, Cast)]
#[repr(C)]
pub struct ConnectParam {
	pub h: OptionalHeader,
	pub id_listener: Alfid,
	pub subnets: Subnets,
}

/// `ACK_INIT_CONNECT`, acknowledging the connect bootstrap request; works as a challenge
/// against the initiator.
#[derive(Clone, Copy, Cast)]
#[repr(C)]
pub struct Challenge {
	pub hs: PacketHeader,
	pub time_delta: i32be,
	pub cookie: u64be,
	pub init_check_code: u64be,
	pub params: ConnectParam,
}

/// `CONNECT_REQUEST`, overlaying `InitiateRequest`'s layout. Optional payload (the near
/// end's canonical name) follows, up to `512 - size_of::<ConnectRequest>()` octets.
#[derive(Clone, Copy, Cast)]
#[repr(C)]
pub struct ConnectRequest {
	pub init: InitiateRequest,
	pub params: ConnectParam,
	pub initial_sn: u32be,
	pub time_delta: i32be,
	pub cookie: u64be,
}

/// A normal packet header, used from `ACK_CONNECT_REQ` onward; the first word is again the
/// header signature. The sequence number field is kept aligned with where the timestamp or
/// cookie field lands in the handshake packets it overlays.
#[derive(Clone, Copy, Cast)]
#[repr(C)]
pub struct NormalPacketHeader {
	pub hs: PacketHeader,
	pub flags_ws: [u8; 4],
	pub sequence_no: u32be,
	pub expected_sn: u32be,
	/// Either the packet's integrity code (post-ICC signing) or, before a session key is
	/// installed, the plain source/peer ALFID pair. Stored untyped since the two
	/// interpretations are mutually exclusive and chosen by protocol phase, not by a
	/// discriminant on the wire.
	integrity: [u8; 8],
}

impl NormalPacketHeader {
	/// Builds a fresh header with a zeroed `integrity` field; callers sign the packet
	/// afterward via `set_integrity_code` once the payload bytes are final.
	#[must_use]
	pub fn new(op_code: OpCode, sequence_no: u32, expected_sn: u32) -> Self {
		Self {
			hs: PacketHeader { op_code, major: 0, offset: (core::mem::size_of::<Self>() as u16).into() },
			flags_ws: [0; 4],
			sequence_no: sequence_no.into(),
			expected_sn: expected_sn.into(),
			integrity: [0; 8],
		}
	}

	#[must_use]
	pub fn integrity_code(&self) -> u64 {
		cast::<u64be, _>(&self.integrity).get()
	}

	pub fn set_integrity_code(&mut self, code: u64) {
		self.integrity = cast::<[u8; 8], _>(&u64be::from(code)).to_owned_array();
	}

	#[must_use]
	pub fn integrity_alfid_pair(&self) -> AlfidPair {
		*cast::<AlfidPair, _>(&self.integrity)
	}

	pub fn set_integrity_alfid_pair(&mut self, pair: AlfidPair) {
		self.integrity = *cast::<[u8; 8], _>(&pair);
	}

	/// A brute-force but endian-safe extraction of the 24-bit receive window size packed
	/// into the last three octets of `flags_ws`.
	#[must_use]
	pub fn recv_ws(&self) -> i32 {
		((self.flags_ws[1] as i32) << 16) + ((self.flags_ws[2] as i32) << 8) + self.flags_ws[3] as i32
	}

	pub fn set_recv_ws(&mut self, ws: i32) {
		self.flags_ws[1] = (ws >> 16) as u8;
		self.flags_ws[2] = (ws >> 8) as u8;
		self.flags_ws[3] = ws as u8;
	}

	#[must_use]
	pub fn flag(&self, pos: FlagPosition) -> bool {
		self.flags_ws[0] & pos.mask() != 0
	}

	pub fn set_flag(&mut self, pos: FlagPosition, value: bool) {
		if value {
			self.flags_ws[0] |= pos.mask();
		} else {
			self.flags_ws[0] &= !pos.mask();
		}
	}
}

/// One run of missing packets in a `SELECTIVE_NACK` report.
#[derive(Clone, Copy, Cast)]
#[repr(C)]
pub struct GapDescriptor {
	/// Width of the gap, in packets.
	pub gap_width: u32be,
	/// Length of the data run following the gap, in packets.
	pub data_length: u32be,
}

/// Mandatory additional header for `KEEP_ALIVE`; also the minimal constituent of a full
/// SNACK report, which appends a run of `GapDescriptor`s after this fixed portion.
#[derive(Clone, Copy, Cast)]
#[repr(C)]
pub struct SelectiveNack {
	pub h: OptionalHeader,
	pub ack_seq_no: u32be,
	pub latest_sn: u32be,
	/// Delay of the lazy acknowledgement that produced this report, in microseconds.
	pub t_lazy_ack: u32be,
}

/// `RESET`'s reason bitfield. Bit layout mirrors the tier-2/tier-3 error taxonomy of
/// `fsp_proto::error::Error`, one bit per rejectable cause, so a single packet can report
/// more than one simultaneous reason.
#[derive(Clone, Copy, Cast)]
#[repr(C)]
pub struct RejectReasons(pub u32be);

/// The payload carried by a `RESET` packet varies by the state it aborts from. Modeled as a
/// tagged enum rather than the untagged C union the wire format's single shape allows for,
/// since the state producing the reset is always known to both the sender and the code path
/// decoding it.
#[derive(Clone, Copy, Debug)]
pub enum RejectPayload {
	Timestamp(u64),
	SequenceNumbers { initial: u32, expected: u32 },
	IntegrityCode(u64),
	Cookie(u64),
	InitCheckCode(u64),
	AlfidPair(Alfid, Alfid),
}

#[derive(Clone, Copy)]
pub struct RejectConnect {
	pub hs: PacketHeader,
	pub reasons: RejectReasons,
	pub payload: RejectPayload,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn recv_ws_round_trips() {
		let mut h = NormalPacketHeader {
			hs: PacketHeader { op_code: OpCode::PERSIST, major: 0, offset: 0u16.into() },
			flags_ws: [0; 4],
			sequence_no: 0u32.into(),
			expected_sn: 0u32.into(),
			integrity: [0; 8],
		};

		h.set_recv_ws(0x00AB_CDEF);
		assert_eq!(h.recv_ws(), 0x00AB_CDEF);
	}

	#[test]
	fn flag_bits_round_trip_independently() {
		let mut h = NormalPacketHeader {
			hs: PacketHeader { op_code: OpCode::PURE_DATA, major: 0, offset: 0u16.into() },
			flags_ws: [0; 4],
			sequence_no: 0u32.into(),
			expected_sn: 0u32.into(),
			integrity: [0; 8],
		};

		h.set_flag(FlagPosition::Compressed, true);
		assert!(h.flag(FlagPosition::Compressed));
		assert!(!h.flag(FlagPosition::TransactionEnded));

		h.set_flag(FlagPosition::Compressed, false);
		assert!(!h.flag(FlagPosition::Compressed));
	}

	#[test]
	fn integrity_field_holds_either_interpretation() {
		let mut h = NormalPacketHeader {
			hs: PacketHeader { op_code: OpCode::KEEP_ALIVE, major: 0, offset: 0u16.into() },
			flags_ws: [0; 4],
			sequence_no: 0u32.into(),
			expected_sn: 0u32.into(),
			integrity: [0; 8],
		};

		h.set_integrity_code(0x0102_0304_0506_0708);
		assert_eq!(h.integrity_code(), 0x0102_0304_0506_0708);

		let pair = AlfidPair { source: Alfid(1), peer: Alfid(2) };
		h.set_integrity_alfid_pair(pair);
		let got = h.integrity_alfid_pair();
		assert_eq!(got.source, Alfid(1));
		assert_eq!(got.peer, Alfid(2));
	}
}
