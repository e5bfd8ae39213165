//! The command channel (`spec.md` §4.8): LIB writes, SVC reads. Carries
//! `{process id, ALFID, opcode}` plus, for session-creation commands, the shared-memory
//! name of the control block that was (or should be) mapped for the session.
//!
//! Implemented over a `UnixDatagram` mailslot, one of the two transports the spec
//! explicitly allows ("a datagram mailslot or UNIX socket"); framed with `macros::Cast` the
//! same way the wire packet codec is, since this is just another fixed-layout datagram.

use std::net::{Ipv4Addr, SocketAddrV4};

use macros::Cast;
use utils::bytes::cast;
use utils::endian::{u16be, u32be};

use fsp_proto::alfid::Alfid;

pub const SHM_NAME_LEN: usize = 104;

/// Command opcodes LIB posts to SVC (`spec.md` §2's LIB API surface, reduced to the subset
/// that crosses the process boundary as a discrete request rather than a direct CB write).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Cast)]
#[repr(C)]
pub struct CommandOpcode(pub u8);

impl CommandOpcode {
	pub const LISTEN: Self = Self(1);
	pub const CONNECT: Self = Self(2);
	pub const ACCEPT: Self = Self(3);
	pub const MULTIPLY: Self = Self(4);
	pub const INSTALL_MASTER_KEY: Self = Self(5);
	pub const COMMIT: Self = Self(6);
	pub const SHUTDOWN: Self = Self(7);
	pub const DISPOSE: Self = Self(8);
	pub const FSP_CONTROL: Self = Self(9);

	#[must_use]
	pub const fn name(self) -> &'static str {
		match self.0 {
			1 => "LISTEN",
			2 => "CONNECT",
			3 => "ACCEPT",
			4 => "MULTIPLY",
			5 => "INSTALL_MASTER_KEY",
			6 => "COMMIT",
			7 => "SHUTDOWN",
			8 => "DISPOSE",
			9 => "FSP_CONTROL",
			_ => "UNKNOWN",
		}
	}
}

/// One command-channel datagram (`spec.md` §4.8). `shm_name` is a NUL-padded ASCII name,
/// valid only for session-creation commands (`LISTEN`, `CONNECT`, `ACCEPT`, `MULTIPLY`);
/// other opcodes address an already-mapped session purely by `alfid`.
#[derive(Clone, Copy, Cast)]
#[repr(C)]
pub struct CommandMessage {
	pub process_id: u32be,
	pub alfid: Alfid,
	pub opcode: CommandOpcode,
	_pad: [u8; 3],
	shm_name: [u8; SHM_NAME_LEN],
	/// Peer transport address for `CONNECT` over the UDP/IPv4 alternate transport
	/// (`spec.md` §6); zero when unset, either because this opcode doesn't need one or
	/// because the session runs over native IPv6 instead, whose addressing lives in the
	/// control block's `state.peer_subnets` rather than on this channel.
	peer_addr_v4: u32be,
	peer_port: u16be,
	_pad2: [u8; 2],
}

impl CommandMessage {
	#[must_use]
	pub fn new(process_id: u32, alfid: Alfid, opcode: CommandOpcode, shm_name: &str) -> Self {
		Self::new_with_peer_v4(process_id, alfid, opcode, shm_name, None)
	}

	/// Same as `new`, additionally stamping the UDP/IPv4 peer address a `CONNECT` should
	/// dial (`spec.md` §6).
	#[must_use]
	pub fn new_with_peer_v4(process_id: u32, alfid: Alfid, opcode: CommandOpcode, shm_name: &str, peer_v4: Option<SocketAddrV4>) -> Self {
		let mut name_bytes = [0u8; SHM_NAME_LEN];
		let src = shm_name.as_bytes();
		let n = src.len().min(SHM_NAME_LEN);
		name_bytes[..n].copy_from_slice(&src[..n]);

		let (peer_addr_v4, peer_port) = peer_v4.map_or((0u32, 0u16), |a| (u32::from(*a.ip()), a.port()));

		Self {
			process_id: process_id.into(),
			alfid,
			opcode,
			_pad: [0; 3],
			shm_name: name_bytes,
			peer_addr_v4: peer_addr_v4.into(),
			peer_port: peer_port.into(),
			_pad2: [0; 2],
		}
	}

	#[must_use]
	pub fn shm_name(&self) -> &str {
		let end = self.shm_name.iter().position(|&b| b == 0).unwrap_or(SHM_NAME_LEN);
		core::str::from_utf8(&self.shm_name[..end]).unwrap_or("")
	}

	#[must_use]
	pub fn peer_addr_v4(&self) -> Option<SocketAddrV4> {
		let addr = self.peer_addr_v4.get();
		(addr != 0).then(|| SocketAddrV4::new(Ipv4Addr::from(addr), self.peer_port.get()))
	}
}

#[must_use]
pub fn encode(msg: &CommandMessage) -> &[u8] {
	utils::bytes::as_slice(msg)
}

#[must_use]
pub fn decode(bytes: &[u8]) -> Option<&CommandMessage> {
	if bytes.len() < core::mem::size_of::<CommandMessage>() {
		return None;
	}
	Some(cast(bytes))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn shm_name_round_trips() {
		let msg = CommandMessage::new(123, Alfid(7), CommandOpcode::CONNECT, "fsp-sock-7");
		assert_eq!(msg.shm_name(), "fsp-sock-7");
		assert_eq!(u32::from(msg.process_id), 123);
	}

	#[test]
	fn encode_decode_round_trips() {
		let msg = CommandMessage::new(1, Alfid(9), CommandOpcode::ACCEPT, "x");
		let bytes = encode(&msg).to_vec();
		let decoded = decode(&bytes).unwrap();
		assert_eq!(decoded.opcode, CommandOpcode::ACCEPT);
		assert_eq!(decoded.shm_name(), "x");
	}

	#[test]
	fn peer_addr_v4_is_absent_unless_stamped() {
		let msg = CommandMessage::new(1, Alfid(9), CommandOpcode::CONNECT, "x");
		assert!(msg.peer_addr_v4().is_none());

		let peer = SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 5), 18003);
		let msg = CommandMessage::new_with_peer_v4(1, Alfid(9), CommandOpcode::CONNECT, "x", Some(peer));
		assert_eq!(msg.peer_addr_v4(), Some(peer));
	}
}
