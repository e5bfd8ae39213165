//! Raw UDP/IPv4 datagram transport for the SVC listening socket (`spec.md` §6 "UDP/IPv4
//! alternate transport"). `runtime::Io<T>` only wraps a *connected* socket (`send`/`recv`,
//! no peer address) which is fine for a one-peer-per-actor design like
//! `examples/dspeyrer-net/wireguard`'s, but FSP's listening socket must receive unsolicited
//! `CONNECT_REQUEST`s from any peer address on one shared port. Rather than extend the
//! shared reactor, this opens its own non-blocking UDP socket and is drained on a
//! self-rescheduling timer tick (see `engine::Service::poll_transport`) instead of
//! `poll()`-based readiness -- reaching for `libc` directly here follows the precedent
//! already set by `mobility::LocalInterfaces::enumerate` and `fsp_ipc::shm` for POSIX
//! primitives the adopted stack doesn't cover.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::unix::io::{AsRawFd, RawFd};

use fsp_proto::alfid::AlfidPair;
use utils::bytes::{as_slice, cast};

/// Demux prefix ahead of every UDP/IPv4 datagram's FSP packet bytes: the sender's own
/// source/peer `AlfidPair`, the same 8-octet shape `NormalPacketHeader::integrity_alfid_pair`
/// already carries pre-key (`spec.md` §6: "packets are encapsulated by a 16-bit ALFID-pair
/// prefix" -- read here as this existing 8-octet `AlfidPair` struct, not a separate 16-bit
/// field, since ALFIDs are themselves 32 bits wide and the wire format has no other
/// pre-established pairing token to reuse).
pub const DEMUX_PREFIX_LEN: usize = core::mem::size_of::<AlfidPair>();

/// Largest datagram this transport will read in one go (`spec.md` §3: `MAX_BLOCK_SIZE_UDP`
/// payload plus header/extension overhead comfortably fits under the classic 1500-octet
/// Ethernet MTU).
pub const MAX_DATAGRAM: usize = 1500;

pub struct Datagram {
	fd: RawFd,
}

impl Datagram {
	/// Binds a non-blocking UDP/IPv4 socket on `port`, demultiplexing every peer's traffic
	/// off one listening port (`spec.md` §6: `DEFAULT_FSP_UDPPORT`).
	pub fn bind(port: u16) -> io::Result<Self> {
		// SAFETY: standard non-blocking UDP socket setup; no shared state touched.
		unsafe {
			let fd = libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0);
			if fd < 0 {
				return Err(io::Error::last_os_error());
			}

			let mut addr: libc::sockaddr_in = std::mem::zeroed();
			addr.sin_family = libc::AF_INET as libc::sa_family_t;
			addr.sin_port = port.to_be();
			addr.sin_addr.s_addr = libc::INADDR_ANY;

			if libc::bind(fd, std::ptr::addr_of!(addr).cast(), core::mem::size_of::<libc::sockaddr_in>() as u32) < 0 {
				let err = io::Error::last_os_error();
				libc::close(fd);
				return Err(err);
			}

			let flags = libc::fcntl(fd, libc::F_GETFL, 0);
			if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
				let err = io::Error::last_os_error();
				libc::close(fd);
				return Err(err);
			}

			Ok(Self { fd })
		}
	}

	/// Drains one ready datagram into `buf`, returning the peer's address, the sender's own
	/// `AlfidPair` prefix, and the FSP packet bytes following it. Returns `Ok(None)` once the
	/// socket would block (`EAGAIN`/`EWOULDBLOCK`) -- the caller's drain loop stops there.
	pub fn recv<'a>(&self, buf: &'a mut [u8; MAX_DATAGRAM]) -> io::Result<Option<(SocketAddr, AlfidPair, &'a [u8])>> {
		// SAFETY: `addr`/`addr_len` are out-params fully written by `recvfrom` on success.
		unsafe {
			let mut addr: libc::sockaddr_in = std::mem::zeroed();
			let mut addr_len = core::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

			let n = libc::recvfrom(self.fd, buf.as_mut_ptr().cast(), buf.len(), 0, std::ptr::addr_of_mut!(addr).cast(), &mut addr_len);

			if n < 0 {
				let err = io::Error::last_os_error();
				return if err.kind() == io::ErrorKind::WouldBlock { Ok(None) } else { Err(err) };
			}

			let n = n as usize;
			if n < DEMUX_PREFIX_LEN {
				return Ok(None);
			}

			let peer = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr)), u16::from_be(addr.sin_port)));
			let pair = *cast::<AlfidPair, _>(&buf[..DEMUX_PREFIX_LEN]);

			Ok(Some((peer, pair, &buf[DEMUX_PREFIX_LEN..n])))
		}
	}

	/// Sends one datagram to `peer`, prefixing `pair` (the sender's own `AlfidPair`) ahead
	/// of `payload` per the demux framing above.
	pub fn send_to(&self, peer: SocketAddr, pair: AlfidPair, payload: &[u8]) -> io::Result<()> {
		let SocketAddr::V4(v4) = peer else {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "UDP/IPv4 transport cannot address an IPv6 peer"));
		};

		let mut datagram = Vec::with_capacity(DEMUX_PREFIX_LEN + payload.len());
		datagram.extend_from_slice(as_slice(&pair));
		datagram.extend_from_slice(payload);

		// SAFETY: standard sendto; `datagram` outlives the call.
		unsafe {
			let mut addr: libc::sockaddr_in = std::mem::zeroed();
			addr.sin_family = libc::AF_INET as libc::sa_family_t;
			addr.sin_port = v4.port().to_be();
			addr.sin_addr.s_addr = u32::from(*v4.ip()).to_be();

			let n = libc::sendto(
				self.fd,
				datagram.as_ptr().cast(),
				datagram.len(),
				0,
				std::ptr::addr_of!(addr).cast(),
				core::mem::size_of::<libc::sockaddr_in>() as u32,
			);

			if n < 0 {
				return Err(io::Error::last_os_error());
			}
		}

		Ok(())
	}
}

impl AsRawFd for Datagram {
	fn as_raw_fd(&self) -> RawFd {
		self.fd
	}
}

impl Drop for Datagram {
	fn drop(&mut self) {
		// SAFETY: `fd` was opened by `bind` and is owned exclusively by this value.
		unsafe {
			libc::close(self.fd);
		}
	}
}
