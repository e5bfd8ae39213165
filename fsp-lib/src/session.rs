//! A `Connection`: LIB's handle onto one socket (`spec.md` §3, §6). Wraps the mapped
//! Control Block, the command-channel sender that reaches SVC, and the suspension-point
//! machinery that backs the blocking API variants (`spec.md` §5).

use core::time::Duration;
use std::time::Instant;

use fsp_ipc::{CommandMessage, CommandOpcode, CommandSender, SharedRegion};
use fsp_proto::alfid::Alfid;
use fsp_proto::control_block::notice::ServiceCode;
use fsp_proto::control_block::ControlBlockIpv6;
use fsp_proto::error::Error;

/// Callback registered via `SetOnRelease`/`FSP_SET_CALLBACK_ON_{ERROR,REQUEST,CONNECT}`
/// (`spec.md` §6).
pub type Callback = Box<dyn FnMut(ServiceCode) + Send>;

/// One LIB-side connection handle.
pub struct Connection {
	pub(crate) alfid: Alfid,
	pub(crate) cb: SharedRegion<ControlBlockIpv6>,
	pub(crate) commands: CommandSender,
	pub(crate) process_id: u32,
	on_release: Option<Callback>,
	on_error: Option<Callback>,
}

impl Connection {
	pub(crate) fn new(alfid: Alfid, cb: SharedRegion<ControlBlockIpv6>, commands: CommandSender) -> Self {
		Self {
			alfid,
			cb,
			commands,
			process_id: std::process::id(),
			on_release: None,
			on_error: None,
		}
	}

	#[must_use]
	pub fn alfid(&self) -> Alfid {
		self.alfid
	}

	#[must_use]
	pub fn control_block(&self) -> &ControlBlockIpv6 {
		self.cb.get()
	}

	/// `SetOnRelease` (`spec.md` §6).
	pub fn set_on_release(&mut self, f: impl FnMut(ServiceCode) + Send + 'static) {
		self.on_release = Some(Box::new(f));
	}

	/// `FSP_SET_CALLBACK_ON_ERROR` (`spec.md` §6).
	pub fn set_on_error(&mut self, f: impl FnMut(ServiceCode) + Send + 'static) {
		self.on_error = Some(Box::new(f));
	}

	fn send_command(&self, opcode: CommandOpcode, shm_name: &str) -> Result<(), Error> {
		let msg = CommandMessage::new(self.process_id, self.alfid, opcode, shm_name);
		self.commands.send(&msg).map_err(|()| Error::Io)
	}

	/// Same as `send_command`, additionally stamping the UDP/IPv4 peer address `CONNECT`
	/// should dial when the connection runs over the UDP/IPv4 alternate transport rather
	/// than native IPv6 (`spec.md` §6).
	fn send_command_with_peer_v4(&self, opcode: CommandOpcode, shm_name: &str, peer_v4: Option<std::net::SocketAddrV4>) -> Result<(), Error> {
		let msg = CommandMessage::new_with_peer_v4(self.process_id, self.alfid, opcode, shm_name, peer_v4);
		self.commands.send(&msg).map_err(|()| Error::Io)
	}

	/// Blocks the calling thread until `want` appears in the notice ring or `timeout`
	/// elapses (`spec.md` §5 "Suspension points"). A production build would park on the
	/// per-socket OS event SVC signals when it pushes a notice; this polls the ring
	/// directly at a short interval, which is observably equivalent from LIB's point of
	/// view and keeps the suspension point entirely within safe, portable Rust.
	pub(crate) fn wait_for(&mut self, want: ServiceCode, timeout: Duration) -> Result<(), Error> {
		let deadline = Instant::now() + timeout;

		loop {
			while let Some(code) = self.control_block().notices.pop() {
				if code == want {
					return Ok(());
				}

				self.dispatch_incidental_notice(code);

				if matches!(code, ServiceCode::Reset | ServiceCode::Timeout | ServiceCode::MemoryCorruption) {
					return Err(Error::Intr);
				}
			}

			if Instant::now() >= deadline {
				return Err(Error::Intr);
			}

			std::thread::sleep(Duration::from_millis(1));
		}
	}

	fn dispatch_incidental_notice(&mut self, code: ServiceCode) {
		if code == ServiceCode::Reset || code == ServiceCode::MemoryCorruption || code == ServiceCode::Timeout {
			if let Some(cb) = self.on_error.as_mut() {
				cb(code);
			}
		} else if code == ServiceCode::ToFinish || code == ServiceCode::Recycled {
			if let Some(cb) = self.on_release.as_mut() {
				cb(code);
			}
		}
	}

	/// `Shutdown` (`spec.md` §6, §4.3 "Orderly release"): request graceful close.
	pub fn shutdown(&mut self) -> Result<(), Error> {
		self.send_command(CommandOpcode::SHUTDOWN, "")?;
		self.wait_for(ServiceCode::ToFinish, Duration::from_secs(120))
	}

	/// `Dispose` (`spec.md` §5 "Cancellation"): tear the connection down, gracefully if
	/// still reachable, forcibly (RESET) otherwise. Unlike `shutdown`, never blocks waiting
	/// for the peer.
	pub fn dispose(self) -> Result<(), Error> {
		self.send_command(CommandOpcode::DISPOSE, "")
	}

	pub(crate) fn command(&self, opcode: CommandOpcode, shm_name: &str) -> Result<(), Error> {
		self.send_command(opcode, shm_name)
	}

	pub(crate) fn command_with_peer_v4(&self, opcode: CommandOpcode, shm_name: &str, peer_v4: Option<std::net::SocketAddrV4>) -> Result<(), Error> {
		self.send_command_with_peer_v4(opcode, shm_name, peer_v4)
	}
}
