//! Transport for the command channel (`spec.md` §4.8): a `UnixDatagram` mailslot bound by
//! SVC at a well-known path, written to by every LIB process that wants to reach it.
//! Readiness notification reuses `runtime::Io<T: AsRawFd>` unchanged — a `UnixDatagram`
//! registers with the poll()-based reactor exactly the way the teacher's `UdpSocket` does.

use std::os::unix::net::UnixDatagram;
use std::path::Path;

use log::error;
use runtime::Io;
use stakker::Fwd;
use utils::error::*;

use crate::command::{decode, encode, CommandMessage};

/// SVC's end: bound at a well-known path, receiving commands from every LIB in the host.
pub struct CommandListener {
	io: Io<UnixDatagram>,
}

impl CommandListener {
	pub fn bind(path: impl AsRef<Path>, on_command: Fwd<CommandMessage>) -> Result<Self> {
		let path = path.as_ref();

		if path.exists() {
			std::fs::remove_file(path).map_err(|err| error!("Failed to remove stale command socket {}: {err}", path.display()))?;
		}

		let socket = UnixDatagram::bind(path).map_err(|err| error!("Failed to bind command channel at {}: {err}", path.display()))?;

		socket
			.set_nonblocking(true)
			.map_err(|err| error!("Failed to set command channel non-blocking: {err}"))?;

		let read_fwd = Fwd::new(move |buf: collections::bytes::Slice| {
			if let Some(msg) = decode(&buf) {
				on_command.fwd(*msg);
			} else {
				error!("Dropped undersized command channel datagram ({} bytes)", buf.len());
			}
		});

		Ok(Self { io: Io::new(socket, read_fwd) })
	}
}

/// LIB's end: one per application process, connected to SVC's well-known path.
pub struct CommandSender {
	io: Io<UnixDatagram>,
}

impl CommandSender {
	pub fn connect(path: impl AsRef<Path>, on_reply: Fwd<collections::bytes::Slice>) -> Result<Self> {
		let socket = UnixDatagram::unbound().map_err(|err| error!("Failed to create command channel socket: {err}"))?;

		socket
			.connect(path.as_ref())
			.map_err(|err| error!("Failed to connect to command channel at {}: {err}", path.as_ref().display()))?;

		socket
			.set_nonblocking(true)
			.map_err(|err| error!("Failed to set command channel non-blocking: {err}"))?;

		Ok(Self { io: Io::new(socket, on_reply) })
	}

	pub fn send(&self, msg: &CommandMessage) -> Result {
		self.io.write(|cursor| {
			let bytes = encode(msg);
			cursor.push(bytes);
		})
	}
}
