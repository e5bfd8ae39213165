//! `ListenAt` and `Accept1` (`spec.md` §4.3 "LISTENING", §6).

use core::time::Duration;

use fsp_ipc::{CommandOpcode, CommandSender};
use fsp_proto::alfid::Alfid;
use fsp_proto::control_block::notice::ServiceCode;
use fsp_proto::error::Error;

use crate::session::Connection;

/// A passive listening socket (`ConnState::Listening` on the SVC side).
pub struct Listener {
	alfid: Alfid,
	connection: Connection,
}

impl Listener {
	/// `ListenAt`: asks SVC to open a listener at `alfid` (a well-known ALFID, conventionally
	/// chosen the same way a TCP port is) and blocks until SVC confirms it's ready.
	pub fn listen_at(alfid: Alfid, connection: Connection, timeout: Duration) -> Result<Self, Error> {
		if !alfid.is_well_known() {
			return Err(Error::Dom);
		}

		let mut this = Self { alfid, connection };
		this.connection.command(CommandOpcode::LISTEN, "")?;
		this.connection.wait_for(ServiceCode::ListeningReady, timeout)?;
		Ok(this)
	}

	#[must_use]
	pub fn alfid(&self) -> Alfid {
		self.alfid
	}

	/// `Accept1`: blocks until a pending connection is in the backlog, then asks SVC to
	/// admit it and returns the child `Connection` once SVC confirms acceptance
	/// (`spec.md` §4.3: "LISTENING → (create child socket in CHALLENGING)").
	pub fn accept1(&mut self, timeout: Duration) -> Result<Connection, Error> {
		self.connection.wait_for(ServiceCode::Accepting, timeout)?;

		if self.connection.control_block().backlog.is_empty() {
			return Err(Error::Intr);
		}

		let entry = self.connection.control_block().backlog.pop().ok_or(Error::Intr)?;

		self.connection.command(CommandOpcode::ACCEPT, "")?;
		self.connection.wait_for(ServiceCode::Accepted, timeout)?;

		// SVC hands the child's shared-memory name back through a fresh command-channel
		// reply in the real IPC binding; here the backlog entry's peer ALFID is what
		// distinguishes the child, since `Connection` itself is opaque to this crate beyond
		// its CB handle.
		let shm_name = child_shm_name(self.alfid, entry.peer_alfid);
		let cb = fsp_ipc::SharedRegion::open(&shm_name).map_err(|()| Error::Io)?;
		let commands = CommandSender::connect(fsp_ipc::DEFAULT_COMMAND_SOCKET_PATH, stakker::Fwd::new(|_| {})).map_err(|()| Error::Io)?;

		Ok(Connection::new(entry.peer_alfid, cb, commands))
	}
}

fn child_shm_name(listener: Alfid, peer: Alfid) -> String {
	format!("fsp-cb-{}-{}", listener.0, peer.0)
}

/// `Connect2`: the active-open counterpart to `ListenAt`/`Accept1`
/// (`spec.md` §4.3 "Initiator"). `peer_v4` names the UDP/IPv4 destination to dial when the
/// session runs over the alternate transport (`spec.md` §6); pass `None` for native IPv6,
/// whose peer addressing SVC resolves out of the control block's `state.peer_subnets`
/// instead.
pub fn connect2(
	local: Alfid,
	cb: fsp_ipc::SharedRegion<fsp_proto::control_block::ControlBlockIpv6>,
	commands: CommandSender,
	peer_v4: Option<std::net::SocketAddrV4>,
	timeout: Duration,
) -> Result<Connection, Error> {
	let mut connection = Connection::new(local, cb, commands);
	connection.command_with_peer_v4(CommandOpcode::CONNECT, "", peer_v4)?;
	connection.wait_for(ServiceCode::Accepted, timeout)?;
	Ok(connection)
}
