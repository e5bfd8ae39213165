//! The SVC reactor (`spec.md` §2, §5, §9): the stakker actor that owns the socket table and
//! wires the command channel, packet codec, ICC, dispatch, SNACK, pacing, and timers
//! together against real sockets.
//!
//! `init` binds synchronously, mirroring `examples/dspeyrer-net/wireguard`'s
//! `Wireguard::init` -- nothing here depends on another actor's own startup finishing
//! first, unlike `examples/dspeyrer-net/net/src/dns/mod.rs`'s `Resolver::init`, which waits
//! on the already-running `Interface` actor via `cx.defer` before it can bind its socket.
//!
//! Two simplifications, both already flagged by the surrounding crate rather than newly
//! introduced here: (1) handshake packets (`INIT_CONNECT`/`ACK_INIT_CONNECT`/
//! `CONNECT_REQUEST`) carry no anti-spoof verification of the echoed init-check-code, since
//! a full Curve25519 handshake transcript isn't threaded through yet; (2) an admitted
//! child connection is keyed in `SocketManager` by the remote peer's own ALFID rather than
//! a freshly allocated one, matching the assumption `fsp-lib/src/listen.rs`'s `accept1`
//! already bakes in ("the backlog entry's peer ALFID is what distinguishes the child").

use core::sync::atomic::Ordering;
use core::time::Duration;
use std::net::SocketAddr;

use log::{error, warn};
use rand::Rng;
use stakker::{fwd_to, CX};

use fsp_icc::aead::Key;
use fsp_icc::{IccContext, SessionIcc};
use fsp_ipc::{CommandListener, CommandMessage, CommandOpcode, SharedRegion};
use fsp_proto::alfid::{Alfid, AlfidPair};
use fsp_proto::config::Config;
use fsp_proto::control_block::backlog::BacklogEntry;
use fsp_proto::control_block::descriptor::flag;
use fsp_proto::control_block::notice::ServiceCode;
use fsp_proto::control_block::ControlBlockIpv6;
use fsp_proto::opcode::OpCode;
use fsp_proto::packet::{Challenge, ConnectParam, ConnectRequest, FlagPosition, GapDescriptor, InitiateRequest, NormalPacketHeader, OptionalHeader, PacketHeader, SelectiveNack};

use crate::dispatch::{self, PacketFacts};
use crate::fsm::{self, ConnState, Event};
use crate::manager::SocketManager;
use crate::snack;
use crate::socket::SocketItem;
use crate::timer::{self, EventKind};
use crate::transport::{self, Datagram};

/// How often `poll_transport` re-arms itself. The datagram socket isn't reactor-registered
/// (see `transport`'s module doc comment on why), so readiness is approximated by a tight
/// timer tick instead of `poll()`.
const TRANSPORT_POLL_INTERVAL: Duration = Duration::from_millis(5);

pub struct Service {
	manager: SocketManager,
	transport: Datagram,
	_commands: CommandListener,
	config: Config,
}

impl Service {
	pub fn init(cx: CX![], config: Config) -> Option<Self> {
		let port = crate::DEFAULT_FSP_UDP_PORT;

		let transport = match Datagram::bind(port) {
			Ok(t) => t,
			Err(err) => {
				error!("Failed to bind FSP transport on port {port}: {err}");
				return None;
			}
		};

		let on_command = fwd_to!([cx], on_command() as (CommandMessage));
		let commands = match CommandListener::bind(config.command_socket_path(), on_command) {
			Ok(listener) => listener,
			Err(()) => return None,
		};

		let manager = SocketManager::with_config(&config);

		let actor = cx.access_actor().clone();
		cx.after(TRANSPORT_POLL_INTERVAL, move |s| {
			actor.apply(s, move |service, cx| service.poll_transport(cx));
		});

		Some(Self { manager, transport, _commands: commands, config })
	}

	fn on_command(&mut self, cx: CX![], msg: CommandMessage) {
		match msg.opcode {
			CommandOpcode::LISTEN => self.handle_listen(&msg),
			CommandOpcode::CONNECT => self.handle_connect(&msg),
			CommandOpcode::ACCEPT => self.handle_accept(&msg),
			CommandOpcode::MULTIPLY => self.handle_multiply(&msg),
			CommandOpcode::INSTALL_MASTER_KEY => self.handle_install_master_key(&msg),
			CommandOpcode::COMMIT => self.handle_commit(cx, &msg),
			CommandOpcode::SHUTDOWN => self.handle_shutdown(&msg),
			CommandOpcode::DISPOSE => self.handle_dispose(&msg),
			CommandOpcode::FSP_CONTROL => {}
			_ => warn!("Unrecognized command opcode {}", msg.opcode.name()),
		}
	}

	fn handle_listen(&mut self, msg: &CommandMessage) {
		let shm_name = self.config.shm_name(msg.alfid, Alfid(0));

		let cb = match SharedRegion::<ControlBlockIpv6>::create(&shm_name) {
			Ok(cb) => cb,
			Err(()) => {
				error!("Failed to create control block {shm_name}");
				return;
			}
		};

		cb.get().set_alfids(msg.alfid, Alfid(0));

		let icc = SessionIcc::new(IccContext::new(Key::from([0u8; 32]), 0, 0, 0), 0);
		let mut item = SocketItem::new(AlfidPair { source: msg.alfid, peer: Alfid(0) }, cb, icc, self.config.initial_rtt);
		item.state = ConnState::Listening;
		item.cb.get().state.set_state(item.state.to_wire());

		if self.manager.insert(item).is_ok() {
			self.manager.register_listener(msg.alfid);
			if let Some(item) = self.manager.get(msg.alfid) {
				item.cb.get().notices.push(ServiceCode::ListeningReady);
			}
		}
	}

	/// `msg.alfid` names the target listener's well-known ALFID to dial; SVC picks its own
	/// near-end ALFID via `SocketManager::allocate_alfid`.
	fn handle_connect(&mut self, msg: &CommandMessage) {
		let target = msg.alfid;
		let near = self.manager.allocate_alfid();
		let shm_name = self.config.shm_name(near, target);

		let cb = match SharedRegion::<ControlBlockIpv6>::create(&shm_name) {
			Ok(cb) => cb,
			Err(()) => {
				error!("Failed to create control block {shm_name}");
				return;
			}
		};

		cb.get().set_alfids(near, target);

		let icc = SessionIcc::new(IccContext::new(Key::from([0u8; 32]), 0, 0, 0), 0);
		let mut item = SocketItem::new(AlfidPair { source: near, peer: target }, cb, icc, self.config.initial_rtt);
		item.peer_addr = msg.peer_addr_v4().map(SocketAddr::V4);
		item.state = ConnState::ConnectBootstrap;
		item.cb.get().state.set_state(item.state.to_wire());

		if self.manager.insert(item).is_ok() {
			self.send_init_connect(near);
		}
	}

	fn handle_accept(&mut self, msg: &CommandMessage) {
		let Some(listener) = self.manager.get(msg.alfid) else { return };
		let Some(entry) = listener.cb.get().backlog.pop() else { return };

		if let Some(child) = self.manager.get(entry.peer_alfid) {
			child.cb.get().notices.push(ServiceCode::Accepted);
		}
	}

	/// Derives a cloned child via `SocketManager::derive_child_alfids`. The child's ICC
	/// context is freshly bootstrapped rather than copied from the parent's `SessionIcc`
	/// (which exposes no public accessor for its current key material) -- acceptable since
	/// the on-wire `MULTIPLY` handshake re-establishes trust independently of the parent.
	fn handle_multiply(&mut self, msg: &CommandMessage) {
		let Some((peer, committed, peer_addr)) = self.manager.get(msg.alfid).map(|p| (p.alfids.peer, p.last_send_committed, p.peer_addr)) else {
			return;
		};

		let child_alfids = self.manager.derive_child_alfids(peer);
		let shm_name = self.config.shm_name(child_alfids.source, child_alfids.peer);

		let cb = match SharedRegion::<ControlBlockIpv6>::create(&shm_name) {
			Ok(cb) => cb,
			Err(()) => {
				error!("Failed to create control block {shm_name}");
				return;
			}
		};

		cb.get().set_alfids(child_alfids.source, child_alfids.peer);

		let crc_seed = fsp_icc::crc_seed(u64::from(msg.alfid.0), child_alfids.source.0, child_alfids.peer.0);
		let icc = bootstrap_icc(u64::from(msg.alfid.0), u64::from(child_alfids.source.0), crc_seed);

		let mut item = SocketItem::new(child_alfids, cb, icc, self.config.initial_rtt);
		item.parent = Some(msg.alfid);
		item.peer_addr = peer_addr;
		item.last_send_committed = committed;
		item.state = ConnState::Cloning;
		item.cb.get().state.set_state(item.state.to_wire());

		let _ = self.manager.insert(item);
	}

	/// `shm_name` doubles as the hex-encoded master key, matching
	/// `fsp-lib/src/control.rs`'s `encode_key_name`.
	fn handle_install_master_key(&mut self, msg: &CommandMessage) {
		let Some(key) = decode_hex_key(msg.shm_name()) else {
			warn!("Malformed master key for socket {:?}", msg.alfid);
			return;
		};

		if let Some(item) = self.manager.get_mut(msg.alfid) {
			item.icc.install_master_key(key);
		}
	}

	fn handle_commit(&mut self, cx: CX![], msg: &CommandMessage) {
		let Some(item) = self.manager.get_mut(msg.alfid) else { return };
		let Some(new_state) = fsm::transition(item.state, &Event::LocalTransactionEnded) else { return };

		item.state = new_state;
		item.cb.get().state.set_state(new_state.to_wire());
		item.last_send_committed = true;

		let op_code = if new_state == ConnState::Committing2 { OpCode::ACK_FLUSH } else { OpCode::PERSIST };
		self.send_normal_packet(msg.alfid, op_code, true, &[]);

		let actor = cx.access_actor().clone();
		timer::schedule(cx, actor, msg.alfid, EventKind::CommittingTimeout, timer::COMMITTING_TIMEOUT, |service, cx, socket, _kind| {
			service.on_committing_timeout(cx, socket);
		});
	}

	fn handle_shutdown(&mut self, msg: &CommandMessage) {
		let Some(item) = self.manager.get_mut(msg.alfid) else { return };
		let Some(new_state) = fsm::transition(item.state, &Event::LocalShutdown) else { return };

		item.state = new_state;
		item.cb.get().state.set_state(new_state.to_wire());
		self.send_normal_packet(msg.alfid, OpCode::RELEASE, false, &[]);
	}

	fn handle_dispose(&mut self, msg: &CommandMessage) {
		if self.manager.get(msg.alfid).is_some() {
			self.send_normal_packet(msg.alfid, OpCode::RESET, false, &[]);
		}
		self.manager.remove(msg.alfid);
	}

	fn on_committing_timeout(&mut self, _cx: CX![], socket: Alfid) {
		let Some(item) = self.manager.get_mut(socket) else { return };
		warn!("Committing timeout for socket {socket:?}, falling back to non-existent");
		item.state = ConnState::NonExistent;
		item.cb.get().state.set_state(item.state.to_wire());
		item.cb.get().notices.push(ServiceCode::Timeout);
	}

	fn poll_transport(&mut self, cx: CX![]) {
		let mut buf = [0u8; transport::MAX_DATAGRAM];

		loop {
			match self.transport.recv(&mut buf) {
				Ok(Some((peer_addr, pair, payload))) => {
					let op_code = if payload.len() >= core::mem::size_of::<PacketHeader>() {
						utils::bytes::cast::<PacketHeader, _>(&payload[..core::mem::size_of::<PacketHeader>()]).op_code
					} else {
						continue;
					};

					self.handle_datagram(cx, peer_addr, pair, payload, op_code);
				}
				Ok(None) => break,
				Err(err) => {
					warn!("Transport recv error: {err}");
					break;
				}
			}
		}

		let actor = cx.access_actor().clone();
		cx.after(TRANSPORT_POLL_INTERVAL, move |s| {
			actor.apply(s, move |service, cx| service.poll_transport(cx));
		});
	}

	fn handle_datagram(&mut self, cx: CX![], peer_addr: SocketAddr, pair: AlfidPair, payload: &[u8], op_code: OpCode) {
		match op_code {
			OpCode::CONNECT_REQUEST => self.handle_connect_request(peer_addr, pair, payload),
			OpCode::ACK_INIT_CONNECT => self.handle_ack_init_connect(peer_addr, pair, payload),
			OpCode::ACK_CONNECT_REQ => self.handle_normal_packet(cx, peer_addr, pair, payload, op_code),
			_ => self.handle_normal_packet(cx, peer_addr, pair, payload, op_code),
		}
	}

	fn handle_connect_request(&mut self, peer_addr: SocketAddr, pair: AlfidPair, payload: &[u8]) {
		if !self.manager.is_listening(pair.peer) || payload.len() < core::mem::size_of::<ConnectRequest>() {
			return;
		}

		let parsed = utils::bytes::cast::<ConnectRequest, _>(&payload[..core::mem::size_of::<ConnectRequest>()]);
		let init_check_code = parsed.init.init_check_code.get();
		let cookie = parsed.cookie.get();
		let initial_sn = parsed.initial_sn.get();

		let child_key = pair.source;
		let shm_name = self.config.shm_name(child_key, pair.peer);

		let cb = match SharedRegion::<ControlBlockIpv6>::create(&shm_name) {
			Ok(cb) => cb,
			Err(()) => {
				error!("Failed to create control block {shm_name}");
				return;
			}
		};

		cb.get().set_alfids(child_key, pair.peer);
		cb.get().connect.set_cookie(cookie);

		let crc_seed = fsp_icc::crc_seed(init_check_code, child_key.0, pair.peer.0);
		let icc = bootstrap_icc(init_check_code, cookie, crc_seed);

		let mut item = SocketItem::new(AlfidPair { source: child_key, peer: pair.peer }, cb, icc, self.config.initial_rtt);
		item.peer_addr = Some(peer_addr);
		item.state = ConnState::Challenging;
		item.cb.get().state.set_state(item.state.to_wire());
		item.cb.get().recv_window.first_sn.store(initial_sn, Ordering::Release);
		item.cb.get().recv_window.next_sn.store(initial_sn, Ordering::Release);
		item.cb.get().recv_window.expected_sn.store(initial_sn, Ordering::Release);

		if self.manager.insert(item).is_err() {
			return;
		}

		if let Some(listener) = self.manager.get(pair.peer) {
			// Reusing `peer_alfid` for the child's own freshly-keyed identity, not the
			// remote's, per this module's doc comment.
			let _ = listener.cb.get().backlog.push(BacklogEntry { peer_alfid: child_key, salt: 0, cookie, initial_sn, is_multiply: false });
			listener.cb.get().notices.push(ServiceCode::Accepting);
		}

		self.send_normal_packet(child_key, OpCode::ACK_CONNECT_REQ, false, &[]);
	}

	fn handle_ack_init_connect(&mut self, _peer_addr: SocketAddr, pair: AlfidPair, payload: &[u8]) {
		if payload.len() < core::mem::size_of::<Challenge>() {
			return;
		}

		let Some(item) = self.manager.get_mut(pair.peer) else { return };
		if item.state != ConnState::ConnectBootstrap {
			return;
		}

		let challenge = utils::bytes::cast::<Challenge, _>(&payload[..core::mem::size_of::<Challenge>()]);
		let cookie = challenge.cookie.get();
		let init_check_code = challenge.init_check_code.get();
		let listener = challenge.params.id_listener;

		item.cb.get().connect.set_cookie(cookie);

		let crc_seed = fsp_icc::crc_seed(init_check_code, item.alfids.source.0, item.alfids.peer.0);
		item.icc = bootstrap_icc(init_check_code, cookie, crc_seed);

		let facts = empty_facts(OpCode::ACK_INIT_CONNECT);
		if let Some(new_state) = dispatch::dispatch(item.state, &facts).new_state {
			item.state = new_state;
			item.cb.get().state.set_state(new_state.to_wire());
		}

		self.send_connect_request(pair.peer, listener, init_check_code, cookie);
	}

	/// The shared receive/ICC-verify/dispatch path for every `NormalPacketHeader`-framed
	/// opcode: `ACK_CONNECT_REQ` onward (`spec.md` §4.1's "normal packet header... used from
	/// ACK_CONNECT_REQ onward").
	fn handle_normal_packet(&mut self, cx: CX![], peer_addr: SocketAddr, pair: AlfidPair, payload: &[u8], op_code: OpCode) {
		if payload.len() < core::mem::size_of::<NormalPacketHeader>() {
			warn!("Dropped undersized datagram from {peer_addr}");
			return;
		}

		let Some(item) = self.manager.get_mut(pair.peer) else {
			warn!("Dropped {op_code:?} for unknown socket {:?}", pair.peer);
			return;
		};

		item.cb.get().profiling.record_received();

		let header = *utils::bytes::cast::<NormalPacketHeader, _>(&payload[..core::mem::size_of::<NormalPacketHeader>()]);
		let sn = header.sequence_no.get();

		let aad_pair = AlfidPair { source: pair.peer, peer: pair.source };
		let aad = utils::bytes::as_slice::<u8, _>(&aad_pair).to_vec();
		let mut body = payload[core::mem::size_of::<NormalPacketHeader>()..].to_vec();
		let tag = header.integrity_code();

		if item.icc.verify_inbound(pair.source, sn, &aad, &mut body, 0, false, tag).is_err() {
			warn!("ICC verification failed for socket {:?}", pair.peer);
			return;
		}

		item.cb.get().profiling.record_accepted();

		if item.peer_subnets.note_source(peer_addr.ip()) {
			item.peer_addr = Some(peer_addr);
		}

		let prev_state = item.state;
		let transaction_ended = header.flag(FlagPosition::TransactionEnded);

		let facts = PacketFacts {
			op_code,
			transaction_ended,
			ack_flush_covers_commit: true,
			peer_also_committed: false,
			is_multiplied_child_first_persist: false,
			parent_last_send_committed: item.last_send_committed,
		};

		let outcome = dispatch::dispatch(item.state, &facts);

		if let Some(new_state) = outcome.new_state {
			item.state = new_state;
			item.cb.get().state.set_state(new_state.to_wire());
		}

		if let Some(notice) = outcome.notice {
			item.cb.get().notices.push(notice);
		}

		if matches!(op_code, OpCode::PERSIST | OpCode::PURE_DATA) {
			self.place_received_payload(pair.peer, sn, &body);
		}

		if op_code == OpCode::SELECTIVE_NACK {
			self.handle_snack(pair.peer, payload);
		}

		let became_alive = !prev_state.is_alive() && outcome.new_state.is_some_and(ConnState::is_alive);

		if outcome.send_ack_flush {
			self.send_normal_packet(pair.peer, OpCode::ACK_FLUSH, false, &[]);
		}

		if became_alive {
			self.arm_keep_alive(cx, pair.peer);
		}
	}

	fn place_received_payload(&mut self, alfid: Alfid, sn: u32, body: &[u8]) {
		let Some(item) = self.manager.get_mut(alfid) else { return };
		let capacity = item.cb.get().recv.capacity() as u32;

		if !item.cb.get().recv_window.accepts(sn, capacity) {
			warn!("Dropped out-of-window packet sn={sn} for socket {alfid:?}");
			return;
		}

		let descriptor = item.cb.get().recv.descriptor(sn);
		if !descriptor.try_lock() {
			return;
		}

		let block = item.cb.get().recv.block_mut(sn);
		let n = body.len().min(block.len());
		block[..n].copy_from_slice(&body[..n]);
		descriptor.set_len(n as i32);
		descriptor.set_flag(flag::IS_FULFILLED);
		descriptor.unlock();

		item.cb.get().recv_window.next_sn.fetch_max(sn.wrapping_add(1), Ordering::AcqRel);
	}

	fn handle_snack(&mut self, alfid: Alfid, payload: &[u8]) {
		let Some((ack_seq_no, gaps)) = parse_snack(payload) else { return };

		let Some(item) = self.manager.get_mut(alfid) else { return };
		let next_sn = item.cb.get().send_window.next_sn.load(Ordering::Acquire);
		let outcome = snack::process(ack_seq_no, &gaps, next_sn);

		if outcome.missing.is_empty() {
			item.pacer.grow();
		} else {
			item.pacer.on_loss_detected();
		}

		item.cb.get().send_window.first_sn.store(outcome.new_first_sn, Ordering::Release);

		let missing = outcome.missing;
		for sn in missing {
			self.retransmit(alfid, sn);
		}
	}

	fn retransmit(&mut self, alfid: Alfid, sn: u32) {
		let Some(item) = self.manager.get_mut(alfid) else { return };

		if !item.cb.get().send.descriptor(sn).flag(flag::IS_COMPLETED) {
			return;
		}

		let op_code = item.cb.get().send.descriptor(sn).op_code();
		let len = item.cb.get().send.descriptor(sn).len().max(0) as usize;
		let block = *item.cb.get().send.block(sn);
		item.cb.get().profiling.record_resent();

		self.resend_at(alfid, op_code, sn, &block[..len.min(block.len())]);
	}

	/// Replays a previously-sent payload at its original `sn` rather than allocating a
	/// fresh one, the way `send_normal_packet` does for new outbound traffic.
	fn resend_at(&mut self, alfid: Alfid, op_code: OpCode, sn: u32, payload: &[u8]) {
		let Some(item) = self.manager.get_mut(alfid) else { return };
		let Some(peer_addr) = item.peer_addr else { return };

		let expected = item.cb.get().recv_window.next_sn.load(Ordering::Acquire);

		let mut header = NormalPacketHeader::new(op_code, sn, expected);

		let mut body = payload.to_vec();
		let aad_pair = item.alfids;
		let aad = utils::bytes::as_slice::<u8, _>(&aad_pair).to_vec();
		let tag = item.icc.sign_outbound(item.alfids.peer, sn, &aad, &mut body, 0, false);
		header.set_integrity_code(tag);

		let mut datagram = utils::bytes::as_slice::<u8, _>(&header).to_vec();
		datagram.extend_from_slice(&body);

		let send_pair = AlfidPair { source: item.alfids.source, peer: item.alfids.peer };
		if let Err(err) = self.transport.send_to(peer_addr, send_pair, &datagram) {
			warn!("Retransmit send_to failed: {err}");
		}
	}

	fn send_normal_packet(&mut self, alfid: Alfid, op_code: OpCode, transaction_ended: bool, payload: &[u8]) {
		let Some(item) = self.manager.get_mut(alfid) else { return };
		let Some(peer_addr) = item.peer_addr else { return };

		let sn = item.cb.get().send_window.next_sn.fetch_add(1, Ordering::AcqRel);
		let expected = item.cb.get().recv_window.next_sn.load(Ordering::Acquire);

		let mut header = NormalPacketHeader::new(op_code, sn, expected);
		header.set_flag(FlagPosition::TransactionEnded, transaction_ended);

		let mut body = payload.to_vec();
		let aad_pair = item.alfids;
		let aad = utils::bytes::as_slice::<u8, _>(&aad_pair).to_vec();
		let tag = item.icc.sign_outbound(item.alfids.peer, sn, &aad, &mut body, 0, false);
		header.set_integrity_code(tag);

		let mut datagram = utils::bytes::as_slice::<u8, _>(&header).to_vec();
		datagram.extend_from_slice(&body);

		let send_pair = AlfidPair { source: item.alfids.source, peer: item.alfids.peer };
		if let Err(err) = self.transport.send_to(peer_addr, send_pair, &datagram) {
			warn!("send_to ({op_code:?}) failed: {err}");
			return;
		}

		item.cb.get().profiling.record_sent();
		item.pacer.spend(datagram.len());

		let descriptor = item.cb.get().send.descriptor(sn);
		let block = item.cb.get().send.block_mut(sn);
		let n = payload.len().min(block.len());
		block[..n].copy_from_slice(&payload[..n]);
		descriptor.set_len(n as i32);
		descriptor.set_op_code(op_code);
		descriptor.set_flag(flag::IS_COMPLETED);
	}

	fn send_init_connect(&mut self, alfid: Alfid) {
		let Some(item) = self.manager.get_mut(alfid) else { return };
		let Some(peer_addr) = item.peer_addr else { return };

		let salt: u32 = rand::thread_rng().gen();
		let init_check_code = fsp_icc::crc_seed(u64::from(salt), item.alfids.source.0, item.alfids.peer.0);
		item.cb.get().connect.salt.store(salt, Ordering::Release);

		let req = InitiateRequest {
			hs: PacketHeader { op_code: OpCode::INIT_CONNECT, major: 0, offset: (core::mem::size_of::<InitiateRequest>() as u16).into() },
			salt: salt.into(),
			time_stamp: now_micros().into(),
			init_check_code: init_check_code.into(),
		};

		let bytes = utils::bytes::as_slice::<u8, _>(&req);
		let pair = AlfidPair { source: item.alfids.source, peer: item.alfids.peer };
		if let Err(err) = self.transport.send_to(peer_addr, pair, bytes) {
			warn!("send_to (INIT_CONNECT) failed: {err}");
			return;
		}

		item.cb.get().profiling.record_sent();
	}

	fn send_connect_request(&mut self, alfid: Alfid, listener: Alfid, init_check_code: u64, cookie: u64) {
		let Some(item) = self.manager.get_mut(alfid) else { return };
		let Some(peer_addr) = item.peer_addr else { return };

		let initial_sn = item.cb.get().send_window.next_sn.load(Ordering::Acquire);
		let salt = item.cb.get().connect.salt.load(Ordering::Acquire);

		let req = ConnectRequest {
			init: InitiateRequest {
				hs: PacketHeader { op_code: OpCode::CONNECT_REQUEST, major: 0, offset: (core::mem::size_of::<ConnectRequest>() as u16).into() },
				salt: salt.into(),
				time_stamp: now_micros().into(),
				init_check_code: init_check_code.into(),
			},
			params: ConnectParam {
				h: OptionalHeader { op_code: OpCode::PEER_SUBNETS, mark: 0, length: (core::mem::size_of::<ConnectParam>() as u16).into() },
				id_listener: listener,
				subnets: core::array::from_fn(|_| 0u64.into()),
			},
			initial_sn: initial_sn.into(),
			time_delta: 0i32.into(),
			cookie: cookie.into(),
		};

		let bytes = utils::bytes::as_slice::<u8, _>(&req);
		let pair = AlfidPair { source: item.alfids.source, peer: item.alfids.peer };
		if let Err(err) = self.transport.send_to(peer_addr, pair, bytes) {
			warn!("send_to (CONNECT_REQUEST) failed: {err}");
			return;
		}

		item.cb.get().profiling.record_sent();
	}

	fn send_keep_alive(&mut self, alfid: Alfid) {
		let Some(item) = self.manager.get(alfid) else { return };
		let ack_seq_no = item.cb.get().recv_window.expected_sn.load(Ordering::Acquire);
		let latest_sn = item.cb.get().recv_window.next_sn.load(Ordering::Acquire);

		let snack = SelectiveNack {
			h: OptionalHeader { op_code: OpCode::SELECTIVE_NACK, mark: core::mem::size_of::<NormalPacketHeader>() as u8, length: (core::mem::size_of::<SelectiveNack>() as u16).into() },
			ack_seq_no: ack_seq_no.into(),
			latest_sn: latest_sn.into(),
			t_lazy_ack: 0u32.into(),
		};

		let bytes = utils::bytes::as_slice::<u8, _>(&snack).to_vec();
		self.send_normal_packet(alfid, OpCode::KEEP_ALIVE, false, &bytes);
	}

	fn arm_keep_alive(&mut self, cx: CX![], alfid: Alfid) {
		let actor = cx.access_actor().clone();
		timer::schedule(cx, actor, alfid, EventKind::KeepAlive, timer::deadline_for(EventKind::KeepAlive, Duration::ZERO), |service, cx, socket, _kind| {
			service.send_keep_alive(socket);
			service.arm_keep_alive(cx, socket);
		});
	}
}

fn empty_facts(op_code: OpCode) -> PacketFacts {
	PacketFacts {
		op_code,
		transaction_ended: false,
		ack_flush_covers_commit: true,
		peer_also_committed: false,
		is_multiplied_child_first_persist: false,
		parent_last_send_committed: false,
	}
}

/// Derives the bootstrap AEAD key from the handshake's exchanged `initCheckCode`/`cookie`
/// pair, reusing `fsp_icc::kdf::derive_rekeyed`'s hash-expansion rather than inventing a new
/// primitive: the two 64-bit values stand in for "master key material" the same way an
/// installed master key would, until (if ever) `InstallMasterKey` supplies a real one.
fn bootstrap_icc(init_check_code: u64, cookie: u64, crc_seed: u64) -> SessionIcc {
	let mut material = [0u8; 32];
	material[0..8].copy_from_slice(&init_check_code.to_be_bytes());
	material[8..16].copy_from_slice(&cookie.to_be_bytes());

	let key = fsp_icc::kdf::derive_rekeyed(&material, 0);
	SessionIcc::new(IccContext::new(key, 0, crc_seed, u64::MAX), 0)
}

fn now_micros() -> u64 {
	std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_micros() as u64
}

fn decode_hex_key(hex: &str) -> Option<[u8; 32]> {
	if hex.len() != 64 {
		return None;
	}

	let mut key = [0u8; 32];
	for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
		let byte_str = core::str::from_utf8(chunk).ok()?;
		key[i] = u8::from_str_radix(byte_str, 16).ok()?;
	}
	Some(key)
}

fn parse_snack(payload: &[u8]) -> Option<(u32, Vec<GapDescriptor>)> {
	let hdr_len = core::mem::size_of::<NormalPacketHeader>();
	let snack_len = core::mem::size_of::<SelectiveNack>();

	let body = payload.get(hdr_len..)?;
	if body.len() < snack_len {
		return None;
	}

	let snack_hdr = utils::bytes::cast::<SelectiveNack, _>(&body[..snack_len]);
	let gaps: &[GapDescriptor] = utils::bytes::as_slice(&body[snack_len..]);

	Some((snack_hdr.ack_seq_no.get(), gaps.to_vec()))
}
