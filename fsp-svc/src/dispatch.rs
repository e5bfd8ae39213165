//! Opcode dispatch (`spec.md` §9: "Polymorphism over opcodes... use a tagged enum Opcode
//! and a single dispatch(packet) function with an exhaustive match").
//!
//! This is SVC's receive-path entry point once a packet has been demultiplexed to a
//! `SocketItem` by ALFID: it turns the opcode plus whatever the FSM needs to know about the
//! packet into an `fsm::Event`, applies it, and returns what the caller (the reactor) should
//! do next. The actual window placement (`spec.md` §4.5) and ICC verification (`spec.md`
//! §4.2) happen before this is reached; this module only owns the state transition and the
//! notice it implies.

use fsp_proto::control_block::notice::ServiceCode;
use fsp_proto::opcode::OpCode;

use crate::fsm::{self, ConnState, Event};

/// What SVC should do as a consequence of one dispatched packet.
pub struct Outcome {
	pub new_state: Option<ConnState>,
	pub notice: Option<ServiceCode>,
	pub send_ack_flush: bool,
}

impl Outcome {
	fn unchanged() -> Self {
		Self { new_state: None, notice: None, send_ack_flush: false }
	}
}

/// Facts about an accepted in-band/out-of-band packet needed to decide the FSM transition,
/// decoupled from the wire encoding so this module stays testable without constructing real
/// packet bytes.
pub struct PacketFacts {
	pub op_code: OpCode,
	pub transaction_ended: bool,
	pub ack_flush_covers_commit: bool,
	pub peer_also_committed: bool,
	pub is_multiplied_child_first_persist: bool,
	pub parent_last_send_committed: bool,
}

#[must_use]
pub fn dispatch(state: ConnState, facts: &PacketFacts) -> Outcome {
	let event = match facts.op_code {
		OpCode::CONNECT_REQUEST => Event::ValidConnectRequest,
		OpCode::ACK_INIT_CONNECT => Event::ValidAckInitConnect,
		OpCode::ACK_CONNECT_REQ => Event::ValidAckConnectReq { committed: facts.transaction_ended },
		OpCode::PERSIST if facts.is_multiplied_child_first_persist => Event::MultipliedFirstPersist {
			parent_last_send_committed: facts.parent_last_send_committed,
		},
		OpCode::PERSIST => Event::Persist { transaction_ended: facts.transaction_ended },
		OpCode::ACK_FLUSH => Event::AckFlushCoversCommit { peer_also_committed: facts.peer_also_committed },
		OpCode::RESET => Event::ValidReset,
		OpCode::RELEASE => Event::PeerRelease,
		OpCode::MULTIPLY => Event::Multiply,
		_ => return Outcome::unchanged(),
	};

	if !facts.ack_flush_covers_commit && matches!(event, Event::AckFlushCoversCommit { .. }) {
		return Outcome::unchanged();
	}

	let Some(new_state) = fsm::transition(state, &event) else {
		return Outcome::unchanged();
	};

	let notice = notice_for(state, new_state, facts);
	let send_ack_flush = matches!(event, Event::Persist { transaction_ended: true });

	Outcome { new_state: Some(new_state), notice, send_ack_flush }
}

fn notice_for(from: ConnState, to: ConnState, facts: &PacketFacts) -> Option<ServiceCode> {
	use ConnState::*;

	match (from, to) {
		(Listening, Challenging) => Some(ServiceCode::Accepting),
		(ConnectAffirming, Established | Committing) => Some(ServiceCode::Accepted),
		(Challenging, Closable) if facts.transaction_ended => Some(ServiceCode::PeerCommitted),
		(Established, PeerCommit) => Some(ServiceCode::PeerCommitted),
		(Committing, Committed) | (Committing2, Closable) => Some(ServiceCode::Flushed),
		(PreClosed, Closed) => Some(ServiceCode::ToFinish),
		(_, NonExistent) => Some(ServiceCode::Reset),
		(Established | Committing | Committed | PeerCommit | Committing2 | Closable, Established) => Some(ServiceCode::DataReady),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn facts(op_code: OpCode) -> PacketFacts {
		PacketFacts {
			op_code,
			transaction_ended: false,
			ack_flush_covers_commit: true,
			peer_also_committed: false,
			is_multiplied_child_first_persist: false,
			parent_last_send_committed: false,
		}
	}

	#[test]
	fn connect_request_moves_listener_to_challenging_with_accepting_notice() {
		let outcome = dispatch(ConnState::Listening, &facts(OpCode::CONNECT_REQUEST));
		assert_eq!(outcome.new_state, Some(ConnState::Challenging));
		assert_eq!(outcome.notice, Some(ServiceCode::Accepting));
	}

	#[test]
	fn persist_with_transaction_ended_schedules_ack_flush() {
		let mut f = facts(OpCode::PERSIST);
		f.transaction_ended = true;
		let outcome = dispatch(ConnState::Established, &f);
		assert_eq!(outcome.new_state, Some(ConnState::PeerCommit));
		assert!(outcome.send_ack_flush);
		assert_eq!(outcome.notice, Some(ServiceCode::PeerCommitted));
	}

	#[test]
	fn challenging_persist_with_transaction_ended_goes_straight_to_closable() {
		let mut f = facts(OpCode::PERSIST);
		f.transaction_ended = true;
		let outcome = dispatch(ConnState::Challenging, &f);
		assert_eq!(outcome.new_state, Some(ConnState::Closable));
		assert_eq!(outcome.notice, Some(ServiceCode::PeerCommitted));
	}

	#[test]
	fn reset_produces_reset_notice_regardless_of_originating_state() {
		let outcome = dispatch(ConnState::Established, &facts(OpCode::RESET));
		assert_eq!(outcome.new_state, Some(ConnState::NonExistent));
		assert_eq!(outcome.notice, Some(ServiceCode::Reset));
	}

	#[test]
	fn unrecognized_transition_leaves_state_untouched() {
		let outcome = dispatch(ConnState::Listening, &facts(OpCode::PERSIST));
		assert!(outcome.new_state.is_none());
		assert!(outcome.notice.is_none());
	}

	#[test]
	fn ack_flush_that_does_not_cover_the_commit_is_ignored() {
		let mut f = facts(OpCode::ACK_FLUSH);
		f.ack_flush_covers_commit = false;
		let outcome = dispatch(ConnState::Committing, &f);
		assert!(outcome.new_state.is_none());
	}
}
