//! The 15-state connection state machine (`spec.md` §4.3). Distinct from
//! `fsp_proto::state::State`, which only carries the raw numeric tag as it appears on the
//! wire/in the CB; this enum is SVC's own view, used to drive transitions and to decide what
//! to do with an incoming packet or API call before the numeric tag is written back into the
//! CB's `StateCache`.

use fsp_proto::state::State as Wire;

/// One of the fifteen connection states. Initial state is `NonExistent`; terminal state is
/// `Closed`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConnState {
	NonExistent,
	Listening,
	ConnectBootstrap,
	ConnectAffirming,
	Challenging,
	Cloning,
	Established,
	Committing,
	Committed,
	PeerCommit,
	Committing2,
	Closable,
	ShutRequested,
	PreClosed,
	Closed,
}

impl ConnState {
	#[must_use]
	pub const fn to_wire(self) -> Wire {
		match self {
			Self::NonExistent => Wire::NON_EXISTENT,
			Self::Listening => Wire::LISTENING,
			Self::ConnectBootstrap => Wire::CONNECT_BOOTSTRAP,
			Self::ConnectAffirming => Wire::CONNECT_AFFIRMING,
			Self::Challenging => Wire::CHALLENGING,
			Self::Cloning => Wire::CLONING,
			Self::Established => Wire::ESTABLISHED,
			Self::Committing => Wire::COMMITTING,
			Self::Committed => Wire::COMMITTED,
			Self::PeerCommit => Wire::PEER_COMMIT,
			Self::Committing2 => Wire::COMMITTING2,
			Self::Closable => Wire::CLOSABLE,
			Self::ShutRequested => Wire::SHUT_REQUESTED,
			Self::PreClosed => Wire::PRE_CLOSED,
			Self::Closed => Wire::CLOSED,
		}
	}

	/// A connection may be multiplied (MULTIPLY) while in any of these states
	/// (`spec.md` §4.3: "any 'alive' state (ESTABLISHED through CLOSABLE)").
	#[must_use]
	pub const fn is_alive(self) -> bool {
		matches!(
			self,
			Self::Established | Self::Committing | Self::Committed | Self::PeerCommit | Self::Committing2 | Self::Closable
		)
	}

	/// Whether a valid RESET in this state drives the connection back to `NonExistent`
	/// (`spec.md` §4.3: "any non-LISTENING state receiving a valid RESET").
	#[must_use]
	pub const fn accepts_reset(self) -> bool {
		!matches!(self, Self::NonExistent | Self::Listening)
	}
}

/// The events that drive a transition: an API call from LIB, an accepted packet from the
/// wire, or an expired timer.
pub enum Event {
	Connect,
	ValidAckInitConnect,
	ValidConnectRequest,
	ValidAckConnectReq { committed: bool },
	Persist { transaction_ended: bool },
	LocalTransactionEnded,
	AckFlushCoversCommit { peer_also_committed: bool },
	LocalShutdown,
	PeerRelease,
	ValidReset,
	Multiply,
	MultipliedFirstPersist { parent_last_send_committed: bool },
}

/// Applies one transition. Returns `None` if the event has no effect in the current state
/// (the packet/call is either a duplicate, premature, or simply not relevant to the FSM and
/// should be handled by its own local-recoverable path instead).
#[must_use]
pub fn transition(state: ConnState, event: &Event) -> Option<ConnState> {
	use ConnState::*;
	use Event::*;

	if matches!(event, ValidReset) && state.accepts_reset() {
		return Some(NonExistent);
	}

	match (state, event) {
		(NonExistent, Connect) => Some(ConnectBootstrap),
		(ConnectBootstrap, ValidAckInitConnect) => Some(ConnectAffirming),
		(ConnectAffirming, ValidAckConnectReq { committed }) => Some(if *committed { Committing } else { Established }),

		(Listening, ValidConnectRequest) => Some(Challenging),

		(Challenging, Persist { transaction_ended: false }) => Some(Established),
		(Challenging, Persist { transaction_ended: true }) => Some(Closable),
		(Established, Persist { transaction_ended: false }) => Some(Established),
		(Established, Persist { transaction_ended: true }) => Some(PeerCommit),

		(Established, LocalTransactionEnded) => Some(Committing),
		(Committing, AckFlushCoversCommit { peer_also_committed: false }) => Some(Committed),
		(Committing, AckFlushCoversCommit { peer_also_committed: true }) => Some(Committing2),
		(Committing2, AckFlushCoversCommit { .. }) => Some(Closable),
		(PeerCommit, LocalTransactionEnded) => Some(Committing2),

		(Closable, LocalShutdown) => Some(PreClosed),
		(PreClosed, PeerRelease) => Some(Closed),
		(ShutRequested, PeerRelease) => Some(PreClosed),

		(s, Multiply) if s.is_alive() => Some(Cloning),
		(Cloning, MultipliedFirstPersist { parent_last_send_committed: true }) => Some(Committed),
		(Cloning, MultipliedFirstPersist { parent_last_send_committed: false }) => Some(Established),

		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn initiator_bootstrap_reaches_established() {
		let mut s = ConnState::NonExistent;
		s = transition(s, &Event::Connect).unwrap();
		assert_eq!(s, ConnState::ConnectBootstrap);
		s = transition(s, &Event::ValidAckInitConnect).unwrap();
		assert_eq!(s, ConnState::ConnectAffirming);
		s = transition(s, &Event::ValidAckConnectReq { committed: false }).unwrap();
		assert_eq!(s, ConnState::Established);
	}

	#[test]
	fn responder_side_reaches_challenging_then_closable_on_committed_persist() {
		let mut s = ConnState::Listening;
		s = transition(s, &Event::ValidConnectRequest).unwrap();
		assert_eq!(s, ConnState::Challenging);
		s = transition(s, &Event::Persist { transaction_ended: true }).unwrap();
		assert_eq!(s, ConnState::Closable);
	}

	#[test]
	fn peer_commit_only_closes_after_the_local_side_commits_too() {
		let mut s = ConnState::Established;
		s = transition(s, &Event::Persist { transaction_ended: true }).unwrap();
		assert_eq!(s, ConnState::PeerCommit);
		assert!(s.is_alive());

		// A stray AckFlush before the local side has committed anything is not
		// a recognized transition out of PeerCommit.
		assert_eq!(transition(s, &Event::AckFlushCoversCommit { peer_also_committed: true }), None);

		s = transition(s, &Event::LocalTransactionEnded).unwrap();
		assert_eq!(s, ConnState::Committing2);
		s = transition(s, &Event::AckFlushCoversCommit { peer_also_committed: true }).unwrap();
		assert_eq!(s, ConnState::Closable);
	}

	#[test]
	fn commit_sequence_with_peer_also_committing() {
		let mut s = ConnState::Established;
		s = transition(s, &Event::LocalTransactionEnded).unwrap();
		assert_eq!(s, ConnState::Committing);
		s = transition(s, &Event::AckFlushCoversCommit { peer_also_committed: true }).unwrap();
		assert_eq!(s, ConnState::Committing2);
		s = transition(s, &Event::AckFlushCoversCommit { peer_also_committed: true }).unwrap();
		assert_eq!(s, ConnState::Closable);
	}

	#[test]
	fn reset_from_any_non_listening_state_returns_to_non_existent() {
		assert_eq!(transition(ConnState::Established, &Event::ValidReset), Some(ConnState::NonExistent));
		assert_eq!(transition(ConnState::Committed, &Event::ValidReset), Some(ConnState::NonExistent));
		assert_eq!(transition(ConnState::Listening, &Event::ValidReset), None);
	}

	#[test]
	fn graceful_close_sequence() {
		let mut s = ConnState::Closable;
		s = transition(s, &Event::LocalShutdown).unwrap();
		assert_eq!(s, ConnState::PreClosed);
		s = transition(s, &Event::PeerRelease).unwrap();
		assert_eq!(s, ConnState::Closed);
	}

	#[test]
	fn multiply_requires_alive_state_and_resolves_shouldappendcommit() {
		assert_eq!(transition(ConnState::Listening, &Event::Multiply), None);
		let cloning = transition(ConnState::Established, &Event::Multiply).unwrap();
		assert_eq!(cloning, ConnState::Cloning);

		let committed = transition(cloning, &Event::MultipliedFirstPersist { parent_last_send_committed: true }).unwrap();
		assert_eq!(committed, ConnState::Committed);

		let established = transition(cloning, &Event::MultipliedFirstPersist { parent_last_send_committed: false }).unwrap();
		assert_eq!(established, ConnState::Established);
	}
}
