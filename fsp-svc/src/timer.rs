//! A single internal scheduler replacing the hand-rolled OS-timer-callback thread pool
//! (`spec.md` §9): accepts `(deadline, socket_id, event_kind)` and delivers events to SVC's
//! actor, cancellable by socket id. Built directly on `stakker`'s own timer queue
//! (`cx.after`/`cx.timer_del`), the same primitive `examples/dspeyrer-net/net/src/dns/mod.rs`
//! uses for its retry timer.

use core::time::Duration;

use stakker::{Actor, FixedTimerKey, CX};

use fsp_proto::alfid::Alfid;

/// The kind of event a scheduled timer fires.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EventKind {
	/// Retransmission timeout elapsed for the oldest unacknowledged segment.
	Retransmit,
	/// Periodic keep-alive while the connection is otherwise idle.
	KeepAlive,
	/// A transient state (`CONNECT_BOOTSTRAP`/`CONNECT_AFFIRMING`/`CHALLENGING`) has
	/// outstayed `TRANSIENT_STATE_TIMEOUT_ms`.
	TransientStateTimeout,
	/// `COMMITTING_TIMEOUT_ms` elapsed without the peer's `ACK_FLUSH`.
	CommittingTimeout,
	/// `CLOSING_TIME_WAIT_ms` elapsed in `PRE_CLOSED`.
	ClosingTimeWait,
	/// `SESSION_IDLE_TIMEOUT_us` elapsed with no traffic at all.
	SessionIdle,
	/// Socket is past `RECYCLABLE_TIMEOUT` after reaching `CLOSED`/being reset; free it.
	Recycle,
}

/// `examples/original_source/src/FSP.h`'s `TRANSIENT_STATE_TIMEOUT_ms`: 5 minutes under
/// `_DEBUG`, 1 minute otherwise, reproduced here as a `cfg(debug_assertions)` branch.
#[cfg(debug_assertions)]
pub const TRANSIENT_STATE_TIMEOUT: Duration = Duration::from_secs(300);
#[cfg(not(debug_assertions))]
pub const TRANSIENT_STATE_TIMEOUT: Duration = Duration::from_secs(60);
/// `examples/original_source/src/FSP.h`'s `COMMITTING_TIMEOUT_ms`.
pub const COMMITTING_TIMEOUT: Duration = Duration::from_secs(90);
/// `examples/original_source/src/FSP.h`'s `CLOSING_TIME_WAIT_ms`.
pub const CLOSING_TIME_WAIT: Duration = Duration::from_secs(120);
/// `examples/original_source/src/FSP.h`'s `SESSION_IDLE_TIMEOUT_us`.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(4 * 3600);
/// Linger window before a recycled socket's CB is actually freed (`spec.md` §5).
pub const RECYCLABLE_TIMEOUT: Duration = Duration::from_secs(30);

#[must_use]
pub const fn deadline_for(kind: EventKind, rto: Duration) -> Duration {
	match kind {
		EventKind::Retransmit => rto,
		EventKind::KeepAlive => Duration::from_secs(20),
		EventKind::TransientStateTimeout => TRANSIENT_STATE_TIMEOUT,
		EventKind::CommittingTimeout => COMMITTING_TIMEOUT,
		EventKind::ClosingTimeWait => CLOSING_TIME_WAIT,
		EventKind::SessionIdle => SESSION_IDLE_TIMEOUT,
		EventKind::Recycle => RECYCLABLE_TIMEOUT,
	}
}

/// One outstanding timer, tracked so it can be cancelled by socket id when the connection
/// makes progress before the deadline (e.g. an ACK arrives before the retransmit timer
/// fires).
pub struct Scheduled {
	pub socket: Alfid,
	pub kind: EventKind,
	key: FixedTimerKey,
}

/// Arms a timer that, on expiry, applies `on_fire` to `actor` with the `(socket, kind)` pair
/// that was scheduled. Returns the handle needed to cancel it early via `cancel`.
pub fn schedule<T: 'static>(cx: CX![T], actor: Actor<T>, socket: Alfid, kind: EventKind, after: Duration, on_fire: impl FnOnce(&mut T, CX![T], Alfid, EventKind) + 'static) -> Scheduled {
	let key = cx.after(after, move |s| {
		actor.apply(s, move |state, cx| on_fire(state, cx, socket, kind));
	});

	Scheduled { socket, kind, key }
}

/// Cancels a previously scheduled timer. A no-op if it already fired.
pub fn cancel<T>(cx: CX![T], scheduled: Scheduled) {
	cx.timer_del(scheduled.key);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn deadlines_match_source_constants() {
		assert_eq!(deadline_for(EventKind::TransientStateTimeout, Duration::ZERO), TRANSIENT_STATE_TIMEOUT);
		assert_eq!(deadline_for(EventKind::CommittingTimeout, Duration::ZERO), COMMITTING_TIMEOUT);
		assert_eq!(deadline_for(EventKind::ClosingTimeWait, Duration::ZERO), CLOSING_TIME_WAIT);
		assert_eq!(deadline_for(EventKind::SessionIdle, Duration::ZERO), SESSION_IDLE_TIMEOUT);
	}

	#[test]
	fn retransmit_deadline_tracks_the_current_rto() {
		let rto = Duration::from_millis(1500);
		assert_eq!(deadline_for(EventKind::Retransmit, rto), rto);
	}
}
