//! Per-connection profiling counters (`SPEC_FULL.md` §3, grounded on
//! `examples/original_source/src/FSP.h`'s `CSocketPerformance`). Carried in the shared
//! control block itself so both LIB and SVC observe the same counts regardless of which
//! process asks: SVC is the only writer (it owns the send/receive path), LIB only reads.

use core::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};

/// Depth of the `rtt_jitter_us` ring (`SPEC_FULL.md` §3's "last few jitter samples").
pub const JITTER_SAMPLES: usize = 8;

/// Plain per-field atomics, same rationale as `window::SendWindow`/`RecvWindow`: SVC is the
/// sole writer, so these only need to give LIB a well-defined cross-process read.
#[derive(Default)]
pub struct ProfilingCounters {
	pub packets_received: AtomicU64,
	pub packets_accepted: AtomicU64,
	pub packets_sent: AtomicU64,
	pub packets_resent: AtomicU64,
	pub zero_window_probes_sent: AtomicU64,
	pub zero_window_probes_received: AtomicU64,
	pub keep_alive_lock_failures: AtomicU64,
	jitter_us: [AtomicI32; JITTER_SAMPLES],
	jitter_cursor: AtomicU32,
}

impl ProfilingCounters {
	pub fn record_received(&self) {
		self.packets_received.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_accepted(&self) {
		self.packets_accepted.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_sent(&self) {
		self.packets_sent.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_resent(&self) {
		self.packets_resent.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_zero_window_probe_sent(&self) {
		self.zero_window_probes_sent.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_zero_window_probe_received(&self) {
		self.zero_window_probes_received.fetch_add(1, Ordering::Relaxed);
	}

	pub fn record_keep_alive_lock_failure(&self) {
		self.keep_alive_lock_failures.fetch_add(1, Ordering::Relaxed);
	}

	/// Records one RTT jitter sample (`measured_rtt - smoothed_rtt`, in microseconds) into
	/// the ring, overwriting the oldest entry.
	pub fn record_jitter_us(&self, jitter_us: i32) {
		let slot = self.jitter_cursor.fetch_add(1, Ordering::Relaxed) as usize % JITTER_SAMPLES;
		self.jitter_us[slot].store(jitter_us, Ordering::Relaxed);
	}

	#[must_use]
	pub fn jitter_snapshot(&self) -> [i32; JITTER_SAMPLES] {
		core::array::from_fn(|i| self.jitter_us[i].load(Ordering::Relaxed))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn counters_start_at_zero() {
		let c = ProfilingCounters::default();
		assert_eq!(c.packets_received.load(Ordering::Relaxed), 0);
		assert_eq!(c.jitter_snapshot(), [0i32; JITTER_SAMPLES]);
	}

	#[test]
	fn record_increments_matching_counter_only() {
		let c = ProfilingCounters::default();
		c.record_received();
		c.record_received();
		c.record_sent();
		assert_eq!(c.packets_received.load(Ordering::Relaxed), 2);
		assert_eq!(c.packets_sent.load(Ordering::Relaxed), 1);
		assert_eq!(c.packets_resent.load(Ordering::Relaxed), 0);
	}

	#[test]
	fn jitter_ring_wraps_and_overwrites_oldest() {
		let c = ProfilingCounters::default();
		for i in 0..(JITTER_SAMPLES as i32 + 3) {
			c.record_jitter_us(i);
		}
		// The ring has wrapped past its start three times over; the oldest three samples
		// (0, 1, 2) were overwritten by (JITTER_SAMPLES, JITTER_SAMPLES+1, JITTER_SAMPLES+2).
		let snapshot = c.jitter_snapshot();
		assert_eq!(snapshot[0], JITTER_SAMPLES as i32);
		assert_eq!(snapshot[1], JITTER_SAMPLES as i32 + 1);
		assert_eq!(snapshot[2], JITTER_SAMPLES as i32 + 2);
	}
}
