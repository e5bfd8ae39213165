//! Send-side rate pacing and RTT/RTO estimation (`spec.md` §4.4).
//!
//! Grounded on `examples/original_source/src/FSP_SRV/FSP_SRV.h`'s `sendRate_Bpus`/`quotaLeft`
//! fields and `RTT_LOG_CAPACITY`; the RTO formula (smoothed RTT + 4x variance, clamped to
//! [1s, 60s]) follows the classic Jacobson/Karels estimator used throughout the source tree.

use core::time::Duration;

/// `examples/original_source/src/FSP.h`: `RETRANSMIT_MIN_TIMEOUT_us`.
pub const RETRANSMIT_MIN: Duration = Duration::from_secs(1);
/// `examples/original_source/src/FSP.h`: `RETRANSMIT_MAX_TIMEOUT_us`.
pub const RETRANSMIT_MAX: Duration = Duration::from_secs(60);

const SLOW_START_WINDOW_SIZE: u32 = 4;

/// Smoothed RTT / RTT-variance estimator, refreshed on every acknowledged round trip.
pub struct RttEstimator {
	srtt: Option<f64>,
	rttvar: f64,
}

impl Default for RttEstimator {
	fn default() -> Self {
		Self { srtt: None, rttvar: 0.0 }
	}
}

impl RttEstimator {
	/// Folds in one freshly-measured round-trip sample, in microseconds.
	pub fn sample(&mut self, measured_us: f64) {
		match self.srtt {
			None => {
				self.srtt = Some(measured_us);
				self.rttvar = measured_us / 2.0;
			}
			Some(srtt) => {
				self.rttvar = 0.75 * self.rttvar + 0.25 * (srtt - measured_us).abs();
				self.srtt = Some(0.875 * srtt + 0.125 * measured_us);
			}
		}
	}

	/// Retransmission timeout: `srtt + 4 * rttvar`, clamped to `[1s, 60s]`. Before any sample
	/// has been taken, returns the minimum.
	#[must_use]
	pub fn rto(&self) -> Duration {
		let Some(srtt) = self.srtt else { return RETRANSMIT_MIN };

		let us = srtt + 4.0 * self.rttvar;
		let d = Duration::from_micros(us.max(0.0) as u64);

		d.clamp(RETRANSMIT_MIN, RETRANSMIT_MAX)
	}

	#[must_use]
	pub fn smoothed_rtt(&self) -> Option<Duration> {
		self.srtt.map(|us| Duration::from_micros(us.max(0.0) as u64))
	}
}

/// Byte-rate pacer: refills `quota_left` by `rate_bpus * elapsed` every tick, halves the rate
/// on loss, and grows it slowly in the absence of loss. `rate_bpus` is in bytes per
/// microsecond, matching the source's `sendRate_Bpus` naming.
pub struct Pacer {
	rate_bpus: f64,
	quota_left: f64,
}

impl Pacer {
	/// `rate_bpus` starts at `MAX_BLOCK_SIZE * SLOW_START_WINDOW_SIZE / initial_rtt`
	/// (`spec.md` §4.4).
	#[must_use]
	pub fn new(max_block_size: usize, initial_rtt: Duration) -> Self {
		let rtt_us = initial_rtt.as_micros().max(1) as f64;
		let rate_bpus = (max_block_size as f64 * f64::from(SLOW_START_WINDOW_SIZE)) / rtt_us;

		Self { rate_bpus, quota_left: 0.0 }
	}

	/// Refills the quota for `elapsed` time having passed since the last tick.
	pub fn tick(&mut self, elapsed: Duration) {
		self.quota_left += self.rate_bpus * elapsed.as_micros() as f64;
	}

	/// Whether a packet of `len` bytes may be emitted right now.
	#[must_use]
	pub fn can_send(&self, len: usize) -> bool {
		self.quota_left >= len as f64
	}

	/// Debits the quota for an emitted packet. Caller must have checked `can_send` first.
	pub fn spend(&mut self, len: usize) {
		self.quota_left -= len as f64;
	}

	/// Additive growth while no loss is observed: nudges the rate up by a small fraction.
	pub fn grow(&mut self) {
		self.rate_bpus *= 1.02;
	}

	/// Halves the rate on detecting a gap in a SNACK (`spec.md` §4.4).
	pub fn on_loss_detected(&mut self) {
		self.rate_bpus = (self.rate_bpus / 2.0).max(1.0);
	}

	#[must_use]
	pub fn rate_bpus(&self) -> f64 {
		self.rate_bpus
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rto_starts_at_minimum_before_any_sample() {
		let est = RttEstimator::default();
		assert_eq!(est.rto(), RETRANSMIT_MIN);
	}

	#[test]
	fn rto_clamps_to_maximum_under_high_variance() {
		let mut est = RttEstimator::default();
		est.sample(1_000_000.0);
		est.sample(120_000_000.0);
		assert_eq!(est.rto(), RETRANSMIT_MAX);
	}

	#[test]
	fn pacer_can_send_only_after_quota_accrues() {
		let mut pacer = Pacer::new(1024, Duration::from_millis(100));
		assert!(!pacer.can_send(1024));
		pacer.tick(Duration::from_secs(1));
		assert!(pacer.can_send(1024));
		pacer.spend(1024);
	}

	#[test]
	fn loss_halves_rate_and_growth_increases_it() {
		let mut pacer = Pacer::new(1024, Duration::from_millis(100));
		let initial = pacer.rate_bpus();
		pacer.on_loss_detected();
		assert!(pacer.rate_bpus() < initial);
		let after_loss = pacer.rate_bpus();
		pacer.grow();
		assert!(pacer.rate_bpus() > after_loss);
	}
}
