//! SELECTIVE_NACK processing against the send window (`spec.md` §4.4, scenario 3 of §8).
//!
//! A SNACK names an accumulative `expectedSN` plus a run of `{gapWidth, dataLength}` pairs
//! (`fsp_proto::packet::GapDescriptor`): `gapWidth` consecutive missing SNs followed by
//! `dataLength` consecutive received SNs, repeated, starting immediately after `expectedSN`.

use fsp_proto::packet::GapDescriptor;

/// Outcome of folding one SNACK into the send window: which SNs (relative to `expectedSN`,
/// in absolute send-sequence-number terms) are now known to be missing and candidates for
/// retransmission, and how far the accumulative ack allows `sendWindowFirstSN` to advance.
pub struct SnackOutcome {
	/// SNs to retransmit, in ascending order.
	pub missing: Vec<u32>,
	/// New value for `sendWindowFirstSN`: `expectedSN` itself, since everything below it is
	/// acknowledged by definition.
	pub new_first_sn: u32,
}

/// Folds a SNACK's gap descriptors into retransmit candidates. `expected_sn` is the SNACK's
/// accumulative ack; `next_sn` bounds the scan (nothing at or above `next_sn` has ever been
/// sent, so the gap walk stops there even if descriptors claim otherwise).
#[must_use]
pub fn process(expected_sn: u32, gaps: &[GapDescriptor], next_sn: u32) -> SnackOutcome {
	let mut missing = Vec::new();
	let mut sn = expected_sn;

	for gap in gaps {
		let gap_width = gap.gap_width.get();
		let data_length = gap.data_length.get();

		for _ in 0..gap_width {
			if sn >= next_sn {
				break;
			}
			missing.push(sn);
			sn = sn.wrapping_add(1);
		}

		sn = sn.saturating_add(data_length).min(next_sn);
	}

	SnackOutcome { missing, new_first_sn: expected_sn }
}

#[cfg(test)]
mod tests {
	use fsp_proto::packet::GapDescriptor;

	use super::*;

	fn gap(gap_width: u32, data_length: u32) -> GapDescriptor {
		GapDescriptor { gap_width: gap_width.into(), data_length: data_length.into() }
	}

	#[test]
	fn scenario_3_two_isolated_gaps_yield_exactly_those_two_sns() {
		// sent 100..109, everything received except 103 and 106.
		let outcome = process(103, &[gap(1, 2), gap(1, 3)], 110);
		assert_eq!(outcome.missing, vec![103, 106]);
		assert_eq!(outcome.new_first_sn, 103);
	}

	#[test]
	fn gap_descriptors_never_report_sns_at_or_past_next_sn() {
		let outcome = process(8, &[gap(10, 0)], 10);
		assert_eq!(outcome.missing, vec![8, 9]);
	}

	#[test]
	fn no_gaps_means_fully_acknowledged_run() {
		let outcome = process(110, &[], 110);
		assert!(outcome.missing.is_empty());
		assert_eq!(outcome.new_first_sn, 110);
	}
}
