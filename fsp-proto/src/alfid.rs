use macros::Cast;

/// Application Layer Fiber ID: names one endpoint of an FSP session, equivalent to the
/// historical "Upper Layer Thread ID".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Cast)]
#[repr(C)]
pub struct Alfid(pub u32);

impl Alfid {
	/// Last well-known ALFID; well-known IDs are compatible with TCP port numbers.
	pub const LAST_WELL_KNOWN: Self = Self(65535);

	#[must_use]
	pub const fn is_well_known(self) -> bool {
		self.0 <= Self::LAST_WELL_KNOWN.0
	}
}

impl From<u32> for Alfid {
	fn from(value: u32) -> Self {
		Self(value)
	}
}

impl From<Alfid> for u32 {
	fn from(value: Alfid) -> Self {
		value.0
	}
}

/// A source/peer ALFID pair, carried in the integrity union of a normal packet header and
/// used as the AAD-equivalent binding between a packet and the session that produced it.
#[derive(Clone, Copy, Cast)]
#[repr(C)]
pub struct AlfidPair {
	pub source: Alfid,
	pub peer: Alfid,
}
