//! Multi-homing and mobility (`spec.md` §4.7): local interface enumeration, peer subnet
//! tracking, and outbound path selection in scope-preference order.

use core::net::{IpAddr, Ipv6Addr};

use fsp_proto::packet::MAX_PHY_INTERFACES;

/// Scope classes in the fixed preference order used for path selection
/// (`spec.md` §4.7: "link-local → 6to4 → Teredo → ULA → global").
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Scope {
	LinkLocal = 0,
	SixToFour = 1,
	Teredo = 2,
	UniqueLocal = 3,
	Global = 4,
}

#[must_use]
pub fn scope_of(addr: IpAddr) -> Scope {
	match addr {
		IpAddr::V4(_) => Scope::Global,
		IpAddr::V6(v6) => scope_of_v6(v6),
	}
}

fn scope_of_v6(addr: Ipv6Addr) -> Scope {
	let segs = addr.segments();

	if addr.is_unicast_link_local() {
		Scope::LinkLocal
	} else if segs[0] == 0x2002 {
		Scope::SixToFour
	} else if segs[0] == 0x2001 && segs[1] == 0x0000 {
		Scope::Teredo
	} else if (segs[0] & 0xfe00) == 0xfc00 {
		Scope::UniqueLocal
	} else {
		Scope::Global
	}
}

/// Up to `MAX_PHY_INTERFACES` local addresses recorded at listen time, together with their
/// scope for path selection.
#[derive(Default, Clone)]
pub struct LocalInterfaces {
	addrs: Vec<IpAddr>,
}

impl LocalInterfaces {
	pub fn push(&mut self, addr: IpAddr) {
		if self.addrs.len() < MAX_PHY_INTERFACES {
			self.addrs.push(addr);
		}
	}

	/// Enumerates the host's local addresses via `getifaddrs`, keeping at most
	/// `MAX_PHY_INTERFACES`. Grounded on the interface-walking pattern implied by
	/// `PEER_SUBNETS` in `examples/original_source/src/FSP.h`; `libc::getifaddrs` is the
	/// standard POSIX call for this, used because nothing in the adopted stack already wraps
	/// it.
	#[cfg(unix)]
	pub fn enumerate() -> std::io::Result<Self> {
		use std::ptr;

		let mut head: *mut libc::ifaddrs = ptr::null_mut();

		// SAFETY: `head` is a valid out-pointer; freed via `freeifaddrs` below on success.
		if unsafe { libc::getifaddrs(&mut head) } != 0 {
			return Err(std::io::Error::last_os_error());
		}

		let mut this = Self::default();
		let mut cur = head;

		while !cur.is_null() {
			// SAFETY: `cur` is non-null and was populated by `getifaddrs`.
			let ifa = unsafe { &*cur };

			if let Some(addr) = sockaddr_to_ip(ifa.ifa_addr) {
				if !addr.is_loopback() {
					this.push(addr);
				}
			}

			cur = ifa.ifa_next;
		}

		// SAFETY: `head` was populated by a successful `getifaddrs` call above.
		unsafe { libc::freeifaddrs(head) };

		Ok(this)
	}

	/// Picks the local address whose scope matches `dest` best, per the fixed preference
	/// order. Returns `None` if no recorded local address shares a comparable scope.
	#[must_use]
	pub fn select_path(&self, dest: IpAddr) -> Option<IpAddr> {
		let want = scope_of(dest);

		self.addrs
			.iter()
			.copied()
			.filter(|a| scope_of(*a) == want || scope_of(*a) == Scope::Global)
			.min_by_key(|a| scope_of(*a))
	}

	#[must_use]
	pub fn as_slice(&self) -> &[IpAddr] {
		&self.addrs
	}
}

#[cfg(unix)]
fn sockaddr_to_ip(sa: *mut libc::sockaddr) -> Option<IpAddr> {
	if sa.is_null() {
		return None;
	}

	// SAFETY: `sa` is non-null and was populated by `getifaddrs`, which guarantees a valid
	// `sa_family`-tagged sockaddr of the matching concrete type.
	unsafe {
		match (*sa).sa_family as i32 {
			libc::AF_INET => {
				let sin = sa.cast::<libc::sockaddr_in>();
				let ip = u32::from_be((*sin).sin_addr.s_addr);
				Some(IpAddr::from(core::net::Ipv4Addr::from(ip)))
			}
			libc::AF_INET6 => {
				let sin6 = sa.cast::<libc::sockaddr_in6>();
				Some(IpAddr::from(Ipv6Addr::from((*sin6).sin6_addr.s6_addr)))
			}
			_ => None,
		}
	}
}

/// The peer's announced subnet prefixes, arriving in `CONNECT_REQUEST` or a `PEER_SUBNETS`
/// extension (`spec.md` §4.7).
#[derive(Default, Clone)]
pub struct PeerSubnets {
	prefixes: [u64; MAX_PHY_INTERFACES],
	count: usize,
	/// The current "favorite" return path: updated when a validated packet arrives from a
	/// different peer source address than previously recorded.
	favorite: Option<IpAddr>,
}

impl PeerSubnets {
	pub fn announce(&mut self, prefixes: &[u64]) {
		self.count = prefixes.len().min(MAX_PHY_INTERFACES);
		self.prefixes[..self.count].copy_from_slice(&prefixes[..self.count]);
	}

	#[must_use]
	pub fn prefixes(&self) -> &[u64] {
		&self.prefixes[..self.count]
	}

	/// Updates the favorite return path on a validated packet's source address
	/// (`spec.md` §4.7: "A change in peer source address on a validated packet triggers an
	/// update of the 'favorite' return path").
	pub fn note_source(&mut self, src: IpAddr) -> bool {
		let changed = self.favorite != Some(src);
		self.favorite = Some(src);
		changed
	}

	#[must_use]
	pub fn favorite(&self) -> Option<IpAddr> {
		self.favorite
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scope_classification_matches_preference_order() {
		assert_eq!(scope_of("fe80::1".parse().unwrap()), Scope::LinkLocal);
		assert_eq!(scope_of("2002::1".parse().unwrap()), Scope::SixToFour);
		assert_eq!(scope_of("2001:0:1::1".parse().unwrap()), Scope::Teredo);
		assert_eq!(scope_of("fd00::1".parse().unwrap()), Scope::UniqueLocal);
		assert_eq!(scope_of("2001:db8::1".parse().unwrap()), Scope::Global);
	}

	#[test]
	fn path_selection_prefers_matching_scope() {
		let mut ifaces = LocalInterfaces::default();
		ifaces.push("fe80::1".parse().unwrap());
		ifaces.push("2001:db8::aaaa".parse().unwrap());

		let picked = ifaces.select_path("fe80::2".parse().unwrap());
		assert_eq!(picked, Some("fe80::1".parse().unwrap()));
	}

	#[test]
	fn favorite_path_updates_only_on_address_change() {
		let mut peer = PeerSubnets::default();
		assert!(peer.note_source("2001:db8::1".parse().unwrap()));
		assert!(!peer.note_source("2001:db8::1".parse().unwrap()));
		assert!(peer.note_source("2001:db8::2".parse().unwrap()));
	}

	#[test]
	fn interface_list_caps_at_max_phy_interfaces() {
		let mut ifaces = LocalInterfaces::default();
		for i in 0..8u16 {
			ifaces.push(IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, i)));
		}
		assert_eq!(ifaces.as_slice().len(), MAX_PHY_INTERFACES);
	}
}
