//! Runtime configuration shared by both process halves (`SPEC_FULL.md` §2 "Configuration").
//!
//! The teacher carries no configuration crate in its dependency graph, so this follows its
//! own convention (`examples/DannyG-1952723-qlog-rs/src/writer.rs`'s `env::var("QLOGFILE")`)
//! rather than reaching for a TOML/clap-based config layer: a plain struct, built once at
//! process start from documented environment variables, with hard defaults when unset.

use core::time::Duration;

use crate::alfid::Alfid;

/// Which wire transport a process binds to (`spec.md` §6: native IPv6 protocol 144, or
/// UDP/IPv4 port 18003 as the tunneled alternative).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
	Ipv6Raw,
	UdpIpv4,
}

/// Process-wide configuration, constructed once by each binary's `main` and passed by
/// reference into the subsystems that need it (`spec.md` §9: global singletons are modeled
/// as lazily-initialized, reference-passed services rather than ambient statics).
#[derive(Debug, Clone)]
pub struct Config {
	pub transport: Transport,
	/// Prefix both the shared-memory region names and the command-channel socket path are
	/// built from, so multiple SVC instances can coexist on one host during testing.
	pub ipc_path_prefix: String,
	/// Override for `fsp_icc::FSP_REKEY_THRESHOLD`, used to reach the rekey boundary quickly
	/// in tests (`spec.md` §8 scenario 4: "with FSP_REKEY_THRESHOLD = 8 (reduced for test)").
	pub rekey_threshold: u32,
	/// Seed for the pacing engine's initial send rate before any RTT sample exists
	/// (`spec.md` §4.4: "the rate starts at MAX_BLOCK_SIZE × SLOW_START_WINDOW_SIZE /
	/// initialRTT").
	pub initial_rtt: Duration,
	/// The first non-well-known ALFID the socket manager is allowed to allocate; overridable
	/// so tests can pin ALFID allocation into a small, deterministic range.
	pub first_ephemeral_alfid: Alfid,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			transport: Transport::Ipv6Raw,
			ipc_path_prefix: "/tmp/fsp".to_owned(),
			rekey_threshold: 0x2000_0000,
			initial_rtt: Duration::from_millis(200),
			first_ephemeral_alfid: Alfid(Alfid::LAST_WELL_KNOWN.0 + 1),
		}
	}
}

impl Config {
	/// Builds a `Config` from environment variables, falling back to `Default::default()`
	/// for anything unset or unparsable (`SPEC_FULL.md` §2): `FSP_TRANSPORT` (`"ipv6"` or
	/// `"udp"`), `FSP_IPC_PATH_PREFIX`, `FSP_REKEY_THRESHOLD`, `FSP_INITIAL_RTT_MS`.
	#[must_use]
	pub fn from_env() -> Self {
		let defaults = Self::default();

		Self {
			transport: match std::env::var("FSP_TRANSPORT").as_deref() {
				Ok("udp") => Transport::UdpIpv4,
				Ok("ipv6") | Err(_) => Transport::Ipv6Raw,
				Ok(_) => {
					log::warn!("FSP_TRANSPORT not recognized, defaulting to ipv6");
					Transport::Ipv6Raw
				}
			},
			ipc_path_prefix: std::env::var("FSP_IPC_PATH_PREFIX").unwrap_or(defaults.ipc_path_prefix),
			rekey_threshold: std::env::var("FSP_REKEY_THRESHOLD").ok().and_then(|v| v.parse().ok()).unwrap_or(defaults.rekey_threshold),
			initial_rtt: std::env::var("FSP_INITIAL_RTT_MS")
				.ok()
				.and_then(|v| v.parse().ok())
				.map_or(defaults.initial_rtt, Duration::from_millis),
			first_ephemeral_alfid: defaults.first_ephemeral_alfid,
		}
	}

	/// The command-channel socket path derived from `ipc_path_prefix`
	/// (`spec.md` §4.8: "a datagram mailslot or UNIX socket").
	#[must_use]
	pub fn command_socket_path(&self) -> String {
		format!("{}-svc.sock", self.ipc_path_prefix)
	}

	/// The shared-memory region name for one connection's control block, derived from
	/// `ipc_path_prefix` and the connection's near/peer ALFID pair.
	#[must_use]
	pub fn shm_name(&self, near: Alfid, peer: Alfid) -> String {
		format!("{}-cb-{}-{}", self.ipc_path_prefix, near.0, peer.0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_config_matches_spec_defaults() {
		let cfg = Config::default();
		assert_eq!(cfg.transport, Transport::Ipv6Raw);
		assert_eq!(cfg.rekey_threshold, 0x2000_0000);
		assert_eq!(cfg.first_ephemeral_alfid, Alfid(65536));
	}

	#[test]
	fn shm_name_is_stable_for_a_given_alfid_pair() {
		let cfg = Config::default();
		assert_eq!(cfg.shm_name(Alfid(10), Alfid(20)), cfg.shm_name(Alfid(10), Alfid(20)));
		assert_ne!(cfg.shm_name(Alfid(10), Alfid(20)), cfg.shm_name(Alfid(10), Alfid(21)));
	}
}
