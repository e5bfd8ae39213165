//! The service half of FSP (`spec.md` §2): the out-of-process engine that owns every live
//! connection's Control Block, runs the reliability/pacing/rekey/mobility machinery, and
//! talks to each LIB process over the IPC binding in `fsp_ipc`.

pub mod compress;
pub mod dispatch;
pub mod engine;
pub mod fsm;
pub mod manager;
pub mod mobility;
pub mod pacing;
pub mod snack;
pub mod socket;
pub mod timer;
pub mod transport;

pub use engine::Service;
pub use fsm::ConnState;
pub use manager::SocketManager;
pub use socket::SocketItem;

/// `examples/original_source/src/FSP.h`'s `DEFAULT_FSP_UDPPORT`, built from the ASCII
/// characters 'F' and 'S' (`spec.md` §6: "UDP/IPv4 port 18003").
pub const DEFAULT_FSP_UDP_PORT: u16 = 18003;

/// `examples/original_source/src/FSP.h`'s `IPPROTO_FSP` (`spec.md` §6: "IP protocol number
/// 144").
pub const IPPROTO_FSP: i32 = 144;
