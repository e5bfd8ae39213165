//! The library half of FSP (`spec.md` §2): linked into the application, exposing the public
//! API surface (`spec.md` §6) without ever owning a socket or a key. Every blocking call in
//! this crate is a suspension point (`spec.md` §5) that parks on the shared control block's
//! notice ring until SVC posts the notice the call is waiting for, or the timeout expires.

pub mod control;
pub mod listen;
pub mod recv;
pub mod send;
pub mod session;

pub use control::{fsp_control, get_peer_committed, install_master_key, translate_fsp_over_ipv4, wait_for_profiling, ControlCode, Extensions, ProfilingCounts};
pub use listen::{connect2, Listener};
pub use recv::RecvBuffer;
pub use send::SendBuffer;
pub use session::Connection;
