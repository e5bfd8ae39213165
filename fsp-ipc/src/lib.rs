//! IPC binding between the library half and the service half (`spec.md` §4.8): the shared-
//! memory control-block lifecycle and the command channel. The notice ring and backlog
//! ring themselves live inside `fsp_proto::control_block` since they're part of the CB
//! layout; this crate is only the OS-level plumbing that gets a CB mapped into both
//! processes and gets commands from LIB to SVC in the first place.

pub mod channel;
pub mod command;
pub mod shm;

pub use channel::{CommandListener, CommandSender};
pub use command::{CommandMessage, CommandOpcode};
pub use shm::SharedRegion;

/// Default path for SVC's command-channel mailslot (`spec.md` §4.8).
pub const DEFAULT_COMMAND_SOCKET_PATH: &str = "/tmp/fsp-svc.sock";
