//! The SVC process entry point (`spec.md` §2, §5): bootstraps the stakker runtime, installs
//! the shared logger, and runs the `Service` actor until interrupted.

use fsp_proto::config::Config;
use fsp_svc::Service;
use log::info;
use runtime::logger::Logger;
use stakker::{actor, ret_nop, ActorOwn};

static LOGGER: Logger = Logger;

fn main() {
	log::set_logger(&LOGGER).expect("logger already installed");
	log::set_max_level(log::LevelFilter::Info);

	let mut stakker = runtime::rt::init();
	let s = &mut stakker;

	let config = Config::from_env();
	info!("Starting FSP service ({:?} transport, ipc prefix {:?})", config.transport, config.ipc_path_prefix);

	let service: ActorOwn<Service> = actor!(s, Service::init(config), ret_nop!());

	if let Err(()) = runtime::rt::exec(&mut stakker, move || drop(service)) {
		log::error!("FSP service exited with an error");
		std::process::exit(1);
	}
}
