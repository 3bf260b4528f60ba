use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{CommandFactory, Parser, error::ErrorKind};
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;

use line_follower::config::{Config, log_filter};
use line_follower::controller::Controller;
use line_follower::link;

fn main() {
    // Setup logging (set RUST_LOG=debug to see raw serial traffic)
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(LevelFilter::INFO))
        .init();

    let config = Config::parse();
    if let Err(e) = config.validate() {
        Config::command().error(ErrorKind::ValueValidation, e).exit();
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
        error!("Failed to install interrupt handler: {}", e);
        std::process::exit(1);
    }

    let link = match link::open(&config.port, config.baud, config.read_timeout()) {
        Ok(link) => link,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    info!("Connected to the robot via {}", config.port);

    Controller::new(link, config.speed_profile(), config.cycle_delay()).run(&running);
}
