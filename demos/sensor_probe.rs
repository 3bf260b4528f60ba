// Sensor probe: READ-ONLY check of the board's line sensors
//
// Polls base feedback and prints what the controller would do, without ever
// sending a motion command. Slide a strip of tape under the sensors to check
// the wiring before letting the robot drive.
//
// Usage: cargo run --example sensor_probe -- [port]
// Example: cargo run --example sensor_probe -- /dev/ttyUSB0

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::sleep;

use tracing_subscriber::filter::LevelFilter;

use line_follower::config::{Config, DEFAULT_PORT, log_filter};
use line_follower::link::{self, decode_feedback};
use line_follower::messages::FeedbackRequest;
use line_follower::policy::decide;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(LevelFilter::DEBUG))
        .init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_PORT.to_string());
    let config = Config {
        port,
        ..Config::default()
    };

    println!("Line sensor probe (READ-ONLY, no motion commands)");
    println!("Serial port: {}", config.port);
    println!("Press Ctrl+C to quit");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    let mut link = match link::open(&config.port, config.baud, config.read_timeout()) {
        Ok(link) => link,
        Err(e) => {
            println!("✗ {}", e);
            println!();
            println!("Troubleshooting:");
            println!("  - Check the port path is correct");
            println!("  - Make sure no other program holds the port");
            println!("  - On Linux, check you are in the dialout group");
            return Err(e.into());
        }
    };

    let profile = config.speed_profile();
    let (mut replies, mut timeouts, mut bad) = (0u32, 0u32, 0u32);

    while running.load(Ordering::SeqCst) {
        link.send(&FeedbackRequest::default())?;

        match link.receive()? {
            None => {
                timeouts += 1;
                println!("  (no reply within {:?})", config.read_timeout());
            }
            Some(line) => match decode_feedback(&line) {
                Ok(feedback) => {
                    replies += 1;
                    let (left, right) = feedback.samples();
                    let cmd = decide(left, right, &profile);
                    println!(
                        "  L={:<8} R={:<8} -> would send L={:.2} R={:.2}",
                        format!("{:?}", left),
                        format!("{:?}", right),
                        cmd.left_speed,
                        cmd.right_speed
                    );
                }
                Err(e) => {
                    bad += 1;
                    println!("  ✗ {}", e);
                }
            },
        }

        sleep(config.cycle_delay());
    }

    println!();
    println!(
        "Summary: {} replies, {} timeouts, {} unparsable",
        replies, timeouts, bad
    );
    link.close();
    Ok(())
}
