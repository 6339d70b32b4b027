// Basic connection example
//
// Opens the shield, waits for its boot greeting and asks for the firmware
// version and port status.

use vernier_shield::shield::DEFAULT_STATUS_SOURCES;
use vernier_shield::{ConnectorError, HandlerConfig, ShieldConnector, ShieldSettings};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let port = std::env::args().nth(1).unwrap_or_else(|| "/dev/ttyACM0".to_string());

    println!("Vernier Shield Connection Example");
    println!("=================================\n");

    let settings = ShieldSettings::new(port);
    ShieldConnector::with_shield(&settings, HandlerConfig::default(), |shield, link| {
        if link.is_ready() {
            println!("1. Shield greeted us on {}", settings.port);
        } else {
            println!("1. No greeting from {}, continuing anyway", settings.port);
        }

        match shield.get_version()? {
            Some(version) => println!("2. Firmware version: {}", version),
            None => println!("2. Version request was not answered"),
        }

        println!("3. Port status:");
        match shield.get_status(&DEFAULT_STATUS_SOURCES)? {
            Some(report) => {
                for line in report.lines() {
                    println!("   {}", line);
                }
                if !report.is_complete() {
                    println!("   (some ports did not report)");
                }
            }
            None => println!("   Status request was rejected"),
        }

        shield.blink_led(3, 4)?;
        Ok::<_, ConnectorError>(())
    })?;

    println!("\nConnection test completed successfully!");
    Ok(())
}
