// Data acquisition example
//
// Arms both analog ports on the low range plus the first digital port,
// streams samples for a while and prints them as a table.

use clap::Parser;
use polars::prelude::DataFrame;
use std::time::Duration;
use vernier_shield::{
    AnalogTrigger, Channel, DigitalEdge, HandlerConfig, SampleRate, SampleRecorder,
    ShieldConnector, ShieldSettings, Source,
};

#[derive(Parser)]
#[command(name = "data_acquisition")]
#[command(version = "1.0")]
#[command(about = "Stream samples from a Vernier sensor shield")]
struct Args {
    /// Serial port the shield is attached to
    #[arg(default_value = "/dev/ttyACM0")]
    port: String,

    #[arg(short, long, default_value_t = 5, help = "How long to stream, in seconds")]
    duration: u64,

    #[arg(short, long, default_value = "100", value_parser = ["1", "10", "100", "1000"], help = "Sample rate in Hz")]
    rate: String,

    #[arg(short, long, default_value_t = 512, help = "Stop after this many points (0 streams forever)")]
    points: u16,

    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let rate = match args.rate.as_str() {
        "1" => SampleRate::Hz1,
        "10" => SampleRate::Hz10,
        "1000" => SampleRate::Hz1000,
        _ => SampleRate::Hz100,
    };

    println!("Vernier Shield Data Acquisition");
    println!("===============================");
    println!("Port: {}", args.port);
    println!("Rate: {:?}, duration: {}s\n", rate, args.duration);

    let analog = SampleRecorder::new();
    let digital = SampleRecorder::new();
    let handlers = HandlerConfig::new()
        .on(Channel::Analog1, analog.handler())
        .on(Channel::Analog2, analog.handler())
        .on(Channel::Digital1, digital.handler());

    let settings = ShieldSettings::new(args.port);
    let received = ShieldConnector::with_shield(&settings, handlers, |shield, link| {
        if !link.is_ready() {
            log::warn!("No boot greeting, trying anyway");
        }

        shield.halt_data()?;
        shield.set_sample_rate(rate)?;
        shield.set_trigger(AnalogTrigger::start_capturing_when().immediately())?;
        shield.set_stop_condition(args.points)?;
        shield.set_digital_trigger(DigitalEdge::Any)?;
        shield.sync_clocks()?;

        let ack = shield.arm_sources(&[
            Source::Analog1Low,
            Source::Analog2Low,
            Source::Digital1,
        ])?;
        if !ack.is_ack() {
            log::error!("Shield refused to arm");
        }

        let received = shield.run_for(Duration::from_secs(args.duration))?;
        shield.halt_data()?;
        Ok::<_, vernier_shield::ConnectorError>(received)
    })?;

    println!("Handled {} events\n", received);

    let analog_frame = analog.to_dataframe()?;
    print_value_summary(&analog_frame, "Analog");
    println!("{}", analog_frame);

    let digital_frame = digital.to_dataframe()?;
    println!("\nDigital events: {}", digital_frame.height());
    println!("{}", digital_frame);

    Ok(())
}

fn print_value_summary(data: &DataFrame, label: &str) {
    let Ok(column) = data.column("value") else {
        return;
    };
    let Ok(values) = column.f64() else {
        return;
    };
    let values: Vec<f64> = values.into_no_null_iter().collect();
    if values.is_empty() {
        println!("{}: no data", label);
        return;
    }

    let min = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    println!("{}: {:.3}V to {:.3}V (mean: {:.3}V)", label, min, max, mean);
}
