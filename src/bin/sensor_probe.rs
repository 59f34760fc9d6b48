//! Rangefinder probe
//!
//! Prints live readings from one gate rangefinder so the sensor can be
//! aimed and the detection threshold checked during installation.

use clap::Parser;
use speed_gate::domain::GateId;
use speed_gate::io::SerialRangefinder;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "sensor-probe", about = "Live rangefinder readings for installation checks")]
struct Args {
    #[arg(long, default_value = "/dev/ttyUSB0")]
    device: String,

    #[arg(long, default_value = "9600")]
    baud: u32,

    /// Presence threshold to evaluate against (metres)
    #[arg(long, default_value = "0.25")]
    threshold_m: f64,

    /// Readings are clamped to this range (metres)
    #[arg(long, default_value = "1.0")]
    max_distance_m: f64,

    /// Print every reading instead of only occupancy changes
    #[arg(long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    println!("\n=== RANGEFINDER PROBE ===\n");
    println!("  Device:     {} @ {}baud", args.device, args.baud);
    println!("  Threshold:  {:.3} m", args.threshold_m);
    println!("  Max range:  {:.3} m", args.max_distance_m);
    println!();

    let mut sensor = SerialRangefinder::open(
        GateId::A,
        &args.device,
        args.baud,
        args.threshold_m,
        args.max_distance_m,
        Duration::from_secs(2),
    )?;
    println!("Port opened, Ctrl+C to stop\n");

    let mut interval = tokio::time::interval(Duration::from_millis(50));
    let mut last_occupied = None;
    let mut min_seen = f64::MAX;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = interval.tick() => {
                let distance_m = sensor.read_distance_m().await?;
                let occupied = distance_m < args.threshold_m;
                min_seen = min_seen.min(distance_m);

                if args.verbose || last_occupied != Some(occupied) {
                    println!(
                        "[{}] {:>6.3} m  {}",
                        wall_time(),
                        distance_m,
                        if occupied { "OCCUPIED" } else { "clear" }
                    );
                }
                last_occupied = Some(occupied);
            }
        }
    }

    if min_seen < f64::MAX {
        println!("\nClosest reading: {:.3} m", min_seen);
    }
    Ok(())
}

fn wall_time() -> String {
    use std::time::SystemTime;
    let now = SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:03}", now.as_secs() % 100000, now.subsec_millis())
}
