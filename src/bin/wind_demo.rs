/// Wind estimator demo: circling flight through a steady wind.
///
/// Generates navigation velocities from a known wind and airspeed scale, feeds
/// them to the estimator and prints how the estimate converges.
use anyhow::Result;
use clap::Parser;
use sensordump::filters::wind_estimator::rotation_ned_to_body;
use sensordump::{Attitude, Ned, ObservationModel, WindEstimator, WindEstimatorConfig};

#[derive(Parser, Debug)]
#[command(name = "wind_demo")]
#[command(about = "Wind and airspeed-scale estimation on a simulated circling flight", long_about = None)]
struct Args {
    /// True wind, north component (m/s)
    #[arg(long, default_value = "4.0", allow_negative_numbers = true)]
    wind_north: f64,

    /// True wind, east component (m/s)
    #[arg(long, default_value = "-3.0", allow_negative_numbers = true)]
    wind_east: f64,

    /// True airspeed scale factor
    #[arg(long, default_value = "1.1")]
    scale: f64,

    /// Indicated airspeed (m/s)
    #[arg(long, default_value = "25.0")]
    airspeed: f64,

    /// Number of updates
    #[arg(long, default_value = "3000")]
    steps: usize,

    /// Yaw change per update (rad)
    #[arg(long, default_value = "0.02")]
    turn_rate: f64,

    /// Observe north, east and down velocity instead of north only
    #[arg(long)]
    three_axis: bool,

    /// Print the final estimate as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let truth = Ned::new(args.wind_north, args.wind_east, 0.0);
    let model = if args.three_axis {
        ObservationModel::ThreeAxis
    } else {
        ObservationModel::NorthAxis
    };
    let mut estimator = WindEstimator::new(WindEstimatorConfig {
        model,
        ..WindEstimatorConfig::default()
    });

    println!("=== Wind Estimator Demo ===\n");
    println!("  True wind:  N {:.2}  E {:.2} m/s", truth.north, truth.east);
    println!("  True scale: {:.3}", args.scale);
    println!("  Airspeed:   {:.1} m/s", args.airspeed);
    println!("  Model:      {:?}\n", model);

    let report_every = (args.steps / 10).max(1);
    let mut last_velocity = Ned::default();
    let mut last_attitude = Attitude::default();

    for i in 0..args.steps {
        let attitude = Attitude::new(0.0, 0.0, args.turn_rate * i as f64);
        let velocity = observed_velocity(&attitude, &truth, args.scale * args.airspeed);

        let wind = estimator.update(velocity, attitude, args.airspeed)?;
        last_velocity = velocity;
        last_attitude = attitude;

        if (i + 1) % report_every == 0 {
            println!(
                "  step {:5}: wind N {:7.3}  E {:7.3}  D {:7.3}  scale {:.4}",
                i + 1,
                wind.north,
                wind.east,
                wind.down,
                estimator.airspeed_scale()
            );
        }
    }

    match estimator.compute_angles(last_velocity, last_attitude) {
        Ok(angles) => println!(
            "\n  AoA {:.2}°  sideslip {:.2}°",
            angles.angle_of_attack.to_degrees(),
            angles.sideslip.to_degrees()
        ),
        Err(e) => log::warn!("angles unavailable: {}", e),
    }

    let estimate = estimator.estimate();
    println!(
        "  Wind error: N {:.3}  E {:.3} m/s, scale error {:.4}",
        estimate.wind.north - truth.north,
        estimate.wind.east - truth.east,
        estimate.airspeed_scale - args.scale
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&estimate)?);
    }
    Ok(())
}

/// Velocity consistent with the estimator's measurement model
fn observed_velocity(attitude: &Attitude, wind: &Ned, scaled_airspeed: f64) -> Ned {
    let rbn = rotation_ned_to_body(attitude);
    let component = |row: usize| {
        rbn[(row, 0)] * wind.north + rbn[(row, 1)] * wind.east + rbn[(row, 2)] * wind.down
    };
    Ned::new(
        component(0) + scaled_airspeed,
        component(1),
        component(2),
    )
}
