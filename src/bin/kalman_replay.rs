use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use flate2::read::GzDecoder;
use kalman_filter_rs::{KalmanConfig, KalmanFilter, KalmanSession, Observation};
use serde::Deserialize;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "kalman_replay")]
#[command(about = "Replay recorded observation tracks through a linear Kalman filter", long_about = None)]
struct Args {
    /// Path to the filter configuration (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Path to observations_*.json[.gz]
    #[arg(long)]
    observations: PathBuf,

    /// Flag observations whose predicted Mahalanobis distance exceeds this value
    #[arg(long)]
    gate: Option<f64>,

    /// Pretty-print the JSON output
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

#[derive(Debug, Deserialize)]
struct ObservationFile {
    tracks: BTreeMap<String, Vec<Observation>>,
}

fn load_observations(path: &Path) -> anyhow::Result<ObservationFile> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let parsed = if path.extension().is_some_and(|e| e == "gz") {
        serde_json::from_reader(BufReader::new(GzDecoder::new(file)))
    } else {
        serde_json::from_reader(BufReader::new(file))
    };
    parsed.with_context(|| {
        format!(
            "parsing {}: expected {{\"tracks\": {{\"<name>\": [observation, ...]}}}}",
            path.display()
        )
    })
}

fn run_track(
    name: &str,
    observations: &[Observation],
    kf: KalmanFilter,
    gate: Option<f64>,
) -> anyhow::Result<serde_json::Value> {
    let mut session = KalmanSession::new(kf);
    let mut steps = Vec::with_capacity(observations.len());
    let mut distances = Vec::with_capacity(observations.len());
    let mut outliers = 0u64;

    for (i, observation) in observations.iter().enumerate() {
        let predicted = session
            .kalman_filter()
            .predict(session.last_corrected())
            .with_context(|| format!("track {name}: predict at step {i}"))?;

        // Undefined when the projected covariance is singular; the step is still corrected
        let distance = match predicted.mahalanobis(session.kalman_filter(), observation, None) {
            Ok(d) => Some(d),
            Err(e) => {
                log::warn!("track {}: no Mahalanobis distance at step {}: {}", name, i, e);
                None
            }
        };
        let outlier = matches!((distance, gate), (Some(d), Some(g)) if d > g);
        if outlier {
            outliers += 1;
            log::info!("track {}: step {} outside gate ({:.3})", name, i, distance.unwrap_or(0.0));
        }
        distances.extend(distance);

        let corrected = session
            .filter(observation)
            .with_context(|| format!("track {name}: correct at step {i}"))?;

        steps.push(json!({
            "state": corrected,
            "mahalanobis": distance,
            "outlier": outlier,
        }));
    }

    let mean_distance = if distances.is_empty() {
        None
    } else {
        Some(distances.iter().sum::<f64>() / distances.len() as f64)
    };

    Ok(json!({
        "track": name,
        "steps": steps,
        "mean_mahalanobis": mean_distance,
        "outliers": outliers,
    }))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = KalmanConfig::from_path(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let kf = KalmanFilter::from_config(&config)?;
    let file = load_observations(&args.observations)?;
    log::info!(
        "Replaying {} track(s) from {}",
        file.tracks.len(),
        args.observations.display()
    );

    // Tracks are independent: one session per track, one thread per session
    let results: Vec<anyhow::Result<serde_json::Value>> = crossbeam::thread::scope(|scope| {
        let handles: Vec<_> = file
            .tracks
            .iter()
            .map(|(name, observations)| {
                let kf = kf.clone();
                scope.spawn(move |_| run_track(name, observations, kf, args.gate))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("track worker panicked")))
            })
            .collect()
    })
    .map_err(|_| anyhow::anyhow!("track worker panicked"))?;

    let results = results.into_iter().collect::<anyhow::Result<Vec<_>>>()?;
    let output = if args.pretty {
        serde_json::to_string_pretty(&results)?
    } else {
        serde_json::to_string(&results)?
    };
    println!("{}", output);
    Ok(())
}
