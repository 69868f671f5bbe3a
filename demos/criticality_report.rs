use clap::Parser;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use spike_analysis::criticality::{CriticalityConfig, CriticalityEstimator};
use spike_analysis::error::AnalysisError;
use spike_analysis::metrics::{fano_factors, pearson_sparse};
use spike_analysis::powerlaw::Xmin;
use spike_analysis::spike_train::{RateUnit, Spike, SpikeTrainStore};

#[derive(Parser, Debug)]
struct Args {
    /// The seed used for sampling the recording and the surrogate datasets
    #[arg(long, default_value = "0")]
    seed: u64,
    /// The number of units
    #[arg(short = 'N', long, default_value = "64")]
    num_units: usize,
    /// The duration of the recording (in ms)
    #[arg(short = 'T', long, default_value = "300000.0")]
    length: f64,
    /// The probability for a silent bin to start a burst
    #[arg(long, default_value = "0.05")]
    burst_rate: f64,
    /// The width of the time bins (in ms)
    #[arg(long, default_value = "40.0")]
    bin_size: f64,
    /// The quantile of the binned population activity used as threshold
    #[arg(long, default_value = "0.35")]
    quantile: f64,
    /// The number of surrogate datasets per goodness-of-fit test
    #[arg(long, default_value = "1000")]
    surrogate_count: usize,
    /// The significance level to prefer truncated power laws
    #[arg(long, default_value = "0.05")]
    truncation_pvalue: f64,
    /// Choose the lower cutoff of the fits by minimizing the Kolmogorov-Smirnov distance
    #[arg(long)]
    minimize_ks: bool,
    /// The synchrony window of the spike time tiling coefficients (in ms)
    #[arg(long, default_value = "20.0")]
    delt: f64,
    /// Save the sampled recording to this file
    #[arg(long)]
    output: Option<String>,
}

/// Sample a recording with bursts of population activity of heavy-tailed durations.
fn sample_recording(args: &Args) -> Result<SpikeTrainStore, AnalysisError> {
    let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
    let num_bins = (args.length / args.bin_size).floor() as usize;
    let mut spikes: Vec<Spike> = vec![];

    let mut bin = 0;
    while bin < num_bins {
        if rng.gen_bool(args.burst_rate.clamp(0.0, 1.0)) {
            let duration = (1.0 / (1.0 - rng.gen::<f64>())).floor() as usize;
            for b in bin..(bin + duration).min(num_bins) {
                for _ in 0..rng.gen_range(1..=args.num_units) {
                    spikes.push(Spike::new(
                        rng.gen_range(0..args.num_units),
                        (b as f64 + rng.gen::<f64>()) * args.bin_size,
                    ));
                }
            }
            bin += duration;
        }
        bin += 1;
    }

    SpikeTrainStore::from_source(&spikes, Some(args.length))
}

fn main() -> Result<(), AnalysisError> {
    let args = Args::parse();

    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{l} - {m}\n")))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))
        .map_err(|e| AnalysisError::IOError(e.to_string()))?;

    log4rs::init_config(config).map_err(|e| AnalysisError::IOError(e.to_string()))?;

    log::info!("{:?}", args);

    let store = sample_recording(&args)?;
    log::info!(
        "Recording sampling: done! {} spikes from {} units",
        store.num_spikes(),
        store.num_units()
    );

    if let Some(path) = &args.output {
        store.save_to(path)?;
        log::info!("Recording saving: done! Saved to {}", path);
    }

    let rates = store.rates(RateUnit::Hz)?;
    log::info!(
        "Mean firing rate: {:.3} Hz",
        rates.iter().sum::<f64>() / rates.len().max(1) as f64
    );
    log::info!("Burstiness index: {:.3}", store.burstiness_index(args.bin_size)?);

    let raster = store.sparse_raster(args.bin_size)?;
    let fano = fano_factors(&raster);
    log::info!(
        "Mean Fano factor: {:.3}",
        fano.iter().sum::<f64>() / fano.len().max(1) as f64
    );

    let num_pairs = (store.num_units() * store.num_units().saturating_sub(1)) as f64;
    let corr = pearson_sparse(&raster);
    log::info!(
        "Mean pairwise correlation: {:.3}",
        (corr.sum() - store.num_units() as f64) / num_pairs.max(1.0)
    );
    let tilings = store.spike_time_tilings(args.delt)?;
    log::info!(
        "Mean pairwise spike time tiling: {:.3}",
        (tilings.sum() - store.num_units() as f64) / num_pairs.max(1.0)
    );

    let estimator = CriticalityEstimator::new(CriticalityConfig {
        quantile: args.quantile,
        bin_size: args.bin_size,
        surrogate_count: args.surrogate_count,
        truncation_pvalue: args.truncation_pvalue,
        xmin: if args.minimize_ks {
            Xmin::MinimizeKs
        } else {
            Xmin::DataMinimum
        },
        seed: args.seed,
    })?;
    let report = estimator.estimate_report(&store)?;
    log::info!(
        "{} avalanches above {} spikes per bin",
        report.num_avalanches,
        report.threshold
    );
    log::info!(
        "{}",
        serde_json::to_string_pretty(&report).map_err(|e| AnalysisError::IOError(e.to_string()))?
    );
    log::info!(
        "DCC: {:.4} (p_size={:.3}, p_duration={:.3})",
        report.result.dcc,
        report.result.p_size,
        report.result.p_duration
    );

    Ok(())
}
