//! Pipeline soak runner
//!
//! Drives a [`Pipeline`] with synthetic audio at real-time pace from a
//! dedicated "audio" thread while the main thread polls the display
//! surfaces, then prints the analysis statistics.
//!
//! ## Command line flags
//!
//! - `--seconds N`: how long to run (default 10)
//! - `--config PATH`: pipeline config YAML (default: platform config dir)
//! - `--engine PROGRAM [ARGS...]`: external analyzer speaking the line
//!   protocol; all remaining arguments are passed to it. Without this flag
//!   a built-in level meter is used.

use std::f32::consts::TAU;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

use samplemind_core::config::default_config_path;
use samplemind_core::engine::subprocess::SubprocessConnector;
use samplemind_core::{
    AnalysisEngine, AnalysisRequest, EngineResult, Parameter, Pipeline, PipelineConfig,
    DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE, PLUGIN_NAME, PLUGIN_UNIQUE_ID, PLUGIN_VERSION,
};

/// Built-in engine reporting block loudness only
struct LevelMeter;

impl AnalysisEngine for LevelMeter {
    fn name(&self) -> &str {
        "level-meter"
    }

    fn analyze(&mut self, request: &AnalysisRequest<'_>) -> EngineResult<Value> {
        let channels = request.channels();
        let mut sum_sq = 0.0f64;
        let mut peak = 0.0f32;
        let mut count = 0usize;
        for channel in &channels {
            for &s in channel.iter() {
                sum_sq += (s as f64) * (s as f64);
                peak = peak.max(s.abs());
                count += 1;
            }
        }
        let rms = if count > 0 { (sum_sq / count as f64).sqrt() } else { 0.0 };

        Ok(json!({
            "energy_level": rms.min(1.0),
            "confidence_score": 1.0,
            "extended_features": { "peak": peak },
        }))
    }
}

struct Args {
    seconds: u64,
    config: PathBuf,
    engine: Option<(PathBuf, Vec<String>)>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        seconds: 10,
        config: default_config_path(),
        engine: None,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--seconds" => {
                let value = iter.next().context("--seconds needs a value")?;
                args.seconds = value
                    .parse()
                    .with_context(|| format!("Invalid --seconds value: {}", value))?;
            }
            "--config" => {
                args.config = iter.next().context("--config needs a path")?.into();
            }
            "--engine" => {
                let program = iter.next().context("--engine needs a program")?;
                args.engine = Some((program.into(), iter.by_ref().collect()));
            }
            other => bail!("Unknown argument: {}", other),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    let config = PipelineConfig::load(&args.config);
    log::info!(
        "{} v{} ({:#010x}) soak run for {}s",
        PLUGIN_NAME,
        PLUGIN_VERSION,
        PLUGIN_UNIQUE_ID,
        args.seconds
    );

    let mut pipeline = match &args.engine {
        Some((program, engine_args)) => {
            log::info!("Using external analyzer {:?}", program);
            Pipeline::new(config, SubprocessConnector::new(program).with_args(engine_args.clone()))
        }
        None => {
            log::info!("Using built-in level meter");
            Pipeline::new(config, || -> EngineResult<Box<dyn AnalysisEngine>> {
                Ok(Box::new(LevelMeter))
            })
        }
    };
    pipeline.register_parameter(Parameter::new(1, "Sensitivity", 0.0, 1.0, 0.5))?;
    pipeline.register_parameter(Parameter::new(2, "Tempo Hint", 60.0, 200.0, 120.0).with_display_format("%.1f"))?;
    let pipeline = Arc::new(pipeline);

    pipeline.initialize(DEFAULT_SAMPLE_RATE, DEFAULT_BLOCK_SIZE)?;

    let running = Arc::new(AtomicBool::new(true));
    let audio = {
        let pipeline = Arc::clone(&pipeline);
        let running = Arc::clone(&running);
        thread::Builder::new()
            .name("soak-audio".to_string())
            .spawn(move || feed_audio(&pipeline, &running))
            .context("Failed to spawn audio thread")?
    };

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut last_generation = pipeline.analysis_generation();
    while Instant::now() < deadline {
        thread::sleep(Duration::from_millis(500));
        let generation = pipeline.analysis_generation();
        if generation != last_generation {
            last_generation = generation;
            let analysis = pipeline.get_analysis();
            log::info!(
                "analysis #{}: energy {:.3}, {} waveform points",
                generation,
                analysis.energy_level,
                pipeline.get_waveform().len()
            );
        }
    }

    running.store(false, Ordering::Release);
    if audio.join().is_err() {
        log::error!("Audio thread panicked");
    }
    pipeline.shutdown();

    let stats = pipeline.stats();
    println!("{}", pipeline.analysis_display_text());
    println!();
    println!("Blocks processed:   {}", pipeline.blocks_processed());
    println!("Blocks enqueued:    {}", stats.blocks_enqueued());
    println!("Blocks dropped:     {}", stats.blocks_dropped());
    println!("Analyses completed: {}", stats.analyses_completed());
    println!("Analyses failed:    {}", stats.analyses_failed());
    println!("Analyses discarded: {}", stats.analyses_discarded());
    println!("Waveform skips:     {}", stats.waveform_skips());
    if let Some(error) = stats.last_error() {
        println!("Last error:         {}", error);
    }
    Ok(())
}

/// Generate a stereo sine sweep in real-time sized blocks
fn feed_audio(pipeline: &Pipeline, running: &AtomicBool) {
    let sample_rate = pipeline.sample_rate() as f32;
    let block_size = pipeline.block_size();
    let block_period = Duration::from_secs_f32(block_size as f32 / sample_rate);

    let mut left = vec![0.0f32; block_size];
    let mut right = vec![0.0f32; block_size];
    let mut phase = 0.0f32;
    let mut next = Instant::now();

    while running.load(Ordering::Acquire) {
        let gain = pipeline.parameter_or(1, 0.5);
        let freq = 220.0 + 220.0 * (phase / sample_rate / 4.0).sin().abs();
        for i in 0..block_size {
            let s = gain * (TAU * freq * (phase + i as f32) / sample_rate).sin();
            left[i] = s;
            right[i] = s * 0.8;
        }
        phase = (phase + block_size as f32) % (sample_rate * 16.0);

        pipeline.process(&left, Some(right.as_slice()), block_size);

        next += block_period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            next = now;
        }
    }
}
