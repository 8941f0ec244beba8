//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::EngineSettings;
use crate::dsp::{compute_level, ActivityGate, GateSignal};
use crate::engine::read_wav_file;
use crate::error::{AmbienceError, Result};
use crate::playback::{EffectLibrary, LocalEffectStore, ReloadReport};

/// Print per-frame loudness of a WAV file.
pub fn meter(path: &Path, frame_ms: u64) -> Result<()> {
    info!("Metering: {}", path.display());

    let buffer = read_wav_file(path)?;
    let mono = buffer.mixdown();
    let levels = frame_levels(&mono, buffer.sample_rate, frame_ms)?;

    println!("{}", path.display());
    println!("{:-<40}", "");
    for (i, level) in levels.iter().enumerate() {
        println!("{:>8} ms  {:>7.1} dB", i as u64 * frame_ms, level);
    }
    println!("{:-<40}", "");
    let peak = levels.iter().copied().fold(f32::MIN, f32::max);
    println!("Frames: {}  Peak: {:.1} dB", levels.len(), peak);

    Ok(())
}

/// Load a local effect directory and print the reload report.
pub async fn library(dir: &Path, settings: &EngineSettings) -> Result<()> {
    info!("Loading effect directory: {}", dir.display());

    let store = Arc::new(LocalEffectStore::new(dir));
    let library = EffectLibrary::new(store.clone(), Some(settings.graph.sample_rate));
    let report = library.reload(&store.directory()).await?;

    print_report(&report);
    for asset in library.snapshot().iter() {
        println!(
            "  {:<32} {} ch  {:.2} s",
            asset.id(),
            asset.channel_count(),
            asset.duration_secs()
        );
    }

    Ok(())
}

/// Store a WAV file in a local effect directory, then reload it.
pub async fn upload(dir: &Path, file: &Path, name: Option<&str>) -> Result<()> {
    let filename = match name {
        Some(name) => name.to_string(),
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AmbienceError::UploadFailure {
                filename: file.display().to_string(),
                reason: "path has no file name".to_string(),
            })?,
    };
    info!("Uploading {} as {}", file.display(), filename);

    let bytes = tokio::fs::read(file).await?;
    let store = Arc::new(LocalEffectStore::new(dir));
    let library = EffectLibrary::new(store.clone(), None);
    let report = library
        .upload(store.as_ref(), bytes, &filename, &store.directory())
        .await?;

    println!("Stored: {}", dir.join(&filename).display());
    print_report(&report);

    Ok(())
}

/// Replay the activity gate over two recordings and print transitions.
pub fn simulate(input: &Path, output: &Path, settings: &EngineSettings) -> Result<()> {
    info!("Simulating gate: {} / {}", input.display(), output.display());

    let input_buffer = read_wav_file(input)?;
    let output_buffer = read_wav_file(output)?;
    if input_buffer.sample_rate != output_buffer.sample_rate {
        return Err(AmbienceError::ConfigurationError {
            param: "output".to_string(),
            value: output_buffer.sample_rate.to_string(),
            expected: format!("{} Hz to match the input", input_buffer.sample_rate),
        });
    }

    let mut gate = ActivityGate::new(settings.sfx_gain, settings.sfx_threshold_db)?;
    gate.set_silence_budget_ms(settings.silence_budget_ms)?;

    let transitions = simulate_gate(
        &mut gate,
        &input_buffer.mixdown(),
        &output_buffer.mixdown(),
        input_buffer.sample_rate,
        settings.monitor_period_ms,
    )?;

    println!(
        "Threshold: {:.1} dB  Budget: {:.0} ms  Gain: {:.2}",
        settings.sfx_threshold_db, settings.silence_budget_ms, settings.sfx_gain
    );
    println!("{:-<48}", "");
    if transitions.is_empty() {
        println!("No transitions.");
    }
    for t in &transitions {
        println!(
            "{:>8} ms  {:<6} in {:>6.1} dB  out {:>6.1} dB",
            t.at_ms,
            match t.signal {
                GateSignal::Start => "START",
                GateSignal::Stop => "STOP",
            },
            t.input_db,
            t.output_db
        );
    }
    println!("{:-<48}", "");
    println!("Final phase: {}", gate.phase());

    Ok(())
}

fn print_report(report: &ReloadReport) {
    println!(
        "Loaded {}/{} effects from {}",
        report.loaded, report.requested, report.directory
    );
    for failure in &report.failures {
        println!("  skipped {} [{}]: {}", failure.filename, failure.code, failure.reason);
    }
}

// ============================================================================
// Offline analysis
// ============================================================================

/// A gate transition found by [`simulate_gate`]
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub at_ms: u64,
    pub signal: GateSignal,
    pub input_db: f32,
    pub output_db: f32,
}

/// Loudness of consecutive frames of `period_ms`
///
/// A trailing partial frame is metered as-is.
pub fn frame_levels(samples: &[f32], sample_rate: u32, period_ms: u64) -> Result<Vec<f32>> {
    let frame = frame_len(sample_rate, period_ms)?;
    Ok(samples.chunks(frame).map(compute_level).collect())
}

/// Feed two recordings through `gate` the way the activity monitor would
///
/// Each tick feeds the input frame first, then the output frame with
/// `dt_ms = period_ms`. The shorter recording is padded with silence.
pub fn simulate_gate(
    gate: &mut ActivityGate,
    input: &[f32],
    output: &[f32],
    sample_rate: u32,
    period_ms: u64,
) -> Result<Vec<Transition>> {
    let frame = frame_len(sample_rate, period_ms)?;
    let ticks = input.len().max(output.len()).div_ceil(frame);
    let mut transitions = Vec::new();

    for tick in 0..ticks {
        let range = |samples: &[f32]| -> f32 {
            let start = (tick * frame).min(samples.len());
            let end = ((tick + 1) * frame).min(samples.len());
            compute_level(&samples[start..end])
        };
        let input_db = range(input);
        let output_db = range(output);
        let at_ms = (tick as u64 + 1) * period_ms;

        let signals = [
            gate.feed_input(input_db),
            gate.feed_output(output_db, period_ms as f64),
        ];
        for signal in signals.into_iter().flatten() {
            transitions.push(Transition {
                at_ms,
                signal,
                input_db,
                output_db,
            });
        }
    }

    Ok(transitions)
}

fn frame_len(sample_rate: u32, period_ms: u64) -> Result<usize> {
    let frame = (sample_rate as u64 * period_ms / 1000) as usize;
    if frame == 0 {
        return Err(AmbienceError::ConfigurationError {
            param: "period_ms".to_string(),
            value: period_ms.to_string(),
            expected: "a period of at least one sample".to_string(),
        });
    }
    Ok(frame)
}
