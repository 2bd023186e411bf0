//! Audio profiling utility
//!
//! Renders a busy session offline and times every block against the
//! real-time deadline (block frames / sample rate).
//!
//! Usage: profile_audio [seconds] [block_size]

use std::time::Instant;

use studio_core::audio::backend::{OfflineBackend, RenderBackend};
use studio_core::audio::cpu_monitor::{CpuLoad, CpuMonitor};
use studio_core::audio::engine::RenderEngine;
use studio_core::{
    EffectKind, EngineConfig, EngineResult, InstrumentType, NoteData, PPQ, Session, Tick, logging,
};
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init("profile_audio=info,studio_core=warn");

    let mut args = std::env::args().skip(1);
    let seconds: f64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(10.0);
    let block_size: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(256);

    println!("Studio Core - Audio Profiling Tool");
    println!("==========================================");

    let config = EngineConfig {
        block_size,
        ..EngineConfig::default()
    }
    .validated();
    let mut backend = OfflineBackend::from_config(&config);
    let (engine, link) = RenderEngine::create(&config, backend.sample_rate());
    backend.start(engine)?;
    let mut session = Session::new(config.clone(), link, backend.status())?;
    build_load(&mut session)?;
    session.play();

    let sample_rate = backend.sample_rate();
    let monitor = CpuMonitor::new(sample_rate, 1);
    let total_blocks = (seconds * sample_rate as f64 / config.block_size as f64).ceil() as u64;
    let ticks_every = ((config.poll_interval_ms as f64 / 1000.0) * sample_rate as f64
        / config.block_size as f64)
        .max(1.0) as u64;

    info!(total_blocks, block_size = config.block_size, sample_rate, "Profiling started");
    let mut max_voices = 0;
    for block in 0..total_blocks {
        if block % ticks_every == 0 {
            session.tick();
        }
        let start = Instant::now();
        backend.render_block();
        monitor.record(start.elapsed().as_nanos() as u64, config.block_size);
        max_voices = max_voices.max(session.active_voices());
    }
    session.stop();

    let report = monitor.report();
    let deadline_us = config.block_size as f64 / sample_rate as f64 * 1e6;
    let stats = session.stats();

    println!("\nAUDIO PERFORMANCE REPORT");
    println!("========================");
    println!("Blocks rendered:   {}", report.measured_blocks);
    println!("Block deadline:    {deadline_us:.1}us");
    println!("Avg CPU usage:     {:.1}%", report.average_percent);
    println!("Peak CPU usage:    {:.1}%", report.peak_percent);
    println!("Deadline overruns: {}", report.overruns);
    println!("Peak voices:       {max_voices}");
    println!("Late events:       {}", stats.late_events);

    println!("\nPERFORMANCE ANALYSIS");
    println!("====================");
    match monitor.load_level() {
        CpuLoad::Low => println!("Excellent performance - CPU usage well within limits"),
        CpuLoad::Medium => println!("Acceptable performance"),
        CpuLoad::High => println!("High load - risk of audio dropouts"),
    }
    if report.peak_percent > 90.0 {
        println!("High CPU spikes detected - risk of audio dropouts");
    }

    Ok(())
}

/// Four polyphonic tracks with effects and a shared bus
fn build_load(session: &mut Session) -> EngineResult<()> {
    const BEAT: Tick = PPQ as Tick;

    let pattern = session.create_pattern("Load", BEAT * 4);
    let bus = session.create_aux_channel("Bus")?;
    session.add_effect(bus, EffectKind::Delay, None)?;

    for t in 0..4u8 {
        let track = session.create_track(format!("Track {t}"), InstrumentType::Subtractive)?;
        session.bind_pattern(track, Some(pattern))?;
        if let Some(channel) = session.track(track)?.channel {
            session.add_effect(channel, EffectKind::Filter, None)?;
            session.add_effect(channel, EffectKind::Drive, None)?;
            session.set_send(channel, bus, 0.3)?;
        }
        for step in 0..16u8 {
            let pitch = 48 + t * 5 + step % 7;
            let start = step as Tick * BEAT / 4;
            session.add_note(pattern, NoteData::new(pitch, 100, start, BEAT).on_track(track))?;
        }
    }

    session.set_loop(true, 0, BEAT * 4);
    Ok(())
}
