// Studio Core - headless demo
//
// Usage: studio_core [config.ron|config.json] [seconds]
//
// Opens the default output device, builds a bass track, a lead track and an
// aux delay bus, then loops a two-bar pattern until the time is up.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ringbuf::traits::Consumer;
use studio_core::audio::backend::{CpalBackend, RenderBackend};
use studio_core::audio::engine::RenderEngine;
use studio_core::{
    ChannelParam, EffectKind, EngineConfig, EngineResult, InstrumentType, Notification, NoteData,
    PPQ, PresetRef, SchedulerThread, Session, Tick, TransportEvent, logging,
};
use tracing::{error, info};

const DEFAULT_RUN_SECONDS: u64 = 16;

fn main() {
    logging::init("studio_core=info");

    let mut args = std::env::args().skip(1);
    let config = match args.next().map(PathBuf::from) {
        Some(path) => match EngineConfig::load(&path) {
            Ok(config) => {
                info!(path = %path.display(), "Configuration loaded");
                config
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Invalid configuration");
                return;
            }
        },
        None => EngineConfig::default(),
    };
    let seconds = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_RUN_SECONDS);

    if let Err(e) = run(config, Duration::from_secs(seconds)) {
        error!(error = %e, "Studio core stopped");
    }
}

fn run(config: EngineConfig, duration: Duration) -> EngineResult<()> {
    let mut backend = CpalBackend::open(&config)?;
    let (engine, link) = RenderEngine::create(&config, backend.sample_rate());
    backend.start(engine)?;

    let mut session = Session::new(config.clone(), link, backend.status())?;
    build_demo(&mut session)?;
    let mut notifications = session.take_notifications();
    session.play();

    let session = Arc::new(Mutex::new(session));
    let scheduler = SchedulerThread::spawn(Arc::clone(&session), config.poll_interval())?;

    let started = Instant::now();
    while started.elapsed() < duration {
        thread::sleep(Duration::from_millis(250));

        if let Some(rx) = notifications.as_mut() {
            while let Some(notification) = rx.try_pop() {
                match notification {
                    Notification::Transport(TransportEvent::Bar { bar }) => info!(bar, "Bar"),
                    Notification::Transport(TransportEvent::LoopWrapped { cycle }) => {
                        info!(cycle, "Loop")
                    }
                    Notification::Message(message) => info!(text = %message.text, "Engine message"),
                    _ => {}
                }
            }
        }

        let report = backend.cpu_monitor().report();
        if report.overruns > 0 {
            info!(
                average = report.average_percent,
                peak = report.peak_percent,
                overruns = report.overruns,
                "CPU"
            );
        }
    }

    scheduler.stop();
    if let Ok(mut session) = session.lock() {
        session.stop();
    }
    // Let the stop reach the device before the stream goes away
    thread::sleep(Duration::from_millis(50));
    backend.stop();
    Ok(())
}

fn build_demo(session: &mut Session) -> EngineResult<()> {
    const BEAT: Tick = PPQ as Tick;

    let pattern = session.create_pattern("Demo", BEAT * 8);

    let bass = session.create_track("Bass", InstrumentType::Subtractive)?;
    session.apply_preset(bass, PresetRef::Index(1))?;
    session.bind_pattern(bass, Some(pattern))?;

    let lead = session.create_track("Lead", InstrumentType::Subtractive)?;
    session.set_instrument_param(lead, "cutoff", 2400.0)?;
    session.bind_pattern(lead, Some(pattern))?;

    for (beat, pitch) in [36u8, 36, 43, 41, 36, 36, 46, 43].into_iter().enumerate() {
        let start = beat as Tick * BEAT;
        session.add_note(pattern, NoteData::new(pitch, 110, start, BEAT / 2).on_track(bass))?;
    }
    for (step, pitch) in [72u8, 75, 79, 77, 75, 72, 70, 67].into_iter().enumerate() {
        let start = step as Tick * BEAT + BEAT / 2;
        session.add_note(pattern, NoteData::new(pitch, 90, start, BEAT / 4).on_track(lead))?;
    }

    let aux = session.create_aux_channel("Delay bus")?;
    session.add_effect(aux, EffectKind::Delay, None)?;
    session.set_effect_param(aux, 0, "time", 375.0)?;
    session.set_effect_mix(aux, 0, 1.0)?;
    if let Some(lead_channel) = session.track(lead)?.channel {
        session.set_send(lead_channel, aux, 0.4)?;
        session.set_channel_param(lead_channel, ChannelParam::Pan(0.3))?;
    }

    session.set_loop(true, 0, BEAT * 8);
    session.set_metronome_enabled(true);
    Ok(())
}
