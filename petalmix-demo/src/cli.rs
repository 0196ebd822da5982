use anyhow::Result;
use petalmix_core::{
    AudioDevice, AudioStream, Music, PetalMixDeviceDesc, PetalMixEvent, Sound, SoundPool, Wave,
    mixed_processor,
};
use std::f32::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

const FRAME_TIME: Duration = Duration::from_millis(16);

/// Plays a synthesized stream, a pool of overlapping blips and, if given, a
/// music file on the default output device.
pub fn run_device_demo(music_path: Option<&str>) -> Result<()> {
    let desc = PetalMixDeviceDesc::new().sample_rate(48000).block_size(1024);
    let device = AudioDevice::init(desc)?;

    // Peak meter fed from the final mix
    let peak = Arc::new(AtomicU32::new(0));
    let meter = peak.clone();
    let peak_processor = mixed_processor(move |buffer, _frames| {
        let max = buffer.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        meter.fetch_max(max.to_bits(), Ordering::Relaxed);
    });
    device.attach_mixed_processor(&peak_processor);

    log::info!("=== Raw stream: 440 Hz sine for 2 seconds ===");
    play_sine_stream(&device, Duration::from_secs(2))?;

    log::info!("=== Sound pool: 12 blips over 10 aliases ===");
    play_blips(&device)?;

    if let Some(path) = music_path {
        log::info!("=== Music: {} for 10 seconds ===", path);
        play_music(&device, path, Duration::from_secs(10))?;
    }

    device.detach_mixed_processor(&peak_processor);
    log::info!(
        "Peak level: {:.3}",
        f32::from_bits(peak.load(Ordering::Relaxed))
    );
    device.close();
    Ok(())
}

fn play_sine_stream(device: &AudioDevice, duration: Duration) -> Result<()> {
    let rate = 44100;
    let mut stream = AudioStream::new(device, rate, 16, 1)?;
    let mut chunk = vec![0i16; stream.buffer_frames()];
    let mut phase = 0.0f32;
    let step = TAU * 440.0 / rate as f32;

    stream.play();
    let start = Instant::now();
    while start.elapsed() < duration {
        while stream.is_buffer_processed() {
            for sample in chunk.iter_mut() {
                *sample = (phase.sin() * 0.3 * i16::MAX as f32) as i16;
                phase = (phase + step) % TAU;
            }
            stream.update(&chunk);
        }
        std::thread::sleep(FRAME_TIME);
    }
    stream.stop();
    Ok(())
}

fn blip(rate: u32) -> Result<Wave> {
    let frames = rate as usize / 10;
    let samples: Vec<f32> = (0..frames)
        .map(|i| {
            let t = i as f32 / rate as f32;
            let envelope = 1.0 - i as f32 / frames as f32;
            (TAU * 880.0 * t).sin() * envelope * 0.4
        })
        .collect();
    Ok(Wave::from_samples(rate, 1, samples)?)
}

fn play_blips(device: &AudioDevice) -> Result<()> {
    let source = Sound::from_wave(device, &blip(22050)?)?;
    let mut pool = SoundPool::new(&source, 10)?;

    for i in 0..12 {
        let index = pool.play_next();
        if let Some(alias) = pool.get(index) {
            alias.set_pan(if i % 2 == 0 { -0.6 } else { 0.6 });
            alias.set_pitch(1.0 + i as f32 * 0.05);
        }
        std::thread::sleep(Duration::from_millis(60));
    }

    while pool.playing_count() > 0 {
        std::thread::sleep(FRAME_TIME);
    }
    for event in device.poll_events() {
        log::debug!("Event: {:?}", event);
    }
    Ok(())
}

fn play_music(device: &AudioDevice, path: &str, duration: Duration) -> Result<()> {
    let mut music = Music::load(device, path)?;
    log::info!("Track length: {:.2}s", music.time_length());

    let soften = mixed_processor(|buffer, _frames| {
        for sample in buffer.iter_mut() {
            *sample = sample.tanh();
        }
    });
    music.attach_processor(&soften);
    music.play();

    let start = Instant::now();
    while start.elapsed() < duration && music.is_playing() {
        music.update();
        for event in device.poll_events() {
            match event {
                PetalMixEvent::StreamLooped { .. } => log::info!("Music looped"),
                PetalMixEvent::StreamFinished { .. } => log::info!("Music finished"),
                PetalMixEvent::DeviceError { error } => log::error!("Device error: {}", error),
                other => log::debug!("Event: {:?}", other),
            }
        }
        std::thread::sleep(FRAME_TIME);
    }
    log::info!("Played {:.2}s", music.time_played());
    music.stop();
    Ok(())
}

/// Renders the blip pool through a headless device into a WAV file.
pub fn render_offline(out_path: &str) -> Result<()> {
    let rate = 48000;
    let device = AudioDevice::headless(PetalMixDeviceDesc::new().sample_rate(rate).channels(2))?;
    let source = Sound::from_wave(&device, &blip(rate)?)?;
    let mut pool = SoundPool::new(&source, 4)?;

    let block_frames = 480;
    let mut block = vec![0.0f32; block_frames * 2];
    let mut mix = Vec::with_capacity(rate as usize * 2);
    for i in 0..100 {
        if i % 10 == 0 {
            pool.play_next();
        }
        device.render(&mut block);
        mix.extend_from_slice(&block);
    }

    Wave::from_samples(rate, 2, mix)?.export(out_path)?;
    log::info!(
        "Rendered {} frames to {}",
        device.frames_rendered(),
        out_path
    );
    Ok(())
}
