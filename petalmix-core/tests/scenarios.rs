//! End-to-end playback checks against a headless device.

use petalmix_core::{
    AudioDevice, AudioStream, Music, PetalMixDeviceDesc, PetalMixEvent, Sound, SoundPool, Wave,
    mixed_processor,
};
use std::f32::consts::TAU;
use std::sync::{Arc, Mutex};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn headless(sample_rate: u32, channels: u16) -> AudioDevice {
    init_logger();
    AudioDevice::headless(
        PetalMixDeviceDesc::new()
            .sample_rate(sample_rate)
            .channels(channels)
            .block_size(512),
    )
    .unwrap()
}

fn sine(frames: usize, sample_rate: u32, frequency: f32) -> Vec<f32> {
    (0..frames)
        .map(|i| (TAU * frequency * i as f32 / sample_rate as f32).sin() * 0.5)
        .collect()
}

#[test]
fn stream_reports_processed_only_after_a_slot_is_played() {
    let device = AudioDevice::headless(
        PetalMixDeviceDesc::new()
            .sample_rate(22050)
            .channels(1)
            .stream_buffer_frames(2048)
            .stream_buffer_count(2),
    )
    .unwrap();
    let mut stream = AudioStream::new(&device, 22050, 32, 1).unwrap();

    assert_eq!(stream.update(&sine(4096, 22050, 440.0)), 4096);
    assert!(!stream.is_buffer_processed());
    stream.play();

    let mut frame = [0.0f32; 1];
    for played in 1..2048 {
        device.render(&mut frame);
        assert!(
            !stream.is_buffer_processed(),
            "slot reported free after {} frames",
            played
        );
    }
    device.render(&mut frame);
    assert!(stream.is_buffer_processed());
    assert_eq!(stream.queued_frames(), 2048);
}

#[test]
fn stream_refilled_on_every_processed_slot_never_starves() {
    let device = AudioDevice::headless(
        PetalMixDeviceDesc::new()
            .sample_rate(22050)
            .channels(1)
            .stream_buffer_frames(1024)
            .stream_buffer_count(3),
    )
    .unwrap();
    let mut stream = AudioStream::new(&device, 22050, 32, 1).unwrap();
    let slot = vec![0.3f32; stream.buffer_frames()];

    while stream.is_buffer_processed() {
        stream.update(&slot);
    }
    stream.play();

    let mut block = vec![0.0f32; 512];
    for _ in 0..100 {
        device.render(&mut block);
        assert!(block.iter().all(|&s| (s - 0.3).abs() < 1e-6));
        while stream.is_buffer_processed() {
            stream.update(&slot);
        }
    }
}

#[test]
fn aliases_keep_independent_cursors_and_controls() {
    let device = headless(8000, 2);
    let ramp: Vec<f32> = (0..1000).map(|i| i as f32 / 1000.0).collect();
    let source = Sound::from_wave(&device, &Wave::from_samples(8000, 1, ramp.clone()).unwrap())
        .unwrap();
    let left = source.alias();
    let right = source.alias();
    left.set_pan(-1.0);
    right.set_pan(1.0);

    left.play();
    let mut out = vec![0.0f32; 200];
    device.render(&mut out);
    assert!(!right.is_playing());

    right.play();
    right.set_volume(0.5);
    assert_eq!(left.volume(), 1.0);

    let mut out = vec![0.0f32; 20];
    device.render(&mut out);
    for (i, frame) in out.chunks_exact(2).enumerate() {
        assert_eq!(frame[0], ramp[100 + i]);
        assert_eq!(frame[1], ramp[i] * 0.5);
    }
}

#[test]
fn aliases_share_one_sample_buffer() {
    let device = headless(8000, 1);
    let wave = Wave::from_samples(8000, 1, vec![0.1f32; 4000]).unwrap();
    let source = Sound::from_wave(&device, &wave).unwrap();
    let pool = SoundPool::new(&source, 4).unwrap();

    for alias in pool.iter() {
        assert!(alias.shares_buffer_with(&source));
        assert_eq!(alias.frame_count(), 4000);
    }
    let independent = Sound::from_wave(&device, &wave).unwrap();
    assert!(!independent.shares_buffer_with(&source));
}

#[test]
fn processors_run_in_attach_order_until_detached() {
    let device = headless(8000, 1);
    let log = Arc::new(Mutex::new(Vec::new()));

    let first_log = log.clone();
    let first = mixed_processor(move |_, _| first_log.lock().unwrap().push(1));
    let second_log = log.clone();
    let second = mixed_processor(move |_, _| second_log.lock().unwrap().push(2));

    device.attach_mixed_processor(&first);
    device.attach_mixed_processor(&second);
    let mut out = vec![0.0f32; 64];
    for _ in 0..3 {
        device.render(&mut out);
    }
    assert_eq!(*log.lock().unwrap(), vec![1, 2, 1, 2, 1, 2]);

    log.lock().unwrap().clear();
    device.detach_mixed_processor(&first);
    for _ in 0..2 {
        device.render(&mut out);
    }
    assert_eq!(*log.lock().unwrap(), vec![2, 2]);
}

#[test]
fn sound_round_trips_wave_samples() {
    let device = headless(44100, 2);
    let samples: Vec<i16> = (0..2000).map(|i| ((i * 37) % 65536 - 32768) as i16).collect();
    let wave = Wave::from_samples(44100, 2, samples).unwrap();

    let sound = Sound::from_wave(&device, &wave).unwrap();
    assert_eq!(sound.to_wave().unwrap(), wave);
    assert_eq!(sound.alias().to_wave().unwrap(), wave);
}

#[test]
fn pool_triggers_aliases_round_robin() {
    let device = headless(8000, 1);
    let wave = Wave::from_samples(8000, 1, vec![0.2f32; 8000]).unwrap();
    let source = Sound::from_wave(&device, &wave).unwrap();
    let mut pool = SoundPool::new(&source, 10).unwrap();

    let order: Vec<usize> = (0..15).map(|_| pool.play_next()).collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0, 1, 2, 3, 4]);
    assert_eq!(pool.playing_count(), 10);
    assert!(!source.is_playing());

    pool.stop_all();
    assert_eq!(pool.playing_count(), 0);
}

#[test]
fn swapping_processors_changes_gain() {
    let device = headless(8000, 1);
    let constant = Wave::from_samples(8000, 1, vec![0.25f32; 256]).unwrap();
    let sound = Sound::from_wave(&device, &constant).unwrap();
    sound.set_looping(true);
    sound.play();

    let halve = mixed_processor(|buffer, _| buffer.iter_mut().for_each(|s| *s *= 0.5));
    let double = mixed_processor(|buffer, _| buffer.iter_mut().for_each(|s| *s *= 2.0));
    let mut out = vec![0.0f32; 128];

    device.attach_mixed_processor(&halve);
    device.render(&mut out);
    assert!(out.iter().all(|&s| s == 0.125), "{:?}", &out[..8]);

    device.detach_mixed_processor(&halve);
    device.attach_mixed_processor(&double);
    device.render(&mut out);
    assert!(out.iter().all(|&s| s == 0.5), "{:?}", &out[..8]);
}

#[test]
fn one_shot_sound_stops_and_reports() {
    let device = headless(8000, 1);
    let sound = Sound::from_wave(
        &device,
        &Wave::from_samples(8000, 1, vec![0.5f32; 100]).unwrap(),
    )
    .unwrap();
    sound.play();

    let mut out = vec![0.0f32; 256];
    device.render(&mut out);

    assert!(!sound.is_playing());
    assert_eq!(out.iter().filter(|&&s| s != 0.0).count(), 100);
    assert_eq!(
        device.poll_events(),
        vec![PetalMixEvent::SoundFinished {
            voice_id: sound.id()
        }]
    );
}

#[test]
fn music_streams_exported_file_to_the_end() {
    init_logger();
    let device = AudioDevice::headless(
        PetalMixDeviceDesc::new()
            .sample_rate(8000)
            .channels(1)
            .stream_buffer_frames(128)
            .stream_buffer_count(2),
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("track.wav");
    Wave::from_samples(8000, 1, vec![8192i16; 300])
        .unwrap()
        .export(&path)
        .unwrap();

    let mut music = Music::load(&device, &path).unwrap();
    music.set_looping(false);
    assert!((music.time_length() - 300.0 / 8000.0).abs() < 1e-6);
    music.play();

    let mut block = vec![0.0f32; 128];
    let mut audible = 0;
    let mut finished = false;
    for _ in 0..10 {
        device.render(&mut block);
        audible += block.iter().filter(|&&s| s == 0.25).count();
        music.update();
        if device
            .poll_events()
            .iter()
            .any(|e| matches!(e, PetalMixEvent::StreamFinished { .. }))
        {
            finished = true;
            break;
        }
    }

    assert!(finished);
    assert_eq!(audible, 300);
    assert!(!music.is_playing());
}

#[test]
fn handles_outliving_device_are_inert() {
    let device = headless(8000, 1);
    let sound = Sound::from_wave(
        &device,
        &Wave::from_samples(8000, 1, vec![0.5f32; 100]).unwrap(),
    )
    .unwrap();
    let mut stream = AudioStream::new(&device, 8000, 32, 1).unwrap();
    device.close();

    sound.play();
    sound.set_volume(0.3);
    stream.update(&[0.1f32; 16]);
    stream.play();
    drop(stream);
    drop(sound);
}
