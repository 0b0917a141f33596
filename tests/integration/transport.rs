//! Buffer-mode transport, loading and stream binding.

use crate::helpers::tolerances::CLOCK_EPSILON;
use crate::helpers::*;
use halo::loader::FetchError;
use halo::prelude::*;
use halo::{AbortSignal, ChunkFetcher, Error};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn loaded_engine(seconds: f64) -> (HaloEngine, AudioContext) {
    let (mut engine, context) = initialized_engine(AmbisonicOrder::First);
    engine
        .load_from_buffer(single_channel_content(AmbisonicOrder::First, 0, 0.5, seconds))
        .unwrap();
    (engine, context)
}

fn add_stream(context: &AudioContext, channels: usize) -> NodeId {
    context
        .graph(|g| g.add(halo::core::GainNode::new(channels, 1.0)))
        .unwrap()
}

#[test]
fn test_loaded_content_reports_shape() {
    let (engine, _context) = loaded_engine(2.0);

    assert!((engine.duration_in_seconds().unwrap() - 2.0).abs() < 1e-9);
    assert_eq!(engine.total_samples().unwrap(), 96000);
    assert_eq!(engine.sample_rate().unwrap(), TEST_SAMPLE_RATE);
    assert_eq!(engine.elapsed_time_in_seconds().unwrap(), 0.0);
}

#[test]
fn test_play_from_fraction_sets_elapsed() {
    let (mut engine, _context) = loaded_engine(2.0);

    engine.play(0.5).unwrap();
    assert!(engine.is_playing());
    let elapsed = engine.elapsed_time_in_seconds().unwrap();
    assert!((elapsed - 1.0).abs() < CLOCK_EPSILON, "elapsed was {elapsed}");
}

#[test]
fn test_play_clamps_fraction() {
    let (mut engine, _context) = loaded_engine(2.0);

    engine.play(-3.0).unwrap();
    assert!(engine.elapsed_time_in_seconds().unwrap() < CLOCK_EPSILON);

    engine.play(7.0).unwrap();
    let elapsed = engine.elapsed_time_in_seconds().unwrap();
    assert!((elapsed - 2.0).abs() < 1e-9);

    assert!(engine.play(f64::NAN).unwrap_err().is_contract_violation());
}

#[test]
fn test_play_without_content_is_contract_violation() {
    let (mut engine, _context) = initialized_engine(AmbisonicOrder::First);

    assert!(engine.play(0.0).unwrap_err().is_contract_violation());
    assert!(engine.pause().unwrap_err().is_contract_violation());
}

#[test]
fn test_pause_freezes_elapsed() {
    let (mut engine, _context) = loaded_engine(2.0);

    engine.play(0.25).unwrap();
    engine.pause().unwrap();
    assert!(!engine.is_playing());
    let paused = engine.elapsed_time_in_seconds().unwrap();

    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(engine.elapsed_time_in_seconds().unwrap(), paused);

    engine.resume().unwrap();
    assert!(engine.is_playing());
    assert!(engine.elapsed_time_in_seconds().unwrap() >= paused);
}

#[test]
fn test_prepare_then_resume() {
    let (mut engine, _context) = loaded_engine(2.0);

    engine.play(0.0).unwrap();
    engine.prepare(1.5).unwrap();
    assert!(!engine.is_playing());
    assert_eq!(engine.elapsed_time_in_seconds().unwrap(), 1.5);

    engine.resume().unwrap();
    let elapsed = engine.elapsed_time_in_seconds().unwrap();
    assert!((elapsed - 1.5).abs() < CLOCK_EPSILON, "elapsed was {elapsed}");
}

#[test]
fn test_prepare_clamps_and_validates() {
    let (mut engine, _context) = loaded_engine(2.0);

    engine.prepare(10.0).unwrap();
    assert_eq!(engine.elapsed_time_in_seconds().unwrap(), 2.0);

    assert!(engine.prepare(-1.0).unwrap_err().is_contract_violation());
    assert!(engine.prepare(f64::INFINITY).unwrap_err().is_contract_violation());
}

#[test]
fn test_stop_rewinds() {
    let (mut engine, context) = loaded_engine(2.0);

    engine.play(0.5).unwrap();
    render_stereo(&context, 512);
    engine.stop().unwrap();

    assert!(!engine.is_playing());
    assert_eq!(engine.elapsed_time_in_seconds().unwrap(), 0.0);
}

#[test]
fn test_replay_replaces_source() {
    let (mut engine, context) = loaded_engine(2.0);
    engine.play(0.0).unwrap();
    let nodes = context.graph(|g| g.len()).unwrap();

    engine.play(0.5).unwrap();
    engine.play(0.1).unwrap();
    assert_eq!(context.graph(|g| g.len()).unwrap(), nodes);
}

#[test]
fn test_loop_flag_applies_to_next_play() {
    let (mut engine, context) = loaded_engine(0.05);
    assert!(!engine.is_loop());

    engine.set_loop(true).unwrap();
    assert!(engine.is_loop());
    engine.play(0.0).unwrap();

    // Several passes over the content, never ending
    render_stereo(&context, 9600);
    assert!(engine.poll_events().unwrap().is_empty());
    assert!(engine.is_playing());
}

#[test]
fn test_ended_fires_callback_once() {
    let (mut engine, context) = loaded_engine(0.05);
    let ended = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ended);
    engine
        .on_ended(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    engine.play(0.0).unwrap();
    render_stereo(&context, 4800);

    assert_eq!(engine.poll_events().unwrap(), vec![EngineEvent::Ended]);
    assert_eq!(ended.load(Ordering::SeqCst), 1);
    assert!((engine.elapsed_time_in_seconds().unwrap() - 0.05).abs() < 1e-9);

    render_stereo(&context, 1024);
    assert!(engine.poll_events().unwrap().is_empty());
    assert_eq!(ended.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stop_does_not_fire_ended() {
    let (mut engine, context) = loaded_engine(0.05);
    let ended = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ended);
    engine
        .on_ended(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    engine.play(0.0).unwrap();
    render_stereo(&context, 1024);
    engine.stop().unwrap();
    render_stereo(&context, 4800);

    assert!(engine.poll_events().unwrap().is_empty());
    assert_eq!(ended.load(Ordering::SeqCst), 0);
}

#[test]
fn test_stale_ended_event_is_dropped_on_replay() {
    let (mut engine, context) = loaded_engine(0.05);

    engine.play(0.0).unwrap();
    render_stereo(&context, 4800);
    // Restart before polling; the first source's end is discarded with it
    engine.play(0.0).unwrap();

    assert!(engine.poll_events().unwrap().is_empty());
}

#[test]
fn test_content_channel_mismatch() {
    let (mut engine, _context) = initialized_engine(AmbisonicOrder::Second);
    let first_order = single_channel_content(AmbisonicOrder::First, 0, 0.5, 0.1);

    let err = engine.load_from_buffer(first_order).unwrap_err();
    assert!(matches!(err, Error::ContentMismatch(_)));
    assert_eq!(engine.state(), EngineState::Initialized);
}

#[test]
fn test_empty_content_rejected() {
    let (mut engine, _context) = initialized_engine(AmbisonicOrder::First);
    let empty = ContentBuffer::silent(4, 0, TEST_SAMPLE_RATE).unwrap();

    assert!(matches!(
        engine.load_from_buffer(empty),
        Err(Error::ContentMismatch(_))
    ));
}

#[test]
fn test_reload_replaces_content() {
    let (mut engine, context) = loaded_engine(2.0);
    engine.play(0.0).unwrap();
    let nodes = context.graph(|g| g.len()).unwrap();

    engine
        .load_from_buffer(single_channel_content(AmbisonicOrder::First, 0, 0.5, 1.0))
        .unwrap();
    assert!(!engine.is_playing());
    assert!((engine.duration_in_seconds().unwrap() - 1.0).abs() < 1e-9);
    assert_eq!(context.graph(|g| g.len()).unwrap(), nodes - 1);
}

// ---------------- Stream mode ----------------

#[test]
fn test_stream_mode_rejects_buffer_operations() {
    let (mut engine, context) = initialized_engine(AmbisonicOrder::First);
    engine.bind_source(add_stream(&context, 4)).unwrap();

    assert!(engine.play(0.0).unwrap_err().is_contract_violation());
    assert!(engine.resume().unwrap_err().is_contract_violation());
    assert!(engine.pause().unwrap_err().is_contract_violation());
    assert!(engine.prepare(0.0).unwrap_err().is_contract_violation());
    assert!(engine.stop().unwrap_err().is_contract_violation());
    assert!(engine.elapsed_time_in_seconds().unwrap_err().is_contract_violation());
    assert!(engine.duration_in_seconds().unwrap_err().is_contract_violation());
    assert!(engine.total_samples().unwrap_err().is_contract_violation());
    assert!(engine
        .load_from_buffer(single_channel_content(AmbisonicOrder::First, 0, 0.5, 0.1))
        .unwrap_err()
        .is_contract_violation());
    assert!(engine
        .load(vec![ChunkSource::from(vec![0u8; 4])], |_| {})
        .unwrap_err()
        .is_contract_violation());
}

#[test]
fn test_bind_after_load_is_contract_violation() {
    let (mut engine, context) = loaded_engine(0.5);

    let stream = add_stream(&context, 4);
    assert!(engine.bind_source(stream).unwrap_err().is_contract_violation());
    assert_eq!(engine.state(), EngineState::BufferLoaded);
}

#[test]
fn test_rebind_replaces_stream() {
    let (mut engine, context) = initialized_engine(AmbisonicOrder::First);
    let first = add_stream(&context, 4);
    let second = add_stream(&context, 4);

    engine.bind_source(first).unwrap();
    engine.bind_source(second).unwrap();

    let input_of = |source| {
        context
            .graph(|g| {
                g.connections()
                    .iter()
                    .filter(|c| c.from == source)
                    .count()
            })
            .unwrap()
    };
    assert_eq!(input_of(first), 0);
    assert!(input_of(second) > 0);
}

// ---------------- Loading ----------------

fn first_order_chunks(frames: usize) -> (Vec<u8>, Vec<u8>) {
    let low = wav_bytes(&[vec![0.5; frames], vec![0.0; frames]], 48000);
    let high = wav_bytes(&[vec![0.0; frames], vec![0.25; frames]], 48000);
    (low, high)
}

#[test]
fn test_load_from_files_reports_progress() {
    let (mut engine, _context) = initialized_engine(AmbisonicOrder::First);
    let dir = tempfile::tempdir().unwrap();
    let (low, high) = first_order_chunks(24000);
    let low_path = dir.path().join("scene-0.wav");
    let high_path = dir.path().join("scene-1.wav");
    std::fs::write(&low_path, low).unwrap();
    std::fs::write(&high_path, high).unwrap();

    let mut progress = Vec::new();
    engine
        .load(vec![low_path.into(), high_path.into()], |p| progress.push(p))
        .unwrap();

    assert_eq!(engine.state(), EngineState::BufferLoaded);
    assert_eq!(engine.total_samples().unwrap(), 24000);
    assert!((engine.duration_in_seconds().unwrap() - 0.5).abs() < 1e-9);

    for chunk in 0..2 {
        let last = progress
            .iter()
            .filter(|p| p.chunk_index == chunk)
            .last()
            .expect("no progress for chunk");
        assert_eq!(last.bytes_loaded, last.bytes_total);
    }
}

#[test]
fn test_load_with_remote_fetcher() {
    let dir = tempfile::tempdir().unwrap();
    let (low, high) = first_order_chunks(4800);
    std::fs::write(dir.path().join("a.wav"), low).unwrap();
    std::fs::write(dir.path().join("b.wav"), high).unwrap();
    let fetcher: Arc<dyn ChunkFetcher> = Arc::new(halo::FileFetcher::new(dir.path()));

    let (mut engine, _context) = initialized_engine(AmbisonicOrder::First);
    engine
        .load(
            vec![
                ChunkSource::remote(Arc::clone(&fetcher), "a.wav"),
                ChunkSource::remote(fetcher, "b.wav"),
            ],
            |_| {},
        )
        .unwrap();
    assert_eq!(engine.total_samples().unwrap(), 4800);
}

#[test]
fn test_broken_chunk_rejects_whole_load() {
    let (mut engine, _context) = initialized_engine(AmbisonicOrder::Second);
    let pair = |level: f32| wav_bytes(&[vec![level; 4800], vec![level; 4800], vec![level; 4800]], 48000);

    let err = engine
        .load(
            vec![
                ChunkSource::from(pair(0.1)),
                ChunkSource::from(b"RIFF garbage".to_vec()),
                ChunkSource::from(pair(0.3)),
            ],
            |_| {},
        )
        .unwrap_err();

    match &err {
        Error::Loader(inner) => assert_eq!(inner.chunk_index(), Some(1)),
        other => panic!("Expected a loader error, got {other:?}"),
    }
    assert_eq!(engine.state(), EngineState::Initialized);
    assert_eq!(engine.total_samples().unwrap(), 0);
}

#[test]
fn test_failed_reload_keeps_previous_content() {
    let (mut engine, _context) = loaded_engine(2.0);

    let result = engine.load(vec![ChunkSource::from(b"nope".to_vec())], |_| {});
    assert!(result.is_err());
    assert_eq!(engine.state(), EngineState::BufferLoaded);
    assert_eq!(engine.total_samples().unwrap(), 96000);
}

#[test]
fn test_merged_channels_mismatch_order() {
    let (mut engine, _context) = initialized_engine(AmbisonicOrder::First);
    let (low, _) = first_order_chunks(480);

    let err = engine.load(vec![ChunkSource::from(low)], |_| {}).unwrap_err();
    assert!(matches!(err, Error::ContentMismatch(_)));
}

/// Fetcher that never finishes until aborted.
struct StallingFetcher;

impl ChunkFetcher for StallingFetcher {
    fn fetch(
        &self,
        _reference: &str,
        progress: &mut dyn FnMut(u64, u64),
        abort: &AbortSignal,
    ) -> Result<Vec<u8>, FetchError> {
        progress(0, 1024);
        while !abort.is_aborted() {
            std::thread::sleep(Duration::from_millis(5));
        }
        Err(FetchError::Aborted)
    }
}

#[test]
fn test_abort_load_cancels() {
    let (mut engine, _context) = initialized_engine(AmbisonicOrder::First);

    let handle = engine
        .begin_load(vec![ChunkSource::remote(Arc::new(StallingFetcher), "scene")])
        .unwrap();
    assert!(engine.load_abort_handle().is_some());
    engine.abort_load();

    let err = engine.finish_load(handle, |_| {}).unwrap_err();
    assert!(err.is_cancelled());
    assert!(engine.load_abort_handle().is_none());
    assert_eq!(engine.state(), EngineState::Initialized);
}

#[test]
fn test_abort_from_another_thread() {
    let (mut engine, _context) = initialized_engine(AmbisonicOrder::First);

    let handle = engine
        .begin_load(vec![ChunkSource::remote(Arc::new(StallingFetcher), "scene")])
        .unwrap();
    let signal = engine.load_abort_handle().unwrap();
    let aborter = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        signal.abort();
    });

    let err = engine.finish_load(handle, |_| {}).unwrap_err();
    aborter.join().unwrap();
    assert!(err.is_cancelled());
}

#[test]
fn test_new_load_aborts_previous() {
    let (mut engine, _context) = initialized_engine(AmbisonicOrder::First);

    let stalled = engine
        .begin_load(vec![ChunkSource::remote(Arc::new(StallingFetcher), "scene")])
        .unwrap();
    let stalled_signal = engine.load_abort_handle().unwrap();

    let (low, high) = first_order_chunks(480);
    engine
        .load(vec![ChunkSource::from(low), ChunkSource::from(high)], |_| {})
        .unwrap();

    assert!(stalled_signal.is_aborted());
    assert!(stalled.wait().unwrap_err().is_cancelled());
    assert_eq!(engine.total_samples().unwrap(), 480);
}
