//! Audio rendered through the full engine graph.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use approx::assert_abs_diff_eq;
use halo::prelude::*;
use halo::{db_to_linear, volume_to_gain, MAX_DB, RENDER_QUANTUM};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Frames rendered before measuring, past the HRIR tail and the first blocks.
/// A whole number of render quanta, so measurements start on a quantum edge.
const WARM_UP: usize = 38 * RENDER_QUANTUM;

fn full_volume_gain() -> f32 {
    db_to_linear(volume_to_gain(1.0))
}

fn playing(order: AmbisonicOrder, content: ContentBuffer) -> (HaloEngine, AudioContext) {
    let (mut engine, context) = initialized_engine(order);
    engine.load_from_buffer(content).unwrap();
    engine.play(0.0).unwrap();
    render_stereo(&context, WARM_UP);
    (engine, context)
}

fn bypass_engine(context: AudioContext) -> HaloEngine {
    init_tracing();
    let mut engine = HaloEngine::builder()
        .order(AmbisonicOrder::First)
        .rendering_mode(RenderingMode::Bypass)
        .context(context)
        .build()
        .unwrap();
    engine.initialize().unwrap();
    engine
}

#[test]
fn test_silent_without_content() {
    let (_engine, context) = initialized_engine(AmbisonicOrder::First);

    let (left, right) = render_stereo(&context, 1024);
    assert_silence(&left, 0.0);
    assert_silence(&right, 0.0);
}

#[test]
fn test_omni_content_is_centered() {
    let content = sine_content(AmbisonicOrder::Third, 0, 1000.0, 0.5, 1.0);
    let (_engine, context) = playing(AmbisonicOrder::Third, content);

    let (left, right) = render_stereo(&context, 2048);
    assert_has_audio(&left, 1e-3);
    assert!(max_difference(&left, &right) <= FLOAT_EPSILON);
}

#[test]
fn test_front_content_is_centered() {
    let content = sine_content(AmbisonicOrder::First, 3, 1000.0, 0.5, 1.0);
    let (_engine, context) = playing(AmbisonicOrder::First, content);

    let (left, right) = render_stereo(&context, 2048);
    assert_has_audio(&left, 1e-3);
    assert!(max_difference(&left, &right) <= DSP_EPSILON);
}

#[test]
fn test_quarter_turn_moves_front_to_side() {
    let content = sine_content(AmbisonicOrder::First, 3, 1000.0, 0.5, 1.0);
    let (mut engine, context) = playing(AmbisonicOrder::First, content);

    engine.rotate_with_azimuth_elevation(90.0, 0.0).unwrap();
    render_stereo(&context, WARM_UP);

    let (left, right) = render_stereo(&context, 2048);
    assert_has_audio(&left, 1e-3);
    let inverted: Vec<f32> = right.iter().map(|s| -s).collect();
    assert!(max_difference(&left, &inverted) <= DSP_EPSILON);
}

#[test]
fn test_head_tracker_rotation() {
    let content = sine_content(AmbisonicOrder::First, 3, 1000.0, 0.5, 1.0);
    let (mut engine, context) = playing(AmbisonicOrder::First, content);

    // Quarter turn about +Z
    let half = std::f32::consts::FRAC_PI_4;
    let turn = RotationQuaternion::new(Quaternion::new(half.cos(), 0.0, 0.0, half.sin())).unwrap();
    engine.notify(turn).unwrap();
    render_stereo(&context, WARM_UP);

    let (left, right) = render_stereo(&context, 2048);
    let inverted: Vec<f32> = right.iter().map(|s| -s).collect();
    assert!(max_difference(&left, &inverted) <= DSP_EPSILON);
}

#[test]
fn test_bypass_level() {
    let context = test_context();
    let mut engine = bypass_engine(context.clone());
    engine
        .load_from_buffer(constant_content(&[0.5, 0.25, 0.0, 0.0], 1.0, TEST_SAMPLE_RATE))
        .unwrap();
    engine.play(0.0).unwrap();

    let (left, right) = render_stereo(&context, 1024);
    let gain = full_volume_gain();
    assert_abs_diff_eq!(left[1023], 0.5 * gain, epsilon = DSP_EPSILON);
    assert_abs_diff_eq!(right[1023], 0.25 * gain, epsilon = DSP_EPSILON);
    assert_abs_diff_eq!(gain, db_to_linear(MAX_DB), epsilon = FLOAT_EPSILON);
}

#[test]
fn test_off_is_silent() {
    let content = sine_content(AmbisonicOrder::Second, 0, 1000.0, 0.5, 1.0);
    let (mut engine, context) = playing(AmbisonicOrder::Second, content);

    engine.set_rendering_mode(RenderingMode::Off).unwrap();
    let (left, right) = render_stereo(&context, 1024);
    assert_silence(&left, 0.0);
    assert_silence(&right, 0.0);

    engine.set_rendering_mode(RenderingMode::Ambisonic).unwrap();
    render_stereo(&context, WARM_UP);
    let (left, _) = render_stereo(&context, 1024);
    assert_has_audio(&left, 1e-3);
}

#[test]
fn test_high_device_rate_is_compensated() {
    let context = AudioContext::offline(96000.0);
    let mut engine = bypass_engine(context.clone());
    engine
        .load_from_buffer(constant_content(&[0.5, 0.5, 0.0, 0.0], 2.0, TEST_SAMPLE_RATE))
        .unwrap();
    engine.play(0.0).unwrap();

    let (left, right) = render_stereo(&context, 1024);
    let expected = 0.5 * full_volume_gain() * 0.5;
    assert_abs_diff_eq!(left[1023], expected, epsilon = DSP_EPSILON);
    assert_abs_diff_eq!(right[1023], expected, epsilon = DSP_EPSILON);
}

#[test]
fn test_volume_zero_reaches_floor() {
    let context = test_context();
    let mut engine = bypass_engine(context.clone());
    engine
        .load_from_buffer(constant_content(&[0.5, 0.5, 0.0, 0.0], 2.0, TEST_SAMPLE_RATE))
        .unwrap();
    engine.play(0.0).unwrap();

    engine.set_volume(0.0).unwrap();
    assert_eq!(engine.volume(), 0.0);
    assert_abs_diff_eq!(engine.gain_db().unwrap(), -80.0, epsilon = 1e-3);

    render_stereo(&context, 48000);
    let (left, _) = render_stereo(&context, 1024);
    assert!(peak(&left) < 0.01, "peak after fade was {}", peak(&left));
}

#[test]
fn test_gain_ramps_rather_than_jumps() {
    let context = test_context();
    let mut engine = bypass_engine(context.clone());
    engine
        .load_from_buffer(constant_content(&[0.5, 0.5, 0.0, 0.0], 2.0, TEST_SAMPLE_RATE))
        .unwrap();
    engine.play(0.0).unwrap();
    let (before, _) = render_stereo(&context, 128);

    engine.set_gain_db(-40.0).unwrap();
    let (during, _) = render_stereo(&context, 128);

    // First frame after the change is still near the old level
    assert!(during[0] > before[127] * 0.5);
    assert!(during[127] < during[0]);
}

#[test]
fn test_set_gain_db_target() {
    let (mut engine, _context) = initialized_engine(AmbisonicOrder::First);

    engine.set_gain_db(-20.0).unwrap();
    assert_abs_diff_eq!(engine.gain_db().unwrap(), -20.0, epsilon = 1e-3);

    engine.set_gain_db(f32::NAN).unwrap();
    assert_abs_diff_eq!(engine.gain_db().unwrap(), -20.0, epsilon = 1e-3);
}

#[test]
fn test_bound_stream_is_rendered() {
    let context = test_context();
    let mut engine = bypass_engine(context.clone());

    let content = Arc::new(constant_content(&[0.5, 0.0, 0.0, 0.0], 1.0, TEST_SAMPLE_RATE));
    let stream = context
        .graph(|g| {
            let mut node = halo::core::BufferSourceNode::new(content);
            node.start(0.0);
            g.add(node)
        })
        .unwrap();
    engine.bind_source(stream).unwrap();

    let (left, right) = render_stereo(&context, 1024);
    assert_abs_diff_eq!(left[1023], 0.5 * full_volume_gain(), epsilon = DSP_EPSILON);
    assert_silence(&right, FLOAT_EPSILON);
}

// ---------------- Visualization tap ----------------

type Messages = Arc<Mutex<Vec<Vec<f32>>>>;

fn collect_messages(engine: &mut HaloEngine) -> Messages {
    let messages: Messages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    engine
        .start_publishing_audio_updates(Duration::ZERO, move |data| sink.lock().push(data.to_vec()))
        .unwrap();
    messages
}

#[test]
fn test_tap_publishes_n3d_messages() {
    let (mut engine, context) = initialized_engine(AmbisonicOrder::First);
    engine
        .load_from_buffer(constant_content(&[0.5, 0.25, 0.0, 0.0], 2.0, TEST_SAMPLE_RATE))
        .unwrap();
    engine.play(0.0).unwrap();
    let messages = collect_messages(&mut engine);
    assert!(engine.is_publishing_audio_updates());

    render_stereo(&context, 1920);
    assert!(wait_until(5000, || !messages.lock().is_empty()));

    {
        let received = messages.lock();
        let first = &received[0];
        assert_eq!(first.len(), 960 * 16);
        assert_abs_diff_eq!(first[0], 0.5, epsilon = FLOAT_EPSILON);
        assert_abs_diff_eq!(first[1], 0.25 * 3f32.sqrt(), epsilon = FLOAT_EPSILON);
        assert_eq!(first[2], 0.0);
        assert!(first[4..16].iter().all(|s| *s == 0.0));
        // Second frame, same layout
        assert_abs_diff_eq!(first[16], 0.5, epsilon = FLOAT_EPSILON);
    }

    engine.stop_publishing_audio_updates();
    assert!(!engine.is_publishing_audio_updates());
    let received = messages.lock();
    let last = received.last().unwrap();
    assert!(last.iter().all(|s| *s == 0.0));
}

#[test]
fn test_tap_follows_new_source() {
    let (mut engine, context) = initialized_engine(AmbisonicOrder::First);
    engine
        .load_from_buffer(constant_content(&[0.5, 0.0, 0.0, 0.0], 2.0, TEST_SAMPLE_RATE))
        .unwrap();
    // Tap first, playback second
    let messages = collect_messages(&mut engine);
    engine.play(0.0).unwrap();

    render_stereo(&context, 960 * 3);
    assert!(wait_until(5000, || messages.lock().len() >= 2));
    let received = messages.lock();
    assert!(received
        .iter()
        .any(|message| (message[0] - 0.5).abs() < FLOAT_EPSILON));
}

#[test]
fn test_tap_does_not_alter_output() {
    let render_with = |tap: bool| {
        let (mut engine, context) = initialized_engine(AmbisonicOrder::Second);
        engine
            .load_from_buffer(sine_content(AmbisonicOrder::Second, 4, 700.0, 0.5, 1.0))
            .unwrap();
        engine.play(0.0).unwrap();
        let _messages = tap.then(|| collect_messages(&mut engine));
        let rendered = render_stereo(&context, 4096);
        engine.dispose();
        rendered
    };

    let plain = render_with(false);
    let tapped = render_with(true);
    assert_eq!(plain, tapped);
}

#[test]
fn test_restart_replaces_tap() {
    let (mut engine, context) = initialized_engine(AmbisonicOrder::First);
    let first = collect_messages(&mut engine);
    let nodes = context.graph(|g| g.len()).unwrap();

    let second = collect_messages(&mut engine);
    assert_eq!(context.graph(|g| g.len()).unwrap(), nodes);

    // The replaced tap was stopped and signalled
    let stopped = first.lock();
    assert!(stopped.last().unwrap().iter().all(|s| *s == 0.0));
    drop(stopped);

    engine.stop_publishing_audio_updates();
    assert_eq!(second.lock().len(), 1);
}
