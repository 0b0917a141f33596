//! Engine lifecycle integration tests.

use crate::helpers::*;
use halo::prelude::*;
use halo::{DeviceState, Error};

fn graph_len(context: &AudioContext) -> usize {
    context.graph(|g| g.len()).expect("context closed")
}

#[test]
fn test_new_engine_is_uninitialized() {
    let (engine, context) = test_engine(AmbisonicOrder::First);

    assert_eq!(engine.state(), EngineState::Uninitialized);
    assert_eq!(engine.order(), AmbisonicOrder::First);
    assert_eq!(engine.volume(), 1.0);
    assert_eq!(engine.rendering_mode(), RenderingMode::Ambisonic);
    // Building touches nothing
    assert!(!context.is_created());
}

#[test]
fn test_gated_operations_before_initialize() {
    let (mut engine, _context) = test_engine(AmbisonicOrder::First);
    let content = single_channel_content(AmbisonicOrder::First, 0, 0.5, 0.1);

    assert!(engine.load_from_buffer(content).unwrap_err().is_contract_violation());
    assert!(engine
        .load(vec![ChunkSource::from(vec![0u8; 4])], |_| {})
        .unwrap_err()
        .is_contract_violation());
    assert!(engine.play(0.0).unwrap_err().is_contract_violation());
    assert!(engine.resume().unwrap_err().is_contract_violation());
    assert!(engine.prepare(0.0).unwrap_err().is_contract_violation());
    assert!(engine.stop().unwrap_err().is_contract_violation());
    assert!(engine.set_gain_db(-20.0).unwrap_err().is_contract_violation());
    assert!(engine.set_volume(0.5).unwrap_err().is_contract_violation());
    assert!(engine.output().unwrap_err().is_contract_violation());
    assert!(engine
        .start_publishing_audio_updates(std::time::Duration::ZERO, |_| {})
        .unwrap_err()
        .is_contract_violation());

    let stream = engine
        .context()
        .graph(|g| g.add(halo::core::GainNode::new(4, 1.0)))
        .unwrap();
    assert!(engine.bind_source(stream).unwrap_err().is_contract_violation());
}

#[test]
fn test_queries_before_load_report_empty() {
    let (engine, _context) = initialized_engine(AmbisonicOrder::First);

    assert_eq!(engine.duration_in_seconds().unwrap(), 0.0);
    assert_eq!(engine.elapsed_time_in_seconds().unwrap(), 0.0);
    assert_eq!(engine.sample_rate().unwrap(), 0.0);
    assert_eq!(engine.total_samples().unwrap(), 0);
    assert!(!engine.is_playing());
}

#[test]
fn test_rotation_before_initialize_is_ignored() {
    let (mut engine, context) = test_engine(AmbisonicOrder::Third);

    engine.rotate_with_azimuth_elevation(45.0, 10.0).unwrap();
    engine.notify(RotationQuaternion::new(Quaternion::IDENTITY).unwrap()).unwrap();
    assert_eq!(engine.state(), EngineState::Uninitialized);
    assert!(!context.is_created());
}

#[test]
fn test_initialize_builds_pipeline_once() {
    let (mut engine, context) = test_engine(AmbisonicOrder::Second);

    engine.initialize().unwrap();
    assert_eq!(engine.state(), EngineState::Initialized);
    assert_eq!(context.state(), DeviceState::Running);
    let nodes = graph_len(&context);
    assert!(nodes > 1);

    engine.initialize().unwrap();
    assert_eq!(graph_len(&context), nodes);

    let output = engine.output().unwrap();
    let routed = context
        .graph(|g| g.is_connected(output, g.destination()))
        .unwrap();
    assert!(routed);
}

#[test]
fn test_state_transitions() {
    let (mut engine, _context) = initialized_engine(AmbisonicOrder::First);

    engine
        .load_from_buffer(single_channel_content(AmbisonicOrder::First, 0, 0.5, 0.5))
        .unwrap();
    assert_eq!(engine.state(), EngineState::BufferLoaded);

    engine.dispose();
    assert_eq!(engine.state(), EngineState::Disposed);

    let (mut streaming, context) = initialized_engine(AmbisonicOrder::First);
    let stream = context
        .graph(|g| g.add(halo::core::GainNode::new(4, 1.0)))
        .unwrap();
    streaming.bind_source(stream).unwrap();
    assert_eq!(streaming.state(), EngineState::StreamBound);
}

#[test]
fn test_dispose_removes_every_engine_node() {
    let (mut engine, context) = initialized_engine(AmbisonicOrder::Third);
    engine
        .load_from_buffer(single_channel_content(AmbisonicOrder::Third, 0, 0.5, 0.5))
        .unwrap();
    engine.play(0.0).unwrap();
    engine
        .start_publishing_audio_updates(std::time::Duration::from_millis(50), |_| {})
        .unwrap();
    render_stereo(&context, 1024);

    engine.dispose();
    assert_eq!(graph_len(&context), 1);
    assert!(!engine.is_publishing_audio_updates());
    assert!(!engine.is_playing());
}

#[test]
fn test_dispose_is_idempotent() {
    let (mut engine, context) = initialized_engine(AmbisonicOrder::First);

    engine.dispose();
    engine.dispose();
    engine.stop_publishing_audio_updates();
    assert_eq!(engine.state(), EngineState::Disposed);
    assert_eq!(graph_len(&context), 1);
}

#[test]
fn test_operations_after_dispose_fail() {
    let (mut engine, _context) = initialized_engine(AmbisonicOrder::First);
    engine.dispose();

    assert!(engine.initialize().unwrap_err().is_contract_violation());
    assert!(engine
        .load_from_buffer(single_channel_content(AmbisonicOrder::First, 0, 0.5, 0.1))
        .unwrap_err()
        .is_contract_violation());
    assert!(engine.play(0.0).unwrap_err().is_contract_violation());
    assert!(engine.rotate_with_azimuth_elevation(10.0, 0.0).unwrap_err().is_contract_violation());
    assert!(engine.set_rendering_mode(RenderingMode::Off).unwrap_err().is_contract_violation());
    assert!(engine.duration_in_seconds().unwrap_err().is_contract_violation());
    assert!(engine.poll_events().unwrap_err().is_contract_violation());
    assert!(engine.set_loop(true).unwrap_err().is_contract_violation());
    assert!(engine.on_ended(|| {}).unwrap_err().is_contract_violation());
    assert!(!engine.is_loop());
}

#[test]
fn test_failed_reload_keeps_previous_content() {
    let (mut engine, context) = initialized_engine(AmbisonicOrder::First);
    engine
        .load_from_buffer(single_channel_content(AmbisonicOrder::First, 0, 0.5, 0.5))
        .unwrap();
    let frames = engine.total_samples().unwrap();

    context.close();
    assert!(engine
        .load_from_buffer(single_channel_content(AmbisonicOrder::First, 0, 0.5, 1.0))
        .is_err());
    assert_eq!(engine.state(), EngineState::BufferLoaded);
    assert_eq!(engine.total_samples().unwrap(), frames);
}

#[test]
fn test_drop_disposes() {
    let (engine, context) = initialized_engine(AmbisonicOrder::Second);
    assert!(graph_len(&context) > 1);

    drop(engine);
    assert_eq!(graph_len(&context), 1);
}

#[test]
fn test_stream_node_survives_dispose() {
    let (mut engine, context) = initialized_engine(AmbisonicOrder::First);
    let stream = context
        .graph(|g| g.add(halo::core::GainNode::new(4, 1.0)))
        .unwrap();
    engine.bind_source(stream).unwrap();

    engine.dispose();
    assert!(context.graph(|g| g.contains(stream)).unwrap());
    assert_eq!(graph_len(&context), 2);
}

#[test]
fn test_broken_hrir_chunk_leaves_engine_uninitialized() {
    init_tracing();
    let context = test_context();
    let valid = wav_bytes(&[vec![0.0; 64], vec![0.0; 64]], 48000);
    let mut engine = HaloEngine::builder()
        .order(AmbisonicOrder::First)
        .hrirs(HrirSource::Chunks(vec![
            ChunkSource::from(b"not a wav file".to_vec()),
            ChunkSource::from(valid),
        ]))
        .context(context.clone())
        .build()
        .unwrap();

    let err = engine.initialize().unwrap_err();
    match &err {
        Error::Dsp(halo::dsp::Error::Loader(inner)) => assert_eq!(inner.chunk_index(), Some(0)),
        other => panic!("Expected an HRIR decode failure, got {other:?}"),
    }
    assert_eq!(engine.state(), EngineState::Uninitialized);
    assert_eq!(graph_len(&context), 1);
    assert!(engine.play(0.0).unwrap_err().is_contract_violation());
}

#[test]
fn test_custom_hrir_chunks_initialize() {
    init_tracing();
    let mut impulse = vec![0.0; 64];
    impulse[0] = 1.0;
    let pair = wav_bytes(&[impulse.clone(), impulse], 48000);
    let mut engine = HaloEngine::builder()
        .order(AmbisonicOrder::First)
        .hrirs(HrirSource::Chunks(vec![
            ChunkSource::from(pair.clone()),
            ChunkSource::from(pair),
        ]))
        .context(test_context())
        .build()
        .unwrap();

    engine.initialize().unwrap();
    assert_eq!(engine.state(), EngineState::Initialized);
}

#[test]
fn test_builder_rejects_remap_above_first_order() {
    let result = HaloEngine::builder()
        .order(AmbisonicOrder::Second)
        .channel_map(ChannelMap::new(vec![1, 0, 2, 3, 4, 5, 6, 7, 8]).unwrap())
        .context(test_context())
        .build();
    assert!(matches!(
        result,
        Err(Error::Dsp(halo::dsp::Error::InvalidChannelMap(_)))
    ));

    let identity = HaloEngine::builder()
        .order(AmbisonicOrder::Second)
        .channel_map(ChannelMap::identity(9))
        .context(test_context())
        .build();
    assert!(identity.is_ok());
}

#[test]
fn test_builder_rejects_wrong_map_length() {
    let result = HaloEngine::builder()
        .order(AmbisonicOrder::First)
        .channel_map(ChannelMap::identity(9))
        .context(test_context())
        .build();
    assert!(matches!(result, Err(Error::Dsp(_))));
}

#[test]
fn test_channel_map_round_trips_through_renderer() {
    let (mut engine, _context) = initialized_engine(AmbisonicOrder::First);

    assert_eq!(engine.channel_map(), ChannelMap::identity(4));
    engine.set_channel_map(ChannelMap::fuma()).unwrap();
    assert_eq!(engine.channel_map(), ChannelMap::fuma());
}

#[test]
fn test_rendering_mode_stored_before_initialize() {
    let (mut engine, _context) = test_engine(AmbisonicOrder::First);

    engine.set_rendering_mode(RenderingMode::Bypass).unwrap();
    engine.initialize().unwrap();
    assert_eq!(engine.rendering_mode(), RenderingMode::Bypass);
}
