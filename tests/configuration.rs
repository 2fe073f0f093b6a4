//! EncodeOptions, Device, and strategy selection tests.

use chunk_encoder::{
    DEFAULT_BATCH_SIZE, DEFAULT_GENERATED_CAPTION_KEY, DEFAULT_WORKER_COUNT, Device, EncodeError,
    EncodeOptions, StrategyKind,
};

// ── EncodeOptions builder ──────────────────────────────────────────

#[test]
fn config_defaults() {
    let config = EncodeOptions::new();
    assert_eq!(config.batch_size(), DEFAULT_BATCH_SIZE);
    assert_eq!(config.batch_size(), 128);
    assert_eq!(config.worker_count(), DEFAULT_WORKER_COUNT);
    assert_eq!(config.worker_count(), 6);
    assert_eq!(config.generated_caption_key(), DEFAULT_GENERATED_CAPTION_KEY);
    assert_eq!(config.device(), Device::Cpu);

    let debug = format!("{config:?}");
    assert!(debug.contains("EncodeOptions"));
    assert!(debug.contains("has_cancellation: false"));
    assert!(debug.contains("low_priority: false"));
}

#[test]
fn config_with_batch_size_clamps_zero() {
    let config = EncodeOptions::new().with_batch_size(0);
    assert_eq!(config.batch_size(), 1);
}

#[test]
fn config_with_worker_count_clamps_zero() {
    let config = EncodeOptions::new().with_worker_count(0);
    assert_eq!(config.worker_count(), 1);
}

#[test]
fn config_with_caption_key_and_device() {
    let config = EncodeOptions::new()
        .with_generated_caption_key("caption")
        .with_device(Device::Cuda(2));
    assert_eq!(config.generated_caption_key(), "caption");
    assert_eq!(config.device(), Device::Cuda(2));
    assert!(format!("{config:?}").contains("Cuda(2)"));
}

// ── Strategy selection ─────────────────────────────────────────────

#[test]
fn default_strategy_is_embedding() {
    assert_eq!(EncodeOptions::new().strategy().unwrap(), StrategyKind::Embedding);
}

#[test]
fn tokenization_alone() {
    let config = EncodeOptions::new().with_frame_tokenization_strategy("vqgan");
    assert_eq!(config.strategy().unwrap(), StrategyKind::FrameTokenization);
}

#[test]
fn captioning_alone() {
    let config = EncodeOptions::new().with_captioning_strategy("coca");
    assert_eq!(config.strategy().unwrap(), StrategyKind::Captioning);
}

#[test]
fn captioning_takes_precedence() {
    let config = EncodeOptions::new()
        .with_captioning_strategy("coca")
        .with_frame_tokenization_strategy("vqgan");
    assert_eq!(config.strategy().unwrap(), StrategyKind::Captioning);
}

#[test]
fn strict_strategy_rejects_conflict() {
    let config = EncodeOptions::new()
        .with_captioning_strategy("coca")
        .with_frame_tokenization_strategy("vqgan")
        .with_strict_strategy(true);
    match config.strategy() {
        Err(EncodeError::Configuration(message)) => {
            assert!(message.contains("coca"));
            assert!(message.contains("vqgan"));
        }
        other => panic!("Expected Configuration, got: {other:?}"),
    }
}

#[test]
fn strict_strategy_allows_single_selection() {
    let config = EncodeOptions::new()
        .with_frame_tokenization_strategy("vqgan")
        .with_strict_strategy(true);
    assert_eq!(config.strategy().unwrap(), StrategyKind::FrameTokenization);
}

#[test]
fn empty_strategy_name_is_unset() {
    let config = EncodeOptions::new()
        .with_captioning_strategy("coca")
        .with_captioning_strategy("  ");
    assert_eq!(config.strategy().unwrap(), StrategyKind::Embedding);
}

#[test]
fn strategy_display_names() {
    assert_eq!(StrategyKind::Embedding.to_string(), "embedding");
    assert_eq!(StrategyKind::FrameTokenization.to_string(), "frame_tokenization");
    assert_eq!(StrategyKind::Captioning.to_string(), "captioning");
}

// ── Device ─────────────────────────────────────────────────────────

#[test]
fn device_round_trips_through_display() {
    for device in [Device::Cpu, Device::Cuda(0), Device::Cuda(7)] {
        assert_eq!(device.to_string().parse::<Device>().unwrap(), device);
    }
}

#[test]
fn device_rejects_bad_ordinal() {
    assert!(matches!(
        "cuda:x".parse::<Device>(),
        Err(EncodeError::Configuration(_))
    ));
    assert_eq!(" GPU ".parse::<Device>().unwrap(), Device::Cuda(0));
}
