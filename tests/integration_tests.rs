//! Integration Tests
//!
//! End-to-end tests for the ambient effect pipeline: effect directory on
//! disk, session context, activity monitor and signal graph.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use ambience::dsp::GatePhase;
use ambience::engine::{encode_wav, generate_test_tone, AudioBuffer};
use ambience::graph::{
    CaptureConstraints, CaptureStream, DeviceCapture, InputSelector, NodeKind, SignalGraphConfig,
};
use ambience::playback::{EffectUploader, LocalEffectStore, MANIFEST_FILE};
use ambience::{AmbienceError, EngineSettings, Result, SessionContext};

/// Capture collaborator that hands out a stream for any device but "unplugged"
struct TestMics;

#[async_trait]
impl DeviceCapture for TestMics {
    async fn request_stream(&self, constraints: &CaptureConstraints) -> Result<CaptureStream> {
        if constraints.device_id == "unplugged" {
            return Err(AmbienceError::DeviceAcquisitionFailure {
                selector: constraints.device_id.clone(),
                reason: "device not found".to_string(),
            });
        }
        Ok(CaptureStream::new(constraints.device_id.clone()))
    }
}

fn write_effect(dir: &Path, name: &str, freq: f32) {
    let tone = generate_test_tone(freq, 0.5, 0.25, 48000, 2);
    std::fs::write(dir.join(name), encode_wav(&tone).unwrap()).unwrap();
}

/// Effect directory with two good files, one corrupt file and a manifest
fn effect_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_effect(dir.path(), "rain.wav", 200.0);
    write_effect(dir.path(), "wind.wav", 300.0);
    std::fs::write(dir.path().join("broken.wav"), b"RIFF....not really").unwrap();
    std::fs::write(
        dir.path().join(MANIFEST_FILE),
        r#"["rain.wav", "broken.wav", "wind.wav", "missing.wav"]"#,
    )
    .unwrap();
    dir
}

fn session(dir: &TempDir, settings: EngineSettings) -> SessionContext {
    let store = Arc::new(LocalEffectStore::new(dir.path()));
    let settings = EngineSettings {
        sfx_directory: store.directory(),
        ..settings
    };
    SessionContext::new(settings, store.clone(), Arc::new(TestMics))
        .unwrap()
        .with_uploader(store)
}

fn block(amplitude: f32, frames: usize) -> Vec<f32> {
    vec![amplitude; frames]
}

// === Effect Library ===

#[tokio::test]
async fn test_reload_from_disk_skips_bad_entries() {
    let dir = effect_dir();
    let session = session(&dir, EngineSettings::default());

    let report = session.reload().await.unwrap();
    assert_eq!(report.requested, 4);
    assert_eq!(report.loaded, 2);
    assert_eq!(session.library().ids(), vec!["rain.wav", "wind.wav"]);

    let codes: Vec<_> = report.failures.iter().map(|f| f.code).collect();
    assert_eq!(codes, vec!["DECODE_FAILURE", "NETWORK_FAILURE"]);
}

#[tokio::test]
async fn test_broken_manifest_keeps_library() {
    let dir = effect_dir();
    let session = session(&dir, EngineSettings::default());
    session.reload().await.unwrap();

    std::fs::write(dir.path().join(MANIFEST_FILE), "not json").unwrap();
    let err = session.reload().await.unwrap_err();
    assert_eq!(err.error_code(), "NETWORK_FAILURE");
    assert!(err.is_recoverable());
    assert_eq!(session.library().len(), 2);
}

#[tokio::test]
async fn test_upload_regenerates_manifest() {
    let dir = effect_dir();
    let session = session(&dir, EngineSettings::default());

    let tone = generate_test_tone(500.0, 0.3, 0.1, 48000, 1);
    let report = session
        .upload(encode_wav(&tone).unwrap(), "chime.wav")
        .await
        .unwrap();

    // The regenerated manifest lists every .wav present, including the corrupt one
    assert_eq!(report.requested, 4);
    assert_eq!(
        session.library().ids(),
        vec!["chime.wav", "rain.wav", "wind.wav"]
    );
}

#[tokio::test]
async fn test_store_rejects_non_wav_upload() {
    let dir = effect_dir();
    let store = LocalEffectStore::new(dir.path());
    let err = store.upload(vec![0; 8], "track.mp3").await.unwrap_err();
    assert_eq!(err.error_code(), "UPLOAD_FAILURE");
}

// === Session Flow ===

#[tokio::test(start_paused = true)]
async fn test_speech_opens_and_silence_closes_effect() {
    let dir = effect_dir();
    let session = session(
        &dir,
        EngineSettings {
            sfx_gain: 0.3,
            sfx_threshold_db: -35.0,
            ..Default::default()
        },
    );
    session.reload().await.unwrap();
    session.start_session().await.unwrap();

    // Speaker talks: loud capture, loud conversion output
    let mut converted = block(0.3, 480);
    session.process_frames(&block(0.3, 480), &mut converted, 1);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(session.phase(), GatePhase::Active);
    assert!(session.is_playing());
    assert_eq!(session.stage().value(), 0.3);

    // Speaker stops: silent capture and silent conversion for 1 s
    let mut converted = block(0.0, 480);
    session.process_frames(&block(0.0, 480), &mut converted, 1);
    // The mixed block carries the effect; the meter saw silence
    assert!(converted.iter().any(|s| *s != 0.0));
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(session.phase(), GatePhase::Active);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(session.phase(), GatePhase::Idle);
    assert_eq!(session.stage().value(), 0.0);
    assert!(!session.is_playing());

    session.shutdown().await;
    assert!(!session.is_monitoring());
}

#[tokio::test]
async fn test_manual_override() {
    let dir = effect_dir();
    let session = session(&dir, EngineSettings::default());

    let err = session.start().unwrap_err();
    assert_eq!(err.error_code(), "EMPTY_LIBRARY");

    session.reload().await.unwrap();
    session.select_effect(1);
    session.start().unwrap();
    assert_eq!(session.phase(), GatePhase::Active);
    assert!(session.stage().connected().is_some());

    session.stop();
    assert_eq!(session.phase(), GatePhase::Idle);
    assert_eq!(session.stage().connected(), None);
}

#[tokio::test]
async fn test_mixed_output_is_clipped() {
    let dir = effect_dir();
    let session = session(&dir, EngineSettings::default());
    session.reload().await.unwrap();
    session.start().unwrap();

    let mut converted = block(0.95, 2 * 4800);
    session.process_frames(&block(0.0, 4800), &mut converted, 2);
    assert!(converted.iter().all(|s| (-1.0..=1.0).contains(s)));

    let mixed = AudioBuffer::from_interleaved(&converted, 2, 48000).unwrap();
    assert_eq!(mixed.len(), 4800);
}

// === Signal Graph ===

#[tokio::test]
async fn test_device_failure_then_recovery() {
    let dir = effect_dir();
    let session = session(&dir, EngineSettings::default());

    let config = SignalGraphConfig {
        input: InputSelector::Device("unplugged".to_string()),
        ..Default::default()
    };
    let err = session.reconfigure(config).await.unwrap_err();
    assert_eq!(err.error_code(), "DEVICE_ACQUISITION_FAILURE");
    assert!(!err.recovery_suggestions().is_empty());
    assert!(!session.controller().is_active());
    assert!(session.routing().is_none());

    let handles = session
        .reconfigure(SignalGraphConfig {
            input: InputSelector::Device("usb-mic".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(session.controller().is_active());
    assert_eq!(handles.stream.unwrap().device_id(), "usb-mic");
}

#[tokio::test]
async fn test_concurrent_reconfigure_converges_on_last() {
    let dir = effect_dir();
    let session = Arc::new(session(&dir, EngineSettings::default()));

    let mut tasks = Vec::new();
    for device in ["mic-a", "mic-b", "mic-c"] {
        let session = session.clone();
        tasks.push(tokio::spawn(async move {
            session
                .reconfigure(SignalGraphConfig {
                    input: InputSelector::Device(device.to_string()),
                    ..Default::default()
                })
                .await
        }));
        tokio::task::yield_now().await;
    }

    let mut generations = Vec::new();
    for task in tasks {
        generations.push(task.await.unwrap().unwrap().generation);
    }
    assert!(generations.windows(2).all(|w| w[0] < w[1]));

    let table = session.controller().current_routing().unwrap();
    let device = table.nodes().find_map(|(_, spec)| match &spec.kind {
        NodeKind::Capture { device, .. } => Some(device.clone()),
        _ => None,
    });
    assert_eq!(device.as_deref(), Some("mic-c"));
}

#[tokio::test]
async fn test_settings_file_drives_session() {
    let dir = effect_dir();
    let settings_path = dir.path().join("settings.json");
    std::fs::write(
        &settings_path,
        r#"{"sfx_gain": 0.5, "output_gain": 0.7, "graph": {"input": {"device": "usb-mic"}}}"#,
    )
    .unwrap();

    let settings = EngineSettings::load(&settings_path).unwrap();
    let session = session(&dir, settings);
    session.start_session().await.unwrap();

    let table = session.controller().current_routing().unwrap();
    assert_eq!(table.gain(&NodeKind::OutputGain), Some(0.7));
    assert_eq!(session.activity().pending_gain, 0.5);
    assert!(session.controller().current_stream().unwrap().is_live());

    session.shutdown().await;
}
