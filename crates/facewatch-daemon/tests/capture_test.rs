//! Capture loop tests with injected sources and extractors
//!
//! Timings are scaled down so the loop runs many iterations within a few
//! hundred milliseconds.

use anyhow::bail;
use facewatch_core::{Encoding, EncodingExtractor, FaceError, Recognizer, SqliteStore};
use facewatch_daemon::{
    CaptureConfig, CaptureService, CaptureSource, CaptureSourceFactory, Frame, RecognitionEvent,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Source that always yields the same small frame
struct ConstantSource;

impl CaptureSource for ConstantSource {
    fn read_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        Ok(Some(Frame {
            width: 2,
            height: 2,
            pixels: vec![128; 12],
        }))
    }
}

/// Source whose pulls always fail
struct GlitchySource;

impl CaptureSource for GlitchySource {
    fn read_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        bail!("transient device glitch")
    }
}

enum SourceKind {
    Constant,
    Glitchy,
}

struct FakeFactory {
    kind: SourceKind,
    opens: AtomicUsize,
}

impl FakeFactory {
    fn constant() -> Self {
        Self {
            kind: SourceKind::Constant,
            opens: AtomicUsize::new(0),
        }
    }

    fn glitchy() -> Self {
        Self {
            kind: SourceKind::Glitchy,
            opens: AtomicUsize::new(0),
        }
    }
}

impl CaptureSourceFactory for FakeFactory {
    fn open(&self, _device_index: u32) -> Result<Box<dyn CaptureSource>, FaceError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        match self.kind {
            SourceKind::Constant => Ok(Box::new(ConstantSource)),
            SourceKind::Glitchy => Ok(Box::new(GlitchySource)),
        }
    }
}

/// Source whose pulls block far longer than the stop timeout
struct SlowSource {
    released: Arc<AtomicBool>,
}

impl CaptureSource for SlowSource {
    fn read_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        std::thread::sleep(Duration::from_millis(400));
        Ok(None)
    }
}

impl Drop for SlowSource {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

struct SlowFactory {
    released: Arc<AtomicBool>,
}

impl CaptureSourceFactory for SlowFactory {
    fn open(&self, _device_index: u32) -> Result<Box<dyn CaptureSource>, FaceError> {
        Ok(Box::new(SlowSource {
            released: self.released.clone(),
        }))
    }
}

struct MissingDeviceFactory;

impl CaptureSourceFactory for MissingDeviceFactory {
    fn open(&self, device_index: u32) -> Result<Box<dyn CaptureSource>, FaceError> {
        Err(FaceError::DeviceUnavailable(format!(
            "no camera at index {device_index}"
        )))
    }
}

/// Extractor that sees one fixed face in every image
struct OneFaceExtractor;

impl EncodingExtractor for OneFaceExtractor {
    fn extract(&self, _image: &[u8]) -> Result<Vec<Encoding>, FaceError> {
        Ok(vec![Encoding::new(vec![0.0; 8])])
    }
}

/// Extractor standing in for a broken engine
struct BrokenExtractor;

impl EncodingExtractor for BrokenExtractor {
    fn extract(&self, _image: &[u8]) -> Result<Vec<Encoding>, FaceError> {
        Err(FaceError::ExtractionUnavailable("engine crashed".to_string()))
    }
}

fn fast_config(cooldown: Duration) -> CaptureConfig {
    CaptureConfig {
        frame_skip: 1,
        cooldown,
        frame_interval: Duration::from_millis(2),
        read_retry_delay: Duration::from_millis(1),
        error_backoff: Duration::from_millis(5),
        ..CaptureConfig::default()
    }
}

fn trained_recognizer(extractor: Arc<dyn EncodingExtractor>) -> Arc<Recognizer> {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let recognizer = Recognizer::new(extractor, store);
    recognizer.train(b"jane", "Jane Doe", None).unwrap();
    Arc::new(recognizer)
}

fn collect_events(service: &CaptureService) -> Arc<Mutex<Vec<RecognitionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    service.on_recognized(move |event| {
        sink.lock().unwrap().push(event.clone());
        Ok(())
    });
    events
}

#[test]
fn test_start_stop_lifecycle() {
    init_tracing();
    let recognizer = trained_recognizer(Arc::new(OneFaceExtractor));
    let service = CaptureService::new(
        recognizer,
        Arc::new(FakeFactory::constant()),
        fast_config(Duration::from_secs(60)),
    );

    assert!(!service.is_active());
    service.start().unwrap();
    assert!(service.is_active());

    // Start while running is a no-op
    service.start().unwrap();
    assert!(service.is_active());

    service.stop();
    assert!(!service.is_active());
    // Stop while stopped is harmless
    service.stop();
}

#[test]
fn test_restart_reopens_the_device() {
    let recognizer = trained_recognizer(Arc::new(OneFaceExtractor));
    let factory = Arc::new(FakeFactory::constant());
    let service = CaptureService::new(
        recognizer,
        factory.clone(),
        fast_config(Duration::from_secs(60)),
    );

    service.start().unwrap();
    service.stop();
    service.start().unwrap();
    service.stop();

    assert_eq!(factory.opens.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unavailable_device_fails_start_without_spawning() {
    let recognizer = trained_recognizer(Arc::new(OneFaceExtractor));
    let service = CaptureService::new(
        recognizer,
        Arc::new(MissingDeviceFactory),
        fast_config(Duration::from_secs(60)),
    );

    let err = service.start().unwrap_err();
    assert!(matches!(err, FaceError::DeviceUnavailable(_)));
    assert!(!service.is_active());
}

#[test]
fn test_cooldown_limits_events_per_identity() {
    let recognizer = trained_recognizer(Arc::new(OneFaceExtractor));
    let service = CaptureService::new(
        recognizer,
        Arc::new(FakeFactory::constant()),
        fast_config(Duration::from_secs(60)),
    );
    let events = collect_events(&service);

    service.start().unwrap();
    std::thread::sleep(Duration::from_millis(300));
    service.stop();

    // Many matches, one identity, cooldown far longer than the run
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].face_id, "jane_doe");
    assert_eq!(events[0].label, "Jane Doe");
    assert!(events[0].timestamp > 0);
}

#[test]
fn test_expired_cooldown_fires_again() {
    let recognizer = trained_recognizer(Arc::new(OneFaceExtractor));
    let service = CaptureService::new(
        recognizer,
        Arc::new(FakeFactory::constant()),
        fast_config(Duration::ZERO),
    );
    let events = collect_events(&service);

    service.start().unwrap();
    std::thread::sleep(Duration::from_millis(300));
    service.stop();

    assert!(events.lock().unwrap().len() >= 2);
}

#[test]
fn test_loop_survives_extraction_failures() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let recognizer = Arc::new(Recognizer::new(Arc::new(BrokenExtractor), store));

    let service = CaptureService::new(
        recognizer,
        Arc::new(FakeFactory::constant()),
        fast_config(Duration::from_secs(60)),
    );

    service.start().unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert!(service.is_active());
    service.stop();
    assert!(!service.is_active());
}

#[test]
fn test_loop_survives_failed_frame_pulls() {
    let recognizer = trained_recognizer(Arc::new(OneFaceExtractor));
    let service = CaptureService::new(
        recognizer,
        Arc::new(FakeFactory::glitchy()),
        fast_config(Duration::from_secs(60)),
    );
    let events = collect_events(&service);

    service.start().unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert!(service.is_active());
    service.stop();

    // No frames ever arrived, so no events
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn test_handler_failures_do_not_stop_the_loop() {
    let recognizer = trained_recognizer(Arc::new(OneFaceExtractor));
    let service = CaptureService::new(
        recognizer,
        Arc::new(FakeFactory::constant()),
        fast_config(Duration::ZERO),
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    service.on_recognized(move |_event| {
        counter.fetch_add(1, Ordering::SeqCst);
        bail!("webhook endpoint down")
    });

    service.start().unwrap();
    std::thread::sleep(Duration::from_millis(200));
    assert!(service.is_active());
    service.stop();

    assert!(calls.load(Ordering::SeqCst) >= 2);
}

#[test]
fn test_stop_revokes_device_from_unresponsive_worker() {
    init_tracing();
    let recognizer = trained_recognizer(Arc::new(OneFaceExtractor));
    let released = Arc::new(AtomicBool::new(false));
    let service = CaptureService::new(
        recognizer,
        Arc::new(SlowFactory {
            released: released.clone(),
        }),
        CaptureConfig {
            stop_timeout: Duration::from_millis(50),
            ..fast_config(Duration::from_secs(60))
        },
    );

    service.start().unwrap();
    // Let the worker block inside a pull before stopping
    std::thread::sleep(Duration::from_millis(20));
    service.stop();

    assert!(!service.is_active());
    assert!(
        released.load(Ordering::SeqCst),
        "device must be released once stop returns"
    );
}
