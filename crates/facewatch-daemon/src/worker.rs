//! The capture loop: a supervised background worker
//!
//! One worker per deployment pulls frames continuously, throttles them,
//! runs recognition, and emits cooldown-gated events. Iteration errors are
//! contained with a backoff; the loop never takes the process down.

use crate::capture::{CaptureSource, CaptureSourceFactory, Frame};
use crate::cooldown::CooldownTable;
use anyhow::Result;
use crossbeam_channel::{bounded, Receiver};
use facewatch_core::{now_timestamp, FaceError, Recognizer, DEFAULT_TOLERANCE};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Tuning knobs for the capture loop
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Which capture device to open
    pub device_index: u32,
    /// Process only every Nth frame
    pub frame_skip: u32,
    /// Minimum time between events for the same identity
    pub cooldown: Duration,
    /// Matching tolerance passed to recognition
    pub tolerance: f32,
    /// Fixed inter-iteration delay (~30 fps by default)
    pub frame_interval: Duration,
    /// Backoff after a failed frame pull
    pub read_retry_delay: Duration,
    /// Backoff after an unexpected iteration error
    pub error_backoff: Duration,
    /// How long `stop` waits for the worker to exit
    pub stop_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            frame_skip: 2,
            cooldown: Duration::from_secs(5),
            tolerance: DEFAULT_TOLERANCE,
            frame_interval: Duration::from_millis(33),
            read_retry_delay: Duration::from_millis(100),
            error_backoff: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

/// Event delivered to the registered handler for each cooldown-passed match
#[derive(Debug, Clone, Serialize)]
pub struct RecognitionEvent {
    pub face_id: String,
    pub label: String,
    pub confidence: f32,
    pub timestamp: i64,
}

type EventHandler = Arc<dyn Fn(&RecognitionEvent) -> Result<()> + Send + Sync>;

/// The open device, shared between the worker and `stop` so the stopping
/// thread can revoke it after the bounded wait
type SharedSource = Arc<Mutex<Option<Box<dyn CaptureSource>>>>;

struct Worker {
    /// Stop flag owned by this worker; a detached worker keeps observing
    /// its own flag even after a replacement starts
    stop: Arc<AtomicBool>,
    source: SharedSource,
    join: JoinHandle<()>,
    exited: Receiver<()>,
}

/// Lifecycle wrapper around the capture worker thread
///
/// Two states, stopped and running. `start` is a no-op while running;
/// `stop` signals the worker and waits a bounded time for it to exit.
pub struct CaptureService {
    recognizer: Arc<Recognizer>,
    factory: Arc<dyn CaptureSourceFactory>,
    config: CaptureConfig,
    handler: Mutex<Option<EventHandler>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<Worker>>,
}

struct LoopContext {
    recognizer: Arc<Recognizer>,
    handler: Option<EventHandler>,
    config: CaptureConfig,
    stop: Arc<AtomicBool>,
}

impl CaptureService {
    pub fn new(
        recognizer: Arc<Recognizer>,
        factory: Arc<dyn CaptureSourceFactory>,
        config: CaptureConfig,
    ) -> Self {
        Self {
            recognizer,
            factory,
            config,
            handler: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Register the recognition-event handler
    ///
    /// Call before `start`; the worker snapshots the handler when it
    /// launches. Handler failures are logged and never stop the loop.
    pub fn on_recognized<F>(&self, handler: F)
    where
        F: Fn(&RecognitionEvent) -> Result<()> + Send + Sync + 'static,
    {
        *self.lock_handler() = Some(Arc::new(handler));
    }

    /// Open the device and launch the worker thread
    ///
    /// No-op when already running. A device that fails to open is reported
    /// as [`FaceError::DeviceUnavailable`] and no thread is spawned.
    pub fn start(&self) -> Result<(), FaceError> {
        let mut worker = self.lock_worker();
        if worker.is_some() {
            return Ok(());
        }

        let source: SharedSource = Arc::new(Mutex::new(Some(
            self.factory.open(self.config.device_index)?,
        )));

        let mut config = self.config.clone();
        config.frame_skip = config.frame_skip.max(1);
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = LoopContext {
            recognizer: self.recognizer.clone(),
            handler: self.lock_handler().clone(),
            config,
            stop: stop.clone(),
        };

        let (exit_tx, exit_rx) = bounded(1);
        let loop_source = source.clone();
        let join = thread::spawn(move || {
            run_loop(&loop_source, ctx);
            let _ = exit_tx.send(());
        });
        *worker = Some(Worker {
            stop,
            source,
            join,
            exited: exit_rx,
        });
        self.running.store(true, Ordering::SeqCst);
        info!(device_index = self.config.device_index, "Capture loop started");
        Ok(())
    }

    /// Signal the worker to stop and wait, bounded by the stop timeout
    ///
    /// If the worker does not acknowledge in time it is detached and the
    /// device is revoked from under it: the source is taken out of the
    /// shared slot and dropped here, once any in-flight frame pull has
    /// returned. The detached worker finds the slot empty and exits.
    pub fn stop(&self) {
        let mut slot = self.lock_worker();
        self.running.store(false, Ordering::SeqCst);
        let Some(worker) = slot.take() else {
            return;
        };
        worker.stop.store(true, Ordering::SeqCst);

        match worker.exited.recv_timeout(self.config.stop_timeout) {
            Ok(()) => {
                let _ = worker.join.join();
                info!("Capture loop stopped");
            }
            Err(_) => {
                warn!(
                    timeout = ?self.config.stop_timeout,
                    "Capture worker did not stop in time; revoking the device"
                );
                drop(lock_source(&worker.source).take());
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_handler(&self) -> MutexGuard<'_, Option<EventHandler>> {
        self.handler.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn lock_source(source: &SharedSource) -> MutexGuard<'_, Option<Box<dyn CaptureSource>>> {
    source.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn run_loop(source: &SharedSource, ctx: LoopContext) {
    let mut cooldowns = CooldownTable::new(ctx.config.cooldown);
    let mut frame_count: u64 = 0;

    while !ctx.stop.load(Ordering::SeqCst) {
        // The slot lock is held only for the pull itself, never across
        // the pacing sleeps, so `stop` can revoke the device between pulls.
        let pulled = {
            let mut guard = lock_source(source);
            match guard.as_mut() {
                Some(src) => src.read_frame(),
                None => break, // device revoked by stop
            }
        };

        let frame = match pulled {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                thread::sleep(ctx.config.read_retry_delay);
                continue;
            }
            Err(err) => {
                warn!(error = %err, "Frame pull failed; retrying");
                thread::sleep(ctx.config.read_retry_delay);
                continue;
            }
        };

        frame_count += 1;
        if frame_count % u64::from(ctx.config.frame_skip) != 0 {
            thread::sleep(ctx.config.frame_interval);
            continue;
        }

        match process_frame(frame, &ctx, &mut cooldowns) {
            Ok(()) => thread::sleep(ctx.config.frame_interval),
            Err(err) => {
                error!(error = %err, "Capture iteration failed");
                thread::sleep(ctx.config.error_backoff);
            }
        }
    }

    // Dropping the source releases the device; stop may already have
    // emptied the slot
    drop(lock_source(source).take());
    debug!("Capture loop exiting");
}

fn process_frame(frame: Frame, ctx: &LoopContext, cooldowns: &mut CooldownTable) -> Result<()> {
    let image = frame.to_jpeg()?;
    let results = ctx.recognizer.recognize(&image, ctx.config.tolerance)?;

    let now = Instant::now();
    let timestamp = now_timestamp();
    for result in results.iter().filter(|r| r.matched) {
        if !cooldowns.should_fire(&result.face_id, now) {
            continue;
        }
        let event = RecognitionEvent {
            face_id: result.face_id.clone(),
            label: result.label.clone(),
            confidence: result.confidence,
            timestamp,
        };
        if let Some(handler) = &ctx.handler {
            if let Err(err) = handler(&event) {
                warn!(face_id = %event.face_id, error = %err, "Recognition handler failed");
            }
        }
    }
    Ok(())
}
