//! Timer-driven runner around [`CalibrationController`].

use std::time::{Duration, Instant};

use crossbeam_channel::{after, bounded, never, select, tick, unbounded, Receiver, Sender};
use topview_core::FrameTransformer;

use crate::{
    CalibrationConfig, CalibrationController, CalibrationResult, CameraInfo, ResultPublisher,
    TickOutcome,
};

/// Inputs of a running [`CalibrationNode`].
///
/// Dropping the handle requests shutdown.
#[derive(Clone, Debug)]
pub struct NodeHandle {
    intrinsics: Sender<CameraInfo>,
    shutdown: Sender<()>,
}

impl NodeHandle {
    /// Deliver a camera description. May be called from any thread.
    pub fn send_camera_info(&self, info: CameraInfo) -> bool {
        self.intrinsics.send(info).is_ok()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.try_send(());
    }
}

/// Polls the controller at the configured period until it calibrates.
pub struct CalibrationNode<T, P> {
    controller: CalibrationController<T, P>,
    intrinsics_rx: Receiver<CameraInfo>,
    shutdown_rx: Receiver<()>,
}

impl<T: FrameTransformer, P: ResultPublisher> CalibrationNode<T, P> {
    pub fn new(config: CalibrationConfig, transformer: T, publisher: P) -> (Self, NodeHandle) {
        let (intrinsics_tx, intrinsics_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let node = Self {
            controller: CalibrationController::new(config, transformer, publisher),
            intrinsics_rx,
            shutdown_rx,
        };
        let handle = NodeHandle {
            intrinsics: intrinsics_tx,
            shutdown: shutdown_tx,
        };
        (node, handle)
    }

    pub fn controller(&self) -> &CalibrationController<T, P> {
        &self.controller
    }

    /// Run until the result is published (returned) or shutdown (`None`).
    ///
    /// Each tick makes at most one calibration attempt. Nothing is persisted
    /// when shutdown interrupts the loop.
    pub fn run(&mut self) -> Option<CalibrationResult> {
        self.run_until(never())
    }

    /// Like [`run`](Self::run), but gives up after `max_wait`.
    pub fn run_for(&mut self, max_wait: Duration) -> Option<CalibrationResult> {
        self.run_until(after(max_wait))
    }

    fn run_until(&mut self, deadline: Receiver<Instant>) -> Option<CalibrationResult> {
        if let Some(result) = self.controller.result() {
            return Some(*result);
        }

        let period = self.controller.config().tick_period();
        let topic = self.controller.config().camera_info_topic.clone();
        log::info!("waiting for camera info on {topic}, polling every {period:?}");
        let ticker = tick(period);
        let mut intrinsics_open = true;

        loop {
            let intrinsics_rx = if intrinsics_open {
                self.intrinsics_rx.clone()
            } else {
                never()
            };
            select! {
                recv(intrinsics_rx) -> msg => match msg {
                    Ok(info) => {
                        if self.controller.on_intrinsics(info.intrinsics()) {
                            log::info!("first camera info received from {topic}");
                        }
                    }
                    Err(_) => {
                        log::debug!("camera info channel closed");
                        intrinsics_open = false;
                    }
                },
                recv(ticker) -> _ => match self.controller.tick() {
                    Ok(TickOutcome::Published) | Ok(TickOutcome::Idle) => {
                        return self.controller.result().copied();
                    }
                    Ok(_) => {}
                    Err(err) => log::error!("calibration failed, will retry: {err}"),
                },
                recv(self.shutdown_rx) -> _ => {
                    log::info!("shutdown requested before calibration finished");
                    return None;
                }
                recv(deadline) -> _ => {
                    log::warn!(
                        "no calibration after {} attempt(s), giving up",
                        self.controller.attempts()
                    );
                    return None;
                }
            }
        }
    }
}
