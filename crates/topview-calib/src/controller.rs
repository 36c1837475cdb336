//! Lifecycle of the one-shot calibration.
//!
//! ```text
//! WaitingForIntrinsics --(first intrinsics)--> WaitingForTransform
//! WaitingForTransform  --(pipeline ok)-------> Calibrated (terminal)
//! ```
//!
//! Transient transform failures keep the controller in
//! `WaitingForTransform`; the next tick tries again.

use std::sync::Arc;

use crossbeam_channel::Sender;
use topview_core::{CalibrationError, CameraIntrinsics, FrameTransformer, IntrinsicsModel};

use crate::{calibrate, CalibrationConfig, CalibrationResult, TransformationMatrices};

/// Sink for the calibration output. Called exactly once per process.
pub trait ResultPublisher {
    fn publish(&mut self, matrices: &TransformationMatrices);
}

impl ResultPublisher for Sender<TransformationMatrices> {
    fn publish(&mut self, matrices: &TransformationMatrices) {
        if self.send(*matrices).is_err() {
            log::warn!("result receiver dropped, matrices not delivered");
        }
    }
}

impl ResultPublisher for Vec<TransformationMatrices> {
    fn publish(&mut self, matrices: &TransformationMatrices) {
        self.push(*matrices);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CalibrationState {
    WaitingForIntrinsics,
    WaitingForTransform,
    Calibrated(Box<CalibrationResult>),
}

impl CalibrationState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::WaitingForIntrinsics => "WaitingForIntrinsics",
            Self::WaitingForTransform => "WaitingForTransform",
            Self::Calibrated(_) => "Calibrated",
        }
    }
}

/// What a single tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// No intrinsics yet.
    AwaitingIntrinsics,
    /// Transform not available yet; retry next tick.
    AwaitingTransform,
    /// This tick produced and published the result.
    Published,
    /// Already calibrated; nothing to do.
    Idle,
}

/// Drives intrinsics -> transform -> result, publishing once.
pub struct CalibrationController<T, P> {
    config: CalibrationConfig,
    intrinsics: Arc<IntrinsicsModel>,
    transformer: T,
    publisher: P,
    state: CalibrationState,
    attempts: u64,
}

impl<T: FrameTransformer, P: ResultPublisher> CalibrationController<T, P> {
    pub fn new(config: CalibrationConfig, transformer: T, publisher: P) -> Self {
        Self {
            config,
            intrinsics: Arc::new(IntrinsicsModel::new()),
            transformer,
            publisher,
            state: CalibrationState::WaitingForIntrinsics,
            attempts: 0,
        }
    }

    /// Shared intrinsics slot for delivery from another thread.
    ///
    /// Loads through this handle are picked up on the next tick.
    pub fn intrinsics_handle(&self) -> Arc<IntrinsicsModel> {
        Arc::clone(&self.intrinsics)
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    pub fn result(&self) -> Option<&CalibrationResult> {
        match &self.state {
            CalibrationState::Calibrated(result) => Some(&**result),
            _ => None,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self.state, CalibrationState::Calibrated(_))
    }

    /// Number of pipeline runs so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Deliver intrinsics. Only the first valid delivery has any effect.
    pub fn on_intrinsics(&mut self, intrinsics: CameraIntrinsics) -> bool {
        let accepted = self.intrinsics.load(intrinsics);
        self.sync_intrinsics();
        accepted
    }

    fn sync_intrinsics(&mut self) {
        if self.state == CalibrationState::WaitingForIntrinsics && self.intrinsics.is_loaded() {
            self.transition(CalibrationState::WaitingForTransform);
        }
    }

    fn transition(&mut self, next: CalibrationState) {
        log::info!("calibration state {} -> {}", self.state.name(), next.name());
        self.state = next;
    }

    /// One poll of the state machine.
    ///
    /// Transient transform failures are logged and reported as
    /// [`TickOutcome::AwaitingTransform`]. Degenerate geometry is returned
    /// as an error; the controller stays put and tries again next tick.
    pub fn tick(&mut self) -> Result<TickOutcome, CalibrationError> {
        self.sync_intrinsics();
        match self.state {
            CalibrationState::WaitingForIntrinsics => return Ok(TickOutcome::AwaitingIntrinsics),
            CalibrationState::Calibrated(_) => return Ok(TickOutcome::Idle),
            CalibrationState::WaitingForTransform => {}
        }

        let (camera, base) = (&self.config.camera_frame, &self.config.base_frame);
        if !self.transformer.can_transform(base, camera) {
            log::debug!("transform {camera} -> {base} not available yet");
            return Ok(TickOutcome::AwaitingTransform);
        }

        self.attempts += 1;
        match calibrate(&self.intrinsics, &self.transformer, &self.config) {
            Ok(result) => {
                let message = result.to_message();
                log::info!("forward warp {:?}", message.forward_warp);
                log::info!("inverse warp {:?}", message.inverse_warp);
                self.publisher.publish(&message);
                self.transition(CalibrationState::Calibrated(Box::new(result)));
                Ok(TickOutcome::Published)
            }
            Err(err) if err.is_transient() => {
                log::warn!("calibration attempt {} deferred: {err}", self.attempts);
                Ok(TickOutcome::AwaitingTransform)
            }
            Err(CalibrationError::NotInitialized) => {
                log::error!("invariant violated: pipeline ran without intrinsics");
                Err(CalibrationError::NotInitialized)
            }
            Err(err) => {
                log::error!("calibration attempt {} failed: {err}", self.attempts);
                Err(err)
            }
        }
    }
}
