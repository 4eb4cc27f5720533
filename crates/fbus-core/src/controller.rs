//! The seam to the process-level controller.
//!
//! The broker's parent process owns config reloads, activation launches, and
//! environment updates. Requests cross a pipe and are fire-and-forget; the
//! controller later calls back into the driver entry points
//! (`reload_config_completed`, `reload_config_invalid`,
//! `activation_failed`) with the correlation data passed here.

use thiserror::Error;

use fbus_types::PeerId;

/// Controller request failure: the pipe to the parent is gone. The broker
/// reports `LimitsExceeded` to the requesting client and carries on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("request could not be forwarded to the parent process")]
    ForwardFailed,
}

/// Operations the driver hands off to the parent process.
pub trait Controller {
    /// Launch the service that should own `name`.
    fn request_service_start(&mut self, name: &str) -> Result<(), ControllerError>;

    /// Replace activation environment variables.
    fn update_environment(&mut self, pairs: &[(String, String)]) -> Result<(), ControllerError>;

    /// Reload the bus configuration; the reply to (`sender`, `serial`)
    /// is produced when the controller calls back into the driver.
    fn request_config_reload(
        &mut self,
        uid: u32,
        sender: PeerId,
        serial: u32,
    ) -> Result<(), ControllerError>;
}

/// Controller that accepts and discards every request. Used when the broker
/// runs without a parent (tests, standalone operation).
#[derive(Debug, Default)]
pub struct NullController;

impl Controller for NullController {
    fn request_service_start(&mut self, _name: &str) -> Result<(), ControllerError> {
        Ok(())
    }

    fn update_environment(&mut self, _pairs: &[(String, String)]) -> Result<(), ControllerError> {
        Ok(())
    }

    fn request_config_reload(
        &mut self,
        _uid: u32,
        _sender: PeerId,
        _serial: u32,
    ) -> Result<(), ControllerError> {
        Ok(())
    }
}
