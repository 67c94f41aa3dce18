//! Contains logic for sampling the foreground application in different environments.
//! [GenericSensor] is the main artifact of this module that abstracts
//! the operations.

#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "x11")]
extern crate xcb;

use crate::error::SensorError;

/// Intended to serve as a contract every supported desktop environment must implement.
#[cfg_attr(test, mockall::automock)]
pub trait ActivitySensor {
    /// Lowercased name of the application in the foreground. [None] means there was nothing to
    /// read this time, for example when no window has focus.
    fn sample_active_app(&mut self) -> Result<Option<String>, SensorError>;
}

/// Serves as a cross-compatible [ActivitySensor] implementation. When no backend can be used
/// every sample reports [SensorError::Unavailable], which keeps tracking disabled.
pub struct GenericSensor {
    inner: Result<Box<dyn ActivitySensor>, String>,
}

impl GenericSensor {
    pub fn new() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(feature = "x11")] {
                use tracing::warn;
                use x11::X11Sensor;

                let inner = X11Sensor::new()
                    .map(|v| Box::new(v) as Box<dyn ActivitySensor>)
                    .map_err(|e| {
                        warn!("Couldn't connect to the X server {e:?}");
                        format!("couldn't connect to the X server: {e}")
                    });
                Self { inner }
            }
            else {
                Self {
                    inner: Err("timewarden was built without a window system backend".into()),
                }
            }
        }
    }
}

impl Default for GenericSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivitySensor for GenericSensor {
    fn sample_active_app(&mut self) -> Result<Option<String>, SensorError> {
        match &mut self.inner {
            Ok(inner) => inner.sample_active_app(),
            Err(reason) => Err(SensorError::Unavailable {
                reason: reason.clone(),
            }),
        }
    }
}
