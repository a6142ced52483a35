//! Customized unified error type.

use std::error;
use std::fmt;
use std::num;

/// Customized error type for setup and runtime failures of the HA volume
/// itself (as opposed to per-fop statuses, which are `Errno`s).
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct HaError(pub(crate) String);

impl HaError {
    pub fn msg(msg: impl ToString) -> Self {
        HaError(msg.to_string())
    }
}

impl fmt::Display for HaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0) // do not display literal quotes
    }
}

impl error::Error for HaError {}

// Helper macro for saving boiler-plate `impl From<X>`s for transparent
// conversion from various common error types to `HaError`.
macro_rules! impl_from_error {
    ($error:ty) => {
        impl From<$error> for HaError {
            fn from(e: $error) -> Self {
                // just store the source error's string representation
                HaError(e.to_string())
            }
        }
    };
}

// Helper macro for saving boiler-plate `impl From<X<T>>`s for transparent
// conversion from various common generic error types to `HaError`.
macro_rules! impl_from_error_generic {
    ($error:ty) => {
        impl<T> From<$error> for HaError {
            fn from(e: $error) -> HaError {
                HaError::msg(e.to_string())
            }
        }
    };
}

impl_from_error!(num::ParseIntError);
impl_from_error!(toml::de::Error);

impl_from_error_generic!(tokio::sync::mpsc::error::SendError<T>);
