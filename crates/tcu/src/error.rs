//! Driver error model.
//!
//! Every fallible operation returns an [`Error`] by value: a source-class
//! tag, a class-specific code, and a bounded formatted message carrying the
//! contextual detail (file path, input name, device id). Callers early
//! return with `?`; no subsystem recovers internally, so the first error
//! surfaces to the driver's caller. Persistent state (buffer offsets, DRAM
//! contents) is left as-is on failure — treat the driver as
//! possibly-inconsistent and reinitialize.

use core::fmt;

/// Capacity of the formatted message carried inside an [`Error`].
pub const ERROR_MESSAGE_CAPACITY: usize = 256;

/// Driver-class error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverError {
    /// An AXI DMA channel with the configured device id does not exist.
    DmaDeviceNotFound,
    /// A program, DRAM, or sample region is too small for the request.
    InsufficientBuffer,
    /// A constants file's size does not match the model's declaration.
    UnexpectedConstsSize,
    /// A program file's size does not match the model's declaration.
    UnexpectedProgramSize,
    /// The model descriptor is not parseable JSON.
    InvalidJson,
    /// The model descriptor parsed but failed validation.
    InvalidModel,
    /// The architecture parameters failed validation.
    InvalidArch,
    /// The platform configuration is unusable (missing regions, bad
    /// alignment, missing channels).
    InvalidPlatform,
    /// The model was compiled for a different architecture.
    IncompatibleModel,
    /// No model input has the requested name.
    UnexpectedInputName,
    /// No model output has the requested name.
    UnexpectedOutputName,
    /// A transient heap allocation failed.
    OutOfHeapMemory,
    /// The sample region cannot hold another sample block.
    OutOfSampleBuffer,
}

/// Error source class plus class-specific code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// Originates in this driver.
    Driver(DriverError),
    /// Propagated from the file-system capability.
    FileSystem,
    /// Propagated from a vendor device (DMA engine, flash).
    Vendor,
}

/// A by-value driver error: kind plus bounded formatted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: heapless::String<ERROR_MESSAGE_CAPACITY>,
}

/// Driver result alias.
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    fn with_kind(kind: ErrorKind, args: fmt::Arguments<'_>) -> Self {
        let mut message = heapless::String::new();
        // A message longer than the buffer is truncated, not an error.
        let _ = fmt::Write::write_fmt(&mut message, args);
        Self { kind, message }
    }

    /// A driver-class error with a formatted message.
    #[must_use]
    pub fn driver(code: DriverError, args: fmt::Arguments<'_>) -> Self {
        Self::with_kind(ErrorKind::Driver(code), args)
    }

    /// A file-system-class error wrapping the capability's own error value.
    #[must_use]
    #[allow(clippy::use_debug)] // capability errors only guarantee Debug
    pub fn file_system<E: fmt::Debug>(err: E, path: &str) -> Self {
        Self::with_kind(
            ErrorKind::FileSystem,
            format_args!("File system error in {path}: {err:?}"),
        )
    }

    /// A vendor-class error wrapping a device status value.
    #[must_use]
    #[allow(clippy::use_debug)] // vendor errors only guarantee Debug
    pub fn vendor<E: fmt::Debug>(status: E) -> Self {
        Self::with_kind(ErrorKind::Vendor, format_args!("Vendor status {status:?}"))
    }

    /// The error's source class and code.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The formatted message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// `true` when this is a driver-class error with the given code.
    #[must_use]
    pub fn is_driver(&self, code: DriverError) -> bool {
        self.kind == ErrorKind::Driver(code)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "Error: {:?}", self.kind)
        } else {
            write!(f, "Error: {}", self.message)
        }
    }
}

// A failing console writer is a platform misconfiguration; mapping it here
// lets the printing paths use `?` uniformly.
impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Self::driver(
            DriverError::InvalidPlatform,
            format_args!("Console write failed"),
        )
    }
}

/// Shorthand for a driver-class error with a formatted message.
macro_rules! driver_error {
    ($code:ident, $($arg:tt)*) => {
        $crate::error::Error::driver(
            $crate::error::DriverError::$code,
            ::core::format_args!($($arg)*),
        )
    };
}
pub(crate) use driver_error;
