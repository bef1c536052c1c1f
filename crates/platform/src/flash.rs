//! Blocking flash read access.
//!
//! Some boards keep model constants in QSPI flash instead of a file system.
//! The interface is a single blocking block-read into a caller buffer.

/// Blocking block-read from on-board flash.
pub trait Flash {
    /// Underlying device error type.
    type Error: core::fmt::Debug;

    /// Read `buf.len()` bytes starting at flash byte `offset`.
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error>;
}

// ---------------------------------------------------------------------------
// InMemoryFlash — byte-array backed implementation for tests
// ---------------------------------------------------------------------------

/// [`Flash`] over an in-memory image, for host tests.
#[cfg(any(test, feature = "std"))]
#[derive(Debug, Clone)]
pub struct InMemoryFlash {
    image: std::vec::Vec<u8>,
}

/// Error from [`InMemoryFlash`] reads.
#[cfg(any(test, feature = "std"))]
#[derive(Debug, PartialEq, Eq)]
pub struct FlashOutOfRange;

#[cfg(any(test, feature = "std"))]
impl InMemoryFlash {
    /// Wrap a flash image.
    #[must_use]
    pub fn new(image: std::vec::Vec<u8>) -> Self {
        Self { image }
    }
}

#[cfg(any(test, feature = "std"))]
impl Flash for InMemoryFlash {
    type Error = FlashOutOfRange;

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), Self::Error> {
        let end = offset.checked_add(buf.len()).ok_or(FlashOutOfRange)?;
        let src = self.image.get(offset..end).ok_or(FlashOutOfRange)?;
        buf.copy_from_slice(src);
        Ok(())
    }
}
