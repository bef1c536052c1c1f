//! Blocking file-system access.
//!
//! The driver's file needs are narrow: stat a path, read a byte range into
//! a caller buffer (often straight into DMA-visible memory), and write a
//! whole file. On hardware this is implemented over the BSP FAT layer; on
//! the host, [`LocalFileSystem`] maps it onto `std::fs`.

/// Blocking byte-range file access.
pub trait FileSystem {
    /// Underlying I/O error type.
    type Error: core::fmt::Debug;

    /// Size of the file at `path` in bytes.
    fn file_size(&mut self, path: &str) -> Result<u64, Self::Error>;

    /// Read up to `buf.len()` bytes from `path` starting at byte `offset`.
    /// Returns the number of bytes read.
    fn read_range(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Create or truncate `path` and write `data` to it.
    fn write_all(&mut self, path: &str, data: &[u8]) -> Result<(), Self::Error>;
}

// ---------------------------------------------------------------------------
// LocalFileSystem — std implementation for tests and desktop tools
// ---------------------------------------------------------------------------

/// [`FileSystem`] over the host OS file system.
#[cfg(any(test, feature = "std"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

#[cfg(any(test, feature = "std"))]
impl FileSystem for LocalFileSystem {
    type Error = std::io::Error;

    fn file_size(&mut self, path: &str) -> Result<u64, Self::Error> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn read_range(&mut self, path: &str, offset: u64, buf: &mut [u8]) -> Result<usize, Self::Error> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = std::fs::File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut total = 0;
        while total < buf.len() {
            let n = file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    fn write_all(&mut self, path: &str, data: &[u8]) -> Result<(), Self::Error> {
        std::fs::write(path, data)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn local_fs_size_and_range_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let path = path.to_str().unwrap();

        let mut fs = LocalFileSystem;
        fs.write_all(path, &[0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
        assert_eq!(fs.file_size(path).unwrap(), 8);

        let mut buf = [0u8; 4];
        let n = fs.read_range(path, 2, &mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf, [2, 3, 4, 5]);
    }

    #[test]
    fn local_fs_short_read_at_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        let path = path.to_str().unwrap();

        let mut fs = LocalFileSystem;
        fs.write_all(path, &[1, 2, 3]).unwrap();

        let mut buf = [0u8; 8];
        let n = fs.read_range(path, 1, &mut buf).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf[..2], &[2, 3]);
    }

    #[test]
    fn local_fs_missing_file_is_an_error() {
        let mut fs = LocalFileSystem;
        assert!(fs.file_size("/definitely/not/here.bin").is_err());
    }
}
