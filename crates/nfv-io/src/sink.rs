//! Positional byte sinks the engine writes to and reads from.
//!
//! Every sink is used through [`IoSink`]; the engine never needs to know
//! whether it talks to a regular file, an in-memory buffer or a device
//! opened for direct I/O.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// Unified positional I/O interface.
pub trait IoSink {
    /// Write all of `data` at `offset`.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Fill `buf` from `offset`, returning fewer bytes only at end of data.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    fn flush_sink(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn seek_write<T: Write + Seek>(target: &mut T, offset: u64, data: &[u8]) -> io::Result<()> {
    target.seek(SeekFrom::Start(offset))?;
    target.write_all(data)
}

fn seek_read<T: Read + Seek>(target: &mut T, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    target.seek(SeekFrom::Start(offset))?;
    let mut filled = 0;
    while filled < buf.len() {
        match target.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl IoSink for File {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        seek_write(self, offset, data)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        seek_read(self, offset, buf)
    }

    fn flush_sink(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

impl IoSink for Cursor<Vec<u8>> {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        seek_write(self, offset, data)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        seek_read(self, offset, buf)
    }
}

impl<S: IoSink + ?Sized> IoSink for &mut S {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        (**self).write_at(offset, data)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_at(offset, buf)
    }

    fn flush_sink(&mut self) -> io::Result<()> {
        (**self).flush_sink()
    }
}

/// Alignment required for direct I/O offsets and lengths.
pub const DIRECT_IO_ALIGN: u64 = 512;

#[cfg(target_os = "linux")]
pub use direct::DirectSink;

#[cfg(target_os = "linux")]
mod direct {
    use super::*;
    use memmap2::MmapMut;
    use std::os::unix::fs::{FileExt, OpenOptionsExt};
    use std::path::Path;

    /// File or device opened with `O_DIRECT`.
    ///
    /// Data goes through a page-aligned anonymous mapping because the kernel
    /// rejects unaligned user buffers for direct I/O.
    pub struct DirectSink {
        file: File,
        bounce: MmapMut,
    }

    impl DirectSink {
        /// Open `path` for direct I/O with a bounce buffer of `max_io` bytes.
        pub fn open(path: &Path, write: bool, max_io: usize) -> io::Result<Self> {
            let file = File::options()
                .read(true)
                .write(write)
                .custom_flags(libc::O_DIRECT)
                .open(path)?;
            let bounce = MmapMut::map_anon(max_io.max(DIRECT_IO_ALIGN as usize))?;
            Ok(Self { file, bounce })
        }

        fn check(&self, offset: u64, len: usize) -> io::Result<()> {
            if offset % DIRECT_IO_ALIGN != 0 || len as u64 % DIRECT_IO_ALIGN != 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "direct I/O of {} bytes at {} is not {}-byte aligned",
                        len, offset, DIRECT_IO_ALIGN
                    ),
                ));
            }
            if len > self.bounce.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "direct I/O of {} bytes exceeds the {} byte buffer",
                        len,
                        self.bounce.len()
                    ),
                ));
            }
            Ok(())
        }
    }

    impl IoSink for DirectSink {
        fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
            self.check(offset, data.len())?;
            self.bounce[..data.len()].copy_from_slice(data);
            self.file.write_all_at(&self.bounce[..data.len()], offset)
        }

        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            self.check(offset, buf.len())?;
            let mut filled = 0;
            while filled < buf.len() {
                match FileExt::read_at(
                    &self.file,
                    &mut self.bounce[filled..buf.len()],
                    offset + filled as u64,
                ) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
            buf[..filled].copy_from_slice(&self.bounce[..filled]);
            Ok(filled)
        }

        fn flush_sink(&mut self) -> io::Result<()> {
            self.file.sync_data()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_sink_positional() {
        let mut sink = Cursor::new(Vec::new());
        sink.write_at(4, b"tail").unwrap();
        sink.write_at(0, b"head").unwrap();
        assert_eq!(sink.get_ref().as_slice(), b"headtail");

        let mut buf = [0u8; 4];
        assert_eq!(sink.read_at(4, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"tail");
    }

    #[test]
    fn test_short_read_at_end() {
        let mut sink = Cursor::new(b"abcdef".to_vec());
        let mut buf = [0u8; 4];
        assert_eq!(sink.read_at(4, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(sink.read_at(10, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_file_sink() {
        let temp = tempfile::tempfile().unwrap();
        let mut sink = temp;
        sink.write_at(8192, b"x").unwrap();
        assert_eq!(sink.metadata().unwrap().len(), 8193);
        let mut buf = [1u8; 2];
        assert_eq!(sink.read_at(0, &mut buf).unwrap(), 2);
        assert_eq!(buf, [0, 0]);
    }
}
