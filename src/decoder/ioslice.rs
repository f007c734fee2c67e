use std::io::Error as IoError;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::sync::RwLock;

use crate::Rc;

/// A bounded read/seek window over a byte range of a shared reader.
pub struct IoSlice<R: Read + Seek> {
    reader: Rc<RwLock<R>>,
    pos: u64,
    start: u64,
    end: u64,
}

impl<R: Read + Seek> IoSlice<R> {
    pub fn new(reader: Rc<RwLock<R>>, start: u64, end: u64) -> Self {
        Self {
            reader,
            start,
            end,
            pos: start,
        }
    }
}

impl<R: Read + Seek> Read for IoSlice<R> {
    fn read(&mut self, mut buffer: &mut [u8]) -> Result<usize, IoError> {
        let mut reader = self.reader.write().unwrap();
        reader.seek(SeekFrom::Start(self.pos))?;

        let remaining = (self.end - self.pos) as usize;
        if buffer.len() > remaining {
            buffer = &mut buffer[..remaining];
        }

        let n = reader.read(buffer)?;
        self.pos += n as u64;

        Ok(n)
    }
}

impl<R: Read + Seek> Seek for IoSlice<R> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, IoError> {
        match pos {
            SeekFrom::Start(n) => {
                if self.start + n > self.end {
                    self.pos = self.end;
                } else {
                    self.pos = self.start + n;
                }
            }
            SeekFrom::End(n) => {
                if n > 0 {
                    self.pos = self.end;
                } else if n + (self.end as i64) < (self.start as i64) {
                    return Err(IoError::new(
                        std::io::ErrorKind::InvalidInput,
                        "invalid seek to a negative or overflowing position",
                    ));
                } else {
                    self.pos = (self.end as i64 + n) as u64;
                }
            }
            SeekFrom::Current(n) => {
                if n + (self.pos as i64) > (self.end as i64) {
                    self.pos = self.end;
                } else {
                    self.pos = (self.pos as i64 + n) as u64;
                }
            }
        }
        Ok(self.pos)
    }

    fn rewind(&mut self) -> Result<(), IoError> {
        self.pos = self.start;
        Ok(())
    }

    fn stream_position(&mut self) -> Result<u64, IoError> {
        Ok(self.pos - self.start)
    }
}
