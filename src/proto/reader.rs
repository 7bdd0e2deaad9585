//! A cursor over a received DNS message.
//!
//! All integers are read in network byte order and every read is checked against the end of
//! the buffer, so a truncated packet surfaces as [ReadError::Truncated] instead of a panic.
//! Domain names are decoded with support for compression pointers, which always refer to an
//! offset in the *whole* message, so a reader keeps the full buffer around even when it has
//! been narrowed to the RDATA of a single record with [ByteReader::limited].

use thiserror::Error;

/// Chained compression pointers followed before the name is considered a loop.
const MAX_JUMPS: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("Packet truncated: {needed} bytes needed at offset {position} but only {available} remain")]
    Truncated {
        position: usize,
        needed: usize,
        available: usize,
    },
    #[error("Cannot seek to offset {position} in a buffer of {len} bytes")]
    SeekOutOfBounds { position: usize, len: usize },
    #[error("Compression pointer to offset {offset} is outside of the {len} byte buffer")]
    PointerOutOfBounds { offset: usize, len: usize },
    #[error("Too many compression pointers in domain name (more than {MAX_JUMPS})")]
    CompressionLoop,
    #[error("The label length byte {0:#04x} uses a reserved label type")]
    ReservedLabelType(u8),
    #[error("The byte {0:#04x} is not allowed in a label")]
    IllegalLabelByte(u8),
}

#[derive(Debug, Clone)]
pub struct ByteReader<'data> {
    buffer: &'data [u8],
    position: usize,
    end: usize,
}

impl<'data> ByteReader<'data> {
    pub const fn new(buffer: &'data [u8]) -> Self {
        Self {
            buffer,
            position: 0,
            end: buffer.len(),
        }
    }

    /// A reader over the next `len` bytes. Sequential reads stop at that boundary while
    /// compression pointers can still reach anywhere in the message.
    pub fn limited(&self, len: usize) -> Result<Self, ReadError> {
        self.check(len, self.end)?;
        Ok(Self {
            buffer: self.buffer,
            position: self.position,
            end: self.position + len,
        })
    }

    pub const fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) -> Result<(), ReadError> {
        if position > self.buffer.len() {
            return Err(ReadError::SeekOutOfBounds {
                position,
                len: self.buffer.len(),
            });
        }
        self.position = position;
        Ok(())
    }

    pub const fn remaining(&self) -> usize {
        self.end.saturating_sub(self.position)
    }

    pub const fn buffer(&self) -> &'data [u8] {
        self.buffer
    }

    fn check(&self, needed: usize, limit: usize) -> Result<(), ReadError> {
        let available = limit.saturating_sub(self.position);
        if needed > available {
            return Err(ReadError::Truncated {
                position: self.position,
                needed,
                available,
            });
        }
        Ok(())
    }

    fn take(&mut self, n: usize, limit: usize) -> Result<&'data [u8], ReadError> {
        self.check(n, limit)?;
        let bytes = &self.buffer[self.position..self.position + n];
        self.position += n;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.take(1, self.end)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ReadError> {
        let bytes = self.take(2, self.end)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ReadError> {
        let bytes = self.take(4, self.end)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'data [u8], ReadError> {
        self.take(n, self.end)
    }

    /// Decode a (possibly compressed) domain name into its dotted text form. The root name
    /// decodes to an empty string.
    ///
    /// After following pointers the cursor resumes right after the first pointer, which is
    /// where the name ends in the stream being read.
    pub fn read_domain(&mut self) -> Result<String, ReadError> {
        use ReadError::*;

        let mut name = String::new();
        let mut resume_at = None;
        let mut jumps = 0;
        // Once a pointer has been followed the name lives somewhere else in the message.
        let mut limit = self.end;

        loop {
            let len = self.take(1, limit)?[0];
            match len & 0xc0 {
                0x00 if len == 0 => break,
                0x00 => {
                    let label = self.take(len as usize, limit)?;
                    if let Some(&c) = label.iter().find(|&&c| !is_label_byte(c)) {
                        return Err(IllegalLabelByte(c));
                    }
                    if !name.is_empty() {
                        name.push('.');
                    }
                    name.extend(label.iter().map(|&c| char::from(c)));
                }
                0xc0 => {
                    jumps += 1;
                    if jumps > MAX_JUMPS {
                        return Err(CompressionLoop);
                    }
                    let low = self.take(1, limit)?[0];
                    let offset = (((len & 0x3f) as usize) << 8) | low as usize;
                    if offset >= self.buffer.len() {
                        return Err(PointerOutOfBounds {
                            offset,
                            len: self.buffer.len(),
                        });
                    }
                    if resume_at.is_none() {
                        resume_at = Some(self.position);
                    }
                    self.position = offset;
                    limit = self.buffer.len();
                }
                _ => return Err(ReservedLabelType(len)),
            }
        }

        if let Some(position) = resume_at {
            self.position = position;
        }
        Ok(name)
    }
}

/// Hyphen placement is left to [DomainName](super::DomainName) validation.
fn is_label_byte(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'_'
}
