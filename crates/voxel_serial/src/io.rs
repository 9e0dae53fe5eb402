//! Byte sinks and pull-based byte sources.
//!
//! Serializers write through [`ByteWrite`] and deserializers pull exactly the
//! bytes they need through [`ByteRead`]. Sources report how many bytes are
//! left when they know it, which is what count inference relies on.

use std::io::{BufReader, ErrorKind, Read};

use crate::error::DeserializeError;

/// Destination for serialized bytes.
pub trait ByteWrite {
    /// Append `bytes`.
    fn put(&mut self, bytes: &[u8]);
}

impl ByteWrite for Vec<u8> {
    fn put(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Writes into a pre-sized slice.
///
/// Callers check capacity before writing; overrunning the slice is a bug and
/// panics.
pub struct SliceWriter<'a> {
    buffer: &'a mut [u8],
    position: usize,
}

impl<'a> SliceWriter<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> usize {
        self.position
    }
}

impl ByteWrite for SliceWriter<'_> {
    fn put(&mut self, bytes: &[u8]) {
        let end = self.position + bytes.len();
        assert!(
            end <= self.buffer.len(),
            "serializer wrote past its declared length ({end} > {})",
            self.buffer.len()
        );
        self.buffer[self.position..end].copy_from_slice(bytes);
        self.position = end;
    }
}

/// Forwards every byte to a callback.
pub struct FnWriter<F: FnMut(u8)> {
    write_byte: F,
    written: usize,
}

impl<F: FnMut(u8)> FnWriter<F> {
    pub fn new(write_byte: F) -> Self {
        Self {
            write_byte,
            written: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl<F: FnMut(u8)> ByteWrite for FnWriter<F> {
    fn put(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            (self.write_byte)(byte);
        }
        self.written += bytes.len();
    }
}

/// Source of serialized bytes.
pub trait ByteRead {
    /// Fill `buf` completely or fail with [`DeserializeError::UnexpectedEnd`].
    fn read_into(&mut self, buf: &mut [u8]) -> Result<(), DeserializeError>;

    /// Bytes left in the source, `None` for unbounded streams.
    fn remaining(&self) -> Option<usize>;

    /// Read `len` bytes into a new vector.
    fn read_vec(&mut self, len: usize) -> Result<Vec<u8>, DeserializeError> {
        if let Some(available) = self.remaining() {
            if available < len {
                return Err(DeserializeError::UnexpectedEnd {
                    needed: len,
                    available,
                });
            }
        }
        let mut bytes = vec![0; len];
        self.read_into(&mut bytes)?;
        Ok(bytes)
    }
}

/// Reads from an in-memory slice.
#[derive(Clone, Debug)]
pub struct SliceReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }
}

impl ByteRead for SliceReader<'_> {
    fn read_into(&mut self, buf: &mut [u8]) -> Result<(), DeserializeError> {
        let available = self.data.len() - self.position;
        if buf.len() > available {
            return Err(DeserializeError::UnexpectedEnd {
                needed: buf.len(),
                available,
            });
        }
        buf.copy_from_slice(&self.data[self.position..self.position + buf.len()]);
        self.position += buf.len();
        Ok(())
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.data.len() - self.position)
    }
}

/// Counted pull source: `len` bytes read lazily from `R`.
///
/// The total length is known up front (for example a blob column's size),
/// so count inference works, but bytes are only pulled from `R` when a
/// deserializer asks for them.
pub struct BufferedArray<R: Read> {
    reader: BufReader<R>,
    remaining: usize,
}

impl<R: Read> BufferedArray<R> {
    pub fn new(reader: R, len: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            remaining: len,
        }
    }
}

impl<'a> BufferedArray<&'a [u8]> {
    /// Counted source over a byte slice.
    pub fn from_slice(data: &'a [u8]) -> Self {
        Self::new(data, data.len())
    }
}

impl<R: Read> ByteRead for BufferedArray<R> {
    fn read_into(&mut self, buf: &mut [u8]) -> Result<(), DeserializeError> {
        if buf.len() > self.remaining {
            return Err(DeserializeError::UnexpectedEnd {
                needed: buf.len(),
                available: self.remaining,
            });
        }
        read_exact_or_end(&mut self.reader, buf)?;
        self.remaining -= buf.len();
        Ok(())
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.remaining)
    }
}

/// Unbounded pull source over any reader.
///
/// The length is unknown, so deserializers that infer counts from the
/// remaining length fail with [`DeserializeError::UnknownLength`].
pub struct BufferedByteStream<R: Read> {
    reader: BufReader<R>,
    consumed: usize,
}

impl<R: Read> BufferedByteStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            consumed: 0,
        }
    }

    /// Bytes pulled so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

impl<R: Read> ByteRead for BufferedByteStream<R> {
    fn read_into(&mut self, buf: &mut [u8]) -> Result<(), DeserializeError> {
        read_exact_or_end(&mut self.reader, buf)?;
        self.consumed += buf.len();
        Ok(())
    }

    fn remaining(&self) -> Option<usize> {
        None
    }
}

fn read_exact_or_end<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), DeserializeError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(DeserializeError::UnexpectedEnd {
                    needed: buf.len() - filled,
                    available: 0,
                })
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
