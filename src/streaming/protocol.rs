//! Header frame and wire tokens for the lancom protocol.
//!
//! Wire format: all multi-byte integers are big-endian.
//!
//! ```text
//! SIGN(6) | BLOCK_COUNT(u32) | BLOCK_SIZE(u32) | TAIL_SIZE(u64) | NAME_LEN(u16) | NAME
//! ```
//!
//! The body that follows is `BLOCK_COUNT` blocks of `BLOCK_SIZE` bytes and one
//! tail block of `TAIL_SIZE` bytes.

use crate::error::{Result, TransferError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Magic sign prefixed to every header frame
pub const SIGN: &[u8; 6] = b"LANCOM";

/// Sent by the passive side right after accept
pub const CHALLENGE_TOKEN: &[u8] = b"LANCOM?HELLO";

/// Reply expected from the initiative side
pub const RESPONSE_TOKEN: &[u8] = b"LANCOM!READY";

/// Sent by the receiver once the body has been written
pub const FINISH_TOKEN: &[u8] = b"LANCOM#DONE";

/// Default block size (1KB)
pub const DEFAULT_BLOCK_SIZE: u32 = 1024;

/// Largest block a receiver will buffer (64MB)
pub const MAX_BLOCK_SIZE: u32 = 64 * 1024 * 1024;

/// sign + block_count + block_size + tail_size + name_len
pub const HEADER_FIXED_LEN: usize = 6 + 4 + 4 + 8 + 2;

const FIELDS_LEN: usize = HEADER_FIXED_LEN - SIGN.len();

// =============================================================================
// Header
// =============================================================================

/// File description sent ahead of the body. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    block_count: u32,
    block_size: u32,
    tail_size: u64,
    filename: String,
}

impl Header {
    /// Build a header from unchecked values, rejecting any field that does not
    /// fit its wire width.
    pub fn new(
        block_count: u64,
        block_size: u64,
        tail_size: u128,
        filename: impl Into<String>,
    ) -> Result<Self> {
        let filename = filename.into();

        let block_count = narrow::<u32>("block_count", block_count as u128)?;
        let block_size = narrow::<u32>("block_size", block_size as u128)?;
        let tail_size = narrow::<u64>("tail_size", tail_size)?;
        narrow::<u16>("filename_length", filename.len() as u128)?;

        let total = block_count as u128 * block_size as u128 + tail_size as u128;
        narrow::<u64>("total_size", total)?;

        Ok(Self {
            block_count,
            block_size,
            tail_size,
            filename,
        })
    }

    /// Split a file of `file_size` bytes into full blocks plus a tail.
    pub fn for_file(file_size: u64, block_size: u32, filename: impl Into<String>) -> Result<Self> {
        if block_size == 0 {
            return Err(TransferError::Config(
                "block size must be greater than zero".to_string(),
            ));
        }
        let block_count = file_size / block_size as u64;
        let tail_size = file_size % block_size as u64;
        Self::new(block_count, block_size as u64, tail_size as u128, filename)
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn tail_size(&self) -> u64 {
        self.tail_size
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// `block_count * block_size + tail_size`
    pub fn total_size(&self) -> u64 {
        self.block_count as u64 * self.block_size as u64 + self.tail_size
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_FIXED_LEN + self.filename.len()
    }

    pub fn encode(&self) -> Bytes {
        let name = self.filename.as_bytes();
        let mut buf = BytesMut::with_capacity(self.encoded_len());

        buf.put_slice(SIGN);
        buf.put_u32(self.block_count);
        buf.put_u32(self.block_size);
        buf.put_u64(self.tail_size);
        buf.put_u16(name.len() as u16);
        buf.put_slice(name);

        buf.freeze()
    }
}

fn narrow<T: TryFrom<u128>>(field: &'static str, value: u128) -> Result<T>
where
    T: Bounded,
{
    T::try_from(value).map_err(|_| TransferError::FieldOverflow {
        field,
        value,
        max: T::MAX_U128,
    })
}

trait Bounded {
    const MAX_U128: u128;
}

impl Bounded for u16 {
    const MAX_U128: u128 = u16::MAX as u128;
}

impl Bounded for u32 {
    const MAX_U128: u128 = u32::MAX as u128;
}

impl Bounded for u64 {
    const MAX_U128: u128 = u64::MAX as u128;
}

// =============================================================================
// Header reading/writing
// =============================================================================

/// Outcome of reading a header frame.
///
/// Protocol-level failures are ordinary values so the session can abort
/// without unwinding through `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderRead {
    Header(Header),
    /// First six bytes were not [`SIGN`]. Nothing past them was read.
    SignMismatch { found: Vec<u8> },
    /// The peer closed the stream in the middle of the header.
    Truncated { received: usize },
}

/// Write a header frame in a single call.
pub async fn write_header<W: AsyncWrite + Unpin>(w: &mut W, header: &Header) -> Result<()> {
    w.write_all(&header.encode()).await?;
    Ok(())
}

/// Read and validate a header frame.
pub async fn read_header<R: AsyncRead + Unpin>(r: &mut R) -> Result<HeaderRead> {
    let mut sign = [0u8; SIGN.len()];
    let n = read_full(r, &mut sign).await?;
    if n < sign.len() {
        return Ok(HeaderRead::Truncated { received: n });
    }
    if &sign != SIGN {
        return Ok(HeaderRead::SignMismatch {
            found: sign.to_vec(),
        });
    }

    let mut fields = [0u8; FIELDS_LEN];
    let n = read_full(r, &mut fields).await?;
    if n < fields.len() {
        return Ok(HeaderRead::Truncated {
            received: SIGN.len() + n,
        });
    }

    let mut cursor = &fields[..];
    let block_count = cursor.get_u32();
    let block_size = cursor.get_u32();
    let tail_size = cursor.get_u64();
    let name_len = cursor.get_u16() as usize;

    let mut name = vec![0u8; name_len];
    let n = read_full(r, &mut name).await?;
    if n < name_len {
        return Ok(HeaderRead::Truncated {
            received: HEADER_FIXED_LEN + n,
        });
    }
    let filename = String::from_utf8(name)
        .map_err(|_| TransferError::Protocol("invalid UTF-8 in file name".to_string()))?;

    let header = Header::new(
        block_count as u64,
        block_size as u64,
        tail_size as u128,
        filename,
    )
    .map_err(|e| TransferError::Protocol(format!("header rejected: {}", e)))?;

    Ok(HeaderRead::Header(header))
}

/// Read until `buf` is full or the peer closes the stream.
///
/// Returns the number of bytes gathered, which is shorter than `buf` only when
/// the stream ended early. A reset connection counts as an early close.
pub async fn read_full<R: AsyncRead + Unpin>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) => match e.kind() {
                io::ErrorKind::Interrupted => {}
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::UnexpectedEof => break,
                _ => return Err(e),
            },
        }
    }
    Ok(filled)
}

// =============================================================================
// Tests
// =============================================================================
