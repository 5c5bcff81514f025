// Compression service for pack entries and loose objects.
//
// Pack entries are zlib streams packed back-to-back with no length prefix,
// so a backend must report how many compressed bytes a decompression
// consumed. The codec advances its cursor by exactly that amount.
//
// Provides a pluggable `CompressBackend` trait with a zlib implementation
// (via flate2). Custom backends can be supplied to the pack writer/reader
// and the loose-object helpers.

use std::io;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

/// Output of a single decompression call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decompressed {
    /// Inflated bytes.
    pub data: Vec<u8>,
    /// Number of compressed input bytes the stream occupied.
    pub consumed: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum DecompressError {
    #[error("compressed stream ends after {consumed} bytes without a terminator")]
    Truncated { consumed: usize },
    #[error("corrupt compressed stream: {0}")]
    Corrupt(#[from] flate2::DecompressError),
}

// ---------------------------------------------------------------------------
// CompressBackend trait
// ---------------------------------------------------------------------------

/// A byte-stream compressor treated as a black box by the pack codec.
///
/// # Implementing a custom backend
///
/// ```no_run
/// use oxipack::compress::{CompressBackend, Decompressed, DecompressError};
///
/// struct Passthrough;
///
/// impl CompressBackend for Passthrough {
///     fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
///         Ok(data.to_vec()) // placeholder
///     }
///     fn decompress(&self, data: &[u8], expected_len: usize) -> Result<Decompressed, DecompressError> {
///         let n = expected_len.min(data.len());
///         Ok(Decompressed { data: data[..n].to_vec(), consumed: n })
///     }
/// }
/// ```
pub trait CompressBackend: Send + Sync {
    /// Compress a complete buffer into one self-terminating stream.
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    /// Decompress the stream at the front of `data`.
    ///
    /// `expected_len` is the declared uncompressed size; implementations may
    /// use it to pre-size the output but must not truncate to it. Bytes after
    /// the end of the stream are left untouched and excluded from
    /// `consumed`.
    fn decompress(&self, data: &[u8], expected_len: usize)
    -> Result<Decompressed, DecompressError>;
}

// ---------------------------------------------------------------------------
// Zlib backend
// ---------------------------------------------------------------------------

/// Growth step when the declared size was too small.
const GROW_STEP: usize = 4096;

/// Cap on the output buffer reserved up front from an untrusted size hint.
const MAX_PREALLOC: usize = 1 << 24;

/// Zlib/Deflate backend, the format git uses for packs and loose objects.
///
/// Uses zlib format (deflate + zlib header), not raw deflate,
/// so each stream is self-delimiting and includes an Adler-32 checksum.
#[derive(Debug, Clone, Copy)]
pub struct ZlibBackend {
    level: Compression,
}

impl ZlibBackend {
    /// Create a Zlib backend with the given compression level (0-9).
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }

    pub fn level(&self) -> u32 {
        self.level.level()
    }
}

impl Default for ZlibBackend {
    fn default() -> Self {
        Self::new(6)
    }
}

impl CompressBackend for ZlibBackend {
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut deflater = Compress::new(self.level, true);
        let mut output = Vec::with_capacity(data.len() / 2 + 64);
        loop {
            if output.len() == output.capacity() {
                output.reserve(GROW_STEP);
            }
            let consumed = deflater.total_in() as usize;
            let status = deflater
                .compress_vec(&data[consumed..], &mut output, FlushCompress::Finish)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            if status == Status::StreamEnd {
                return Ok(output);
            }
        }
    }

    fn decompress(
        &self,
        data: &[u8],
        expected_len: usize,
    ) -> Result<Decompressed, DecompressError> {
        let mut inflater = Decompress::new(true);
        // Reserve one spare byte so the end-of-stream marker can be seen
        // without a reallocation.
        let mut output = Vec::with_capacity(expected_len.min(MAX_PREALLOC) + 1);
        loop {
            if output.len() == output.capacity() {
                output.reserve(GROW_STEP);
            }
            let before_in = inflater.total_in();
            let before_out = inflater.total_out();
            let status = inflater.decompress_vec(
                &data[before_in as usize..],
                &mut output,
                FlushDecompress::None,
            )?;
            if status == Status::StreamEnd {
                return Ok(Decompressed {
                    data: output,
                    consumed: inflater.total_in() as usize,
                });
            }
            // Input exhausted with output space left: the stream is cut short.
            if inflater.total_in() == before_in && inflater.total_out() == before_out {
                return Err(DecompressError::Truncated {
                    consumed: inflater.total_in() as usize,
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
