//! Pluggable byte-to-byte compression codecs used by the key-value layer.

use std::io::{Read, Write};

use crate::{Error, Result};

/// A reversible byte-to-byte codec applied to chunk bytes before they reach a key-value backend.
pub trait Compressor: Send + Sync {
	/// Compress `data`.
	fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

	/// Reverse [`Compressor::compress`] exactly.
	fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// No-op codec; stores bytes unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityCompressor;
impl Compressor for IdentityCompressor {
	fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
		Ok(data.to_vec())
	}

	fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
		Ok(data.to_vec())
	}
}

/// Zstandard codec, optionally seeded with a shared dictionary trained on representative chunks.
#[derive(Clone, Debug, Default)]
pub struct ZstdCompressor {
	level: i32,
	dictionary: Option<Vec<u8>>,
}
impl ZstdCompressor {
	/// Build a codec at the given compression level with no dictionary.
	pub fn new(level: i32) -> Self {
		Self { level, dictionary: None }
	}

	/// Build a codec seeded with `dictionary`, shrinking output for chunks similar to it.
	pub fn with_dictionary(level: i32, dictionary: Vec<u8>) -> Self {
		Self { level, dictionary: Some(dictionary) }
	}
}
impl Compressor for ZstdCompressor {
	fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
		match &self.dictionary {
			Some(dict) => {
				let mut compressor = zstd::bulk::Compressor::with_dictionary(self.level, dict)
					.map_err(|err| Error::Compression(err.to_string()))?;
				compressor.compress(data).map_err(|err| Error::Compression(err.to_string()))
			},
			None => zstd::encode_all(data, self.level).map_err(|err| Error::Compression(err.to_string())),
		}
	}

	fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
		match &self.dictionary {
			Some(dict) => {
				let mut decompressor = zstd::bulk::Decompressor::with_dictionary(dict)
					.map_err(|err| Error::Compression(err.to_string()))?;
				decompressor
					.decompress(data, data.len().max(64) * 16)
					.map_err(|err| Error::Compression(err.to_string()))
			},
			None => zstd::decode_all(data).map_err(|err| Error::Compression(err.to_string())),
		}
	}
}

/// Zlib codec via `flate2`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ZlibCompressor;
impl Compressor for ZlibCompressor {
	fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
		use flate2::{Compression, write::ZlibEncoder};

		let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
		encoder.write_all(data).map_err(Error::Io)?;
		encoder.finish().map_err(Error::Io)
	}

	fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
		use flate2::read::ZlibDecoder;

		let mut decoder = ZlibDecoder::new(data);
		let mut out = Vec::new();
		decoder.read_to_end(&mut out).map_err(Error::Io)?;
		Ok(out)
	}
}

/// LZMA/XZ codec via `xz2`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LzmaCompressor;
impl Compressor for LzmaCompressor {
	fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
		use xz2::write::XzEncoder;

		let mut encoder = XzEncoder::new(Vec::new(), 6);
		encoder.write_all(data).map_err(Error::Io)?;
		encoder.finish().map_err(Error::Io)
	}

	fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
		use xz2::read::XzDecoder;

		let mut decoder = XzDecoder::new(data);
		let mut out = Vec::new();
		decoder.read_to_end(&mut out).map_err(Error::Io)?;
		Ok(out)
	}
}

/// Brotli codec.
///
/// Unlike [`ZstdCompressor`], this codec has no dictionary support: the pinned `brotli` crate's
/// stable API (`BrotliCompress`/`BrotliDecompress`) takes no dictionary parameter, so there is no
/// way to honor one without silently discarding it.
#[derive(Clone, Debug, Default)]
pub struct BrotliCompressor {
	quality: u32,
}
impl BrotliCompressor {
	/// Build a codec at the given quality level (0-11).
	pub fn new(quality: u32) -> Self {
		Self { quality }
	}
}
impl Compressor for BrotliCompressor {
	fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
		let params = brotli::enc::BrotliEncoderParams { quality: self.quality as i32, ..Default::default() };
		let mut out = Vec::new();

		brotli::BrotliCompress(&mut std::io::Cursor::new(data), &mut out, &params)
			.map_err(Error::Io)?;

		Ok(out)
	}

	fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
		let mut out = Vec::new();

		brotli::BrotliDecompress(&mut std::io::Cursor::new(data), &mut out).map_err(Error::Io)?;

		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn round_trip(compressor: &dyn Compressor, data: &[u8]) {
		let compressed = compressor.compress(data).expect("compress");
		let restored = compressor.decompress(&compressed).expect("decompress");
		assert_eq!(restored, data);
	}

	#[test]
	fn identity_round_trips() {
		round_trip(&IdentityCompressor, b"hello, world");
	}

	#[test]
	fn zstd_round_trips_with_and_without_dictionary() {
		let data = b"repeated repeated repeated content for compression";
		round_trip(&ZstdCompressor::new(3), data);
		round_trip(&ZstdCompressor::with_dictionary(3, b"repeated content".to_vec()), data);
	}

	#[test]
	fn zlib_round_trips() {
		round_trip(&ZlibCompressor, b"zlib payload bytes go here");
	}

	#[test]
	fn lzma_round_trips() {
		round_trip(&LzmaCompressor, b"lzma payload bytes go here");
	}

	#[test]
	fn brotli_round_trips() {
		round_trip(&BrotliCompressor::new(5), b"brotli payload bytes go here");
	}

	#[test]
	fn empty_input_round_trips_for_every_codec() {
		round_trip(&IdentityCompressor, b"");
		round_trip(&ZstdCompressor::new(3), b"");
		round_trip(&ZlibCompressor, b"");
		round_trip(&LzmaCompressor, b"");
		round_trip(&BrotliCompressor::new(5), b"");
	}
}
