//! Compression codecs used when recompressing or repacking archived files.

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use crate::core::error::{Error, Result};

const GZIP_LEVEL: u32 = 9;
const BZIP2_LEVEL: u32 = 9;
const XZ_LEVEL: u32 = 9;
const ZSTD_LEVEL: i32 = 19;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Codec {
    Xz,
    Gzip,
    Bzip2,
    Zstd,
    #[default]
    None,
}

impl Codec {
    /// Extension appended to compressed output, including the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Codec::Xz => ".xz",
            Codec::Gzip => ".gz",
            Codec::Bzip2 => ".bz2",
            Codec::Zstd => ".zst",
            Codec::None => "",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Codec::Xz => "xz",
            Codec::Gzip => "gzip",
            Codec::Bzip2 => "bzip2",
            Codec::Zstd => "zstd",
            Codec::None => "none",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Codec::None)
    }

    pub fn encoder<W: Write>(&self, inner: W) -> io::Result<Encoder<W>> {
        Ok(match self {
            Codec::Xz => Encoder::Xz(xz2::write::XzEncoder::new(inner, XZ_LEVEL)),
            Codec::Gzip => Encoder::Gzip(flate2::write::GzEncoder::new(
                inner,
                flate2::Compression::new(GZIP_LEVEL),
            )),
            Codec::Bzip2 => Encoder::Bzip2(bzip2::write::BzEncoder::new(
                inner,
                bzip2::Compression::new(BZIP2_LEVEL),
            )),
            Codec::Zstd => Encoder::Zstd(zstd::stream::write::Encoder::new(inner, ZSTD_LEVEL)?),
            Codec::None => Encoder::Plain(inner),
        })
    }

    pub fn decoder<'a, R: Read + 'a>(&self, inner: R) -> io::Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Codec::Xz => Box::new(xz2::read::XzDecoder::new_multi_decoder(inner)),
            Codec::Gzip => Box::new(flate2::read::MultiGzDecoder::new(inner)),
            Codec::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(inner)),
            Codec::Zstd => Box::new(zstd::stream::read::Decoder::new(inner)?),
            Codec::None => Box::new(inner),
        })
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Codec {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "xz" => Ok(Codec::Xz),
            "gzip" => Ok(Codec::Gzip),
            "bzip2" => Ok(Codec::Bzip2),
            "zstd" => Ok(Codec::Zstd),
            "" | "none" => Ok(Codec::None),
            other => Err(Error::config(format!(
                "unsupported compression scheme: {other}"
            ))),
        }
    }
}

/// How to undo the compression of a file named with `extension`
/// (including the dot).
///
/// Returns the codec and the suffix that replaces the extension once
/// decompressed; `.tbz2` becomes `.tar`.
pub fn decoder_for_extension(extension: &str) -> Option<(Codec, &'static str)> {
    match extension {
        ".gz" => Some((Codec::Gzip, "")),
        ".bz2" => Some((Codec::Bzip2, "")),
        ".tbz2" => Some((Codec::Bzip2, ".tar")),
        ".xz" => Some((Codec::Xz, "")),
        ".zst" => Some((Codec::Zstd, "")),
        _ => None,
    }
}

/// A compressing writer that must be explicitly finished.
pub enum Encoder<W: Write> {
    Xz(xz2::write::XzEncoder<W>),
    Gzip(flate2::write::GzEncoder<W>),
    Bzip2(bzip2::write::BzEncoder<W>),
    Zstd(zstd::stream::write::Encoder<'static, W>),
    Plain(W),
}

impl<W: Write> Encoder<W> {
    pub fn finish(self) -> io::Result<W> {
        match self {
            Encoder::Xz(inner) => inner.finish(),
            Encoder::Gzip(inner) => inner.finish(),
            Encoder::Bzip2(inner) => inner.finish(),
            Encoder::Zstd(inner) => inner.finish(),
            Encoder::Plain(mut inner) => {
                inner.flush()?;
                Ok(inner)
            }
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Xz(inner) => inner.write(buf),
            Encoder::Gzip(inner) => inner.write(buf),
            Encoder::Bzip2(inner) => inner.write(buf),
            Encoder::Zstd(inner) => inner.write(buf),
            Encoder::Plain(inner) => inner.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Xz(inner) => inner.flush(),
            Encoder::Gzip(inner) => inner.flush(),
            Encoder::Bzip2(inner) => inner.flush(),
            Encoder::Zstd(inner) => inner.flush(),
            Encoder::Plain(inner) => inner.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_codecs() {
        assert_eq!("xz".parse::<Codec>().expect("xz"), Codec::Xz);
        assert_eq!("zstd".parse::<Codec>().expect("zstd"), Codec::Zstd);
        assert_eq!("".parse::<Codec>().expect("empty"), Codec::None);
    }

    #[test]
    fn unsupported_codec_is_config_error() {
        let err = "lzma".parse::<Codec>().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn every_codec_decodes_what_it_encodes() {
        let payload = b"PTAC,20230815,1,2,3\n".repeat(64);
        for codec in [Codec::Xz, Codec::Gzip, Codec::Bzip2, Codec::Zstd, Codec::None] {
            let mut encoder = codec.encoder(Vec::new()).expect("encoder");
            encoder.write_all(&payload).expect("write");
            let compressed = encoder.finish().expect("finish");

            let mut decoded = Vec::new();
            codec
                .decoder(compressed.as_slice())
                .expect("decoder")
                .read_to_end(&mut decoded)
                .expect("decode");
            assert_eq!(decoded, payload, "codec {codec}");
        }
    }

    #[test]
    fn tbz2_decompresses_to_tar() {
        assert_eq!(decoder_for_extension(".tbz2"), Some((Codec::Bzip2, ".tar")));
        assert_eq!(decoder_for_extension(".gz"), Some((Codec::Gzip, "")));
        assert_eq!(decoder_for_extension(".zip"), None);
    }
}
