use std::{fmt, str::FromStr};

use async_stream::try_stream;
use bytes::Bytes;
use fastcdc::v2020::AsyncStreamCDC;
use futures::{stream::BoxStream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::Error;

pub const DEFAULT_CHUNK_SIZE: usize = 262_144;

/// Splits file contents into leaves.
///
/// Parsed from and printed as `size-<bytes>`, `rabin`, `rabin-<avg>` or
/// `rabin-<min>-<avg>-<max>`. The content defined chunker uses FastCDC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Chunker {
    Fixed(usize),
    Rabin { min: u32, avg: u32, max: u32 },
}

impl Default for Chunker {
    fn default() -> Self {
        Chunker::Fixed(DEFAULT_CHUNK_SIZE)
    }
}

impl Chunker {
    /// Content defined chunking around `avg`, with min and max derived from
    /// it.
    pub fn rabin(avg: u32) -> Result<Self, Error> {
        Self::rabin_with(avg / 3, avg, avg + avg / 2)
    }

    pub fn rabin_with(min: u32, avg: u32, max: u32) -> Result<Self, Error> {
        use fastcdc::v2020::{
            AVERAGE_MAX, AVERAGE_MIN, MAXIMUM_MAX, MAXIMUM_MIN, MINIMUM_MAX, MINIMUM_MIN,
        };

        if !(MINIMUM_MIN..=MINIMUM_MAX).contains(&min)
            || !(AVERAGE_MIN..=AVERAGE_MAX).contains(&avg)
            || !(MAXIMUM_MIN..=MAXIMUM_MAX).contains(&max)
            || !(min <= avg && avg <= max)
        {
            return Err(Error::InvalidRequest(format!(
                "invalid chunker sizes min={} avg={} max={}",
                min, avg, max
            )));
        }
        Ok(Chunker::Rabin { min, avg, max })
    }

    /// Chunks everything read from `reader`. Empty input yields a single
    /// empty chunk.
    pub fn chunks<R>(&self, reader: R) -> BoxStream<'static, Result<Bytes, Error>>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        match *self {
            Chunker::Fixed(size) => fixed_size(reader, size),
            Chunker::Rabin { min, avg, max } => content_defined(reader, min, avg, max),
        }
    }
}

fn fixed_size<R>(mut reader: R, size: usize) -> BoxStream<'static, Result<Bytes, Error>>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    Box::pin(try_stream! {
        let mut emitted = false;
        loop {
            let mut buf = vec![0u8; size];
            let mut filled = 0;
            while filled < size {
                let n = reader.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            buf.truncate(filled);

            if filled == 0 {
                if !emitted {
                    yield Bytes::new();
                }
                break;
            }

            emitted = true;
            yield Bytes::from(buf);

            if filled < size {
                break;
            }
        }
    })
}

fn content_defined<R>(
    reader: R,
    min: u32,
    avg: u32,
    max: u32,
) -> BoxStream<'static, Result<Bytes, Error>>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    Box::pin(try_stream! {
        let mut chunker = AsyncStreamCDC::new(reader, min, avg, max);
        let mut chunks = Box::pin(chunker.as_stream());
        let mut emitted = false;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| Error::StorageError(format!("unable to chunk: {}", e)))?;
            emitted = true;
            yield Bytes::from(chunk.data);
        }

        if !emitted {
            yield Bytes::new();
        }
    })
}

impl FromStr for Chunker {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidRequest(format!("invalid chunker {:?}", s));
        let parse = |n: &str| n.parse::<u32>().map_err(|_| invalid());

        if let Some(size) = s.strip_prefix("size-") {
            let size = size.parse::<usize>().map_err(|_| invalid())?;
            if size == 0 {
                return Err(invalid());
            }
            return Ok(Chunker::Fixed(size));
        }

        if s == "rabin" {
            return Chunker::rabin(DEFAULT_CHUNK_SIZE as u32);
        }

        if let Some(sizes) = s.strip_prefix("rabin-") {
            let parts: Vec<&str> = sizes.split('-').collect();
            return match parts.as_slice() {
                [avg] => Chunker::rabin(parse(avg)?),
                [min, avg, max] => Chunker::rabin_with(parse(min)?, parse(avg)?, parse(max)?),
                _ => Err(invalid()),
            };
        }

        Err(invalid())
    }
}

impl fmt::Display for Chunker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chunker::Fixed(size) => write!(f, "size-{}", size),
            Chunker::Rabin { min, avg, max } => write!(f, "rabin-{}-{}-{}", min, avg, max),
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use rstest::rstest;

    use super::*;
    use crate::fixtures::BLOB_B;

    #[rstest]
    #[case::default_size("size-262144", Chunker::Fixed(262_144))]
    #[case::small("size-10", Chunker::Fixed(10))]
    #[case::rabin("rabin", Chunker::Rabin { min: 87_381, avg: 262_144, max: 393_216 })]
    #[case::rabin_avg("rabin-4096", Chunker::Rabin { min: 1365, avg: 4096, max: 6144 })]
    #[case::rabin_all("rabin-1024-2048-4096", Chunker::Rabin { min: 1024, avg: 2048, max: 4096 })]
    fn parse(#[case] s: &str, #[case] expected: Chunker) {
        assert_eq!(expected, s.parse::<Chunker>().unwrap());
    }

    #[rstest]
    #[case::zero("size-0")]
    #[case::not_a_number("size-abc")]
    #[case::unknown("buzhash")]
    #[case::inverted("rabin-4096-2048-1024")]
    #[case::too_many("rabin-1-2-3-4")]
    fn parse_fail(#[case] s: &str) {
        assert!(s.parse::<Chunker>().is_err());
    }

    #[test]
    fn display_roundtrips() {
        for chunker in [Chunker::Fixed(42), Chunker::rabin(4096).unwrap()] {
            assert_eq!(chunker, chunker.to_string().parse().unwrap());
        }
    }

    #[tokio::test]
    async fn fixed_size_chunks() {
        let chunks: Vec<Bytes> = Chunker::Fixed(4)
            .chunks(std::io::Cursor::new(b"0123456789".to_vec()))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(
            vec![
                Bytes::from_static(b"0123"),
                Bytes::from_static(b"4567"),
                Bytes::from_static(b"89")
            ],
            chunks
        );
    }

    /// An exact multiple of the chunk size produces no trailing empty chunk.
    #[tokio::test]
    async fn fixed_size_exact_multiple() {
        let chunks: Vec<Bytes> = Chunker::Fixed(5)
            .chunks(std::io::Cursor::new(b"0123456789".to_vec()))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(2, chunks.len());
    }

    #[rstest]
    #[case::fixed(Chunker::default())]
    #[case::rabin(Chunker::rabin(4096).unwrap())]
    #[tokio::test]
    async fn empty_input_one_empty_chunk(#[case] chunker: Chunker) {
        let chunks: Vec<Bytes> = chunker
            .chunks(std::io::Cursor::new(Vec::new()))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(vec![Bytes::new()], chunks);
    }

    #[tokio::test]
    async fn rabin_reassembles() {
        let chunker = Chunker::rabin(4096).unwrap();
        let chunks: Vec<Bytes> = chunker
            .chunks(std::io::Cursor::new(BLOB_B.to_vec()))
            .try_collect()
            .await
            .unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 6144));
        assert_eq!(BLOB_B.to_vec(), chunks.concat());
    }
}
