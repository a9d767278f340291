//! Chunk serializer/loader (§4.6): bit-exact big-endian wire encode/decode
//! with a CRC-32C-protected metadata index and a trailer-anchored layout.
//!
//! ```text
//! header:
//!   u32  magic          = 0x012EE56A
//!   u8   format         ∈ {1, 2}
//!   u8   encoding       (present iff format == 2)
//!
//! blocks section (concatenation, one per block):
//!   raw compressed payload
//!   u32  crc32c(payload)
//!
//! metadata section:
//!   uvarint num_blocks
//!   repeat num_blocks times:
//!     uvarint num_entries
//!     svarint mint
//!     svarint maxt
//!     uvarint offset           // absolute byte offset of payload within chunk
//!     uvarint payload_length
//!   u32 crc32c(metadata-section-so-far)
//!
//! trailer:
//!   u64  metadata_offset       // absolute offset of num_blocks field
//! ```
//!
//! Grounded on [`crate::Superblock`]'s CRC-guarded fixed preamble and
//! verify-before-trust field order, adapted from a 256-byte fixed,
//! little-endian preamble to this format's variable-length, big-endian,
//! trailer-anchored layout (§9 notes only V2 is ever written).

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Write};

use crate::block::Block;
use crate::chunk::{Chunk, Format};
use crate::encoding::Encoding;
use crate::error::ChunkError;
use crate::varint::{read_uvarint, read_svarint, write_svarint, write_uvarint};

/// Fixed header magic (§4.6, §6).
pub const MAGIC: u32 = 0x012E_E56A;

/// Encode `chunk` to its wire format (§4.6 "Encode (Bytes())").
///
/// Flushes the head via a final cut first, so every entry appended so far
/// is captured in a sealed block. Only [`Format::V2`] is ever written (§9
/// "V1 write path").
pub fn encode(chunk: &mut Chunk) -> Result<Vec<u8>, ChunkError> {
    chunk.close()?;

    let mut out = Vec::new();
    out.write_u32::<BigEndian>(MAGIC)?;
    out.write_u8(Format::V2.to_byte())?;
    out.write_u8(chunk.encoding().to_byte())?;

    let mut offsets = Vec::with_capacity(chunk.blocks().len());
    for block in chunk.blocks() {
        let offset = out.len() as u64;
        offsets.push(offset);
        out.write_all(&block.payload)?;
        let crc = crc32c::crc32c(&block.payload);
        out.write_u32::<BigEndian>(crc)?;
    }

    let metadata_offset = out.len() as u64;
    let metadata_start = out.len();
    write_uvarint(&mut out, chunk.blocks().len() as u64)?;
    for (block, offset) in chunk.blocks().iter().zip(&offsets) {
        write_uvarint(&mut out, block.num_entries)?;
        write_svarint(&mut out, block.mint)?;
        write_svarint(&mut out, block.maxt)?;
        write_uvarint(&mut out, *offset)?;
        write_uvarint(&mut out, block.payload.len() as u64)?;
    }
    let metadata_crc = crc32c::crc32c(&out[metadata_start..]);
    out.write_u32::<BigEndian>(metadata_crc)?;

    out.write_u64::<BigEndian>(metadata_offset)?;
    Ok(out)
}

/// One block's decoded metadata record, before the corresponding payload
/// slice has been checked against its per-payload CRC.
struct BlockMeta {
    num_entries: u64,
    mint: i64,
    maxt: i64,
    offset: u64,
    payload_length: u64,
}

/// Decode a chunk from its wire format (§4.6 "Decode (load from bytes)").
///
/// On a metadata CRC mismatch or a header integrity failure, no chunk is
/// recoverable and only the error is returned. On a per-block payload CRC
/// mismatch, returns `Err(InvalidChecksum)` whose `partial` field carries a
/// [`Chunk`] containing every block verified before the failure (§7, §9 Open
/// Question — kept as specified: callers must be prepared for this
/// dual-return).
pub fn load(bytes: &[u8]) -> Result<Chunk, ChunkError> {
    let mut header = bytes;
    let magic = header.read_u32::<BigEndian>()?;
    if magic != MAGIC {
        return Err(ChunkError::InvalidMagic {
            expected: MAGIC,
            actual: magic,
        });
    }
    let format_byte = header.read_u8()?;
    let format = Format::from_byte(format_byte).ok_or(ChunkError::InvalidVersion(format_byte))?;
    let encoding = match format {
        Format::V2 => {
            let encoding_byte = header.read_u8()?;
            Encoding::from_byte(encoding_byte)
                .ok_or(ChunkError::UnavailableEncoding(encoding_byte))?
        }
        // V1 has no encoding byte and always implies GZIP (§6).
        Format::V1 => Encoding::Gzip,
    };

    if bytes.len() < 12 {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "chunk shorter than trailer").into());
    }
    let trailer_start = bytes.len() - 8;
    let metadata_offset = (&bytes[trailer_start..]).read_u64::<BigEndian>()? as usize;
    let metadata_crc_pos = trailer_start - 4;
    // `metadata_offset` comes from the trailer, which is deliberately not
    // CRC-covered (§4.6) — it must be range-checked before it's used to
    // slice `bytes`, or a single flipped trailer bit panics instead of
    // failing cleanly.
    if metadata_offset > metadata_crc_pos {
        return Err(ChunkError::InvalidChecksum {
            where_: "metadata section",
            partial: None,
        });
    }
    let stored_metadata_crc = (&bytes[metadata_crc_pos..trailer_start]).read_u32::<BigEndian>()?;
    let computed_metadata_crc = crc32c::crc32c(&bytes[metadata_offset..metadata_crc_pos]);
    if computed_metadata_crc != stored_metadata_crc {
        return Err(ChunkError::InvalidChecksum {
            where_: "metadata section",
            partial: None,
        });
    }

    let mut meta_cursor = &bytes[metadata_offset..metadata_crc_pos];
    let num_blocks = read_uvarint(&mut meta_cursor)?;
    let mut metas = Vec::with_capacity(num_blocks as usize);
    for _ in 0..num_blocks {
        let num_entries = read_uvarint(&mut meta_cursor)?;
        let mint = read_svarint(&mut meta_cursor)?;
        let maxt = read_svarint(&mut meta_cursor)?;
        let offset = read_uvarint(&mut meta_cursor)?;
        let payload_length = read_uvarint(&mut meta_cursor)?;
        metas.push(BlockMeta {
            num_entries,
            mint,
            maxt,
            offset,
            payload_length,
        });
    }

    let block_size_bytes = crate::chunk::DEFAULT_BLOCK_SIZE_BYTES;
    let mut blocks = Vec::with_capacity(metas.len());
    for meta in &metas {
        let start = meta.offset as usize;
        let end = start + meta.payload_length as usize;
        let payload = &bytes[start..end];
        let crc_end = end + 4;
        let stored_crc = (&bytes[end..crc_end]).read_u32::<BigEndian>()?;
        let computed_crc = crc32c::crc32c(payload);
        if computed_crc != stored_crc {
            let partial = Chunk::from_parts(
                format,
                encoding,
                block_size_bytes,
                0,
                blocks,
            );
            return Err(ChunkError::InvalidChecksum {
                where_: "block payload",
                partial: Some(Box::new(partial)),
            });
        }
        blocks.push(Block {
            payload: payload.to_vec(),
            num_entries: meta.num_entries,
            mint: meta.mint,
            maxt: meta.maxt,
            offset: meta.offset,
            uncompressed_size: 0,
        });
    }

    Ok(Chunk::from_parts(format, encoding, block_size_bytes, 0, blocks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkConfig;
    use crate::iter::{Direction, EntryIterator};

    fn sample_chunk() -> Chunk {
        let mut chunk = Chunk::new(ChunkConfig {
            encoding: Encoding::Gzip,
            block_size_bytes: 16,
            target_size_bytes: 0,
        });
        chunk.append(1, b"0123456789".to_vec()).unwrap(); // 10
        chunk.append(2, b"abcdef".to_vec()).unwrap(); // 16 total -> cuts
        chunk.append(3, b"z".to_vec()).unwrap(); // stays in head
        chunk
    }

    /// S3 — round trip: encode, load, iterate FORWARD over the full range.
    #[test]
    fn s3_round_trip() {
        let mut chunk = sample_chunk();
        let bytes = encode(&mut chunk).unwrap();
        let loaded = load(&bytes).unwrap();
        assert_eq!(loaded.encoding(), Encoding::Gzip);
        assert_eq!(loaded.bounds(), (1, 3));
        assert_eq!(loaded.blocks_len(), 1);

        let stats = crate::stats::new_stats_sink();
        let mut it = loaded.iterator(i64::MIN, i64::MAX, Direction::Forward, None, stats);
        let mut seen = Vec::new();
        while it.next() {
            let e = it.current().unwrap();
            seen.push((e.timestamp, e.line.clone()));
        }
        assert!(it.error().is_none());
        assert_eq!(
            seen,
            vec![
                (1, b"0123456789".to_vec()),
                (2, b"abcdef".to_vec()),
                (3, b"z".to_vec()),
            ]
        );
    }

    /// S4 — CRC corruption: flipping one bit inside a block payload yields
    /// `InvalidChecksum`, with whatever prefix of blocks verified cleanly
    /// still reconstructed in `partial`.
    #[test]
    fn s4_crc_corruption() {
        let mut chunk = sample_chunk();
        let mut bytes = encode(&mut chunk).unwrap();
        // Byte 6 sits inside the first (only) block's compressed payload,
        // which starts right after the 6-byte header.
        bytes[6] ^= 0xff;
        let err = load(&bytes).unwrap_err();
        match err {
            ChunkError::InvalidChecksum { where_, partial } => {
                assert_eq!(where_, "block payload");
                let partial = partial.expect("a CRC failure on the only block leaves no prefix");
                assert_eq!(partial.blocks_len(), 0);
            }
            other => panic!("expected InvalidChecksum, got {other:?}"),
        }
    }

    #[test]
    fn invalid_magic_rejected() {
        let mut bytes = encode(&mut sample_chunk()).unwrap();
        bytes[0] ^= 0xff;
        let err = load(&bytes).unwrap_err();
        assert!(matches!(err, ChunkError::InvalidMagic { .. }));
    }

    #[test]
    fn invalid_version_rejected() {
        let mut bytes = encode(&mut sample_chunk()).unwrap();
        bytes[4] = 9;
        let err = load(&bytes).unwrap_err();
        assert!(matches!(err, ChunkError::InvalidVersion(9)));
    }

    #[test]
    fn metadata_crc_corruption_returns_no_chunk() {
        let mut bytes = encode(&mut sample_chunk()).unwrap();
        let len = bytes.len();
        // Flip a byte inside the metadata section, well before the trailer.
        bytes[len - 12] ^= 0xff;
        let err = load(&bytes).unwrap_err();
        match err {
            ChunkError::InvalidChecksum { where_, partial } => {
                assert_eq!(where_, "metadata section");
                assert!(partial.is_none());
            }
            other => panic!("expected InvalidChecksum, got {other:?}"),
        }
    }

    #[test]
    fn empty_chunk_round_trips() {
        let mut chunk = Chunk::new(ChunkConfig::default());
        let bytes = encode(&mut chunk).unwrap();
        let loaded = load(&bytes).unwrap();
        assert_eq!(loaded.blocks_len(), 0);
        assert_eq!(loaded.size(), 0);
    }
}
