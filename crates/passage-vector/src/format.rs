//! `index.bin`: bincode-encoded flat vector payload with a blake3 checksum.

use std::borrow::Cow;
use std::path::Path;

use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};

use passage_core::{Error, Result};

const MAGIC: [u8; 8] = *b"PSGVEC01";
const VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct IndexFile<'a> {
    magic: [u8; 8],
    version: u32,
    dim: u32,
    count: u64,
    checksum: [u8; 32],
    data: Cow<'a, [f32]>,
}

fn checksum(data: &[f32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for x in data {
        hasher.update(&x.to_le_bytes());
    }
    *hasher.finalize().as_bytes()
}

pub fn encode_index(dim: usize, data: &[f32]) -> Result<Vec<u8>> {
    let file = IndexFile {
        magic: MAGIC,
        version: VERSION,
        dim: dim as u32,
        count: (data.len() / dim.max(1)) as u64,
        checksum: checksum(data),
        data: Cow::Borrowed(data),
    };
    encode_to_vec(&file, bincode::config::standard())
        .map_err(|e| Error::Io(std::io::Error::other(format!("failed to encode vector index: {e}"))))
}

/// Decode and verify an index file. Returns the vector count and the flat payload.
pub fn decode_index(path: &Path, bytes: &[u8], expected_dim: usize) -> Result<(usize, Vec<f32>)> {
    let (file, _): (IndexFile<'static>, usize) = decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| Error::corruption(path, format!("undecodable index: {e}")))?;
    if file.magic != MAGIC {
        return Err(Error::corruption(path, "bad magic"));
    }
    if file.version != VERSION {
        return Err(Error::corruption(path, format!("unsupported version {}", file.version)));
    }
    if file.dim as usize != expected_dim {
        return Err(Error::DimensionMismatch { expected: expected_dim, actual: file.dim as usize });
    }
    let count = file.count as usize;
    if file.data.len() != count * expected_dim {
        return Err(Error::corruption(
            path,
            format!("payload holds {} floats, header says {count} x {expected_dim}", file.data.len()),
        ));
    }
    if checksum(&file.data) != file.checksum {
        return Err(Error::corruption(path, "checksum mismatch"));
    }
    Ok((count, file.data.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_flipped_payload_byte() {
        let data = vec![0.25f32, -1.0, 3.5, 0.0];
        let mut bytes = encode_index(2, &data).unwrap();
        let (count, decoded) = decode_index(Path::new("index.bin"), &bytes, 2).unwrap();
        assert_eq!((count, decoded), (2, data));

        let last = bytes.len() - 1;
        bytes[last] ^= 0x40;
        let err = decode_index(Path::new("index.bin"), &bytes, 2).unwrap_err();
        assert!(matches!(err, Error::IndexCorruption { .. }), "{err}");
    }

    #[test]
    fn wrong_dimension_is_not_corruption() {
        let bytes = encode_index(2, &[1.0, 2.0]).unwrap();
        let err = decode_index(Path::new("index.bin"), &bytes, 3).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }));
    }

    #[test]
    fn truncated_file_is_corruption() {
        let bytes = encode_index(2, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let err = decode_index(Path::new("index.bin"), &bytes[..bytes.len() / 2], 2).unwrap_err();
        assert!(matches!(err, Error::IndexCorruption { .. }));
    }
}
