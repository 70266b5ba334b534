//! Atomic persistence of finished indexes and trained templates.
//!
//! Persisted artifacts are framed containers: a magic tag, a format
//! version, a kind byte, the bincode-encoded payload, and a CRC32 footer
//! over the payload. Index files are written to a sibling temporary file,
//! synced, and renamed into place, so a file existing at the target path
//! always means the index is complete.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FalcataError, Result};
use crate::index::{BinaryIndex, FloatIndex, IdMap};

const MAGIC: &[u8; 4] = b"FLCT";
const FORMAT_VERSION: u16 = 1;

const KIND_FLOAT_INDEX: u8 = 1;
const KIND_BINARY_INDEX: u8 = 2;
const KIND_FLOAT_TEMPLATE: u8 = 3;
const KIND_BINARY_TEMPLATE: u8 = 4;

/// Persist an ID-mapped float index to a file.
pub fn write_float_index(index: &IdMap<FloatIndex>, path: &Path) -> Result<()> {
    write_index_file(KIND_FLOAT_INDEX, index, path)
}

/// Load an ID-mapped float index from a file.
pub fn read_float_index(path: &Path) -> Result<IdMap<FloatIndex>> {
    read_index_file(KIND_FLOAT_INDEX, path)
}

/// Persist an ID-mapped binary index to a file.
pub fn write_binary_index(index: &IdMap<BinaryIndex>, path: &Path) -> Result<()> {
    write_index_file(KIND_BINARY_INDEX, index, path)
}

/// Load an ID-mapped binary index from a file.
pub fn read_binary_index(path: &Path) -> Result<IdMap<BinaryIndex>> {
    read_index_file(KIND_BINARY_INDEX, path)
}

/// Encode a trained float index as template bytes.
pub fn encode_float_template(index: &FloatIndex) -> Result<Vec<u8>> {
    encode_frame(KIND_FLOAT_TEMPLATE, index)
}

/// Decode template bytes back into a trained float index.
pub fn decode_float_template(template: &[u8]) -> Result<FloatIndex> {
    decode_frame(KIND_FLOAT_TEMPLATE, template)
}

/// Encode a trained binary index as template bytes.
pub fn encode_binary_template(index: &BinaryIndex) -> Result<Vec<u8>> {
    encode_frame(KIND_BINARY_TEMPLATE, index)
}

/// Decode template bytes back into a trained binary index.
pub fn decode_binary_template(template: &[u8]) -> Result<BinaryIndex> {
    decode_frame(KIND_BINARY_TEMPLATE, template)
}

fn write_index_file<T: Serialize>(kind: u8, value: &T, path: &Path) -> Result<()> {
    let temp_path = temp_path_for(path)?;

    let written = (|| -> Result<()> {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        write_frame(&mut writer, kind, value)?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| FalcataError::Io(e.into_error()))?
            .sync_all()?;
        Ok(())
    })();

    if let Err(error) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(error);
    }

    if let Err(error) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(error.into());
    }

    Ok(())
}

fn read_index_file<T: DeserializeOwned>(kind: u8, path: &Path) -> Result<T> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let payload = read_frame(&mut reader, kind)?;
    decode_payload(&payload)
}

fn temp_path_for(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| FalcataError::invalid_argument("index path has no file name"))?;
    Ok(path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy())))
}

fn encode_frame<T: Serialize>(kind: u8, value: &T) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_frame(&mut buffer, kind, value)?;
    Ok(buffer)
}

fn decode_frame<T: DeserializeOwned>(kind: u8, bytes: &[u8]) -> Result<T> {
    let mut reader = bytes;
    let payload = read_frame(&mut reader, kind)?;
    decode_payload(&payload)
}

fn write_frame<W: Write, T: Serialize>(writer: &mut W, kind: u8, value: &T) -> Result<()> {
    let payload = bincode::serialize(value)
        .map_err(|e| FalcataError::serialization(format!("failed to encode index: {e}")))?;

    writer.write_all(MAGIC)?;
    writer.write_u16::<LittleEndian>(FORMAT_VERSION)?;
    writer.write_u8(kind)?;
    writer.write_u64::<LittleEndian>(payload.len() as u64)?;
    writer.write_all(&payload)?;
    writer.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
    Ok(())
}

fn read_frame<R: Read>(reader: &mut R, expected_kind: u8) -> Result<Vec<u8>> {
    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|_| FalcataError::serialization("not a falcata index file (truncated header)"))?;
    if &magic != MAGIC {
        return Err(FalcataError::serialization(
            "not a falcata index file (bad magic)",
        ));
    }

    let version = reader.read_u16::<LittleEndian>()?;
    if version != FORMAT_VERSION {
        return Err(FalcataError::serialization(format!(
            "unsupported index format version {version}"
        )));
    }

    let kind = reader.read_u8()?;
    if kind != expected_kind {
        return Err(FalcataError::serialization(format!(
            "index kind mismatch: expected {expected_kind}, found {kind}"
        )));
    }

    let payload_len = reader.read_u64::<LittleEndian>()? as usize;
    let mut payload = vec![0u8; payload_len];
    reader
        .read_exact(&mut payload)
        .map_err(|_| FalcataError::serialization("index file payload is truncated"))?;

    let stored_crc = reader.read_u32::<LittleEndian>()?;
    if stored_crc != crc32fast::hash(&payload) {
        return Err(FalcataError::serialization(
            "index file checksum mismatch",
        ));
    }

    Ok(payload)
}

fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    bincode::deserialize(payload)
        .map_err(|e| FalcataError::serialization(format!("failed to decode index: {e}")))
}
