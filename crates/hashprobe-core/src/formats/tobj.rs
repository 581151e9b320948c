/// TOBJ texture descriptor parsing
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use super::ParseError;

/// First u32 of every TOBJ descriptor
pub const TOBJ_MAGIC: u32 = 0x70B1_0A01;
/// Size of the fixed header preceding the path records
pub const TOBJ_HEADER_SIZE: u64 = 0x28;

/// Cube maps carry six faces; anything beyond that is not a path table
const MAX_RECORDS: usize = 6;
const MAX_PATH_LEN: u32 = 1024;

fn looks_like_path(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(|&b| b >= 0x20 && b != 0x7F && b != b'"')
}

/// Texture paths recorded in a TOBJ descriptor.
///
/// After the header come `(u32 length, u32 padding, bytes)` records. Reading stops at the
/// first record that does not look like a path.
pub fn texture_paths(data: &[u8]) -> Result<Vec<String>, ParseError> {
    let mut cursor = Cursor::new(data);
    let magic = cursor.read_u32::<LittleEndian>()?;
    if magic != TOBJ_MAGIC {
        return Err(ParseError::BadMagic {
            expected: TOBJ_MAGIC,
            found: magic,
        });
    }
    if (data.len() as u64) < TOBJ_HEADER_SIZE {
        return Err(ParseError::Truncated(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "tobj header",
        )));
    }

    cursor.set_position(TOBJ_HEADER_SIZE);
    let mut paths = Vec::new();
    while paths.len() < MAX_RECORDS {
        let remaining = data.len() as u64 - cursor.position();
        if remaining < 8 {
            break;
        }
        let len = cursor.read_u32::<LittleEndian>()?;
        let padding = cursor.read_u32::<LittleEndian>()?;
        if len == 0 || len > MAX_PATH_LEN || padding != 0 || len as u64 > remaining - 8 {
            break;
        }
        let mut raw = vec![0u8; len as usize];
        cursor.read_exact(&mut raw)?;
        if !looks_like_path(&raw) {
            break;
        }
        match String::from_utf8(raw) {
            Ok(path) => paths.push(path),
            Err(_) => break,
        }
    }

    Ok(paths)
}
