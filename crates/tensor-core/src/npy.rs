// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reading and writing tensors in NumPy's `.npy` format.
//!
//! Only version 1.0 headers are written; versions 2.0 and 3.0 are accepted
//! on read. Arrays are stored in C order with native byte order.

use crate::{Depth, Shape, Tensor, TensorError};
use memory_manager::align_size;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;

#[cfg(target_endian = "little")]
const NATIVE_ORDER: char = '<';
#[cfg(target_endian = "big")]
const NATIVE_ORDER: char = '>';

fn descr(depth: Depth) -> String {
    let code = match depth {
        Depth::U8 => return "|u1".to_string(),
        Depth::S8 => return "|i1".to_string(),
        Depth::F16 => "f2",
        Depth::S16 => "i2",
        Depth::U16 => "u2",
        Depth::F32 => "f4",
        Depth::S32 => "i4",
        Depth::F64 => "f8",
        Depth::S64 => "i8",
    };
    format!("{NATIVE_ORDER}{code}")
}

fn depth_from_descr(descr: &str) -> Result<Depth, TensorError> {
    let mut chars = descr.chars();
    let order = chars.next().unwrap_or(' ');
    let code = chars.as_str();
    let single_byte = code.ends_with('1');
    if !(order == '|' || order == '=' || order == NATIVE_ORDER || single_byte) {
        return Err(TensorError::Npy(format!(
            "byte order of '{descr}' differs from this machine"
        )));
    }
    Ok(match code {
        "u1" => Depth::U8,
        "i1" => Depth::S8,
        "f2" => Depth::F16,
        "i2" => Depth::S16,
        "u2" => Depth::U16,
        "f4" => Depth::F32,
        "i4" => Depth::S32,
        "f8" => Depth::F64,
        "i8" => Depth::S64,
        _ => return Err(TensorError::Npy(format!("unsupported dtype '{descr}'"))),
    })
}

fn header_for(shape: &Shape, depth: Depth) -> Vec<u8> {
    let dims: Vec<String> = shape.iter().map(usize::to_string).collect();
    let shape_str = match dims.len() {
        1 => format!("({},)", dims[0]),
        _ => format!("({})", dims.join(", ")),
    };
    let dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        descr(depth),
        shape_str
    );

    // magic + version + u16 length + dict + '\n'
    let total = align_size(MAGIC.len() + 4 + dict.len() + 1, HEADER_ALIGN);
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&((total - MAGIC.len() - 4) as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out.resize(total - 1, b' ');
    out.push(b'\n');
    out
}

/// Writes `tensor` as an `.npy` stream.
///
/// The tensor must be continuous; [`Tensor::flatten`] a padded one first.
pub fn write_npy<W: Write>(mut writer: W, tensor: &Tensor) -> Result<(), TensorError> {
    let depth = tensor.require_depth("write_npy")?;
    if !tensor.is_continue() {
        return Err(TensorError::Npy(
            "tensor has padded slabs; flatten it before writing".to_string(),
        ));
    }
    writer.write_all(&header_for(tensor.shape(), depth))?;
    let len = tensor.size() * depth.size_bytes();
    writer.write_all(&tensor.as_bytes()[..len])?;
    writer.flush()?;
    Ok(())
}

/// Returns the text following `'key':` in a header dictionary.
fn dict_value<'a>(header: &'a str, key: &str) -> Result<&'a str, TensorError> {
    let needle = format!("'{key}':");
    let start = header
        .find(&needle)
        .ok_or_else(|| TensorError::Npy(format!("header is missing '{key}'")))?;
    Ok(header[start + needle.len()..].trim_start())
}

fn parse_descr(header: &str) -> Result<&str, TensorError> {
    let value = dict_value(header, "descr")?;
    value
        .strip_prefix('\'')
        .and_then(|rest| rest.split('\'').next())
        .ok_or_else(|| TensorError::Npy("malformed 'descr'".to_string()))
}

fn parse_shape(header: &str) -> Result<Shape, TensorError> {
    let value = dict_value(header, "shape")?;
    let inner = value
        .strip_prefix('(')
        .and_then(|rest| rest.split(')').next())
        .ok_or_else(|| TensorError::Npy("malformed 'shape'".to_string()))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| TensorError::Npy(format!("bad extent '{s}'")))
        })
        .collect()
}

/// Reads an `.npy` stream into a new unaligned tensor.
pub fn read_npy<R: Read>(mut reader: R) -> Result<Tensor, TensorError> {
    let mut preamble = [0u8; 8];
    reader.read_exact(&mut preamble)?;
    if &preamble[..6] != MAGIC {
        return Err(TensorError::Npy("not an npy stream".to_string()));
    }

    let header_len = match preamble[6] {
        1 => {
            let mut len = [0u8; 2];
            reader.read_exact(&mut len)?;
            u16::from_le_bytes(len) as usize
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            reader.read_exact(&mut len)?;
            u32::from_le_bytes(len) as usize
        }
        v => return Err(TensorError::Npy(format!("unsupported version {v}"))),
    };
    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header)?;
    let header = String::from_utf8(header)
        .map_err(|_| TensorError::Npy("header is not valid text".to_string()))?;

    if dict_value(&header, "fortran_order")?.starts_with("True") {
        return Err(TensorError::Npy("fortran order is not supported".to_string()));
    }
    let depth = depth_from_descr(parse_descr(&header)?)?;
    let shape = parse_shape(&header)?;
    if shape.is_empty() {
        return Err(TensorError::Npy(
            "zero-dimensional arrays are not supported".to_string(),
        ));
    }

    let mut tensor = Tensor::try_new(shape, depth, false, None)?;
    reader.read_exact(tensor.as_bytes_mut())?;
    tracing::debug!("read {} tensor {} from npy", depth, tensor.shape());
    Ok(tensor)
}

/// Writes `tensor` to an `.npy` file.
pub fn save(path: impl AsRef<Path>, tensor: &Tensor) -> Result<(), TensorError> {
    let file = File::create(path.as_ref())?;
    write_npy(BufWriter::new(file), tensor)
}

/// Reads an `.npy` file.
pub fn load(path: impl AsRef<Path>) -> Result<Tensor, TensorError> {
    let file = File::open(path.as_ref())?;
    read_npy(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let header = header_for(&Shape::from([2, 3]), Depth::F32);
        assert_eq!(header.len() % HEADER_ALIGN, 0);
        assert_eq!(&header[..6], MAGIC);
        assert_eq!(&header[6..8], &[1, 0]);
        let len = u16::from_le_bytes([header[8], header[9]]) as usize;
        assert_eq!(len + 10, header.len());
        assert_eq!(*header.last().unwrap(), b'\n');
        let text = std::str::from_utf8(&header[10..]).unwrap();
        assert!(text.contains("'shape': (2, 3)"));
        assert!(text.contains("'fortran_order': False"));
    }

    #[test]
    fn test_one_dimensional_shape_has_trailing_comma() {
        let header = header_for(&Shape::from([5]), Depth::U8);
        let text = String::from_utf8_lossy(&header);
        assert!(text.contains("'shape': (5,)"));
        assert!(text.contains("'descr': '|u1'"));
    }

    #[test]
    fn test_roundtrip_through_memory() {
        let values: Vec<i16> = (0..24).map(|i| i * 3 - 20).collect();
        let t = Tensor::from_slice([2, 3, 4], &values, false, None).unwrap();
        let mut buf = Vec::new();
        write_npy(&mut buf, &t).unwrap();

        let back = read_npy(Cursor::new(buf)).unwrap();
        assert_eq!(back.shape(), t.shape());
        assert_eq!(back.depth(), Some(Depth::S16));
        assert!(!back.aligned());
        assert_eq!(back.as_slice::<i16>(), values.as_slice());
    }

    #[test]
    fn test_padded_tensor_must_be_flattened() {
        let t = Tensor::new([2, 3, 5], Depth::U8, true, None);
        assert!(matches!(
            write_npy(Vec::new(), &t),
            Err(TensorError::Npy(_))
        ));
        let mut buf = Vec::new();
        write_npy(&mut buf, &t.flatten()).unwrap();
        assert_eq!(read_npy(Cursor::new(buf)).unwrap().size(), 30);
    }

    #[test]
    fn test_reads_foreign_header() {
        let dict = "{'descr': '<f8', 'fortran_order': False, 'shape': (3,), }";
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&[2, 0]);
        bytes.extend_from_slice(&(dict.len() as u32 + 1).to_le_bytes());
        bytes.extend_from_slice(dict.as_bytes());
        bytes.push(b'\n');
        for v in [1.5f64, -2.0, 4.25] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        if cfg!(target_endian = "little") {
            let t = read_npy(Cursor::new(bytes)).unwrap();
            assert_eq!(t.as_slice::<f64>(), &[1.5, -2.0, 4.25]);
        }
    }

    #[test]
    fn test_rejects_bad_streams() {
        assert!(matches!(
            read_npy(Cursor::new(b"NOTNUMPY".to_vec())),
            Err(TensorError::Npy(_))
        ));
        assert!(matches!(
            read_npy(Cursor::new(b"\x93NU".to_vec())),
            Err(TensorError::Io(_))
        ));
        assert!(matches!(
            depth_from_descr("<c8"),
            Err(TensorError::Npy(_))
        ));
        assert!(write_npy(Vec::new(), &Tensor::default()).is_err());
    }

    fn stream_with_shape(shape: &str, payload: &[u8]) -> Vec<u8> {
        let dict = format!("{{'descr': '|u1', 'fortran_order': False, 'shape': {shape}, }}\n");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(dict.len() as u16).to_le_bytes());
        bytes.extend_from_slice(dict.as_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_rejects_overflowing_shape() {
        let bytes = stream_with_shape("(4611686018427387905, 4, 1)", &[0; 4]);
        assert!(matches!(
            read_npy(Cursor::new(bytes)),
            Err(TensorError::ShapeOverflow { depth: Depth::U8, .. })
        ));
        let ok = read_npy(Cursor::new(stream_with_shape("(1, 4, 1)", &[1, 2, 3, 4]))).unwrap();
        assert_eq!(ok.as_slice::<u8>(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_truncated_payload() {
        let t = Tensor::new([4, 4], Depth::F32, false, None);
        let mut buf = Vec::new();
        write_npy(&mut buf, &t).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(matches!(read_npy(Cursor::new(buf)), Err(TensorError::Io(_))));
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir().join(format!("tensor-core-npy-{}.npy", std::process::id()));
        let t = Tensor::from_slice([3, 2], &[1u16, 2, 3, 4, 5, 6], false, None).unwrap();
        save(&path, &t).unwrap();
        let back = load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(back.as_slice::<u16>(), &[1, 2, 3, 4, 5, 6]);
    }
}
