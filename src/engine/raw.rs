//! Read / write float arrays as raw little-endian binary.
//!
//! The reference engine's data files are nothing but `f32`s in flat buffer
//! order; all structure lives in the TOML header that names them.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Error, Result};

pub fn write(data: impl Iterator<Item = f32>, path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut buf = BufWriter::new(file);
    for datum in data {
        buf.write_all(&datum.to_le_bytes())?;
    }
    Ok(())
}

type IORes<T> = std::io::Result<T>;
pub fn read<'a>(path: &Path) -> IORes<impl Iterator<Item = IORes<f32>> + 'a> {
    let file = File::open(path)?;
    let mut buf = BufReader::new(file);
    let mut buffer = [0; 4];

    Ok(std::iter::from_fn(move || {
        use std::io::ErrorKind::UnexpectedEof;
        match buf.read_exact(&mut buffer) {
            Ok(()) => Some(Ok(f32::from_le_bytes(buffer))),
            Err(e) if e.kind() == UnexpectedEof => None,
            Err(e) => Some(Err(e)),
        }
    }))
}

/// Read the whole file, insisting on an exact element count.
pub fn read_vec(path: &Path, expected: usize) -> Result<Vec<f32>> {
    let data = read(path)?.collect::<IORes<Vec<f32>>>()?;
    if data.len() != expected {
        return Err(Error::BufferLength { expected, actual: data.len() });
    }
    Ok(data)
}

// ------------------------------ TESTS ------------------------------
#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn raw_io_roundtrip() -> std::io::Result<()> {
        use tempfile::tempdir;
        #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

        // Harmless temporary location for output file
        let dir = tempdir()?;
        let file_path = dir.path().join("test.bin");

        // Some test data
        let original_data = vec![1.23, 4.56, 7.89];

        // Write data to file
        write(original_data.iter().copied(), &file_path)?;

        // Read data back from file
        let reloaded_data: Vec<_> = read(&file_path)?
            .collect::<IORes<_>>()?;

        // Check that roundtrip didn't corrupt the data
        assert_eq!(original_data, reloaded_data);
        Ok(())
    }

    #[test]
    fn wrong_element_count_is_reported() {
        use tempfile::tempdir;
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("short.bin");
        write([1.0, 2.0].into_iter(), &file_path).unwrap();
        match read_vec(&file_path, 3) {
            Err(Error::BufferLength { expected: 3, actual: 2 }) => (),
            other => panic!("expected BufferLength, got {other:?}"),
        }
    }
}
