//! Dense weight tables and their on-disk format.
//!
//! A weight file is little-endian throughout: a `u32` table count, then each
//! table as a `u64` element count followed by that many raw `f32` entries.
//! There is no magic, header, or checksum; the layout is an external contract
//! shared with other tooling and must stay byte-compatible.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// f32 elements converted per chunk while streaming a table.
const IO_CHUNK: usize = 1 << 14;

#[derive(thiserror::Error, Debug)]
pub enum WeightError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("file truncated or malformed")]
    Truncated,
    #[error("table size overflow")]
    Oversized,
    #[error("table count or sizes do not match the network layout")]
    Shape,
}

/// A fixed-size vector of f32 weights, zero-initialized.
///
/// Sized at construction and never resized; replacing the bank wholesale is
/// the only way to change shape.
#[derive(Debug)]
pub struct WeightTable {
    weights: Box<[f32]>,
}

impl WeightTable {
    pub fn zeroed(len: usize) -> Self {
        WeightTable { weights: vec![0.0; len].into_boxed_slice() }
    }

    pub fn from_vec(weights: Vec<f32>) -> Self {
        WeightTable { weights: weights.into_boxed_slice() }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }
}

impl std::ops::Index<usize> for WeightTable {
    type Output = f32;

    #[inline]
    fn index(&self, i: usize) -> &f32 {
        &self.weights[i]
    }
}

impl std::ops::IndexMut<usize> for WeightTable {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut f32 {
        &mut self.weights[i]
    }
}

/// Write a table bank to `path`, replacing any existing file.
pub fn save_tables<P: AsRef<Path>>(path: P, tables: &[WeightTable]) -> Result<(), WeightError> {
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(&(tables.len() as u32).to_le_bytes())?;
    let mut buf = vec![0u8; IO_CHUNK * 4];
    for table in tables {
        out.write_all(&(table.len() as u64).to_le_bytes())?;
        for chunk in table.as_slice().chunks(IO_CHUNK) {
            for (i, &w) in chunk.iter().enumerate() {
                buf[i * 4..i * 4 + 4].copy_from_slice(&w.to_le_bytes());
            }
            out.write_all(&buf[..chunk.len() * 4])?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Read a table bank from `path`. Mirrors [`save_tables`] exactly.
pub fn load_tables<P: AsRef<Path>>(path: P) -> Result<Vec<WeightTable>, WeightError> {
    let mut input = BufReader::new(File::open(path)?);

    let mut b4 = [0u8; 4];
    fill(&mut input, &mut b4)?;
    let count = u32::from_le_bytes(b4) as usize;

    let mut tables = Vec::with_capacity(count);
    let mut buf = vec![0u8; IO_CHUNK * 4];
    for _ in 0..count {
        let mut b8 = [0u8; 8];
        fill(&mut input, &mut b8)?;
        let len = u64::from_le_bytes(b8) as usize;
        len.checked_mul(4).ok_or(WeightError::Oversized)?;

        let mut weights = vec![0.0f32; len];
        let mut filled = 0;
        while filled < len {
            let n = (len - filled).min(IO_CHUNK);
            fill(&mut input, &mut buf[..n * 4])?;
            for i in 0..n {
                weights[filled + i] =
                    f32::from_le_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap());
            }
            filled += n;
        }
        tables.push(WeightTable::from_vec(weights));
    }
    Ok(tables)
}

fn fill<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(), WeightError> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            WeightError::Truncated
        } else {
            WeightError::Io(e)
        }
    })
}
