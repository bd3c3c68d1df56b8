//! Exhaustive inner-product index over a dense `f32` matrix.
//!
//! Vectors are stored as rows of an [`Array2`]; a search scores every row
//! against the query with a single matrix-vector product.
//!
//! # File format
//!
//! - Header (16 bytes): magic `RCIX`, format version, dimension, row count
//!   (each `u32` little-endian)
//! - Rows: contiguous `f32` values in little-endian order

use std::io::{Read, Write};

use ndarray::{Array2, ArrayView1, Axis};

use crate::IndexError;

/// Current index file version
const FORMAT_VERSION: u32 = 1;

const MAGIC_BYTES: &[u8; 4] = b"RCIX";

const HEADER_SIZE: usize = 16;

const BYTES_PER_F32: usize = 4;

/// A scored position in the index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Row position, which is also the position in the parallel metadata
    pub position: usize,

    /// Inner product with the query
    pub score: f32,
}

/// Flat (brute force) inner-product index
#[derive(Debug, Clone)]
pub struct FlatIndex {
    vectors: Array2<f32>,
}

impl FlatIndex {
    /// Create an empty index for vectors of `dimension` components
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: Array2::zeros((0, dimension)),
        }
    }

    pub fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append vectors, assigning positions `len()..len() + vectors.len()`.
    ///
    /// Nothing is added unless every vector has the index dimension.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        let dimension = self.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        for vector in vectors {
            self.vectors
                .push_row(ArrayView1::from(vector.as_slice()))
                .map_err(|e| IndexError::Corrupted(format!("Failed to append row: {e}")))?;
        }
        Ok(())
    }

    /// Score every row against `query` and return exactly `k` slots.
    ///
    /// Filled slots come first, ordered by descending score with ties broken
    /// by ascending position. When `k` exceeds the number of rows the
    /// remaining slots are `None`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Option<Neighbor>>, IndexError> {
        if query.len() != self.dimension() {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension(),
                actual: query.len(),
            });
        }

        let scores = self.vectors.dot(&ArrayView1::from(query));

        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));

        let mut slots: Vec<Option<Neighbor>> = order
            .into_iter()
            .take(k)
            .map(|position| {
                Some(Neighbor {
                    position,
                    score: scores[position],
                })
            })
            .collect();
        slots.resize(k, None);
        Ok(slots)
    }

    /// Row at `position`, if any
    pub fn vector(&self, position: usize) -> Option<ArrayView1<'_, f32>> {
        (position < self.len()).then(|| self.vectors.index_axis(Axis(0), position))
    }

    /// Serialize the index in the binary file format
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<(), IndexError> {
        let dimension = u32::try_from(self.dimension())
            .map_err(|_| IndexError::Corrupted("dimension exceeds u32".to_string()))?;
        let count = u32::try_from(self.len())
            .map_err(|_| IndexError::Corrupted("row count exceeds u32".to_string()))?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + self.vectors.len() * BYTES_PER_F32);
        buf.extend_from_slice(MAGIC_BYTES);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&dimension.to_le_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
        for value in self.vectors.iter() {
            buf.extend_from_slice(&value.to_le_bytes());
        }

        writer.write_all(&buf)?;
        writer.flush()?;
        Ok(())
    }

    /// Deserialize an index written by [`FlatIndex::write_to`]
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self, IndexError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        if bytes.len() < HEADER_SIZE {
            return Err(IndexError::Corrupted(format!(
                "file too small for header: {} bytes",
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC_BYTES {
            return Err(IndexError::Corrupted("invalid magic bytes".to_string()));
        }

        let version = read_u32(&bytes[4..8]);
        if version != FORMAT_VERSION {
            return Err(IndexError::VersionMismatch {
                expected: FORMAT_VERSION,
                actual: version,
            });
        }

        let dimension = read_u32(&bytes[8..12]) as usize;
        let count = read_u32(&bytes[12..16]) as usize;

        let body = &bytes[HEADER_SIZE..];
        let expected = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(BYTES_PER_F32))
            .ok_or_else(|| {
                IndexError::Corrupted(format!("header size {count} x {dimension} overflows"))
            })?;
        if body.len() != expected {
            return Err(IndexError::Corrupted(format!(
                "expected {expected} bytes of vector data for {count} x {dimension}, found {}",
                body.len()
            )));
        }

        let values: Vec<f32> = body
            .chunks_exact(BYTES_PER_F32)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let vectors = Array2::from_shape_vec((count, dimension), values)
            .map_err(|e| IndexError::Corrupted(format!("bad matrix shape: {e}")))?;

        Ok(Self { vectors })
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_index() -> FlatIndex {
        let mut index = FlatIndex::new(3);
        index
            .add(&[
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.6, 0.8, 0.0],
            ])
            .unwrap();
        index
    }

    #[test]
    fn test_search_orders_by_score() {
        let index = sample_index();
        let slots = index.search(&[0.0, 1.0, 0.0], 3).unwrap();
        let positions: Vec<_> = slots.iter().map(|s| s.unwrap().position).collect();
        assert_eq!(positions, vec![1, 2, 0]);
        assert!((slots[0].unwrap().score - 1.0).abs() < 1e-6);
        assert!((slots[1].unwrap().score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_k_larger_than_index_pads_with_none() {
        let index = sample_index();
        let slots = index.search(&[1.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(slots.len(), 5);
        assert!(slots[..3].iter().all(Option::is_some));
        assert!(slots[3..].iter().all(Option::is_none));
    }

    #[test]
    fn test_empty_index_and_zero_k() {
        let index = FlatIndex::new(3);
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 2).unwrap(), vec![None, None]);
        assert!(sample_index().search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_break_by_position() {
        let mut index = FlatIndex::new(2);
        index
            .add(&[vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 0.0]])
            .unwrap();
        let slots = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(slots[0].unwrap().position, 1);
        assert_eq!(slots[1].unwrap().position, 2);
    }

    #[test]
    fn test_dimension_checks() {
        let mut index = sample_index();
        let err = index.add(&[vec![1.0, 0.0, 0.0], vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
        // Rejected batch leaves the index untouched
        assert_eq!(index.len(), 3);

        assert!(index.search(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let index = sample_index();
        let mut buf = Vec::new();
        index.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + 9 * BYTES_PER_F32);

        let restored = FlatIndex::read_from(buf.as_slice()).unwrap();
        assert_eq!(restored.dimension(), 3);
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.vector(2).unwrap().to_vec(), vec![0.6, 0.8, 0.0]);
        assert!(restored.vector(3).is_none());
    }

    #[test]
    fn test_rejects_bad_files() {
        assert!(matches!(
            FlatIndex::read_from(&b"RCIX"[..]),
            Err(IndexError::Corrupted(_))
        ));

        let mut buf = Vec::new();
        sample_index().write_to(&mut buf).unwrap();

        let mut wrong_magic = buf.clone();
        wrong_magic[0] = b'X';
        assert!(FlatIndex::read_from(wrong_magic.as_slice()).is_err());

        let mut wrong_version = buf.clone();
        wrong_version[4] = 9;
        assert!(matches!(
            FlatIndex::read_from(wrong_version.as_slice()),
            Err(IndexError::VersionMismatch { actual: 9, .. })
        ));

        buf.truncate(buf.len() - 2);
        assert!(matches!(
            FlatIndex::read_from(buf.as_slice()),
            Err(IndexError::Corrupted(_))
        ));
    }

    #[test]
    fn test_oversized_header_is_corrupted() {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC_BYTES);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&u32::MAX.to_le_bytes());
        buf.extend_from_slice(&u32::MAX.to_le_bytes());

        match FlatIndex::read_from(buf.as_slice()) {
            Err(IndexError::Corrupted(msg)) => assert!(msg.contains("overflows"), "{msg}"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn prop_search_is_sorted_and_sized(
            rows in proptest::collection::vec(proptest::collection::vec(-1.0f32..1.0, 4), 0..30),
            query in proptest::collection::vec(-1.0f32..1.0, 4),
            k in 0usize..40,
        ) {
            let mut index = FlatIndex::new(4);
            index.add(&rows).unwrap();
            let slots = index.search(&query, k).unwrap();

            prop_assert_eq!(slots.len(), k);
            let filled: Vec<_> = slots.iter().flatten().collect();
            prop_assert_eq!(filled.len(), k.min(rows.len()));
            // No filled slot after an empty one
            prop_assert!(slots.iter().skip_while(|s| s.is_some()).all(Option::is_none));
            for pair in filled.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }
    }
}
