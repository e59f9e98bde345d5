//! Exact nearest-neighbor index over fixed-dimension vectors.
//!
//! Rows are stored contiguously in insertion order. A row's position is the
//! only key that ties it to its document in the metadata store.

use memmap2::Mmap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fs::File;
use std::io;
use std::mem::size_of;
use std::path::Path;
use tracing::debug;

use crate::config::Number;
use crate::error::{Error, Result};
use crate::storage::write_atomically;

const MAGIC: [u8; 4] = *b"PQIX";
const FORMAT_VERSION: u32 = 2;
/// bincode's fixed-width encoding of [`IndexHeader`].
const HEADER_LEN: usize = 4 + 4 + 4 + 8 + 32 + 32;
/// Stored in place of a metadata digest when the index was persisted alone.
const UNPAIRED: [u8; 32] = [0; 32];

/// One search hit: the squared Euclidean distance and the row it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub distance: Number,
    pub row: usize,
}

impl Neighbor {
    /// Ascending distance, then ascending row.
    fn ordering(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.row.cmp(&other.row))
    }
}

/// The only surface retrieval depends on. An approximate backend can stand in
/// for [`FlatIndex`] by implementing this.
pub trait NearestNeighbors: Send + Sync {
    fn dimensions(&self) -> Option<usize>;

    fn count(&self) -> usize;

    /// Up to `k` rows closest to `query`, nearest first.
    fn search(&self, query: &[Number], k: usize) -> Result<Vec<Neighbor>>;
}

#[derive(Serialize, Deserialize)]
struct IndexHeader {
    magic: [u8; 4],
    version: u32,
    dimensions: u32,
    count: u64,
    checksum: [u8; 32],
    metadata_digest: [u8; 32],
}

/// Brute-force index: every query scans every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatIndex {
    dimensions: Option<usize>,
    data: Vec<Number>,
}

impl FlatIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty index whose dimension is fixed up front.
    pub fn with_dimensions(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::EmptyVector);
        }
        Ok(Self {
            dimensions: Some(dimensions),
            data: Vec::new(),
        })
    }

    /// Builds an index from `vectors`, in order. Fails without building
    /// anything if the vectors disagree on length.
    pub fn build(vectors: &[Vec<Number>]) -> Result<Self> {
        let mut index = Self::new();
        index.add_batch(vectors)?;
        Ok(index)
    }

    pub fn add(&mut self, vector: &[Number]) -> Result<usize> {
        let dimensions = self.check_dimensions(vector)?;
        self.dimensions = Some(dimensions);
        self.data.extend_from_slice(vector);
        Ok(self.count() - 1)
    }

    /// Appends all of `vectors` or none of them.
    pub fn add_batch(&mut self, vectors: &[Vec<Number>]) -> Result<()> {
        let Some(first) = vectors.first() else {
            return Ok(());
        };
        let dimensions = self.check_dimensions(first)?;
        for vector in &vectors[1..] {
            if vector.len() != dimensions {
                return Err(Error::DimensionMismatch {
                    expected: dimensions,
                    actual: vector.len(),
                });
            }
        }

        self.dimensions = Some(dimensions);
        self.data.reserve(vectors.len() * dimensions);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    fn check_dimensions(&self, vector: &[Number]) -> Result<usize> {
        match self.dimensions {
            Some(expected) if expected != vector.len() => Err(Error::DimensionMismatch {
                expected,
                actual: vector.len(),
            }),
            Some(expected) => Ok(expected),
            None if vector.is_empty() => Err(Error::EmptyVector),
            None => Ok(vector.len()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn vector(&self, row: usize) -> Option<&[Number]> {
        let dimensions = self.dimensions?;
        let start = row.checked_mul(dimensions)?;
        self.data.get(start..start + dimensions)
    }

    /// Writes the index to `path`, replacing any previous file in one rename.
    pub fn persist(&self, path: &Path) -> Result<()> {
        self.write_file(path, UNPAIRED)
    }

    /// Like [`persist`](Self::persist), recording the digest of the metadata
    /// file this index was published with.
    pub fn persist_paired(&self, path: &Path, metadata_digest: [u8; 32]) -> Result<()> {
        self.write_file(path, metadata_digest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::read_file(path).map(|(index, _)| index)
    }

    /// Loads the index and the metadata digest it was published with, `None`
    /// if it was persisted alone.
    pub fn load_paired(path: &Path) -> Result<(Self, Option<[u8; 32]>)> {
        let (index, digest) = Self::read_file(path)?;
        Ok((index, (digest != UNPAIRED).then_some(digest)))
    }

    fn write_file(&self, path: &Path, metadata_digest: [u8; 32]) -> Result<()> {
        let payload: Vec<u8> = self.data.iter().flat_map(|n| n.to_le_bytes()).collect();
        let header = IndexHeader {
            magic: MAGIC,
            version: FORMAT_VERSION,
            dimensions: self.dimensions.unwrap_or(0) as u32,
            count: self.count() as u64,
            checksum: Sha256::digest(&payload).into(),
            metadata_digest,
        };
        let header = bincode::serialize(&header)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        debug_assert_eq!(header.len(), HEADER_LEN);

        write_atomically(path, &[&header, &payload])?;
        debug!(
            "Persisted {} vectors of dimension {:?} to {}",
            self.count(),
            self.dimensions,
            path.display()
        );
        Ok(())
    }

    fn read_file(path: &Path) -> Result<(Self, [u8; 32])> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::IndexNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: String| Error::CorruptIndex {
            path: path.to_path_buf(),
            reason,
        };

        let file_len = file.metadata()?.len() as usize;
        if file_len < HEADER_LEN {
            return Err(corrupt(format!("{} bytes is shorter than the header", file_len)));
        }

        // Published files are replaced by rename, never rewritten in place.
        let mmap = unsafe { Mmap::map(&file)? };

        let header: IndexHeader = bincode::deserialize(&mmap[..HEADER_LEN])
            .map_err(|e| corrupt(format!("unreadable header: {}", e)))?;
        if header.magic != MAGIC {
            return Err(corrupt("not a polyqa index file".to_string()));
        }
        if header.version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format version {}", header.version)));
        }

        let dimensions = header.dimensions as usize;
        let count = header.count as usize;
        if dimensions == 0 && count > 0 {
            return Err(corrupt(format!("{} rows with zero dimensions", count)));
        }

        let payload_len = count
            .checked_mul(dimensions)
            .and_then(|n| n.checked_mul(size_of::<Number>()))
            .ok_or_else(|| corrupt("row count overflows".to_string()))?;
        if file_len != HEADER_LEN + payload_len {
            return Err(corrupt(format!(
                "expected {} payload bytes for {} x {}, found {}",
                payload_len,
                count,
                dimensions,
                file_len - HEADER_LEN
            )));
        }

        let payload = &mmap[HEADER_LEN..];
        let checksum: [u8; 32] = Sha256::digest(payload).into();
        if checksum != header.checksum {
            return Err(corrupt("payload checksum mismatch".to_string()));
        }

        let data = payload
            .chunks_exact(size_of::<Number>())
            .map(|bytes| {
                let mut raw = [0u8; size_of::<Number>()];
                raw.copy_from_slice(bytes);
                Number::from_le_bytes(raw)
            })
            .collect();

        debug!("Loaded {} vectors of dimension {} from {}", count, dimensions, path.display());
        let index = Self {
            dimensions: (dimensions > 0).then_some(dimensions),
            data,
        };
        Ok((index, header.metadata_digest))
    }
}

impl NearestNeighbors for FlatIndex {
    fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    fn count(&self) -> usize {
        match self.dimensions {
            Some(dimensions) => self.data.len() / dimensions,
            None => 0,
        }
    }

    fn search(&self, query: &[Number], k: usize) -> Result<Vec<Neighbor>> {
        let count = self.count();
        let dimensions = match self.dimensions {
            Some(dimensions) if k > 0 && count > 0 => dimensions,
            _ => return Ok(Vec::new()),
        };
        if query.len() != dimensions {
            return Err(Error::DimensionMismatch {
                expected: dimensions,
                actual: query.len(),
            });
        }

        let mut scored: Vec<Neighbor> = self
            .data
            .par_chunks_exact(dimensions)
            .enumerate()
            .map(|(row, vector)| Neighbor {
                distance: crate::vector_ops::squared_euclidean_simd(query, vector),
                row,
            })
            .collect();

        let k = k.min(count);
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, Neighbor::ordering);
            scored.truncate(k);
        }
        scored.sort_unstable_by(Neighbor::ordering);

        debug!("Exact search scanned {} rows, returning {}", count, scored.len());
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlatIndex {
        FlatIndex::build(&[
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 2.0],
            vec![3.0, 3.0],
        ])
        .unwrap()
    }

    fn rows(result: &[Neighbor]) -> Vec<usize> {
        result.iter().map(|n| n.row).collect()
    }

    #[test]
    fn test_header_len_matches_bincode() {
        let header = IndexHeader {
            magic: MAGIC,
            version: FORMAT_VERSION,
            dimensions: 0,
            count: 0,
            checksum: [0; 32],
            metadata_digest: [0; 32],
        };
        assert_eq!(bincode::serialized_size(&header).unwrap() as usize, HEADER_LEN);
    }

    #[test]
    fn test_build_rejects_mixed_lengths() {
        let err = FlatIndex::build(&[vec![1.0, 2.0], vec![1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_add_mismatch_leaves_index_untouched() {
        let mut index = sample();
        let before = index.clone();

        assert!(matches!(
            index.add(&[1.0, 2.0, 3.0]),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(matches!(
            index.add_batch(&[vec![5.0, 5.0], vec![1.0]]),
            Err(Error::DimensionMismatch { .. })
        ));
        assert_eq!(index, before);
        assert_eq!(index.count(), 4);
    }

    #[test]
    fn test_dimension_fixed_at_construction() {
        let mut index = FlatIndex::with_dimensions(3).unwrap();
        assert!(index.add(&[1.0, 2.0]).is_err());
        assert_eq!(index.add(&[1.0, 2.0, 3.0]).unwrap(), 0);
        assert_eq!(index.vector(0), Some(&[1.0, 2.0, 3.0][..]));
    }

    #[test]
    fn test_empty_vector_rejected() {
        assert!(matches!(FlatIndex::new().add(&[]), Err(Error::EmptyVector)));
    }

    #[test]
    fn test_search_orders_by_distance() {
        let result = sample().search(&[0.9, 0.0], 3).unwrap();
        assert_eq!(rows(&result), vec![1, 0, 2]);
        assert!((result[0].distance - 0.01).abs() < 1e-6);
        assert!((result[1].distance - 0.81).abs() < 1e-6);
    }

    #[test]
    fn test_k_clamps_to_count() {
        let result = sample().search(&[0.0, 0.0], 50).unwrap();
        assert_eq!(result.len(), 4);
        let mut seen = rows(&result);
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_zero_k_and_empty_index_return_nothing() {
        assert!(sample().search(&[0.0, 0.0], 0).unwrap().is_empty());
        assert!(FlatIndex::new().search(&[0.0, 0.0], 5).unwrap().is_empty());
        assert!(FlatIndex::with_dimensions(2)
            .unwrap()
            .search(&[0.0, 0.0], 5)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_query_dimension_checked() {
        assert!(matches!(
            sample().search(&[0.0, 0.0, 0.0], 2),
            Err(Error::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_ties_resolve_by_insertion_order() {
        let index = FlatIndex::build(&[
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![0.0, -1.0],
            vec![-1.0, 0.0],
        ])
        .unwrap();
        assert_eq!(rows(&index.search(&[0.0, 0.0], 4).unwrap()), vec![0, 1, 2, 3]);
        assert_eq!(rows(&index.search(&[0.0, 0.0], 2).unwrap()), vec![0, 1]);
    }

    #[test]
    fn test_persist_and_load_reproduce_search() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.pqix");
        let vectors: Vec<Vec<Number>> = (0..40)
            .map(|i| (0..13).map(|j| ((i * 13 + j) as Number * 0.37).sin()).collect())
            .collect();
        let index = FlatIndex::build(&vectors).unwrap();
        let query: Vec<Number> = (0..13).map(|j| (j as Number * 0.11).cos()).collect();
        let before = index.search(&query, 7).unwrap();

        index.persist(&path).unwrap();
        let loaded = FlatIndex::load(&path).unwrap();
        let after = loaded.search(&query, 7).unwrap();

        assert_eq!(loaded, index);
        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a.row, b.row);
            assert_eq!(a.distance.to_bits(), b.distance.to_bits());
        }
    }

    #[test]
    fn test_metadata_digest_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let paired = dir.path().join("paired.pqix");
        let alone = dir.path().join("alone.pqix");
        let digest = [7u8; 32];

        sample().persist_paired(&paired, digest).unwrap();
        sample().persist(&alone).unwrap();

        let (index, stored) = FlatIndex::load_paired(&paired).unwrap();
        assert_eq!(index, sample());
        assert_eq!(stored, Some(digest));
        assert_eq!(FlatIndex::load_paired(&alone).unwrap().1, None);
        assert_eq!(FlatIndex::load(&paired).unwrap(), sample());
    }

    #[test]
    fn test_empty_index_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pqix");
        FlatIndex::new().persist(&path).unwrap();
        let loaded = FlatIndex::load(&path).unwrap();
        assert_eq!(loaded.count(), 0);
        assert_eq!(loaded.dimensions(), None);
    }

    #[test]
    fn test_missing_file_is_index_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FlatIndex::load(&dir.path().join("absent.pqix")),
            Err(Error::IndexNotFound { .. })
        ));
    }

    #[test]
    fn test_flipped_payload_byte_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.pqix");
        sample().persist(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        match FlatIndex::load(&path) {
            Err(Error::CorruptIndex { reason, .. }) => assert!(reason.contains("checksum")),
            other => panic!("expected CorruptIndex, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.pqix");
        sample().persist(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 4]).unwrap();
        assert!(matches!(FlatIndex::load(&path), Err(Error::CorruptIndex { .. })));

        std::fs::write(&path, b"PQ").unwrap();
        assert!(matches!(FlatIndex::load(&path), Err(Error::CorruptIndex { .. })));
    }
}
