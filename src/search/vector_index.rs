//! ARVI (Assessment Recommender Vector Index) bundle format.
//!
//! One bundle file is the immutable unit of deployment: the exact
//! inner-product index (a flat f32 slab), the catalog metadata table in the
//! same row order, and the identifier of the embedder that produced the
//! vectors. Format overview (little-endian):
//!
//! Header (variable size):
//!   Magic: "ARVI" (4 bytes)
//!   Version: u16
//!   EmbedderID length: u16
//!   EmbedderID: bytes
//!   Dimension: u32
//!   Count: u32
//!   MetaLen: u64 (byte length of the metadata block)
//!   HeaderCRC32: u32 (CRC32 of header bytes before this field)
//!
//! Metadata block:
//!   MetaLen bytes of JSON: the catalog records, row i describing vector i.
//!
//! Vector slab:
//!   Count x Dimension x 4 bytes of f32, contiguous, 32-byte aligned.
//!
//! Row i of the metadata table corresponds exactly to vector i in the slab;
//! every operation here preserves that alignment or fails loudly.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use memmap2::Mmap;

use crate::model::types::CatalogRecord;

pub const ARVI_MAGIC: [u8; 4] = *b"ARVI";
pub const ARVI_VERSION: u16 = 1;
pub const VECTOR_ALIGN_BYTES: usize = 32;

/// Stored vectors must be unit-norm within this tolerance; the raw inner
/// product only stands in for cosine similarity when that holds.
pub const NORM_EPSILON: f64 = 1e-3;

pub fn bundle_path(index_dir: &Path, embedder_id: &str) -> PathBuf {
    index_dir.join(format!("bundle-{embedder_id}.arvi"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleHeader {
    pub version: u16,
    pub embedder_id: String,
    pub dimension: u32,
    pub count: u32,
    pub meta_len: u64,
}

impl BundleHeader {
    pub fn validate(&self) -> Result<()> {
        if self.embedder_id.is_empty() {
            bail!("embedder_id must be non-empty");
        }
        if self.embedder_id.len() > u16::MAX as usize {
            bail!("embedder_id is too long: {}", self.embedder_id.len());
        }
        if self.dimension == 0 {
            bail!("dimension must be non-zero");
        }
        Ok(())
    }

    pub fn header_len_bytes(&self) -> Result<usize> {
        self.validate()?;
        Ok(4 + 2 + 2 + self.embedder_id.len() + 4 + 4 + 8 + 4)
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<usize> {
        self.validate()?;
        let mut buf = Vec::new();

        buf.extend_from_slice(&ARVI_MAGIC);
        buf.extend_from_slice(&self.version.to_le_bytes());

        let id_bytes = self.embedder_id.as_bytes();
        let id_len = u16::try_from(id_bytes.len())
            .map_err(|_| anyhow!("embedder_id length out of range"))?;
        buf.extend_from_slice(&id_len.to_le_bytes());
        buf.extend_from_slice(id_bytes);

        buf.extend_from_slice(&self.dimension.to_le_bytes());
        buf.extend_from_slice(&self.count.to_le_bytes());
        buf.extend_from_slice(&self.meta_len.to_le_bytes());

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf);
        let crc = hasher.finalize();

        writer.write_all(&buf)?;
        writer.write_all(&crc.to_le_bytes())?;
        Ok(buf.len() + 4)
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut header_bytes = Vec::new();

        let magic =
            read_exact_array::<4, _>(&mut reader, &mut header_bytes).context("read ARVI magic")?;
        if magic != ARVI_MAGIC {
            bail!("invalid ARVI magic: {:?}", magic);
        }

        let version = read_u16_le(&mut reader, &mut header_bytes).context("read ARVI version")?;
        if version != ARVI_VERSION {
            bail!("unsupported ARVI version: {version}");
        }

        let id_len = read_u16_le(&mut reader, &mut header_bytes)
            .context("read embedder id length")? as usize;
        let id_bytes =
            read_exact_vec(&mut reader, id_len, &mut header_bytes).context("read embedder id")?;
        let embedder_id = String::from_utf8(id_bytes).context("embedder id is not valid UTF-8")?;

        let dimension = read_u32_le(&mut reader, &mut header_bytes).context("read dimension")?;
        let count = read_u32_le(&mut reader, &mut header_bytes).context("read count")?;
        let meta_len = read_u64_le(&mut reader, &mut header_bytes).context("read meta length")?;

        let crc_expected = read_u32_le_no_accum(&mut reader).context("read header crc")?;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header_bytes);
        let crc_actual = hasher.finalize();
        if crc_actual != crc_expected {
            bail!("header CRC mismatch (expected {crc_expected:#010x}, got {crc_actual:#010x})");
        }

        let header = Self {
            version,
            embedder_id,
            dimension,
            count,
            meta_len,
        };
        header.validate()?;
        Ok(header)
    }
}

/// One nearest-neighbor hit: a row into the metadata table plus its raw
/// inner-product score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub row: usize,
    pub score: f32,
}

#[derive(Debug)]
enum VectorStorage {
    InMemory(Vec<f32>),
    Mmap {
        mmap: Mmap,
        offset: usize,
        len_bytes: usize,
    },
}

/// Loaded (or freshly built) index bundle. Read-only after construction:
/// searches never mutate it, so concurrent callers need no coordination.
#[derive(Debug)]
pub struct IndexBundle {
    header: BundleHeader,
    records: Vec<CatalogRecord>,
    vectors: VectorStorage,
}

impl IndexBundle {
    /// Assemble a bundle from parallel record and vector lists. Fails on
    /// empty input, dimension mismatches, and vectors off unit norm; a
    /// misaligned bundle must never come into existence.
    pub fn build(
        embedder_id: impl Into<String>,
        dimension: usize,
        records: Vec<CatalogRecord>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if records.is_empty() {
            bail!("cannot build an index bundle from an empty catalog");
        }
        if records.len() != vectors.len() {
            bail!(
                "record/vector count mismatch: {} records, {} vectors",
                records.len(),
                vectors.len()
            );
        }
        let dimension_u32 =
            u32::try_from(dimension).map_err(|_| anyhow!("dimension out of range"))?;
        let count_u32 =
            u32::try_from(records.len()).map_err(|_| anyhow!("record count out of range"))?;

        let mut slab = Vec::with_capacity(records.len() * dimension);
        for (i, vector) in vectors.iter().enumerate() {
            if vector.len() != dimension {
                bail!(
                    "vector dimension mismatch at row {i}: expected {dimension}, got {}",
                    vector.len()
                );
            }
            let norm = vector
                .iter()
                .map(|v| f64::from(*v) * f64::from(*v))
                .sum::<f64>()
                .sqrt();
            if (norm - 1.0).abs() > NORM_EPSILON {
                bail!("vector at row {i} is not unit-norm (|v| = {norm})");
            }
            slab.extend_from_slice(vector);
        }

        let meta = serde_json::to_vec(&records).context("serialize bundle metadata")?;
        let header = BundleHeader {
            version: ARVI_VERSION,
            embedder_id: embedder_id.into(),
            dimension: dimension_u32,
            count: count_u32,
            meta_len: meta.len() as u64,
        };
        header.validate()?;

        Ok(Self {
            header,
            records,
            vectors: VectorStorage::InMemory(slab),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        if cfg!(target_endian = "big") {
            bail!("ARVI load is only supported on little-endian targets");
        }

        let file = File::open(path).with_context(|| format!("open ARVI file {path:?}"))?;
        let metadata = file.metadata().context("read ARVI file metadata")?;
        let file_len = metadata.len();
        if file_len == 0 {
            bail!("ARVI file is empty");
        }

        let mmap = unsafe { Mmap::map(&file).context("mmap ARVI file")? };
        let mut cursor = Cursor::new(&mmap[..]);
        let header = BundleHeader::read_from(&mut cursor).context("read ARVI header")?;
        let header_len = header.header_len_bytes()?;

        let meta_len =
            usize::try_from(header.meta_len).map_err(|_| anyhow!("meta length out of range"))?;
        let slab_offset = vector_slab_offset_bytes(header_len, meta_len)?;
        let slab_size = vector_slab_size_bytes(header.count, header.dimension)?;
        let expected_len = slab_offset
            .checked_add(slab_size)
            .ok_or_else(|| anyhow!("ARVI file size overflow"))?;
        if file_len != expected_len as u64 {
            bail!(
                "ARVI file size mismatch (expected {}, got {})",
                expected_len,
                file_len
            );
        }

        let meta_end = header_len
            .checked_add(meta_len)
            .ok_or_else(|| anyhow!("metadata offset overflow"))?;
        let meta_bytes = mmap
            .get(header_len..meta_end)
            .ok_or_else(|| anyhow!("metadata block out of bounds"))?;
        let records: Vec<CatalogRecord> =
            serde_json::from_slice(meta_bytes).context("parse bundle metadata")?;
        if records.len() != header.count as usize {
            bail!(
                "metadata row count mismatch: header says {}, metadata has {}",
                header.count,
                records.len()
            );
        }

        Ok(Self {
            header,
            records,
            vectors: VectorStorage::Mmap {
                mmap,
                offset: slab_offset,
                len_bytes: slab_size,
            },
        })
    }

    /// Atomic persist: write to a temp file, fsync, rename into place.
    /// A crashed build leaves no partial bundle behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create bundle directory {parent:?}"))?;
        let temp_path = path.with_extension("arvi.tmp");
        let mut file = File::create(&temp_path)
            .with_context(|| format!("create temp ARVI file {temp_path:?}"))?;
        self.write_to(&mut file)?;
        file.sync_all().context("fsync ARVI temp file")?;
        sync_dir(parent).context("fsync ARVI directory")?;
        std::fs::rename(&temp_path, path)
            .with_context(|| format!("rename ARVI temp file {temp_path:?}"))?;
        sync_dir(parent).context("fsync ARVI directory post-rename")?;
        Ok(())
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        if cfg!(target_endian = "big") {
            bail!("ARVI write is only supported on little-endian targets");
        }
        let meta = serde_json::to_vec(&self.records).context("serialize bundle metadata")?;
        if meta.len() as u64 != self.header.meta_len {
            bail!(
                "metadata length drifted: header says {}, serialized {}",
                self.header.meta_len,
                meta.len()
            );
        }

        let header_len = self.header.header_len_bytes()?;
        let written = self.header.write_to(&mut writer)?;
        if written != header_len {
            bail!("header length mismatch: expected {header_len}, wrote {written}");
        }
        writer.write_all(&meta)?;

        let slab_offset = vector_slab_offset_bytes(header_len, meta.len())?;
        let padding_len = slab_offset
            .checked_sub(header_len + meta.len())
            .ok_or_else(|| anyhow!("padding length underflow"))?;
        if padding_len > 0 {
            writer.write_all(&vec![0u8; padding_len])?;
        }

        match &self.vectors {
            VectorStorage::InMemory(values) => {
                for value in values {
                    writer.write_all(&value.to_le_bytes())?;
                }
            }
            VectorStorage::Mmap {
                mmap,
                offset,
                len_bytes,
            } => {
                let bytes = mmap
                    .get(*offset..offset + len_bytes)
                    .ok_or_else(|| anyhow!("vector slab out of bounds"))?;
                writer.write_all(bytes)?;
            }
        }
        Ok(())
    }

    /// Exact top-k nearest rows by inner product. Results are sorted by
    /// descending score, ties broken by ascending row index so output is
    /// deterministic.
    pub fn search_top_k(&self, query_vec: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query_vec.len() != self.header.dimension as usize {
            bail!(
                "query dimension mismatch: expected {}, got {}",
                self.header.dimension,
                query_vec.len()
            );
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut heap = BinaryHeap::with_capacity(k + 1);
        for row in 0..self.records.len() {
            let vector = self.vector_at(row)?;
            let score = dot_product(vector, query_vec);
            heap.push(std::cmp::Reverse(ScoredRow { score, row }));
            if heap.len() > k {
                heap.pop();
            }
        }

        let mut results: Vec<SearchHit> = heap
            .into_iter()
            .map(|entry| SearchHit {
                row: entry.0.row,
                score: entry.0.score,
            })
            .collect();
        results.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.row.cmp(&b.row))
        });
        Ok(results)
    }

    pub fn vector_at(&self, row: usize) -> Result<&[f32]> {
        let dimension = self.header.dimension as usize;
        let start = row
            .checked_mul(dimension)
            .ok_or_else(|| anyhow!("vector index overflow"))?;
        let end = start
            .checked_add(dimension)
            .ok_or_else(|| anyhow!("vector index overflow"))?;
        match &self.vectors {
            VectorStorage::InMemory(values) => values
                .get(start..end)
                .ok_or_else(|| anyhow!("vector row {row} out of bounds")),
            VectorStorage::Mmap {
                mmap,
                offset,
                len_bytes,
            } => {
                let byte_start = offset + start * 4;
                let byte_end = offset + end * 4;
                if byte_end > offset + len_bytes {
                    bail!("vector row {row} out of bounds");
                }
                let bytes = mmap
                    .get(byte_start..byte_end)
                    .ok_or_else(|| anyhow!("vector row {row} out of bounds"))?;
                bytes_as_f32(bytes)
            }
        }
    }

    pub fn header(&self) -> &BundleHeader {
        &self.header
    }

    pub fn records(&self) -> &[CatalogRecord] {
        &self.records
    }

    pub fn record(&self, row: usize) -> Option<&CatalogRecord> {
        self.records.get(row)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn vector_slab_offset_bytes(header_len: usize, meta_len: usize) -> Result<usize> {
    let end = header_len
        .checked_add(meta_len)
        .ok_or_else(|| anyhow!("offset overflow"))?;
    Ok(align_up(end, VECTOR_ALIGN_BYTES))
}

pub fn vector_slab_size_bytes(count: u32, dimension: u32) -> Result<usize> {
    let components = (count as usize)
        .checked_mul(dimension as usize)
        .ok_or_else(|| anyhow!("vector slab size overflow"))?;
    components
        .checked_mul(4)
        .ok_or_else(|| anyhow!("vector slab size overflow"))
}

fn align_up(value: usize, align: usize) -> usize {
    let rem = value % align;
    if rem == 0 { value } else { value + (align - rem) }
}

fn bytes_as_f32(bytes: &[u8]) -> Result<&[f32]> {
    let (prefix, values, suffix) = unsafe { bytes.align_to::<f32>() };
    if !prefix.is_empty() || !suffix.is_empty() {
        bail!("vector slab is not f32-aligned");
    }
    Ok(values)
}

fn sync_dir(path: &Path) -> Result<()> {
    // Directory fsync is not available on all platforms; best effort.
    if let Ok(dir) = File::open(path) {
        let _ = dir.sync_all();
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct ScoredRow {
    score: f32,
    row: usize,
}

impl PartialEq for ScoredRow {
    fn eq(&self, other: &Self) -> bool {
        self.score.total_cmp(&other.score) == Ordering::Equal && self.row == other.row
    }
}

impl Eq for ScoredRow {}

impl PartialOrd for ScoredRow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredRow {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            // Higher rows sort first under Reverse, so the heap evicts the
            // later duplicate on tied scores and the earlier row survives.
            .then_with(|| other.row.cmp(&self.row))
    }
}

fn read_exact_array<const N: usize, R: Read>(
    reader: &mut R,
    accum: &mut Vec<u8>,
) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    accum.extend_from_slice(&buf);
    Ok(buf)
}

fn read_exact_vec<R: Read>(reader: &mut R, len: usize, accum: &mut Vec<u8>) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    accum.extend_from_slice(&buf);
    Ok(buf)
}

fn read_u16_le<R: Read>(reader: &mut R, accum: &mut Vec<u8>) -> Result<u16> {
    let buf = read_exact_array::<2, _>(reader, accum)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32_le<R: Read>(reader: &mut R, accum: &mut Vec<u8>) -> Result<u32> {
    let buf = read_exact_array::<4, _>(reader, accum)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64_le<R: Read>(reader: &mut R, accum: &mut Vec<u8>) -> Result<u64> {
    let buf = read_exact_array::<8, _>(reader, accum)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_u32_le_no_accum<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
