//! Exact (brute-force) vector index for one document.
//!
//! Every document gets its own small index, so an exhaustive scan is cheap
//! and gives exact neighbours. Rows are stored row-major as `f32`.
//!
//! # On-disk format
//!
//! ```text
//! magic    8 bytes   "CIDXVEC1"
//! metric   1 byte    0 = L2, 1 = InnerProduct
//! dim      u32 LE
//! rows     u32 LE
//! data     rows × dim × f32 LE
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedding::{blob_to_vec, dot, l2_normalize, squared_l2, vec_to_blob};
use crate::rank::Score;

const MAGIC: &[u8; 8] = b"CIDXVEC1";
const HEADER_LEN: usize = 8 + 1 + 4 + 4;

/// Comparison function an index is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Squared Euclidean distance, lower is closer.
    L2,
    /// Dot product over unit vectors, higher is closer.
    InnerProduct,
}

impl Metric {
    fn tag(self) -> u8 {
        match self {
            Metric::L2 => 0,
            Metric::InnerProduct => 1,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Metric::L2),
            1 => Some(Metric::InnerProduct),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    #[error("cannot build an index from zero vectors")]
    Empty,

    #[error("row {row} has dimension {actual}, expected {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("query has dimension {actual}, index expects {expected}")]
    QueryDimension { expected: usize, actual: usize },

    #[error("row {row} holds a non-finite value")]
    NonFinite { row: usize },

    #[error("corrupt index file: {0}")]
    Corrupt(String),
}

/// A nearest-neighbour hit: the row number and its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub score: Score,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    metric: Metric,
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Build an index over `vectors`. For [`Metric::InnerProduct`] every row
    /// is normalised to unit length first.
    pub fn build(metric: Metric, vectors: &[Vec<f32>]) -> Result<Self, IndexError> {
        let dimension = match vectors.first() {
            Some(v) if !v.is_empty() => v.len(),
            _ => return Err(IndexError::Empty),
        };

        let mut data = Vec::with_capacity(vectors.len() * dimension);
        for (row, v) in vectors.iter().enumerate() {
            if v.len() != dimension {
                return Err(IndexError::RaggedRows {
                    row,
                    expected: dimension,
                    actual: v.len(),
                });
            }
            if v.iter().any(|x| !x.is_finite()) {
                return Err(IndexError::NonFinite { row });
            }
            let start = data.len();
            data.extend_from_slice(v);
            if metric == Metric::InnerProduct {
                l2_normalize(&mut data[start..]);
            }
        }

        Ok(Self {
            metric,
            dimension,
            data,
        })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(&self, i: usize) -> Option<&[f32]> {
        let start = i.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Return the `min(k, len)` best rows for `query`, best first.
    ///
    /// InnerProduct indexes normalise the query too, so their scores are
    /// cosine similarities. Equal scores keep row order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::QueryDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<(usize, f32)> = match self.metric {
            Metric::L2 => self
                .data
                .chunks_exact(self.dimension)
                .enumerate()
                .map(|(i, row)| (i, squared_l2(row, query)))
                .collect(),
            Metric::InnerProduct => {
                let mut q = query.to_vec();
                l2_normalize(&mut q);
                self.data
                    .chunks_exact(self.dimension)
                    .enumerate()
                    .map(|(i, row)| (i, dot(row, &q)))
                    .collect()
            }
        };

        match self.metric {
            Metric::L2 => hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))),
            Metric::InnerProduct => {
                hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)))
            }
        }
        hits.truncate(k);

        let metric = self.metric;
        Ok(hits
            .into_iter()
            .map(|(row, value)| Neighbor {
                row,
                score: match metric {
                    Metric::L2 => Score::Distance(value),
                    Metric::InnerProduct => Score::Similarity(value),
                },
            })
            .collect())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        out.extend_from_slice(MAGIC);
        out.push(self.metric.tag());
        out.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        out.extend_from_slice(&(self.len() as u32).to_le_bytes());
        out.extend_from_slice(&vec_to_blob(&self.data));
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < HEADER_LEN {
            return Err(IndexError::Corrupt(format!(
                "{} bytes is shorter than the header",
                bytes.len()
            )));
        }
        if &bytes[..8] != MAGIC {
            return Err(IndexError::Corrupt("bad magic".to_string()));
        }
        let metric = Metric::from_tag(bytes[8])
            .ok_or_else(|| IndexError::Corrupt(format!("unknown metric tag {}", bytes[8])))?;
        let dimension = u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]) as usize;
        let rows = u32::from_le_bytes([bytes[13], bytes[14], bytes[15], bytes[16]]) as usize;

        if dimension == 0 || rows == 0 {
            return Err(IndexError::Corrupt(format!(
                "empty index ({} rows × {} dims)",
                rows, dimension
            )));
        }

        let body = &bytes[HEADER_LEN..];
        let expected = rows
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| IndexError::Corrupt("header overflows".to_string()))?;
        if body.len() != expected {
            return Err(IndexError::Corrupt(format!(
                "expected {} data bytes, found {}",
                expected,
                body.len()
            )));
        }

        let data = blob_to_vec(body);
        if let Some(pos) = data.iter().position(|x| !x.is_finite()) {
            return Err(IndexError::Corrupt(format!(
                "non-finite value in row {}",
                pos / dimension
            )));
        }

        Ok(Self {
            metric,
            dimension,
            data,
        })
    }
}
