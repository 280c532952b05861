//! Binary persistence for [`HnswIndex`].
//!
//! Layout, all integers little-endian `u32`:
//!
//! ```text
//! header: magic | version | dimensions | m | ef_construction | node_count
//! node:   label | f32 x dimensions | max_layer | (count | label x count) x (max_layer + 1)
//! label:  byte_len | utf-8 bytes
//! ```
//!
//! Nodes are written in insertion order and neighbor lists reference labels,
//! so a decoded index reproduces the same traversal and the same ranking.

use std::collections::HashMap;

use super::{HnswConfig, HnswIndex, Node, MAX_LEVEL};
use crate::error::{MemoryError, Result};

/// `"MVHX"` read as a little-endian `u32`.
pub const MAGIC: u32 = u32::from_le_bytes(*b"MVHX");

/// Current layout version.
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = 6 * 4;

impl HnswIndex {
    /// Encode the index into a self-contained byte buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.len() * (self.dimensions() * 4 + 64));
        put_u32(&mut out, MAGIC);
        put_u32(&mut out, FORMAT_VERSION);
        put_u32(&mut out, self.config.dimensions as u32);
        put_u32(&mut out, self.config.m as u32);
        put_u32(&mut out, self.config.ef_construction as u32);
        put_u32(&mut out, self.len() as u32);

        for (_, node) in self.live_nodes() {
            put_label(&mut out, &node.label);
            for value in &node.vector {
                out.extend_from_slice(&value.to_le_bytes());
            }
            put_u32(&mut out, node.level() as u32);
            for links in &node.links {
                put_u32(&mut out, links.len() as u32);
                for &neighbor in links {
                    let label = self.node(neighbor).map_or("", |n| n.label.as_str());
                    put_label(&mut out, label);
                }
            }
        }
        out
    }

    /// Rebuild an index from [`HnswIndex::serialize`] output.
    ///
    /// Any structural problem (bad magic, unknown version, truncation,
    /// dangling neighbor, trailing bytes) fails the whole load with
    /// `InvalidFormat`.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);

        let magic = reader.u32("magic")?;
        if magic != MAGIC {
            return Err(MemoryError::invalid_format(format!(
                "bad magic number {magic:#010x}, expected {MAGIC:#010x}"
            )));
        }
        let version = reader.u32("version")?;
        if version != FORMAT_VERSION {
            return Err(MemoryError::invalid_format(format!(
                "unsupported version {version}"
            )));
        }

        let config = HnswConfig {
            dimensions: reader.u32("dimensions")? as usize,
            m: reader.u32("m")? as usize,
            ef_construction: reader.u32("ef_construction")? as usize,
            seed: None,
        };
        config
            .validate()
            .map_err(|e| MemoryError::invalid_format(format!("bad header: {e}")))?;
        let count = reader.u32("node count")? as usize;

        // Smallest possible node: empty label, vector, level, one empty list.
        let min_node = 4 + config.dimensions * 4 + 4 + 4;
        if count > reader.remaining() / min_node {
            return Err(MemoryError::invalid_format(format!(
                "node count {count} exceeds buffer size"
            )));
        }

        let mut raw: Vec<(String, Vec<f32>, Vec<Vec<String>>)> = Vec::with_capacity(count);
        for _ in 0..count {
            let label = reader.label()?;
            let mut vector = Vec::with_capacity(config.dimensions);
            for _ in 0..config.dimensions {
                vector.push(f32::from_le_bytes(reader.array("vector")?));
            }
            let level = reader.u32("max layer")? as usize;
            if level > MAX_LEVEL {
                return Err(MemoryError::invalid_format(format!(
                    "node {label:?} has layer {level} above cap {MAX_LEVEL}"
                )));
            }
            let mut layers = Vec::with_capacity(level + 1);
            for _ in 0..=level {
                let len = reader.u32("neighbor count")? as usize;
                if len > reader.remaining() / 4 {
                    return Err(MemoryError::invalid_format("neighbor list truncated"));
                }
                let mut neighbors = Vec::with_capacity(len);
                for _ in 0..len {
                    neighbors.push(reader.label()?);
                }
                layers.push(neighbors);
            }
            raw.push((label, vector, layers));
        }
        if reader.remaining() != 0 {
            return Err(MemoryError::invalid_format(format!(
                "{} trailing bytes after last node",
                reader.remaining()
            )));
        }

        let positions: HashMap<&str, usize> = raw
            .iter()
            .enumerate()
            .map(|(i, (label, _, _))| (label.as_str(), i))
            .collect();

        let mut nodes = Vec::with_capacity(raw.len());
        for (label, vector, layers) in &raw {
            let mut node = Node::new(label.clone(), vector.clone(), layers.len() - 1);
            for (layer, neighbors) in layers.iter().enumerate() {
                for neighbor in neighbors {
                    let Some(&slot) = positions.get(neighbor.as_str()) else {
                        return Err(MemoryError::invalid_format(format!(
                            "node {label:?} links to unknown label {neighbor:?}"
                        )));
                    };
                    if raw[slot].2.len() <= layer {
                        return Err(MemoryError::invalid_format(format!(
                            "node {label:?} links to {neighbor:?} above its top layer"
                        )));
                    }
                    node.links[layer].push(slot);
                }
            }
            nodes.push(node);
        }

        let index = Self::from_parts(config, nodes)?;
        tracing::debug!(size = index.len(), dimensions = config.dimensions, "hnsw: decoded");
        Ok(index)
    }
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_label(out: &mut Vec<u8>, label: &str) {
    put_u32(out, label.len() as u32);
    out.extend_from_slice(label.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(MemoryError::invalid_format(format!(
                "truncated buffer reading {what} at offset {}",
                self.pos
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array(&mut self, what: &str) -> Result<[u8; 4]> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4, what)?);
        Ok(buf)
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    fn label(&mut self) -> Result<String> {
        let len = self.u32("label length")? as usize;
        let bytes = self.take(len, "label")?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| MemoryError::invalid_format("label is not valid utf-8"))
    }
}
