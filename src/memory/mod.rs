//! Core memory engine — records, CRUD, search, and the sync journal.
//!
//! The write path ([`store::MemoryStore`]) owns DLP invocation, the
//! vector-index dual-write, tombstoning, and journal emission. Type
//! definitions live in [`types`].

pub mod store;
pub mod types;

/// Convert an f32 embedding slice to raw bytes for sqlite-vec and the
/// `memories.vector` column.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            embedding.len() * std::mem::size_of::<f32>(),
        )
    }
}

/// Convert raw vector-column bytes back to f32s.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Current time as a millisecond epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_bytes_round_trip() {
        let v = vec![0.25f32, -1.5, 0.0, 3.75];
        let bytes = embedding_to_bytes(&v);
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes_to_embedding(bytes), v);
    }
}
