//! Streaming file digests
//!
//! Engine builds run to hundreds of megabytes, so digests are computed over
//! a fixed-size buffer rather than reading the file into memory.

use crate::error::{LodeError, LodeResult};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

const BUF_SIZE: usize = 64 * 1024;

/// Compute the SHA-256 digest of a file, returned as lowercase hex.
pub async fn sha256_file(path: &Path) -> LodeResult<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| LodeError::io(format!("opening {} for digest", path.display()), e))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];

    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| LodeError::io(format!("reading {} for digest", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn digest_known_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"abc").unwrap();

        let digest = sha256_file(&path).await.unwrap();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn digest_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();

        let digest = sha256_file(&path).await.unwrap();
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn digest_spans_buffer_boundary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        // Larger than one read buffer so the loop runs more than once
        std::fs::write(&path, vec![0x5au8; BUF_SIZE * 2 + 17]).unwrap();

        let streamed = sha256_file(&path).await.unwrap();

        let mut hasher = Sha256::new();
        hasher.update(std::fs::read(&path).unwrap());
        assert_eq!(streamed, hex::encode(hasher.finalize()));
    }

    #[tokio::test]
    async fn digest_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = sha256_file(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, LodeError::Io { .. }));
    }
}
