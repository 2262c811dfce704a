//! Wire framing — fixed-width integers and raw byte blobs on an async stream.
//!
//! Every integer on the wire is 8 bytes, big-endian, including `i32` values
//! (sign-extended into the low 32 bits of the 8-byte field on write, and
//! truncated back to 32 bits on read). This is not a 4-byte protocol — see
//! the module-level note in the workspace SPEC_FULL.md if that looks wrong.
//!
//! Built directly on `tokio::io`'s big-endian integer primitives: no
//! separate byteorder dependency is needed since `AsyncReadExt`/
//! `AsyncWriteExt` already read/write network byte order.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Write a `u64`, big-endian, 8 bytes.
pub async fn put_u64<W: AsyncWrite + Unpin>(w: &mut W, v: u64) -> std::io::Result<()> {
    w.write_u64(v).await
}

/// Read a `u64`, big-endian, 8 bytes.
pub async fn get_u64<R: AsyncRead + Unpin>(r: &mut R) -> std::io::Result<u64> {
    r.read_u64().await
}

/// Write an `i32`, sign-extended into an 8-byte big-endian field.
pub async fn put_i32<W: AsyncWrite + Unpin>(w: &mut W, v: i32) -> std::io::Result<()> {
    w.write_i64(v as i64).await
}

/// Read an `i32` back from an 8-byte big-endian field, truncating.
///
/// A peer-sent value outside `[i32::MIN, i32::MAX]` truncates to its low
/// 32 bits rather than erroring — this matches the source's behavior of
/// canonicalizing every integer to an 8-byte wire slot.
pub async fn get_i32<R: AsyncRead + Unpin>(r: &mut R) -> std::io::Result<i32> {
    let v = r.read_i64().await?;
    Ok(v as i32)
}

/// Write exactly `b.len()` raw octets, no transformation.
pub async fn put_bytes<W: AsyncWrite + Unpin>(w: &mut W, b: &[u8]) -> std::io::Result<()> {
    w.write_all(b).await
}

/// Read exactly `n` raw octets.
pub async fn get_bytes<R: AsyncRead + Unpin>(r: &mut R, n: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    r.read_exact(&mut buf).await?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn u64_round_trip_at_bounds() {
        for v in [0u64, 1, u64::MAX, u64::MAX / 2] {
            let mut buf = Vec::new();
            put_u64(&mut buf, v).await.unwrap();
            assert_eq!(buf.len(), 8);
            let mut cur = Cursor::new(buf);
            assert_eq!(get_u64(&mut cur).await.unwrap(), v);
        }
    }

    #[tokio::test]
    async fn i32_round_trip_at_bounds() {
        for v in [0i32, -1, 1, i32::MIN, i32::MAX, -128, 127] {
            let mut buf = Vec::new();
            put_i32(&mut buf, v).await.unwrap();
            assert_eq!(buf.len(), 8);
            let mut cur = Cursor::new(buf);
            assert_eq!(get_i32(&mut cur).await.unwrap(), v);
        }
    }

    #[tokio::test]
    async fn i32_is_sign_extended_on_the_wire() {
        let mut buf = Vec::new();
        put_i32(&mut buf, -1).await.unwrap();
        // -1 sign-extends to all-ones across all 8 bytes.
        assert_eq!(buf, vec![0xff; 8]);
    }

    #[tokio::test]
    async fn bytes_round_trip_including_embedded_nuls() {
        let data = vec![0u8, 1, 0, 2, 0, 0, 3];
        let mut buf = Vec::new();
        put_bytes(&mut buf, &data).await.unwrap();
        let mut cur = Cursor::new(buf);
        let out = get_bytes(&mut cur, data.len()).await.unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn short_read_is_an_error() {
        let mut cur = Cursor::new(vec![0u8; 3]);
        assert!(get_u64(&mut cur).await.is_err());
    }
}
