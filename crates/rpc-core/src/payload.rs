//! Payload codec — the `{data1, data2_len, data2}` record, plus the
//! size-negotiation dance that lets two hosts with different notions of
//! "how big an allocation is safe" agree on a length encoding before any
//! blob bytes cross the wire.
//!
//! `write_payload` and `read_payload` are two halves of one exchange run
//! over the *same* connection — the receiver talks back mid-frame (its
//! declared max, then an overflow verdict), so both sides need read and
//! write access to the stream, not just one direction each.

use bytes::Bytes;

use crate::framing::{get_bytes, get_i32, get_u64, put_bytes, put_i32, put_u64};
use tokio::io::{AsyncRead, AsyncWrite};

/// Declared maximum blob length this crate advertises to peers, and the
/// bound a receiver enforces against the negotiated length. Matches the
/// value called out in the source's own hard-coded bound.
pub const MAX_BLOB_LEN: u64 = u32::MAX as u64;

/// The generic request/response payload. `data2_len == 0 <=> data2 is
/// `None`` is enforced by construction — there is no way to build a
/// `Payload` that violates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub data1: i32,
    data2: Option<Bytes>,
}

impl Payload {
    pub fn new(data1: i32) -> Self {
        Self { data1, data2: None }
    }

    pub fn with_blob(data1: i32, data2: impl Into<Bytes>) -> Self {
        let data2 = data2.into();
        if data2.is_empty() {
            Self { data1, data2: None }
        } else {
            Self {
                data1,
                data2: Some(data2),
            }
        }
    }

    pub fn data2(&self) -> Option<&Bytes> {
        self.data2.as_ref()
    }

    pub fn data2_len(&self) -> u64 {
        self.data2.as_ref().map(|b| b.len() as u64).unwrap_or(0)
    }
}

/// Release a payload. Kept for API symmetry with the C-heritage
/// `payload_free(payload)` signature; `Payload`'s derived `Drop` already
/// released its heap data by the time this function could run anything,
/// so this is a no-op that just consumes the value.
pub fn payload_free(_payload: Payload) {}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("transport error while transferring a payload: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer reported a shape-invariant violation (data2_len == 0 xor data2 present)")]
    InvalidShape,
    #[error("peer negotiated a zero-length pivot")]
    InvalidPivot,
    #[error("peer sent a negative length multiplier")]
    InvalidLength,
    #[error("negotiated data2_len overflows this host's platform maximum")]
    Overflow,
    #[error("receiver rejected the negotiated data2_len as an overflow")]
    ReceiverOverflow,
    #[error("data2_len does not fit in this protocol's quot/rem encoding")]
    LengthOverflow,
}

/// Sender's half of the payload frame. `own_max` is this side's declared
/// maximum blob length, sent to the peer as the receiver in the reverse
/// direction — this function plays *sender*, so `own_max` is only used if
/// the negotiated pivot somehow needs it (it doesn't on the sender side
/// directly, but keeping the same parameter on both halves keeps the two
/// call sites symmetric and lets tests shrink both bounds together).
pub async fn write_payload<S: AsyncRead + AsyncWrite + Unpin>(
    s: &mut S,
    payload: Option<&Payload>,
    own_max: u64,
) -> Result<(), PayloadError> {
    let payload = match payload {
        None => {
            put_i32(s, -1).await?;
            return Ok(());
        }
        Some(p) => p,
    };

    put_i32(s, 0).await?; // present
    put_i32(s, 0).await?; // shape: Payload's invariant is enforced by construction
    put_i32(s, payload.data1).await?;

    let peer_max = get_u64(s).await?;
    let pivot = own_max.min(peer_max);
    if pivot == 0 {
        return Err(PayloadError::InvalidPivot);
    }
    put_u64(s, pivot).await?;

    let data2_len = payload.data2_len();
    let quot = data2_len / pivot;
    let rem = data2_len % pivot;
    let quot = i32::try_from(quot).map_err(|_| PayloadError::LengthOverflow)?;
    put_i32(s, quot).await?;
    put_u64(s, rem).await?;

    let overflow_flag = get_i32(s).await?;
    if overflow_flag != 0 {
        return Err(PayloadError::ReceiverOverflow);
    }

    if data2_len > 0 {
        put_bytes(s, payload.data2().expect("data2_len > 0 implies data2 is Some")).await?;
    }
    Ok(())
}

/// Receiver's half. Returns `Ok(None)` for a null payload (present_flag ==
/// -1), which is a normal outcome, not an error.
pub async fn read_payload<S: AsyncRead + AsyncWrite + Unpin>(
    s: &mut S,
    own_max: u64,
) -> Result<Option<Payload>, PayloadError> {
    let present_flag = get_i32(s).await?;
    if present_flag != 0 {
        return Ok(None);
    }

    let shape_flag = get_i32(s).await?;
    if shape_flag != 0 {
        return Err(PayloadError::InvalidShape);
    }

    let data1 = get_i32(s).await?;

    put_u64(s, own_max).await?;
    let pivot = get_u64(s).await?;
    if pivot == 0 {
        return Err(PayloadError::InvalidPivot);
    }

    let quot = get_i32(s).await?;
    if quot < 0 {
        return Err(PayloadError::InvalidLength);
    }
    let rem = get_u64(s).await?;

    let data2_len = (quot as u64)
        .checked_mul(pivot)
        .and_then(|v| v.checked_add(rem));

    let data2_len = match data2_len.filter(|&len| len <= own_max) {
        Some(len) => {
            put_i32(s, 0).await?;
            len
        }
        None => {
            put_i32(s, -1).await?;
            return Err(PayloadError::Overflow);
        }
    };

    let data2 = if data2_len > 0 {
        Some(Bytes::from(get_bytes(s, data2_len as usize).await?))
    } else {
        None
    };

    Ok(Some(Payload { data1, data2 }))
}
