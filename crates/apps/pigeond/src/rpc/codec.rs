//! Wire framing: a 4-byte big-endian length prefix followed by a msgpack
//! payload. One frame per request, one per response.

use std::io::{self, ErrorKind};

use rmp_serde::{from_slice, Serializer};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Hard ceiling on a single frame's payload. Anything larger is a protocol
/// violation, not a big message.
pub const MAX_FRAME_LEN: usize = 1 << 20;

pub fn encode_frame<T: Serialize>(msg: &T) -> io::Result<Vec<u8>> {
    // Reserve 4 bytes for the length prefix and serialize directly into the
    // output frame to avoid a temporary payload buffer.
    let mut framed = Vec::with_capacity(512);
    framed.extend_from_slice(&[0u8; 4]);
    msg.serialize(&mut Serializer::new(&mut framed))
        .map_err(|err| io::Error::new(ErrorKind::InvalidData, err))?;
    let payload_len = framed
        .len()
        .checked_sub(4)
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidData, "missing frame payload"))?;
    if payload_len > MAX_FRAME_LEN {
        return Err(io::Error::new(ErrorKind::InvalidData, "frame too large"));
    }
    let len = u32::try_from(payload_len)
        .map_err(|_| io::Error::new(ErrorKind::InvalidData, "frame too large"))?;
    framed[..4].copy_from_slice(&len.to_be_bytes());
    Ok(framed)
}

pub fn decode_payload<T: DeserializeOwned>(payload: &[u8]) -> io::Result<T> {
    from_slice(payload).map_err(|err| io::Error::new(ErrorKind::InvalidData, err))
}

/// Read one frame's payload. `Ok(None)` on a clean end-of-stream at a frame
/// boundary; an EOF inside a frame is an error.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(ErrorKind::InvalidData, "frame too large"));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let framed = encode_frame(msg)?;
    writer.write_all(&framed).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::{RpcRequest, RpcResponse};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct Probe {
        id: u32,
        label: String,
    }

    #[test]
    fn encode_frame_prefixes_payload_length() {
        let probe = Probe {
            id: 7,
            label: "ready".to_string(),
        };
        let encoded = encode_frame(&probe).expect("encode frame");
        assert!(encoded.len() > 4);

        let mut header = [0u8; 4];
        header.copy_from_slice(&encoded[..4]);
        let len = u32::from_be_bytes(header) as usize;
        assert_eq!(len + 4, encoded.len());

        let decoded: Probe = decode_payload(&encoded[4..]).expect("decode payload");
        assert_eq!(decoded, probe);
    }

    #[tokio::test]
    async fn frames_round_trip_over_a_stream() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let request = RpcRequest {
            id: 42,
            method: "get_status".to_string(),
            params: None,
        };
        write_frame(&mut client, &request).await.expect("write");
        // A second frame queued behind the first.
        write_frame(
            &mut client,
            &RpcRequest {
                id: 43,
                method: "announce".to_string(),
                params: None,
            },
        )
        .await
        .expect("write second");
        drop(client);

        let first = read_frame(&mut server).await.expect("read").expect("frame");
        assert_eq!(decode_payload::<RpcRequest>(&first).expect("decode"), request);
        let second = read_frame(&mut server).await.expect("read").expect("frame");
        assert_eq!(decode_payload::<RpcRequest>(&second).expect("decode").id, 43);

        // Clean EOF at the frame boundary.
        assert!(read_frame(&mut server).await.expect("read").is_none());
    }

    #[tokio::test]
    async fn truncated_frame_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        tokio::io::AsyncWriteExt::write_all(&mut client, &[0, 0, 0, 8, 1, 2, 3])
            .await
            .expect("write");
        drop(client);
        let err = read_frame(&mut server).await.expect_err("truncated");
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let len = (MAX_FRAME_LEN as u32 + 1).to_be_bytes();
        tokio::io::AsyncWriteExt::write_all(&mut client, &len)
            .await
            .expect("write");
        let err = read_frame(&mut server).await.expect_err("oversized");
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn fuzz_smoke_decoders_do_not_panic() {
        let mut seed = 0xA5A5_5A5A_1234_5678_u64;
        for _ in 0..6_000 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            let len = ((seed >> 16) as usize) % 1024;
            let mut bytes = vec![0_u8; len];
            let mut stream = seed ^ 0x9E37_79B9_7F4A_7C15;
            for byte in &mut bytes {
                stream = stream.rotate_left(9).wrapping_mul(0xD134_2543_DE82_E285);
                *byte = (stream & 0xFF) as u8;
            }
            let _ = decode_payload::<RpcRequest>(&bytes);
            let _ = decode_payload::<RpcResponse>(&bytes);
        }
    }
}
