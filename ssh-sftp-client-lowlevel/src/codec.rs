//! Helpers for the ssh wire encoding used by sftp: big endian integers
//! and `u32` length prefixed strings.

use super::Error;

use bytes::{Buf, BufMut, Bytes, BytesMut};

fn truncated() -> Error {
    Error::InvalidResponse(&"Packet is truncated")
}

pub(crate) fn get_u8(buf: &mut Bytes) -> Result<u8, Error> {
    if buf.remaining() < 1 {
        return Err(truncated());
    }
    Ok(buf.get_u8())
}

pub(crate) fn get_u32(buf: &mut Bytes) -> Result<u32, Error> {
    if buf.remaining() < 4 {
        return Err(truncated());
    }
    Ok(buf.get_u32())
}

pub(crate) fn get_u64(buf: &mut Bytes) -> Result<u64, Error> {
    if buf.remaining() < 8 {
        return Err(truncated());
    }
    Ok(buf.get_u64())
}

/// Split off a length prefixed string without copying.
pub(crate) fn get_string(buf: &mut Bytes) -> Result<Bytes, Error> {
    let len = get_u32(buf)? as usize;
    if buf.remaining() < len {
        return Err(truncated());
    }
    Ok(buf.split_to(len))
}

pub(crate) fn put_string(buf: &mut BytesMut, s: &[u8]) -> Result<(), Error> {
    let len: u32 = s.len().try_into()?;
    buf.put_u32(len);
    buf.put_slice(s);
    Ok(())
}

/// Reserve room for a packet length, return its position so that
/// [`finish_packet`] can fill it in.
pub(crate) fn start_packet(buf: &mut BytesMut, packet_type: u8) -> usize {
    let start = buf.len();
    buf.put_u32(0);
    buf.put_u8(packet_type);
    start
}

pub(crate) fn finish_packet(buf: &mut BytesMut, start: usize) -> Result<(), Error> {
    let len: u32 = (buf.len() - start - 4).try_into()?;
    buf[start..start + 4].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn string_roundtrip_and_truncation() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, b"hello").unwrap();
        buf.put_u8(7);

        let mut bytes = buf.freeze();
        assert_eq!(&get_string(&mut bytes).unwrap()[..], b"hello");
        assert_eq!(get_u8(&mut bytes).unwrap(), 7);
        assert!(get_u8(&mut bytes).is_err());

        let mut short = Bytes::from_static(&[0, 0, 0, 9, b'a']);
        assert!(matches!(
            get_string(&mut short),
            Err(Error::InvalidResponse(_))
        ));
    }

    #[test]
    fn packet_length_is_patched() {
        let mut buf = BytesMut::new();
        let start = start_packet(&mut buf, 3);
        buf.put_u32(42);
        finish_packet(&mut buf, start).unwrap();

        assert_eq!(&buf[..], &[0, 0, 0, 5, 3, 0, 0, 0, 42]);
    }
}
