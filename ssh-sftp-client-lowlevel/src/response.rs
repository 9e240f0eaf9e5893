use super::{codec, constants, Error, FileAttrs};

use std::ops::Deref;

use bytes::Bytes;

/// Handle returned by the server for an open file or directory.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct HandleOwned(Bytes);

impl HandleOwned {
    pub(crate) fn new(bytes: Bytes) -> Result<Self, Error> {
        if bytes.len() > constants::MAX_HANDLE_LEN {
            Err(Error::HandleTooLong)
        } else {
            Ok(Self(bytes))
        }
    }
}

impl Deref for HandleOwned {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// One entry of an `SSH_FXP_NAME` response.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NameEntry {
    pub filename: Bytes,
    /// `ls -l` style description produced by the server.
    pub longname: Bytes,
    pub attrs: FileAttrs,
}

#[derive(Debug, Clone)]
pub(crate) enum Response {
    Status { code: u32, msg: Bytes },
    Handle(HandleOwned),
    Data(Bytes),
    Name(Vec<NameEntry>),
    Attrs(FileAttrs),
    /// No request issued by this crate expects a payload back.
    ExtendedReply,
}

impl Response {
    /// Parse the body of a packet, after its type and id.
    pub(crate) fn decode(packet_type: u8, mut body: Bytes) -> Result<Self, Error> {
        let body = &mut body;

        Ok(match packet_type {
            constants::SSH_FXP_STATUS => {
                let code = codec::get_u32(body)?;
                // Some servers omit message and language tag.
                let msg = if body.is_empty() {
                    Bytes::new()
                } else {
                    codec::get_string(body)?
                };
                Response::Status { code, msg }
            }
            constants::SSH_FXP_HANDLE => Response::Handle(HandleOwned::new(codec::get_string(body)?)?),
            constants::SSH_FXP_DATA => Response::Data(codec::get_string(body)?),
            constants::SSH_FXP_NAME => {
                let count = codec::get_u32(body)?;
                let entries = (0..count)
                    .map(|_| {
                        Ok(NameEntry {
                            filename: codec::get_string(body)?,
                            longname: codec::get_string(body)?,
                            attrs: FileAttrs::decode(body)?,
                        })
                    })
                    .collect::<Result<Vec<_>, Error>>()?;
                Response::Name(entries)
            }
            constants::SSH_FXP_ATTRS => Response::Attrs(FileAttrs::decode(body)?),
            constants::SSH_FXP_EXTENDED_REPLY => Response::ExtendedReply,
            _ => return Err(Error::InvalidResponse(&"Unknown packet type")),
        })
    }

    pub(crate) fn status_code(&self) -> Option<u32> {
        match self {
            Response::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::{BufMut, BytesMut};
    use pretty_assertions::assert_eq;

    #[test]
    fn status_without_message() {
        let response = Response::decode(
            constants::SSH_FXP_STATUS,
            Bytes::from_static(&[0, 0, 0, 2]),
        )
        .unwrap();

        assert_eq!(response.status_code(), Some(2));
    }

    #[test]
    fn handle_too_long() {
        let mut buf = BytesMut::new();
        codec::put_string(&mut buf, &[0; 257]).unwrap();

        assert!(matches!(
            Response::decode(constants::SSH_FXP_HANDLE, buf.freeze()),
            Err(Error::HandleTooLong)
        ));
    }

    #[test]
    fn name_entries() {
        let mut buf = BytesMut::new();
        buf.put_u32(2);
        for name in [&b"a"[..], b"b"] {
            codec::put_string(&mut buf, name).unwrap();
            codec::put_string(&mut buf, b"-rw-r--r--").unwrap();
            buf.put_u32(0);
        }

        let entries = match Response::decode(constants::SSH_FXP_NAME, buf.freeze()).unwrap() {
            Response::Name(entries) => entries,
            response => panic!("Unexpected response {response:#?}"),
        };

        assert_eq!(entries.len(), 2);
        assert_eq!(&entries[1].filename[..], b"b");
        assert_eq!(entries[1].attrs, FileAttrs::new());
    }

    #[test]
    fn extended_reply_payload_is_skipped() {
        let response = Response::decode(
            constants::SSH_FXP_EXTENDED_REPLY,
            Bytes::from_static(b"opaque"),
        )
        .unwrap();

        assert!(matches!(response, Response::ExtendedReply));
        assert_eq!(response.status_code(), None);
    }
}
