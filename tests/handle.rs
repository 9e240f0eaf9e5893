use ssh_sftp_client::*;

use std::fs;
use std::os::unix::fs::PermissionsExt;

use pretty_assertions::assert_eq;
use sftp_test_common::ServerExtensions;

mod common;
use common::*;

fn content(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| if i % 10 == 9 { b'\n' } else { b'a' + (i % 26) as u8 })
        .collect()
}

#[tokio::test]
async fn write_then_read_back_by_lines() {
    let tempdir = tempdir();
    let (_transport, session) = connected_with(small_io()).await;
    let path = tempdir.path().join("file");
    let data = content(95);

    let mut handle = session.handle(bytes(&path));
    handle.open_file("w", 0o644).await.unwrap();
    assert_eq!(handle.write(&data).await.unwrap(), data.len() as u64);
    handle.close().await.unwrap();

    assert_eq!(fs::read(&path).unwrap(), data);

    let mut handle = session.handle(bytes(&path));
    handle.open_file("r", 0).await.unwrap();

    let mut read = Vec::new();
    while let Some(line) = handle.gets().await.unwrap() {
        read.extend_from_slice(&line);
    }
    handle.close().await.unwrap();

    assert_eq!(read, data);
}

#[tokio::test]
async fn close_is_idempotent() {
    let tempdir = tempdir();
    let (transport, session) = connected().await;
    let path = tempdir.path().join("file");

    let mut handle = session.handle(bytes(&path));
    handle.open_file("w", 0).await.unwrap();
    assert!(handle.is_open());
    assert_eq!(transport.sftp.server().handles_open(), 1);

    handle.close().await.unwrap();
    handle.close().await.unwrap();
    drop(handle);

    assert_eq!(transport.sftp.server().handles_open(), 0);
    assert_eq!(transport.sftp.server().handles_closed(), 1);
}

#[tokio::test]
async fn unopened_handle_rejects_io() {
    let tempdir = tempdir();
    let (transport, session) = connected().await;

    let mut handle = session.handle(bytes(tempdir.path()));
    assert!(handle.closed());
    assert_eq!(handle.kind(), None);

    assert!(matches!(handle.tell(), Err(Error::HandleNotOpened)));
    assert!(matches!(handle.eof(), Err(Error::HandleNotOpened)));
    assert!(matches!(handle.gets().await, Err(Error::HandleNotOpened)));
    assert!(matches!(handle.write(b"x").await, Err(Error::HandleNotOpened)));
    assert!(matches!(
        handle.seek(0, Whence::Set).await,
        Err(Error::HandleNotOpened)
    ));
    assert!(matches!(handle.read_entry().await, Err(Error::HandleNotOpened)));

    let err = handle.stat().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Handle);

    handle.close().await.unwrap();
    assert_eq!(transport.sftp.server().requests(), 0);
}

#[tokio::test]
async fn closed_handle_rejects_io_and_reopen() {
    let tempdir = tempdir();
    let (_transport, session) = connected().await;
    let path = tempdir.path().join("file");
    fs::write(&path, b"data").unwrap();

    let mut handle = session.handle(bytes(&path));
    handle.open_file("r", 0).await.unwrap();
    handle.close().await.unwrap();

    assert!(handle.closed());
    assert!(matches!(handle.gets().await, Err(Error::HandleNotOpened)));
    assert!(matches!(handle.pos(), Err(Error::HandleNotOpened)));
    assert!(matches!(
        handle.open_file("r", 0).await,
        Err(Error::HandleClosed)
    ));
    assert!(matches!(handle.open_dir().await, Err(Error::HandleClosed)));
}

#[tokio::test]
async fn unsupported_mode_is_rejected_locally() {
    let tempdir = tempdir();
    let (transport, session) = connected().await;
    let path = tempdir.path().join("file");

    let mut handle = session.handle(bytes(&path));
    let err = handle.open_file("rw", 0).await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Unsupported);
    assert_eq!(transport.sftp.server().requests(), 0);
    assert!(!path.exists());

    // The handle is still unopened.
    handle.open_file("w", 0).await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn open_is_idempotent() {
    let tempdir = tempdir();
    let (transport, session) = connected().await;
    let path = tempdir.path().join("file");

    let mut handle = session.handle(bytes(&path));
    handle.open_file("w", 0).await.unwrap();
    handle.open_file("w", 0).await.unwrap();
    handle.open_dir().await.unwrap();

    assert_eq!(handle.kind(), Some(HandleKind::File));
    assert_eq!(transport.sftp.server().requests(), 1);
    assert_eq!(transport.sftp.server().handles_open(), 1);
}

#[tokio::test]
async fn open_requires_connected_session() {
    let tempdir = tempdir();
    let (_transport, session) = connected().await;
    session.close().await.unwrap();

    let mut handle = session.handle(bytes(tempdir.path()));

    assert!(matches!(handle.open_dir().await, Err(Error::NotConnected)));
    assert!(matches!(
        handle.open_file("r", 0).await,
        Err(Error::NotConnected)
    ));
}

#[tokio::test]
async fn open_reports_mapped_status() {
    let tempdir = tempdir();
    let (_transport, session) = connected().await;

    let mut handle = session.handle(bytes(&tempdir.path().join("missing")));
    let err = handle.open_file("r", 0).await.unwrap_err();

    assert_eq!(
        err.sftp_kind(),
        Some(SftpErrorKind::Path(PathErrorKind::NoSuchFile))
    );
    assert!(handle.closed());
    assert_eq!(session.last_error_code(), Some(2));
}

#[tokio::test]
async fn open_dispatches_on_file_type() {
    let tempdir = tempdir();
    let (_transport, session) = connected().await;

    let file = tempdir.path().join("file");
    fs::write(&file, b"data").unwrap();

    let mut handle = session.handle(bytes(tempdir.path()));
    handle.open("r", DEFAULT_OPEN_PERM).await.unwrap();
    assert_eq!(handle.kind(), Some(HandleKind::Directory));

    let mut handle = session.handle(bytes(&file));
    handle.open("r", DEFAULT_OPEN_PERM).await.unwrap();
    assert_eq!(handle.kind(), Some(HandleKind::File));
    assert_eq!(handle.path(), bytes(&file));
    assert_eq!(&handle.read_to_end().await.unwrap()[..], b"data");

    let mut handle = session.handle(bytes(&tempdir.path().join("missing")));
    let err = handle.open("r", DEFAULT_OPEN_PERM).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Path);
}

#[tokio::test]
async fn create_mode_sets_permissions() {
    let tempdir = tempdir();
    let (_transport, session) = connected().await;
    let path = tempdir.path().join("file");

    let mut handle = session.handle(bytes(&path));
    handle.open_file("w", 0o600).await.unwrap();

    assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
}

#[tokio::test]
async fn wrong_kind_is_rejected() {
    let tempdir = tempdir();
    let (_transport, session) = connected().await;
    let file = tempdir.path().join("file");
    fs::write(&file, b"data").unwrap();

    let mut dir = session.handle(bytes(tempdir.path()));
    dir.open_dir().await.unwrap();
    assert!(matches!(dir.gets().await, Err(Error::NotAFile)));
    assert!(matches!(dir.write(b"x").await, Err(Error::NotAFile)));

    let mut handle = session.handle(bytes(&file));
    handle.open_file("r", 0).await.unwrap();
    assert!(matches!(handle.read_entry().await, Err(Error::NotADirectory)));
}

#[tokio::test]
async fn seek_clamps_negative_offsets() {
    let tempdir = tempdir();
    let (_transport, session) = connected().await;
    let path = tempdir.path().join("file");
    fs::write(&path, b"abc\ndef\n").unwrap();

    let mut handle = session.handle(bytes(&path));
    handle.open_file("r", 0).await.unwrap();

    assert_eq!(handle.seek(-100, Whence::Set).await.unwrap(), 0);
    assert_eq!(handle.tell().unwrap(), 0);

    assert_eq!(handle.seek(-100, Whence::End).await.unwrap(), 0);
    assert_eq!(handle.seek(5, Whence::Set).await.unwrap(), 5);
    assert_eq!(handle.seek(-10, Whence::Cur).await.unwrap(), 0);
}

#[tokio::test]
async fn seek_discards_read_ahead() {
    let tempdir = tempdir();
    let (_transport, session) = connected().await;
    let path = tempdir.path().join("file");
    fs::write(&path, b"abc\ndef\nghi\n").unwrap();

    let mut handle = session.handle(bytes(&path));
    handle.open_file("r", 0).await.unwrap();

    assert_eq!(&handle.gets().await.unwrap().unwrap()[..], b"abc\n");
    // The whole file was fetched at once, the rest is read-ahead.
    assert_eq!(handle.tell().unwrap(), 4);

    handle.rewind().await.unwrap();
    assert_eq!(&handle.gets().await.unwrap().unwrap()[..], b"abc\n");

    handle.seek(8, Whence::Set).await.unwrap();
    assert_eq!(&handle.gets().await.unwrap().unwrap()[..], b"ghi\n");
    assert_eq!(handle.gets().await.unwrap(), None);
    assert!(handle.eof().unwrap());

    assert_eq!(handle.set_pos(-8).await.unwrap(), 4);
    assert!(!handle.eof().unwrap());
    assert_eq!(&handle.gets().await.unwrap().unwrap()[..], b"def\n");
}

#[tokio::test]
async fn seek_cur_is_relative_to_protocol_cursor() {
    let tempdir = tempdir();
    let (_transport, session) = connected().await;
    let path = tempdir.path().join("file");
    fs::write(&path, b"abc\ndef\n").unwrap();

    let mut handle = session.handle(bytes(&path));
    handle.open_file("r", 0).await.unwrap();

    handle.gets().await.unwrap();
    assert_eq!(handle.tell().unwrap(), 4);

    assert_eq!(handle.seek(0, Whence::Cur).await.unwrap(), 8);
    assert_eq!(handle.tell().unwrap(), 8);
}

#[tokio::test]
async fn write_lands_at_consumed_position() {
    let tempdir = tempdir();
    let (_transport, session) = connected().await;
    let path = tempdir.path().join("file");
    fs::write(&path, b"ab\ncdef").unwrap();

    let mut handle = session.handle(bytes(&path));
    handle.open_file("r+", 0).await.unwrap();

    // Leaves "cdef" as read-ahead.
    assert_eq!(&handle.gets().await.unwrap().unwrap()[..], b"ab\n");
    assert_eq!(handle.write(b"XY").await.unwrap(), 2);
    assert_eq!(handle.tell().unwrap(), 5);
    assert_eq!(&handle.read_to_end().await.unwrap()[..], b"ef");

    assert_eq!(fs::read(&path).unwrap(), b"ab\nXYef");
}

#[tokio::test]
async fn append_mode() {
    let tempdir = tempdir();
    let (_transport, session) = connected().await;
    let path = tempdir.path().join("file");
    fs::write(&path, b"abc").unwrap();

    let mut handle = session.handle(bytes(&path));
    handle.open_file("a", 0).await.unwrap();
    handle.write(b"def").await.unwrap();
    handle.close().await.unwrap();

    assert_eq!(fs::read(&path).unwrap(), b"abcdef");
}

#[tokio::test]
async fn sync_resets_eof() {
    let tempdir = tempdir();
    let (_transport, session) = connected().await;
    let path = tempdir.path().join("file");

    let mut handle = session.handle(bytes(&path));
    handle.open_file("w+", 0).await.unwrap();
    handle.write(b"line\n").await.unwrap();

    assert_eq!(handle.gets().await.unwrap(), None);
    assert!(handle.eof().unwrap());

    handle.sync().await.unwrap();
    assert!(!handle.eof().unwrap());
    assert_eq!(handle.tell().unwrap(), 5);
}

#[tokio::test]
async fn sync_requires_extension() {
    let tempdir = tempdir();
    let sftp = MockSftp::with_extensions(ServerExtensions {
        fsync: false,
        ..Default::default()
    });
    let (_transport, session) = session_with(sftp, SftpOptions::new());
    session.connect().await.unwrap();

    let mut handle = session.handle(bytes(&tempdir.path().join("file")));
    handle.open_file("w", 0).await.unwrap();

    let err = handle.sync().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Unsupported);
}

#[tokio::test]
async fn stat_and_setstat() {
    let tempdir = tempdir();
    let (_transport, session) = connected().await;
    let path = tempdir.path().join("file");
    fs::write(&path, b"0123456789").unwrap();

    let mut handle = session.handle(bytes(&path));
    handle.open_file("r+", 0).await.unwrap();

    let metadata = handle.stat().await.unwrap();
    assert_eq!(metadata.len(), Some(10));
    assert_eq!(metadata.is_file(), Some(true));

    handle
        .setstat(MetaDataBuilder::new().len(3).create())
        .await
        .unwrap();
    assert_eq!(session.fstat(&handle).await.unwrap().len(), Some(3));
    assert_eq!(handle.seek(0, Whence::End).await.unwrap(), 3);
}

#[tokio::test]
async fn download_and_upload() {
    let tempdir = tempdir();
    let (_transport, session) = connected_with(small_io()).await;
    let data = content(123);

    let remote = tempdir.path().join("remote");
    fs::write(&remote, &data).unwrap();
    let local = tempdir.path().join("local");

    let mut handle = session.handle(bytes(&remote));
    handle.open_file("r", 0).await.unwrap();
    handle.gets().await.unwrap();

    assert_eq!(handle.download(&local).await.unwrap(), data.len() as u64);
    assert_eq!(fs::read(&local).unwrap(), data);
    assert!(handle.eof().unwrap());
    handle.close().await.unwrap();

    let uploaded = tempdir.path().join("uploaded");
    let mut handle = session.handle(bytes(&uploaded));
    handle.open_file("w", 0).await.unwrap();

    assert_eq!(handle.upload(&local).await.unwrap(), data.len() as u64);
    handle.close().await.unwrap();

    assert_eq!(fs::read(&uploaded).unwrap(), data);
}

#[tokio::test]
async fn upload_truncates_longer_remote_file() {
    let tempdir = tempdir();
    let (_transport, session) = connected_with(small_io()).await;

    let remote = tempdir.path().join("remote");
    fs::write(&remote, b"hello world, and then some").unwrap();
    let local = tempdir.path().join("local");
    fs::write(&local, b"hi there").unwrap();

    let mut handle = session.handle(bytes(&remote));
    handle.open_file("r+", 0).await.unwrap();

    assert_eq!(handle.upload(&local).await.unwrap(), 8);
    assert_eq!(handle.stat().await.unwrap().len(), Some(8));
    handle.close().await.unwrap();

    assert_eq!(fs::read(&remote).unwrap(), b"hi there");
}

#[tokio::test]
async fn drop_releases_remote_handle() {
    let tempdir = tempdir();
    let (transport, session) = connected().await;

    let mut handle = session.handle(bytes(tempdir.path()));
    handle.open_dir().await.unwrap();
    assert_eq!(transport.sftp.server().handles_open(), 1);

    drop(handle);

    // The release goes out, at the latest, with the next request.
    session.exist(bytes(tempdir.path())).await.unwrap();

    assert_eq!(transport.sftp.server().handles_open(), 0);
    assert_eq!(transport.sftp.server().handles_closed(), 1);
}

#[tokio::test]
async fn handle_of_previous_connection_is_never_released() {
    let tempdir = tempdir();
    let (transport, session) = connected().await;

    let mut handle = session.handle(bytes(tempdir.path()));
    handle.open_dir().await.unwrap();

    session.close().await.unwrap();
    assert!(handle.closed());
    assert!(matches!(handle.read_entry().await, Err(Error::NotConnected)));

    session.connect().await.unwrap();
    assert!(handle.closed());

    handle.close().await.unwrap();
    drop(handle);
    session.exist(bytes(tempdir.path())).await.unwrap();

    // OPENDIR and STAT only.
    assert_eq!(transport.sftp.server().requests(), 2);
}

#[tokio::test]
async fn close_on_dead_transport_sends_nothing() {
    let tempdir = tempdir();
    let (transport, session) = connected().await;

    let mut handle = session.handle(bytes(tempdir.path()));
    handle.open_dir().await.unwrap();

    transport.set_alive(false);
    assert!(handle.closed());
    handle.close().await.unwrap();

    transport.set_alive(true);
    session.exist(bytes(tempdir.path())).await.unwrap();

    assert_eq!(transport.sftp.server().requests(), 2);
    assert_eq!(transport.sftp.server().handles_closed(), 0);
}
