use ssh_sftp_client::*;

use std::fs;

use pretty_assertions::assert_eq;

mod common;
use common::*;

fn populate(tempdir: &TempDir, names: &[&str]) {
    for name in names {
        fs::write(tempdir.path().join(name), name.as_bytes()).unwrap();
    }
}

fn filenames(entries: &[DirEntry]) -> Vec<&[u8]> {
    entries.iter().map(|entry| &entry.filename()[..]).collect()
}

#[tokio::test]
async fn entries_lists_every_file() {
    let tempdir = tempdir();
    populate(&tempdir, &["a", "b", "c", "d", "e"]);
    fs::create_dir(tempdir.path().join("sub")).unwrap();

    let (transport, session) = connected().await;

    let entries = session.dir().entries(bytes(tempdir.path())).await.unwrap();

    assert_eq!(
        filenames(&entries),
        [&b"a"[..], b"b", b"c", b"d", b"e", b"sub"]
    );

    let file = &entries[0];
    assert_eq!(file.metadata().len(), Some(1));
    assert_eq!(file.file_type().map(|ty| ty.is_file()), Some(true));
    assert!(file.longname().ends_with(b" a"));

    let sub = &entries[5];
    assert_eq!(sub.metadata().is_dir(), Some(true));

    assert_eq!(transport.sftp.server().handles_open(), 0);
    assert_eq!(transport.sftp.server().handles_closed(), 1);
}

#[tokio::test]
async fn foreach_stops_when_asked() {
    let tempdir = tempdir();
    populate(&tempdir, &["a", "b", "c", "d", "e"]);

    let (transport, session) = connected().await;

    let mut seen = Vec::new();
    session
        .dir()
        .foreach(bytes(tempdir.path()), |entry| {
            seen.push(entry.filename().clone());
            seen.len() < 2
        })
        .await
        .unwrap();

    assert_eq!(seen, [&b"a"[..], b"b"]);
    assert_eq!(transport.sftp.server().handles_open(), 0);
}

#[tokio::test]
async fn foreach_on_missing_dir() {
    let tempdir = tempdir();
    let (_transport, session) = connected().await;

    let err = session
        .dir()
        .entries(bytes(&tempdir.path().join("missing")))
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Path);
}

#[tokio::test]
async fn read_entry_until_exhausted() {
    let tempdir = tempdir();
    populate(&tempdir, &["a", "b", "c", "d"]);

    let (_transport, session) = connected().await;

    let mut handle = session.handle(bytes(tempdir.path()));
    handle.open_dir().await.unwrap();

    let mut names = Vec::new();
    while let Some(entry) = handle.read_entry().await.unwrap() {
        names.push(entry.into_inner().filename);
    }

    assert_eq!(names, [&b"a"[..], b"b", b"c", b"d"]);
    assert!(handle.eof().unwrap());
    assert!(handle.read_entry().await.unwrap().is_none());

    handle.close().await.unwrap();
}

#[tokio::test]
async fn file_factory_opens_files() {
    let tempdir = tempdir();
    let path = tempdir.path().join("file");

    let (_transport, session) = connected().await;
    let files = session.file();

    let mut handle = files.open(bytes(&path), "w+", 0o640).await.unwrap();
    assert_eq!(handle.kind(), Some(HandleKind::File));

    handle.write(b"hello\n").await.unwrap();
    handle.rewind().await.unwrap();
    assert_eq!(&handle.readline().await.unwrap()[..], b"hello\n");
    handle.close().await.unwrap();

    let err = files.open(bytes(&path), "x", 0).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Unsupported);

    assert_eq!(files.is_directory(bytes(&path)).await.unwrap(), Some(false));
    assert_eq!(
        files.is_directory(bytes(tempdir.path())).await.unwrap(),
        Some(true)
    );
}
