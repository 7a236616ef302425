//! Drives the subsystem end-to-end with a scripted client over an
//! in-memory pipe.

use async_compat::{Compat, CompatExt};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use digest::Digest;
use futures::{AsyncReadExt, AsyncWriteExt};
use hawser_sftp::{SftpConfig, Subsystem};
use md5::Md5;
use tokio::io::{ReadHalf, WriteHalf};

type Reader = Compat<ReadHalf<tokio::io::DuplexStream>>;
type Writer = Compat<WriteHalf<tokio::io::DuplexStream>>;

const SSH_FXP_INIT: u8 = 1;
const SSH_FXP_VERSION: u8 = 2;
const SSH_FXP_OPEN: u8 = 3;
const SSH_FXP_CLOSE: u8 = 4;
const SSH_FXP_READ: u8 = 5;
const SSH_FXP_WRITE: u8 = 6;
const SSH_FXP_SETSTAT: u8 = 9;
const SSH_FXP_OPENDIR: u8 = 11;
const SSH_FXP_READDIR: u8 = 12;
const SSH_FXP_REMOVE: u8 = 13;
const SSH_FXP_STAT: u8 = 17;
const SSH_FXP_EXTENDED: u8 = 200;

const SSH_FXP_STATUS: u8 = 101;
const SSH_FXP_HANDLE: u8 = 102;
const SSH_FXP_DATA: u8 = 103;
const SSH_FXP_NAME: u8 = 104;
const SSH_FXP_ATTRS: u8 = 105;
const SSH_FXP_EXTENDED_REPLY: u8 = 201;

const SSH_FX_OK: u32 = 0;
const SSH_FX_EOF: u32 = 1;
const SSH_FX_NO_SUCH_FILE: u32 = 2;

fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();
}

/// Split a duplex pipe and run the subsystem on one end.
fn spawn_subsystem(config: SftpConfig) -> (Reader, Writer, tokio::task::JoinHandle<bool>) {
    let (client, server) = tokio::io::duplex(0x100000);

    let (server_read, server_write) = tokio::io::split(server);
    let worker = tokio::spawn(async move {
        Subsystem::new(config)
            .run(server_read.compat(), server_write.compat())
            .await
            .is_ok()
    });

    let (client_read, client_write) = tokio::io::split(client);

    (client_read.compat(), client_write.compat(), worker)
}

trait PutStr: BufMut {
    fn put_str(&mut self, s: &[u8]) {
        self.put_u32(s.len() as u32);
        self.put_slice(s);
    }
}

impl<B: BufMut> PutStr for B {}

async fn send(writer: &mut Writer, body: BytesMut) {
    let body = body.freeze();

    let mut packet = BytesMut::new();
    packet.put_u32(body.len() as u32);
    packet.put_slice(&body);

    writer.write_all(&packet).await.expect("send failed");
    writer.flush().await.expect("flush failed");
}

async fn recv(reader: &mut Reader) -> Bytes {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix).await.expect("recv failed");

    let mut body = vec![0u8; u32::from_be_bytes(prefix) as usize];
    reader.read_exact(&mut body).await.expect("recv failed");

    Bytes::from(body)
}

fn get_str(buf: &mut Bytes) -> Bytes {
    let len = buf.get_u32() as usize;

    buf.copy_to_bytes(len)
}

async fn handshake(reader: &mut Reader, writer: &mut Writer, version: u32) -> u32 {
    let mut body = BytesMut::new();
    body.put_u8(SSH_FXP_INIT);
    body.put_u32(version);
    send(writer, body).await;

    let mut reply = recv(reader).await;
    assert_eq!(reply.get_u8(), SSH_FXP_VERSION);

    reply.get_u32()
}

async fn expect_status(reader: &mut Reader, id: u32) -> u32 {
    let mut reply = recv(reader).await;

    assert_eq!(reply.get_u8(), SSH_FXP_STATUS);
    assert_eq!(reply.get_u32(), id);

    reply.get_u32()
}

async fn expect_handle(reader: &mut Reader, id: u32) -> Bytes {
    let mut reply = recv(reader).await;

    assert_eq!(reply.get_u8(), SSH_FXP_HANDLE);
    assert_eq!(reply.get_u32(), id);

    get_str(&mut reply)
}

#[tokio::test]
async fn it_negotiates_the_lower_version() {
    init();

    let (mut reader, mut writer, worker) = spawn_subsystem(SftpConfig::default());

    assert_eq!(handshake(&mut reader, &mut writer, 3).await, 3);

    drop(writer);
    assert!(worker.await.expect("The subsystem panicked"));
}

#[tokio::test]
async fn it_uploads_then_reads_back() {
    init();

    const ACE4_READ_DATA: u32 = 0x1;
    const ACE4_WRITE_DATA: u32 = 0x2;
    const SSH_FXF_CREATE_NEW: u32 = 0x0;
    const SSH_FXF_OPEN_EXISTING: u32 = 0x2;

    let dir = tempfile::tempdir().expect("Cannot create a scratch directory");
    let path = dir.path().join("payload.bin");
    let path = path.to_str().expect("The path is not UTF-8");

    let (mut reader, mut writer, worker) = spawn_subsystem(SftpConfig::default());
    assert_eq!(handshake(&mut reader, &mut writer, 6).await, 6);

    let payload: Vec<u8> = (0..0x100000).map(|_| rand::random()).collect();

    // OPEN for writing, version 6 style: CREATE_NEW disposition.
    let mut body = BytesMut::new();
    body.put_u8(SSH_FXP_OPEN);
    body.put_u32(1);
    body.put_str(path.as_bytes());
    body.put_u32(ACE4_WRITE_DATA);
    body.put_u32(SSH_FXF_CREATE_NEW);
    body.put_u32(0); // empty attrs
    body.put_u8(0); // type byte (version >= 4)
    send(&mut writer, body).await;
    let handle = expect_handle(&mut reader, 1).await;

    for (index, chunk) in payload.chunks(0x8000).enumerate() {
        let mut body = BytesMut::new();
        body.put_u8(SSH_FXP_WRITE);
        body.put_u32(2 + index as u32);
        body.put_str(&handle);
        body.put_u64((index * 0x8000) as u64);
        body.put_str(chunk);
        send(&mut writer, body).await;

        assert_eq!(expect_status(&mut reader, 2 + index as u32).await, SSH_FX_OK);
    }

    let mut body = BytesMut::new();
    body.put_u8(SSH_FXP_CLOSE);
    body.put_u32(100);
    body.put_str(&handle);
    send(&mut writer, body).await;
    assert_eq!(expect_status(&mut reader, 100).await, SSH_FX_OK);

    // Re-open for reading and drain the whole file.
    let mut body = BytesMut::new();
    body.put_u8(SSH_FXP_OPEN);
    body.put_u32(101);
    body.put_str(path.as_bytes());
    body.put_u32(ACE4_READ_DATA);
    body.put_u32(SSH_FXF_OPEN_EXISTING);
    body.put_u32(0);
    body.put_u8(0);
    send(&mut writer, body).await;
    let handle = expect_handle(&mut reader, 101).await;

    let mut contents = Vec::new();
    let mut request = 102u32;

    loop {
        let mut body = BytesMut::new();
        body.put_u8(SSH_FXP_READ);
        body.put_u32(request);
        body.put_str(&handle);
        body.put_u64(contents.len() as u64);
        body.put_u32(0x4000);
        send(&mut writer, body).await;

        let mut reply = recv(&mut reader).await;
        match reply.get_u8() {
            SSH_FXP_DATA => {
                assert_eq!(reply.get_u32(), request);
                contents.extend_from_slice(&get_str(&mut reply));
            }
            SSH_FXP_STATUS => {
                assert_eq!(reply.get_u32(), request);
                assert_eq!(reply.get_u32(), SSH_FX_EOF);
                break;
            }
            kind => panic!("Unexpected reply of type {kind}"),
        }

        request += 1;
    }

    assert_eq!(contents, payload);

    let mut body = BytesMut::new();
    body.put_u8(SSH_FXP_CLOSE);
    body.put_u32(200);
    body.put_str(&handle);
    send(&mut writer, body).await;
    assert_eq!(expect_status(&mut reader, 200).await, SSH_FX_OK);

    // REMOVE, then STAT answers "no such file".
    let mut body = BytesMut::new();
    body.put_u8(SSH_FXP_REMOVE);
    body.put_u32(201);
    body.put_str(path.as_bytes());
    send(&mut writer, body).await;
    assert_eq!(expect_status(&mut reader, 201).await, SSH_FX_OK);

    let mut body = BytesMut::new();
    body.put_u8(SSH_FXP_STAT);
    body.put_u32(202);
    body.put_str(path.as_bytes());
    send(&mut writer, body).await;
    assert_eq!(expect_status(&mut reader, 202).await, SSH_FX_NO_SUCH_FILE);

    drop(writer);
    assert!(worker.await.expect("The subsystem panicked"));
}

#[tokio::test]
async fn it_round_trips_attributes() {
    init();

    const ATTR_SIZE: u32 = 0x1;
    const ATTR_PERMISSIONS: u32 = 0x4;
    const ATTR_ACMODTIME: u32 = 0x8;

    let dir = tempfile::tempdir().expect("Cannot create a scratch directory");
    let path = dir.path().join("attrs.txt");
    std::fs::write(&path, b"attribute round-trip").expect("Cannot seed the file");
    let path = path.to_str().expect("The path is not UTF-8");

    let (mut reader, mut writer, worker) = spawn_subsystem(SftpConfig::default());
    assert_eq!(handshake(&mut reader, &mut writer, 3).await, 3);

    // SETSTAT: permissions and both timestamps, version 3 layout.
    let mut body = BytesMut::new();
    body.put_u8(SSH_FXP_SETSTAT);
    body.put_u32(1);
    body.put_str(path.as_bytes());
    body.put_u32(ATTR_PERMISSIONS | ATTR_ACMODTIME);
    body.put_u32(0o640);
    body.put_u32(1_700_000_000);
    body.put_u32(1_700_000_100);
    send(&mut writer, body).await;
    assert_eq!(expect_status(&mut reader, 1).await, SSH_FX_OK);

    // STAT: the answered attributes contain what was set.
    let mut body = BytesMut::new();
    body.put_u8(SSH_FXP_STAT);
    body.put_u32(2);
    body.put_str(path.as_bytes());
    send(&mut writer, body).await;

    let mut reply = recv(&mut reader).await;
    assert_eq!(reply.get_u8(), SSH_FXP_ATTRS);
    assert_eq!(reply.get_u32(), 2);

    let flags = reply.get_u32();
    assert!(flags & ATTR_SIZE != 0);
    let _size = reply.get_u64();

    let (_uid, _gid) = (reply.get_u32(), reply.get_u32());

    assert!(flags & ATTR_PERMISSIONS != 0);
    let permissions = reply.get_u32();
    assert_eq!(permissions & 0o7777, 0o640);

    assert!(flags & ATTR_ACMODTIME != 0);
    assert_eq!(reply.get_u32(), 1_700_000_000);
    assert_eq!(reply.get_u32(), 1_700_000_100);

    drop(writer);
    assert!(worker.await.expect("The subsystem panicked"));
}

#[tokio::test]
async fn it_quick_checks_md5_requests() {
    init();

    let dir = tempfile::tempdir().expect("Cannot create a scratch directory");
    let path = dir.path().join("hashme.txt");
    std::fs::write(&path, b"the quick brown fox").expect("Cannot seed the file");
    let path = path.to_str().expect("The path is not UTF-8");

    let expected = Md5::digest(b"the quick brown fox");

    let (mut reader, mut writer, worker) = spawn_subsystem(SftpConfig::default());
    assert_eq!(handshake(&mut reader, &mut writer, 6).await, 6);

    let md5_request = |id: u32, quick_check: &[u8]| {
        let mut body = BytesMut::new();
        body.put_u8(SSH_FXP_EXTENDED);
        body.put_u32(id);
        body.put_str(b"md5-hash");
        body.put_str(path.as_bytes());
        body.put_u64(0);
        body.put_u64(0);
        body.put_str(quick_check);

        body
    };

    // A mismatching quick-check hash answers an empty hash.
    send(&mut writer, md5_request(1, &[0u8; 16])).await;

    let mut reply = recv(&mut reader).await;
    assert_eq!(reply.get_u8(), SSH_FXP_EXTENDED_REPLY);
    assert_eq!(reply.get_u32(), 1);
    assert_eq!(get_str(&mut reply).len(), 0);

    // A matching one answers the full hash.
    send(&mut writer, md5_request(2, &expected)).await;

    let mut reply = recv(&mut reader).await;
    assert_eq!(reply.get_u8(), SSH_FXP_EXTENDED_REPLY);
    assert_eq!(reply.get_u32(), 2);
    assert_eq!(&get_str(&mut reply)[..], &expected[..]);

    drop(writer);
    assert!(worker.await.expect("The subsystem panicked"));
}

#[tokio::test]
async fn it_only_honors_version_select_first() {
    init();

    let dir = tempfile::tempdir().expect("Cannot create a scratch directory");
    let path = dir.path().to_str().expect("The path is not UTF-8").to_owned();

    // As the first request, the selection is honored.
    {
        let (mut reader, mut writer, worker) = spawn_subsystem(SftpConfig::default());
        assert_eq!(handshake(&mut reader, &mut writer, 6).await, 6);

        let mut body = BytesMut::new();
        body.put_u8(SSH_FXP_EXTENDED);
        body.put_u32(1);
        body.put_str(b"version-select");
        body.put_str(b"3");
        send(&mut writer, body).await;
        assert_eq!(expect_status(&mut reader, 1).await, SSH_FX_OK);

        drop(writer);
        assert!(worker.await.expect("The subsystem panicked"));
    }

    // As a later request, the subsystem tears down instead of
    // answering a status.
    {
        let (mut reader, mut writer, worker) = spawn_subsystem(SftpConfig::default());
        assert_eq!(handshake(&mut reader, &mut writer, 6).await, 6);

        let mut body = BytesMut::new();
        body.put_u8(SSH_FXP_STAT);
        body.put_u32(1);
        body.put_str(path.as_bytes());
        send(&mut writer, body).await;
        let mut reply = recv(&mut reader).await;
        assert_eq!(reply.get_u8(), SSH_FXP_ATTRS);

        let mut body = BytesMut::new();
        body.put_u8(SSH_FXP_EXTENDED);
        body.put_u32(2);
        body.put_str(b"version-select");
        body.put_str(b"3");
        send(&mut writer, body).await;

        assert!(
            !worker.await.expect("The subsystem panicked"),
            "The subsystem tolerated a late version-select",
        );
    }
}

#[tokio::test]
async fn it_synthesizes_the_dot_entries() {
    init();

    let dir = tempfile::tempdir().expect("Cannot create a scratch directory");
    std::fs::write(dir.path().join("one.txt"), b"1").expect("Cannot seed the directory");
    std::fs::write(dir.path().join("two.txt"), b"2").expect("Cannot seed the directory");
    let path = dir.path().to_str().expect("The path is not UTF-8");

    let (mut reader, mut writer, worker) = spawn_subsystem(SftpConfig::default());
    assert_eq!(handshake(&mut reader, &mut writer, 3).await, 3);

    let mut body = BytesMut::new();
    body.put_u8(SSH_FXP_OPENDIR);
    body.put_u32(1);
    body.put_str(path.as_bytes());
    send(&mut writer, body).await;
    let handle = expect_handle(&mut reader, 1).await;

    let mut names = Vec::new();

    loop {
        let mut body = BytesMut::new();
        body.put_u8(SSH_FXP_READDIR);
        body.put_u32(2);
        body.put_str(&handle);
        send(&mut writer, body).await;

        let mut reply = recv(&mut reader).await;
        match reply.get_u8() {
            SSH_FXP_NAME => {
                assert_eq!(reply.get_u32(), 2);

                for _ in 0..reply.get_u32() {
                    names.push(String::from_utf8_lossy(&get_str(&mut reply)).into_owned());
                    let _longname = get_str(&mut reply);

                    // Skip the version 3 attribute block.
                    let flags = reply.get_u32();
                    if flags & 0x1 != 0 {
                        reply.get_u64();
                    }
                    if flags & 0x2 != 0 {
                        reply.get_u64();
                    }
                    if flags & 0x4 != 0 {
                        reply.get_u32();
                    }
                    if flags & 0x8 != 0 {
                        reply.get_u64();
                    }
                }
            }
            SSH_FXP_STATUS => {
                assert_eq!(reply.get_u32(), 2);
                assert_eq!(reply.get_u32(), SSH_FX_EOF);
                break;
            }
            kind => panic!("Unexpected reply of type {kind}"),
        }
    }

    assert_eq!(names.iter().filter(|name| name.as_str() == ".").count(), 1);
    assert_eq!(names.iter().filter(|name| name.as_str() == "..").count(), 1);
    assert!(names.iter().any(|name| name == "one.txt"));
    assert!(names.iter().any(|name| name == "two.txt"));

    drop(writer);
    assert!(worker.await.expect("The subsystem panicked"));
}
