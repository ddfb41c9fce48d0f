//! End-to-end streaming over real TCP sockets

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use mjpeg_rs::broadcast::{FrameBuffer, Publisher};
use mjpeg_rs::multipart::{encode_part, Boundary};
use mjpeg_rs::server::{MjpegServer, ServerConfig};
use mjpeg_rs::stats::ServerMetrics;

const TIMEOUT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    buffer: Arc<FrameBuffer>,
    publisher: Publisher,
    metrics: Arc<ServerMetrics>,
    shutdown: CancellationToken,
    handle: JoinHandle<mjpeg_rs::Result<()>>,
}

async fn start(config: ServerConfig) -> TestServer {
    let buffer = Arc::new(FrameBuffer::new());
    let server = MjpegServer::new(config, Arc::clone(&buffer));
    let metrics = server.metrics();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();

    let token = shutdown.clone();
    let handle = tokio::spawn(async move { server.serve(listener, token).await });

    TestServer {
        addr,
        publisher: Publisher::jpeg(Arc::clone(&buffer)),
        buffer,
        metrics,
        shutdown,
        handle,
    }
}

impl TestServer {
    async fn stop(self) {
        self.shutdown.cancel();
        tokio::time::timeout(TIMEOUT, self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

/// HTTP/1.0 keeps the body close-delimited, so parts arrive unchunked
async fn send_request(stream: &mut TcpStream, method: &str, path: &str) {
    let head = format!("{} {} HTTP/1.0\r\nHost: localhost\r\n\r\n", method, path);
    stream.write_all(head.as_bytes()).await.unwrap();
}

async fn request(addr: SocketAddr, path: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    send_request(&mut stream, "GET", path).await;
    stream
}

/// Read up to and including the blank line, lowercased
async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    tokio::time::timeout(TIMEOUT, async {
        while !head.ends_with(b"\r\n\r\n") {
            head.push(stream.read_u8().await.unwrap());
        }
    })
    .await
    .expect("no response head");
    String::from_utf8(head).unwrap().to_ascii_lowercase()
}

fn status(head: &str) -> u16 {
    head.split_whitespace().nth(1).unwrap().parse().unwrap()
}

async fn read_len(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    tokio::time::timeout(TIMEOUT, stream.read_exact(&mut out))
        .await
        .expect("read timed out")
        .unwrap();
    out
}

/// Read one part and return its payload
async fn read_payload(stream: &mut TcpStream) -> Vec<u8> {
    let header = read_head(stream).await;
    let len: usize = header
        .lines()
        .find_map(|line| line.strip_prefix("content-length: "))
        .expect("part without content-length")
        .trim()
        .parse()
        .unwrap();

    let mut payload = read_len(stream, len + 2).await;
    assert_eq!(&payload[len..], b"\r\n");
    payload.truncate(len);
    payload
}

async fn read_to_end(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    tokio::time::timeout(TIMEOUT, stream.read_to_end(&mut out))
        .await
        .expect("read timed out")
        .unwrap();
    out
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

fn part(data: &[u8]) -> Vec<u8> {
    encode_part(&Boundary::default(), "image/jpeg", data).to_vec()
}

#[tokio::test]
async fn test_late_joiner_gets_latest_then_updates() {
    let server = start(ServerConfig::default()).await;

    server.publisher.publish(&b"frame-1"[..]).unwrap();
    server.publisher.publish(&b"frame-2"[..]).unwrap();

    let mut client = request(server.addr, "/").await;
    let head = read_head(&mut client).await;
    assert_eq!(status(&head), 200);
    assert!(head.contains("content-type: multipart/x-mixed-replace; boundary=mjpegboundary\r\n"));
    assert!(head.contains("cache-control: no-cache, no-store, must-revalidate\r\n"));

    // Only the newest frame is delivered on connect
    let expected = part(b"frame-2");
    assert_eq!(read_len(&mut client, expected.len()).await, expected);

    server.publisher.publish(&b"frame-3"[..]).unwrap();
    let expected = part(b"frame-3");
    assert_eq!(read_len(&mut client, expected.len()).await, expected);

    server.stop().await;
}

#[tokio::test]
async fn test_every_client_receives_the_same_frame() {
    let server = start(ServerConfig::default()).await;

    let mut first = request(server.addr, "/").await;
    let mut second = request(server.addr, "/video").await;
    read_head(&mut first).await;
    read_head(&mut second).await;

    let buffer = Arc::clone(&server.buffer);
    wait_until(|| buffer.subscriber_count() == 2).await;

    server.publisher.publish(&b"shared"[..]).unwrap();
    let expected = part(b"shared");
    assert_eq!(read_len(&mut first, expected.len()).await, expected);
    assert_eq!(read_len(&mut second, expected.len()).await, expected);

    server.stop().await;
}

#[tokio::test]
async fn test_disconnect_releases_subscriber() {
    let server = start(ServerConfig::default()).await;

    let mut client = request(server.addr, "/").await;
    read_head(&mut client).await;

    let buffer = Arc::clone(&server.buffer);
    wait_until(|| buffer.subscriber_count() == 1).await;

    drop(client);

    // The gone client is noticed on the next failed write
    let deadline = Instant::now() + TIMEOUT;
    while server.buffer.subscriber_count() > 0 {
        assert!(Instant::now() < deadline, "subscriber never released");
        server.publisher.publish(vec![0u8; 64 * 1024]).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(server.metrics.active_streams(), 0);
    server.stop().await;
}

#[tokio::test]
async fn test_half_closed_client_keeps_streaming() {
    let server = start(ServerConfig::default()).await;

    let mut client = request(server.addr, "/").await;
    read_head(&mut client).await;

    let buffer = Arc::clone(&server.buffer);
    wait_until(|| buffer.subscriber_count() == 1).await;

    // Done sending; the server sees EOF on its read side
    client.shutdown().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    server.publisher.publish(&b"after-eof"[..]).unwrap();
    let expected = part(b"after-eof");
    assert_eq!(read_len(&mut client, expected.len()).await, expected);
    assert_eq!(server.buffer.subscriber_count(), 1);

    server.stop().await;
}

#[tokio::test]
async fn test_client_sending_after_request_still_streams() {
    let server = start(ServerConfig::default()).await;

    let mut client = request(server.addr, "/").await;
    read_head(&mut client).await;
    let (mut reader, mut writer) = client.into_split();

    // Bytes after the request head are never read and never delay frames
    let chatter = tokio::spawn(async move {
        for _ in 0..64 {
            if writer.write_all(&[b'x'; 512]).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        writer
    });

    for i in 0..10u8 {
        server.publisher.publish(vec![i; 32]).unwrap();
        let expected = part(&[i; 32]);
        let mut got = vec![0u8; expected.len()];
        tokio::time::timeout(TIMEOUT, reader.read_exact(&mut got))
            .await
            .expect("frame starved")
            .unwrap();
        assert_eq!(got, expected);
    }

    let _writer = chatter.await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn test_stalled_client_does_not_hold_back_others() {
    let config = ServerConfig::default().write_timeout(Duration::from_millis(200));
    let server = start(config).await;

    let mut healthy = request(server.addr, "/").await;
    read_head(&mut healthy).await;

    // Small receive window, and nothing is ever read
    let socket = TcpSocket::new_v4().unwrap();
    socket.set_recv_buffer_size(4096).unwrap();
    let mut stalled = socket.connect(server.addr).await.unwrap();
    send_request(&mut stalled, "GET", "/").await;

    let buffer = Arc::clone(&server.buffer);
    wait_until(|| buffer.subscriber_count() == 2).await;

    let frame = vec![0xAB; 1024 * 1024];
    let deadline = Instant::now() + TIMEOUT;
    while server.metrics.snapshot().failed_streams == 0 {
        assert!(Instant::now() < deadline, "stalled stream never failed");

        let started = Instant::now();
        server.publisher.publish(frame.clone()).unwrap();
        assert!(started.elapsed() < Duration::from_millis(50), "publish blocked");

        assert_eq!(read_payload(&mut healthy).await.len(), frame.len());
    }

    let buffer = Arc::clone(&server.buffer);
    wait_until(|| buffer.subscriber_count() == 1).await;
    let stats = server.metrics.snapshot();
    assert_eq!(stats.failed_streams, 1);
    assert_eq!(stats.active_streams, 1);

    // The healthy client is unaffected
    server.publisher.publish(&b"still-here"[..]).unwrap();
    assert_eq!(read_payload(&mut healthy).await, b"still-here");

    drop(stalled);
    server.stop().await;
}

#[tokio::test]
async fn test_source_end_closes_streams() {
    let server = start(ServerConfig::default()).await;
    server.publisher.publish(&b"last"[..]).unwrap();

    let mut client = request(server.addr, "/").await;
    read_head(&mut client).await;
    let expected = part(b"last");
    assert_eq!(read_len(&mut client, expected.len()).await, expected);

    server.publisher.close();
    assert!(read_to_end(&mut client).await.is_empty());

    // New requests are refused once the source is gone
    let mut late = request(server.addr, "/").await;
    assert_eq!(status(&read_head(&mut late).await), 503);

    server.stop().await;
}

#[tokio::test]
async fn test_connection_limit() {
    let server = start(ServerConfig::default().max_connections(1)).await;

    let mut admitted = request(server.addr, "/").await;
    assert_eq!(status(&read_head(&mut admitted).await), 200);

    let mut refused = request(server.addr, "/").await;
    let head = read_head(&mut refused).await;
    assert_eq!(status(&head), 503);
    assert_eq!(server.metrics.snapshot().rejected_connections, 1);

    server.stop().await;
}

#[tokio::test]
async fn test_wrong_method_and_path() {
    let server = start(ServerConfig::default().stream_path("/stream")).await;

    let mut post = TcpStream::connect(server.addr).await.unwrap();
    send_request(&mut post, "POST", "/stream").await;
    assert_eq!(status(&read_head(&mut post).await), 405);

    let mut other = request(server.addr, "/elsewhere").await;
    assert_eq!(status(&read_head(&mut other).await), 404);

    let mut ok = request(server.addr, "/stream?fps=10").await;
    assert_eq!(status(&read_head(&mut ok).await), 200);

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_ends_open_streams() {
    let server = start(ServerConfig::default()).await;

    let mut client = request(server.addr, "/").await;
    read_head(&mut client).await;

    let buffer = Arc::clone(&server.buffer);
    wait_until(|| buffer.subscriber_count() == 1).await;

    let buffer = Arc::clone(&server.buffer);
    server.stop().await;

    assert!(read_to_end(&mut client).await.is_empty());
    assert_eq!(buffer.subscriber_count(), 0);
}
