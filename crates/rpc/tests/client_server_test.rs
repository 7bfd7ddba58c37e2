use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use docflow_protocol::{
    AddHeading, CorrelationId, DocumentId, DocumentService, DocumentServiceExt, ErrorKind,
    ExtractText, Operation, Outcome, Reply, RequestEnvelope, ResponseEnvelope, Session,
};
use docflow_rpc::protocol::{IncomingRequest, codec};
use docflow_rpc::{
    ConnectionError, Error, Frame, FrameCodec, FrameType, ProtocolError, RpcClient, RpcServer,
    ServerConfig,
};
use docflow_service_memory::MemoryService;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tempfile::tempdir;
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf, duplex};
use tokio::net::TcpListener;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing_test::traced_test;

type PeerReader = FramedRead<ReadHalf<DuplexStream>, FrameCodec>;
type PeerWriter = FramedWrite<WriteHalf<DuplexStream>, FrameCodec>;

async fn start_server() -> (SocketAddr, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = RpcServer::new(MemoryService::new(), ServerConfig::default());
    let shutdown = server.shutdown_token();

    tokio::spawn(server.serve_listener(listener));

    (addr, shutdown)
}

/// The far end of an in-memory connection, driven by hand.
fn peer(stream: DuplexStream) -> (PeerReader, PeerWriter) {
    let (read_half, write_half) = tokio::io::split(stream);
    (
        FramedRead::new(read_half, FrameCodec::new()),
        FramedWrite::new(write_half, FrameCodec::new()),
    )
}

async fn next_request(reader: &mut PeerReader) -> RequestEnvelope {
    let frame = reader.next().await.unwrap().unwrap();
    assert_eq!(frame.frame_type, FrameType::Request);

    match codec::decode_request(&frame.payload).unwrap() {
        IncomingRequest::Valid(request) => request,
        IncomingRequest::Rejected { error, .. } => panic!("request rejected: {error}"),
    }
}

async fn respond(writer: &mut PeerWriter, id: CorrelationId, outcome: Outcome) {
    let payload = codec::encode(&ResponseEnvelope::new(id, Ok(outcome))).unwrap();
    writer
        .send(Frame::new(FrameType::Response, payload))
        .await
        .unwrap();
}

fn extract(document_id: &str) -> Operation {
    ExtractText {
        document_id: DocumentId::from(document_id),
    }
    .into()
}

fn serve_in_memory() -> (Arc<RpcServer<MemoryService>>, PeerReader, PeerWriter) {
    let (client_side, server_side) = duplex(64 * 1024);
    let server = Arc::new(RpcServer::new(MemoryService::new(), ServerConfig::default()));

    let serving = Arc::clone(&server);
    tokio::spawn(async move { serving.serve_connection(server_side).await });

    let (reader, writer) = peer(client_side);
    (server, reader, writer)
}

#[tokio::test]
async fn test_document_scenario_over_tcp() {
    let (addr, shutdown) = start_server().await;
    let client = RpcClient::connect(addr).await.unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.docx");

    let saved = path.clone();
    Session::create(client.clone())
        .await
        .unwrap()
        .run(|document| async move {
            document.add_heading("Title", 1).await?;
            document
                .add_table(vec![
                    vec!["A".to_string(), "B".to_string()],
                    vec!["1".to_string(), "2".to_string()],
                ])
                .await?;
            document.save(&saved).await
        })
        .await
        .unwrap();

    assert!(client.list_documents().await.unwrap().is_empty());

    let reopened = client.open_document(&path).await.unwrap();
    let text = client.extract_text(&reopened).await.unwrap();
    client.close_document(&reopened).await.unwrap();

    assert_eq!(text, "Title\nA\tB\n1\t2");
    assert_eq!(client.pending_requests(), 0);
    shutdown.cancel();
}

#[tokio::test]
async fn test_service_errors_are_not_transport_errors() {
    let (addr, shutdown) = start_server().await;
    let client = RpcClient::connect(addr).await.unwrap();

    let err = client
        .close_document(&DocumentId::from("missing"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Service(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidHandle);
    assert!(!err.is_transport());
    assert!(client.is_connected());
    shutdown.cancel();
}

#[tokio::test]
async fn test_many_concurrent_requests() {
    let (addr, shutdown) = start_server().await;
    let client = RpcClient::connect(addr).await.unwrap();
    let id = client.create_document().await.unwrap();

    let writes = (0..20).map(|index| {
        let client = client.clone();
        let id = id.clone();
        async move { client.add_paragraph(&id, format!("line {index}"), None).await }
    });
    for result in futures::future::join_all(writes).await {
        result.unwrap();
    }

    let text = client.extract_text(&id).await.unwrap();
    assert_eq!(text.lines().count(), 20);
    client.close_document(&id).await.unwrap();
    shutdown.cancel();
}

#[tokio::test]
async fn test_out_of_order_responses() {
    let (client_side, server_side) = duplex(64 * 1024);
    let client = RpcClient::builder().attach(client_side);
    let (mut reader, mut writer) = peer(server_side);

    let fake = tokio::spawn(async move {
        let first = next_request(&mut reader).await;
        let second = next_request(&mut reader).await;

        for request in [second, first] {
            let text = request.operation.document_id().unwrap().to_string();
            respond(&mut writer, request.id, Outcome::Text { text }).await;
        }
        (reader, writer)
    });

    let (first, second) = tokio::join!(
        client.execute_with_id(CorrelationId::new(), extract("first")),
        client.execute_with_id(CorrelationId::new(), extract("second")),
    );

    assert_eq!(
        first.unwrap(),
        Outcome::Text {
            text: "first".to_string()
        }
    );
    assert_eq!(
        second.unwrap(),
        Outcome::Text {
            text: "second".to_string()
        }
    );
    let _peer = fake.await.unwrap();
}

#[tokio::test]
async fn test_timeout_removes_pending_request() {
    let (client_side, server_side) = duplex(64 * 1024);
    let client = RpcClient::builder()
        .request_timeout(Duration::from_millis(100))
        .attach(client_side);
    let (mut reader, _writer) = peer(server_side);

    let silent = tokio::spawn(async move {
        let request = next_request(&mut reader).await;
        (request, reader)
    });

    let err = client.extract_text(&DocumentId::from("doc")).await.unwrap_err();

    assert!(matches!(err, Error::Timeout(_)));
    assert!(err.is_transport());
    assert_eq!(client.pending_requests(), 0);
    assert!(client.is_connected());
    let _ = silent.await.unwrap();
}

#[tokio::test]
async fn test_connection_loss_fails_pending_requests() {
    let (client_side, server_side) = duplex(64 * 1024);
    let client = RpcClient::builder().attach(client_side);
    let (mut reader, writer) = peer(server_side);

    tokio::spawn(async move {
        next_request(&mut reader).await;
        next_request(&mut reader).await;
        drop(reader);
        drop(writer);
    });

    let (first, second) = tokio::join!(
        client.execute(extract("a")),
        client.execute(extract("b")),
    );

    for result in [first, second] {
        assert!(matches!(
            result.unwrap_err(),
            Error::Connection(ConnectionError::Closed)
        ));
    }
    assert_eq!(client.pending_requests(), 0);
    assert!(!client.is_connected());

    assert!(matches!(
        client.execute(extract("c")).await.unwrap_err(),
        Error::Connection(ConnectionError::Closed)
    ));
}

#[tokio::test]
async fn test_duplicate_in_flight_id() {
    let (client_side, server_side) = duplex(64 * 1024);
    let client = RpcClient::builder().attach(client_side);
    let (mut reader, mut writer) = peer(server_side);
    let id = CorrelationId::new();

    let first = tokio::spawn({
        let client = client.clone();
        async move { client.execute_with_id(id, extract("a")).await }
    });
    let request = next_request(&mut reader).await;
    assert_eq!(request.id, id);

    let err = client.execute_with_id(id, extract("b")).await.unwrap_err();
    assert!(matches!(err, Error::Protocol(ProtocolError::DuplicateId(dup)) if dup == id));

    respond(&mut writer, id, Outcome::Done).await;
    assert_eq!(first.await.unwrap().unwrap(), Outcome::Done);
}

#[tokio::test]
async fn test_read_only_operations_are_retried() {
    let (client_side, server_side) = duplex(64 * 1024);
    let client = RpcClient::builder()
        .request_timeout(Duration::from_millis(100))
        .read_only_retries(2)
        .attach(client_side);
    let (mut reader, mut writer) = peer(server_side);
    let seen = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&seen);
    tokio::spawn(async move {
        loop {
            let request = next_request(&mut reader).await;
            // Only every second request is answered.
            if counter.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                respond(
                    &mut writer,
                    request.id,
                    Outcome::Text {
                        text: "retried".to_string(),
                    },
                )
                .await;
            }
        }
    });

    let text = client.extract_text(&DocumentId::from("doc")).await.unwrap();
    assert_eq!(text, "retried");
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    let err = client
        .execute(
            AddHeading {
                document_id: DocumentId::from("doc"),
                text: "Once".to_string(),
                level: 1,
            }
            .into(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(seen.load(Ordering::SeqCst), 3);
}

#[tokio::test]
#[traced_test]
async fn test_unknown_response_is_dropped() {
    let (client_side, server_side) = duplex(64 * 1024);
    let client = RpcClient::builder().attach(client_side);
    let (mut reader, mut writer) = peer(server_side);

    tokio::spawn(async move {
        let request = next_request(&mut reader).await;
        respond(&mut writer, CorrelationId::new(), Outcome::Done).await;
        respond(&mut writer, request.id, Outcome::Done).await;
        (reader, writer)
    });

    assert_eq!(client.execute(extract("doc")).await.unwrap(), Outcome::Done);
    assert!(logs_contain("Received response for unknown request"));
}

#[tokio::test]
async fn test_server_echoes_heartbeat() {
    let (_server, mut reader, mut writer) = serve_in_memory();

    writer.send(Frame::heartbeat()).await.unwrap();
    let frame = reader.next().await.unwrap().unwrap();

    assert_eq!(frame.frame_type, FrameType::Heartbeat);
}

#[derive(Serialize)]
struct LooseRequest {
    version: u16,
    id: CorrelationId,
    operation: LooseOperation,
}

#[derive(Serialize)]
struct LooseOperation {
    name: &'static str,
    arguments: LooseArguments,
}

#[derive(Serialize)]
struct LooseArguments {
    document_id: &'static str,
}

async fn send_loose(
    writer: &mut PeerWriter,
    reader: &mut PeerReader,
    version: u16,
) -> ResponseEnvelope {
    let id = CorrelationId::new();
    let request = LooseRequest {
        version,
        id,
        operation: LooseOperation {
            name: "add_heading",
            arguments: LooseArguments { document_id: "doc" },
        },
    };
    writer
        .send(Frame::new(FrameType::Request, codec::encode(&request).unwrap()))
        .await
        .unwrap();

    let frame = reader.next().await.unwrap().unwrap();
    let response = codec::decode_response(&frame.payload).unwrap();
    assert_eq!(response.id, id);
    response
}

#[tokio::test]
async fn test_malformed_operation_gets_correlated_error() {
    let (_server, mut reader, mut writer) = serve_in_memory();

    let response = send_loose(&mut writer, &mut reader, docflow_protocol::PROTOCOL_VERSION).await;

    let Reply::Failure(error) = response.reply else {
        panic!("expected a failure reply");
    };
    assert_eq!(error.kind, ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_protocol_version_mismatch() {
    let (_server, mut reader, mut writer) = serve_in_memory();

    let response = send_loose(&mut writer, &mut reader, 99).await;

    let Reply::Failure(error) = response.reply else {
        panic!("expected a failure reply");
    };
    assert_eq!(error.kind, ErrorKind::Protocol);
}

#[tokio::test]
async fn test_corrupted_frame_is_rejected() {
    let (mut client_side, server_side) = duplex(64 * 1024);
    let server = RpcServer::new(MemoryService::new(), ServerConfig::default());
    let serving = tokio::spawn(async move { server.serve_connection(server_side).await });

    let payload = b"not what was checksummed";
    let mut raw = Vec::new();
    raw.extend_from_slice(&u32::try_from(payload.len()).unwrap().to_be_bytes());
    raw.push(FrameType::Request as u8);
    raw.extend_from_slice(&crc32fast::hash(b"something else").to_be_bytes());
    raw.extend_from_slice(payload);
    client_side.write_all(&raw).await.unwrap();

    let err = serving.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::ChecksumMismatch { .. })
    ));
}

#[tokio::test]
async fn test_server_rejects_response_frames() {
    let (client_side, server_side) = duplex(64 * 1024);
    let server = RpcServer::new(MemoryService::new(), ServerConfig::default());
    let serving = tokio::spawn(async move { server.serve_connection(server_side).await });

    let (_reader, mut writer) = peer(client_side);
    respond(&mut writer, CorrelationId::new(), Outcome::Done).await;

    let err = serving.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::UnexpectedFrame(FrameType::Response))
    ));
}

#[tokio::test]
#[traced_test]
async fn test_client_drops_connection_on_request_frame() {
    let (client_side, server_side) = duplex(64 * 1024);
    let client = RpcClient::builder().attach(client_side);
    let (mut reader, mut writer) = peer(server_side);

    let pending = tokio::spawn({
        let client = client.clone();
        async move { client.execute(extract("doc")).await }
    });
    let request = next_request(&mut reader).await;
    writer
        .send(Frame::new(
            FrameType::Request,
            codec::encode(&request).unwrap(),
        ))
        .await
        .unwrap();

    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Connection(ConnectionError::Closed)));
    assert!(!client.is_connected());
    assert!(logs_contain("Unexpected frame type"));
}

#[tokio::test]
async fn test_client_notices_server_shutdown() {
    let (client_side, server_side) = duplex(64 * 1024);
    let server = Arc::new(RpcServer::new(MemoryService::new(), ServerConfig::default()));
    let serving = Arc::clone(&server);
    let connection = tokio::spawn(async move { serving.serve_connection(server_side).await });

    let client = RpcClient::builder().attach(client_side);
    client.create_document().await.unwrap();

    server.shutdown();
    connection.await.unwrap().unwrap();

    for _ in 0..50 {
        if !client.is_connected() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_client_close_ends_server_connection() {
    let (client_side, server_side) = duplex(64 * 1024);
    let server = RpcServer::new(MemoryService::new(), ServerConfig::default());
    let connection = tokio::spawn(async move { server.serve_connection(server_side).await });

    let client = RpcClient::builder().attach(client_side);
    client.list_documents().await.unwrap();
    client.shutdown();

    tokio::time::timeout(Duration::from_secs(5), connection)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_unchecked_frames_are_accepted() {
    let (_server, mut reader, mut writer) = serve_in_memory();
    let id = CorrelationId::new();
    let payload = codec::encode(&RequestEnvelope::new(id, Operation::ListDocuments)).unwrap();

    writer
        .send(Frame::new_unchecked(FrameType::Request, payload))
        .await
        .unwrap();
    let frame = reader.next().await.unwrap().unwrap();
    let response = codec::decode_response(&frame.payload).unwrap();

    assert_eq!(response.id, id);
    assert_eq!(
        response.reply,
        Reply::Success(Outcome::Documents {
            documents: Vec::new()
        })
    );
}
