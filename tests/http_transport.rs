use anyhow::Result;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use railcron::storage::Archiver;
use railcron::transport::{Auth, HttpClient};
use railcron::Error;

/// Answers exactly one request with the raw `response` bytes, then closes.
async fn serve_once(response: &'static [u8]) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|window| window == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let _ = socket.write_all(response).await;
        let _ = socket.shutdown().await;
    });
    Ok(format!("http://{addr}/feed"))
}

#[tokio::test]
async fn non_success_status_is_transport_error() -> Result<()> {
    let url = serve_once(
        b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbusy",
    )
    .await?;
    let client = HttpClient::new()?;

    let err = match client.get(&url, &[], &Auth::None).await {
        Ok(_) => panic!("503 must not be returned as a download"),
        Err(err) => err,
    };

    match err {
        Error::Transport { target, status, .. } => {
            assert_eq!(target, url);
            assert_eq!(status, Some(503));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn refused_connection_is_transport_error() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    let client = HttpClient::new()?;

    let err = client
        .get_text(&format!("http://{addr}/feed"), &[])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Transport { status: None, .. }));
    assert_eq!(err.kind(), "transport");
    Ok(())
}

#[tokio::test]
async fn truncated_stream_leaves_no_partial_file() -> Result<()> {
    let url = serve_once(
        b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\npartial body",
    )
    .await?;
    let client = HttpClient::new()?;
    let dir = tempdir()?;
    let target = dir.path().join("2023/8");

    let download = client.get(&url, &[], &Auth::None).await?;
    let err = Archiver::new()
        .store(download, &target, "15.json.gz")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Transport { .. }));
    assert!(!target.join("15.json.gz").exists());
    assert!(!target.join("15.json.gz.tmp").exists());
    Ok(())
}
