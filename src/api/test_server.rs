//! One-shot HTTP server serving a canned response, for client tests.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

pub struct CannedServer {
  pub url: Url,
  handle: JoinHandle<String>,
}

impl CannedServer {
  /// The raw request the server received (head and body).
  pub async fn request(self) -> String {
    self.handle.await.unwrap()
  }
}

/// Accept one connection, answer it with `status` and `body`, then close.
pub async fn serve_once(status: &'static str, body: &'static str) -> CannedServer {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();

  let handle = tokio::spawn(async move {
    let (mut socket, _) = listener.accept().await.unwrap();
    let request = read_request(&mut socket).await;

    let response = format!(
      "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
      status,
      body.len(),
      body
    );
    socket.write_all(response.as_bytes()).await.unwrap();
    socket.shutdown().await.ok();
    request
  });

  CannedServer { url, handle }
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
  let mut buf = Vec::new();
  let mut chunk = [0u8; 4096];

  loop {
    let n = socket.read(&mut chunk).await.unwrap();
    if n == 0 {
      break;
    }
    buf.extend_from_slice(&chunk[..n]);

    let text = String::from_utf8_lossy(&buf);
    if let Some(head_end) = text.find("\r\n\r\n") {
      let content_length = text[..head_end]
        .lines()
        .find_map(|line| {
          let (name, value) = line.split_once(':')?;
          name
            .eq_ignore_ascii_case("content-length")
            .then(|| value.trim().parse::<usize>().ok())
            .flatten()
        })
        .unwrap_or(0);
      if buf.len() >= head_end + 4 + content_length {
        break;
      }
    }
  }

  String::from_utf8_lossy(&buf).into_owned()
}
