//! A loopback HTTP server that receives the OAuth authorization-code
//! callback, bound to `127.0.0.1` only.

use std::collections::HashMap;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::error::{AuthError, Result};

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Query parameters the authorization server appends to the redirect.
#[derive(Debug, Clone, Default)]
pub struct CallbackResult {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// A bound loopback callback server, listening on `127.0.0.1:<port>` until
/// one request to `/callback` arrives or the caller gives up waiting.
pub struct CallbackServer {
    port: u16,
    receiver: oneshot::Receiver<CallbackResult>,
}

impl CallbackServer {
    /// Bind a loopback listener. `requested_port` of `0` picks a random free
    /// port, matching the OS's ephemeral-port allocation.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Http`] if the socket cannot be bound.
    pub async fn bind(requested_port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", requested_port))
            .await
            .map_err(|e| AuthError::Http(format!("failed to bind loopback callback server: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Http(e.to_string()))?
            .port();

        let (tx, rx) = oneshot::channel();
        tokio::spawn(serve_one(listener, tx));

        Ok(Self { port, receiver: rx })
    }

    /// The port this server is actually bound to (resolved if 0 was requested).
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The redirect URI the authorization request should use.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.port)
    }

    /// Wait up to 5 minutes for the callback request.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CallbackTimeout`] if nothing arrives in time.
    pub async fn wait(self) -> Result<CallbackResult> {
        match tokio::time::timeout(CALLBACK_TIMEOUT, self.receiver).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(AuthError::CallbackTimeout),
            Err(_) => Err(AuthError::CallbackTimeout),
        }
    }
}

async fn serve_one(listener: TcpListener, tx: oneshot::Sender<CallbackResult>) {
    let Ok((stream, _)) = listener.accept().await else {
        return;
    };
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
        return;
    }

    // Drain remaining headers; the callback carries no body we need.
    loop {
        let mut header_line = String::new();
        match reader.read_line(&mut header_line).await {
            Ok(0) | Err(_) => break,
            Ok(_) if header_line.trim().is_empty() => break,
            Ok(_) => continue,
        }
    }

    let result = parse_callback_request(&request_line);
    let body = render_response(&result);
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = write_half.write_all(response.as_bytes()).await;
    let _ = write_half.flush().await;
    let _ = tx.send(result);
}

fn parse_callback_request(request_line: &str) -> CallbackResult {
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/callback");
    let query = path.splitn(2, '?').nth(1).unwrap_or("");

    let mut params: HashMap<String, String> = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or_default();
        let value = parts.next().unwrap_or_default();
        let decode = |s: &str| -> String {
            percent_decode(s.replace('+', " ").as_str())
        };
        params.insert(decode(key), decode(value));
    }

    CallbackResult {
        code: params.remove("code"),
        state: params.remove("state"),
        error: params.remove("error"),
        error_description: params.remove("error_description"),
    }
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(value) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn render_response(result: &CallbackResult) -> String {
    if let Some(error) = &result.error {
        let description = result.error_description.as_deref().unwrap_or("");
        format!(
            "<html><body><h1>Authorization failed</h1><p>{error}</p><p>{description}</p></body></html>"
        )
    } else {
        "<html><body><h1>Authorization complete</h1><p>You may close this window.</p></body></html>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    #[test]
    fn parses_code_and_state_from_query() {
        let result = parse_callback_request(
            "GET /callback?code=abc123&state=xyz789 HTTP/1.1\r\n",
        );
        assert_eq!(result.code.as_deref(), Some("abc123"));
        assert_eq!(result.state.as_deref(), Some("xyz789"));
        assert!(result.error.is_none());
    }

    #[test]
    fn parses_error_and_description() {
        let result = parse_callback_request(
            "GET /callback?error=access_denied&error_description=user%20declined HTTP/1.1\r\n",
        );
        assert_eq!(result.error.as_deref(), Some("access_denied"));
        assert_eq!(result.error_description.as_deref(), Some("user declined"));
    }

    #[test]
    fn missing_query_yields_empty_result() {
        let result = parse_callback_request("GET /callback HTTP/1.1\r\n");
        assert!(result.code.is_none());
        assert!(result.state.is_none());
    }

    #[tokio::test]
    async fn redirect_uri_uses_bound_port() {
        let server = CallbackServer::bind(0).await.unwrap();
        assert!(server.port() > 0);
        assert_eq!(server.redirect_uri(), format!("http://127.0.0.1:{}/callback", server.port()));
    }

    #[tokio::test]
    async fn wait_resolves_once_request_arrives() {
        let server = CallbackServer::bind(0).await.unwrap();
        let port = server.port();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
            stream
                .write_all(b"GET /callback?code=abc&state=xyz HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n")
                .await
                .unwrap();
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf).await;
        });

        let result = server.wait().await.unwrap();
        assert_eq!(result.code.as_deref(), Some("abc"));
        assert_eq!(result.state.as_deref(), Some("xyz"));
        client.await.unwrap();
    }
}
