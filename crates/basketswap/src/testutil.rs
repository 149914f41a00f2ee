//! Loopback HTTP responders for client tests.

use std::sync::{Arc, Mutex};

use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

/// Serve exactly one canned response. The handle yields the raw request (head + body).
pub async fn serve_once(
    status: u16,
    body: &str,
) -> eyre::Result<(String, JoinHandle<eyre::Result<String>>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}", listener.local_addr()?);
    let body = body.to_owned();
    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await?;
        let req = read_request(&mut sock).await?;
        let resp = format!(
            "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        sock.write_all(resp.as_bytes()).await?;
        sock.shutdown().await?;
        Ok(req)
    });
    Ok((base, handle))
}

/// Read until the headers are complete and any declared body has arrived.
async fn read_request(sock: &mut TcpStream) -> eyre::Result<String> {
    let mut buf = vec![0_u8; 64 * 1024];
    let mut req = Vec::new();
    loop {
        let n = sock.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        req.extend_from_slice(buf.get(..n).unwrap_or_default());
        let text = String::from_utf8_lossy(&req).to_string();
        if let Some((head, rest)) = text.split_once("\r\n\r\n") {
            let want = head
                .lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    k.eq_ignore_ascii_case("content-length")
                        .then(|| v.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if rest.len() >= want {
                break;
            }
        }
    }
    Ok(String::from_utf8_lossy(&req).to_string())
}

/// Methods seen by a [`serve_json_rpc`] node, in arrival order.
pub type RpcCalls = Arc<Mutex<Vec<String>>>;

/// A loopback JSON-RPC node that answers every connection until the test ends.
///
/// `replies` maps a method name to the reply fragment merged into the envelope, either
/// `{"result": ..}` or `{"error": {..}}`. Unknown methods get a -32601 error.
pub async fn serve_json_rpc(
    replies: Vec<(&'static str, serde_json::Value)>,
) -> eyre::Result<(String, RpcCalls)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}", listener.local_addr()?);
    let calls = RpcCalls::default();
    let seen = Arc::clone(&calls);
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            let Ok(req) = read_request(&mut sock).await else {
                continue;
            };
            let body = req.split_once("\r\n\r\n").map_or("", |(_, b)| b);
            let call: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
            let method = call
                .get("method")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_owned();
            if let Ok(mut seen) = seen.lock() {
                seen.push(method.clone());
            }
            let mut envelope = serde_json::json!({
                "jsonrpc": "2.0",
                "id": call.get("id").cloned().unwrap_or(serde_json::Value::Null),
            });
            let reply = replies
                .iter()
                .find(|(m, _)| *m == method)
                .map(|(_, r)| r.clone())
                .unwrap_or_else(|| {
                    serde_json::json!({"error": {"code": -32601, "message": "Method not found"}})
                });
            if let (Some(env), Some(fields)) = (envelope.as_object_mut(), reply.as_object()) {
                env.extend(fields.clone());
            }
            let out = envelope.to_string();
            let resp = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{out}",
                out.len()
            );
            let _written = sock.write_all(resp.as_bytes()).await;
            let _closed = sock.shutdown().await;
        }
    });
    Ok((base, calls))
}

/// A loopback URL with nothing listening behind it.
pub async fn dead_url() -> eyre::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}", listener.local_addr()?);
    drop(listener);
    Ok(base)
}
