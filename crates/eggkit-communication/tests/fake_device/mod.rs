//! Fake EBB bridge speaking the line protocol over WebSocket.
#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

pub const VERSION_BANNER: &str = "EBBv13_and_above EB Firmware Version 2.5.3";

/// Spawn a fake device and return the bound port.
///
/// Commands are matched on their CR-stripped text; `BIN` answers in
/// binary frames split mid-line, `BYE` drops the connection, `XY*`
/// draws a protocol-level rejection, everything else a bare `OK`.
pub async fn spawn_fake_device() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut stream) = ws.split();
                while let Some(Ok(message)) = stream.next().await {
                    let Message::Text(text) = message else {
                        continue;
                    };
                    for command in text.split('\r').filter(|c| !c.is_empty()) {
                        match command {
                            "V" => {
                                sink.send(Message::Text(format!("{VERSION_BANNER}\r\n")))
                                    .await
                                    .unwrap();
                            }
                            "QB" => {
                                sink.send(Message::Text("0\r\nOK\r\n".to_string()))
                                    .await
                                    .unwrap();
                            }
                            "BIN" => {
                                // Binary frames, line split across frames
                                sink.send(Message::Binary(b"1".to_vec())).await.unwrap();
                                sink.send(Message::Binary(b"\r\nOK\r\n".to_vec()))
                                    .await
                                    .unwrap();
                            }
                            "BYE" => {
                                let _ = sink.close().await;
                                return;
                            }
                            unknown if unknown.starts_with("XY") => {
                                sink.send(Message::Text(format!(
                                    "!8 Err: Unknown CMD '{unknown}'\r\n"
                                )))
                                .await
                                .unwrap();
                            }
                            _ => {
                                sink.send(Message::Text("OK\r\n".to_string())).await.unwrap();
                            }
                        }
                    }
                }
            });
        }
    });

    port
}
