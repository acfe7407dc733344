//! Live reload socket: browsers connect here and get told when to refresh.

use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use serde::Serialize;
use tungstenite::WebSocket;

use crate::error::WatchError;

/// Connections kept open; older ones are closed first.
const MAX_CLIENTS: usize = 10;

/// A message to every connected page, serialized as JSON tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// Reload the whole page.
    Reload,
    /// Re-fetch stylesheets without reloading.
    Styles,
    /// Show a rebuild failure in an overlay.
    Error { message: String },
}

pub(crate) type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

/// Binds the reload socket, falling back to any free port when the
/// preferred one is taken.
pub fn reserve_port(preferred: u16) -> Result<TcpListener, WatchError> {
    match TcpListener::bind(("127.0.0.1", preferred)) {
        Ok(socket) => Ok(socket),
        Err(e) => {
            tracing::warn!("reload port {preferred} unavailable ({e}), picking another");
            Ok(TcpListener::bind(("127.0.0.1", 0))?)
        }
    }
}

pub(crate) fn new_thread_ws_incoming(server: Arc<TcpListener>, clients: Clients) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for stream in server.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!("reload connection failed: {e}");
                    continue;
                }
            };

            match tungstenite::accept(stream) {
                Ok(socket) => {
                    if let Ok(mut clients) = clients.lock() {
                        clients.push(socket);
                    }
                }
                Err(e) => tracing::warn!("reload handshake failed: {e}"),
            }
        }
    })
}

pub(crate) fn new_thread_ws_reload(clients: Clients) -> (Sender<Message>, JoinHandle<()>) {
    let (tx, rx) = std::sync::mpsc::channel::<Message>();

    let thread = std::thread::spawn(move || {
        while let Ok(message) = rx.recv() {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("couldn't encode reload message: {e}");
                    continue;
                }
            };

            let Ok(mut clients) = clients.lock() else {
                break;
            };

            tracing::debug!("sending {text} to {} client(s)", clients.len());

            // drop sockets that can't be written to anymore
            clients.retain_mut(|socket| match socket.send(tungstenite::Message::text(text.clone())) {
                Ok(()) => true,
                Err(tungstenite::Error::Io(e)) => {
                    tracing::debug!("dropping reload client: {e}");
                    false
                }
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => false,
                Err(e) => {
                    tracing::error!("reload client error: {e}");
                    true
                }
            });

            let len = clients.len();
            if len > MAX_CLIENTS {
                for mut socket in clients.drain(0..len - MAX_CLIENTS) {
                    socket.close(None).ok();
                }
            }
        }
    });

    (tx, thread)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_tagged_json() {
        let json = |m: &Message| serde_json::to_string(m).unwrap();

        assert_eq!(json(&Message::Reload), r#"{"type":"reload"}"#);
        assert_eq!(json(&Message::Styles), r#"{"type":"styles"}"#);
        assert_eq!(
            json(&Message::Error {
                message: "boom".into()
            }),
            r#"{"type":"error","message":"boom"}"#
        );
    }

    #[test]
    fn taken_port_falls_back() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        let socket = reserve_port(port).unwrap();
        assert_ne!(socket.local_addr().unwrap().port(), port);
    }

    #[test]
    fn connected_clients_receive_broadcasts() {
        let server = Arc::new(reserve_port(0).unwrap());
        let addr = server.local_addr().unwrap();
        let clients: Clients = Arc::default();

        let _incoming = new_thread_ws_incoming(server, clients.clone());
        let (tx, _outgoing) = new_thread_ws_reload(clients.clone());

        let (mut client, _) = tungstenite::connect(format!("ws://{addr}")).unwrap();

        // the handshake finishes on the server thread, wait for registration
        for _ in 0..200 {
            if !clients.lock().unwrap().is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        tx.send(Message::Styles).unwrap();
        let message = client.read().unwrap();
        assert_eq!(message.into_text().unwrap().as_str(), r#"{"type":"styles"}"#);
    }
}
