use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::UnixStream;

use super::push_bus::{read_push_lines, PushBus};
use crate::constants::PUSH_SOCKET_NAME;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Client for the local push-event socket (newline-delimited JSON).
/// Reconnects automatically if the connection is lost; missed events are
/// covered by the badge engine's background poll.
pub struct PushSocketClient {
    socket_path: PathBuf,
    reconnect_delay: Duration,
}

impl PushSocketClient {
    pub fn new() -> Self {
        Self::with_path(Self::default_socket_path())
    }

    pub fn with_path<P: AsRef<Path>>(socket_path: P) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn default_socket_path() -> PathBuf {
        if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
            PathBuf::from(runtime_dir).join(PUSH_SOCKET_NAME)
        } else {
            PathBuf::from("/tmp").join(PUSH_SOCKET_NAME)
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Try to connect to the socket, returns None if socket doesn't exist
    pub async fn connect(&self) -> Option<UnixStream> {
        if !self.socket_path.exists() {
            tracing::debug!("Push socket not found at {:?}", self.socket_path);
            return None;
        }

        match UnixStream::connect(&self.socket_path).await {
            Ok(stream) => {
                tracing::info!("Connected to push socket at {:?}", self.socket_path);
                Some(stream)
            }
            Err(e) => {
                tracing::debug!("Failed to connect to push socket: {}", e);
                None
            }
        }
    }

    /// Run the client forever, publishing events onto `bus`.
    pub async fn run(self, bus: PushBus) {
        loop {
            if let Some(stream) = self.connect().await {
                match read_push_lines(BufReader::new(stream), &bus).await {
                    Ok(count) => {
                        tracing::info!(events = count, "Push socket disconnected");
                    }
                    Err(e) => {
                        tracing::warn!("Push socket read error: {}", e);
                    }
                }
            }

            tokio::time::sleep(self.reconnect_delay).await;
        }
    }
}

impl Default for PushSocketClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::PushChannel;
    use crate::events::PushEvent;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixListener;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_missing_socket_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let client = PushSocketClient::with_path(dir.path().join("absent.sock"));
        assert!(client.connect().await.is_none());
    }

    #[tokio::test]
    async fn test_events_flow_and_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("push.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let bus = PushBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = bus.on_push_event(Box::new(move |e: &PushEvent| {
            let _ = tx.send(e.clone());
        }));

        let client =
            PushSocketClient::with_path(&path).with_reconnect_delay(Duration::from_millis(10));
        let task = tokio::spawn(client.run(bus));

        // First connection sends one event then hangs up
        let (mut conn, _) = listener.accept().await.unwrap();
        conn.write_all(b"{\"type\":\"message-sent\"}\n").await.unwrap();
        drop(conn);
        assert_eq!(rx.recv().await, Some(PushEvent::MessageSent {}));

        // The client reconnects and keeps delivering
        let (mut conn, _) = listener.accept().await.unwrap();
        conn.write_all(b"{\"type\":\"messages-read\"}\n").await.unwrap();
        assert_eq!(rx.recv().await, Some(PushEvent::MessagesRead { count: None }));

        task.abort();
    }
}
