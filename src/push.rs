//! Push Channel - Handing Documents to the Host
//!
//! After a run the document is parked in a one-shot cache and the host is
//! poked over its local scripting socket. The script it receives fetches the
//! document back over HTTP, which drains the cache.

use serde::Serialize;
use std::io::Write;
use std::net::TcpStream;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

use crate::scene::Bag;
use crate::settings::{DEFAULT_DATA_URL, DEFAULT_PUSH_ADDRESS};

/// Host message id for "execute this script"
const EXECUTE_SCRIPT_MESSAGE: u32 = 3;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("There is nothing to serve")]
    NothingToServe,

    #[error("Can't connect to host at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write into host socket: {0}")]
    Write(#[source] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Envelope understood by the host's scripting socket
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMessage {
    #[serde(rename = "messageID")]
    pub message_id: u32,
    pub guid: String,
    pub script: String,
}

impl HostMessage {
    /// Script that downloads the document from `data_url` and spawns it
    pub fn spawn_from(data_url: &str) -> Self {
        let script = format!(
            r#"
WebRequest.get("{}", function(request)
	if request.is_error then
		print('Downloading json error: ', request.error)
		return
	end
	print('JSON were downloaded!')
	spawnObjectJSON({{
		json = request.text,
		callback_function = function(spawned_object)
			print('Object were spawned! Done!')
		end
	}})
end)"#,
            data_url
        );
        Self {
            message_id: EXECUTE_SCRIPT_MESSAGE,
            guid: "-1".to_string(),
            script,
        }
    }
}

pub struct PushChannel {
    address: String,
    data_url: String,
    pending: Mutex<Option<Vec<u8>>>,
}

impl PushChannel {
    pub fn new(address: impl Into<String>, data_url: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            data_url: data_url.into(),
            pending: Mutex::new(None),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Option<Vec<u8>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Park `bag` for the data endpoint and ask the host to fetch it.
    ///
    /// The document is cached even when the host is unreachable. Errors are
    /// for the caller to log; they never fail a run.
    pub fn send(&self, bag: &Bag) -> Result<(), PushError> {
        let document = serde_json::to_vec(bag)?;
        *self.pending() = Some(document);

        let mut stream = TcpStream::connect(&self.address).map_err(|source| PushError::Connect {
            address: self.address.clone(),
            source,
        })?;
        let message = serde_json::to_vec(&HostMessage::spawn_from(&self.data_url))?;
        stream.write_all(&message).map_err(PushError::Write)?;

        info!(address = %self.address, "Host asked to spawn the generated document");
        Ok(())
    }

    /// The parked document, at most once per run
    pub fn take_document(&self) -> Result<Vec<u8>, PushError> {
        let document = self.pending().take().ok_or(PushError::NothingToServe)?;
        debug!(bytes = document.len(), "Serving parked document");
        Ok(document)
    }
}

impl Default for PushChannel {
    fn default() -> Self {
        Self::new(DEFAULT_PUSH_ADDRESS, DEFAULT_DATA_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_take_document_is_once() {
        let channel = PushChannel::new("127.0.0.1:1", DEFAULT_DATA_URL);
        assert!(matches!(channel.take_document(), Err(PushError::NothingToServe)));

        // Port 1 refuses; the document is still parked
        let result = channel.send(&Bag::new("Game"));
        assert!(matches!(result, Err(PushError::Connect { .. })));

        let document = channel.take_document().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&document).unwrap();
        assert_eq!(value["Nickname"], "Game");
        assert!(matches!(channel.take_document(), Err(PushError::NothingToServe)));
    }

    #[test]
    fn test_send_writes_envelope() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let reader = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut received = String::new();
            socket.read_to_string(&mut received).unwrap();
            received
        });

        let channel = PushChannel::new(address, "http://127.0.0.1:5000/api/tts/data");
        channel.send(&Bag::new("Game")).unwrap();
        drop(channel);

        let received: serde_json::Value = serde_json::from_str(&reader.join().unwrap()).unwrap();
        assert_eq!(received["messageID"], 3);
        assert_eq!(received["guid"], "-1");
        assert!(received["script"].as_str().unwrap().contains("http://127.0.0.1:5000/api/tts/data"));
    }
}
