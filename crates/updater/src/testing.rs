//! Scripted device used by the unit tests in this crate.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use otapush_protocol::constants::Endpoint;
use otapush_protocol::envelope::{DeviceRequest, DeviceResponse, RequestBody};

use crate::connection::DeviceConnection;
use crate::error::TransportError;

/// One scripted reaction to a request.
pub(crate) enum Scripted {
    Reply(DeviceResponse),
    Fail(TransportError),
    /// Never completes; used to exercise cancellation of in-flight calls.
    Hang,
}

impl Scripted {
    pub(crate) fn json(status: u16, body: &str) -> Self {
        Scripted::Reply(DeviceResponse::new(status, body))
    }

    pub(crate) fn text(status: u16, body: &str) -> Self {
        Scripted::Reply(DeviceResponse::new(status, body))
    }

    pub(crate) fn ok() -> Self {
        Scripted::Reply(DeviceResponse::new(200, "OK"))
    }
}

/// A recorded chunk-write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChunkWrite {
    pub(crate) id: String,
    pub(crate) offset: u64,
    pub(crate) len: usize,
}

/// Device double that answers from per-endpoint queues.
///
/// Chunk-writes default to `200 OK` when nothing is scripted; every other
/// endpoint fails with a connect error so a missing script is loud.
pub(crate) struct ScriptedDevice {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<DeviceRequest>>,
}

impl ScriptedDevice {
    pub(crate) fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn script(&self, endpoint: Endpoint, reaction: Scripted) {
        self.scripts
            .lock()
            .unwrap()
            .entry(endpoint.path().to_string())
            .or_default()
            .push_back(reaction);
    }

    pub(crate) fn requests(&self) -> Vec<DeviceRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn requests_to(&self, endpoint: Endpoint) -> Vec<DeviceRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == endpoint.path())
            .collect()
    }

    pub(crate) fn chunk_writes(&self) -> Vec<ChunkWrite> {
        self.requests_to(Endpoint::SessionChunk)
            .into_iter()
            .map(|r| ChunkWrite {
                id: r.query_param("id").unwrap_or_default().to_string(),
                offset: r
                    .query_param("offset")
                    .and_then(|o| o.parse().ok())
                    .unwrap_or(u64::MAX),
                len: match &r.body {
                    RequestBody::Binary(b) => b.len(),
                    _ => 0,
                },
            })
            .collect()
    }
}

impl DeviceConnection for ScriptedDevice {
    fn send(
        &self,
        request: DeviceRequest,
    ) -> Pin<Box<dyn Future<Output = Result<DeviceResponse, TransportError>> + Send + '_>> {
        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.path)
            .and_then(|q| q.pop_front());
        let is_chunk = request.path == Endpoint::SessionChunk.path();
        self.requests.lock().unwrap().push(request);

        Box::pin(async move {
            match next {
                Some(Scripted::Reply(resp)) => Ok(resp),
                Some(Scripted::Fail(e)) => Err(e),
                Some(Scripted::Hang) => std::future::pending().await,
                None if is_chunk => Ok(DeviceResponse::new(200, "OK")),
                None => Err(TransportError::Connect("no scripted response".into())),
            }
        })
    }

    fn device_id(&self) -> &str {
        "scripted"
    }
}
