//! Network settlement tracking from DevTools events

use std::collections::{HashMap, HashSet};

use serde_json::Value;

/// Follows page and network events of one navigation
#[derive(Debug, Default)]
pub struct NetworkTracker {
    /// Requests started but not finished
    inflight: HashSet<String>,

    /// Load event seen for the new document
    loaded: bool,

    /// Request id of the main frame document
    main_loader: Option<String>,

    /// Document responses: request id -> HTTP status
    documents: HashMap<String, u16>,
}

impl NetworkTracker {
    /// Track a navigation whose document request id is already known
    pub fn for_loader(loader_id: Option<String>) -> Self {
        Self {
            main_loader: loader_id,
            ..Self::default()
        }
    }

    /// Feed one protocol event
    pub fn observe(&mut self, method: &str, params: &Value) {
        let request_id = || params["requestId"].as_str().map(str::to_string);

        match method {
            "Page.loadEventFired" => self.loaded = true,
            "Page.frameNavigated" => {
                let frame = &params["frame"];
                if frame.get("parentId").is_none() {
                    if let Some(loader) = frame["loaderId"].as_str() {
                        self.main_loader = Some(loader.to_string());
                    }
                }
            }
            "Network.requestWillBeSent" => {
                if let Some(id) = request_id() {
                    self.inflight.insert(id);
                }
            }
            "Network.loadingFinished" | "Network.loadingFailed" => {
                if let Some(id) = request_id() {
                    self.inflight.remove(&id);
                }
            }
            "Network.responseReceived" if params["type"] == "Document" => {
                let status = params["response"]["status"].as_u64();
                if let (Some(id), Some(status)) = (request_id(), status) {
                    self.documents.insert(id, status as u16);
                }
            }
            _ => {}
        }
    }

    /// Loaded with nothing in flight
    pub fn is_idle(&self) -> bool {
        self.loaded && self.inflight.is_empty()
    }

    /// HTTP status of the main document
    pub fn document_status(&self) -> Option<u16> {
        self.main_loader
            .as_ref()
            .and_then(|id| self.documents.get(id))
            .copied()
    }
}
