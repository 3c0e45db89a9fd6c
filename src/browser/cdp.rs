//! Chrome DevTools Protocol client
//!
//! One WebSocket connection per browser. Commands are matched to responses
//! by id; events are fanned out on a broadcast channel and filtered by
//! session on the receiving side.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::process::Child;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::launch;
use super::network::NetworkTracker;
use super::{Browser, BrowserError, Credentials, Navigation, Page};
use crate::config::BrowserConfig;

/// Quiet period with no requests in flight that counts as settled
const NETWORK_IDLE_WINDOW: Duration = Duration::from_millis(500);

/// Buffered events per subscriber
const EVENT_CAPACITY: usize = 4096;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>>>;

/// A protocol event
#[derive(Debug, Clone)]
pub struct Event {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RpcError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Incoming {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<RpcError>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
    session_id: Option<String>,
}

/// Multiplexed DevTools connection
struct Connection {
    sink: tokio::sync::Mutex<WsSink>,
    pending: Pending,
    events: broadcast::Sender<Event>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl Connection {
    async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        debug!("Connecting to {}", ws_url);

        let (stream, _) = connect_async(ws_url).await?;
        let (sink, mut stream) = stream.split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let reader = {
            let pending = pending.clone();
            let events = events.clone();

            tokio::spawn(async move {
                while let Some(message) = stream.next().await {
                    match message {
                        Ok(Message::Text(text)) => dispatch(&text, &pending, &events),
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            debug!("DevTools connection dropped: {}", e);
                            break;
                        }
                    }
                }
                // dropping the senders fails every waiting call with `Closed`
                pending.lock().clear();
            })
        };

        Ok(Self {
            sink: tokio::sync::Mutex::new(sink),
            pending,
            events,
            next_id: AtomicU64::new(1),
            reader,
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    async fn call(
        &self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value, BrowserError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut command = json!({ "id": id, "method": method, "params": params });
        if let Some(session_id) = session_id {
            command["sessionId"] = json!(session_id);
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let sent = self
            .sink
            .lock()
            .await
            .send(Message::Text(command.to_string()))
            .await;
        if let Err(e) = sent {
            self.pending.lock().remove(&id);
            return Err(e.into());
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(error)) => Err(BrowserError::Protocol {
                method: method.to_string(),
                message: error.message,
            }),
            Err(_) => Err(BrowserError::Closed),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn dispatch(text: &str, pending: &Pending, events: &broadcast::Sender<Event>) {
    let incoming: Incoming = match serde_json::from_str(text) {
        Ok(incoming) => incoming,
        Err(e) => {
            warn!("Ignoring malformed DevTools message: {}", e);
            return;
        }
    };

    if let Some(id) = incoming.id {
        if let Some(tx) = pending.lock().remove(&id) {
            let outcome = match incoming.error {
                Some(error) => Err(error),
                None => Ok(incoming.result.unwrap_or(Value::Null)),
            };
            let _ = tx.send(outcome);
        }
    } else if let Some(method) = incoming.method {
        // no subscribers is fine
        let _ = events.send(Event {
            method,
            params: incoming.params,
            session_id: incoming.session_id,
        });
    }
}

/// A launched Chromium driven over DevTools
pub struct CdpBrowser {
    connection: Arc<Connection>,
    child: Child,
    profile_dir: PathBuf,
}

impl CdpBrowser {
    /// Launch a browser according to `config`
    pub async fn launch(config: &BrowserConfig) -> Result<Self, BrowserError> {
        let launched = launch::spawn(config).await?;
        let connection = Connection::connect(&launched.ws_url).await?;

        Ok(Self {
            connection: Arc::new(connection),
            child: launched.child,
            profile_dir: launched.profile_dir,
        })
    }

    /// Shut the browser down and remove its profile
    pub async fn close(mut self) -> Result<(), BrowserError> {
        if let Err(e) = self.connection.call("Browser.close", json!({}), None).await {
            debug!("Browser.close failed: {}", e);
        }

        if tokio::time::timeout(Duration::from_secs(5), self.child.wait())
            .await
            .is_err()
        {
            self.child.kill().await?;
        }

        if let Err(e) = std::fs::remove_dir_all(&self.profile_dir) {
            debug!("Could not remove {}: {}", self.profile_dir.display(), e);
        }

        Ok(())
    }
}

#[async_trait]
impl Browser for CdpBrowser {
    async fn new_page(&self) -> Result<Box<dyn Page>, BrowserError> {
        let connection = &self.connection;

        let context = connection
            .call("Target.createBrowserContext", json!({ "disposeOnDetach": true }), None)
            .await?;
        let context_id = string_field(&context, "browserContextId")?;

        let target = connection
            .call(
                "Target.createTarget",
                json!({ "url": "about:blank", "browserContextId": context_id }),
                None,
            )
            .await?;
        let target_id = string_field(&target, "targetId")?;

        let attached = connection
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
            )
            .await?;
        let session_id = string_field(&attached, "sessionId")?;

        for domain in ["Page.enable", "Network.enable", "Runtime.enable"] {
            connection.call(domain, json!({}), Some(&session_id)).await?;
        }

        debug!("Opened page {} in context {}", target_id, context_id);

        Ok(Box::new(CdpPage {
            connection: connection.clone(),
            session_id,
            target_id,
            context_id,
            auth_handler: None,
        }))
    }
}

fn string_field(value: &Value, field: &str) -> Result<String, BrowserError> {
    value[field]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| BrowserError::Launch(format!("DevTools response without {}", field)))
}

/// A page attached through a flattened DevTools session
pub struct CdpPage {
    connection: Arc<Connection>,
    session_id: String,
    target_id: String,
    context_id: String,
    /// Answers paused requests and auth challenges once credentials are set
    auth_handler: Option<JoinHandle<()>>,
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        if let Some(handler) = self.auth_handler.take() {
            handler.abort();
        }
    }
}

impl CdpPage {
    async fn call(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        self.connection
            .call(method, params, Some(&self.session_id))
            .await
    }

    /// Consume events until the page is loaded and the network stays idle
    async fn wait_until_settled(
        &self,
        events: &mut broadcast::Receiver<Event>,
        mut tracker: NetworkTracker,
    ) -> Result<Navigation, BrowserError> {
        let mut idle_since: Option<Instant> = None;

        loop {
            let received = match idle_since {
                Some(since) => {
                    match tokio::time::timeout_at(since + NETWORK_IDLE_WINDOW, events.recv()).await
                    {
                        Ok(received) => received,
                        Err(_) => break,
                    }
                }
                None => events.recv().await,
            };

            match received {
                Ok(event) if event.session_id.as_deref() == Some(self.session_id.as_str()) => {
                    tracker.observe(&event.method, &event.params);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Missed {} browser events while waiting for the page", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return Err(BrowserError::Closed),
            }

            idle_since = if tracker.is_idle() {
                idle_since.or_else(|| Some(Instant::now()))
            } else {
                None
            };
        }

        Ok(Navigation {
            status: tracker.document_status(),
        })
    }
}

#[async_trait]
impl Page for CdpPage {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), BrowserError> {
        if let Some(handler) = self.auth_handler.take() {
            handler.abort();
        }

        // subscribe before enabling so no paused request is missed
        let events = self.connection.subscribe();
        self.auth_handler = Some(spawn_auth_handler(
            self.connection.clone(),
            self.session_id.clone(),
            credentials.clone(),
            events,
        ));

        self.call(
            "Fetch.enable",
            json!({ "handleAuthRequests": true, "patterns": [{ "urlPattern": "*" }] }),
        )
        .await?;
        Ok(())
    }

    async fn goto(&mut self, url: &str) -> Result<Navigation, BrowserError> {
        debug!("Navigating to {}", url);

        let mut events = self.connection.subscribe();
        let result = self.call("Page.navigate", json!({ "url": url })).await?;

        if let Some(reason) = result["errorText"].as_str().filter(|r| !r.is_empty()) {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: reason.to_string(),
            });
        }

        let loader = result["loaderId"].as_str().map(str::to_string);
        self.wait_until_settled(&mut events, NetworkTracker::for_loader(loader))
            .await
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let message = details["exception"]["description"]
                .as_str()
                .or_else(|| details["text"].as_str())
                .unwrap_or("unknown exception");
            return Err(BrowserError::Script(message.to_string()));
        }

        Ok(result["result"]["value"].clone())
    }

    async fn evaluate_and_wait_for_navigation(
        &mut self,
        expression: &str,
    ) -> Result<Navigation, BrowserError> {
        let mut events = self.connection.subscribe();
        self.evaluate(expression).await?;
        self.wait_until_settled(&mut events, NetworkTracker::default())
            .await
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if let Some(handler) = self.auth_handler.take() {
            handler.abort();
        }

        self.connection
            .call("Target.closeTarget", json!({ "targetId": self.target_id }), None)
            .await?;
        self.connection
            .call(
                "Target.disposeBrowserContext",
                json!({ "browserContextId": self.context_id }),
                None,
            )
            .await?;
        Ok(())
    }
}

/// Answer Fetch events of one session until aborted.
///
/// Credentials only go out in reply to a server challenge, never as a
/// header on every request.
fn spawn_auth_handler(
    connection: Arc<Connection>,
    session_id: String,
    credentials: Credentials,
    mut events: broadcast::Receiver<Event>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut attempted = HashSet::new();

        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Auth handler missed {} browser events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            if event.session_id.as_deref() != Some(session_id.as_str()) {
                continue;
            }
            let Some((method, params)) = fetch_reply(&event, &credentials, &mut attempted) else {
                continue;
            };

            let connection = connection.clone();
            let session_id = session_id.clone();
            tokio::spawn(async move {
                if let Err(e) = connection.call(method, params, Some(&session_id)).await {
                    debug!("{} failed: {}", method, e);
                }
            });
        }
    })
}

/// Command answering a Fetch event. A request challenged twice gets its
/// challenge cancelled so the server's 401 reaches the page.
fn fetch_reply(
    event: &Event,
    credentials: &Credentials,
    attempted: &mut HashSet<String>,
) -> Option<(&'static str, Value)> {
    let request_id = event.params["requestId"].as_str()?.to_string();

    match event.method.as_str() {
        "Fetch.requestPaused" => Some(("Fetch.continueRequest", json!({ "requestId": request_id }))),
        "Fetch.authRequired" => {
            let response = if attempted.insert(request_id.clone()) {
                json!({
                    "response": "ProvideCredentials",
                    "username": credentials.username,
                    "password": credentials.password,
                })
            } else {
                json!({ "response": "CancelAuth" })
            };

            Some((
                "Fetch.continueWithAuth",
                json!({ "requestId": request_id, "authChallengeResponse": response }),
            ))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_routes_responses_and_events() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events, mut rx) = broadcast::channel(8);

        let (tx_ok, mut rx_ok) = oneshot::channel();
        let (tx_err, mut rx_err) = oneshot::channel();
        pending.lock().insert(1, tx_ok);
        pending.lock().insert(2, tx_err);

        dispatch(r#"{"id":1,"result":{"frameId":"F"}}"#, &pending, &events);
        dispatch(r#"{"id":2,"error":{"code":-32000,"message":"No target"}}"#, &pending, &events);
        dispatch(
            r#"{"method":"Page.loadEventFired","params":{"timestamp":1},"sessionId":"S"}"#,
            &pending,
            &events,
        );
        dispatch("not json", &pending, &events);

        assert_eq!(rx_ok.try_recv().unwrap().unwrap(), json!({"frameId": "F"}));
        assert_eq!(rx_err.try_recv().unwrap().unwrap_err().message, "No target");
        assert!(pending.lock().is_empty());

        let event = rx.try_recv().unwrap();
        assert_eq!(event.method, "Page.loadEventFired");
        assert_eq!(event.session_id.as_deref(), Some("S"));
    }

    fn event(method: &str, params: Value) -> Event {
        Event {
            method: method.to_string(),
            params,
            session_id: Some("S".to_string()),
        }
    }

    #[test]
    fn test_fetch_reply_answers_challenge_once() {
        let credentials = Credentials {
            username: "dev".to_string(),
            password: "secret".to_string(),
        };
        let mut attempted = HashSet::new();
        let challenge = event(
            "Fetch.authRequired",
            json!({ "requestId": "r1", "authChallenge": { "source": "Server", "origin": "https://shop.test" } }),
        );

        let (method, params) = fetch_reply(&challenge, &credentials, &mut attempted).unwrap();
        assert_eq!(method, "Fetch.continueWithAuth");
        assert_eq!(
            params,
            json!({
                "requestId": "r1",
                "authChallengeResponse": { "response": "ProvideCredentials", "username": "dev", "password": "secret" }
            })
        );

        let (_, retry) = fetch_reply(&challenge, &credentials, &mut attempted).unwrap();
        assert_eq!(retry["authChallengeResponse"], json!({ "response": "CancelAuth" }));
    }

    #[test]
    fn test_fetch_reply_never_adds_credentials_to_plain_requests() {
        let credentials = Credentials {
            username: "dev".to_string(),
            password: "secret".to_string(),
        };
        let mut attempted = HashSet::new();
        let paused = event(
            "Fetch.requestPaused",
            json!({ "requestId": "r2", "request": { "url": "https://cdn.example/lib.js", "headers": {} } }),
        );

        let (method, params) = fetch_reply(&paused, &credentials, &mut attempted).unwrap();

        assert_eq!(method, "Fetch.continueRequest");
        assert_eq!(params, json!({ "requestId": "r2" }));
        assert!(fetch_reply(&event("Network.requestWillBeSent", json!({ "requestId": "r3" })), &credentials, &mut attempted).is_none());
    }
}
