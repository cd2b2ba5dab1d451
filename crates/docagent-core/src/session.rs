//! Session Management
//!
//! Owns the lifetime of the tool-server connection and the chat model shared
//! by every request. The connection is established lazily on first use and
//! released once on shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::error::{AgentError, Result};
use crate::provider::ChatModel;
use crate::tool::{Tool, ToolRegistry};

/// An open, handshaken connection to a tool server
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Discover the tools the server exposes
    async fn list_tools(&self) -> Result<Vec<Arc<dyn Tool>>>;

    /// Release the connection. Calling it again is a no-op.
    async fn close(&self) -> Result<()>;
}

/// Opens tool-server connections
#[async_trait]
pub trait ToolConnector: Send + Sync {
    /// Open the connection and complete the protocol handshake
    async fn connect(&self) -> Result<Box<dyn ToolSession>>;
}

/// Builds the chat model handle
pub trait ModelFactory: Send + Sync {
    fn create(&self) -> Result<ChatModel>;
}

/// Everything a request needs once the session is up
pub struct ReadySession {
    tools: Arc<ToolRegistry>,
    model: ChatModel,
    connection: Box<dyn ToolSession>,
}

impl ReadySession {
    pub const fn model(&self) -> &ChatModel {
        &self.model
    }

    pub fn tools(&self) -> Arc<ToolRegistry> {
        Arc::clone(&self.tools)
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    async fn release(&self) -> Result<()> {
        self.connection.close().await
    }
}

impl std::fmt::Debug for ReadySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadySession")
            .field("model", &self.model.model_id())
            .field("tools", &self.tools.names())
            .finish_non_exhaustive()
    }
}

/// Lazily connected session shared by all requests.
///
/// `initialize` is idempotent and serialized: concurrent first callers wait
/// for the same attempt instead of racing to connect. A failed attempt
/// releases whatever it acquired and leaves the manager uninitialized, so a
/// later call can try again.
///
/// Readers (`ready`, `is_initialized`) and `cleanup` never wait on an attempt
/// in flight. An attempt overtaken by `cleanup` releases its connection when
/// it completes instead of publishing it.
pub struct SessionManager {
    connector: Arc<dyn ToolConnector>,
    models: Arc<dyn ModelFactory>,
    init_lock: Mutex<()>,
    state: RwLock<Option<Arc<ReadySession>>>,
    epoch: AtomicU64,
    initialized: AtomicBool,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn ToolConnector>, models: Arc<dyn ModelFactory>) -> Self {
        Self {
            connector,
            models,
            init_lock: Mutex::new(()),
            state: RwLock::new(None),
            epoch: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// The ready session, if initialization has completed
    pub async fn ready(&self) -> Option<Arc<ReadySession>> {
        self.state.read().await.clone()
    }

    /// Connect, build the model and discover tools, once.
    pub async fn initialize(&self) -> Result<Arc<ReadySession>> {
        if let Some(ready) = self.ready().await {
            return Ok(ready);
        }

        let _attempt = self.init_lock.lock().await;
        if let Some(ready) = self.ready().await {
            return Ok(ready);
        }
        let epoch = self.epoch.load(Ordering::Acquire);

        let ready = match self.bring_up().await {
            Ok(ready) => Arc::new(ready),
            Err(e) => {
                tracing::error!(error = %e, "Error initializing session");
                return Err(AgentError::initialization(e));
            }
        };

        let mut state = self.state.write().await;
        if self.epoch.load(Ordering::Acquire) != epoch {
            drop(state);
            tracing::warn!("Session cleaned up while initializing, releasing connection");
            if let Err(e) = ready.release().await {
                tracing::warn!(error = %e, "Failed to release tool connection");
            }
            return Err(AgentError::initialization(AgentError::Connection(
                "session was cleaned up during initialization".into(),
            )));
        }

        tracing::info!(
            model = %ready.model.model_id(),
            tools = ?ready.tools.names(),
            "Session initialized"
        );
        *state = Some(Arc::clone(&ready));
        self.initialized.store(true, Ordering::Release);
        Ok(ready)
    }

    async fn bring_up(&self) -> Result<ReadySession> {
        let connection = self.connector.connect().await?;

        match self.acquire(connection.as_ref()).await {
            Ok((model, tools)) => Ok(ReadySession {
                tools: Arc::new(tools),
                model,
                connection,
            }),
            Err(e) => {
                if let Err(release) = connection.close().await {
                    tracing::warn!(error = %release, "Failed to release tool connection");
                }
                Err(e)
            }
        }
    }

    async fn acquire(&self, connection: &dyn ToolSession) -> Result<(ChatModel, ToolRegistry)> {
        let model = self.models.create()?;
        let tools = connection.list_tools().await?;
        Ok((model, ToolRegistry::from_tools(tools)))
    }

    /// Release the connection and forget the model and tools.
    ///
    /// Safe to call at any time; with nothing acquired it does nothing. An
    /// initialization still running fails and releases what it acquired.
    /// Requests still holding the ready session keep their model and tool
    /// handles but the connection behind the tools is closed.
    pub async fn cleanup(&self) -> Result<()> {
        let taken = {
            let mut state = self.state.write().await;
            self.epoch.fetch_add(1, Ordering::AcqRel);
            self.initialized.store(false, Ordering::Release);
            state.take()
        };

        let Some(ready) = taken else {
            tracing::debug!("Session cleanup: nothing to release");
            return Ok(());
        };

        ready.release().await?;
        tracing::info!("Session cleaned up");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::Notify;
    use tokio::time::timeout;

    use crate::testing::{CountingConnector, FlakyModelFactory, PendingConnector, StaticModelFactory};

    fn manager(connector: &Arc<CountingConnector>, models: Arc<dyn ModelFactory>) -> SessionManager {
        SessionManager::new(Arc::clone(connector) as Arc<dyn ToolConnector>, models)
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let connector = Arc::new(CountingConnector::with_tools(["list_doc_sources", "fetch_docs"]));
        let session = manager(&connector, Arc::new(StaticModelFactory::default()));

        let first = session.initialize().await.unwrap();
        let second = session.initialize().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.discoveries(), 1);
        assert_eq!(first.tool_count(), 2);
        assert!(session.is_initialized());
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_connect_once() {
        let connector = Arc::new(CountingConnector::with_tools(["fetch_docs"]));
        let session = manager(&connector, Arc::new(StaticModelFactory::default()));

        let (a, b) = tokio::join!(session.initialize(), session.initialize());

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_releases_connection() {
        let connector = Arc::new(CountingConnector::with_tools(["fetch_docs"]));
        let session = manager(&connector, Arc::new(FlakyModelFactory::failing(1)));

        let err = session.initialize().await.unwrap_err();

        assert!(matches!(err, AgentError::Initialization(_)));
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.closes(), 1);
        assert_eq!(connector.discoveries(), 0);
        assert!(!session.is_initialized());
        assert!(session.ready().await.is_none());

        // The next call starts over and succeeds
        session.initialize().await.unwrap();
        assert_eq!(connector.connects(), 2);
        assert!(session.is_initialized());
    }

    #[tokio::test]
    async fn test_connect_failure_is_initialization_error() {
        let connector = Arc::new(CountingConnector::refusing());
        let session = manager(&connector, Arc::new(StaticModelFactory::default()));

        let err = session.initialize().await.unwrap_err();

        match err {
            AgentError::Initialization(cause) => assert!(matches!(*cause, AgentError::Connection(_))),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(connector.closes(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_before_initialize_is_noop() {
        let connector = Arc::new(CountingConnector::with_tools(["fetch_docs"]));
        let session = manager(&connector, Arc::new(StaticModelFactory::default()));

        session.cleanup().await.unwrap();
        session.cleanup().await.unwrap();

        assert_eq!(connector.connects(), 0);
        assert_eq!(connector.closes(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_releases_and_allows_reconnect() {
        let connector = Arc::new(CountingConnector::with_tools(["fetch_docs"]));
        let session = manager(&connector, Arc::new(StaticModelFactory::default()));

        session.initialize().await.unwrap();
        session.cleanup().await.unwrap();

        assert_eq!(connector.closes(), 1);
        assert!(!session.is_initialized());

        session.initialize().await.unwrap();
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn test_discovery_failure_releases_connection() {
        let connector = Arc::new(CountingConnector::failing_discovery());
        let session = manager(&connector, Arc::new(StaticModelFactory::default()));

        let err = session.initialize().await.unwrap_err();

        match err {
            AgentError::Initialization(cause) => assert!(matches!(*cause, AgentError::Connection(_))),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.discoveries(), 1);
        assert_eq!(connector.closes(), 1);
        assert!(!session.is_initialized());
        assert!(session.ready().await.is_none());
    }

    #[tokio::test]
    async fn test_stalled_initialize_does_not_block_readers_or_cleanup() {
        let session = Arc::new(SessionManager::new(
            Arc::new(PendingConnector),
            Arc::new(StaticModelFactory::default()),
        ));

        let warmup = Arc::clone(&session);
        let attempt = tokio::spawn(async move { warmup.initialize().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let ready = timeout(Duration::from_secs(2), session.ready()).await;
        assert!(matches!(ready, Ok(None)));
        assert!(!session.is_initialized());

        let cleanup = timeout(Duration::from_secs(2), session.cleanup()).await;
        assert!(matches!(cleanup, Ok(Ok(()))));

        attempt.abort();
    }

    #[tokio::test]
    async fn test_cleanup_during_initialize_releases_late_connection() {
        let gate = Arc::new(Notify::new());
        let connector = Arc::new(CountingConnector::with_tools(["fetch_docs"]).with_gate(Arc::clone(&gate)));
        let session = Arc::new(manager(&connector, Arc::new(StaticModelFactory::default())));

        let warmup = Arc::clone(&session);
        let attempt = tokio::spawn(async move { warmup.initialize().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        session.cleanup().await.unwrap();
        gate.notify_one();

        let err = attempt.await.unwrap().unwrap_err();
        assert!(matches!(err, AgentError::Initialization(_)));
        assert_eq!(connector.connects(), 1);
        assert_eq!(connector.closes(), 1);
        assert!(!session.is_initialized());
        assert!(session.ready().await.is_none());

        // A fresh attempt after cleanup is published normally
        gate.notify_one();
        session.initialize().await.unwrap();
        assert!(session.is_initialized());
        assert_eq!(connector.connects(), 2);
    }
}
