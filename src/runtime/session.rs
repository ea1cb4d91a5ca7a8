use crate::dsl::{TaskDef, WorkflowDef};
use crate::error::EditError;
use crate::nodes::BodyKey;
use crate::nodes::registry::VariantRegistry;
use crate::overlay::{ExecutionRecord, ExecutionSummary};
use crate::runtime::catalog::TaskCatalog;
use crate::runtime::storage::{ExecutionFeed, WorkflowStore};
use crate::tree::WorkflowTree;
use crate::tree::editor::{Destination, Placement};
use crate::tree::view::RenderNode;
use anyhow::{Result, anyhow};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A structural edit as issued by the UI. New steps arrive as task
/// definitions and are built against the session's tree.
#[derive(Debug, Clone)]
pub enum EditCommand {
    Insert {
        target: String,
        tasks: Vec<TaskDef>,
        placement: Placement,
    },
    InsertInto {
        parent: Option<String>,
        body: BodyKey,
        index: usize,
        tasks: Vec<TaskDef>,
    },
    Delete(String),
    Move {
        id: String,
        destination: Destination,
    },
    Wrap(Vec<String>),
    Unwrap(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    /// Ids of the nodes a delete took out.
    Removed(Vec<String>),
    /// Id of the sub-workflow a wrap created.
    Wrapped(String),
    /// Ids of the nodes an unwrap put back.
    Unwrapped(Vec<String>),
}

/// What the session currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub workflow: Option<String>,
    pub version: Option<u32>,
    /// Generation of the load the tree came from; 0 before any load.
    pub generation: u64,
}

enum SessionEvent {
    Loaded {
        generation: u64,
        definition: WorkflowDef,
    },
    LoadFailed {
        generation: u64,
        error: String,
    },
    Records(Vec<ExecutionRecord>),
    Edit {
        command: EditCommand,
        reply: oneshot::Sender<Result<EditOutcome, EditError>>,
    },
    Serialize {
        reply: oneshot::Sender<Result<WorkflowDef>>,
    },
    View {
        reply: oneshot::Sender<Option<Vec<RenderNode>>>,
    },
    Summaries {
        reply: oneshot::Sender<BTreeMap<String, ExecutionSummary>>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    Shutdown,
}

/// Owns one workflow tree and applies every change to it from a single task.
///
/// Loads, execution records and user edits all arrive as events on one
/// channel, so they can never interleave mid-operation.
pub struct WorkflowSession {
    registry: Arc<VariantRegistry>,
    catalog: Option<Arc<dyn TaskCatalog>>,
    tree: Option<WorkflowTree>,
    requested: Arc<AtomicU64>,
    applied: u64,
    rx: mpsc::Receiver<SessionEvent>,
}

/// Cheap to clone; every clone talks to the same session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionEvent>,
    requested: Arc<AtomicU64>,
    store: Arc<dyn WorkflowStore>,
}

impl WorkflowSession {
    /// Starts the apply loop and returns a handle to it.
    pub fn spawn(
        registry: Arc<VariantRegistry>,
        store: Arc<dyn WorkflowStore>,
        catalog: Option<Arc<dyn TaskCatalog>>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(100);
        let requested = Arc::new(AtomicU64::new(0));
        let session = WorkflowSession {
            registry,
            catalog,
            tree: None,
            requested: requested.clone(),
            applied: 0,
            rx,
        };
        let worker = tokio::spawn(session.run());
        let handle = SessionHandle {
            tx,
            requested,
            store,
        };
        (handle, worker)
    }

    async fn run(mut self) {
        info!("Workflow session started");
        while let Some(event) = self.rx.recv().await {
            match event {
                SessionEvent::Loaded {
                    generation,
                    definition,
                } => self.on_loaded(generation, definition),
                SessionEvent::LoadFailed { generation, error } => {
                    error!(generation, error = %error, "Workflow load failed");
                }
                SessionEvent::Records(records) => match self.tree.as_mut() {
                    Some(tree) => {
                        tree.apply_execution(records);
                    }
                    None => debug!(count = records.len(), "no workflow loaded; dropping execution records"),
                },
                SessionEvent::Edit { command, reply } => {
                    let result = self.on_edit(command);
                    let _ = reply.send(result);
                }
                SessionEvent::Serialize { reply } => {
                    let result = match self.tree.as_ref() {
                        Some(tree) => tree.serialize().map_err(|e| {
                            error!(error = %e, "serializing the workflow tree failed");
                            anyhow!(e)
                        }),
                        None => Err(anyhow!(EditError::NoWorkflowLoaded)),
                    };
                    let _ = reply.send(result);
                }
                SessionEvent::View { reply } => {
                    let catalog = self.catalog.as_deref();
                    let view = self.tree.as_ref().map(|tree| tree.render_view(catalog));
                    let _ = reply.send(view);
                }
                SessionEvent::Summaries { reply } => {
                    let summaries = self
                        .tree
                        .as_ref()
                        .map(WorkflowTree::execution_summaries)
                        .unwrap_or_default();
                    let _ = reply.send(summaries);
                }
                SessionEvent::Status { reply } => {
                    let _ = reply.send(SessionStatus {
                        workflow: self.tree.as_ref().map(|t| t.name().to_string()),
                        version: self.tree.as_ref().and_then(WorkflowTree::version),
                        generation: self.applied,
                    });
                }
                SessionEvent::Shutdown => break,
            }
        }
        info!("Workflow session stopped");
    }

    fn on_loaded(&mut self, generation: u64, definition: WorkflowDef) {
        let latest = self.requested.load(Ordering::SeqCst);
        if generation < latest || generation <= self.applied {
            warn!(
                workflow = %definition.name,
                generation,
                latest,
                "discarding stale workflow load"
            );
            return;
        }
        let tree = WorkflowTree::build(definition, self.registry.clone());
        info!(workflow = %tree.name(), version = ?tree.version(), generation, "Workflow loaded");
        self.tree = Some(tree);
        self.applied = generation;
    }

    fn on_edit(&mut self, command: EditCommand) -> Result<EditOutcome, EditError> {
        let tree = self.tree.as_mut().ok_or(EditError::NoWorkflowLoaded)?;
        match command {
            EditCommand::Insert {
                target,
                tasks,
                placement,
            } => {
                let nodes = tree.create_nodes(tasks);
                tree.insert_child(&target, nodes, placement)?;
                Ok(EditOutcome::Applied)
            }
            EditCommand::InsertInto {
                parent,
                body,
                index,
                tasks,
            } => {
                let nodes = tree.create_nodes(tasks);
                tree.insert_into(parent.as_deref(), body, index, nodes)?;
                Ok(EditOutcome::Applied)
            }
            EditCommand::Delete(id) => {
                let removed = tree.delete_node(&id)?;
                Ok(EditOutcome::Removed(
                    removed.iter().map(|n| n.id().to_string()).collect(),
                ))
            }
            EditCommand::Move { id, destination } => {
                tree.move_node(&id, destination)?;
                Ok(EditOutcome::Applied)
            }
            EditCommand::Wrap(ids) => {
                let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
                Ok(EditOutcome::Wrapped(tree.wrap_in_sub_workflow(&ids)?))
            }
            EditCommand::Unwrap(id) => Ok(EditOutcome::Unwrapped(tree.unwrap_sub_workflow(&id)?)),
        }
    }
}

impl SessionHandle {
    /// Starts fetching a definition and returns the generation of the
    /// request. Only the result of the most recent request is ever applied.
    pub fn load(&self, name: &str, version: Option<u32>) -> u64 {
        let generation = self.next_generation();
        let store = self.store.clone();
        let tx = self.tx.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            let event = match store.fetch(&name, version).await {
                Ok(definition) => SessionEvent::Loaded {
                    generation,
                    definition,
                },
                Err(e) => SessionEvent::LoadFailed {
                    generation,
                    error: format!("{:#}", e),
                },
            };
            if tx.send(event).await.is_err() {
                debug!(workflow = %name, generation, "session closed before the load finished");
            }
        });
        generation
    }

    /// Replaces the tree with an already available definition.
    pub async fn load_definition(&self, definition: WorkflowDef) -> Result<u64> {
        let generation = self.next_generation();
        self.send(SessionEvent::Loaded {
            generation,
            definition,
        })
        .await?;
        Ok(generation)
    }

    pub async fn apply_records(&self, records: Vec<ExecutionRecord>) -> Result<()> {
        self.send(SessionEvent::Records(records)).await
    }

    /// Runs an edit. A rejected edit comes back as an `EditError` inside the
    /// `anyhow::Error`.
    pub async fn edit(&self, command: EditCommand) -> Result<EditOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::Edit { command, reply }).await?;
        Ok(rx.await??)
    }

    pub async fn serialize(&self) -> Result<WorkflowDef> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::Serialize { reply }).await?;
        rx.await?
    }

    /// Serializes the current tree and writes it back to the store.
    pub async fn save(&self) -> Result<WorkflowDef> {
        let definition = self.serialize().await?;
        self.store
            .save(&definition.name, definition.version, &definition)
            .await?;
        info!(workflow = %definition.name, version = ?definition.version, "Workflow saved");
        Ok(definition)
    }

    pub async fn view(&self) -> Result<Option<Vec<RenderNode>>> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::View { reply }).await?;
        Ok(rx.await?)
    }

    pub async fn summaries(&self) -> Result<BTreeMap<String, ExecutionSummary>> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::Summaries { reply }).await?;
        Ok(rx.await?)
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionEvent::Status { reply }).await?;
        Ok(rx.await?)
    }

    /// Polls `feed` every `every` and forwards each batch to the session.
    /// The task ends once the session is gone.
    pub fn watch_execution(
        &self,
        feed: Arc<dyn ExecutionFeed>,
        execution_id: &str,
        every: Duration,
    ) -> JoinHandle<()> {
        let tx = self.tx.clone();
        let execution_id = execution_id.to_string();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let records = match feed.poll(&execution_id).await {
                    Ok(records) => records,
                    Err(e) => {
                        warn!(execution_id = %execution_id, error = %e, "execution poll failed");
                        continue;
                    }
                };
                if tx.send(SessionEvent::Records(records)).await.is_err() {
                    debug!(execution_id = %execution_id, "session closed; stopping execution watch");
                    break;
                }
            }
        })
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionEvent::Shutdown).await
    }

    fn next_generation(&self) -> u64 {
        self.requested.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn send(&self, event: SessionEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| anyhow!("Workflow session is closed"))
    }
}
