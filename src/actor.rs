//! Single-owner task around [`Session`].
//!
//! One tokio task owns the session and applies commands one at a time, so
//! each update is atomic with respect to every other. File reads and parse
//! calls run as separate tasks and report back through an internal channel,
//! tagged with the entry (and ticket) they were started for.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

use crate::collaborator::ParseBackend;
use crate::error::{CollaboratorError, ReadError, SessionError};
use crate::intake::{self, EntryId, FileSource, Payload, PendingRead};
use crate::session::{ParseOutcome, ParseRequest, ParseTicket, Session, Snapshot};
use crate::tree::TreeLine;

const COMMAND_BUFFER: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

enum Command {
    Submit {
        sources: Vec<FileSource>,
        reply: Reply<Vec<EntryId>>,
    },
    Select {
        id: EntryId,
        reply: Reply<()>,
    },
    Remove {
        id: EntryId,
        reply: Reply<()>,
    },
    Reset {
        reply: Reply<()>,
    },
    SubmitPassword {
        secret: String,
        reply: Reply<()>,
    },
    SkipPassword {
        reply: Reply<()>,
    },
    RetryPassword {
        reply: Reply<()>,
    },
    Toggle {
        path: String,
        reply: Reply<bool>,
    },
    SetCollapsed {
        path: String,
        collapsed: bool,
        reply: Reply<()>,
    },
    Tree {
        reply: Reply<Vec<TreeLine>>,
    },
}

enum Event {
    ReadFinished {
        id: EntryId,
        batch_index: usize,
        result: Result<Payload, ReadError>,
    },
    ParseFinished {
        ticket: ParseTicket,
        result: Result<Value, CollaboratorError>,
    },
}

/// Cloneable handle to the session task. The task stops once every handle
/// has been dropped.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl SessionHandle {
    /// Spawns the session task on the current tokio runtime.
    pub fn spawn(backend: Arc<dyn ParseBackend>) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshots_tx, snapshots_rx) = watch::channel(Snapshot::default());

        let actor = Actor {
            session: Session::new(),
            backend,
            events: events_tx,
            snapshots: snapshots_tx,
        };
        tokio::spawn(actor.run(commands_rx, events_rx));

        Self {
            commands: commands_tx,
            snapshots: snapshots_rx,
        }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)?
    }

    pub async fn submit(&self, sources: Vec<FileSource>) -> Result<Vec<EntryId>, SessionError> {
        self.request(|reply| Command::Submit { sources, reply }).await
    }

    pub async fn select(&self, id: &str) -> Result<(), SessionError> {
        let id = id.to_string();
        self.request(|reply| Command::Select { id, reply }).await
    }

    pub async fn remove(&self, id: &str) -> Result<(), SessionError> {
        let id = id.to_string();
        self.request(|reply| Command::Remove { id, reply }).await
    }

    pub async fn reset(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Reset { reply }).await
    }

    pub async fn submit_password(&self, secret: &str) -> Result<(), SessionError> {
        let secret = secret.to_string();
        self.request(|reply| Command::SubmitPassword { secret, reply })
            .await
    }

    pub async fn skip_password(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::SkipPassword { reply }).await
    }

    pub async fn retry_password(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::RetryPassword { reply }).await
    }

    pub async fn toggle(&self, path: &str) -> Result<bool, SessionError> {
        let path = path.to_string();
        self.request(|reply| Command::Toggle { path, reply }).await
    }

    pub async fn collapse(&self, path: &str) -> Result<(), SessionError> {
        self.set_collapsed(path, true).await
    }

    pub async fn expand(&self, path: &str) -> Result<(), SessionError> {
        self.set_collapsed(path, false).await
    }

    async fn set_collapsed(&self, path: &str, collapsed: bool) -> Result<(), SessionError> {
        let path = path.to_string();
        self.request(|reply| Command::SetCollapsed {
            path,
            collapsed,
            reply,
        })
        .await
    }

    pub async fn tree(&self) -> Result<Vec<TreeLine>, SessionError> {
        self.request(|reply| Command::Tree { reply }).await
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Waits until no read or parse is outstanding.
    pub async fn settled(&self) -> Result<Snapshot, SessionError> {
        let mut snapshots = self.subscribe();
        let snapshot = snapshots
            .wait_for(Snapshot::is_settled)
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok((*snapshot).clone())
    }
}

struct Actor {
    session: Session,
    backend: Arc<dyn ParseBackend>,
    events: mpsc::UnboundedSender<Event>,
    snapshots: watch::Sender<Snapshot>,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(event) = events.recv() => {
                    self.handle_event(event);
                    self.publish();
                }
            }
        }
        debug!("Session task stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit { sources, reply } => {
                let reads = self.session.submit_batch(sources);
                let ids = reads.iter().map(|r| r.id.clone()).collect();
                for read in reads {
                    self.spawn_read(read);
                }
                self.respond(reply, Ok(ids));
            }
            Command::Select { id, reply } => {
                let result = self.session.select(&id).map(|request| {
                    if let Some(request) = request {
                        self.spawn_parse(request);
                    }
                });
                self.respond(reply, result);
            }
            Command::Remove { id, reply } => {
                let result = self.session.remove(&id);
                self.respond(reply, result);
            }
            Command::Reset { reply } => {
                self.session.reset();
                self.respond(reply, Ok(()));
            }
            Command::SubmitPassword { secret, reply } => {
                let result = self
                    .session
                    .submit_password(&secret)
                    .map(|request| self.spawn_parse(request));
                self.respond(reply, result);
            }
            Command::SkipPassword { reply } => {
                let result = self.session.skip_password();
                self.respond(reply, result);
            }
            Command::RetryPassword { reply } => {
                let result = self.session.retry_password();
                self.respond(reply, result);
            }
            Command::Toggle { path, reply } => {
                let result = self.session.toggle(&path);
                self.respond(reply, result);
            }
            Command::SetCollapsed {
                path,
                collapsed,
                reply,
            } => {
                let result = self.session.set_collapsed(&path, collapsed);
                self.respond(reply, result);
            }
            Command::Tree { reply } => {
                let lines = self.session.tree_lines();
                let _ = reply.send(Ok(lines));
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::ReadFinished {
                id,
                batch_index,
                result,
            } => {
                if let Some(request) = self.session.complete_read(&id, batch_index, result) {
                    self.spawn_parse(request);
                }
            }
            Event::ParseFinished { ticket, result } => {
                if self.session.finish_parse(&ticket, result) == ParseOutcome::Applied {
                    info!(entry_id = %ticket.entry, seq = ticket.seq, "Parse result applied");
                }
            }
        }
    }

    /// Publishes before replying so a caller never observes an older snapshot
    /// after its command returns.
    fn respond<T>(&self, reply: Reply<T>, result: Result<T, SessionError>) {
        self.publish();
        let _ = reply.send(result);
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.session.snapshot());
    }

    fn spawn_read(&self, read: PendingRead) {
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = intake::read_source(&read.source, read.encoding).await;
            let _ = events.send(Event::ReadFinished {
                id: read.id,
                batch_index: read.batch_index,
                result,
            });
        });
    }

    fn spawn_parse(&self, request: ParseRequest) {
        let events = self.events.clone();
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            let result = backend.parse(&request).await;
            let _ = events.send(Event::ParseFinished {
                ticket: request.ticket,
                result,
            });
        });
    }
}
