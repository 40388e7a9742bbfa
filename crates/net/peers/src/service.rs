//! Async driver for a [`PeerPool`].
//!
//! The pool itself is single-owner and synchronous. [`PoolService`] owns it on
//! one task and multiplexes owner commands, transport input and timers; the
//! owner talks to it through a cloneable [`PoolHandle`].

use std::future;

use tlsp2p_net_peer::{Candidate, PeerId, Transport};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use crate::broadcast::SendRequest;
use crate::error::PoolError;
use crate::events::{EventEmitter, PoolEvent, PoolStatus};
use crate::manager::{AddReport, PeerPool};

enum PoolCommand<S> {
    Initiate {
        seeds: Vec<Candidate<S>>,
        reply: oneshot::Sender<()>,
    },
    AddPool {
        candidates: Vec<Candidate<S>>,
        reply: oneshot::Sender<AddReport>,
    },
    AddLive {
        candidates: Vec<Candidate<S>>,
        reply: oneshot::Sender<AddReport>,
    },
    Send {
        request: SendRequest,
        reply: oneshot::Sender<Result<Vec<PeerId>, PoolError>>,
    },
    Kill {
        id: PeerId,
        reason: Option<String>,
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<PoolStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Owner-side handle to a running [`PoolService`].
///
/// Dropping every handle shuts the pool down.
pub struct PoolHandle<S> {
    commands: mpsc::UnboundedSender<PoolCommand<S>>,
    events: EventEmitter,
}

impl<S> Clone for PoolHandle<S> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            events: self.events.clone(),
        }
    }
}

impl<S> std::fmt::Debug for PoolHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl<S> PoolHandle<S> {
    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> PoolCommand<S>,
    ) -> Result<R, PoolError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| PoolError::ServiceClosed)?;
        rx.await.map_err(|_| PoolError::ServiceClosed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    pub async fn initiate(&self, seeds: Vec<Candidate<S>>) -> Result<(), PoolError> {
        self.request(|reply| PoolCommand::Initiate { seeds, reply })
            .await
    }

    pub async fn add_pool(&self, candidates: Vec<Candidate<S>>) -> Result<AddReport, PoolError> {
        self.request(|reply| PoolCommand::AddPool { candidates, reply })
            .await
    }

    pub async fn add_live(&self, candidates: Vec<Candidate<S>>) -> Result<AddReport, PoolError> {
        self.request(|reply| PoolCommand::AddLive { candidates, reply })
            .await
    }

    pub async fn send(&self, request: SendRequest) -> Result<Vec<PeerId>, PoolError> {
        self.request(|reply| PoolCommand::Send { request, reply })
            .await?
    }

    pub async fn kill(&self, id: PeerId, reason: Option<String>) -> Result<(), PoolError> {
        self.request(|reply| PoolCommand::Kill { id, reason, reply })
            .await
    }

    pub async fn status(&self) -> Result<PoolStatus, PoolError> {
        self.request(|reply| PoolCommand::Status { reply }).await
    }

    pub async fn shutdown(&self) -> Result<(), PoolError> {
        self.request(|reply| PoolCommand::Shutdown { reply }).await
    }
}

/// Runs a [`PeerPool`] until it has shut down and drained.
pub struct PoolService<T: Transport> {
    pool: PeerPool<T>,
    commands: mpsc::UnboundedReceiver<PoolCommand<T::Stream>>,
    /// All handles dropped.
    orphaned: bool,
}

impl<T: Transport> PoolService<T> {
    pub fn new(pool: PeerPool<T>) -> (Self, PoolHandle<T::Stream>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = PoolHandle {
            commands: tx,
            events: pool.events().clone(),
        };
        let service = Self {
            pool,
            commands: rx,
            orphaned: false,
        };
        (service, handle)
    }

    pub async fn run(mut self) {
        info!("peer pool service started");
        loop {
            self.pool.process_ready();
            if self.pool.is_drained() {
                break;
            }

            let deadline = self.pool.next_deadline();
            tokio::select! {
                biased;

                command = self.commands.recv(), if !self.orphaned => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("all pool handles dropped; shutting down");
                        self.orphaned = true;
                        self.pool.shutdown();
                    }
                },
                input = self.pool.next_input() => {
                    if let Some(input) = input {
                        self.pool.handle_input(input);
                    }
                }
                () = wait_until(deadline) => {}
            }
        }
        info!("peer pool service stopped");
    }

    fn handle_command(&mut self, command: PoolCommand<T::Stream>) {
        match command {
            PoolCommand::Initiate { seeds, reply } => {
                self.pool.initiate(seeds);
                let _ = reply.send(());
            }
            PoolCommand::AddPool { candidates, reply } => {
                let _ = reply.send(self.pool.add_pool(candidates));
            }
            PoolCommand::AddLive { candidates, reply } => {
                let _ = reply.send(self.pool.add_live(candidates));
            }
            PoolCommand::Send { request, reply } => {
                let _ = reply.send(self.pool.send(request));
            }
            PoolCommand::Kill { id, reason, reply } => {
                self.pool.kill(&id, reason.as_deref());
                let _ = reply.send(());
            }
            PoolCommand::Status { reply } => {
                let _ = reply.send(self.pool.status());
            }
            PoolCommand::Shutdown { reply } => {
                self.pool.shutdown();
                let _ = reply.send(());
            }
        }
    }
}

impl<T> PoolService<T>
where
    T: Transport + Send + 'static,
    T::Peer: Send + 'static,
    T::Stream: Send + 'static,
{
    /// Spawns the service on the current tokio runtime.
    pub fn spawn(pool: PeerPool<T>) -> (PoolHandle<T::Stream>, JoinHandle<()>) {
        let (service, handle) = Self::new(pool);
        (handle, tokio::spawn(service.run()))
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}
