use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::session::driver::SessionDriver;
use crate::session::machine::{Event, Session, SessionKey};
use crate::session::Delivery;

pub struct Inbound {
    pub event: Event,
    pub reply: Arc<dyn Delivery>,
}

struct SessionHandle {
    generation: u64,
    tx: mpsc::UnboundedSender<Inbound>,
    cancel_epoch: Arc<AtomicU64>,
}

type SessionMap = Arc<Mutex<HashMap<SessionKey, SessionHandle>>>;

/// One queue and one worker task per active session.
///
/// Events of a session run strictly in order; different sessions run concurrently.
pub struct SessionRegistry {
    driver: Arc<SessionDriver>,
    idle_timeout: Duration,
    sessions: SessionMap,
    next_generation: AtomicU64,
}

impl SessionRegistry {
    pub fn new(driver: Arc<SessionDriver>, idle_timeout: Duration) -> Self {
        SessionRegistry {
            driver,
            idle_timeout,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Queues `event` for the session, starting a worker if none is running.
    ///
    /// A cancel bumps the session's epoch before it is queued so an in-flight
    /// operation's result is dropped.
    pub fn dispatch(&self, session_id: SessionKey, event: Event, reply: Arc<dyn Delivery>) {
        let mut sessions = self.sessions.lock();
        let handle = sessions
            .entry(session_id)
            .or_insert_with(|| self.spawn_worker(session_id));
        if matches!(event, Event::Cancel) {
            handle.cancel_epoch.fetch_add(1, Ordering::SeqCst);
        }

        let inbound = Inbound { event, reply };
        if let Err(mpsc::error::SendError(inbound)) = handle.tx.send(inbound) {
            warn!("Worker for session {session_id} is gone; starting a new one");
            let fresh = self.spawn_worker(session_id);
            if fresh.tx.send(inbound).is_err() {
                warn!("Dropping event for session {session_id}");
            }
            sessions.insert(session_id, fresh);
        }
    }

    #[cfg(test)]
    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    fn spawn_worker(&self, session_id: SessionKey) -> SessionHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel_epoch = Arc::new(AtomicU64::new(0));
        debug!("Starting worker for session {session_id} (generation {generation})");
        tokio::spawn(run_worker(
            session_id,
            generation,
            rx,
            cancel_epoch.clone(),
            self.driver.clone(),
            self.sessions.clone(),
            self.idle_timeout,
        ));
        SessionHandle {
            generation,
            tx,
            cancel_epoch,
        }
    }
}

async fn run_worker(
    session_id: SessionKey,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<Inbound>,
    cancel_epoch: Arc<AtomicU64>,
    driver: Arc<SessionDriver>,
    sessions: SessionMap,
    idle_timeout: Duration,
) {
    let mut session = Session::new(session_id);
    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(inbound)) => {
                driver
                    .process(
                        &mut session,
                        inbound.event,
                        &cancel_epoch,
                        inbound.reply.as_ref(),
                    )
                    .await;
            }
            Ok(None) => break,
            Err(_) => {
                let mut map = sessions.lock();
                if !rx.is_empty() {
                    continue;
                }
                if map
                    .get(&session_id)
                    .is_some_and(|handle| handle.generation == generation)
                {
                    map.remove(&session_id);
                }
                break;
            }
        }
    }

    drop(session);
    let dir = driver.session_dir(session_id);
    match tokio::fs::remove_dir(&dir).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => debug!("Kept session dir {}: {err}", dir.display()),
    }
    info!("Session {session_id} closed after {}s idle", idle_timeout.as_secs());
}
