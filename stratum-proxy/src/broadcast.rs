//! Broadcaster (C6): fans a new job out to every live session with bounded
//! concurrency, grounded in the original `broadcastNewJobs`'s snapshot-under-
//! read-lock-then-fan-out shape.

use crate::model::BlockTemplate;
use crate::notify;
use crate::session::SessionRegistry;

use ii_async_compat::tokio::sync::Semaphore;
use ii_logging::macros::*;

use std::sync::Arc;

/// Caps the number of concurrent outbound job pushes in flight, mirroring
/// the original's buffered `bcast` channel of 1024.
const MAX_CONCURRENT_PUSHES: usize = 1024;

pub async fn broadcast_new_job(registry: &SessionRegistry, template: Arc<BlockTemplate>) {
    let sessions = registry.snapshot();
    if sessions.is_empty() {
        return;
    }

    info!("broadcasting new job {} to {} stratum miners", template.job_id, sessions.len());
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_PUSHES));
    let mut tasks = Vec::with_capacity(sessions.len());

    for session in sessions {
        let semaphore = semaphore.clone();
        let template = template.clone();
        tasks.push(ii_async_compat::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let messages = notify::job_messages(&template, &session.extranonce());
            if let Err(e) = session.send_all(messages).await {
                warn!("job transmit error to {}@{}: {}", session.login(), session.peer(), e);
                session.close();
            }
        }));
    }

    for task in tasks {
        let _ = task.await;
    }
}
