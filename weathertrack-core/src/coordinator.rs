//! Fans one cycle's fetches out across all targets.

use std::time::Duration;

use futures::future::join_all;
use tracing::{error, info, instrument};

use crate::{
    model::{Observation, Target},
    retry::Fetcher,
};

/// Issues one fetch per target, staggered by a fixed delay, and waits for all
/// of them.
#[derive(Debug, Clone)]
pub struct Coordinator {
    fetcher: Fetcher,
    issue_delay: Duration,
}

impl Coordinator {
    pub fn new(fetcher: Fetcher, issue_delay: Duration) -> Self {
        Self { fetcher, issue_delay }
    }

    /// Run one fetch cycle and return the successful observations.
    ///
    /// Fetches run concurrently, but each is started `issue_delay` after the
    /// previous one. Failed targets contribute nothing; the result may be empty.
    #[instrument(skip_all, fields(targets = targets.len()))]
    pub async fn run_cycle(&self, targets: &[Target]) -> Vec<Observation> {
        let mut handles = Vec::with_capacity(targets.len());

        for (i, target) in targets.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.issue_delay).await;
            }

            let fetcher = self.fetcher.clone();
            let target = target.clone();
            handles.push(tokio::spawn(async move { fetcher.fetch(&target).await }));
        }

        let mut observations = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(obs)) => observations.push(obs),
                // already logged by the fetcher
                Ok(Err(_failure)) => {}
                Err(e) => error!("fetch task did not complete: {e}"),
            }
        }

        info!(
            "cycle fetched {} of {} targets",
            observations.len(),
            targets.len()
        );

        observations
    }
}
