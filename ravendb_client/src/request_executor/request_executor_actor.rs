use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Interval, MissedTickBehavior},
};
use tracing::instrument;

use crate::{document_conventions::DocumentConventions, ravendb_error::RavenDbError};

use super::{request_executor_state::ExecutorState, RequestExecutorMessage};

/// Background half of a [`RequestExecutor`](super::RequestExecutor).
///
/// Owns the timers and the tasks they start. Holds only a weak reference to the executor state
/// so that dropping every handle lets the state go away.
pub(crate) struct RequestExecutorActor {
    state: Weak<ExecutorState>,
    receiver: mpsc::Receiver<RequestExecutorMessage>,
    topology_updater: Option<JoinHandle<()>>,
    client_configuration_updater: Option<JoinHandle<()>>,
    failed_node_checker: Option<JoinHandle<()>>,
}

impl RequestExecutorActor {
    pub(crate) fn new(
        state: Weak<ExecutorState>,
        receiver: mpsc::Receiver<RequestExecutorMessage>,
    ) -> Self {
        Self {
            state,
            receiver,
            topology_updater: None,
            client_configuration_updater: None,
            failed_node_checker: None,
        }
    }

    /// Returns `false` once the actor should stop.
    fn handle_message(&mut self, msg: RequestExecutorMessage) -> bool {
        match msg {
            RequestExecutorMessage::UpdateTopology { force_update } => {
                self.start_topology_update(force_update)
            }
            RequestExecutorMessage::UpdateClientConfiguration => {
                self.start_client_configuration_update()
            }
            RequestExecutorMessage::SpeedTest => self.start_speed_test(),
            RequestExecutorMessage::Dispose { respond_to } => {
                self.shutdown();
                let _ = respond_to.send(());
                return false;
            }
        }
        true
    }

    /// The executor state, unless it is gone or disposed.
    fn live_state(&self) -> Option<Arc<ExecutorState>> {
        self.state.upgrade().filter(|state| !state.is_disposed())
    }

    fn start_topology_update(&mut self, force_update: bool) {
        let state = match self.live_state() {
            Some(state) => state,
            None => return,
        };
        if state.conventions.disable_topology_updates() {
            return;
        }
        if is_running(&self.topology_updater) {
            tracing::trace!("Topology update already running.");
            return;
        }

        self.topology_updater = Some(tokio::spawn(async move {
            if let Err(e) = state.refresh_topology(force_update).await {
                tracing::warn!("Background topology update failed. Caused by: {}", e);
            }
        }));
    }

    fn start_client_configuration_update(&mut self) {
        let state = match self.live_state() {
            Some(state) => state,
            None => return,
        };
        if is_running(&self.client_configuration_updater) {
            tracing::trace!("Client configuration update already running.");
            return;
        }

        self.client_configuration_updater = Some(tokio::spawn(async move {
            if let Err(e) = state.update_client_configuration().await {
                tracing::warn!("Client configuration update failed. Caused by: {}", e);
            }
        }));
    }

    fn start_speed_test(&mut self) {
        let state = match self.live_state() {
            Some(state) => state,
            None => return,
        };
        let selector = match state.node_selector.get() {
            Some(selector) => Arc::clone(selector),
            None => return,
        };

        let probe_state = Arc::downgrade(&state);
        selector.schedule_speed_test(move |node| {
            let state = probe_state.clone();
            async move {
                match state.upgrade() {
                    Some(state) => state.probe_node(&node).await,
                    None => Err(RavenDbError::InvalidOperation(
                        "The request executor is gone".to_string(),
                    )),
                }
            }
        });
    }

    /// Probes every failed node and puts the ones that answer back into rotation.
    fn check_failed_nodes(&mut self) {
        let state = match self.live_state() {
            Some(state) => state,
            None => return,
        };
        let selector = match state.node_selector.get() {
            Some(selector) => Arc::clone(selector),
            None => return,
        };
        let failed_nodes = selector.failed_nodes();
        if failed_nodes.is_empty() || is_running(&self.failed_node_checker) {
            return;
        }

        self.failed_node_checker = Some(tokio::spawn(async move {
            for node in failed_nodes {
                match state.probe_node(&node).await {
                    Ok(()) if !state.is_disposed() => selector.restore_node(&node),
                    Ok(()) => return,
                    Err(e) => {
                        tracing::debug!("Node {} is still unreachable. Caused by: {}", node, e)
                    }
                }
            }
        }));
    }

    fn shutdown(&mut self) {
        for handle in [
            self.topology_updater.take(),
            self.client_configuration_updater.take(),
            self.failed_node_checker.take(),
        ]
        .into_iter()
        .flatten()
        {
            handle.abort();
        }

        if let Some(state) = self.state.upgrade() {
            if let Some(selector) = state.node_selector.get() {
                selector.cancel_speed_test();
            }
        }
    }
}

fn is_running(handle: &Option<JoinHandle<()>>) -> bool {
    handle.as_ref().map_or(false, |handle| !handle.is_finished())
}

/// Interval whose first tick is one full period away.
fn new_timer(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(10));
    let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

#[instrument(level = "debug", name = "Running Request Executor Actor", skip_all)]
pub(crate) async fn run_request_executor_actor(
    mut actor: RequestExecutorActor,
    conventions: DocumentConventions,
) {
    let mut topology_timer = new_timer(conventions.topology_refresh_interval());
    let mut speed_test_timer = new_timer(conventions.speed_test_interval());
    let mut failed_node_timer = new_timer(conventions.failed_node_check_interval());

    loop {
        tokio::select! {
            msg = actor.receiver.recv() => match msg {
                Some(msg) => {
                    if !actor.handle_message(msg) {
                        break;
                    }
                }
                // Every handle is gone.
                None => break,
            },
            _ = topology_timer.tick() => {
                tracing::trace!("Topology refresh interval elapsed");
                actor.start_topology_update(false);
            }
            _ = speed_test_timer.tick() => actor.start_speed_test(),
            _ = failed_node_timer.tick() => actor.check_failed_nodes(),
        }
    }

    actor.shutdown();
    tracing::debug!("Request executor actor stopped");
}
