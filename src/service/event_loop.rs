//! Tokio event loop around [`InputService`]
//!
//! One task owns the service. Producers hold a [`ServiceHandle`] and push
//! events through a bounded channel; timer tasks post their fires into the
//! same channel, so every engine sees events strictly in arrival order.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{InputService, ServiceEvent, ServiceOutput, ServiceStats};
use crate::config::{AbilityLaunchConfig, Config};
use crate::dispatch::AbilityDispatcher;
use crate::input::error::{InputError, Result};
use crate::key_command::ExcludeKey;
use crate::timer::TokioTimerService;

/// Producer side of a running service
pub struct ServiceHandle {
    sender: mpsc::Sender<ServiceEvent>,
    task: JoinHandle<ServiceStats>,
}

impl ServiceHandle {
    /// Clone of the event sender for additional producers
    pub fn sender(&self) -> mpsc::Sender<ServiceEvent> {
        self.sender.clone()
    }

    /// Queue an event, waiting for channel capacity
    pub async fn send(&self, event: ServiceEvent) -> Result<()> {
        self.sender
            .send(event)
            .await
            .map_err(|_| InputError::ChannelClosed)
    }

    /// Queue an event without waiting
    pub fn try_send(&self, event: ServiceEvent) -> Result<()> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => InputError::EventQueueFull,
            mpsc::error::TrySendError::Closed(_) => InputError::ChannelClosed,
        })
    }

    /// Stop the loop after the queued events and return its final statistics
    pub async fn shutdown(self) -> Result<ServiceStats> {
        if self.sender.send(ServiceEvent::Shutdown).await.is_err() {
            debug!("Service loop already stopped");
        }
        drop(self.sender);
        self.task
            .await
            .map_err(|e| InputError::TaskFailed(e.to_string()))
    }
}

/// Start the service loop on the current tokio runtime
pub fn spawn_service(
    config: &Config,
    abilities: Result<AbilityLaunchConfig>,
    exclude_keys: Vec<ExcludeKey>,
    dispatcher: Arc<dyn AbilityDispatcher>,
    outputs: mpsc::Sender<ServiceOutput>,
) -> ServiceHandle {
    let (sender, receiver) = mpsc::channel(config.service.event_queue_capacity.max(1));
    let timers = TokioTimerService::new(&sender).with_capacity(config.service.timer_capacity);

    let mut service = InputService::new(config, timers, dispatcher);
    service.load_abilities(abilities, exclude_keys);

    let task = tokio::spawn(run_service_loop(service, receiver, outputs));
    ServiceHandle { sender, task }
}

async fn run_service_loop(
    mut service: InputService<TokioTimerService>,
    mut receiver: mpsc::Receiver<ServiceEvent>,
    outputs: mpsc::Sender<ServiceOutput>,
) -> ServiceStats {
    info!("🚀 Input service loop started");
    let mut downstream_open = true;

    while let Some(event) = receiver.recv().await {
        if matches!(event, ServiceEvent::Shutdown) {
            info!("🛑 Input service shutdown requested");
            break;
        }

        for output in service.process(event) {
            if !downstream_open {
                continue;
            }
            if outputs.send(output).await.is_err() {
                warn!("Downstream receiver closed, discarding further output");
                downstream_open = false;
            }
        }
    }

    let stats = service.stats();
    info!(
        events = stats.events,
        outputs = stats.outputs,
        timer_fires = stats.timer_fires,
        "Input service loop stopped"
    );
    stats
}
