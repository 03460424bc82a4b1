//! Glue between the bridge client and the stores.
//!
//! One task owns the current [`BridgeClient`]. It listens to the event bus
//! for settings changes and to the client for states and events, so the
//! reconnect-on-change logic and the feed bookkeeping never race each other.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use lco_types::event::Event;
use lco_types::ipc::OverlayEvent;
use lco_types::settings::SettingKey;

use crate::client::{BridgeClient, ClientEvent, ClientOptions, ReconnectPolicy};
use crate::events::EventBus;
use crate::filter::OriginFilter;
use crate::runtime::RuntimeStore;
use crate::settings::SettingsStore;

pub struct EventClientAdapter {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl EventClientAdapter {
    /// Connect with the current settings and keep following them.
    pub fn start(
        settings: Arc<SettingsStore>,
        runtime: Arc<RuntimeStore>,
        bus: EventBus,
        policy: ReconnectPolicy,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = Worker {
            settings,
            runtime,
            bus,
            policy,
        };
        let task = tokio::spawn(worker.run(shutdown_rx));
        Self { shutdown, task }
    }

    /// Disconnect the client and stop following settings.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Event adapter task ended abnormally: {e}");
        }
    }
}

struct Worker {
    settings: Arc<SettingsStore>,
    runtime: Arc<RuntimeStore>,
    bus: EventBus,
    policy: ReconnectPolicy,
}

impl Worker {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        // Subscribe before reading settings so no change slips between the two.
        let mut bus_rx = self.bus.subscribe();
        let current = self.settings.get_all();

        let mut filter = self.filter_from(&current.allowed_origins);
        let mut options = self.options_from_settings();
        let (mut client, mut client_rx) = self.spawn_client(options.clone());

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                Some(event) = client_rx.recv() => self.on_client_event(event, &filter),
                msg = bus_rx.recv() => match msg {
                    Ok(OverlayEvent::SettingsChanged { key, value }) => {
                        if key == SettingKey::AllowedOrigins {
                            filter = self.filter_from(value.as_str().unwrap_or_default());
                        } else if key.affects_connection() {
                            let next = self.options_from_settings();
                            if next != options {
                                options = next;
                                (client, client_rx) = self.restart(client, options.clone()).await;
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        warn!("Event adapter lagged by {n} bus events, resyncing settings");
                        filter = self.filter_from(&self.settings.get_all().allowed_origins);
                        let next = self.options_from_settings();
                        if next != options {
                            options = next;
                            (client, client_rx) = self.restart(client, options.clone()).await;
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        client.disconnect().await;
        while let Ok(event) = client_rx.try_recv() {
            self.on_client_event(event, &filter);
        }
        debug!("Event adapter stopped");
    }

    fn options_from_settings(&self) -> ClientOptions {
        ClientOptions {
            reconnect: self.policy.clone(),
            ..ClientOptions::from_settings(&self.settings.get_all())
        }
    }

    fn filter_from(&self, list: &str) -> OriginFilter {
        let filter = OriginFilter::parse(list);
        if filter.is_empty() {
            info!("Accepting events from all rooms");
        } else {
            info!("Accepting events from rooms {:?}", filter.rooms());
        }
        filter
    }

    fn spawn_client(
        &self,
        options: ClientOptions,
    ) -> (BridgeClient, mpsc::UnboundedReceiver<ClientEvent>) {
        info!("Connecting to event bridge at {}", options.url);
        let (tx, rx) = mpsc::unbounded_channel();
        (BridgeClient::connect(options, tx), rx)
    }

    /// Bridge parameters changed: drop the old connection and its feed, then
    /// connect again. The old receiver is dropped with anything still queued.
    async fn restart(
        &self,
        old: BridgeClient,
        options: ClientOptions,
    ) -> (BridgeClient, mpsc::UnboundedReceiver<ClientEvent>) {
        old.disconnect().await;
        self.runtime.clear_messages();
        self.bus.send(OverlayEvent::FeedCleared);
        self.spawn_client(options)
    }

    fn on_client_event(&self, event: ClientEvent, filter: &OriginFilter) {
        match event {
            ClientEvent::State(state) => {
                if self.runtime.set_connection_state(state) {
                    info!("Bridge connection {state}");
                    self.bus
                        .send(OverlayEvent::ConnectionStateUpdated { state });
                }
            }
            ClientEvent::Event(event) => {
                if !filter.allows(&event) {
                    trace!("Filtered {} event from another room", event.kind());
                    return;
                }
                if let Event::OnlineUpdate(update) = &event {
                    let online = Some(update.online);
                    self.runtime.set_online_user_count(online);
                    self.bus.send(OverlayEvent::OnlineCountUpdated { online });
                    return;
                }
                let entry = self.runtime.add_message(event);
                self.bus.send(OverlayEvent::FeedAppended { entry });
            }
        }
    }
}
