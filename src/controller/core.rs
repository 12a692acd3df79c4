// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State and steps shared by the three controllers.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::discovery::{Entity, EntityTable};
use crate::error::{Error, ProtocolError};
use crate::event::EventBus;
use crate::protocol::Transport;

use super::lifecycle::{ControllerKind, Lifecycle, LifecycleState};
use super::publisher::Publisher;
use super::ControllerSettings;

#[derive(Debug)]
pub(crate) struct ControllerCore<T, K> {
    lifecycle: Lifecycle,
    publisher: Publisher<T>,
    entities: Arc<EntityTable<K>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T, K> ControllerCore<T, K>
where
    T: Transport,
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
{
    /// Derives every entity; `Constructing → ConfigsBuilt`.
    pub(crate) fn build(
        kind: ControllerKind,
        transport: T,
        settings: &ControllerSettings,
        events: EventBus,
        configured: impl IntoIterator<Item = (K, String)>,
    ) -> Result<Self, Error> {
        let lifecycle = Lifecycle::new(kind, events.clone());

        let entries = configured.into_iter().map(|(key, name)| {
            let entity = Entity::new(
                &settings.prefix,
                kind.entity_kind(),
                &key,
                name,
                Arc::clone(&settings.device),
            );
            (key, entity)
        });
        let entities = EntityTable::build(kind.as_str(), entries).inspect_err(|e| {
            tracing::error!(controller = %kind, error = %e, "Invalid entity configuration");
        })?;
        lifecycle.advance(LifecycleState::ConfigsBuilt);

        Ok(Self {
            lifecycle,
            publisher: Publisher::new(transport, settings.timing.clone(), events),
            entities: Arc::new(entities),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn kind(&self) -> ControllerKind {
        self.lifecycle.kind()
    }

    pub(crate) fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub(crate) fn publisher(&self) -> &Publisher<T> {
        &self.publisher
    }

    pub(crate) fn entities(&self) -> &Arc<EntityTable<K>> {
        &self.entities
    }

    pub(crate) fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// `ConfigsBuilt → ConfigsPublished`.
    pub(crate) async fn publish_configs(&self) -> Result<(), Error> {
        self.publisher
            .publish_configs(self.entities.entities())
            .await
            .map_err(|(entity, e)| self.abort(entity, "publish config", e))?;
        self.lifecycle.advance(LifecycleState::ConfigsPublished);
        Ok(())
    }

    /// `ConfigsPublished → Available`.
    pub(crate) async fn announce_online(&self) -> Result<(), Error> {
        for entity in self.entities.entities() {
            self.publisher
                .announce(entity, true)
                .await
                .map_err(|e| self.abort(entity, "publish availability", e))?;
        }
        self.lifecycle.advance(LifecycleState::Available);
        Ok(())
    }

    /// `Available → Running`.
    pub(crate) fn mark_running(&self) {
        self.lifecycle.advance(LifecycleState::Running);
    }

    /// Logs a startup failure that leaves earlier entities published.
    pub(crate) fn abort(
        &self,
        entity: &Entity,
        operation: &'static str,
        error: impl Into<Error>,
    ) -> Error {
        let error = error.into();
        tracing::error!(
            controller = %self.kind(),
            entity = %entity.unique_id(),
            operation,
            state = %self.state(),
            error = %error,
            "Controller start aborted, entities published so far stay published"
        );
        error
    }

    /// Runs `task` in the background until the controller closes.
    pub(crate) fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) {
        self.tasks.lock().push(tokio::spawn(task));
    }

    /// `→ Closing`; stops background tasks from picking up new work.
    pub(crate) fn begin_close(&self) -> Result<(), Error> {
        self.lifecycle.begin_close()?;
        self.cancel.cancel();
        Ok(())
    }

    /// Publishes `offline` for every entity, best effort.
    pub(crate) async fn announce_offline(&self) {
        for entity in self.entities.entities() {
            if let Err(e) = self.publisher.announce(entity, false).await {
                tracing::warn!(
                    controller = %self.kind(),
                    entity = %entity.unique_id(),
                    error = %e,
                    "Failed to publish offline"
                );
            }
        }
    }

    /// Waits for background tasks; `Closing → Closed`.
    ///
    /// Returns the first task that did not finish normally.
    pub(crate) async fn finish_close(&self) -> Result<(), Error> {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let mut first = None;
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(controller = %self.kind(), error = %e, "Controller task failed");
                first.get_or_insert(Error::TaskFailed {
                    controller: self.kind().to_string(),
                    message: e.to_string(),
                });
            }
        }
        self.lifecycle.advance(LifecycleState::Closed);
        first.map_or(Ok(()), Err)
    }

    /// Logs and collects an unsubscribe failure during close.
    pub(crate) fn close_failure(&self, topic: &str, error: ProtocolError) -> Error {
        tracing::error!(controller = %self.kind(), topic = %topic, error = %error, "Failed to unsubscribe");
        error.into()
    }
}

impl<T, K> Drop for ControllerCore<T, K> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::Device;
    use crate::protocol::LoopbackTransport;

    fn core() -> ControllerCore<LoopbackTransport, String> {
        ControllerCore::build(
            ControllerKind::TemperatureSensor,
            LoopbackTransport::new(),
            &ControllerSettings::new(Device::new("rpi", "Heating")),
            EventBus::new(),
            [("28-1".to_string(), "Flow".to_string())],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn finish_close_reports_panicked_task() {
        let core = core();
        core.spawn(async { panic!("poller exploded") });
        core.spawn(async {});
        tokio::task::yield_now().await;

        core.begin_close().unwrap();
        let err = core.finish_close().await.unwrap_err();

        assert!(matches!(
            err,
            Error::TaskFailed { ref controller, .. } if controller == "temperature_sensor"
        ));
        assert_eq!(core.state(), LifecycleState::Closed);
    }

    #[tokio::test]
    async fn finish_close_is_ok_when_tasks_end_normally() {
        let core = core();
        let cancel = core.cancellation();
        core.spawn(async move { cancel.cancelled().await });

        core.begin_close().unwrap();
        core.finish_close().await.unwrap();
        assert_eq!(core.state(), LifecycleState::Closed);
    }
}
