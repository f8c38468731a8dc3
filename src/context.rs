// Copyright 2023 ICON Foundation
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The relayer context: a shared shutdown signal fanned out to every
//! subscription and in-flight task.

use tokio::sync::broadcast;

/// RelayerContext carries the shutdown signal for all active subscriptions.
///
/// The initial `shutdown` trigger is provided by the caller of
/// [`RelayerContext::shutdown`]. Each spawned task holds a broadcast
/// receiver handle; when a graceful shutdown is initiated, a `()` value is
/// sent, every task reaches a safe terminal state and completes.
#[derive(Clone)]
pub struct RelayerContext {
    notify_shutdown: broadcast::Sender<()>,
}

impl RelayerContext {
    /// Creates a new RelayerContext.
    pub fn new() -> Self {
        let (notify_shutdown, _) = broadcast::channel(2);
        Self { notify_shutdown }
    }

    /// Returns a receiver handle for the shutdown signal.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Sends the shutdown signal to all subscribed tasks.
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }
}

impl Default for RelayerContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Listens for the context shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single value
/// is ever sent; once received, the flag is latched so later calls return
/// immediately.
#[derive(Debug)]
pub struct Shutdown {
    shutdown: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Whether the signal has already been observed.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        if self.shutdown {
            return;
        }
        // cannot lag: only one value is ever sent
        let _ = self.notify.recv().await;
        self.shutdown = true;
    }
}
