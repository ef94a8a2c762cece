// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use gridadmin_api::Client;
use gridadmin_app::Services;
use gridadmin_db::Store;
use time::{Date, OffsetDateTime};

/// Wires the HTTP backend and the local layout store into the UI.
pub struct HttpRuntime {
    client: Client,
    store: Store,
}

impl HttpRuntime {
    pub fn new(client: Client, store: Store) -> Self {
        Self { client, store }
    }

    #[cfg(test)]
    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl gridadmin_tui::AppRuntime for HttpRuntime {
    fn services(&mut self) -> Services<'_> {
        Services {
            backend: &mut self.client,
            layouts: &mut self.store,
            today: today(),
        }
    }
}

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}
