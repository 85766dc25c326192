use std::{sync::Arc, time::Duration};

use watchline_domain::services::telemetry::TelemetryGuard;
use watchline_watcher::AddressWatcher;

use crate::activity::RecentActivity;

#[derive(Clone)]
pub struct AppState {
    watcher: AddressWatcher,
    activity: Arc<RecentActivity>,
    telemetry: TelemetryGuard,
    poll_interval: Duration,
}

impl AppState {
    pub fn new(
        watcher: AddressWatcher,
        activity: Arc<RecentActivity>,
        telemetry: TelemetryGuard,
        poll_interval: Duration,
    ) -> Self {
        Self {
            watcher,
            activity,
            telemetry,
            poll_interval,
        }
    }

    pub fn watcher(&self) -> &AddressWatcher {
        &self.watcher
    }

    pub fn activity(&self) -> &RecentActivity {
        self.activity.as_ref()
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
