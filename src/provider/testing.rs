//! Scripted provider for hub and connection tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{
    DataProvider, ProviderError, ProviderResult, SectionOccupancy, Snapshot, SpaceDetail, Ticket,
};

/// Provider whose answers are set by the test
pub struct ScriptedProvider {
    snapshot: Mutex<Snapshot>,
    fail_snapshot: AtomicBool,
    fail_requests: AtomicBool,
    snapshot_calls: AtomicUsize,
    snapshot_delay: Mutex<Duration>,
}

impl ScriptedProvider {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            fail_snapshot: AtomicBool::new(false),
            fail_requests: AtomicBool::new(false),
            snapshot_calls: AtomicUsize::new(0),
            snapshot_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_snapshot(&self, snapshot: Snapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    pub fn fail_snapshot(&self, fail: bool) {
        self.fail_snapshot.store(fail, Ordering::SeqCst);
    }

    /// Make every list fetch fail
    pub fn fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    /// Hold every snapshot fetch for `delay`
    pub fn delay_snapshot(&self, delay: Duration) {
        *self.snapshot_delay.lock().unwrap() = delay;
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    fn check_requests(&self) -> ProviderResult<()> {
        if self.fail_requests.load(Ordering::SeqCst) {
            Err(ProviderError::Unavailable("scripted failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_snapshot(&self) -> ProviderResult<Snapshot> {
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.snapshot_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_snapshot.load(Ordering::SeqCst) {
            return Err(ProviderError::Unavailable("scripted failure".to_string()));
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn fetch_section_breakdown(&self) -> ProviderResult<Vec<SectionOccupancy>> {
        self.check_requests()?;
        Ok(Vec::new())
    }

    async fn fetch_available_spaces(&self) -> ProviderResult<Vec<SpaceDetail>> {
        self.check_requests()?;
        Ok(Vec::new())
    }

    async fn fetch_active_tickets(&self) -> ProviderResult<Vec<Ticket>> {
        self.check_requests()?;
        Ok(Vec::new())
    }
}
