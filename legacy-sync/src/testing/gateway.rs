//! Scripted legacy gateway for tests

use crate::sync::{LegacyGateway, LegacyGatewayError, StoreSnapshot};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Which operation a recorded call was
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayCall {
    /// `create_on_legacy_system`
    Create,
    /// `update_on_legacy_system`
    Update,
}

#[derive(Debug, Default)]
struct Script {
    fail_remaining: usize,
    always_fail: bool,
    calls: Vec<(GatewayCall, StoreSnapshot)>,
}

/// Legacy gateway that records calls and fails on demand
///
/// Failures are reported as [`LegacyGatewayError::Unavailable`]. Failed calls
/// are recorded too.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    script: Mutex<Script>,
}

impl ScriptedGateway {
    /// Gateway that always succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway that fails the first `failures` calls, then succeeds
    #[must_use]
    pub fn failing_first(failures: usize) -> Self {
        Self {
            script: Mutex::new(Script {
                fail_remaining: failures,
                ..Script::default()
            }),
        }
    }

    /// Gateway that fails every call
    #[must_use]
    pub fn always_failing() -> Self {
        Self {
            script: Mutex::new(Script {
                always_fail: true,
                ..Script::default()
            }),
        }
    }

    /// Stop failing from now on
    pub fn recover(&self) {
        let mut script = self.script.lock();
        script.always_fail = false;
        script.fail_remaining = 0;
    }

    /// Total number of calls
    #[must_use]
    pub fn calls(&self) -> usize {
        self.script.lock().calls.len()
    }

    /// Number of create calls
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.count(GatewayCall::Create)
    }

    /// Number of update calls
    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.count(GatewayCall::Update)
    }

    /// Snapshots passed to the gateway, in call order
    #[must_use]
    pub fn snapshots(&self) -> Vec<StoreSnapshot> {
        self.script
            .lock()
            .calls
            .iter()
            .map(|(_, snapshot)| snapshot.clone())
            .collect()
    }

    /// Most recent snapshot, if any
    #[must_use]
    pub fn last_snapshot(&self) -> Option<StoreSnapshot> {
        self.script
            .lock()
            .calls
            .last()
            .map(|(_, snapshot)| snapshot.clone())
    }

    fn count(&self, kind: GatewayCall) -> usize {
        self.script
            .lock()
            .calls
            .iter()
            .filter(|(call, _)| *call == kind)
            .count()
    }

    fn record(&self, kind: GatewayCall, store: &StoreSnapshot) -> Result<(), LegacyGatewayError> {
        let mut script = self.script.lock();
        script.calls.push((kind, store.clone()));
        if script.always_fail {
            return Err(LegacyGatewayError::Unavailable(
                "scripted outage".to_string(),
            ));
        }
        if script.fail_remaining > 0 {
            script.fail_remaining -= 1;
            return Err(LegacyGatewayError::Unavailable(format!(
                "scripted failure, {} left",
                script.fail_remaining
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl LegacyGateway for ScriptedGateway {
    async fn create_on_legacy_system(
        &self,
        store: &StoreSnapshot,
    ) -> Result<(), LegacyGatewayError> {
        self.record(GatewayCall::Create, store)
    }

    async fn update_on_legacy_system(
        &self,
        store: &StoreSnapshot,
    ) -> Result<(), LegacyGatewayError> {
        self.record(GatewayCall::Update, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(quantity: i32) -> StoreSnapshot {
        StoreSnapshot::new(Some(1), "Breda", quantity, Some(0)).unwrap()
    }

    #[tokio::test]
    async fn test_fails_first_calls_then_recovers() {
        let gateway = ScriptedGateway::failing_first(2);

        assert!(gateway.create_on_legacy_system(&snapshot(1)).await.is_err());
        assert!(gateway.update_on_legacy_system(&snapshot(2)).await.is_err());
        assert!(gateway.update_on_legacy_system(&snapshot(3)).await.is_ok());

        assert_eq!(gateway.calls(), 3);
        assert_eq!(gateway.create_calls(), 1);
        assert_eq!(gateway.update_calls(), 2);
        assert_eq!(
            gateway.last_snapshot().map(|s| s.quantity_products_in_stock),
            Some(3)
        );
    }

    #[tokio::test]
    async fn test_always_failing_until_recovered() {
        let gateway = ScriptedGateway::always_failing();
        for _ in 0..3 {
            assert!(gateway.create_on_legacy_system(&snapshot(1)).await.is_err());
        }

        gateway.recover();
        assert!(gateway.create_on_legacy_system(&snapshot(1)).await.is_ok());
        assert_eq!(gateway.snapshots().len(), 4);
    }
}
