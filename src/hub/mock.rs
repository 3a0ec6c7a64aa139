//! Recording rig used by tests

use crate::hub::traits::{Indicator, Motor, RigController, RigScanner};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use signal_bridge_shared::HubPort;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// One call against the rig, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RigCall {
    Connect,
    Disconnect,
    SetPower(i8),
    Ramp { from: i8, to: i8, duration_ms: u64 },
    Brake,
    Brightness(u8),
    Sleep(u64),
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<RigCall>>,
    connected: AtomicBool,
    fail_motor: AtomicBool,
    fail_connect: AtomicBool,
    /// When set, every motor call waits for a permit
    gate: Mutex<Option<Arc<Semaphore>>>,
}

/// A fake hub with one motor and one indicator that records every call
#[derive(Clone, Default)]
pub struct MockRig {
    shared: Arc<Shared>,
}

impl MockRig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RigCall> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.shared.calls.lock().unwrap().clear();
    }

    /// Make motor calls fail until reset
    pub fn fail_motor(&self, fail: bool) {
        self.shared.fail_motor.store(fail, Ordering::SeqCst);
    }

    pub fn fail_connect(&self) {
        self.shared.fail_connect.store(true, Ordering::SeqCst);
    }

    pub fn set_connected(&self, connected: bool) {
        self.shared.connected.store(connected, Ordering::SeqCst);
    }

    /// Block motor calls until `release` is called
    pub fn hold(&self) {
        *self.shared.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let held motor calls through and stop holding
    pub fn release(&self) {
        if let Some(gate) = self.shared.gate.lock().unwrap().take() {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn motor(&self) -> Arc<dyn Motor> {
        Arc::new(self.clone())
    }

    pub fn indicator(&self) -> Arc<dyn Indicator> {
        Arc::new(self.clone())
    }

    pub fn controller(&self) -> Arc<dyn RigController> {
        Arc::new(self.clone())
    }

    fn record(&self, call: RigCall) {
        self.shared.calls.lock().unwrap().push(call);
    }

    async fn motor_call(&self, call: RigCall) -> Result<()> {
        let gate = self.shared.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await?.forget();
        }
        if self.shared.fail_motor.load(Ordering::SeqCst) {
            return Err(anyhow!("motor stalled"));
        }
        self.record(call);
        Ok(())
    }
}

#[async_trait]
impl Motor for MockRig {
    async fn set_power(&self, power: i8) -> Result<()> {
        self.motor_call(RigCall::SetPower(power)).await
    }

    async fn ramp_power(&self, from: i8, to: i8, duration: Duration) -> Result<()> {
        self.motor_call(RigCall::Ramp {
            from,
            to,
            duration_ms: duration.as_millis() as u64,
        })
        .await
    }

    async fn brake(&self) -> Result<()> {
        self.motor_call(RigCall::Brake).await
    }
}

#[async_trait]
impl Indicator for MockRig {
    async fn set_brightness(&self, level: u8) -> Result<()> {
        self.record(RigCall::Brightness(level));
        Ok(())
    }
}

#[async_trait]
impl RigController for MockRig {
    fn name(&self) -> &str {
        "Mock Hub"
    }

    async fn connect(&self) -> Result<()> {
        if self.shared.fail_connect.load(Ordering::SeqCst) {
            return Err(anyhow!("connect refused"));
        }
        self.record(RigCall::Connect);
        self.set_connected(true);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record(RigCall::Disconnect);
        self.set_connected(false);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn is_connecting(&self) -> bool {
        false
    }

    async fn wait_for_motor(&self, _port: HubPort) -> Result<Arc<dyn Motor>> {
        Ok(self.motor())
    }

    async fn wait_for_indicator(&self, _port: HubPort) -> Result<Arc<dyn Indicator>> {
        Ok(self.indicator())
    }

    async fn sleep(&self, duration: Duration) {
        self.record(RigCall::Sleep(duration.as_millis() as u64));
    }
}

/// Scanner that immediately "discovers" a mock rig
pub struct MockScanner {
    pub rig: MockRig,
}

#[async_trait]
impl RigScanner for MockScanner {
    async fn scan_first(&self) -> Result<Arc<dyn RigController>> {
        Ok(self.rig.controller())
    }
}
