//! Recording transport used by tests

use crate::transport::traits::CommandTransport;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    pub subscriptions: Mutex<Vec<String>>,
    pub disconnects: Mutex<u32>,
}

impl MockTransport {
    pub fn new(connected: bool) -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(connected),
            ..Default::default()
        })
    }

    pub fn disconnect_count(&self) -> u32 {
        *self.disconnects.lock().unwrap()
    }
}

#[async_trait]
impl CommandTransport for MockTransport {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        *self.disconnects.lock().unwrap() += 1;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "Mock"
    }
}
