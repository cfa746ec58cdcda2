use async_trait::async_trait;

use crate::application::{AppResult, Notifier};
use crate::domain::SubscriberId;

/// Stdout transport for --dry-run and local debugging.
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, to: &SubscriberId, message: &str) -> AppResult<()> {
        println!("NOTIFY to={}\n{}\n", to, message);
        Ok(())
    }
}
