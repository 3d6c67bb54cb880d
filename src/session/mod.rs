pub mod driver;
pub mod machine;
pub mod messages;
pub mod photo;
pub mod registry;

use async_trait::async_trait;

pub use driver::SessionDriver;
pub use machine::{Event, Outbound};
pub use registry::SessionRegistry;

/// Sends replies produced by a session back to the user.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, outbound: Outbound) -> anyhow::Result<()>;
}
