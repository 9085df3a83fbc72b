pub mod broker;
pub mod client;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod loopback;
pub mod retry;
pub mod session;
pub mod status;
pub mod supervisor;

pub use broker::EventBroker;
pub use client::{ChatClient, ClientError, ClientEvent, ClientFactory, ClientState};
pub use discovery::{DiscoveryConfig, DiscoveryService};
pub use dispatch::{DispatchService, MessageOutcome};
pub use error::CourierError;
pub use retry::RetryPolicy;
pub use session::SessionRegistry;
pub use status::StatusService;
pub use supervisor::{ConnectionSupervisor, InitOutcome, SupervisorConfig};
