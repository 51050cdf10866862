//! Tenant enrichment: transport, retry policy, classification and the
//! per-user state machine.
pub mod client;
pub mod machine;
pub mod retry;
pub mod status;
pub mod transport;

pub use client::{BootstrapClient, BootstrapOutcome, TaggedOutcome};
pub use machine::{BootstrapMachine, Transition};
pub use retry::RetrySchedule;
pub use status::{BootstrapPayload, RemoteStatus};
pub use transport::{BootstrapTransport, HttpBootstrapTransport, TransportReply};
