//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `FanOutBroadcaster`: delivers card events to every live subscriber
//! - `CommandGateway`: validates and publishes top-up commands
//! - `run_event_pump`: forwards broker events to the broadcaster

pub mod broadcaster;
pub mod gateway;
pub mod pump;

pub use broadcaster::{BroadcastReport, FanOutBroadcaster, LiveFrame, SharedBroadcaster, WelcomeFrame};
pub use gateway::{CommandGateway, DEFAULT_PUBLISH_TIMEOUT, GatewayError, TopUpAck};
pub use pump::run_event_pump;
