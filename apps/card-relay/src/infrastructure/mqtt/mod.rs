//! MQTT Broker Adapter
//!
//! Connection manager for the card reader broker, built on `rumqttc`.
//!
//! - `client`: broker handle (`BrokerPort`) and event loop driver
//! - `codec`: inbound payload decoding
//! - `reconnect`: delay schedule between connection attempts

pub mod client;
pub mod codec;
pub mod reconnect;

pub use client::{ConnectionState, MqttBroker, MqttEventLoop};
pub use codec::{CardCodec, CodecError};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
