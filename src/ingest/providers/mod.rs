//! Source adapters. `gateway` talks to the channel gateway over HTTP and
//! doubles as a fixture-backed adapter for tests and previews.

pub mod gateway;

pub use gateway::GatewayAdapter;
