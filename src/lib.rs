//! Canner - a configurable HTTP mock server
//!
//! Stands in for a real backend during integration testing. Requests are
//! matched against declarative rules and answered with canned responses.
//!
//! # Features
//!
//! - **Request Matching**: Match by path, method, headers and exact body
//! - **Last Match Wins**: Later rules for a path override earlier ones
//! - **Static Responses**: Return fixed status, headers and body
//! - **Latency Simulation**: Add fixed or random delays
//!
//! # Example Configuration
//!
//! ```yaml
//! server:
//!   port: 8080
//! matchers:
//!   - request:
//!       path: /hello
//!       headers:
//!         Content-Type: application/json
//!     response:
//!       status_code: 200
//!       body: '{"message": "Hello, World!"}'
//!       latency:
//!         type: random
//!         delay: 250ms
//! ```

pub mod config;
pub mod handler;
pub mod latency;
pub mod matcher;
pub mod response;
pub mod ruleset;
pub mod server;

pub use config::MockConfig;
pub use server::MockServer;
