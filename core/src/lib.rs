//! Core building blocks for the intake portal.
//!
//! Everything in this crate is synchronous and side-effect free: the domain
//! model, the client/project registry, input sanitization, the HTML to ADF
//! document converter, the request rate limiter and the environment
//! configuration. Network adapters live in their own crates.

pub mod adf;
pub mod config;
pub mod html;
pub mod projects;
pub mod rate_limit;
pub mod sanitize;
pub mod types;

pub use config::Config;
pub use projects::Project;
pub use types::Attachment;
pub use types::TicketRequest;
pub use types::TicketResponse;
pub use types::TicketType;
pub use types::Urgency;
