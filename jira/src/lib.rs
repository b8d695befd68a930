//! Issue tracker adapter: create issues, attach files, verify the instance
//! configuration.

mod client;
mod error;
mod verify;

pub use client::CreatedIssue;
pub use client::JiraClient;
pub use error::JiraError;
pub use verify::ConfigReport;
pub use verify::ProjectCheck;
