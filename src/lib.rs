//! NIOS Provider
//!
//! This crate manages Infoblox NIOS DHCP objects — address ranges, range
//! templates, roaming hosts, option spaces, MAC filter addresses — as
//! declaratively planned resources over the grid's REST API (the WAPI).
//!
//! # Overview
//!
//! The crate provides:
//!
//! - **Schema types**: Types for describing the provider, resource, and
//!   data source schemas
//! - **ProviderService trait**: The lifecycle surface a host drives, with
//!   [`NiosProvider`] as the grid-backed implementation
//! - **Expand/Flatten resources**: One module per managed object type,
//!   each a schema plus the two conversion functions
//! - **Reconciliation**: Extensible-attribute ownership tracking and
//!   internal-ID based rediscovery of objects whose refs drifted
//! - **WAPI client**: A thin typed REST layer over `reqwest`
//! - **Error types**: Common error taxonomy for lifecycle operations
//! - **Logging**: Integration with `tracing` for structured logging
//! - **Testing**: An in-process tester harness and an in-memory grid
//!
//! # Quick Start
//!
//! ```ignore
//! use nios_provider::{init_logging, NiosProvider, ProviderService};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = NiosProvider::new();
//!     provider.configure(json!({
//!         "server": "https://gm.example.net",
//!         "username": "admin",
//!         "password": "infoblox",
//!     })).await?;
//!
//!     let state = provider.create("nios_range_template", json!({
//!         "name": "lab-template",
//!         "number_of_addresses": 100,
//!         "offset": 10,
//!         "extattrs": {"Site": "NYC"},
//!     })).await?;
//!
//!     println!("created {}", state["ref"]);
//!     Ok(())
//! }
//! ```
//!
//! # Extensible attributes and rediscovery
//!
//! Every EA-bearing object the provider creates is tagged with a reserved
//! extensible attribute carrying a generated token. The user-facing
//! `extattrs` state field only ever holds the attributes the user
//! declared (re-read from the grid), while the full server-side set is
//! kept in the computed `extattrs_all` field. When a stored object ref
//! goes stale — a 404, or a different object answering on that ref — the
//! provider relocates its object by searching on the reserved attribute,
//! and only removes the resource from state when that search comes up
//! empty.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod extattrs;
pub mod logging;
pub mod provider;
pub mod reconcile;
pub mod resources;
pub mod schema;
pub mod testing;
pub mod types;
pub mod validation;
pub mod wapi;

// Re-export main types at crate root
pub use config::NiosConfig;
pub use error::ProviderError;
pub use extattrs::{ExtAttrs, ExtAttrValue, INTERNAL_ID_EA};
pub use logging::{init_logging, init_logging_json, init_logging_with_default, try_init_logging};
pub use provider::{NiosProvider, ProviderService};
pub use reconcile::Resolution;
pub use schema::ProviderSchema;
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
pub use validation::{is_valid, validate, validate_result};
pub use wapi::{ObjectApi, WapiClient};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
