//! Cloud provider network API client
//!
//! Read-only queries used to discover existing network resources before a
//! convergence run: the CIDR of a VPC, its NAT gateway and the internet
//! charge type of the EIPs bound to that gateway.
//!
//! # Example
//!
//! ```no_run
//! use cloud_client::{AlicloudClient, NetworkClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AlicloudClient::new("cn-hangzhou", "access-key-id", "access-key-secret")?;
//!
//! let cidr = client.network_cidr("vpc-123").await?;
//! let gateway = client.nat_gateway("vpc-123").await?;
//! let charge_type = client.internet_charge_type("vpc-123").await?;
//! # Ok(())
//! # }
//! ```

pub mod alicloud;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod network_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use alicloud::AlicloudClient;
pub use error::CloudError;
pub use models::{NatGatewayInfo, DEFAULT_INTERNET_CHARGE_TYPE};
pub use network_trait::NetworkClient;
#[cfg(feature = "test-util")]
pub use mock::MockNetworkClient;
