pub mod config;
pub mod error;
pub mod object;

pub use config::{CommitterConfig, ConfigError, DeployConfig};
pub use error::{DeployError, Result};
pub(crate) use error::backend_err;
pub use object::{ObjectId, ObjectType};
