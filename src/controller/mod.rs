pub mod backoff;
pub mod error;
pub mod inspector;
pub mod migration;
pub mod reconcile;

pub use error::{Disposition, MigrationError};
pub use migration::{ChartDeploymentRequest, ReleaseMigration};
pub use reconcile::{reconcile, Context, ReconcileError};

#[cfg(test)]
#[path = "migration_test.rs"]
mod migration_tests;

#[cfg(test)]
#[path = "inspector_test.rs"]
mod inspector_tests;

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod reconcile_tests;
