pub mod fixtures;
pub mod logging;

pub use fixtures::{SnapshotFile, assert_contains};
pub use logging::init_test_logging;
