use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::NamedTempFile;

/// Tenant 1 tracks category 100 (forums 10 and 20) plus thread 1 directly.
/// Threads 3 and 4 are archived. Tenant 42 is no longer reachable.
pub const SCENARIO: &str = r#"
actor_id = 99
default_permissions = ["view_channel", "read_message_history", "send_messages_in_threads", "manage_threads"]

[[tenants]]
id = 1
permissions = ["manage_threads", "read_message_history", "send_messages_in_threads"]
tracked = [{ kind = "category", id = 100 }, { kind = "post", id = 1 }]

[[tenants.resources]]
id = 100
kind = "container_of_containers"
permissions = ["read_message_history", "send_messages_in_threads"]

[[tenants.resources]]
id = 10
kind = "container"
parent = 100

[[tenants.resources]]
id = 20
kind = "container"
parent = 100

[[tenants.resources]]
id = 1
kind = "leaf"
parent = 10

[[tenants.resources]]
id = 2
kind = "leaf"
parent = 10

[[tenants.resources]]
id = 3
kind = "leaf"
parent = 20
archived = true

[[tenants.resources]]
id = 4
kind = "leaf"
parent = 20
archived = true

[[tenants]]
id = 42
reachable = false
tracked = [{ kind = "forum", id = 9000 }]
"#;

pub struct SnapshotFile {
    pub file: NamedTempFile,
}

impl SnapshotFile {
    pub fn new(contents: &str) -> Self {
        crate::test_log!("FIXTURE: Writing snapshot");
        let mut file = NamedTempFile::new().expect("Failed to create temp snapshot");
        file.write_all(contents.as_bytes())
            .expect("Failed to write snapshot");
        Self { file }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Run fkhd against this snapshot with an empty config file.
    pub fn run(&self, args: &[&str]) -> Output {
        let config = NamedTempFile::new().expect("Failed to create temp config");
        Command::new(env!("CARGO_BIN_EXE_fkhd"))
            .arg("--config")
            .arg(config.path())
            .arg("--snapshot")
            .arg(self.path())
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to run fkhd")
    }
}

pub fn assert_contains(haystack: &str, needle: &str) {
    assert!(
        haystack.contains(needle),
        "Expected to find '{needle}' in output, got: {haystack}"
    );
}
