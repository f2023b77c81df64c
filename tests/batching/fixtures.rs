use std::collections::VecDeque;
use std::fmt;

use dynabatch::{record, BatchWriter, BufferState, InMemoryStore, KeyProjection, Record};

pub const USERS: &str = "users";
pub const ORGS: &str = "organizations";

/// A store with a users table keyed by (organization_id, id) and an
/// organizations table keyed by id.
pub fn store() -> InMemoryStore {
    InMemoryStore::new()
        .with_table(USERS, KeyProjection::new(["organization_id", "id"]))
        .with_table(ORGS, KeyProjection::new(["id"]))
}

pub fn user(organization_id: i64, id: i64, name: &str) -> Record {
    record! {
        "organization_id" => organization_id,
        "id" => id,
        "name" => name,
    }
}

pub fn user_key(organization_id: i64, id: i64) -> Record {
    record! { "organization_id" => organization_id, "id" => id }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug)]
pub struct Unreachable;

impl fmt::Display for Unreachable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store unreachable")
    }
}

impl std::error::Error for Unreachable {}

/// Answers each batch with the next scripted response and records what it got.
/// Once the script runs out every batch is fully applied.
#[derive(Default)]
pub struct ScriptedWriter {
    pub responses: VecDeque<Result<BufferState, Unreachable>>,
    pub received: Vec<BufferState>,
}

impl ScriptedWriter {
    pub fn new<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Result<BufferState, Unreachable>>,
    {
        Self {
            responses: responses.into_iter().collect(),
            received: Vec::new(),
        }
    }
}

impl BatchWriter for ScriptedWriter {
    type Error = Unreachable;

    fn batch_write(&mut self, batch: &BufferState) -> Result<BufferState, Unreachable> {
        self.received.push(batch.clone());
        self.responses
            .pop_front()
            .unwrap_or_else(|| Ok(BufferState::new()))
    }
}

/// Never applies anything: every batch comes back whole.
#[derive(Default)]
pub struct StuckWriter {
    pub calls: u32,
}

impl BatchWriter for StuckWriter {
    type Error = Unreachable;

    fn batch_write(&mut self, batch: &BufferState) -> Result<BufferState, Unreachable> {
        self.calls += 1;
        Ok(batch.clone())
    }
}
