/// Test utilities and helpers for DynamoQuery testing
///
/// Transport wrappers that record or disturb calls, fixtures, and logging
/// setup shared by the integration tests and benches.

use dquery_api::transport::{
    BatchGetItemInput, BatchGetItemOutput, BatchWriteItemInput, BatchWriteItemOutput,
    DeleteItemInput, GetItemInput, GetItemOutput, KeySchemaElement, PageOutput, QueryInput,
    ScanInput, TableResource, UpdateItemInput, WriteItemOutput,
};
use dquery_api::MemoryTable;
use dquery_core::{record, DataTable, Error, QueryConfig, Record, Result, RetryPolicy, TableKeys, Value};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Once};

static INIT_LOGGING: Once = Once::new();

/// Installs a test-friendly subscriber once; filtered by `RUST_LOG`.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// One transport call captured by [`RecordingTable`].
#[derive(Debug, Clone)]
pub enum RecordedCall {
    Scan(ScanInput),
    Query(QueryInput),
    GetItem(GetItemInput),
    UpdateItem(UpdateItemInput),
    DeleteItem(DeleteItemInput),
    BatchGetItem(BatchGetItemInput),
    BatchWriteItem(BatchWriteItemInput),
}

/// Forwards every call to `inner` and keeps a copy of its input.
pub struct RecordingTable<T> {
    inner: T,
    calls: Mutex<Vec<RecordedCall>>,
}

impl<T: TableResource> RecordingTable<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Request counts of every batch write, in call order.
    pub fn batch_write_sizes(&self) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::BatchWriteItem(input) => Some(input.requests.len()),
                _ => None,
            })
            .collect()
    }

    /// Key counts of every batch get, in call order.
    pub fn batch_get_sizes(&self) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::BatchGetItem(input) => Some(input.keys.len()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RecordedCall) {
        self.calls.lock().push(call);
    }
}

impl<T: TableResource> TableResource for RecordingTable<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn key_schema(&self) -> Result<Vec<KeySchemaElement>> {
        self.inner.key_schema()
    }

    fn scan(&self, input: &ScanInput) -> Result<PageOutput> {
        self.record(RecordedCall::Scan(input.clone()));
        self.inner.scan(input)
    }

    fn query(&self, input: &QueryInput) -> Result<PageOutput> {
        self.record(RecordedCall::Query(input.clone()));
        self.inner.query(input)
    }

    fn get_item(&self, input: &GetItemInput) -> Result<GetItemOutput> {
        self.record(RecordedCall::GetItem(input.clone()));
        self.inner.get_item(input)
    }

    fn update_item(&self, input: &UpdateItemInput) -> Result<WriteItemOutput> {
        self.record(RecordedCall::UpdateItem(input.clone()));
        self.inner.update_item(input)
    }

    fn delete_item(&self, input: &DeleteItemInput) -> Result<WriteItemOutput> {
        self.record(RecordedCall::DeleteItem(input.clone()));
        self.inner.delete_item(input)
    }

    fn batch_get_item(&self, input: &BatchGetItemInput) -> Result<BatchGetItemOutput> {
        self.record(RecordedCall::BatchGetItem(input.clone()));
        self.inner.batch_get_item(input)
    }

    fn batch_write_item(&self, input: &BatchWriteItemInput) -> Result<BatchWriteItemOutput> {
        self.record(RecordedCall::BatchWriteItem(input.clone()));
        self.inner.batch_write_item(input)
    }
}

/// Scripted misbehaviour for the next call of [`FlakyTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail with `ProvisionedThroughputExceededException`.
    Throttle,
    /// Fail with the given transport error code.
    Error(String),
    /// Report the last `n` batch entries as unprocessed without applying
    /// them. Non-batch calls pass through.
    Unprocessed(usize),
}

/// Applies scripted faults, one per call, before forwarding to `inner`.
pub struct FlakyTable<T> {
    inner: T,
    faults: Mutex<VecDeque<Fault>>,
}

impl<T: TableResource> FlakyTable<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            faults: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_faults(self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.faults.lock().extend(faults);
        self
    }

    pub fn push_fault(&self, fault: Fault) {
        self.faults.lock().push_back(fault);
    }

    pub fn remaining_faults(&self) -> usize {
        self.faults.lock().len()
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn next_fault(&self) -> Result<Option<usize>> {
        match self.faults.lock().pop_front() {
            None => Ok(None),
            Some(Fault::Throttle) => Err(Error::transport(
                "ProvisionedThroughputExceededException",
                "The level of configured provisioned throughput for the table was exceeded",
            )),
            Some(Fault::Error(code)) => Err(Error::transport(code, "Scripted failure")),
            Some(Fault::Unprocessed(n)) => Ok(Some(n)),
        }
    }
}

impl<T: TableResource> TableResource for FlakyTable<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn key_schema(&self) -> Result<Vec<KeySchemaElement>> {
        self.inner.key_schema()
    }

    fn scan(&self, input: &ScanInput) -> Result<PageOutput> {
        self.next_fault()?;
        self.inner.scan(input)
    }

    fn query(&self, input: &QueryInput) -> Result<PageOutput> {
        self.next_fault()?;
        self.inner.query(input)
    }

    fn get_item(&self, input: &GetItemInput) -> Result<GetItemOutput> {
        self.next_fault()?;
        self.inner.get_item(input)
    }

    fn update_item(&self, input: &UpdateItemInput) -> Result<WriteItemOutput> {
        self.next_fault()?;
        self.inner.update_item(input)
    }

    fn delete_item(&self, input: &DeleteItemInput) -> Result<WriteItemOutput> {
        self.next_fault()?;
        self.inner.delete_item(input)
    }

    fn batch_get_item(&self, input: &BatchGetItemInput) -> Result<BatchGetItemOutput> {
        let Some(n) = self.next_fault()? else {
            return self.inner.batch_get_item(input);
        };
        let split = input.keys.len().saturating_sub(n);
        let mut processed = input.clone();
        let unprocessed_keys = processed.keys.split_off(split);
        let mut output = self.inner.batch_get_item(&processed)?;
        output.unprocessed_keys = unprocessed_keys;
        Ok(output)
    }

    fn batch_write_item(&self, input: &BatchWriteItemInput) -> Result<BatchWriteItemOutput> {
        let Some(n) = self.next_fault()? else {
            return self.inner.batch_write_item(input);
        };
        let split = input.requests.len().saturating_sub(n);
        let mut processed = input.clone();
        let unprocessed_items = processed.requests.split_off(split);
        let mut output = self.inner.batch_write_item(&processed)?;
        output.unprocessed_items = unprocessed_items;
        Ok(output)
    }
}

/// Empty `pk` / `sk` table named `users`.
pub fn users_table() -> Arc<MemoryTable> {
    Arc::new(MemoryTable::new("users", TableKeys::with_sort_key("pk", "sk")))
}

/// User `index` of partition `user`, sorted by zero-padded index.
pub fn user_record(index: usize) -> Record {
    record! {
        "pk" => "user",
        "sk" => format!("{:04}", index),
        "name" => format!("user{}", index),
        "age" => 20 + (index % 50),
    }
}

pub fn user_records(count: usize) -> DataTable {
    DataTable::from_records((0..count).map(user_record))
}

/// `users_table` pre-filled with `count` users.
pub fn seeded_users_table(count: usize) -> Arc<MemoryTable> {
    let table = users_table();
    for index in 0..count {
        table
            .put(user_record(index))
            .expect("Failed to seed users table");
    }
    table
}

/// Retry policy with no back-off delay.
pub fn instant_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts, 0, 0, 2.0)
}

/// Default configuration with an instant three-attempt retry policy.
pub fn test_config() -> QueryConfig {
    QueryConfig::default().with_retry(instant_retry(3))
}

/// Assert that a value is a number with expected value
pub fn assert_number_eq(value: Option<&Value>, expected: &str) {
    match value {
        Some(Value::N(n)) => assert_eq!(n, expected),
        other => panic!("Expected number, got {:?}", other),
    }
}

/// Assert that a value is a string with expected value
pub fn assert_string_eq(value: Option<&Value>, expected: &str) {
    match value {
        Some(Value::S(s)) => assert_eq!(s, expected),
        other => panic!("Expected string, got {:?}", other),
    }
}
