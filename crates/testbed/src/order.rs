//! Priority ordering for test cases
//!
//! Lower priorities run first. Cases with equal priority run in
//! case-insensitive name order; unannotated cases have priority 0.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Priority annotation for a test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TestOrder(pub i32);

impl TestOrder {
    pub fn priority(self) -> i32 {
        self.0
    }
}

impl From<i32> for TestOrder {
    fn from(priority: i32) -> Self {
        Self(priority)
    }
}

/// A test case the orderer can sort
pub trait OrderedTest {
    fn name(&self) -> &str;

    fn order(&self) -> Option<TestOrder> {
        None
    }

    fn priority(&self) -> i32 {
        self.order().map(TestOrder::priority).unwrap_or_default()
    }
}

/// A named case with an optional priority, for runners that collect cases by hand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub name: String,
    pub order: Option<TestOrder>,
}

impl TestCase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: None,
        }
    }

    pub fn with_order(mut self, priority: i32) -> Self {
        self.order = Some(TestOrder(priority));
        self
    }
}

impl OrderedTest for TestCase {
    fn name(&self) -> &str {
        &self.name
    }

    fn order(&self) -> Option<TestOrder> {
        self.order
    }
}

/// Compare two names ignoring ASCII case, then byte order as a tiebreak
fn compare_names(a: &str, b: &str) -> Ordering {
    let folded = a
        .bytes()
        .map(|c| c.to_ascii_uppercase())
        .cmp(b.bytes().map(|c| c.to_ascii_uppercase()));
    folded.then_with(|| a.cmp(b))
}

/// Sort `cases` into execution order
pub fn order_test_cases<T: OrderedTest>(mut cases: Vec<T>) -> Vec<T> {
    cases.sort_by(|a, b| {
        a.priority()
            .cmp(&b.priority())
            .then_with(|| compare_names(a.name(), b.name()))
    });
    cases
}
