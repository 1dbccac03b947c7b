use crate::domain::raw::RawFields;
use crate::domain::record::SourceKind;
use crate::error::{PaymentError, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;

/// Key holding the customer directory in a fixture document.
pub const CUSTOMERS_KEY: &str = "customers";

/// Seed data for every backing collection.
///
/// Raw rows are kept exactly as written; normalization happens on fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fixture {
    pub customers: HashMap<String, String>,
    pub collections: BTreeMap<SourceKind, Vec<RawFields>>,
}

impl Fixture {
    pub fn rows(&self, kind: SourceKind) -> &[RawFields] {
        self.collections.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn row_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }
}

/// Reads a fixture document of the form
/// `{"customers": {"<id>": "<name>"}, "<collection>": [{..row..}, ..], ..}`
/// where each collection key is a source collection name.
pub struct FixtureReader<R: Read> {
    source: R,
}

impl<R: Read> FixtureReader<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn fixture(self) -> Result<Fixture> {
        let document: BTreeMap<String, Value> = serde_json::from_reader(self.source)?;
        let mut fixture = Fixture::default();

        for (key, value) in document {
            if key == CUSTOMERS_KEY {
                fixture.customers = serde_json::from_value(value)?;
                continue;
            }
            let kind = SourceKind::from_collection(&key)
                .ok_or_else(|| PaymentError::Config(format!("unknown collection `{key}` in fixture")))?;
            let rows: Vec<RawFields> = serde_json::from_value(value)?;
            fixture.collections.insert(kind, rows);
        }
        Ok(fixture)
    }
}
