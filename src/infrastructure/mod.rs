//! Backing-collection adapters.
//!
//! Both storage flavours keep raw rows exactly as a source would return them
//! and share the fetch semantics in [`select_page`].

pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

use crate::domain::ports::FetchQuery;
use crate::domain::raw::{RawFields, RawRecord};
use crate::domain::record::{PaymentStatus, SourceKind};
use crate::domain::resolution::{Field, ResolutionTable, canonical_method};
use std::cmp::Reverse;

/// Applies a fetch's hints to the rows of one collection: keep rows matching
/// the date, status and method hints, newest first, capped at the page size.
///
/// Rows whose hinted field cannot be read are kept; the normalizer decides
/// what to do with them.
pub fn select_page(kind: SourceKind, rows: Vec<RawFields>, query: &FetchQuery) -> Vec<RawRecord> {
    let table = ResolutionTable::for_kind(kind);
    let mut selected: Vec<RawFields> = rows
        .into_iter()
        .filter(|row| {
            let created_at = table.timestamp(Field::CreatedAt, row);
            let in_range = match (query.date_range, created_at) {
                (Some(range), Some(at)) => range.contains(at),
                _ => true,
            };
            let status_matches = query.status.is_none_or(|wanted| {
                table
                    .text(Field::Status, row)
                    .is_none_or(|raw| PaymentStatus::parse(&raw) == wanted)
            });
            let method_matches = query.method.as_deref().is_none_or(|wanted| {
                table
                    .resolve(Field::Method, row)
                    .and_then(canonical_method)
                    .is_none_or(|method| method.eq_ignore_ascii_case(wanted))
            });
            in_range && status_matches && method_matches
        })
        .collect();

    selected.sort_by_cached_key(|row| Reverse(table.timestamp(Field::CreatedAt, row)));
    selected.truncate(query.page_size);
    selected
        .into_iter()
        .map(|row| RawRecord::new(kind, row))
        .collect()
}

/// Primary id of a raw row, as text.
pub fn row_id(kind: SourceKind, row: &RawFields) -> Option<String> {
    ResolutionTable::for_kind(kind).text(Field::Id, row)
}
