// Copyright 2021 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

//! This module implements the RESULT frame.

use super::*;
use crate::frame::{
    cql_type::CqlType,
    value::CqlValue,
};
use std::{
    convert::TryFrom,
    marker::PhantomData,
};

/// The result kind of a void result.
pub const VOID: i32 = 0x0001;
/// The result kind of a rows result.
pub const ROWS: i32 = 0x0002;
/// The result kind of a set keyspace result.
pub const SETKEYSPACE: i32 = 0x0003;
/// The result kind of a prepared result.
pub const PREPARED: i32 = 0x0004;
/// The result kind of a schema change result.
pub const SCHEMACHANGE: i32 = 0x0005;

/// The result of a QUERY, PREPARE, EXECUTE or BATCH message.
#[derive(Clone, Debug)]
pub struct ResultFrame {
    pub(crate) kind: ResultBodyKind,
}

impl ResultFrame {
    /// Get the result kind.
    pub fn kind(&self) -> &ResultBodyKind {
        &self.kind
    }

    /// Consume the frame and get the result kind.
    pub fn into_kind(self) -> ResultBodyKind {
        self.kind
    }
}

impl TryInto<RowsResult> for ResultFrame {
    type Error = anyhow::Error;

    fn try_into(self) -> Result<RowsResult, Self::Error> {
        match self.kind {
            ResultBodyKind::Rows(rows) => Ok(rows),
            _ => anyhow::bail!("Result Frame is not Rows Result"),
        }
    }
}

impl FromPayload for ResultFrame {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let kind = read_int(start, payload)?;
        Ok(Self {
            kind: match kind {
                VOID => ResultBodyKind::Void,
                ROWS => ResultBodyKind::Rows(RowsResult::from_payload(start, payload)?),
                SETKEYSPACE => ResultBodyKind::SetKeyspace(read_string(start, payload)?),
                PREPARED => ResultBodyKind::Prepared(PreparedResult::from_payload(start, payload)?),
                SCHEMACHANGE => ResultBodyKind::SchemaChange(SchemaChangeResult::from_payload(start, payload)?),
                _ => anyhow::bail!("Unknown result kind: {:x}", kind),
            },
        })
    }
}

/// The possible result bodies.
#[derive(Clone, Debug, From, TryInto)]
pub enum ResultBodyKind {
    /// A result carrying no information.
    Void,
    /// The rows of a select.
    Rows(RowsResult),
    /// The keyspace set by a `USE` query.
    SetKeyspace(String),
    /// The descriptor of a freshly prepared statement.
    Prepared(PreparedResult),
    /// The effect of a schema altering query.
    SchemaChange(SchemaChangeResult),
}

/// The rows metadata flag indicating a global table spec is present.
pub const GLOBAL_TABLES_SPEC: i32 = 0x0001;
/// The rows metadata flag indicating more pages are available.
pub const HAS_MORE_PAGES: i32 = 0x0002;
/// The rows metadata flag indicating column specs were omitted.
pub const NO_METADATA: i32 = 0x0004;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ResultFlags(pub i32);

impl ResultFlags {
    pub fn global_tables_spec(&self) -> bool {
        self.0 & GLOBAL_TABLES_SPEC != 0
    }

    pub fn has_more_pages(&self) -> bool {
        self.0 & HAS_MORE_PAGES != 0
    }

    pub fn no_metadata(&self) -> bool {
        self.0 & NO_METADATA != 0
    }
}

/// The keyspace and table shared by every column, when the global tables spec
/// flag is set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalTableSpec {
    pub(crate) keyspace: String,
    pub(crate) table: String,
}

impl GlobalTableSpec {
    /// Get the keyspace name.
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// Get the table name.
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl FromPayload for GlobalTableSpec {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        Ok(Self {
            keyspace: read_string(start, payload)?,
            table: read_string(start, payload)?,
        })
    }
}

/// The name and type of one result column. Keyspace and table are only present
/// when they are not factored into the global table spec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    pub(crate) keyspace: Option<String>,
    pub(crate) table: Option<String>,
    pub(crate) name: String,
    pub(crate) kind: CqlType,
}

impl ColumnSpec {
    /// Get the keyspace, unless it is factored into the global table spec.
    pub fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }

    /// Get the table, unless it is factored into the global table spec.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Get the column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the column type.
    pub fn kind(&self) -> &CqlType {
        &self.kind
    }
}

fn read_column_specs(
    start: &mut usize,
    payload: &[u8],
    columns_count: i32,
    global: bool,
) -> anyhow::Result<Option<Vec<ColumnSpec>>> {
    if columns_count == 0 {
        return Ok(None);
    }
    let mut column_specs = Vec::with_capacity(columns_count as usize);
    for _ in 0..columns_count {
        let (keyspace, table) = if !global {
            (Some(read_string(start, payload)?), Some(read_string(start, payload)?))
        } else {
            (None, None)
        };
        let name = read_string(start, payload)?;
        let kind = CqlType::from_payload(start, payload)?;
        column_specs.push(ColumnSpec {
            keyspace,
            table,
            name,
            kind,
        });
    }
    Ok(Some(column_specs))
}

/// The metadata preceding the rows of a Rows result.
#[derive(Clone, Debug)]
pub struct RowsResultMetadata {
    flags: ResultFlags,
    columns_count: i32,
    paging_state: Option<Vec<u8>>,
    global_table_spec: Option<GlobalTableSpec>,
    column_specs: Option<Vec<ColumnSpec>>,
}

impl RowsResultMetadata {
    pub fn flags(&self) -> ResultFlags {
        self.flags
    }

    pub fn columns_count(&self) -> i32 {
        self.columns_count
    }

    /// The opaque paging cursor, present when more pages are available. It is
    /// handed back unchanged in a subsequent QUERY/EXECUTE.
    pub fn paging_state(&self) -> &Option<Vec<u8>> {
        &self.paging_state
    }

    pub fn global_table_spec(&self) -> &Option<GlobalTableSpec> {
        &self.global_table_spec
    }

    pub fn column_specs(&self) -> &Option<Vec<ColumnSpec>> {
        &self.column_specs
    }
}

impl FromPayload for RowsResultMetadata {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let flags = ResultFlags(read_int(start, payload)?);
        let columns_count = read_int(start, payload)?;
        let paging_state = if flags.has_more_pages() {
            read_bytes(start, payload)?.map(|b| b.to_vec())
        } else {
            None
        };
        let (global_table_spec, column_specs) = if flags.no_metadata() {
            (None, None)
        } else {
            let global_table_spec = if flags.global_tables_spec() {
                Some(GlobalTableSpec::from_payload(start, payload)?)
            } else {
                None
            };
            let column_specs = read_column_specs(start, payload, columns_count, flags.global_tables_spec())?;
            (global_table_spec, column_specs)
        };
        Ok(Self {
            flags,
            columns_count,
            paging_state,
            global_table_spec,
            column_specs,
        })
    }
}

/// The rows of a select, over the single wire buffer they arrived in. Rows can
/// be consumed through the typed [`iter`](Self::iter), or through the dynamic
/// [`records`](Self::records) / [`column`](Self::column) views; none of them
/// re-parse the buffer for the others.
#[derive(Clone)]
pub struct RowsResult {
    metadata: RowsResultMetadata,
    rows_count: i32,
    rows: Vec<u8>,
}

impl std::fmt::Debug for RowsResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowsResult")
            .field("metadata", &self.metadata)
            .field("rows_count", &self.rows_count)
            .finish()
    }
}

impl RowsResult {
    pub fn metadata(&self) -> &RowsResultMetadata {
        &self.metadata
    }

    pub fn rows_count(&self) -> i32 {
        self.rows_count
    }

    pub fn rows(&self) -> &[u8] {
        &self.rows
    }

    /// Iterate the rows, decoding each into `R`.
    pub fn iter<R: FromRow>(&self) -> RowsIter<'_, R> {
        RowsIter::new(self)
    }

    /// Materialize every row as a column-keyed record of dynamic values.
    /// Requires the column specs, so it fails on skipped metadata.
    pub fn records(&self) -> anyhow::Result<Vec<Record>> {
        let specs = self.require_specs()?;
        let mut cells = CellReader::new(&self.rows);
        let mut records = Vec::with_capacity(self.rows_count as usize);
        for _ in 0..self.rows_count {
            let mut row = Row::new(&mut cells, &self.metadata);
            let mut columns = Vec::with_capacity(specs.len());
            for spec in specs {
                columns.push((spec.name.clone(), row.take_value()?));
            }
            records.push(Record { columns });
        }
        Ok(records)
    }

    /// Collect one column, across all rows, as a vector of dynamic values.
    /// Requires the column specs, so it fails on skipped metadata.
    pub fn column(&self, idx: usize) -> anyhow::Result<Vec<CqlValue>> {
        let specs = self.require_specs()?;
        anyhow::ensure!(idx < specs.len(), "No column at index {}", idx);
        let mut cells = CellReader::new(&self.rows);
        let mut column = Vec::with_capacity(self.rows_count as usize);
        for _ in 0..self.rows_count {
            let mut row = Row::new(&mut cells, &self.metadata);
            for col in 0..specs.len() {
                if col == idx {
                    column.push(row.take_value()?);
                } else {
                    row.skip()?;
                }
            }
        }
        Ok(column)
    }

    fn require_specs(&self) -> anyhow::Result<&Vec<ColumnSpec>> {
        self.metadata
            .column_specs()
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Rows result carries no column metadata"))
    }
}

impl FromPayload for RowsResult {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let metadata = RowsResultMetadata::from_payload(start, payload)?;
        let rows_count = read_int(start, payload)?;
        let rows = &payload[*start..];
        *start += rows.len();
        Ok(Self {
            metadata,
            rows_count,
            rows: rows.to_vec(),
        })
    }
}

/// Steps through the length-prefixed cells of the rows buffer.
struct CellReader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> CellReader<'a> {
    fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    /// Read the next cell; `None` is a null cell (length -1).
    fn next_cell(&mut self) -> anyhow::Result<Option<&'a [u8]>> {
        anyhow::ensure!(
            self.buffer.len() >= self.offset + 4,
            "Not enough bytes for cell length"
        );
        let length = i32::from_be_bytes(self.buffer[self.offset..][..4].try_into()?);
        self.offset += 4;
        if length < 0 {
            anyhow::ensure!(length == -1, "Invalid cell length: {}", length);
            return Ok(None);
        }
        anyhow::ensure!(
            self.buffer.len() >= self.offset + length as usize,
            "Not enough bytes for cell"
        );
        let cell = &self.buffer[self.offset..][..length as usize];
        self.offset += length as usize;
        Ok(Some(cell))
    }
}

/// One row of a Rows result. Columns are taken left to right, statically typed
/// through [`ColumnDecoder`] or dynamically against the advertised
/// [`CqlType`]s.
pub struct Row<'a, 'r> {
    cells: &'r mut CellReader<'a>,
    metadata: &'a RowsResultMetadata,
    column: usize,
}

impl<'a, 'r> Row<'a, 'r> {
    fn new(cells: &'r mut CellReader<'a>, metadata: &'a RowsResultMetadata) -> Self {
        Self {
            cells,
            metadata,
            column: 0,
        }
    }

    /// The spec of the column that would be taken next, when the server sent
    /// metadata.
    pub fn spec(&self) -> Option<&'a ColumnSpec> {
        self.metadata.column_specs().as_ref()?.get(self.column)
    }

    /// How many columns are left in this row.
    pub fn remaining(&self) -> usize {
        (self.metadata.columns_count() as usize).saturating_sub(self.column)
    }

    /// Decode the next column into a static type. Null cells decode through
    /// the empty slice, so wrap nullable columns in `Option`.
    pub fn take<T: ColumnDecoder>(&mut self) -> anyhow::Result<T> {
        let cell = self.next_cell()?;
        T::try_decode_column(cell.unwrap_or(&[]))
    }

    /// Decode the next column against its advertised type.
    pub fn take_value(&mut self) -> anyhow::Result<CqlValue> {
        let kind = self
            .spec()
            .map(|spec| spec.kind().clone())
            .ok_or_else(|| anyhow::anyhow!("No column spec for column {}", self.column))?;
        let cell = self.next_cell()?;
        CqlValue::try_decode(cell, &kind)
    }

    /// Step over the next column without decoding it.
    pub fn skip(&mut self) -> anyhow::Result<()> {
        self.next_cell().map(|_| ())
    }

    fn next_cell(&mut self) -> anyhow::Result<Option<&'a [u8]>> {
        anyhow::ensure!(self.remaining() > 0, "No more columns in this row");
        let cell = self.cells.next_cell()?;
        self.column += 1;
        Ok(cell)
    }

    /// Step over whatever the row decoder did not consume, so the reader
    /// lands on the next row boundary.
    fn finish(mut self) -> anyhow::Result<()> {
        while self.remaining() > 0 {
            self.skip()?;
        }
        Ok(())
    }
}

/// Decodes one row from its cells in column order. Implemented for tuples of
/// [`ColumnDecoder`]s; a decoder may consume fewer columns than the row has.
pub trait FromRow: Sized {
    fn from_row(row: &mut Row<'_, '_>) -> anyhow::Result<Self>;
}

macro_rules! impl_from_row {
    ($($t:tt),+) => {
        impl<$($t: ColumnDecoder),+> FromRow for ($($t,)+) {
            fn from_row(row: &mut Row<'_, '_>) -> anyhow::Result<Self> {
                Ok(($(row.take::<$t>()?,)+))
            }
        }
    };
}

impl_from_row!(T1);
impl_from_row!(T1, T2);
impl_from_row!(T1, T2, T3);
impl_from_row!(T1, T2, T3, T4);
impl_from_row!(T1, T2, T3, T4, T5);
impl_from_row!(T1, T2, T3, T4, T5, T6);
impl_from_row!(T1, T2, T3, T4, T5, T6, T7);
impl_from_row!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_from_row!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_from_row!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_from_row!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_from_row!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);

/// Iterates the rows of a result, decoding each through `R`. A malformed row
/// ends the iteration, since the cell boundaries are lost past it.
pub struct RowsIter<'a, R: FromRow> {
    cells: CellReader<'a>,
    metadata: &'a RowsResultMetadata,
    remaining: usize,
    _marker: PhantomData<R>,
}

impl<'a, R: FromRow> RowsIter<'a, R> {
    fn new(result: &'a RowsResult) -> Self {
        Self {
            cells: CellReader::new(result.rows()),
            metadata: result.metadata(),
            remaining: result.rows_count() as usize,
            _marker: PhantomData,
        }
    }

    /// How many rows have not been decoded yet.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Check if more pages can be requested after this one.
    pub fn has_more_pages(&self) -> bool {
        self.metadata.flags().has_more_pages()
    }

    /// Get the opaque paging cursor of the result.
    pub fn paging_state(&self) -> &'a Option<Vec<u8>> {
        self.metadata.paging_state()
    }
}

impl<'a, R: FromRow> Iterator for RowsIter<'a, R> {
    type Item = anyhow::Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let mut row = Row::new(&mut self.cells, self.metadata);
        let decoded = R::from_row(&mut row).and_then(|decoded| {
            row.finish()?;
            Ok(decoded)
        });
        if decoded.is_ok() {
            self.remaining -= 1;
        } else {
            self.remaining = 0;
        }
        Some(decoded)
    }
}

/// One materialized row: its values keyed by column name, in column order.
#[derive(Clone, Debug)]
pub struct Record {
    columns: Vec<(String, CqlValue)>,
}

impl Record {
    /// Get a value by column name.
    pub fn get(&self, name: &str) -> Option<&CqlValue> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Get the values in column order.
    pub fn values(&self) -> impl Iterator<Item = &CqlValue> + '_ {
        self.columns.iter().map(|(_, v)| v)
    }

    /// Get the column names and values in column order.
    pub fn columns(&self) -> &[(String, CqlValue)] {
        &self.columns
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check whether the record has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// The bind-parameter metadata of a prepared statement, including the indices
/// of the partition key columns among them.
#[derive(Clone, Debug)]
pub struct PreparedResultMetadata {
    flags: ResultFlags,
    columns_count: i32,
    pk_indexes: Vec<u16>,
    global_table_spec: Option<GlobalTableSpec>,
    column_specs: Option<Vec<ColumnSpec>>,
}

impl PreparedResultMetadata {
    pub fn flags(&self) -> ResultFlags {
        self.flags
    }

    pub fn columns_count(&self) -> i32 {
        self.columns_count
    }

    /// Indices of the partition key columns within the bind parameters.
    pub fn pk_indexes(&self) -> &[u16] {
        &self.pk_indexes
    }

    pub fn global_table_spec(&self) -> &Option<GlobalTableSpec> {
        &self.global_table_spec
    }

    pub fn column_specs(&self) -> &Option<Vec<ColumnSpec>> {
        &self.column_specs
    }
}

impl FromPayload for PreparedResultMetadata {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let flags = ResultFlags(read_int(start, payload)?);
        let columns_count = read_int(start, payload)?;
        let pk_count = read_int(start, payload)?;
        anyhow::ensure!(pk_count >= 0, "Invalid partition key count: {}", pk_count);
        let mut pk_indexes = Vec::with_capacity(pk_count as usize);
        for _ in 0..pk_count {
            pk_indexes.push(read_short(start, payload)?);
        }
        let global_table_spec = if flags.global_tables_spec() {
            Some(GlobalTableSpec::from_payload(start, payload)?)
        } else {
            None
        };
        let column_specs = read_column_specs(start, payload, columns_count, flags.global_tables_spec())?;
        Ok(Self {
            flags,
            columns_count,
            pk_indexes,
            global_table_spec,
            column_specs,
        })
    }
}

/// The descriptor of a freshly prepared statement: the server-assigned opaque
/// id, the bind metadata, and the result metadata.
#[derive(Clone, Debug)]
pub struct PreparedResult {
    id: Vec<u8>,
    metadata: PreparedResultMetadata,
    result_metadata: Option<RowsResultMetadata>,
}

impl PreparedResult {
    /// Get the opaque prepared statement id.
    pub fn id(&self) -> &[u8] {
        &self.id
    }

    /// Get the bind-parameter metadata.
    pub fn metadata(&self) -> &PreparedResultMetadata {
        &self.metadata
    }

    /// Get the result metadata, unless the server omitted it.
    pub fn result_metadata(&self) -> &Option<RowsResultMetadata> {
        &self.result_metadata
    }
}

impl FromPayload for PreparedResult {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let id = read_prepared_id(start, payload)?;
        let metadata = PreparedResultMetadata::from_payload(start, payload)?;
        let result_metadata = Some(RowsResultMetadata::from_payload(start, payload)?);
        Ok(Self {
            id,
            metadata,
            result_metadata,
        })
    }
}

/// The result of a schema altering query.
#[derive(Clone, Debug)]
pub struct SchemaChangeResult {
    pub(crate) change_type: SchemaChangeType,
    pub(crate) target: SchemaChangeTarget,
}

impl SchemaChangeResult {
    /// Get the change type.
    pub fn change_type(&self) -> SchemaChangeType {
        self.change_type
    }

    /// Get the change target.
    pub fn target(&self) -> &SchemaChangeTarget {
        &self.target
    }
}

impl FromPayload for SchemaChangeResult {
    fn from_payload(start: &mut usize, payload: &[u8]) -> anyhow::Result<Self> {
        let change_type = SchemaChangeType::from_payload(start, payload)?;
        let target = SchemaChangeTarget::from_payload(start, payload)?;
        Ok(Self { change_type, target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serialize a Rows result body with one varchar and one int column.
    fn rows_payload(rows: &[(&str, i32)], paging_state: Option<&[u8]>) -> Vec<u8> {
        let mut payload = Vec::new();
        write_int(ROWS, &mut payload);
        let mut flags = GLOBAL_TABLES_SPEC;
        if paging_state.is_some() {
            flags |= HAS_MORE_PAGES;
        }
        write_int(flags, &mut payload);
        write_int(2, &mut payload);
        if let Some(state) = paging_state {
            write_bytes(state, &mut payload);
        }
        write_string("ks", &mut payload);
        write_string("tbl", &mut payload);
        write_string("name", &mut payload);
        CqlType::Varchar.to_payload(&mut payload);
        write_string("count", &mut payload);
        CqlType::Int.to_payload(&mut payload);
        write_int(rows.len() as i32, &mut payload);
        for (name, count) in rows {
            write_bytes(name.as_bytes(), &mut payload);
            write_bytes(&count.to_be_bytes(), &mut payload);
        }
        payload
    }

    #[test]
    fn rows_typed_iteration() {
        let payload = rows_payload(&[("a", 1), ("b", 2), ("c", 3)], None);
        let frame = ResultFrame::from_payload(&mut 0, &payload).unwrap();
        let rows: RowsResult = frame.try_into().unwrap();
        assert_eq!(rows.rows_count(), 3);
        let collected = rows
            .iter::<(String, i32)>()
            .collect::<anyhow::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(
            collected,
            vec![("a".to_owned(), 1), ("b".to_owned(), 2), ("c".to_owned(), 3)]
        );
    }

    #[test]
    fn partially_consumed_rows_stay_aligned() {
        let payload = rows_payload(&[("a", 1), ("b", 2)], None);
        let frame = ResultFrame::from_payload(&mut 0, &payload).unwrap();
        let rows: RowsResult = frame.try_into().unwrap();
        // a one-column decoder leaves the int cell behind; the iterator must
        // still land on the next row boundary
        let names = rows
            .iter::<(String,)>()
            .map(|row| row.map(|(name,)| name))
            .collect::<anyhow::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(names, vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn row_spec_drives_dynamic_decode() {
        let payload = rows_payload(&[("a", 1)], None);
        let frame = ResultFrame::from_payload(&mut 0, &payload).unwrap();
        let rows: RowsResult = frame.try_into().unwrap();
        let mut cells = CellReader::new(rows.rows());
        let mut row = Row::new(&mut cells, rows.metadata());
        assert_eq!(row.spec().map(|s| s.name()), Some("name"));
        assert_eq!(row.take_value().unwrap(), CqlValue::Varchar("a".to_owned()));
        assert_eq!(row.spec().map(|s| s.kind()), Some(&CqlType::Int));
        assert_eq!(row.remaining(), 1);
    }

    #[test]
    fn rows_record_and_columnar_views() {
        let payload = rows_payload(&[("x", 10), ("y", 20)], None);
        let frame = ResultFrame::from_payload(&mut 0, &payload).unwrap();
        let rows: RowsResult = frame.try_into().unwrap();

        let records = rows.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("name"), Some(&CqlValue::Varchar("x".to_owned())));
        assert_eq!(records[1].get("count"), Some(&CqlValue::Int(20)));

        let counts = rows.column(1).unwrap();
        assert_eq!(counts, vec![CqlValue::Int(10), CqlValue::Int(20)]);
    }

    #[test]
    fn paging_state_is_surfaced() {
        let payload = rows_payload(&[("x", 1)], Some(b"cursor"));
        let frame = ResultFrame::from_payload(&mut 0, &payload).unwrap();
        let rows: RowsResult = frame.try_into().unwrap();
        assert!(rows.metadata().flags().has_more_pages());
        assert_eq!(rows.metadata().paging_state(), &Some(b"cursor".to_vec()));
    }

    #[test]
    fn set_keyspace_result() {
        let mut payload = Vec::new();
        write_int(SETKEYSPACE, &mut payload);
        write_string("system", &mut payload);
        let frame = ResultFrame::from_payload(&mut 0, &payload).unwrap();
        match frame.kind() {
            ResultBodyKind::SetKeyspace(ks) => assert_eq!(ks, "system"),
            _ => panic!("Expected SetKeyspace"),
        }
    }

    #[test]
    fn prepared_result_decode() {
        let mut payload = Vec::new();
        write_int(PREPARED, &mut payload);
        write_short_bytes(&[9, 9, 9], &mut payload);
        // bind metadata: two columns, pk index 0
        write_int(GLOBAL_TABLES_SPEC, &mut payload);
        write_int(2, &mut payload);
        write_int(1, &mut payload);
        write_short(0, &mut payload);
        write_string("ks", &mut payload);
        write_string("tbl", &mut payload);
        write_string("id", &mut payload);
        CqlType::Uuid.to_payload(&mut payload);
        write_string("data", &mut payload);
        CqlType::Blob.to_payload(&mut payload);
        // result metadata: no columns
        write_int(0, &mut payload);
        write_int(0, &mut payload);
        let frame = ResultFrame::from_payload(&mut 0, &payload).unwrap();
        match frame.kind() {
            ResultBodyKind::Prepared(prepared) => {
                assert_eq!(prepared.id(), &[9, 9, 9]);
                assert_eq!(prepared.metadata().pk_indexes(), &[0]);
                let specs = prepared.metadata().column_specs().as_ref().unwrap();
                assert_eq!(specs[0].name(), "id");
                assert_eq!(specs[1].kind(), &CqlType::Blob);
            }
            _ => panic!("Expected Prepared"),
        }
    }
}
