use crate::csv_processor::reader::RawRow;
use crate::csv_processor::record::ColumnSchema;
use crate::utils::Result;
use tracing::warn;

/// Effective columns of one file, plus the first row when it turned out to be data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHeader {
    pub columns: ColumnSchema,
    pub first_data_row: Option<RawRow>,
}

/// Reads at most one row from `rows` to settle the column list.
///
/// With an explicit header the first row is dropped only when it repeats that
/// header exactly; otherwise it is handed back as data. Without one, the first
/// row is the header. An empty file gives an empty schema (or the explicit one).
pub fn resolve_header<I>(rows: &mut I, explicit: Option<&ColumnSchema>) -> Result<ResolvedHeader>
where
    I: Iterator<Item = Result<RawRow>>,
{
    let first = rows.next().transpose()?;

    match (explicit, first) {
        (Some(header), Some(row)) if header.matches_row(&row.tokens) => Ok(ResolvedHeader {
            columns: header.clone(),
            first_data_row: None,
        }),
        (Some(header), first) => Ok(ResolvedHeader {
            columns: header.clone(),
            first_data_row: first,
        }),
        (None, Some(row)) => {
            let (columns, renamed) = ColumnSchema::from_header_row(row.tokens);
            if !renamed.is_empty() {
                warn!(columns = ?renamed, "Renamed duplicate header columns");
            }
            Ok(ResolvedHeader {
                columns,
                first_data_row: None,
            })
        }
        (None, None) => Ok(ResolvedHeader {
            columns: ColumnSchema::empty(),
            first_data_row: None,
        }),
    }
}
