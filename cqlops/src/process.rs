//! Transforms from a raw [`ResultSet`] into application values
//!
//! These back the select transformers, and are public for callers that obtained a result set
//! some other way, e.g. from a [`QueryFuture`][crate::QueryFuture] on a plain select.
//!
//! Failures raised by caller supplied functions, or by value conversion, surface as
//! [`Error::Transform`]. Asking for a single result from more than one row surfaces as
//! [`Error::Cardinality`].
use indexmap::IndexMap;

use crate::{
    error::{BoxError, Error, Result},
    result::{ResultSet, Row},
    value::{FromValue, Value},
};

/// Map every row, in order
pub fn process_rows<T>(
    result: ResultSet,
    mapper: impl Fn(&Row) -> Result<T, BoxError>,
) -> Result<Vec<T>> {
    result
        .into_iter()
        .map(|row| mapper(&row).map_err(Error::transform))
        .collect()
}

/// Take the only row, or the first one
///
/// With `single_result` set, a result holding more than one row fails with
/// [`Error::Cardinality`]; otherwise extra rows are ignored. An empty result yields `None`.
pub fn process_one_row(result: ResultSet, single_result: bool) -> Result<Option<Row>> {
    if single_result && result.len() > 1 {
        return Err(Error::Cardinality {
            actual: result.len(),
        });
    }
    Ok(result.into_iter().next())
}

/// Map the only row, or the first one; see [`process_one_row`]
pub fn process_one<T>(
    result: ResultSet,
    mapper: impl Fn(&Row) -> Result<T, BoxError>,
    single_result: bool,
) -> Result<Option<T>> {
    process_one_row(result, single_result)?
        .map(|row| mapper(&row).map_err(Error::transform))
        .transpose()
}

fn first_column<E: FromValue>(row: &Row) -> Result<E> {
    row.get(0).map_err(Error::transform)
}

/// The first column of every row, converted to `E`
///
/// A row without any column is a transform failure.
pub fn process_first_column<E: FromValue>(result: ResultSet) -> Result<Vec<E>> {
    result.into_iter().map(|row| first_column(&row)).collect()
}

/// The first column of the only row, or of the first one; see [`process_one_row`]
pub fn process_one_first_column<E: FromValue>(
    result: ResultSet,
    single_result: bool,
) -> Result<Option<E>> {
    process_one_row(result, single_result)?
        .map(|row| first_column(&row))
        .transpose()
}

/// Every row as a column name to value map
pub fn process_as_maps(result: ResultSet) -> Result<Vec<IndexMap<String, Value>>> {
    Ok(result.rows().iter().map(Row::to_map).collect())
}

/// The only row, or the first one, as a column name to value map; see [`process_one_row`]
pub fn process_one_as_map(
    result: ResultSet,
    single_result: bool,
) -> Result<Option<IndexMap<String, Value>>> {
    Ok(process_one_row(result, single_result)?.map(|row| row.to_map()))
}

/// `true` iff the result holds at least one row
pub fn process_exists(result: ResultSet) -> bool {
    !result.is_empty()
}

/// Read a count: the first column of the first row, zero for an empty result
pub fn process_count(result: ResultSet) -> Result<i64> {
    Ok(process_one_first_column(result, false)?.unwrap_or(0))
}

/// Hand the whole result to a caller supplied extractor
pub fn process_with_extractor<T>(
    result: ResultSet,
    extractor: impl FnOnce(ResultSet) -> Result<T, BoxError>,
) -> Result<T> {
    extractor(result).map_err(Error::transform)
}

/// Call `handler` for each row, in order, stopping at the first failure
pub fn process_each(
    result: ResultSet,
    mut handler: impl FnMut(&Row) -> Result<(), BoxError>,
) -> Result<()> {
    for row in result {
        handler(&row).map_err(Error::transform)?;
    }
    Ok(())
}
