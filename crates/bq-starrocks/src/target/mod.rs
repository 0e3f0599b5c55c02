//! Destination database operations.
//!
//! StarRocks speaks the MySQL wire protocol, so the destination is driven
//! through `mysql_async`. Statement parameters share the protocol-wide
//! placeholder limit, which caps how many rows one INSERT may carry.

mod starrocks;

pub use starrocks::StarRocksDestination;

use tracing::warn;

/// Maximum bind parameters in one MySQL-protocol statement.
pub const MAX_PLACEHOLDERS: usize = 65_535;

/// Largest batch not exceeding [`MAX_PLACEHOLDERS`] for `num_cols` columns.
///
/// Returns `batch_size` unchanged when it already fits.
pub fn clamp_batch_size(batch_size: usize, num_cols: usize) -> usize {
    let batch_size = batch_size.max(1);
    if num_cols == 0 {
        return batch_size;
    }
    let max_rows = (MAX_PLACEHOLDERS / num_cols).max(1);
    if batch_size > max_rows {
        warn!(
            "batch size {} x {} columns exceeds {} placeholders, using {} rows per insert",
            batch_size, num_cols, MAX_PLACEHOLDERS, max_rows
        );
        max_rows
    } else {
        batch_size
    }
}
