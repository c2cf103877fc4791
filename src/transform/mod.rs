//! Table-level maintenance applied before typing and keying.

pub mod columns;
pub mod temporal;

pub use columns::{drop_if_exist, rename_if_exist};
pub use temporal::{DATETIME_COLUMN, DayPeriod, add_time_dimension, canonicalize_datetime};
