//! Query string decoding
//!
//! Everything here is synchronous and store-agnostic: filter strings compile
//! into a [`Filter`] tree, sort strings into a [`SortSpec`], and allow-lists
//! are checked against the compiled tree before any store call happens.

mod allow_list;
mod error;
mod extract;
mod filter;
mod sort;
mod value;

pub use allow_list::{ensure_filterable, non_filterable_fields};
pub use error::QueryError;
pub use extract::extract_field_value;
pub use filter::{
    parse_filter, Condition, Filter, FilterExpression, Operator, Pattern, Predicate, TextMatch,
};
pub use sort::{decode_sort, SortDirection, SortKey, SortSpec};
pub use value::{
    day_bounds, end_of_day, format_date, month_bounds, parse_datetime, start_of_day, year_bounds,
    FilterValue,
};
