//! Plot-shape check for chart queries
//!
//! A chart query must select exactly a label and an aggregated value:
//! `SELECT label, AGG(...) FROM ...`. The check is textual; commas inside function
//! arguments are miscounted.

const AGGREGATES: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX"];

/// Whether `sql` has the two-column label/aggregate shape a chart needs
#[must_use]
pub fn validate_plot(sql: &str) -> bool {
    let upper = sql.trim().to_ascii_uppercase();
    let Some(rest) = upper.strip_prefix("SELECT") else {
        return false;
    };

    let select_list = rest.split("FROM").next().unwrap_or_default();
    match select_list.split(',').collect::<Vec<_>>().as_slice() {
        [_, value] => AGGREGATES.iter().any(|agg| value.contains(agg)),
        _ => false,
    }
}
