//! Read a delimited file lazily and print its schema and first rows.
//!
//! ```bash
//! cargo run --example read_csv -- data.csv
//! ```

use vellum::{ReadOptions, read};

fn main() -> vellum::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "data.csv".to_string());

    let table = read(&path, &ReadOptions::default())?;

    println!("{} rows x {} columns", table.row_count(), table.column_count());
    for (name, ty) in table.names().iter().zip(table.types()) {
        println!("  {name}: {}", ty.label());
    }

    for row in table.iter_rows().take(5) {
        println!("{:?}", row?);
    }

    for problem in table.problems() {
        eprintln!(
            "row {} col {}: expected {}, saw {:?}",
            problem.row, problem.col, problem.expected, problem.observed
        );
    }
    Ok(())
}
