pub mod progress;
pub mod table;

pub use progress::{ProgressStore, Section};
pub use table::{count_rows, read_listings, CsvSink, Row};
