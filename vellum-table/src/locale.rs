//! Locale knobs consumed by the converters.
//!
//! The locale supplies the decimal and grouping marks and the ordered
//! format lists used when guessing temporal columns. Full locale tables
//! (month names, weekday names) are an external concern.

/// Number and date conventions for parsing and guessing.
#[derive(Debug, Clone)]
pub struct Locale {
    pub decimal_mark: char,
    pub grouping_mark: char,
    /// Ordered `chrono` format strings tried when guessing dates.
    pub date_formats: Vec<String>,
    pub time_formats: Vec<String>,
    pub datetime_formats: Vec<String>,
}

impl Default for Locale {
    fn default() -> Self {
        Self {
            decimal_mark: '.',
            grouping_mark: ',',
            date_formats: to_strings(&["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"]),
            time_formats: to_strings(&["%H:%M:%S", "%H:%M", "%I:%M:%S %p"]),
            datetime_formats: to_strings(&[
                "%Y-%m-%dT%H:%M:%S%.f",
                "%Y-%m-%dT%H:%M:%S%.fZ",
                "%Y-%m-%d %H:%M:%S%.f",
            ]),
        }
    }
}

impl Locale {
    /// A European-style locale: comma decimals, dot grouping.
    pub fn european() -> Self {
        Self {
            decimal_mark: ',',
            grouping_mark: '.',
            ..Self::default()
        }
    }
}

fn to_strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}
