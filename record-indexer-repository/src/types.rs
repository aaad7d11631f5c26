//! Repository-side data types.

/// A geocoding entry from the `location` table.
///
/// Entries for one place are consumed in ascending `importance` order; an
/// importance of `0` marks a definite match.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct GeoLocation {
    pub place: String,
    pub lon: f64,
    pub lat: f64,
    pub importance: i32,
}

impl GeoLocation {
    /// Whether this entry is a definite match.
    pub fn is_definite(&self) -> bool {
        self.importance == 0
    }

    /// The `"lon lat"` form stored in the geo field.
    pub fn coordinates(&self) -> String {
        format!("{} {}", self.lon, self.lat)
    }
}
