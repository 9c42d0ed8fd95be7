mod helpers;
mod points;

pub mod op;

pub use helpers::parse_boolean_flag;
pub use points::{Points, PointsConversionError};
