pub mod matrix;
pub mod wind_estimator;
