//! Linear algebra type aliases for the wind estimator
//!
//! The filter itself runs on dynamically sized matrices so the same
//! measurement update serves both observation models; these aliases pin the
//! dimensions at the edges.

use nalgebra::{DMatrix, DVector, Matrix3, SMatrix, SVector, Vector3};

// ===== State Dimensions =====
pub const WIND_STATE_DIM: usize = 4; // wind_n, wind_e, wind_d, airspeed_scale

// ===== Measurement Dimensions =====
pub const MEASURE_DIM_NORTH: usize = 1; // north velocity only
pub const MEASURE_DIM_NED: usize = 3; // north, east, down velocity

// ===== Wind Filter Types =====
pub type WindStateVec = SVector<f64, WIND_STATE_DIM>;
pub type WindStateMat = SMatrix<f64, WIND_STATE_DIM, WIND_STATE_DIM>;

/// NED-to-body rotation
pub type RotationMat = Matrix3<f64>;
pub type BodyVec = Vector3<f64>;

// Runtime-sized working types for the measurement update
pub type DynMat = DMatrix<f64>;
pub type DynVec = DVector<f64>;
