use crate::error::EstimatorError;
use crate::filters::matrix::gauss_jordan_inverse;
use crate::types::{
    Attitude, BodyVec, DynMat, DynVec, Ned, RotationMat, WindStateMat, WindStateVec,
    MEASURE_DIM_NED, MEASURE_DIM_NORTH, WIND_STATE_DIM,
};
use serde::{Deserialize, Serialize};

/// Below this relative airspeed (m/s) the sideslip angle has no meaning.
const MIN_RELATIVE_AIRSPEED: f64 = 1e-9;

/// Which velocity components feed the measurement update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationModel {
    /// Single row: north velocity only
    #[default]
    NorthAxis,
    /// North, east and down velocity
    ThreeAxis,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindEstimatorConfig {
    /// Diagonal of the initial covariance
    pub initial_covariance: [f64; WIND_STATE_DIM],
    /// Diagonal of the process noise
    pub process_noise: [f64; WIND_STATE_DIM],
    /// Variance of each velocity measurement
    pub measurement_noise: f64,
    pub model: ObservationModel,
    /// Propagate `P + Q` before each measurement update (random-walk wind).
    /// Off by default: the update then uses `P` as is.
    pub apply_process_noise: bool,
}

impl Default for WindEstimatorConfig {
    fn default() -> Self {
        Self {
            initial_covariance: [10.0, 10.0, 10.0, 0.1],
            process_noise: [0.01, 0.01, 0.01, 0.0001],
            measurement_noise: 1.0,
            model: ObservationModel::NorthAxis,
            apply_process_noise: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AirflowAngles {
    pub angle_of_attack: f64,
    pub sideslip: f64,
}

/// Snapshot of the estimator for display or serialization
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WindEstimate {
    pub wind: Ned,
    pub airspeed_scale: f64,
    pub angle_of_attack: f64,
    pub angle_of_attack_deg: f64,
    pub sideslip_angle: f64,
    pub sideslip_angle_deg: f64,
    pub covariance_trace: f64,
    pub updates: u64,
}

/// Kalman filter over `[wind_n, wind_e, wind_d, airspeed_scale]`.
///
/// Each instance owns its own state so several estimators can run side by
/// side. Nothing resets the state except [`WindEstimator::reset`].
pub struct WindEstimator {
    config: WindEstimatorConfig,
    state: DynVec,
    covariance: DynMat,
    process_noise: DynMat,
    wind: Ned,
    angle_of_attack: f64,
    sideslip_angle: f64,
    update_count: u64,
}

impl WindEstimator {
    pub fn new(config: WindEstimatorConfig) -> Self {
        let process_noise = DynMat::from_diagonal(&DynVec::from_row_slice(&config.process_noise));
        let mut estimator = Self {
            state: Self::initial_state(),
            covariance: Self::initial_covariance(&config),
            process_noise,
            config,
            wind: Ned::default(),
            angle_of_attack: 0.0,
            sideslip_angle: 0.0,
            update_count: 0,
        };
        estimator.sync_wind();
        estimator
    }

    fn initial_state() -> DynVec {
        DynVec::from_row_slice(&[0.0, 0.0, 0.0, 1.0])
    }

    fn initial_covariance(config: &WindEstimatorConfig) -> DynMat {
        DynMat::from_diagonal(&DynVec::from_row_slice(&config.initial_covariance))
    }

    /// Return to the start-up state: zero wind, unit scale, initial covariance.
    pub fn reset(&mut self) {
        self.state = Self::initial_state();
        self.covariance = Self::initial_covariance(&self.config);
        self.angle_of_attack = 0.0;
        self.sideslip_angle = 0.0;
        self.update_count = 0;
        self.sync_wind();
    }

    /// Fuse one navigation update into the wind estimate.
    ///
    /// `S = C·P·Cᵗ + R`, `K = P·Cᵗ·S⁻¹`, `x ← x + K·y`, `P ← (I − K·C)·P`.
    /// With `apply_process_noise` set, `P` is first replaced by `P + Q`. On
    /// error the filter state is left exactly as it was.
    pub fn update(
        &mut self,
        velocity: Ned,
        attitude: Attitude,
        measured_airspeed: f64,
    ) -> Result<Ned, EstimatorError> {
        if !velocity.is_finite() {
            return Err(EstimatorError::NonFiniteInput("velocity"));
        }
        if !attitude.is_finite() {
            return Err(EstimatorError::NonFiniteInput("attitude"));
        }
        if !measured_airspeed.is_finite() {
            return Err(EstimatorError::NonFiniteInput("airspeed"));
        }

        let rbn = rotation_ned_to_body(&attitude);
        let (c, z) = self.observation(&rbn, &velocity, measured_airspeed);
        let m = c.nrows();
        let r = DynMat::identity(m, m) * self.config.measurement_noise;

        let p_prior = if self.config.apply_process_noise {
            &self.covariance + &self.process_noise
        } else {
            self.covariance.clone()
        };
        let innovation = &z - &c * &self.state;
        let c_t = c.transpose();
        let s = &c * &p_prior * &c_t + r;
        let s_inv = gauss_jordan_inverse(&s)?;
        let gain = &p_prior * &c_t * s_inv;

        let state = &self.state + &gain * innovation;
        let identity = DynMat::identity(WIND_STATE_DIM, WIND_STATE_DIM);
        let covariance = (identity - &gain * &c) * p_prior;

        if state.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
            return Err(EstimatorError::NonFiniteInput("filter update"));
        }

        self.state = state;
        self.covariance = covariance;
        self.update_count += 1;
        self.sync_wind();
        Ok(self.wind)
    }

    /// Observation matrix and measurement vector for the configured model.
    fn observation(&self, rbn: &RotationMat, velocity: &Ned, airspeed: f64) -> (DynMat, DynVec) {
        match self.config.model {
            ObservationModel::NorthAxis => {
                let c = DynMat::from_row_slice(
                    MEASURE_DIM_NORTH,
                    WIND_STATE_DIM,
                    &[rbn[(0, 0)], rbn[(0, 1)], rbn[(0, 2)], airspeed],
                );
                let z = DynVec::from_row_slice(&[velocity.north]);
                (c, z)
            }
            ObservationModel::ThreeAxis => {
                let mut c = DynMat::zeros(MEASURE_DIM_NED, WIND_STATE_DIM);
                for row in 0..MEASURE_DIM_NED {
                    for col in 0..3 {
                        c[(row, col)] = rbn[(row, col)];
                    }
                }
                c[(0, 3)] = airspeed;
                let z = DynVec::from_row_slice(&[velocity.north, velocity.east, velocity.down]);
                (c, z)
            }
        }
    }

    /// Angle of attack and sideslip from the current wind estimate.
    ///
    /// The relative airflow `v - wind` is rotated into the body frame; a zero
    /// relative airspeed is rejected because sideslip is undefined there.
    pub fn compute_angles(
        &mut self,
        velocity: Ned,
        attitude: Attitude,
    ) -> Result<AirflowAngles, EstimatorError> {
        if !velocity.is_finite() {
            return Err(EstimatorError::NonFiniteInput("velocity"));
        }
        if !attitude.is_finite() {
            return Err(EstimatorError::NonFiniteInput("attitude"));
        }

        let rbn = rotation_ned_to_body(&attitude);
        let relative_ned = BodyVec::new(
            velocity.north - self.wind.north,
            velocity.east - self.wind.east,
            velocity.down - self.wind.down,
        );
        let relative = rbn * relative_ned;
        let airspeed = relative.norm();
        if airspeed < MIN_RELATIVE_AIRSPEED {
            return Err(EstimatorError::UndefinedSideslip);
        }

        let angles = AirflowAngles {
            angle_of_attack: relative.z.atan2(relative.x),
            sideslip: (relative.y / airspeed).clamp(-1.0, 1.0).asin(),
        };
        self.angle_of_attack = angles.angle_of_attack;
        self.sideslip_angle = angles.sideslip;
        Ok(angles)
    }

    fn sync_wind(&mut self) {
        self.wind = Ned::new(self.state[0], self.state[1], self.state[2]);
    }

    pub fn wind_velocity(&self) -> Ned {
        self.wind
    }

    pub fn angle_of_attack(&self) -> f64 {
        self.angle_of_attack
    }

    pub fn sideslip_angle(&self) -> f64 {
        self.sideslip_angle
    }

    pub fn airspeed_scale(&self) -> f64 {
        self.state[3]
    }

    pub fn state_vector(&self) -> WindStateVec {
        WindStateVec::from_column_slice(self.state.as_slice())
    }

    pub fn covariance(&self) -> WindStateMat {
        WindStateMat::from_column_slice(self.covariance.as_slice())
    }

    pub fn config(&self) -> &WindEstimatorConfig {
        &self.config
    }

    pub fn estimate(&self) -> WindEstimate {
        WindEstimate {
            wind: self.wind,
            airspeed_scale: self.airspeed_scale(),
            angle_of_attack: self.angle_of_attack,
            angle_of_attack_deg: self.angle_of_attack.to_degrees(),
            sideslip_angle: self.sideslip_angle,
            sideslip_angle_deg: self.sideslip_angle.to_degrees(),
            covariance_trace: self.covariance.trace(),
            updates: self.update_count,
        }
    }
}

impl Default for WindEstimator {
    fn default() -> Self {
        Self::new(WindEstimatorConfig::default())
    }
}

/// NED-to-body rotation for a 3-2-1 (yaw, pitch, roll) Euler sequence.
pub fn rotation_ned_to_body(attitude: &Attitude) -> RotationMat {
    let (sr, cr) = attitude.roll.sin_cos();
    let (sp, cp) = attitude.pitch.sin_cos();
    let (sy, cy) = attitude.yaw.sin_cos();

    RotationMat::new(
        cp * cy,
        cp * sy,
        -sp,
        sr * sp * cy - cr * sy,
        sr * sp * sy + cr * cy,
        sr * cp,
        cr * sp * cy + sr * sy,
        cr * sp * sy - sr * cy,
        cr * cp,
    )
}
