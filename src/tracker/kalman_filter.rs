//! Constant-velocity Kalman filter over XYAH boxes, on nalgebra static matrices.

use nalgebra::{SMatrix, SVector};

/// Mean over (cx, cy, a, h) and their velocities.
pub type StateVector = SVector<f64, 8>;
/// Covariance of [`StateVector`].
pub type StateCovariance = SMatrix<f64, 8, 8>;
type Measurement = SVector<f64, 4>;
type Projection = SMatrix<f64, 4, 8>;

/// Tracks a box in XYAH space with constant-velocity motion.
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    /// State transition (position += velocity each frame)
    motion_mat: StateCovariance,
    /// Projects state onto the measured XYAH part
    update_mat: Projection,
    /// Position noise relative to box height
    std_weight_position: f64,
    /// Velocity noise relative to box height
    std_weight_velocity: f64,
}

impl Default for KalmanFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl KalmanFilter {
    /// Filter with unit time step and the usual ByteTrack noise weights.
    pub fn new() -> Self {
        let mut motion_mat = StateCovariance::identity();
        for i in 0..4 {
            motion_mat[(i, 4 + i)] = 1.0;
        }
        let mut update_mat = Projection::zeros();
        for i in 0..4 {
            update_mat[(i, i)] = 1.0;
        }

        Self {
            motion_mat,
            update_mat,
            std_weight_position: 1.0 / 20.0,
            std_weight_velocity: 1.0 / 160.0,
        }
    }

    /// Diagonal noise scaled by the box height.
    fn noise(&self, height: f64, pos_scale: f64, vel_scale: f64) -> StateCovariance {
        let p = pos_scale * self.std_weight_position * height;
        let v = vel_scale * self.std_weight_velocity * height;
        let std = StateVector::from([p, p, 1e-2, p, v, v, 1e-5, v]);
        StateCovariance::from_diagonal(&std.component_mul(&std))
    }

    /// Start a track from an unassociated measurement; velocities start at zero.
    pub fn initiate(&self, measurement: [f64; 4]) -> (StateVector, StateCovariance) {
        let mut mean = StateVector::zeros();
        mean.fixed_rows_mut::<4>(0)
            .copy_from(&Measurement::from(measurement));
        (mean, self.noise(measurement[3], 2.0, 10.0))
    }

    /// Advance the state one frame.
    pub fn predict(
        &self,
        mean: &StateVector,
        covariance: &StateCovariance,
    ) -> (StateVector, StateCovariance) {
        let motion_cov = self.noise(mean[3], 1.0, 1.0);
        let mean = self.motion_mat * mean;
        let covariance = self.motion_mat * covariance * self.motion_mat.transpose() + motion_cov;
        (mean, covariance)
    }

    /// State distribution mapped into measurement space.
    fn project(
        &self,
        mean: &StateVector,
        covariance: &StateCovariance,
    ) -> (Measurement, SMatrix<f64, 4, 4>) {
        let p = self.std_weight_position * mean[3];
        let std = Measurement::from([p, p, 1e-1, p]);
        let innovation_cov = SMatrix::<f64, 4, 4>::from_diagonal(&std.component_mul(&std));
        (
            self.update_mat * mean,
            self.update_mat * covariance * self.update_mat.transpose() + innovation_cov,
        )
    }

    /// Correct the state with a measurement. A singular innovation covariance
    /// leaves the state unchanged.
    pub fn update(
        &self,
        mean: &StateVector,
        covariance: &StateCovariance,
        measurement: [f64; 4],
    ) -> (StateVector, StateCovariance) {
        let (projected_mean, projected_cov) = self.project(mean, covariance);
        let Some(s_inv) = projected_cov.try_inverse() else {
            return (*mean, *covariance);
        };

        let kalman_gain = covariance * self.update_mat.transpose() * s_inv;
        let innovation = Measurement::from(measurement) - projected_mean;

        let mean = mean + kalman_gain * innovation;
        let covariance = covariance - kalman_gain * projected_cov * kalman_gain.transpose();
        (mean, covariance)
    }
}
