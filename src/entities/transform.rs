//! Rigid transforms between coordinate frames, with optional uncertainty.
//!
//! A `RigidTransform` maps points from a child frame into its parent frame:
//! `p_parent = R * p_child + t`. Composition is written left-to-right in
//! matrix order, `a.compose(&b)` applies `b` first.
//!
//! Uncertainty is a 6×6 covariance over a small left-perturbation twist
//! `[rotation; translation]` and is propagated to first order through
//! composition and inversion via the adjoint of the transform. Uncertainty
//! accumulates monotonically along a chain of compositions.

use glam::{DMat3, DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Rotation + translation mapping child-frame points into the parent frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidTransform {
    pub rotation: DQuat,
    pub translation: DVec3,
}

impl RigidTransform {
    pub const IDENTITY: RigidTransform = RigidTransform {
        rotation: DQuat::IDENTITY,
        translation: DVec3::ZERO,
    };

    pub fn new(rotation: DQuat, translation: DVec3) -> Self {
        Self {
            rotation: rotation.normalize(),
            translation,
        }
    }

    pub fn from_translation(translation: DVec3) -> Self {
        Self {
            rotation: DQuat::IDENTITY,
            translation,
        }
    }

    pub fn from_rotation(rotation: DQuat) -> Self {
        Self {
            rotation: rotation.normalize(),
            translation: DVec3::ZERO,
        }
    }

    /// `self ∘ other`: apply `other`, then `self`.
    pub fn compose(&self, other: &RigidTransform) -> RigidTransform {
        RigidTransform {
            rotation: (self.rotation * other.rotation).normalize(),
            translation: self.rotation * other.translation + self.translation,
        }
    }

    pub fn inverse(&self) -> RigidTransform {
        let inv_rot = self.rotation.inverse();
        RigidTransform {
            rotation: inv_rot,
            translation: -(inv_rot * self.translation),
        }
    }

    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.rotation * point + self.translation
    }

    pub fn approx_eq(&self, other: &RigidTransform, eps: f64) -> bool {
        // q and -q are the same rotation
        let dot = self.rotation.dot(other.rotation).abs();
        dot >= 1.0 - eps && (self.translation - other.translation).length() <= eps
    }
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// 6×6 covariance over a `[rotation; translation]` perturbation twist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Covariance(pub [[f64; 6]; 6]);

impl Covariance {
    pub const ZERO: Covariance = Covariance([[0.0; 6]; 6]);

    /// Diagonal covariance from per-axis rotation and translation variances.
    pub fn from_diagonal(rot_var: [f64; 3], trans_var: [f64; 3]) -> Self {
        let mut m = [[0.0; 6]; 6];
        for i in 0..3 {
            m[i][i] = rot_var[i];
            m[i + 3][i + 3] = trans_var[i];
        }
        Covariance(m)
    }

    pub fn add(&self, other: &Covariance) -> Covariance {
        let mut m = [[0.0; 6]; 6];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = self.0[i][j] + other.0[i][j];
            }
        }
        Covariance(m)
    }

    /// `adj * self * adjᵀ`: transport the covariance through a frame change.
    pub fn transported(&self, adj: &[[f64; 6]; 6]) -> Covariance {
        let tmp = mat6_mul(adj, &self.0);
        let adj_t = mat6_transpose(adj);
        Covariance(mat6_mul(&tmp, &adj_t))
    }

    pub fn trace(&self) -> f64 {
        (0..6).map(|i| self.0[i][i]).sum()
    }
}

fn mat6_mul(a: &[[f64; 6]; 6], b: &[[f64; 6]; 6]) -> [[f64; 6]; 6] {
    let mut out = [[0.0; 6]; 6];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            let mut acc = 0.0;
            for k in 0..6 {
                acc += a[i][k] * b[k][j];
            }
            *cell = acc;
        }
    }
    out
}

fn mat6_transpose(a: &[[f64; 6]; 6]) -> [[f64; 6]; 6] {
    let mut out = [[0.0; 6]; 6];
    for (i, row) in a.iter().enumerate() {
        for (j, v) in row.iter().enumerate() {
            out[j][i] = *v;
        }
    }
    out
}

fn skew(v: DVec3) -> DMat3 {
    DMat3::from_cols(
        DVec3::new(0.0, v.z, -v.y),
        DVec3::new(-v.z, 0.0, v.x),
        DVec3::new(v.y, -v.x, 0.0),
    )
}

/// Adjoint of a rigid transform, ordered `[rotation; translation]`:
/// `[[R, 0], [skew(t)·R, R]]`.
fn adjoint(t: &RigidTransform) -> [[f64; 6]; 6] {
    let r = DMat3::from_quat(t.rotation);
    let tr = skew(t.translation) * r;
    let mut adj = [[0.0; 6]; 6];
    for col in 0..3 {
        for row in 0..3 {
            // glam matrices are column-major
            adj[row][col] = r.col(col)[row];
            adj[row + 3][col] = tr.col(col)[row];
            adj[row + 3][col + 3] = r.col(col)[row];
        }
    }
    adj
}

/// A rigid transform paired with an optional 6×6 covariance.
///
/// `None` covariance means "exact"; composing an exact transform with an
/// uncertain one transports the uncertainty without adding to it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformWithUncertainty {
    pub transform: RigidTransform,
    pub covariance: Option<Covariance>,
}

impl TransformWithUncertainty {
    pub const IDENTITY: TransformWithUncertainty = TransformWithUncertainty {
        transform: RigidTransform::IDENTITY,
        covariance: None,
    };

    pub fn certain(transform: RigidTransform) -> Self {
        Self {
            transform,
            covariance: None,
        }
    }

    pub fn uncertain(transform: RigidTransform, covariance: Covariance) -> Self {
        Self {
            transform,
            covariance: Some(covariance),
        }
    }

    /// `self ∘ other`, covariance transported through `self` and summed.
    pub fn compose(&self, other: &TransformWithUncertainty) -> TransformWithUncertainty {
        let transform = self.transform.compose(&other.transform);
        let covariance = match (&self.covariance, &other.covariance) {
            (None, None) => None,
            _ => {
                let own = self.covariance.unwrap_or(Covariance::ZERO);
                let transported = other
                    .covariance
                    .unwrap_or(Covariance::ZERO)
                    .transported(&adjoint(&self.transform));
                Some(own.add(&transported))
            }
        };
        TransformWithUncertainty {
            transform,
            covariance,
        }
    }

    pub fn inverse(&self) -> TransformWithUncertainty {
        let inv = self.transform.inverse();
        let covariance = self.covariance.map(|c| c.transported(&adjoint(&inv)));
        TransformWithUncertainty {
            transform: inv,
            covariance,
        }
    }
}

impl Default for TransformWithUncertainty {
    fn default() -> Self {
        Self::IDENTITY
    }
}
