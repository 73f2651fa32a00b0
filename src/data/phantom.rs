//! Synthetic head phantom for demos and tests.
//!
//! Nested ellipsoids stand in for tissue classes, each with a nominal (PD, T1):
//!
//! - deep gray matter (the structures FGATIR is acquired for)
//! - white matter
//! - cortical gray matter
//! - background outside the outer shell (mask false, noise only)
//!
//! Both acquisitions are forward-simulated as magnitudes `|S + n|` with Gaussian
//! noise `n ~ N(0, noise_sigma)` from a seeded `StdRng`, so a given config always
//! produces the same volumes.
//!
//! Tissue T1s are chosen so that the default polarity assumption (MPRAGE positive,
//! FGATIR negative) holds in every foreground voxel.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{AcquisitionParameters, Geometry, Mask, Volume};
use crate::error::AppError;
use crate::math::forward_signal;

/// Nominal tissue parameters (PD relative, T1 in ms).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tissue {
    pub name: &'static str,
    pub pd: f64,
    pub t1: f64,
}

pub const DEEP_GM: Tissue = Tissue {
    name: "deep_gm",
    pd: 0.78,
    t1: 950.0,
};
pub const WHITE_MATTER: Tissue = Tissue {
    name: "wm",
    pd: 0.70,
    t1: 700.0,
};
pub const CORTICAL_GM: Tissue = Tissue {
    name: "gm",
    pd: 0.82,
    t1: 1250.0,
};

/// Normalized ellipsoid radii bounding each class, innermost first.
const SHELLS: [(f64, Tissue); 3] = [(0.35, DEEP_GM), (0.75, WHITE_MATTER), (0.95, CORTICAL_GM)];

#[derive(Debug, Clone)]
pub struct PhantomConfig {
    pub dims: (usize, usize, usize),
    pub voxel_size: (f64, f64, f64),
    pub acquisition: AcquisitionParameters,
    /// Multiplies PD, emulating a normalized intensity scale.
    pub intensity_scale: f64,
    /// Absolute noise standard deviation (same units as the scaled signal).
    pub noise_sigma: f64,
    pub seed: u64,
}

/// Simulated inputs plus the ground truth they were generated from.
#[derive(Debug, Clone)]
pub struct PhantomData {
    pub mprage: Volume,
    pub fgatir: Volume,
    pub mask: Mask,
    pub true_pd: Volume,
    pub true_t1: Volume,
}

/// Tissue at normalized radius `r`, or `None` outside the head.
pub fn tissue_at(r: f64) -> Option<Tissue> {
    SHELLS.iter().find(|(bound, _)| r < *bound).map(|(_, t)| *t)
}

pub fn generate_phantom(config: &PhantomConfig) -> Result<PhantomData, AppError> {
    let (nx, ny, nz) = config.dims;
    if nx == 0 || ny == 0 || nz == 0 {
        return Err(AppError::config(format!("Phantom shape {:?} has an empty axis.", config.dims)));
    }
    config.acquisition.validate()?;
    if !(config.intensity_scale.is_finite() && config.intensity_scale > 0.0) {
        return Err(AppError::config("Phantom intensity scale must be > 0."));
    }
    if !(config.noise_sigma.is_finite() && config.noise_sigma >= 0.0) {
        return Err(AppError::config("Phantom noise sigma must be >= 0."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    // σ = 0 is accepted by `Normal`, but skip sampling entirely for exact data.
    let noise = if config.noise_sigma > 0.0 {
        Some(
            Normal::new(0.0, config.noise_sigma)
                .map_err(|e| AppError::config(format!("Noise distribution error: {e}")))?,
        )
    } else {
        None
    };

    let geometry = Geometry::scaled(config.dims, config.voxel_size);
    let n = geometry.len();
    let acq = config.acquisition;
    let mut mprage = Vec::with_capacity(n);
    let mut fgatir = Vec::with_capacity(n);
    let mut mask = Vec::with_capacity(n);
    let mut true_pd = Vec::with_capacity(n);
    let mut true_t1 = Vec::with_capacity(n);

    let centre = |i: usize, len: usize| (i as f64 + 0.5) / len as f64 * 2.0 - 1.0;
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                let (u, v, w) = (centre(x, nx), centre(y, ny), centre(z, nz));
                let r = (u * u + v * v + w * w).sqrt();
                let tissue = tissue_at(r);

                let (pd, t1) = tissue.map_or((0.0, 0.0), |t| (t.pd * config.intensity_scale, t.t1));
                let (s1, s2) = if tissue.is_some() {
                    (
                        signal_or_zero(pd, t1, acq.ti1, acq.tr),
                        signal_or_zero(pd, t1, acq.ti2, acq.tr),
                    )
                } else {
                    (0.0, 0.0)
                };
                let (n1, n2) = match &noise {
                    Some(dist) => (dist.sample(&mut rng), dist.sample(&mut rng)),
                    None => (0.0, 0.0),
                };

                mprage.push((s1 + n1).abs());
                fgatir.push((s2 + n2).abs());
                mask.push(tissue.is_some());
                true_pd.push(pd);
                true_t1.push(t1);
            }
        }
    }

    Ok(PhantomData {
        mprage: Volume::new(geometry.clone(), mprage)?,
        fgatir: Volume::new(geometry.clone(), fgatir)?,
        mask: Mask::new(geometry.clone(), mask)?,
        true_pd: Volume::new(geometry.clone(), true_pd)?,
        true_t1: Volume::new(geometry, true_t1)?,
    })
}

fn signal_or_zero(pd: f64, t1: f64, ti: f64, tr: f64) -> f64 {
    forward_signal(pd, t1, ti, tr).unwrap_or(0.0)
}
