//! Loading [`EvolveOptions`] from TOML.
//!
//! Every field is optional; missing fields take their defaults. Stepper
//! parameters live in a `[stepper]` table:
//!
//! ```toml
//! equation = "SE"
//! integrator = "dopri5"
//! imaginary_time = false
//!
//! [stepper]
//! atol = 1e-10
//! max_step = 0.01
//! ```

use std::path::Path;
use tracing::debug;
use crate::{
    error::{ OperatorError, OpResult },
    evolve::{ Equation, EvolveOptions },
    ode::Integrator,
};

impl EvolveOptions {
    /// Parse options from a TOML string and [validate][Self::validate] them.
    pub fn from_toml_str(s: &str) -> OpResult<Self> {
        let options: Self = toml::from_str(s)?;
        options.validate()?;
        Ok(options)
    }

    /// Read options from a TOML file and [validate][Self::validate] them.
    pub fn from_file<P: AsRef<Path>>(path: P) -> OpResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading evolution options");
        Self::from_toml_str(&content)
    }

    /// Check that the options describe a possible evolution, independent of
    /// any operator or state.
    pub fn validate(&self) -> OpResult<()> {
        if self.equation == Equation::LiouvilleVonNeumann {
            if self.imaginary_time {
                return Err(OperatorError::UnsupportedForLvne("imaginary time"));
            }
            if self.real_split {
                return Err(OperatorError::UnsupportedForLvne("real split"));
            }
        }
        if !Integrator::is_high_order_name(&self.integrator) {
            self.integrator.parse::<Integrator>()?;
        }
        let s = &self.stepper;
        let positive
            = [("atol", s.atol), ("rtol", s.rtol), ("first_step", s.first_step),
               ("max_step", s.max_step)];
        for (name, value) in positive {
            if let Some(x) = value {
                if !(x.is_finite() && x > 0.0) {
                    return Err(OperatorError::InvalidOption(
                        format!("{name} must be positive and finite, got {x}")));
                }
            }
        }
        if s.nsteps == Some(0) {
            return Err(OperatorError::InvalidOption(
                "nsteps must be at least 1".to_string()));
        }
        Ok(())
    }
}
