// src/binding.rs
//
// Boundary adapter for scripting-language callers.
// Packs the core result into the `(gradient_row_vector, energy)` tuple shape
// such callers expect. No computation happens here.

use serde::{Deserialize, Serialize};

use crate::data_term::{data_term_at_location, DataTermResult};
use crate::error::Result;
use crate::params::DataTermParams;
use crate::scalar_field::ScalarField2D;

/// `([gradient_x, gradient_y], energy)`; serialises as `[[gx, gy], energy]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataTermTuple(pub [f32; 2], pub f32);

impl From<DataTermResult> for DataTermTuple {
    fn from(r: DataTermResult) -> Self {
        Self(r.gradient, r.energy)
    }
}

impl From<DataTermTuple> for ([f32; 2], f32) {
    fn from(t: DataTermTuple) -> Self {
        (t.0, t.1)
    }
}

/// Same argument order as the core entry point, default scaling factor.
pub fn data_term_at_location_tuple(
    warped_live_field: &ScalarField2D,
    canonical_field: &ScalarField2D,
    x: i64,
    y: i64,
    live_gradient_x_field: &ScalarField2D,
    live_gradient_y_field: &ScalarField2D,
) -> Result<DataTermTuple> {
    data_term_at_location(
        warped_live_field,
        canonical_field,
        x,
        y,
        live_gradient_x_field,
        live_gradient_y_field,
        &DataTermParams::default(),
    )
    .map(DataTermTuple::from)
}

/// JSON text of the tuple, for callers that exchange values as strings.
pub fn data_term_at_location_json(
    warped_live_field: &ScalarField2D,
    canonical_field: &ScalarField2D,
    x: i64,
    y: i64,
    live_gradient_x_field: &ScalarField2D,
    live_gradient_y_field: &ScalarField2D,
) -> Result<String> {
    let t = data_term_at_location_tuple(
        warped_live_field,
        canonical_field,
        x,
        y,
        live_gradient_x_field,
        live_gradient_y_field,
    )?;
    Ok(serde_json::to_string(&t)?)
}
