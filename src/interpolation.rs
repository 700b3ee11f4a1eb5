use num_traits::Float;
use std::fmt::Debug;

#[derive(Debug, thiserror::Error)]
pub enum InterpolationError {
    #[error("Input arrays were different lengths (x.len() = {x_len}, y.len() = {y_len}")]
    InputLengthMismatch { x_len: usize, y_len: usize },
    #[error(
        "Input arrays were too short, needed at least {req_len} elements but got only {actual_len}"
    )]
    InputTooShort { req_len: usize, actual_len: usize },
    #[error(
        "Requested output coordinate ({out}) falls outside the input domain ({left} to {right})"
    )]
    OutOfDomain {
        left: String,
        right: String,
        out: String,
    },
}

pub trait InterpolationMethod {
    fn interp1d<F: Float + Debug>(
        &self,
        input_x: &[F],
        input_y: &[F],
        output_x: F,
    ) -> Result<F, InterpolationError>;

    fn check_1d_inputs<F: Float + Debug>(
        &self,
        input_x: &[F],
        input_y: &[F],
        output_x: F,
        must_be_in_bounds: bool,
        min_len: usize,
    ) -> Result<(), InterpolationError> {
        if input_x.len() != input_y.len() {
            return Err(InterpolationError::InputLengthMismatch {
                x_len: input_x.len(),
                y_len: input_y.len(),
            });
        }

        // Now we know both are the same length, so only need to test 1
        if input_x.len() < min_len {
            return Err(InterpolationError::InputTooShort {
                req_len: min_len,
                actual_len: input_x.len(),
            });
        }

        if must_be_in_bounds {
            let left_bound = if let Some(x) = input_x.iter().copied().reduce(F::min) {
                x
            } else {
                // We only get None if the input is empty. If we got here, the min_len must have been 0, which means
                // the interpolator must handle the 0 length case
                return Ok(());
            };

            // If left bound was Some, this must also be Some.
            let right_bound = input_x
                .iter()
                .copied()
                .reduce(F::max)
                .expect("input_x.max() should return Some if input_x.min() returned Some()");

            if output_x < left_bound || output_x > right_bound {
                return Err(InterpolationError::OutOfDomain {
                    left: format!("{left_bound:?}"),
                    right: format!("{right_bound:?}"),
                    out: format!("{output_x:?}"),
                });
            }
        }

        Ok(())
    }
}

pub struct ConstantValueInterp {
    allow_extrapolation: bool,
}

impl ConstantValueInterp {
    pub fn new(allow_extrapolation: bool) -> Self {
        Self {
            allow_extrapolation,
        }
    }
}

impl InterpolationMethod for ConstantValueInterp {
    fn interp1d<F: Float + Debug>(
        &self,
        input_x: &[F],
        input_y: &[F],
        output_x: F,
    ) -> Result<F, InterpolationError> {
        self.check_1d_inputs(input_x, input_y, output_x, !self.allow_extrapolation, 1)?;
        // Checking the inputs ensures that output_x is in the domain of input_x if we do not allow extrapolation, so
        // we can safely find the nearest x value.
        let (i_closest, _) = input_x
            .iter()
            .enumerate()
            .fold(None, |acc, (i, x)| {
                let new_diff = (*x - output_x).abs();
                if let Some((curr_i, curr_diff)) = acc {
                    if new_diff < curr_diff {
                        Some((i, new_diff))
                    } else {
                        Some((curr_i, curr_diff))
                    }
                } else {
                    Some((i, new_diff))
                }
            })
            .expect("Inputs must have at least 1 element");

        Ok(input_y[i_closest])
    }
}

/// Continuous, piecewise-linear interpolation with endpoint-slope
/// extrapolation beyond the outermost breakpoints.
///
/// Used by the drift corrector to build its correction function from paired
/// girth-weld anchors: `input_x` is assumed sorted ascending and free of
/// duplicates (callers are responsible for collapsing duplicate x values
/// before building the breakpoint set, as the drift corrector does).
pub struct PiecewiseLinearInterp;

impl InterpolationMethod for PiecewiseLinearInterp {
    fn interp1d<F: Float + Debug>(
        &self,
        input_x: &[F],
        input_y: &[F],
        output_x: F,
    ) -> Result<F, InterpolationError> {
        self.check_1d_inputs(input_x, input_y, output_x, false, 1)?;

        if input_x.len() == 1 {
            return Ok(input_y[0]);
        }

        // Find the segment [input_x[i], input_x[i+1]] that contains output_x,
        // clamping to the outermost segment for extrapolation.
        let i = if output_x <= input_x[0] {
            0
        } else if output_x >= input_x[input_x.len() - 1] {
            input_x.len() - 2
        } else {
            input_x
                .windows(2)
                .position(|w| output_x >= w[0] && output_x <= w[1])
                .expect("output_x must fall within some segment given the bounds checked above")
        };

        let (x0, x1) = (input_x[i], input_x[i + 1]);
        let (y0, y1) = (input_y[i], input_y[i + 1]);
        let slope = (y1 - y0) / (x1 - x0);
        Ok(y0 + slope * (output_x - x0))
    }
}
