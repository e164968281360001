use anyhow::{bail, Result};
use glam::{Quat, Vec3};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetPath {
    Translation,
    Rotation,
    Scale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelInterpolation {
    Step,
    Linear,
    CubicSpline,
}

impl ChannelInterpolation {
    /// Interpolation strings arrive from the asset loader as written in the
    /// animation sampler; anything that is neither STEP nor LINEAR is a
    /// cubic spline.
    pub fn from_sampler_str(value: &str) -> Self {
        match value {
            "STEP" => ChannelInterpolation::Step,
            "LINEAR" => ChannelInterpolation::Linear,
            _ => ChannelInterpolation::CubicSpline,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ChannelKeys {
    Vec3Keys(Arc<[Vec3]>),
    QuatKeys(Arc<[Quat]>),
}

#[derive(Clone, Copy, Debug)]
pub enum ChannelValue {
    Translation(Vec3),
    Rotation(Quat),
    Scale(Vec3),
}

/// A single animated property of one node, sampled from keyframe arrays.
/// For cubic-spline channels the key array is triple-packed per sample:
/// in-tangent, value, out-tangent.
#[derive(Clone, Debug)]
pub struct AnimationChannel {
    pub target_node: u32,
    pub target_path: TargetPath,
    pub interpolation: ChannelInterpolation,
    timings: Arc<[f32]>,
    keys: ChannelKeys,
}

impl AnimationChannel {
    pub fn new(
        target_node: u32,
        target_path: TargetPath,
        interpolation: ChannelInterpolation,
        timings: Arc<[f32]>,
        keys: ChannelKeys,
    ) -> Result<Self> {
        if timings.is_empty() {
            bail!("Animation channel must contain at least one keyframe (node {target_node})");
        }
        for window in timings.windows(2) {
            if window[1] <= window[0] {
                bail!(
                    "Animation channel timings must be strictly increasing (node {target_node})"
                );
            }
        }
        let key_count = match &keys {
            ChannelKeys::Vec3Keys(values) => values.len(),
            ChannelKeys::QuatKeys(values) => values.len(),
        };
        let expected = match interpolation {
            ChannelInterpolation::CubicSpline => timings.len() * 3,
            _ => timings.len(),
        };
        if key_count != expected {
            bail!(
                "Animation channel keyframe count mismatch (node {target_node}, expected {expected}, got {key_count})"
            );
        }
        match (&keys, target_path) {
            (ChannelKeys::QuatKeys(_), TargetPath::Rotation) => {}
            (ChannelKeys::Vec3Keys(_), TargetPath::Translation | TargetPath::Scale) => {}
            _ => bail!("Animation channel value type does not match its target path (node {target_node})"),
        }
        Ok(Self { target_node, target_path, interpolation, timings, keys })
    }

    pub fn max_time(&self) -> f32 {
        *self.timings.last().unwrap_or(&0.0)
    }

    /// Sample the channel at `time`. Outside the keyframe range the boundary
    /// value is returned unchanged; no extrapolation.
    pub fn sample(&self, time: f32) -> ChannelValue {
        let last = self.timings.len() - 1;
        if time <= self.timings[0] {
            return self.key_value(0);
        }
        if time >= self.timings[last] {
            return self.key_value(last);
        }

        // Bracketing pair: first timing strictly greater than `time`.
        let mut prev = 0;
        let mut next = 0;
        for (index, &timing) in self.timings.iter().enumerate() {
            if timing > time {
                next = index;
                break;
            }
            prev = index;
            next = index;
        }
        if prev == next {
            return self.key_value(prev);
        }

        let span = self.timings[next] - self.timings[prev];
        let t = (time - self.timings[prev]) / span;

        match self.interpolation {
            ChannelInterpolation::Step => self.key_value(prev),
            ChannelInterpolation::Linear => match &self.keys {
                ChannelKeys::Vec3Keys(values) => {
                    self.wrap(values[prev].lerp(values[next], t))
                }
                ChannelKeys::QuatKeys(values) => {
                    self.wrap_quat(values[prev].slerp(values[next], t).normalize())
                }
            },
            ChannelInterpolation::CubicSpline => self.sample_cubic(prev, next, span, t),
        }
    }

    fn sample_cubic(&self, prev: usize, next: usize, span: f32, t: f32) -> ChannelValue {
        let t2 = t * t;
        let t3 = t2 * t;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        match &self.keys {
            ChannelKeys::Vec3Keys(values) => {
                let value_prev = values[prev * 3 + 1];
                let tangent_prev = values[prev * 3 + 2] * span;
                let value_next = values[next * 3 + 1];
                let tangent_next = values[next * 3] * span;
                self.wrap(
                    value_prev * h00 + tangent_prev * h10 + value_next * h01 + tangent_next * h11,
                )
            }
            ChannelKeys::QuatKeys(values) => {
                let value_prev = values[prev * 3 + 1];
                let tangent_prev = values[prev * 3 + 2] * span;
                let value_next = values[next * 3 + 1];
                let tangent_next = values[next * 3] * span;
                // The Hermite blend runs component-wise on the quaternion and
                // the result is not renormalized here.
                self.wrap_quat(
                    value_prev * h00 + tangent_prev * h10 + value_next * h01 + tangent_next * h11,
                )
            }
        }
    }

    fn key_value(&self, index: usize) -> ChannelValue {
        let slot = match self.interpolation {
            ChannelInterpolation::CubicSpline => index * 3 + 1,
            _ => index,
        };
        match &self.keys {
            ChannelKeys::Vec3Keys(values) => self.wrap(values[slot]),
            ChannelKeys::QuatKeys(values) => self.wrap_quat(values[slot]),
        }
    }

    fn wrap(&self, value: Vec3) -> ChannelValue {
        match self.target_path {
            TargetPath::Translation => ChannelValue::Translation(value),
            TargetPath::Scale => ChannelValue::Scale(value),
            TargetPath::Rotation => unreachable!("vec3 keys on a rotation channel"),
        }
    }

    fn wrap_quat(&self, value: Quat) -> ChannelValue {
        ChannelValue::Rotation(value)
    }
}
