//! Piecewise-linear transfer functions mapping scalar values to color and
//! opacity.

/// Scalar range the presets are defined over.
pub const SCALAR_RANGE: (f32, f32) = (0.0, 255.0);

/// Values at or below this are fully transparent in the opacity preset.
pub const BACKGROUND_THRESHOLD: f32 = 10.0;

/// PET-style heatmap: black, blue, green, red, yellow.
pub const PET_HEATMAP: [(f32, [f32; 3]); 5] = [
    (0.0, [0.0, 0.0, 0.0]),
    (64.0, [0.0, 0.0, 1.0]),
    (128.0, [0.0, 1.0, 0.0]),
    (192.0, [1.0, 0.0, 0.0]),
    (255.0, [1.0, 1.0, 0.0]),
];

pub const BACKGROUND_SUPPRESSION: [(f32, f32); 3] =
    [(0.0, 0.0), (BACKGROUND_THRESHOLD, 0.0), (255.0, 1.0)];

/// Values a transfer function can interpolate between.
pub trait Interpolate: Copy + Default {
    fn lerp(self, other: Self, t: f32) -> Self;
}

impl Interpolate for f32 {
    fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }
}

impl Interpolate for [f32; 3] {
    fn lerp(self, other: Self, t: f32) -> Self {
        [
            Interpolate::lerp(self[0], other[0], t),
            Interpolate::lerp(self[1], other[1], t),
            Interpolate::lerp(self[2], other[2], t),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlPoint<T> {
    pub value: f32,
    pub output: T,
}

/// Control points kept strictly increasing in scalar value.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferFunction<T> {
    points: Vec<ControlPoint<T>>,
}

pub type ColorTransferFunction = TransferFunction<[f32; 3]>;
pub type OpacityTransferFunction = TransferFunction<f32>;

impl<T: Interpolate> Default for TransferFunction<T> {
    fn default() -> Self {
        Self { points: Vec::new() }
    }
}

impl<T: Interpolate> TransferFunction<T> {
    pub fn new(points: impl IntoIterator<Item = (f32, T)>) -> Self {
        let mut function = Self::default();
        for (value, output) in points {
            function.add_point(value, output);
        }
        function
    }

    /// Insert a control point, replacing any point at the same value.
    /// Non-finite values are ignored.
    pub fn add_point(&mut self, value: f32, output: T) {
        if !value.is_finite() {
            return;
        }
        let point = ControlPoint { value, output };
        match self.points.binary_search_by(|p| p.value.total_cmp(&value)) {
            Ok(i) => self.points[i] = point,
            Err(i) => self.points.insert(i, point),
        }
    }

    pub fn points(&self) -> &[ControlPoint<T>] {
        &self.points
    }

    /// Evaluate at `value`, clamping to the first and last point.
    pub fn sample(&self, value: f32) -> T {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return T::default();
        };
        if value.is_nan() || value <= first.value {
            return first.output;
        }
        if value >= last.value {
            return last.output;
        }

        let upper = self.points.partition_point(|p| p.value <= value);
        let (a, b) = (&self.points[upper - 1], &self.points[upper]);
        let t = (value - a.value) / (b.value - a.value);
        a.output.lerp(b.output, t)
    }
}

impl ColorTransferFunction {
    pub fn pet_heatmap() -> Self {
        Self::new(PET_HEATMAP)
    }
}

impl OpacityTransferFunction {
    pub fn background_suppression() -> Self {
        Self::new(BACKGROUND_SUPPRESSION)
    }
}

/// Bake both functions into an RGBA8 lookup table spanning [`SCALAR_RANGE`].
pub fn bake_lookup_table(
    color: &ColorTransferFunction,
    opacity: &OpacityTransferFunction,
    resolution: u32,
) -> Vec<[u8; 4]> {
    let (lo, hi) = SCALAR_RANGE;
    let steps = resolution.max(2) - 1;
    let to_u8 = |c: f32| (c * 255.0).round().clamp(0.0, 255.0) as u8;

    (0..=steps)
        .map(|i| {
            let value = lo + (hi - lo) * i as f32 / steps as f32;
            let [r, g, b] = color.sample(value);
            [to_u8(r), to_u8(g), to_u8(b), to_u8(opacity.sample(value))]
        })
        .collect()
}
