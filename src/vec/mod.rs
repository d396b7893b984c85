use std::cmp;
use std::fmt;
use std::ops;

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A fixed-dimension vector over `f32`. The dimension is a compile-time
/// constant of the simulated system (1, 2 or 3 in practice).
#[derive(Debug, Copy, Clone)]
pub struct Vector<const D: usize> {
    pub data: [f32; D],
}

impl<const D: usize> Default for Vector<D> {
    fn default() -> Self {
        Self { data: [0.0; D] }
    }
}

impl<const D: usize> fmt::Display for Vector<D> {
    fn fmt(&self, v: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(v, "(")?;

        for (axis, value) in self.data.iter().enumerate() {
            if axis > 0 {
                write!(v, ", ")?;
            }
            write!(v, "{}", value)?;
        }

        write!(v, ")")
    }
}

impl<const D: usize> Vector<D> {
    pub fn new(data: [f32; D]) -> Self {
        Self { data }
    }

    pub fn ones() -> Self {
        Self { data: [1.0; D] }
    }

    pub fn mag_squared(self) -> f32 {
        self.data.iter().map(|value| value * value).sum()
    }

    pub fn mag(self) -> f32 {
        self.mag_squared().sqrt()
    }

    pub fn dot(self, rhs: Self) -> f32 {
        let mut sum = 0.0;

        for axis in 0..D {
            sum += self.data[axis] * rhs.data[axis];
        }

        sum
    }

    pub fn as_normal(self) -> Self {
        self / self.mag()
    }

    pub fn interpolate(start: Self, end: Self, alpha: f32) -> Self {
        start + (end - start) * alpha
    }

    pub fn is_finite(self) -> bool {
        self.data.iter().all(|value| value.is_finite())
    }
}

impl<const D: usize> cmp::PartialEq for Vector<D> {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl<const D: usize> ops::Index<usize> for Vector<D> {
    type Output = f32;

    fn index(&self, axis: usize) -> &f32 {
        &self.data[axis]
    }
}

impl<const D: usize> ops::IndexMut<usize> for Vector<D> {
    fn index_mut(&mut self, axis: usize) -> &mut f32 {
        &mut self.data[axis]
    }
}

impl<const D: usize> ops::Neg for Vector<D> {
    type Output = Vector<D>;

    fn neg(self) -> Self::Output {
        self * -1.0
    }
}

impl<const D: usize> ops::Add<Vector<D>> for Vector<D> {
    type Output = Vector<D>;
    fn add(mut self, rhs: Vector<D>) -> Vector<D> {
        self += rhs;
        self
    }
}

impl<const D: usize> ops::AddAssign<Vector<D>> for Vector<D> {
    fn add_assign(&mut self, rhs: Vector<D>) {
        for axis in 0..D {
            self.data[axis] += rhs.data[axis];
        }
    }
}

impl<const D: usize> ops::Sub<Vector<D>> for Vector<D> {
    type Output = Vector<D>;
    fn sub(mut self, rhs: Vector<D>) -> Vector<D> {
        self -= rhs;
        self
    }
}

impl<const D: usize> ops::SubAssign<Vector<D>> for Vector<D> {
    fn sub_assign(&mut self, rhs: Vector<D>) {
        for axis in 0..D {
            self.data[axis] -= rhs.data[axis];
        }
    }
}

impl<const D: usize> ops::Mul<Vector<D>> for Vector<D> {
    type Output = Vector<D>;
    fn mul(mut self, rhs: Vector<D>) -> Vector<D> {
        self *= rhs;
        self
    }
}

impl<const D: usize> ops::MulAssign<Vector<D>> for Vector<D> {
    fn mul_assign(&mut self, rhs: Vector<D>) {
        for axis in 0..D {
            self.data[axis] *= rhs.data[axis];
        }
    }
}

impl<const D: usize> ops::Mul<f32> for Vector<D> {
    type Output = Vector<D>;
    fn mul(mut self, rhs: f32) -> Vector<D> {
        self *= rhs;
        self
    }
}

impl<const D: usize> ops::MulAssign<f32> for Vector<D> {
    fn mul_assign(&mut self, rhs: f32) {
        for axis in 0..D {
            self.data[axis] *= rhs;
        }
    }
}

impl<const D: usize> ops::Div<f32> for Vector<D> {
    type Output = Vector<D>;
    fn div(mut self, rhs: f32) -> Vector<D> {
        self /= rhs;
        self
    }
}

impl<const D: usize> ops::DivAssign<f32> for Vector<D> {
    fn div_assign(&mut self, rhs: f32) {
        for axis in 0..D {
            self.data[axis] /= rhs;
        }
    }
}

impl<const D: usize> ops::Div<Vector<D>> for Vector<D> {
    type Output = Vector<D>;
    fn div(mut self, rhs: Vector<D>) -> Vector<D> {
        self /= rhs;
        self
    }
}

impl<const D: usize> ops::DivAssign<Vector<D>> for Vector<D> {
    fn div_assign(&mut self, rhs: Vector<D>) {
        for axis in 0..D {
            self.data[axis] /= rhs.data[axis];
        }
    }
}

// Serde's derive can't express a bound on `[f32; D]`, so the tuple encoding
// is spelled out here.
impl<const D: usize> Serialize for Vector<D> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(D)?;
        for value in &self.data {
            tuple.serialize_element(value)?;
        }
        tuple.end()
    }
}

impl<'de, const D: usize> Deserialize<'de> for Vector<D> {
    fn deserialize<De: Deserializer<'de>>(deserializer: De) -> Result<Self, De::Error> {
        struct VectorVisitor<const D: usize>;

        impl<'de, const D: usize> Visitor<'de> for VectorVisitor<D> {
            type Value = Vector<D>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a sequence of {} floats", D)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut data = [0.0; D];

                for (axis, value) in data.iter_mut().enumerate() {
                    *value = seq
                        .next_element()?
                        .ok_or_else(|| serde::de::Error::invalid_length(axis, &self))?;
                }

                Ok(Vector { data })
            }
        }

        deserializer.deserialize_tuple(D, VectorVisitor)
    }
}
