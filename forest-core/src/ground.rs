/// Terrain height lookup used to seat tree bases.
pub trait Ground {
    fn height_at(&self, x: f32, z: f32) -> f32;
}

/// A horizontal plane.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FlatGround {
    pub height: f32,
}

impl Ground for FlatGround {
    #[inline]
    fn height_at(&self, _x: f32, _z: f32) -> f32 {
        self.height
    }
}

impl<F: Fn(f32, f32) -> f32> Ground for F {
    #[inline]
    fn height_at(&self, x: f32, z: f32) -> f32 {
        self(x, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_and_closure_grounds() {
        assert_eq!(FlatGround { height: 2.5 }.height_at(10.0, -4.0), 2.5);
        let slope = |x: f32, z: f32| 0.5 * x + z;
        assert_eq!(slope.height_at(2.0, 1.0), 2.0);
    }
}
