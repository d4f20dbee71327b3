//! Sample-format conversion between `cpal`'s device-native formats and
//! the `i16` PCM the codec layer speaks. The teacher's `sample_to_f32`
//! reached for `std::mem::transmute_copy` keyed off `TypeId`; this
//! crate expresses the same per-format dispatch as two small traits
//! instead, so each conversion is checked by the compiler rather than
//! asserted at runtime.

/// Converts one device-native sample into a linear PCM16 sample.
pub trait ToI16Sample: Copy {
    fn to_i16_sample(self) -> i16;
}

/// Converts one linear PCM16 sample into a device-native sample.
pub trait FromI16Sample: Copy {
    fn from_i16_sample(sample: i16) -> Self;
}

impl ToI16Sample for i16 {
    fn to_i16_sample(self) -> i16 {
        self
    }
}

impl FromI16Sample for i16 {
    fn from_i16_sample(sample: i16) -> Self {
        sample
    }
}

impl ToI16Sample for u16 {
    fn to_i16_sample(self) -> i16 {
        (self as i32 - i16::MAX as i32 - 1) as i16
    }
}

impl FromI16Sample for u16 {
    fn from_i16_sample(sample: i16) -> Self {
        (sample as i32 + i16::MAX as i32 + 1) as u16
    }
}

impl ToI16Sample for f32 {
    fn to_i16_sample(self) -> i16 {
        (self.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
    }
}

impl FromI16Sample for f32 {
    fn from_i16_sample(sample: i16) -> Self {
        sample as f32 / i16::MAX as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_round_trip_is_near_lossless() {
        for raw in [-32768i32, -1000, 0, 1000, 32767] {
            let s = raw as i16;
            let f = f32::from_i16_sample(s);
            let back = f.to_i16_sample();
            assert!((back as i32 - s as i32).abs() <= 1);
        }
    }

    #[test]
    fn u16_round_trip_is_exact() {
        for s in [i16::MIN, -1, 0, 1, i16::MAX] {
            let u = u16::from_i16_sample(s);
            assert_eq!(u.to_i16_sample(), s);
        }
    }
}
