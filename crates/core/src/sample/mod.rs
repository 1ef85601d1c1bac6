use num_traits::AsPrimitive;

/// Working precision for all window and fade arithmetic.
pub type Work = f64;

/// Native stream element (integer PCM, `f32`, ...).
///
/// Conversion is a plain `as` cast in both directions: float to integer
/// truncates toward zero and saturates at the type bounds.
pub trait Sample: Copy + Default + Send + 'static {
    fn to_work(self) -> Work;
    fn from_work(value: Work) -> Self;
}

impl<T> Sample for T
where
    T: AsPrimitive<Work> + Default + Send,
    Work: AsPrimitive<T>,
{
    #[inline]
    fn to_work(self) -> Work {
        self.as_()
    }

    #[inline]
    fn from_work(value: Work) -> Self {
        value.as_()
    }
}
