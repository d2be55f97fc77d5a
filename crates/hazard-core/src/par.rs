//! Parallel iteration shim: rayon when the `threading` feature is on, plain
//! sequential iterators otherwise. Call sites use the same method names.

#[cfg(feature = "threading")]
pub(crate) use rayon::prelude::*;

#[cfg(not(feature = "threading"))]
pub(crate) trait IntoMaybeParIter: IntoIterator + Sized {
    fn into_par_iter(self) -> Self::IntoIter {
        self.into_iter()
    }
}

#[cfg(not(feature = "threading"))]
impl<I: IntoIterator> IntoMaybeParIter for I {}

#[cfg(not(feature = "threading"))]
pub(crate) trait MaybeParSlice<T> {
    fn par_iter(&self) -> std::slice::Iter<'_, T>;
}

#[cfg(not(feature = "threading"))]
impl<T> MaybeParSlice<T> for [T] {
    fn par_iter(&self) -> std::slice::Iter<'_, T> {
        self.iter()
    }
}
