//! Borrowed sequence views that remember their space

use crate::device::{DeviceSlice, DeviceSliceMut};
use crate::space::Space;

/// Read-only contiguous sequence in host or device memory
#[derive(Debug)]
pub enum Seq<'a, T> {
    Host(&'a [T]),
    Device(DeviceSlice<'a, T>),
}

impl<T> Clone for Seq<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Seq<'_, T> {}

impl<'a, T> Seq<'a, T> {
    pub fn len(&self) -> usize {
        match self {
            Seq::Host(s) => s.len(),
            Seq::Device(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn space(&self) -> Space {
        match self {
            Seq::Host(_) => Space::Host,
            Seq::Device(s) => s.space(),
        }
    }

    /// The elements as a plain slice; device memory is host addressable.
    pub(crate) fn elements(&self) -> &'a [T] {
        match self {
            Seq::Host(s) => *s,
            Seq::Device(s) => s.data(),
        }
    }
}

impl<'a, T> From<&'a [T]> for Seq<'a, T> {
    fn from(slice: &'a [T]) -> Self {
        Seq::Host(slice)
    }
}

impl<'a, T> From<&'a Vec<T>> for Seq<'a, T> {
    fn from(v: &'a Vec<T>) -> Self {
        Seq::Host(v.as_slice())
    }
}

impl<'a, T> From<DeviceSlice<'a, T>> for Seq<'a, T> {
    fn from(slice: DeviceSlice<'a, T>) -> Self {
        Seq::Device(slice)
    }
}

/// Writable contiguous sequence in host or device memory
#[derive(Debug)]
pub enum SeqMut<'a, T> {
    Host(&'a mut [T]),
    Device(DeviceSliceMut<'a, T>),
}

impl<'a, T> SeqMut<'a, T> {
    pub fn len(&self) -> usize {
        match self {
            SeqMut::Host(s) => s.len(),
            SeqMut::Device(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn space(&self) -> Space {
        match self {
            SeqMut::Host(_) => Space::Host,
            SeqMut::Device(s) => s.space(),
        }
    }

    /// Shorter-lived view of the same elements, so one `SeqMut` can feed several calls
    pub fn reborrow(&mut self) -> SeqMut<'_, T> {
        match self {
            SeqMut::Host(s) => SeqMut::Host(&mut **s),
            SeqMut::Device(s) => SeqMut::Device(s.reborrow()),
        }
    }

    /// Read-only view of the same elements
    pub fn as_seq(&self) -> Seq<'_, T> {
        match self {
            SeqMut::Host(s) => Seq::Host(&**s),
            SeqMut::Device(s) => Seq::Device(s.as_slice()),
        }
    }

    pub(crate) fn elements_mut(&mut self) -> &mut [T] {
        match self {
            SeqMut::Host(s) => &mut **s,
            SeqMut::Device(s) => s.data_mut(),
        }
    }
}

impl<'a, T> From<&'a mut [T]> for SeqMut<'a, T> {
    fn from(slice: &'a mut [T]) -> Self {
        SeqMut::Host(slice)
    }
}

impl<'a, T> From<&'a mut Vec<T>> for SeqMut<'a, T> {
    fn from(v: &'a mut Vec<T>) -> Self {
        SeqMut::Host(v.as_mut_slice())
    }
}

impl<'a, T> From<DeviceSliceMut<'a, T>> for SeqMut<'a, T> {
    fn from(slice: DeviceSliceMut<'a, T>) -> Self {
        SeqMut::Device(slice)
    }
}
