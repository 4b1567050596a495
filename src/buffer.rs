//! Buffers handed to a [`RequestManager`](crate::RequestManager).
//!
//! The manager takes ownership of the buffer of every operation it starts
//! and gives it back with the completion, so one buffer can be read and
//! submitted again while the manager lives on. Moving a buffer value must
//! not move the elements it refers to: the message-passing layer keeps
//! reading or writing them until the operation completes. Heap-backed
//! containers and slice references qualify; arrays held by value do not.
//!
//! | Type         | [`Buffer`] | [`BufferMut`] |
//! |--------------|------------|---------------|
//! | `Vec<T>`     | yes        | yes           |
//! | `Box<[T]>`   | yes        | yes           |
//! | `&[T]`       | yes        | no            |
//! | `&mut [T]`   | yes        | yes           |

use crate::datatype::MpiDatatype;

/// A buffer whose elements can be sent.
///
/// # Safety
///
/// The slice returned by [`as_slice`](Buffer::as_slice) must keep its
/// address and length when the value is moved, and must stay valid for as
/// long as the value lives.
pub unsafe trait Buffer {
    /// Element type.
    type Item: MpiDatatype;

    /// The elements to send.
    fn as_slice(&self) -> &[Self::Item];
}

/// A buffer that can be received into.
///
/// # Safety
///
/// Same contract as [`Buffer`], for [`as_mut_slice`](BufferMut::as_mut_slice).
pub unsafe trait BufferMut: Buffer {
    /// The elements to receive into.
    fn as_mut_slice(&mut self) -> &mut [Self::Item];
}

unsafe impl<T: MpiDatatype> Buffer for Vec<T> {
    type Item = T;

    fn as_slice(&self) -> &[T] {
        self
    }
}

unsafe impl<T: MpiDatatype> BufferMut for Vec<T> {
    fn as_mut_slice(&mut self) -> &mut [T] {
        self
    }
}

unsafe impl<T: MpiDatatype> Buffer for Box<[T]> {
    type Item = T;

    fn as_slice(&self) -> &[T] {
        self
    }
}

unsafe impl<T: MpiDatatype> BufferMut for Box<[T]> {
    fn as_mut_slice(&mut self) -> &mut [T] {
        self
    }
}

unsafe impl<T: MpiDatatype> Buffer for &[T] {
    type Item = T;

    fn as_slice(&self) -> &[T] {
        self
    }
}

unsafe impl<T: MpiDatatype> Buffer for &mut [T] {
    type Item = T;

    fn as_slice(&self) -> &[T] {
        self
    }
}

unsafe impl<T: MpiDatatype> BufferMut for &mut [T] {
    fn as_mut_slice(&mut self) -> &mut [T] {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_a_vec_keeps_its_elements_in_place() {
        let mut inbox = vec![0u32; 8];
        let before = BufferMut::as_mut_slice(&mut inbox).as_mut_ptr();

        // Same shuffle a slot goes through on swap-removal
        let mut slots = vec![inbox, vec![1u32; 8]];
        let mut inbox = slots.swap_remove(0);
        assert_eq!(BufferMut::as_mut_slice(&mut inbox).as_mut_ptr(), before);
        assert_eq!(slots[0], vec![1u32; 8]);
    }

    #[test]
    fn slices_expose_the_borrowed_elements() {
        let mut data = [1.0f64, 2.0, 3.0];
        let ptr = data.as_ptr();
        let mut view: &mut [f64] = &mut data;
        assert_eq!(Buffer::as_slice(&view).as_ptr(), ptr);
        assert_eq!(view.as_mut_slice().len(), 3);

        let boxed: Box<[i64]> = vec![7; 2].into_boxed_slice();
        assert_eq!(Buffer::as_slice(&boxed), &[7i64, 7]);
    }
}
