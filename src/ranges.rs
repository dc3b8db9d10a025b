//! Strided structure-of-arrays views over caller memory.
//!
//! Every data-plane verb takes its variable-length inputs as columns: a base
//! pointer, a stride in bytes, and a count. A null base means the column is
//! absent and a per-field default applies; a stride of zero broadcasts
//! element zero across the whole column. Views borrow the caller's buffers
//! and are cheap to copy.

use std::marker::PhantomData;
use std::mem;
use std::slice;

use crate::model::{Collection, Edge, Key, COLLECTION_MAIN, DEFAULT_EDGE_ID, KEY_UNKNOWN};

pub struct Strided<'a, T> {
    base: *const T,
    stride: usize,
    count: usize,
    _lt: PhantomData<&'a T>,
}

impl<'a, T> Clone for Strided<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> Copy for Strided<'a, T> {}

unsafe impl<'a, T: Sync> Send for Strided<'a, T> {}
unsafe impl<'a, T: Sync> Sync for Strided<'a, T> {}

impl<'a, T> Strided<'a, T> {
    pub fn from_slice(items: &'a [T]) -> Self {
        Self {
            base: items.as_ptr(),
            stride: mem::size_of::<T>(),
            count: items.len(),
            _lt: PhantomData,
        }
    }

    /// One element repeated `count` times (stride zero).
    pub fn broadcast(item: &'a T, count: usize) -> Self {
        Self { base: item, stride: 0, count, _lt: PhantomData }
    }

    /// Absent column: every lookup yields the caller's default.
    pub fn absent(count: usize) -> Self {
        Self { base: std::ptr::null(), stride: 0, count, _lt: PhantomData }
    }

    /// # Safety
    ///
    /// `base`, when non-null, must point to memory holding a valid `T` at
    /// every byte offset `stride * i` for `i < count`, aligned for `T`, and
    /// outliving `'a`. A zero stride with a non-null base requires only
    /// element zero.
    pub unsafe fn from_raw(base: *const T, stride: usize, count: usize) -> Self {
        Self { base, stride, count, _lt: PhantomData }
    }

    pub fn is_absent(&self) -> bool {
        self.base.is_null()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, i: usize) -> Option<&'a T> {
        if self.base.is_null() || i >= self.count {
            return None;
        }
        let ptr = unsafe { (self.base as *const u8).add(self.stride * i) } as *const T;
        Some(unsafe { &*ptr })
    }
}

impl<'a, T: Copy> Strided<'a, T> {
    pub fn get_or(&self, i: usize, default: T) -> T {
        self.get(i).copied().unwrap_or(default)
    }
}

impl<'a, T: PartialEq> Strided<'a, T> {
    /// True when every defined element equals element zero. Absent and
    /// broadcast columns are trivially uniform.
    pub fn same_elements(&self) -> bool {
        if self.base.is_null() || self.stride == 0 || self.count < 2 {
            return true;
        }
        let first = match self.get(0) {
            Some(v) => v,
            None => return true,
        };
        (1..self.count).all(|i| self.get(i) == Some(first))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Place {
    pub collection: Collection,
    pub key: Key,
}

/// `(collection, key)` columns of a read or write call.
#[derive(Clone, Copy)]
pub struct PlacesArg<'a> {
    pub collections: Strided<'a, Collection>,
    pub keys: Strided<'a, Key>,
    pub count: usize,
}

impl<'a> PlacesArg<'a> {
    pub fn new(collections: Strided<'a, Collection>, keys: Strided<'a, Key>, count: usize) -> Self {
        Self { collections, keys, count }
    }

    /// Single-collection batch over a plain key slice.
    pub fn from_keys(collection: &'a Collection, keys: &'a [Key]) -> Self {
        Self {
            collections: Strided::broadcast(collection, keys.len()),
            keys: Strided::from_slice(keys),
            count: keys.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, i: usize) -> Place {
        Place {
            collection: self.collections.get_or(i, COLLECTION_MAIN),
            key: self.keys.get_or(i, KEY_UNKNOWN),
        }
    }

    pub fn same_collection(&self) -> bool {
        self.collections.same_elements()
    }
}

/// Value columns of a write call. Three supply forms are recognized:
/// per-element pointers + lengths, one contiguous pointer + Arrow offsets,
/// or separator-terminated runs. A null pointer at index `i` is a deletion.
#[derive(Clone, Copy)]
pub struct ContentsArg<'a> {
    pub contents: Strided<'a, *const u8>,
    pub offsets: Strided<'a, u32>,
    pub lengths: Strided<'a, u32>,
    pub count: usize,
    pub separator: u8,
}

impl<'a> ContentsArg<'a> {
    /// Per-element pointers and lengths.
    pub fn from_parts(contents: &'a [*const u8], lengths: &'a [u32]) -> Self {
        Self {
            contents: Strided::from_slice(contents),
            offsets: Strided::absent(contents.len()),
            lengths: Strided::from_slice(lengths),
            count: contents.len(),
            separator: 0,
        }
    }

    /// All-null contents: a batch of deletions.
    pub fn deletions(count: usize) -> Self {
        Self {
            contents: Strided::absent(count),
            offsets: Strided::absent(count),
            lengths: Strided::absent(count),
            count,
            separator: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn get(&self, i: usize) -> Option<&'a [u8]> {
        let ptr = *self.contents.get(i)?;
        if ptr.is_null() {
            return None;
        }
        let off = self.offsets.get_or(i, 0) as usize;
        let len = if let Some(len) = self.lengths.get(i) {
            *len as usize
        } else if !self.offsets.is_absent() {
            let end = self.offsets.get_or(i + 1, off as u32) as usize;
            end.saturating_sub(off)
        } else {
            let mut len = 0usize;
            unsafe {
                while *ptr.add(off + len) != self.separator {
                    len += 1;
                }
            }
            len
        };
        Some(unsafe { slice::from_raw_parts(ptr.add(off), len) })
    }

    /// Arrow layout: one buffer repeated, offsets present, lengths absent.
    pub fn is_arrow(&self) -> bool {
        !self.contents.is_absent()
            && self.contents.same_elements()
            && !self.offsets.is_absent()
            && self.lengths.is_absent()
    }

    /// True when each value ends exactly where the next begins, so the
    /// payload can be handed to the backend as one slab.
    pub fn is_continuous(&self) -> bool {
        let mut last: Option<&[u8]> = None;
        for i in 0..self.count {
            let value = match self.get(i) {
                Some(v) => v,
                None => return false,
            };
            if let Some(prev) = last {
                if prev.as_ptr() as usize + prev.len() != value.as_ptr() as usize {
                    return false;
                }
            }
            last = Some(value);
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSpec {
    pub collection: Collection,
    pub min_key: Key,
    pub limit: u32,
}

/// `(collection, min_key, limit)` columns of a scan call.
#[derive(Clone, Copy)]
pub struct ScansArg<'a> {
    pub collections: Strided<'a, Collection>,
    pub min_keys: Strided<'a, Key>,
    pub limits: Strided<'a, u32>,
    pub count: usize,
}

impl<'a> ScansArg<'a> {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn get(&self, i: usize) -> ScanSpec {
        ScanSpec {
            collection: self.collections.get_or(i, COLLECTION_MAIN),
            min_key: self.min_keys.get_or(i, Key::MIN),
            limit: self.limits.get_or(i, 0),
        }
    }

    pub fn same_collection(&self) -> bool {
        self.collections.same_elements()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    pub collection: Collection,
    pub limit: u32,
}

/// `(collection, limit)` columns of a sample call.
#[derive(Clone, Copy)]
pub struct SamplesArg<'a> {
    pub collections: Strided<'a, Collection>,
    pub limits: Strided<'a, u32>,
    pub count: usize,
}

impl<'a> SamplesArg<'a> {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn get(&self, i: usize) -> SampleSpec {
        SampleSpec {
            collection: self.collections.get_or(i, COLLECTION_MAIN),
            limit: self.limits.get_or(i, 0),
        }
    }
}

/// Edge triples as three key columns; ids broadcast or default when absent.
#[derive(Clone, Copy)]
pub struct EdgesArg<'a> {
    pub sources: Strided<'a, Key>,
    pub targets: Strided<'a, Key>,
    pub ids: Strided<'a, Key>,
    pub count: usize,
}

impl<'a> EdgesArg<'a> {
    /// Columns projected out of an array-of-structs edge slice.
    pub fn from_edges(edges: &'a [Edge]) -> Self {
        if edges.is_empty() {
            return Self {
                sources: Strided::absent(0),
                targets: Strided::absent(0),
                ids: Strided::absent(0),
                count: 0,
            };
        }
        let stride = mem::size_of::<Edge>();
        let count = edges.len();
        unsafe {
            Self {
                sources: Strided::from_raw(&edges[0].source, stride, count),
                targets: Strided::from_raw(&edges[0].target, stride, count),
                ids: Strided::from_raw(&edges[0].id, stride, count),
                count,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, i: usize) -> Edge {
        Edge {
            source: self.sources.get_or(i, KEY_UNKNOWN),
            target: self.targets.get_or(i, KEY_UNKNOWN),
            id: self.ids.get_or(i, DEFAULT_EDGE_ID),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_and_broadcast_lookups() {
        let keys = [10i64, 20, 30];
        let view = Strided::from_slice(&keys);
        assert_eq!(view.len(), 3);
        assert_eq!(view.get(1), Some(&20));
        assert_eq!(view.get(3), None);

        let one = 7i64;
        let repeated = Strided::broadcast(&one, 5);
        assert_eq!(repeated.get(4), Some(&7));
        assert!(repeated.same_elements());

        let gone: Strided<i64> = Strided::absent(4);
        assert_eq!(gone.get(0), None);
        assert_eq!(gone.get_or(2, -1), -1);
        assert!(gone.same_elements());
    }

    #[test]
    fn same_elements_detects_mixed_columns() {
        let uniform = [3u64, 3, 3];
        assert!(Strided::from_slice(&uniform).same_elements());
        let mixed = [3u64, 4, 3];
        assert!(!Strided::from_slice(&mixed).same_elements());
    }

    #[test]
    fn edges_project_struct_fields() {
        let edges = [Edge::new(1, 2, 100), Edge::new(2, 3, 101)];
        let arg = EdgesArg::from_edges(&edges);
        assert_eq!(arg.get(0), edges[0]);
        assert_eq!(arg.get(1), edges[1]);
        assert_eq!(arg.sources.get(1), Some(&2));
        assert_eq!(arg.targets.get(0), Some(&2));
    }

    #[test]
    fn contents_length_form() {
        let a: &[u8] = b"hi";
        let b: &[u8] = b"";
        let ptrs = [a.as_ptr(), b.as_ptr()];
        let lens = [2u32, 0];
        let arg = ContentsArg::from_parts(&ptrs, &lens);
        assert_eq!(arg.get(0), Some(&b"hi"[..]));
        assert_eq!(arg.get(1), Some(&b""[..]));
        assert!(!arg.is_arrow());
    }

    #[test]
    fn contents_arrow_form() {
        let tape: &[u8] = b"heyjude";
        let base = tape.as_ptr();
        let offsets = [0u32, 3, 7];
        let arg = ContentsArg {
            contents: Strided::broadcast(&base, 2),
            offsets: Strided::from_slice(&offsets),
            lengths: Strided::absent(2),
            count: 2,
            separator: 0,
        };
        assert!(arg.is_arrow());
        assert_eq!(arg.get(0), Some(&b"hey"[..]));
        assert_eq!(arg.get(1), Some(&b"jude"[..]));
        assert!(arg.is_continuous());
    }

    #[test]
    fn contents_separator_form() {
        let tape: &[u8] = b"one\0two\0";
        let ptrs = [tape.as_ptr(), tape[4..].as_ptr()];
        let arg = ContentsArg {
            contents: Strided::from_slice(&ptrs),
            offsets: Strided::absent(2),
            lengths: Strided::absent(2),
            count: 2,
            separator: 0,
        };
        assert_eq!(arg.get(0), Some(&b"one"[..]));
        assert_eq!(arg.get(1), Some(&b"two"[..]));
    }

    #[test]
    fn null_content_is_deletion() {
        let arg = ContentsArg::deletions(3);
        assert_eq!(arg.get(0), None);
        assert_eq!(arg.get(2), None);
    }

    #[test]
    fn scan_defaults_are_unbounded_below() {
        let limits = [10u32];
        let arg = ScansArg {
            collections: Strided::absent(1),
            min_keys: Strided::absent(1),
            limits: Strided::from_slice(&limits),
            count: 1,
        };
        let spec = arg.get(0);
        assert_eq!(spec.collection, COLLECTION_MAIN);
        assert_eq!(spec.min_key, Key::MIN);
        assert_eq!(spec.limit, 10);
    }
}
