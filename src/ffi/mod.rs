//! C ABI: one function per verb, columnar pointer + stride + count inputs,
//! arena-owned outputs written back through double pointers.
//!
//! Handles are opaque: a store is `*mut c_void` from [`ustore_open`], a
//! transaction from [`ustore_txn_begin`], an arena is allocated lazily the
//! first time a call receives a null `*mut *mut c_void` slot. The error
//! channel is a caller-owned `*mut *const c_char`; null means success, any
//! other value is a message whose first word is the error kind. Messages
//! are static or arena-owned, so [`ustore_error_free`] is a no-op.
//!
//! Callers uphold the usual contracts: handles come from this library and
//! are not shared across threads for arenas and transactions, and every
//! non-null column pointer is valid for `count` strided elements.

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::ptr;

use crate::arena::Arena;
use crate::db::{Store, Transaction};
use crate::error::StoreError;
use crate::model::{Collection, Key, Options, COLLECTION_MAIN};
use crate::ranges::{ContentsArg, PlacesArg, SamplesArg, ScansArg, Strided};

type ErrorPtr = *mut *const c_char;

fn static_message(kind: &str) -> *const c_char {
    let bytes: &'static [u8] = match kind {
        "ARGS_WRONG" => b"ARGS_WRONG invalid arguments\0",
        "CONFLICT" => b"CONFLICT commit lost the race on a watched key\0",
        "UNSUPPORTED" => b"UNSUPPORTED feature missing in this engine\0",
        "CORRUPTION" => b"CORRUPTION stored data failed to decode\0",
        "IO" => b"IO backend failure\0",
        _ => b"OUT_OF_MEMORY allocation failed\0",
    };
    bytes.as_ptr() as *const c_char
}

unsafe fn clear_error(error: ErrorPtr) {
    if !error.is_null() {
        *error = ptr::null();
    }
}

unsafe fn set_error(error: ErrorPtr, err: &StoreError, arena: Option<&mut Arena>) {
    if error.is_null() {
        return;
    }
    if let Some(arena) = arena {
        let message = err.to_string();
        if let Ok(offset) = arena.push_bytes(message.as_bytes()) {
            if arena.push_bytes(&[0]).is_ok() {
                *error = arena.bytes().as_ptr().add(offset) as *const c_char;
                return;
            }
        }
    }
    *error = static_message(err.kind());
}

unsafe fn arena_slot<'a>(arena: *mut *mut c_void) -> Option<&'a mut Arena> {
    if arena.is_null() {
        return None;
    }
    if (*arena).is_null() {
        *arena = Box::into_raw(Box::new(Arena::new())) as *mut c_void;
    }
    Some(&mut *((*arena) as *mut Arena))
}

unsafe fn store_from<'a>(db: *mut c_void, error: ErrorPtr) -> Option<&'a Store> {
    if db.is_null() {
        set_error(error, &StoreError::ArgsWrong("database handle is null"), None);
        return None;
    }
    Some(&*(db as *const Store))
}

unsafe fn txn_from<'a>(txn: *mut c_void) -> Option<&'a mut Transaction> {
    if txn.is_null() {
        None
    } else {
        Some(&mut *(txn as *mut Transaction))
    }
}

unsafe fn str_from<'a>(text: *const c_char, error: ErrorPtr) -> Option<&'a str> {
    if text.is_null() {
        return Some("");
    }
    match CStr::from_ptr(text).to_str() {
        Ok(text) => Some(text),
        Err(_) => {
            set_error(error, &StoreError::ArgsWrong("string argument is not UTF-8"), None);
            None
        }
    }
}

/// # Safety
/// `config` is null or a NUL-terminated string; `db` is a valid out slot.
#[no_mangle]
pub unsafe extern "C" fn ustore_open(config: *const c_char, db: *mut *mut c_void, error: ErrorPtr) {
    clear_error(error);
    let Some(config) = str_from(config, error) else {
        return;
    };
    match Store::open(config) {
        Ok(store) => *db = Box::into_raw(Box::new(store)) as *mut c_void,
        Err(err) => set_error(error, &err, None),
    }
}

/// # Safety
/// `db` is null or a handle from [`ustore_open`], not used afterwards.
#[no_mangle]
pub unsafe extern "C" fn ustore_free(db: *mut c_void) {
    if !db.is_null() {
        drop(Box::from_raw(db as *mut Store));
    }
}

/// # Safety
/// Column pointers are null or valid for `keys_count` strided elements;
/// `txn` is null or a live transaction handle owned by this thread.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn ustore_write(
    db: *mut c_void,
    txn: *mut c_void,
    collections: *const Collection,
    collections_stride: usize,
    keys: *const Key,
    keys_count: usize,
    keys_stride: usize,
    contents: *const *const u8,
    contents_stride: usize,
    offsets: *const u32,
    offsets_stride: usize,
    lengths: *const u32,
    lengths_stride: usize,
    options: u32,
    error: ErrorPtr,
) {
    clear_error(error);
    let Some(store) = store_from(db, error) else {
        return;
    };
    let places = PlacesArg::new(
        Strided::from_raw(collections, collections_stride, keys_count),
        Strided::from_raw(keys, keys_stride, keys_count),
        keys_count,
    );
    let values = ContentsArg {
        contents: Strided::from_raw(contents, contents_stride, keys_count),
        offsets: Strided::from_raw(offsets, offsets_stride, keys_count + 1),
        lengths: Strided::from_raw(lengths, lengths_stride, keys_count),
        count: keys_count,
        separator: 0,
    };
    if let Err(err) = store.write(txn_from(txn), &places, &values, Options::from_bits(options)) {
        set_error(error, &err, None);
    }
}

/// # Safety
/// As for [`ustore_write`]; `found_lengths`/`found_values` are valid out
/// slots and `arena` is a valid arena slot for this thread.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn ustore_read(
    db: *mut c_void,
    txn: *mut c_void,
    collections: *const Collection,
    collections_stride: usize,
    keys: *const Key,
    keys_count: usize,
    keys_stride: usize,
    options: u32,
    found_lengths: *mut *const u32,
    found_values: *mut *const u8,
    arena: *mut *mut c_void,
    error: ErrorPtr,
) {
    clear_error(error);
    let Some(store) = store_from(db, error) else {
        return;
    };
    let Some(arena) = arena_slot(arena) else {
        set_error(error, &StoreError::ArgsWrong("arena slot is null"), None);
        return;
    };
    let places = PlacesArg::new(
        Strided::from_raw(collections, collections_stride, keys_count),
        Strided::from_raw(keys, keys_stride, keys_count),
        keys_count,
    );
    match store.read(txn_from(txn), &places, Options::from_bits(options), arena) {
        Ok(view) => {
            *found_lengths = view.lengths.as_ptr();
            *found_values = view.bytes.as_ptr();
        }
        Err(err) => set_error(error, &err, Some(arena)),
    }
}

/// # Safety
/// As for [`ustore_read`], with `min_keys`/`limits` valid for `count`
/// strided elements.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn ustore_scan(
    db: *mut c_void,
    txn: *mut c_void,
    collections: *const Collection,
    collections_stride: usize,
    min_keys: *const Key,
    count: usize,
    min_keys_stride: usize,
    limits: *const u32,
    limits_stride: usize,
    options: u32,
    found_counts: *mut *const u32,
    found_keys: *mut *const Key,
    arena: *mut *mut c_void,
    error: ErrorPtr,
) {
    clear_error(error);
    let Some(store) = store_from(db, error) else {
        return;
    };
    let Some(arena) = arena_slot(arena) else {
        set_error(error, &StoreError::ArgsWrong("arena slot is null"), None);
        return;
    };
    let scans = ScansArg {
        collections: Strided::from_raw(collections, collections_stride, count),
        min_keys: Strided::from_raw(min_keys, min_keys_stride, count),
        limits: Strided::from_raw(limits, limits_stride, count),
        count,
    };
    match store.scan(txn_from(txn), &scans, Options::from_bits(options), arena) {
        Ok(view) => {
            *found_counts = view.counts.as_ptr();
            *found_keys = view.keys.as_ptr();
        }
        Err(err) => set_error(error, &err, Some(arena)),
    }
}

/// # Safety
/// As for [`ustore_scan`]; `seed` is null or points to one `u64`.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn ustore_sample(
    db: *mut c_void,
    collections: *const Collection,
    collections_stride: usize,
    limits: *const u32,
    limits_stride: usize,
    count: usize,
    seed: *const u64,
    options: u32,
    found_counts: *mut *const u32,
    found_keys: *mut *const Key,
    arena: *mut *mut c_void,
    error: ErrorPtr,
) {
    clear_error(error);
    let Some(store) = store_from(db, error) else {
        return;
    };
    let Some(arena) = arena_slot(arena) else {
        set_error(error, &StoreError::ArgsWrong("arena slot is null"), None);
        return;
    };
    let samples = SamplesArg {
        collections: Strided::from_raw(collections, collections_stride, count),
        limits: Strided::from_raw(limits, limits_stride, count),
        count,
    };
    let seed = if seed.is_null() { None } else { Some(*seed) };
    match store.sample(&samples, Options::from_bits(options), seed, arena) {
        Ok(view) => {
            *found_counts = view.counts.as_ptr();
            *found_keys = view.keys.as_ptr();
        }
        Err(err) => set_error(error, &err, Some(arena)),
    }
}

/// # Safety
/// `collections` is valid for `count` strided elements; out slots and the
/// arena slot are valid.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn ustore_measure(
    db: *mut c_void,
    collections: *const Collection,
    collections_stride: usize,
    count: usize,
    found_bytes: *mut *const u64,
    found_keys: *mut *const u64,
    arena: *mut *mut c_void,
    error: ErrorPtr,
) {
    clear_error(error);
    let Some(store) = store_from(db, error) else {
        return;
    };
    let Some(arena) = arena_slot(arena) else {
        set_error(error, &StoreError::ArgsWrong("arena slot is null"), None);
        return;
    };
    let handles = Strided::from_raw(collections, collections_stride, count);
    let handles: Vec<Collection> = (0..count).map(|i| handles.get_or(i, COLLECTION_MAIN)).collect();
    arena.reset();
    let stats = match store.measure(&handles) {
        Ok(stats) => stats,
        Err(err) => {
            set_error(error, &err, Some(arena));
            return;
        }
    };
    let pack = (|| -> crate::error::Result<(usize, usize)> {
        let bytes_off = arena.reserve_aligned(8 * count, 8)?;
        let keys_off = arena.reserve_aligned(8 * count, 8)?;
        Ok((bytes_off, keys_off))
    })();
    match pack {
        Ok((bytes_off, keys_off)) => {
            for (i, stat) in stats.iter().enumerate() {
                arena.put_u64(bytes_off + 8 * i, stat.bytes);
                arena.put_u64(keys_off + 8 * i, stat.keys);
            }
            *found_bytes = arena.bytes().as_ptr().add(bytes_off) as *const u64;
            *found_keys = arena.bytes().as_ptr().add(keys_off) as *const u64;
        }
        Err(err) => set_error(error, &err, Some(arena)),
    }
}

/// # Safety
/// `name` is null or NUL-terminated; `collection` is a valid out slot.
#[no_mangle]
pub unsafe extern "C" fn ustore_collection_open(
    db: *mut c_void,
    name: *const c_char,
    collection: *mut Collection,
    error: ErrorPtr,
) {
    clear_error(error);
    let Some(store) = store_from(db, error) else {
        return;
    };
    let Some(name) = str_from(name, error) else {
        return;
    };
    match store.collection_open(name) {
        Ok(handle) => *collection = handle,
        Err(err) => set_error(error, &err, None),
    }
}

/// # Safety
/// `name` is null or NUL-terminated.
#[no_mangle]
pub unsafe extern "C" fn ustore_collection_remove(db: *mut c_void, name: *const c_char, error: ErrorPtr) {
    clear_error(error);
    let Some(store) = store_from(db, error) else {
        return;
    };
    let Some(name) = str_from(name, error) else {
        return;
    };
    if let Err(err) = store.collection_remove(name) {
        set_error(error, &err, None);
    }
}

/// # Safety
/// Out slots and the arena slot are valid. Names are returned as one
/// NUL-separated tape aligned with the handle array.
#[no_mangle]
pub unsafe extern "C" fn ustore_collection_list(
    db: *mut c_void,
    count: *mut u64,
    collections: *mut *const Collection,
    names: *mut *const c_char,
    arena: *mut *mut c_void,
    error: ErrorPtr,
) {
    clear_error(error);
    let Some(store) = store_from(db, error) else {
        return;
    };
    let Some(arena) = arena_slot(arena) else {
        set_error(error, &StoreError::ArgsWrong("arena slot is null"), None);
        return;
    };
    arena.reset();
    let list = store.collection_list();
    let pack = (|| -> crate::error::Result<(usize, usize)> {
        let handles_off = arena.reserve_aligned(8 * list.len(), 8)?;
        for (i, (_, handle)) in list.iter().enumerate() {
            arena.put_u64(handles_off + 8 * i, *handle);
        }
        let names_off = arena.len();
        for (name, _) in &list {
            arena.push_bytes(name.as_bytes())?;
            arena.push_bytes(&[0])?;
        }
        Ok((handles_off, names_off))
    })();
    match pack {
        Ok((handles_off, names_off)) => {
            *count = list.len() as u64;
            *collections = arena.bytes().as_ptr().add(handles_off) as *const Collection;
            *names = arena.bytes().as_ptr().add(names_off) as *const c_char;
        }
        Err(err) => set_error(error, &err, Some(arena)),
    }
}

/// # Safety
/// `txn` is a valid out slot.
#[no_mangle]
pub unsafe extern "C" fn ustore_txn_begin(
    db: *mut c_void,
    options: u32,
    txn: *mut *mut c_void,
    error: ErrorPtr,
) {
    clear_error(error);
    let Some(store) = store_from(db, error) else {
        return;
    };
    match store.txn_begin(Options::from_bits(options)) {
        Ok(handle) => *txn = Box::into_raw(Box::new(handle)) as *mut c_void,
        Err(err) => set_error(error, &err, None),
    }
}

/// # Safety
/// `txn` is a live transaction handle owned by this thread; `sequence` is
/// null or a valid out slot.
#[no_mangle]
pub unsafe extern "C" fn ustore_txn_commit(
    txn: *mut c_void,
    options: u32,
    sequence: *mut u64,
    error: ErrorPtr,
) {
    clear_error(error);
    let Some(txn) = txn_from(txn) else {
        set_error(error, &StoreError::ArgsWrong("transaction handle is null"), None);
        return;
    };
    match txn.commit(Options::from_bits(options)) {
        Ok(seq) => {
            if !sequence.is_null() {
                *sequence = seq;
            }
        }
        Err(err) => set_error(error, &err, None),
    }
}

/// # Safety
/// `txn` is null or a handle from [`ustore_txn_begin`], not used
/// afterwards. Equivalent to abort for an uncommitted transaction.
#[no_mangle]
pub unsafe extern "C" fn ustore_txn_free(txn: *mut c_void) {
    if !txn.is_null() {
        drop(Box::from_raw(txn as *mut Transaction));
    }
}

/// # Safety
/// `arena` is null or a handle allocated by a data-plane call, not used
/// afterwards.
#[no_mangle]
pub unsafe extern "C" fn ustore_arena_free(arena: *mut c_void) {
    if !arena.is_null() {
        drop(Box::from_raw(arena as *mut Arena));
    }
}

/// Errors are static or arena-owned; nothing to release.
#[no_mangle]
pub extern "C" fn ustore_error_free(_error: *const c_char) {}

/// # Safety
/// `query` is null or NUL-terminated; `response` and the arena slot are
/// valid.
#[no_mangle]
pub unsafe extern "C" fn ustore_database_control(
    db: *mut c_void,
    query: *const c_char,
    response: *mut *const c_char,
    arena: *mut *mut c_void,
    error: ErrorPtr,
) {
    clear_error(error);
    let Some(store) = store_from(db, error) else {
        return;
    };
    let Some(query) = str_from(query, error) else {
        return;
    };
    let Some(arena) = arena_slot(arena) else {
        set_error(error, &StoreError::ArgsWrong("arena slot is null"), None);
        return;
    };
    arena.reset();
    match store.database_control(query) {
        Ok(text) => {
            let pack = arena
                .push_bytes(text.as_bytes())
                .and_then(|offset| arena.push_bytes(&[0]).map(|_| offset));
            match pack {
                Ok(offset) => *response = arena.bytes().as_ptr().add(offset) as *const c_char,
                Err(err) => set_error(error, &err, Some(arena)),
            }
        }
        Err(err) => set_error(error, &err, Some(arena)),
    }
}
