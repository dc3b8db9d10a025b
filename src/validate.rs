//! Argument-shape and option-mask checks, one function per operation
//! family. Validators never consult backend state and run before any side
//! effect.

use crate::error::{Result, StoreError};
use crate::model::Options;
use crate::ranges::{ContentsArg, PlacesArg, SamplesArg, ScansArg};

fn check_mask(options: Options, allowed: Options) -> Result<()> {
    if options.is_subset_of(allowed) {
        Ok(())
    } else {
        Err(StoreError::ArgsWrong("unknown option bit for this operation"))
    }
}

pub fn validate_write(places: &PlacesArg, contents: &ContentsArg, options: Options) -> Result<()> {
    check_mask(
        options,
        Options::TXN_DONT_WATCH | Options::DONT_DISCARD_MEMORY | Options::WRITE_FLUSH,
    )?;
    if places.keys.is_absent() {
        return Err(StoreError::ArgsWrong("no keys were provided"));
    }
    let remove_all = contents.contents.is_absent();
    if remove_all && (!contents.lengths.is_absent() || !contents.offsets.is_absent()) {
        return Err(StoreError::ArgsWrong("can't address nulls"));
    }
    Ok(())
}

pub fn validate_read(places: &PlacesArg, options: Options) -> Result<()> {
    check_mask(
        options,
        Options::TXN_DONT_WATCH | Options::DONT_DISCARD_MEMORY | Options::READ_SHARED_MEMORY,
    )?;
    if places.keys.is_absent() {
        return Err(StoreError::ArgsWrong("no keys were provided"));
    }
    Ok(())
}

pub fn validate_scan(scans: &ScansArg, options: Options) -> Result<()> {
    check_mask(
        options,
        Options::TXN_DONT_WATCH
            | Options::DONT_DISCARD_MEMORY
            | Options::READ_SHARED_MEMORY
            | Options::SCAN_BULK,
    )?;
    if scans.limits.is_absent() {
        return Err(StoreError::ArgsWrong("full scans aren't supported, paginate"));
    }
    for i in 0..scans.len() {
        if scans.get(i).limit == 0 {
            return Err(StoreError::ArgsWrong("scan limit of zero"));
        }
    }
    Ok(())
}

pub fn validate_sample(samples: &SamplesArg, options: Options) -> Result<()> {
    check_mask(options, Options::DONT_DISCARD_MEMORY)?;
    if samples.limits.is_absent() {
        return Err(StoreError::ArgsWrong("sample limits were not provided"));
    }
    Ok(())
}

pub fn validate_txn_begin(options: Options) -> Result<()> {
    check_mask(options, Options::TXN_DONT_WATCH)
}

pub fn validate_txn_commit(options: Options) -> Result<()> {
    check_mask(options, Options::WRITE_FLUSH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Collection, COLLECTION_MAIN};
    use crate::ranges::Strided;

    fn places<'a>(collection: &'a Collection, keys: &'a [i64]) -> PlacesArg<'a> {
        PlacesArg::from_keys(collection, keys)
    }

    #[test]
    fn write_rejects_foreign_bits() {
        let keys = [1i64];
        let arg = places(&COLLECTION_MAIN, &keys);
        let contents = ContentsArg::deletions(1);
        assert!(validate_write(&arg, &contents, Options::WRITE_FLUSH).is_ok());
        let err = validate_write(&arg, &contents, Options::READ_SHARED_MEMORY).unwrap_err();
        assert_eq!(err.kind(), "ARGS_WRONG");
    }

    #[test]
    fn write_rejects_addressed_nulls() {
        let keys = [1i64];
        let arg = places(&COLLECTION_MAIN, &keys);
        let lens = [4u32];
        let contents = ContentsArg {
            contents: Strided::absent(1),
            offsets: Strided::absent(1),
            lengths: Strided::from_slice(&lens),
            count: 1,
            separator: 0,
        };
        let err = validate_write(&arg, &contents, Options::NONE).unwrap_err();
        assert_eq!(err.kind(), "ARGS_WRONG");
    }

    #[test]
    fn read_requires_keys() {
        let arg = PlacesArg::new(Strided::absent(2), Strided::absent(2), 2);
        assert!(validate_read(&arg, Options::NONE).is_err());
    }

    #[test]
    fn scan_requires_bounded_limits() {
        let unbounded = ScansArg {
            collections: Strided::absent(1),
            min_keys: Strided::absent(1),
            limits: Strided::absent(1),
            count: 1,
        };
        assert!(validate_scan(&unbounded, Options::NONE).is_err());

        let zeros = [0u32];
        let zero = ScansArg {
            collections: Strided::absent(1),
            min_keys: Strided::absent(1),
            limits: Strided::from_slice(&zeros),
            count: 1,
        };
        assert!(validate_scan(&zero, Options::NONE).is_err());

        let limits = [5u32];
        let good = ScansArg {
            collections: Strided::absent(1),
            min_keys: Strided::absent(1),
            limits: Strided::from_slice(&limits),
            count: 1,
        };
        assert!(validate_scan(&good, Options::SCAN_BULK).is_ok());
    }

    #[test]
    fn txn_masks() {
        assert!(validate_txn_begin(Options::TXN_DONT_WATCH).is_ok());
        assert!(validate_txn_begin(Options::WRITE_FLUSH).is_err());
        assert!(validate_txn_commit(Options::WRITE_FLUSH).is_ok());
        assert!(validate_txn_commit(Options::TXN_DONT_WATCH).is_err());
    }
}
