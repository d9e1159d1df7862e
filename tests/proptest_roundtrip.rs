use proptest::collection::vec as pvec;
use proptest::prelude::*;
use tempfile::NamedTempFile;
use zlines::{Store, StoreOptions};

fn lines_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    pvec(pvec(any::<u8>(), 0..200), 0..60)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn round_trip_identity(lines in lines_strategy()) {
        let guard = NamedTempFile::new().unwrap();
        let path = guard.path().to_string_lossy().into_owned();

        let mut options = StoreOptions::default();
        options.block_capacity = 128;

        let mut store = Store::create(path.clone(), options).unwrap();
        for line in &lines {
            store.append_line(line).unwrap();
        }
        store.close().unwrap();

        let mut store = Store::open(&path).unwrap();
        prop_assert_eq!(store.line_count(), lines.len() as u64);
        let expected_max = lines.iter().map(|l| l.len() as u64).max().unwrap_or(0);
        prop_assert_eq!(store.max_line_length(), expected_max);

        for (i, expected) in lines.iter().enumerate() {
            let got = store.get_line(i as u64).unwrap();
            prop_assert_eq!(got.as_ref(), Some(expected));
        }
        prop_assert_eq!(store.get_line(lines.len() as u64).unwrap(), None);
    }

    #[test]
    fn descriptor_offsets_are_strictly_increasing(lines in lines_strategy()) {
        let guard = NamedTempFile::new().unwrap();
        let path = guard.path().to_string_lossy().into_owned();

        let mut options = StoreOptions::default();
        options.block_capacity = 64;

        let mut store = Store::create(path.clone(), options).unwrap();
        for line in &lines {
            store.append_line(line).unwrap();
        }
        store.close().unwrap();

        let store = Store::open(&path).unwrap();
        let mut previous: Option<u64> = None;
        for i in 0..store.block_count() {
            let descriptor = store.block_descriptor(i).unwrap();
            if let Some(prev) = previous {
                prop_assert!(descriptor.file_offset > prev);
            }
            previous = Some(descriptor.file_offset);
        }
    }

    #[test]
    fn get_line_partial_matches_any_offset(
        line in pvec(any::<u8>(), 0..300),
        offset_fraction in 0.0f64..1.0f64,
    ) {
        let guard = NamedTempFile::new().unwrap();
        let path = guard.path().to_string_lossy().into_owned();

        let mut store = Store::create_default(&path).unwrap();
        store.append_line(&line).unwrap();
        store.close().unwrap();

        let mut store = Store::open(&path).unwrap();
        let offset = ((line.len() as f64) * offset_fraction) as u64;
        let mut buf = [0u8; 33];
        let written = store.get_line_partial(0, offset, &mut buf).unwrap().unwrap();

        let remaining = line.len() as u64 - offset;
        let expected_written = remaining.min(buf.len() as u64 - 1) as usize;
        prop_assert_eq!(written, expected_written);
        prop_assert_eq!(&buf[..written], &line[offset as usize..offset as usize + written]);
        prop_assert_eq!(buf[written], 0);
    }
}
