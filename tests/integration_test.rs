use tempfile::NamedTempFile;
use zlines::{Store, StoreOptions, ZlineError};

fn temp_path() -> (NamedTempFile, String) {
    let f = NamedTempFile::new().unwrap();
    let path = f.path().to_string_lossy().into_owned();
    (f, path)
}

#[test]
fn seed_scenario_1_single_short_line() {
    let (_guard, path) = temp_path();

    let mut store = Store::create_default(&path).unwrap();
    store.append_line(b"foo").unwrap();
    store.close().unwrap();

    let mut store = Store::open(&path).unwrap();
    assert_eq!(store.line_count(), 1);
    assert_eq!(store.line_length(0).unwrap(), Some(3));
    assert_eq!(store.get_line(0).unwrap(), Some(b"foo".to_vec()));
    assert_eq!(store.get_line(1).unwrap(), None);
    assert_eq!(store.max_line_length(), 3);
}

#[test]
fn seed_scenario_2_mixed_lengths_including_empty() {
    let (_guard, path) = temp_path();

    let mut store = Store::create_default(&path).unwrap();
    for line in ["", "a", "bc", "def"] {
        store.append_line(line.as_bytes()).unwrap();
    }
    store.close().unwrap();

    let mut store = Store::open(&path).unwrap();
    assert_eq!(store.line_count(), 4);
    assert_eq!(store.max_line_length(), 3);
    for (i, expected) in ["", "a", "bc", "def"].iter().enumerate() {
        let i = i as u64;
        assert_eq!(store.line_length(i).unwrap(), Some(expected.len() as u64));
        assert_eq!(store.get_line(i).unwrap(), Some(expected.as_bytes().to_vec()));
    }
}

#[test]
fn seed_scenario_3_two_exactly_full_blocks() {
    let (_guard, path) = temp_path();
    let mut options = StoreOptions::default();
    options.block_capacity = 16;

    let mut store = Store::create(path.clone(), options).unwrap();
    store.append_line(b"0123456789abcdef").unwrap();
    store.append_line(b"0123456789abcdef").unwrap();
    store.close().unwrap();

    let mut store = Store::open(&path).unwrap();
    assert_eq!(store.block_count(), 2);
    assert_eq!(store.get_line(0).unwrap(), Some(b"0123456789abcdef".to_vec()));
    assert_eq!(store.get_line(1).unwrap(), Some(b"0123456789abcdef".to_vec()));
}

#[test]
fn seed_scenario_4_over_size_line_then_small_line() {
    let (_guard, path) = temp_path();
    let mut options = StoreOptions::default();
    options.block_capacity = 16;

    let long_line: Vec<u8> = (0u8..100).map(|b| b'a' + (b % 26)).collect();
    let short_line = b"short".to_vec();

    let mut store = Store::create(path.clone(), options).unwrap();
    store.append_line(&long_line).unwrap();
    store.append_line(&short_line).unwrap();
    store.close().unwrap();

    let mut store = Store::open(&path).unwrap();
    assert_eq!(store.get_line(0).unwrap(), Some(long_line.clone()));
    assert_eq!(store.get_line(1).unwrap(), Some(short_line));

    let mut buf = [0u8; 11];
    let written = store.get_line_partial(0, 90, &mut buf).unwrap().unwrap();
    assert_eq!(written, 10);
    assert_eq!(&buf[..written], &long_line[90..100]);
    assert_eq!(buf[written], 0);
}

#[test]
fn seed_scenario_5_many_lines_random_sample() {
    let (_guard, path) = temp_path();
    let mut options = StoreOptions::default();
    options.block_capacity = 64 * 1024;

    let mut rng_state: u64 = 0x2545F4914F6CDD1D;
    let mut next = || {
        rng_state ^= rng_state << 13;
        rng_state ^= rng_state >> 7;
        rng_state ^= rng_state << 17;
        rng_state
    };

    let lines: Vec<Vec<u8>> = (0..2_000)
        .map(|_| (0..50).map(|_| (next() % 256) as u8).collect())
        .collect();

    let mut store = Store::create(path.clone(), options).unwrap();
    for line in &lines {
        store.append_line(line).unwrap();
    }
    store.close().unwrap();

    let mut store = Store::open(&path).unwrap();
    assert_eq!(store.line_count(), lines.len() as u64);
    for _ in 0..200 {
        let i = (next() % lines.len() as u64) as usize;
        assert_eq!(store.get_line(i as u64).unwrap().as_ref(), Some(&lines[i]));
    }
}

#[test]
fn seed_scenario_6_unknown_algorithm_is_format_error() {
    let (_guard, path) = temp_path();

    let mut store = Store::create_default(&path).unwrap();
    store.append_line(b"x").unwrap();
    store.close().unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    let text = String::from_utf8(bytes[..256].to_vec()).unwrap();
    let patched = text.replace("alg fzstd", "alg bzip2");
    bytes[..256].copy_from_slice(patched.as_bytes());
    std::fs::write(&path, &bytes).unwrap();

    match Store::open(&path) {
        Err(ZlineError::Format { .. }) => {}
        other => panic!("expected ZlineError::Format, got {other:?}"),
    }
}

#[test]
fn empty_store_has_no_blocks() {
    let (_guard, path) = temp_path();

    let mut store = Store::create_default(&path).unwrap();
    store.close().unwrap();

    let store = Store::open(&path).unwrap();
    assert_eq!(store.line_count(), 0);
    assert_eq!(store.block_count(), 0);
}

#[test]
fn block_size_1kib_and_16mib_both_work() {
    for capacity in [1024usize, 16 * 1024 * 1024] {
        let (_guard, path) = temp_path();
        let mut options = StoreOptions::default();
        options.block_capacity = capacity;

        let mut store = Store::create(path.clone(), options).unwrap();
        store.append_line(b"hello").unwrap();
        store.append_line(b"world").unwrap();
        store.close().unwrap();

        let mut store = Store::open(&path).unwrap();
        assert_eq!(store.get_line(0).unwrap(), Some(b"hello".to_vec()));
        assert_eq!(store.get_line(1).unwrap(), Some(b"world".to_vec()));
    }
}

#[test]
fn reopen_without_mutation_is_idempotent() {
    let (_guard, path) = temp_path();

    let mut store = Store::create_default(&path).unwrap();
    for i in 0..25u32 {
        store.append_line(format!("line-{i}").as_bytes()).unwrap();
    }
    store.close().unwrap();

    let before = std::fs::read(&path).unwrap();

    {
        let mut store = Store::open(&path).unwrap();
        for i in 0..25u64 {
            store.get_line(i).unwrap();
        }
    }

    let after = std::fs::read(&path).unwrap();
    assert_eq!(before, after);
}
