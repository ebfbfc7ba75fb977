use crate::SSTableWriter;
use crate::*;
use anyhow::Result;
use memtable::Memtable;
use tempfile::tempdir;

/// Helper: write a memtable to a sorted run and open a reader. `creation_ts`
/// doubles as the run's creation order for tie-breaking in these tests.
fn write_and_open(
    dir: &std::path::Path,
    name: &str,
    entries: &[(&[u8], Option<&[u8]>, u64)],
    creation_ts: u64,
) -> Result<SSTableReader> {
    let path = dir.join(name);
    let mem = Memtable::new();
    for &(key, val, timestamp) in entries {
        match val {
            Some(v) => mem.put(key.to_vec(), v.to_vec(), timestamp),
            None => mem.delete(key.to_vec(), timestamp),
        }
    }
    SSTableWriter::write_from_memtable(&path, &mem, creation_ts, crate::writer::DEFAULT_BITS_PER_KEY)?;
    SSTableReader::open(&path)
}

// -------------------- Basic merge --------------------

#[test]
fn merge_single_run() -> Result<()> {
    let dir = tempdir()?;
    let r = write_and_open(
        dir.path(),
        "a.db",
        &[
            (b"a", Some(b"1"), 1),
            (b"b", Some(b"2"), 2),
            (b"c", Some(b"3"), 3),
        ],
        1,
    )?;

    let readers = vec![r];
    let mut iter = MergeIterator::new(&readers)?;
    let result = iter.collect_all()?;

    assert_eq!(result.len(), 3);
    assert_eq!(result[0].0, b"a");
    assert_eq!(result[1].0, b"b");
    assert_eq!(result[2].0, b"c");
    Ok(())
}

#[test]
fn merge_two_non_overlapping() -> Result<()> {
    let dir = tempdir()?;
    let r1 = write_and_open(
        dir.path(),
        "a.db",
        &[(b"a", Some(b"1"), 1), (b"b", Some(b"2"), 2)],
        1,
    )?;
    let r2 = write_and_open(
        dir.path(),
        "b.db",
        &[(b"c", Some(b"3"), 3), (b"d", Some(b"4"), 4)],
        2,
    )?;

    let readers = vec![r1, r2];
    let mut iter = MergeIterator::new(&readers)?;
    let result = iter.collect_all()?;

    assert_eq!(result.len(), 4);
    assert_eq!(result[0].0, b"a");
    assert_eq!(result[1].0, b"b");
    assert_eq!(result[2].0, b"c");
    assert_eq!(result[3].0, b"d");
    Ok(())
}

// -------------------- Many keys --------------------

#[test]
fn merge_many_keys_across_runs() -> Result<()> {
    let dir = tempdir()?;

    let entries1: Vec<(Vec<u8>, Option<Vec<u8>>, u64)> = (0..100u64)
        .map(|i| (format!("key{:04}", i).into_bytes(), Some(b"v1".to_vec()), i))
        .collect();
    let slice1: Vec<(&[u8], Option<&[u8]>, u64)> = entries1
        .iter()
        .map(|(k, v, s)| (k.as_slice(), v.as_deref(), *s))
        .collect();
    let r1 = write_and_open(dir.path(), "1.db", &slice1, 1)?;

    let entries2: Vec<(Vec<u8>, Option<Vec<u8>>, u64)> = (50..150u64)
        .map(|i| (format!("key{:04}", i).into_bytes(), Some(b"v2".to_vec()), i + 100))
        .collect();
    let slice2: Vec<(&[u8], Option<&[u8]>, u64)> = entries2
        .iter()
        .map(|(k, v, s)| (k.as_slice(), v.as_deref(), *s))
        .collect();
    let r2 = write_and_open(dir.path(), "2.db", &slice2, 2)?;

    let readers = vec![r1, r2];
    let mut iter = MergeIterator::new(&readers)?;
    let result = iter.collect_all()?;

    // keys 0..150 = 150 unique keys
    assert_eq!(result.len(), 150);

    for (key, entry) in &result {
        let key_str = String::from_utf8_lossy(key);
        if let Ok(num) = key_str.trim_start_matches("key").parse::<u64>() {
            if (50..100).contains(&num) {
                assert_eq!(
                    entry.timestamp,
                    num + 100,
                    "key {} should have the timestamp from r2",
                    num
                );
                assert_eq!(entry.value, Some(b"v2".to_vec()));
            }
        }
    }

    let keys: Vec<&[u8]> = result.iter().map(|(k, _)| k.as_slice()).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);

    Ok(())
}

// -------------------- Three-way merge --------------------

#[test]
fn merge_three_runs_with_overlap() -> Result<()> {
    let dir = tempdir()?;
    let r1 = write_and_open(
        dir.path(),
        "1.db",
        &[(b"a", Some(b"v1"), 1), (b"c", Some(b"v1"), 1)],
        1,
    )?;
    let r2 = write_and_open(
        dir.path(),
        "2.db",
        &[(b"b", Some(b"v2"), 2), (b"c", Some(b"v2"), 2)],
        2,
    )?;
    let r3 = write_and_open(
        dir.path(),
        "3.db",
        &[(b"c", Some(b"v3"), 3), (b"d", Some(b"v3"), 3)],
        3,
    )?;

    let readers = vec![r1, r2, r3];
    let mut iter = MergeIterator::new(&readers)?;
    let result = iter.collect_all()?;

    // a, b, c (deduped), d
    assert_eq!(result.len(), 4);
    assert_eq!(result[0].0, b"a");
    assert_eq!(result[1].0, b"b");
    assert_eq!(result[2].0, b"c");
    assert_eq!(result[2].1.timestamp, 3); // highest timestamp wins
    assert_eq!(result[2].1.value, Some(b"v3".to_vec()));
    assert_eq!(result[3].0, b"d");

    Ok(())
}

// -------------------- Empty inputs --------------------

#[test]
fn merge_no_readers() -> Result<()> {
    let readers: Vec<SSTableReader> = vec![];
    let mut iter = MergeIterator::new(&readers)?;
    let result = iter.collect_all()?;
    assert!(result.is_empty());
    Ok(())
}

// -------------------- Sorted output --------------------

#[test]
fn merge_output_is_sorted() -> Result<()> {
    let dir = tempdir()?;
    let r1 = write_and_open(
        dir.path(),
        "1.db",
        &[
            (b"z", Some(b"1"), 1),
            (b"m", Some(b"2"), 2),
            (b"a", Some(b"3"), 3),
        ],
        1,
    )?;
    let r2 = write_and_open(
        dir.path(),
        "2.db",
        &[(b"x", Some(b"4"), 4), (b"b", Some(b"5"), 5)],
        2,
    )?;

    let readers = vec![r1, r2];
    let mut iter = MergeIterator::new(&readers)?;
    let result = iter.collect_all()?;

    let keys: Vec<&[u8]> = result.iter().map(|(k, _)| k.as_slice()).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);

    Ok(())
}

// -------------------- Deduplication --------------------

#[test]
fn merge_overlapping_keys_highest_timestamp_wins() -> Result<()> {
    let dir = tempdir()?;

    let r1 = write_and_open(dir.path(), "old.db", &[(b"key", Some(b"old_value"), 1)], 1)?;
    let r2 = write_and_open(dir.path(), "new.db", &[(b"key", Some(b"new_value"), 5)], 2)?;

    let readers = vec![r1, r2];
    let mut iter = MergeIterator::new(&readers)?;
    let result = iter.collect_all()?;

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].0, b"key");
    assert_eq!(result[0].1.timestamp, 5);
    assert_eq!(result[0].1.value, Some(b"new_value".to_vec()));

    Ok(())
}

#[test]
fn merge_tombstone_wins_over_older_value() -> Result<()> {
    let dir = tempdir()?;
    let r1 = write_and_open(dir.path(), "old.db", &[(b"key", Some(b"alive"), 1)], 1)?;
    let r2 = write_and_open(dir.path(), "new.db", &[(b"key", None, 5)], 2)?;

    let readers = vec![r1, r2];
    let mut iter = MergeIterator::new(&readers)?;
    let result = iter.collect_all()?;

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].1.timestamp, 5);
    assert_eq!(result[0].1.value, None); // tombstone wins

    Ok(())
}

#[test]
fn merge_equal_timestamp_ties_broken_by_creation_order() -> Result<()> {
    let dir = tempdir()?;

    // Same timestamp in both runs; run "later.db" was created after "earlier.db"
    // and must win the tie.
    let r1 = write_and_open(dir.path(), "earlier.db", &[(b"key", Some(b"from_earlier"), 9)], 10)?;
    let r2 = write_and_open(dir.path(), "later.db", &[(b"key", Some(b"from_later"), 9)], 20)?;

    let readers = vec![r1, r2];
    let mut iter = MergeIterator::new(&readers)?;
    let result = iter.collect_all()?;

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].1.value, Some(b"from_later".to_vec()));

    Ok(())
}
